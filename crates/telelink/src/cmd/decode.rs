use std::fs::File;
use std::io::Read;

use telelink_frame::{FrameError, FrameReader};
use telelink_message::Packet;
use tracing::{info, warn};

use crate::cmd::DecodeArgs;
use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_packet, OutputFormat};

#[derive(Debug, Default, PartialEq, Eq)]
struct DecodeSummary {
    decoded: usize,
    failed: usize,
}

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let input: Box<dyn Read> = match &args.file {
        Some(path) => Box::new(
            File::open(path)
                .map_err(|err| io_error(&format!("failed opening {}", path.display()), err))?,
        ),
        None => Box::new(std::io::stdin().lock()),
    };

    let summary = decode_stream(input, |packet| print_packet(packet, format))?;
    info!(
        decoded = summary.decoded,
        failed = summary.failed,
        "decode finished"
    );

    if summary.failed > 0 {
        return Err(CliError::new(
            DATA_INVALID,
            format!(
                "{} of {} frames failed to decode",
                summary.failed,
                summary.decoded + summary.failed
            ),
        ));
    }
    Ok(SUCCESS)
}

/// Decode every frame until EOF. Bad frames are counted and skipped.
fn decode_stream<R: Read>(input: R, mut on_packet: impl FnMut(&Packet)) -> CliResult<DecodeSummary> {
    let mut reader = FrameReader::new(input);
    let mut summary = DecodeSummary::default();
    loop {
        match reader.read_packet::<Packet>() {
            Ok(packet) => {
                summary.decoded += 1;
                on_packet(&packet);
            }
            Err(FrameError::ConnectionClosed) => return Ok(summary),
            Err(FrameError::Io(err)) => return Err(io_error("read failed", err)),
            Err(err) => {
                warn!(error = %err, "dropping undecodable frame");
                summary.failed += 1;
            }
        }
    }
}
