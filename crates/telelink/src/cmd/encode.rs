use std::fmt::Write as _;

use base64::Engine;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use telelink_frame::encode_frame;

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_raw, to_json, topic_label, OutputFormat};

#[derive(Serialize)]
struct EncodeOutput<'a> {
    topic: String,
    id: u32,
    frame_len: usize,
    encoding: &'a str,
    frame: String,
}

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let packet = args.packet.resolve()?;
    let frame = encode_frame(&packet).map_err(|err| frame_error("encode failed", err))?;

    let (encoding, text) = if args.base64 {
        ("base64", base64::engine::general_purpose::STANDARD.encode(&frame))
    } else {
        ("hex", to_hex(&frame))
    };

    match format {
        OutputFormat::Raw => print_raw(&frame),
        OutputFormat::Json => {
            let out = EncodeOutput {
                topic: topic_label(&packet),
                id: packet.id,
                frame_len: frame.len(),
                encoding,
                frame: text,
            };
            println!("{}", to_json(&out));
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TOPIC", "ID", "LEN", "FRAME"])
                .add_row(vec![
                    topic_label(&packet),
                    packet.id.to_string(),
                    frame.len().to_string(),
                    text,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{text}"),
    }
    Ok(SUCCESS)
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
