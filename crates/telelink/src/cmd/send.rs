use std::time::Duration;

use telelink_message::Packet;
use telelink_peer::{Connection, ConnectionStatus};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::cmd::{parse_duration, runtime, SendArgs};
use crate::exit::{peer_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT};

pub fn run(args: SendArgs) -> CliResult<i32> {
    let packet = args.packet.resolve()?;
    let wait_open = parse_duration(&args.wait_open)?;
    runtime()?.block_on(send(&args.url, packet, wait_open))
}

async fn send(url: &str, packet: Packet, wait_open: Duration) -> CliResult<i32> {
    let conn = Connection::connect(url).map_err(|err| peer_error("connect failed", err))?;

    let mut status = conn.watch_status();
    let opened = timeout(wait_open, status.wait_for(|s| *s == ConnectionStatus::Open))
        .await
        .is_ok_and(|changed| changed.is_ok());
    if !opened {
        let last = conn.status();
        if let Err(err) = conn.shutdown().await {
            warn!(endpoint = %conn.endpoint(), error = %err, "shutdown failed");
        }
        return Err(CliError::new(
            TIMEOUT,
            format!("{url} did not open within {wait_open:?} (status: {last})"),
        ));
    }

    let sent = conn.send(&packet);
    // Shutdown waits for the queued frame to reach the socket.
    let flushed = conn.shutdown().await;
    if !sent {
        return Err(CliError::new(FAILURE, format!("send to {url} was rejected")));
    }
    flushed.map_err(|err| peer_error(&format!("send to {url} failed"), err))?;

    info!(endpoint = %conn.endpoint(), id = packet.id, "packet written");
    Ok(SUCCESS)
}
