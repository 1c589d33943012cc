use telelink_message::{Packet, ALL_TOPIC};
use telelink_peer::{Connection, ConnectionConfig, DeliveryPolicy};
use tokio::sync::mpsc;
use tracing::info;

use crate::cmd::{parse_duration, runtime, ListenArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_packet, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = connection_config(&args)?;
    let topics = if args.topics.is_empty() {
        vec![ALL_TOPIC.to_string()]
    } else {
        args.topics
    };
    runtime()?.block_on(listen(config, topics, args.count, format))
}

fn connection_config(args: &ListenArgs) -> CliResult<ConnectionConfig> {
    let delivery = if args.latest_only {
        DeliveryPolicy::LatestOnly
    } else {
        DeliveryPolicy::EveryFrame
    };
    Ok(ConnectionConfig::parse(&args.url)
        .map_err(|err| peer_error("invalid url", err))?
        .with_reconnect_delay(parse_duration(&args.reconnect_delay)?)
        .with_subscription_refresh(parse_duration(&args.refresh)?)
        .with_delivery(delivery))
}

async fn listen(
    config: ConnectionConfig,
    topics: Vec<String>,
    count: Option<usize>,
    format: OutputFormat,
) -> CliResult<i32> {
    let conn =
        Connection::connect_with_config(config).map_err(|err| peer_error("connect failed", err))?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Packet>();
    let _subscriptions: Vec<_> = topics
        .into_iter()
        .map(|topic| {
            let tx = tx.clone();
            conn.register_topic(topic, move |packet: &Packet| {
                let _ = tx.send(packet.clone());
            })
        })
        .collect();
    drop(tx);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut printed = 0usize;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
            packet = rx.recv() => {
                let Some(packet) = packet else { break };
                print_packet(&packet, format);
                printed = printed.saturating_add(1);
                if count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
        }
    }

    conn.shutdown()
        .await
        .map_err(|err| peer_error("shutdown failed", err))?;
    Ok(SUCCESS)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;

    use super::*;
    use crate::cmd::Command;

    #[derive(Parser)]
    struct Harness {
        #[command(subcommand)]
        command: Command,
    }

    fn listen_args(argv: &[&str]) -> ListenArgs {
        let mut full = vec!["telelink", "listen"];
        full.extend_from_slice(argv);
        match Harness::try_parse_from(full).unwrap().command {
            Command::Listen(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn flags_map_onto_config() {
        let args = listen_args(&[
            "tcp://robot.local:7000",
            "--reconnect-delay",
            "250ms",
            "--refresh",
            "1s",
            "--latest-only",
        ]);
        let config = connection_config(&args).unwrap();
        assert_eq!(config.reconnect_delay, Duration::from_millis(250));
        assert_eq!(config.subscription_refresh, Duration::from_secs(1));
        assert_eq!(config.delivery, DeliveryPolicy::LatestOnly);
    }

    #[test]
    fn defaults_match_connection_defaults() {
        let config = connection_config(&listen_args(&["robot.local:9001"])).unwrap();
        let defaults = ConnectionConfig::parse("robot.local:9001").unwrap();
        assert_eq!(config, defaults);
    }
}
