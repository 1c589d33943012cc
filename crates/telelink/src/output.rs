use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use telelink_message::{NodeId, Packet, PacketData};

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    /// One packet per line in the layout `send --json` accepts.
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct PacketOutput<'a> {
    topic: String,
    to: Option<NodeId>,
    from: Option<NodeId>,
    id: u32,
    time: u64,
    data: &'a PacketData,
}

pub fn print_packet(packet: &Packet, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = PacketOutput {
                topic: topic_label(packet),
                to: packet.to,
                from: packet.from,
                id: packet.id,
                time: packet.time,
                data: &packet.data,
            };
            println!("{}", to_json(&out));
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TOPIC", "FROM", "TO", "ID", "TIME", "DATA"])
                .add_row(vec![
                    topic_label(packet),
                    node_label(packet.from),
                    node_label(packet.to),
                    packet.id.to_string(),
                    packet.time.to_string(),
                    to_json(&packet.data),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} from={} to={} id={} time={} data={}",
                topic_label(packet),
                node_label(packet.from),
                node_label(packet.to),
                packet.id,
                packet.time,
                to_json(&packet.data)
            );
        }
        OutputFormat::Raw => println!("{}", to_json(packet)),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

/// Comma-separated routing keys, `-` when the packet has none.
pub fn topic_label(packet: &Packet) -> String {
    let keys = packet.topic_keys();
    if keys.is_empty() {
        "-".to_string()
    } else {
        keys.join(",")
    }
}

pub fn node_label(node: Option<NodeId>) -> String {
    node.map_or_else(|| "-".to_string(), |id| id.to_string())
}
