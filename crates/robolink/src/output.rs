use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::BytesMut;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use robolink_packet::{encode_event, CorrelationId, EventPacket};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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
struct EventOutput<'a> {
    event: &'a EventPacket,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<CorrelationId>,
    timestamp: String,
}

pub fn print_event(event: &EventPacket, correlation_id: Option<CorrelationId>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = EventOutput {
                event,
                correlation_id,
                timestamp: now_unix_millis(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "ID", "FIELDS"])
                .add_row(vec![
                    event.kind().name().to_string(),
                    id_label(correlation_id),
                    event_fields(event),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "event={} id={} {}",
                event.kind().name(),
                id_label(correlation_id),
                event_fields(event)
            );
        }
        OutputFormat::Raw => {
            let mut buf = BytesMut::new();
            encode_event(event, &mut buf);
            print_raw(&buf);
        }
    }
}

#[derive(Serialize)]
pub struct SendOutput {
    pub correlation_id: CorrelationId,
    pub command: &'static str,
    pub status: SendStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<EventPacket>,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SendStatus {
    /// Handed to the transport.
    Sent,
    Acknowledged,
    Responded,
}

impl SendStatus {
    fn as_str(self) -> &'static str {
        match self {
            SendStatus::Sent => "sent",
            SendStatus::Acknowledged => "acknowledged",
            SendStatus::Responded => "responded",
        }
    }
}

pub fn print_send(out: &SendOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ID", "COMMAND", "STATUS", "RESPONSE"])
                .add_row(vec![
                    out.correlation_id.to_string(),
                    out.command.to_string(),
                    out.status.as_str().to_string(),
                    out.response
                        .as_ref()
                        .map(|event| format!("{} {}", event.kind().name(), event_fields(event)))
                        .unwrap_or_default(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            print!(
                "id={} command={} status={}",
                out.correlation_id,
                out.command,
                out.status.as_str()
            );
            match &out.response {
                Some(event) => println!(
                    " response={} {}",
                    event.kind().name(),
                    event_fields(event)
                ),
                None => println!(),
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn id_label(id: Option<CorrelationId>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string())
}

/// `name=value` pairs of the event body, sorted by name.
pub fn event_fields(event: &EventPacket) -> String {
    let data = match serde_json::to_value(event) {
        Ok(serde_json::Value::Object(mut map)) => map.remove("data"),
        _ => None,
    };
    match data {
        Some(serde_json::Value::Object(fields)) => fields
            .iter()
            .map(|(name, value)| format!("{name}={}", render_value(value)))
            .collect::<Vec<_>>()
            .join(" "),
        Some(other) => render_value(&other),
        None => String::new(),
    }
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn now_unix_millis() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
