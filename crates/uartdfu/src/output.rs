use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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

/// Summary of a completed transfer.
#[derive(Serialize, Debug, Clone)]
pub struct TransferReport {
    pub schema_id: &'static str,
    pub link: String,
    pub image_id: u8,
    pub image_size: usize,
    pub body_size: usize,
    pub resumed_from: usize,
    pub chunk_size: usize,
    pub chunks: usize,
    pub elapsed_ms: u128,
    pub bytes_per_second: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
}

pub const TRANSFER_SCHEMA_ID: &str =
    "https://schemas.3leaps.dev/uartdfu/cli/v1/transfer-report.schema.json";

/// Summary of a responder session.
#[derive(Serialize, Debug, Clone)]
pub struct ServeReport {
    pub schema_id: &'static str,
    pub device: String,
    pub out: String,
    pub bytes_stored: u64,
    pub scheduled_image: Option<u8>,
}

pub const SERVE_SCHEMA_ID: &str =
    "https://schemas.3leaps.dev/uartdfu/cli/v1/serve-report.schema.json";

pub fn print_transfer(report: &TransferReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut rows = vec![
                ("LINK", report.link.clone()),
                ("IMAGE ID", report.image_id.to_string()),
                ("IMAGE SIZE", report.image_size.to_string()),
                ("BODY SIZE", report.body_size.to_string()),
                ("RESUMED FROM", report.resumed_from.to_string()),
                ("CHUNK SIZE", report.chunk_size.to_string()),
                ("CHUNKS", report.chunks.to_string()),
                ("ELAPSED", format!("{} ms", report.elapsed_ms)),
                ("THROUGHPUT", format!("{} B/s", report.bytes_per_second)),
            ];
            if let Some(verified) = report.verified {
                rows.push(("VERIFIED", verified.to_string()));
            }
            print_table(&rows);
        }
        OutputFormat::Pretty => {
            println!(
                "link={} image_id={} size={} resumed_from={} chunks={} elapsed={}ms rate={}B/s{}",
                report.link,
                report.image_id,
                report.body_size,
                report.resumed_from,
                report.chunks,
                report.elapsed_ms,
                report.bytes_per_second,
                report
                    .verified
                    .map(|v| format!(" verified={v}"))
                    .unwrap_or_default()
            );
        }
    }
}

pub fn print_serve(report: &ServeReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => print_table(&[
            ("DEVICE", report.device.clone()),
            ("OUTPUT", report.out.clone()),
            ("BYTES STORED", report.bytes_stored.to_string()),
            (
                "SCHEDULED",
                report
                    .scheduled_image
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]),
        OutputFormat::Pretty => {
            println!(
                "device={} out={} stored={} scheduled={:?}",
                report.device, report.out, report.bytes_stored, report.scheduled_image
            );
        }
    }
}

/// Bytes per second, saturating; zero for an empty or instantaneous transfer.
pub fn throughput(bytes: usize, elapsed_ms: u128) -> u64 {
    if elapsed_ms == 0 {
        return 0;
    }
    u64::try_from(bytes as u128 * 1000 / elapsed_ms).unwrap_or(u64::MAX)
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn print_table(rows: &[(&str, String)]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["FIELD", "VALUE"]);
    for (field, value) in rows {
        table.add_row(vec![field.to_string(), value.clone()]);
    }
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throughput_handles_zero_elapsed() {
        assert_eq!(throughput(1024, 0), 0);
        assert_eq!(throughput(2048, 500), 4096);
    }

    #[test]
    fn report_serializes_without_verification() {
        let report = TransferReport {
            schema_id: TRANSFER_SCHEMA_ID,
            link: "/dev/ttyUSB0".to_string(),
            image_id: 0,
            image_size: 104,
            body_size: 100,
            resumed_from: 0,
            chunk_size: 64,
            chunks: 2,
            elapsed_ms: 10,
            bytes_per_second: 10_000,
            verified: None,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["body_size"], 100);
        assert!(value.get("verified").is_none());
    }
}
