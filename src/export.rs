//! Writing invoice lists to CSV or JSON files.

use crate::books::InvoiceFilter;
use crate::client::Client;
use crate::client_error::ClientError;
use chrono::{DateTime, TimeZone};
use serde_json::Value;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            _ => Err(ClientError::validation(format!(
                "Unsupported export format: {}",
                s
            ))),
        }
    }
}

/// `zoho_invoices_<timestamp>.<ext>`
pub fn default_file_name<Tz: TimeZone>(now: &DateTime<Tz>, format: ExportFormat) -> String
where
    Tz::Offset: fmt::Display,
{
    format!(
        "zoho_invoices_{}.{}",
        now.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// Serialize `invoices` to `out`.
///
/// CSV columns come from the keys of the first invoice; keys missing from later invoices
/// produce empty cells and extra keys are dropped.
pub fn write_invoices<W: Write>(
    invoices: &[Value],
    format: ExportFormat,
    mut out: W,
) -> Result<(), ClientError> {
    match format {
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut out, invoices)?;
            out.write_all(b"\n")?;
        }
        ExportFormat::Csv => {
            let columns: Vec<&String> = match invoices.first() {
                Some(Value::Object(first)) => first.keys().collect(),
                _ => Vec::new(),
            };

            if columns.is_empty() {
                return Ok(out.flush()?);
            }

            let mut writer = csv::WriterBuilder::new()
                .terminator(csv::Terminator::CRLF)
                .from_writer(&mut out);

            writer.write_record(&columns)?;

            for invoice in invoices {
                writer.write_record(
                    columns
                        .iter()
                        .map(|c| invoice.get(c.as_str()).map(cell).unwrap_or_default()),
                )?;
            }

            writer.flush()?;
        }
    }

    out.flush()?;

    Ok(())
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Fetch invoices matching `filter` and write them to `path`. Returns how many were written.
pub async fn export_invoices(
    client: &Client,
    filter: &InvoiceFilter,
    format: ExportFormat,
    path: &Path,
) -> Result<usize, ClientError> {
    let invoices = client.list_invoices(filter).await?;

    let file = File::create(path)?;
    write_invoices(&invoices, format, BufWriter::new(file))?;

    info!(count = invoices.len(), path = %path.display(), %format, "exported invoices");

    Ok(invoices.len())
}
