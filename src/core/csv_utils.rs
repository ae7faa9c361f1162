//! CSV import/export helpers shared by the employee and important date routes.

use poem_openapi::payload::{Attachment, AttachmentType};
use serde_json::Value;

use crate::schema::common::{ImportResult, ImportRowError};

/// Lowercase, trimmed, inner whitespace folded to `_`.
pub fn normalize_header(header: &str) -> String {
    header
        .trim_start_matches('\u{feff}')
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join("_")
}

fn sniff_delimiter(data: &[u8]) -> u8 {
    let first_line = data.split(|x| *x == b'\n').next().unwrap_or_default();
    let commas = first_line.iter().filter(|x| **x == b',').count();
    let semicolons = first_line.iter().filter(|x| **x == b';').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CsvTable {
    /// Normalised header names
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn parse(data: &[u8]) -> anyhow::Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(sniff_delimiter(data))
            .flexible(true)
            .from_reader(data);
        let headers = reader
            .headers()?
            .iter()
            .map(normalize_header)
            .collect::<Vec<String>>();
        if headers.iter().all(|x| x.is_empty()) {
            anyhow::bail!("missing header row");
        }
        let mut rows = vec![];
        for record in reader.records() {
            let record = record?;
            if record.iter().all(|x| x.trim().is_empty()) {
                continue;
            }
            rows.push(record.iter().map(|x| x.to_string()).collect());
        }
        Ok(Self { headers, rows })
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|x| x == name)
    }

    /// Trimmed cell value of `name` in `row`; empty cells read as `None`.
    pub fn get<'a>(&self, row: &'a [String], name: &str) -> Option<&'a str> {
        let idx = self.headers.iter().position(|x| x == name)?;
        row.get(idx)
            .map(|x| x.trim())
            .filter(|x| !x.is_empty())
    }
}

/// Render a stored JSON cell as CSV text.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// CSV body served as a file download.
pub fn csv_attachment(filename: &str, content: String) -> Attachment<Vec<u8>> {
    Attachment::new(content.into_bytes())
        .attachment_type(AttachmentType::Attachment)
        .filename(filename)
}

pub fn write_csv(headers: &[String], rows: &[Vec<String>]) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row)?;
    }
    let bytes = writer.into_inner().map_err(|err| anyhow::anyhow!("{}", err))?;
    Ok(String::from_utf8(bytes)?)
}

/// Reported for rows the database refused for reasons other than a duplicate.
pub const ROW_NOT_SAVED: &str = "Row could not be saved";

/// Per-row accounting of an import run.
#[derive(Debug, Default)]
pub struct ImportTally {
    pub imported: u32,
    pub skipped: u32,
    pub errors: Vec<ImportRowError>,
    failed_rows: Vec<Vec<String>>,
}

impl ImportTally {
    pub fn imported(&mut self) {
        self.imported += 1;
    }

    pub fn skipped(&mut self) {
        self.skipped += 1;
    }

    /// `row` is the 1-based data row number.
    pub fn failed(&mut self, row: usize, record: &[String], message: impl Into<String>) {
        let message = message.into();
        let mut failed = record.to_vec();
        failed.push(message.clone());
        self.failed_rows.push(failed);
        self.errors.push(ImportRowError {
            row: row as u32,
            message,
        });
    }

    pub fn total(&self) -> u32 {
        self.imported + self.skipped + self.errors.len() as u32
    }

    /// Build the result, attaching a CSV of the failed rows when there are any.
    pub fn into_result(self, headers: &[String]) -> anyhow::Result<ImportResult> {
        let error_report = if self.failed_rows.is_empty() {
            None
        } else {
            let mut report_headers = headers.to_vec();
            report_headers.push("error".to_string());
            Some(write_csv(&report_headers, &self.failed_rows)?)
        };
        Ok(ImportResult {
            imported: self.imported,
            skipped: self.skipped,
            errors: self.errors,
            error_report,
        })
    }
}
