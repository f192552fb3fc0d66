//! CSV import/export with the fixed `date,metric_slug,value` schema.

use crate::db::{Measurement, MeasurementFilter, MetricDefinition, NewMeasurement};
use crate::error::EverwellError;
use crate::service::metrics::{MetricsService, validate_date, validate_value};
use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::info;

pub const CSV_HEADER: [&str; 3] = ["date", "metric_slug", "value"];
pub const MAX_IMPORT_ROWS: usize = 10_000;
pub const MAX_REPORTED_ERRORS: usize = 50;
pub const MAX_IMPORT_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RowError {
    pub line: u64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<RowError>,
}

/// Rows that passed validation, deduplicated by (date, metric) with the last occurrence kept.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedImport {
    pub rows: Vec<NewMeasurement>,
    pub skipped: usize,
    pub errors: Vec<RowError>,
}

/// Render measurements as CSV, formatting each value with its metric's precision.
pub fn write_csv(
    measurements: &[Measurement],
    definitions: &HashMap<String, MetricDefinition>,
) -> Result<Vec<u8>, EverwellError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for m in measurements {
        let decimals = definitions
            .get(&m.metric_slug)
            .map(|d| d.decimals.clamp(0, 6) as usize)
            .unwrap_or(2);
        let date = m.date.format("%Y-%m-%d").to_string();
        let value = format!("{:.*}", decimals, m.value);
        writer.write_record([date.as_str(), m.metric_slug.as_str(), value.as_str()])?;
    }
    writer
        .into_inner()
        .map_err(|e| EverwellError::Io(e.into_error()))
}

fn parse_row(
    record: &csv::StringRecord,
    definitions: &HashMap<String, MetricDefinition>,
    today_utc: NaiveDate,
) -> Result<NewMeasurement, String> {
    if record.len() != CSV_HEADER.len() {
        return Err(format!("expected 3 columns, found {}", record.len()));
    }
    let date = NaiveDate::parse_from_str(&record[0], "%Y-%m-%d")
        .map_err(|_| format!("invalid date `{}`, expected YYYY-MM-DD", &record[0]))?;
    validate_date(date, today_utc).map_err(|e| e.to_string())?;

    let slug = record[1].to_ascii_lowercase();
    let def = definitions
        .get(&slug)
        .ok_or_else(|| format!("unknown metric `{slug}`"))?;

    let raw: f64 = record[2]
        .parse()
        .map_err(|_| format!("invalid number `{}`", &record[2]))?;
    let value = validate_value(def, raw).map_err(|e| e.to_string())?;

    Ok(NewMeasurement {
        metric_slug: slug,
        date,
        value,
        note: None,
    })
}

/// Parse and validate an uploaded CSV body.
///
/// A wrong header or too many rows rejects the whole file; bad rows are skipped
/// and reported with their 1-based line number.
pub fn parse_csv(
    body: &str,
    definitions: &HashMap<String, MetricDefinition>,
    today_utc: NaiveDate,
) -> Result<ParsedImport, EverwellError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(body.trim_start_matches('\u{feff}').as_bytes());

    let header: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.to_ascii_lowercase())
        .collect();
    if header != CSV_HEADER {
        return Err(EverwellError::invalid(format!(
            "CSV header must be `{}`",
            CSV_HEADER.join(",")
        )));
    }

    let mut accepted: BTreeMap<(NaiveDate, String), NewMeasurement> = BTreeMap::new();
    let mut errors = Vec::new();
    let mut skipped = 0;

    for (idx, result) in reader.records().enumerate() {
        if idx >= MAX_IMPORT_ROWS {
            return Err(EverwellError::invalid(format!(
                "CSV has more than {MAX_IMPORT_ROWS} rows"
            )));
        }
        let fallback_line = idx as u64 + 2;
        let outcome = match result {
            Ok(record) => {
                let line = record.position().map_or(fallback_line, |p| p.line());
                parse_row(&record, definitions, today_utc).map_err(|msg| (line, msg))
            }
            Err(e) => {
                let line = e.position().map_or(fallback_line, |p| p.line());
                Err((line, e.to_string()))
            }
        };
        match outcome {
            Ok(row) => {
                accepted.insert((row.date, row.metric_slug.clone()), row);
            }
            Err((line, message)) => {
                skipped += 1;
                if errors.len() < MAX_REPORTED_ERRORS {
                    errors.push(RowError { line, message });
                }
            }
        }
    }

    Ok(ParsedImport {
        rows: accepted.into_values().collect(),
        skipped,
        errors,
    })
}

impl MetricsService {
    pub async fn export_csv(
        &self,
        user_id: &str,
        filter: MeasurementFilter,
    ) -> Result<Vec<u8>, EverwellError> {
        let (definitions, measurements) = tokio::try_join!(
            self.definitions_by_slug(),
            self.storage().list_measurements(user_id, &filter)
        )?;
        write_csv(&measurements, &definitions)
    }

    pub async fn import_csv(
        &self,
        user_id: &str,
        body: &str,
        today_utc: NaiveDate,
    ) -> Result<ImportReport, EverwellError> {
        let definitions = self.definitions_by_slug().await?;
        let parsed = parse_csv(body, &definitions, today_utc)?;

        if !parsed.rows.is_empty() {
            self.storage()
                .upsert_measurements(user_id, &parsed.rows)
                .await?;
            let dates: Vec<NaiveDate> = parsed.rows.iter().map(|r| r.date).collect();
            self.derived().recompute(user_id, &dates).await?;
        }

        info!(
            user_id = %user_id,
            imported = parsed.rows.len(),
            skipped = parsed.skipped,
            "CSV import finished"
        );
        Ok(ImportReport {
            imported: parsed.rows.len(),
            skipped: parsed.skipped,
            errors: parsed.errors,
        })
    }
}
