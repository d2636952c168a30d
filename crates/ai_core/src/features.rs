//! Feature extraction and the training export format
//!
//! Turns flat records into a rectangular table typed by the feature schema.
//! Cells are typed by the declared column kind, never by inspecting the
//! incoming values. A field missing from a record becomes a missing cell so
//! the column survives and gets imputed later.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, warn};

use crate::errors::{AiCoreError, Result};
use crate::label::Evaluation;
use crate::records::{FieldValue, JoinedRecord, LabeledRecord, Record};
use crate::schema::{ColumnKind, ColumnSpec, FeatureSchema};

/// A schema-typed cell before imputation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureValue {
    Numeric(f64),
    Categorical(String),
    Missing,
}

impl FeatureValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, FeatureValue::Missing)
    }
}

pub type FeatureRow = Vec<FeatureValue>;

/// Rows of features in schema order
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    schema: FeatureSchema,
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate one column top to bottom
    pub fn column(&self, idx: usize) -> impl Iterator<Item = &FeatureValue> {
        self.rows.iter().map(move |row| &row[idx])
    }

    /// New table holding the rows at `indices`, in that order
    pub fn select(&self, indices: &[usize]) -> FeatureTable {
        FeatureTable {
            schema: self.schema.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}

/// Features plus the known outcome of every row
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledTable {
    pub table: FeatureTable,
    pub labels: Vec<Evaluation>,
}

impl LabeledTable {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn schema(&self) -> &FeatureSchema {
        self.table.schema()
    }

    pub fn select(&self, indices: &[usize]) -> LabeledTable {
        LabeledTable {
            table: self.table.select(indices),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    /// Count of rows per class, indexed by class index
    pub fn class_counts(&self) -> [usize; 2] {
        let mut counts = [0usize; 2];
        for label in &self.labels {
            counts[label.class_index()] += 1;
        }
        counts
    }

    /// Write the export file: schema header + label, one line per row
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut out = csv::Writer::from_writer(writer);
        out.write_record(self.schema().export_header())?;

        for (row, label) in self.table.rows.iter().zip(&self.labels) {
            let mut fields: Vec<String> = row.iter().map(format_cell).collect();
            fields.push(label.as_str().to_string());
            out.write_record(&fields)?;
        }

        out.flush()?;
        Ok(())
    }

    pub fn write_csv_path(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        self.write_csv(file)
    }

    /// Read an export file, rejecting any header that differs from the schema
    pub fn from_csv<R: Read>(schema: &FeatureSchema, reader: R) -> Result<LabeledTable> {
        let mut input = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let header: Vec<String> = input.headers()?.iter().map(str::to_string).collect();
        schema.check_header(&header)?;

        let mut rows = Vec::new();
        let mut labels = Vec::new();

        for (line_idx, result) in input.records().enumerate() {
            let record = result?;
            // header is line 1
            let line = line_idx + 2;

            let mut row = Vec::with_capacity(schema.len());
            for (spec, raw) in schema.columns.iter().zip(record.iter()) {
                row.push(parse_cell(spec, raw, line)?);
            }

            let raw_label = record.get(schema.len()).unwrap_or_default();
            let label = raw_label.parse::<Evaluation>().map_err(|err| {
                AiCoreError::InvalidInput(format!("line {line}: {err}"))
            })?;

            rows.push(row);
            labels.push(label);
        }

        if rows.is_empty() {
            return Err(AiCoreError::NoData(format!(
                "export for task '{}' contains no rows",
                schema.task
            )));
        }

        debug!(task = %schema.task, rows = rows.len(), "read training export");

        Ok(LabeledTable {
            table: FeatureTable {
                schema: schema.clone(),
                rows,
            },
            labels,
        })
    }

    pub fn from_csv_path(schema: &FeatureSchema, path: &Path) -> Result<LabeledTable> {
        let file = File::open(path)?;
        Self::from_csv(schema, file)
    }
}

/// Write the training export for `table` to `writer`
pub fn export_csv<W: Write>(table: &LabeledTable, writer: W) -> Result<()> {
    table.write_csv(writer)
}

fn format_cell(value: &FeatureValue) -> String {
    match value {
        FeatureValue::Numeric(v) => format!("{v}"),
        FeatureValue::Categorical(s) => s.clone(),
        FeatureValue::Missing => String::new(),
    }
}

fn parse_cell(spec: &ColumnSpec, raw: &str, line: usize) -> Result<FeatureValue> {
    if raw.is_empty() {
        return Ok(FeatureValue::Missing);
    }
    match spec.kind {
        ColumnKind::Numeric => raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(FeatureValue::Numeric)
            .ok_or_else(|| {
                AiCoreError::schema_mismatch(
                    spec.name.clone(),
                    format!("line {line}: '{raw}' is not a number"),
                )
            }),
        ColumnKind::Categorical => Ok(FeatureValue::Categorical(raw.to_string())),
    }
}

/// Type one record field according to its column
fn extract_value(spec: &ColumnSpec, value: Option<&FieldValue>) -> Result<FeatureValue> {
    let value = match value {
        None | Some(FieldValue::Missing) => return Ok(FeatureValue::Missing),
        Some(v) => v,
    };

    match (spec.kind, value) {
        (ColumnKind::Numeric, FieldValue::Number(v)) if v.is_finite() => {
            Ok(FeatureValue::Numeric(*v))
        }
        (ColumnKind::Numeric, FieldValue::Number(_)) => Ok(FeatureValue::Missing),
        (ColumnKind::Numeric, other) => Err(AiCoreError::schema_mismatch(
            spec.name.clone(),
            format!("expected a number, found {other:?}"),
        )),
        (ColumnKind::Categorical, FieldValue::Text(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(FeatureValue::Missing)
            } else {
                Ok(FeatureValue::Categorical(trimmed.to_string()))
            }
        }
        (ColumnKind::Categorical, FieldValue::Flag(b)) => {
            Ok(FeatureValue::Categorical(b.to_string()))
        }
        (ColumnKind::Categorical, FieldValue::Number(v)) => {
            Ok(FeatureValue::Categorical(format!("{v}")))
        }
        (_, FieldValue::Missing) => Ok(FeatureValue::Missing),
    }
}

/// Shape one record into a row in schema order
pub fn extract_row(schema: &FeatureSchema, record: &Record) -> Result<FeatureRow> {
    schema
        .columns
        .iter()
        .map(|spec| extract_value(spec, record.get(&spec.name)))
        .collect()
}

/// Shape records into a feature table; zero records is `NoData`
pub fn extract(schema: &FeatureSchema, records: &[Record]) -> Result<FeatureTable> {
    if records.is_empty() {
        return Err(AiCoreError::NoData(format!(
            "no records to extract for task '{}'",
            schema.task
        )));
    }

    let rows = records
        .iter()
        .map(|record| extract_row(schema, record))
        .collect::<Result<Vec<_>>>()?;

    Ok(FeatureTable {
        schema: schema.clone(),
        rows,
    })
}

/// Shape labeled records into a training table; zero records is `NoData`
pub fn extract_labeled(schema: &FeatureSchema, records: &[LabeledRecord]) -> Result<LabeledTable> {
    if records.is_empty() {
        return Err(AiCoreError::NoData(format!(
            "no labeled records for task '{}'",
            schema.task
        )));
    }

    let mut rows = Vec::with_capacity(records.len());
    let mut labels = Vec::with_capacity(records.len());
    for labeled in records {
        rows.push(extract_row(schema, &labeled.record)?);
        labels.push(labeled.label);
    }

    Ok(LabeledTable {
        table: FeatureTable {
            schema: schema.clone(),
            rows,
        },
        labels,
    })
}

/// Labeled table straight from joined rows; unlabeled rows are skipped
pub fn labeled_from_joined<R: JoinedRecord>(joined: &[R]) -> Result<LabeledTable> {
    let labeled: Vec<LabeledRecord> = joined.iter().filter_map(JoinedRecord::to_labeled).collect();
    let skipped = joined.len() - labeled.len();
    if skipped > 0 {
        warn!(task = %R::TASK, skipped, "skipping rows without an evaluation");
    }
    extract_labeled(&R::TASK.schema(), &labeled)
}
