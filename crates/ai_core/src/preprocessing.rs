//! Imputation, encoding and scaling
//!
//! Fit once on the training split, then applied unchanged to every later row.
//! The output matrix is fixed-point (`SCALE == 1.0`):
//!
//! - numeric columns: mean imputation, then min-max scaling into `[0, SCALE]`
//!   with clamping; a constant column maps to 0
//! - categorical columns: mode imputation (ties go to the lexicographically
//!   smallest category), then ordinal code `k` stored as `k * SCALE`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::errors::{AiCoreError, Result};
use crate::features::{FeatureRow, FeatureTable, FeatureValue};
use crate::fixed::{self, SCALE};
use crate::schema::{ColumnKind, FeatureSchema};

/// One transformed row
pub type FixedRow = Vec<i64>;

/// What to do with a category that was never seen while fitting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownCategoryPolicy {
    /// Map to a reserved code one past the last known category
    #[default]
    Bucket,
    /// Fail with `SchemaMismatch`
    Reject,
}

impl fmt::Display for UnknownCategoryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnknownCategoryPolicy::Bucket => f.write_str("bucket"),
            UnknownCategoryPolicy::Reject => f.write_str("reject"),
        }
    }
}

impl FromStr for UnknownCategoryPolicy {
    type Err = AiCoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bucket" => Ok(UnknownCategoryPolicy::Bucket),
            "reject" => Ok(UnknownCategoryPolicy::Reject),
            other => Err(AiCoreError::InvalidInput(format!(
                "unknown category policy '{other}' (expected 'bucket' or 'reject')"
            ))),
        }
    }
}

/// Fit-time statistics of a numeric column, all fixed-point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericColumnStats {
    pub mean: i64,
    pub min: i64,
    pub max: i64,
}

impl NumericColumnStats {
    fn fit(values: &[i64]) -> Option<Self> {
        let mean = fixed::mean(values)?;
        let min = *values.iter().min()?;
        let max = *values.iter().max()?;
        Some(Self { mean, min, max })
    }

    /// Impute then scale one raw value (already fixed-point)
    pub fn apply(&self, value: Option<i64>) -> i64 {
        let value = value.unwrap_or(self.mean);
        let span = self.max as i128 - self.min as i128;
        if span <= 0 {
            return 0;
        }
        let shifted = (value as i128 - self.min as i128).clamp(0, span);
        ((shifted * SCALE as i128 + span / 2) / span) as i64
    }
}

/// Fit-time category list of a categorical column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    /// Sorted, deduplicated
    pub categories: Vec<String>,
    pub mode: String,
}

impl CategoricalEncoder {
    fn fit<'a>(values: impl Iterator<Item = &'a str>) -> Option<Self> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for value in values {
            *counts.entry(value).or_default() += 1;
        }

        // BTreeMap iterates in sorted order, so strict `>` keeps the smallest on ties
        let mut mode: Option<(&str, usize)> = None;
        for (&category, &count) in &counts {
            if mode.map_or(true, |(_, best)| count > best) {
                mode = Some((category, count));
            }
        }
        let (mode, _) = mode?;

        Some(Self {
            categories: counts.keys().map(|c| c.to_string()).collect(),
            mode: mode.to_string(),
        })
    }

    /// Code reserved for categories outside the fit-time list
    pub fn unknown_code(&self) -> i64 {
        self.categories.len() as i64 * SCALE
    }

    pub fn encode(
        &self,
        column: &str,
        value: Option<&str>,
        policy: UnknownCategoryPolicy,
    ) -> Result<i64> {
        let value = value.unwrap_or(&self.mode);
        match self.categories.binary_search_by(|c| c.as_str().cmp(value)) {
            Ok(idx) => Ok(idx as i64 * SCALE),
            Err(_) => match policy {
                UnknownCategoryPolicy::Bucket => Ok(self.unknown_code()),
                UnknownCategoryPolicy::Reject => Err(AiCoreError::schema_mismatch(
                    column,
                    format!("category '{value}' was not seen during training"),
                )),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnTransform {
    Numeric(NumericColumnStats),
    Categorical(CategoricalEncoder),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FittedColumn {
    pub name: String,
    pub transform: ColumnTransform,
}

/// Per-column transforms in schema order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preprocessor {
    pub columns: Vec<FittedColumn>,
    pub unknown_policy: UnknownCategoryPolicy,
}

impl Preprocessor {
    /// Learn imputation values, category lists and scaling bounds
    pub fn fit(table: &FeatureTable, unknown_policy: UnknownCategoryPolicy) -> Result<Self> {
        if table.is_empty() {
            return Err(AiCoreError::NoData(
                "cannot fit preprocessing on zero rows".to_string(),
            ));
        }

        let schema = table.schema();
        let mut columns = Vec::with_capacity(schema.len());

        for (idx, spec) in schema.columns.iter().enumerate() {
            let transform = match spec.kind {
                ColumnKind::Numeric => {
                    let mut observed = Vec::with_capacity(table.len());
                    for value in table.column(idx) {
                        match value {
                            FeatureValue::Numeric(v) => observed.push(fixed::to_fixed(*v)),
                            FeatureValue::Missing => {}
                            FeatureValue::Categorical(_) => {
                                return Err(AiCoreError::schema_mismatch(
                                    spec.name.clone(),
                                    "categorical value in a numeric column",
                                ))
                            }
                        }
                    }
                    let stats = NumericColumnStats::fit(&observed)
                        .ok_or_else(|| no_observations(&spec.name))?;
                    debug!(
                        column = %spec.name,
                        observed = observed.len(),
                        mean = stats.mean,
                        min = stats.min,
                        max = stats.max,
                        "fitted numeric column"
                    );
                    ColumnTransform::Numeric(stats)
                }
                ColumnKind::Categorical => {
                    let mut observed = Vec::with_capacity(table.len());
                    for value in table.column(idx) {
                        match value {
                            FeatureValue::Categorical(s) => observed.push(s.as_str()),
                            FeatureValue::Missing => {}
                            FeatureValue::Numeric(_) => {
                                return Err(AiCoreError::schema_mismatch(
                                    spec.name.clone(),
                                    "numeric value in a categorical column",
                                ))
                            }
                        }
                    }
                    let encoder = CategoricalEncoder::fit(observed.iter().copied())
                        .ok_or_else(|| no_observations(&spec.name))?;
                    debug!(
                        column = %spec.name,
                        categories = encoder.categories.len(),
                        mode = %encoder.mode,
                        "fitted categorical column"
                    );
                    ColumnTransform::Categorical(encoder)
                }
            };

            columns.push(FittedColumn {
                name: spec.name.clone(),
                transform,
            });
        }

        Ok(Self {
            columns,
            unknown_policy,
        })
    }

    /// Fit on `table`, then transform the same rows
    pub fn fit_transform(
        table: &FeatureTable,
        unknown_policy: UnknownCategoryPolicy,
    ) -> Result<(Self, Vec<FixedRow>)> {
        let preprocessor = Self::fit(table, unknown_policy)?;
        let rows = preprocessor.transform(table)?;
        Ok((preprocessor, rows))
    }

    /// Apply the fitted transforms; never refits
    pub fn transform(&self, table: &FeatureTable) -> Result<Vec<FixedRow>> {
        self.ensure_columns(table.schema())?;
        table
            .rows()
            .iter()
            .map(|row| self.transform_row(row))
            .collect()
    }

    pub fn transform_row(&self, row: &FeatureRow) -> Result<FixedRow> {
        self.transform_row_with(row, self.unknown_policy)
    }

    /// Like `transform_row`, overriding the unknown-category policy
    pub fn transform_row_with(
        &self,
        row: &FeatureRow,
        policy: UnknownCategoryPolicy,
    ) -> Result<FixedRow> {
        if row.len() != self.columns.len() {
            return Err(AiCoreError::schema_mismatch(
                "<row>",
                format!("expected {} values, found {}", self.columns.len(), row.len()),
            ));
        }

        self.columns
            .iter()
            .zip(row)
            .map(|(column, value)| match (&column.transform, value) {
                (ColumnTransform::Numeric(stats), FeatureValue::Numeric(v)) => {
                    Ok(stats.apply(Some(fixed::to_fixed(*v))))
                }
                (ColumnTransform::Numeric(stats), FeatureValue::Missing) => Ok(stats.apply(None)),
                (ColumnTransform::Categorical(encoder), FeatureValue::Categorical(s)) => {
                    encoder.encode(&column.name, Some(s), policy)
                }
                (ColumnTransform::Categorical(encoder), FeatureValue::Missing) => {
                    encoder.encode(&column.name, None, policy)
                }
                (_, other) => Err(AiCoreError::schema_mismatch(
                    column.name.clone(),
                    format!("value {other:?} does not fit the fitted column type"),
                )),
            })
            .collect()
    }

    /// Swap the unknown-category policy, e.g. to serve stricter than trained
    pub fn with_policy(mut self, unknown_policy: UnknownCategoryPolicy) -> Self {
        self.unknown_policy = unknown_policy;
        self
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Fitted columns must line up with the schema one to one
    pub fn ensure_columns(&self, schema: &FeatureSchema) -> Result<()> {
        if schema.len() != self.columns.len() {
            return Err(AiCoreError::schema_mismatch(
                "<schema>",
                format!(
                    "preprocessor fitted on {} columns, schema declares {}",
                    self.columns.len(),
                    schema.len()
                ),
            ));
        }
        for (spec, fitted) in schema.columns.iter().zip(&self.columns) {
            let kind_matches = matches!(
                (spec.kind, &fitted.transform),
                (ColumnKind::Numeric, ColumnTransform::Numeric(_))
                    | (ColumnKind::Categorical, ColumnTransform::Categorical(_))
            );
            if spec.name != fitted.name || !kind_matches {
                return Err(AiCoreError::schema_mismatch(
                    spec.name.clone(),
                    format!("preprocessor column is '{}'", fitted.name),
                ));
            }
        }
        Ok(())
    }
}

fn no_observations(column: &str) -> AiCoreError {
    AiCoreError::NoData(format!(
        "column '{column}' has no observed values in the training data"
    ))
}
