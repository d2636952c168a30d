//! Static feature schemas for the two prediction tasks
//!
//! A schema is the ordered, typed list of columns a model consumes. It is
//! declared once per task and is the single source of truth for the CSV
//! export header, the feature extractor, and the fitted artifact. The
//! fingerprint baked into an artifact is compared against the live schema
//! before every prediction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{AiCoreError, Result};
use crate::serde_canon::hash_canonical_hex;

/// Bump when a column is added, removed, renamed, retyped or reordered.
pub const AGREEMENT_SCHEMA_VERSION: u32 = 1;
pub const TASK_SCHEMA_VERSION: u32 = 1;

pub const AGREEMENT_LABEL: &str = "conc_evaluacion";
pub const TASK_LABEL: &str = "tarea_evaluacion";

use self::ColumnKind::{Categorical, Numeric};

const AGREEMENT_COLUMNS: &[(&str, ColumnKind)] = &[
    ("conc_complejidad", Categorical),
    ("conc_actores_externos", Numeric),
    ("prf_genero", Categorical),
    ("prf_estado_civil", Categorical),
    ("prf_hijos", Categorical),
    ("prf_numero_empleos", Numeric),
    ("prf_pos_tecnica_trabajo", Categorical),
    ("prf_pos_tecnica_hogar", Categorical),
    ("prf_trab_remoto", Categorical),
    ("prf_cargo", Categorical),
    ("prf_categoria_docente", Categorical),
    ("prf_categoria_cientifica", Categorical),
    ("prf_experiencia_practicas", Categorical),
    ("prf_numero_est_atendidos", Numeric),
    ("universidad_tec", Categorical),
    ("universidad_transp", Categorical),
    ("universidad_teletrab", Categorical),
    ("cli_genero", Categorical),
    ("cli_estado_civil", Categorical),
    ("cli_hijos", Categorical),
    ("cli_numero_empleos", Numeric),
    ("cli_pos_tecnica_trabajo", Categorical),
    ("cli_pos_tecnica_hogar", Categorical),
    ("cli_cargo", Categorical),
    ("cli_trab_remoto", Categorical),
    ("cli_categoria_docente", Categorical),
    ("cli_categoria_cientifica", Categorical),
    ("cli_experiencia_practicas", Categorical),
    ("cli_numero_est_atendidos", Numeric),
    ("centro_tec", Categorical),
    ("centro_transp", Categorical),
    ("centro_experiencia", Categorical),
    ("centro_teletrab", Categorical),
];

const TASK_COLUMNS: &[(&str, ColumnKind)] = &[
    ("tarea_tipo", Categorical),
    ("tarea_complejidad_estimada", Categorical),
    ("tarea_participantes", Numeric),
    ("tarea_duracion_dias", Numeric),
    ("est_genero", Categorical),
    ("est_estado_civil", Categorical),
    ("est_hijos", Categorical),
    ("est_trabajo", Categorical),
    ("est_becado", Categorical),
    ("est_posibilidad_economica", Categorical),
    ("est_pos_tecnica_escuela", Categorical),
    ("est_pos_tecnica_hogar", Categorical),
    ("est_trab_remoto", Categorical),
    ("universidad_tec", Categorical),
    ("universidad_transp", Categorical),
    ("universidad_teletrab", Categorical),
    ("conc_complejidad", Categorical),
    ("conc_actores_externos", Numeric),
];

/// Which outcome a model predicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionTask {
    /// Evaluation of a topic agreement (concertación)
    Agreement,
    /// Evaluation of a task assigned to a student
    Task,
}

impl PredictionTask {
    pub const ALL: [PredictionTask; 2] = [PredictionTask::Agreement, PredictionTask::Task];

    /// Name used for artifact files and logs
    pub fn name(&self) -> &'static str {
        match self {
            PredictionTask::Agreement => "agreement",
            PredictionTask::Task => "task",
        }
    }

    /// The live feature schema for this task
    pub fn schema(&self) -> FeatureSchema {
        match self {
            PredictionTask::Agreement => FeatureSchema::from_static(
                *self,
                AGREEMENT_SCHEMA_VERSION,
                AGREEMENT_COLUMNS,
                AGREEMENT_LABEL,
            ),
            PredictionTask::Task => {
                FeatureSchema::from_static(*self, TASK_SCHEMA_VERSION, TASK_COLUMNS, TASK_LABEL)
            }
        }
    }
}

impl fmt::Display for PredictionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PredictionTask {
    type Err = AiCoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "agreement" | "concertacion" => Ok(PredictionTask::Agreement),
            "task" | "tarea" => Ok(PredictionTask::Task),
            other => Err(AiCoreError::InvalidInput(format!(
                "unknown prediction task '{other}' (expected 'agreement' or 'task')"
            ))),
        }
    }
}

/// Column typing declared by the schema, never inferred from data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Numeric => f.write_str("numeric"),
            ColumnKind::Categorical => f.write_str("categorical"),
        }
    }
}

/// A single named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

/// Ordered feature schema for one prediction task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub task: PredictionTask,
    pub version: u32,
    pub columns: Vec<ColumnSpec>,
    /// Label column name, never part of `columns`
    pub label: String,
}

impl FeatureSchema {
    fn from_static(
        task: PredictionTask,
        version: u32,
        columns: &[(&str, ColumnKind)],
        label: &str,
    ) -> Self {
        Self {
            task,
            version,
            columns: columns
                .iter()
                .map(|(name, kind)| ColumnSpec {
                    name: (*name).to_string(),
                    kind: *kind,
                })
                .collect(),
            label: label.to_string(),
        }
    }

    /// Build an ad-hoc schema (used by tests and tooling)
    pub fn new(
        task: PredictionTask,
        version: u32,
        columns: Vec<ColumnSpec>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            task,
            version,
            columns,
            label: label.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// CSV header: feature columns in schema order followed by the label
    pub fn export_header(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| c.name.clone())
            .chain(std::iter::once(self.label.clone()))
            .collect()
    }

    /// Blake3 fingerprint over task, version, columns and label
    pub fn fingerprint(&self) -> Result<String> {
        Ok(hash_canonical_hex(self)?)
    }

    /// Verify that `other` declares exactly the same columns in the same order
    pub fn ensure_matches(&self, other: &FeatureSchema) -> Result<()> {
        if self.task != other.task {
            return Err(AiCoreError::schema_mismatch(
                "<schema>",
                format!("artifact was trained for task '{}', not '{}'", self.task, other.task),
            ));
        }

        for (idx, (expected, actual)) in self.columns.iter().zip(other.columns.iter()).enumerate()
        {
            if expected.name != actual.name {
                return Err(AiCoreError::schema_mismatch(
                    actual.name.clone(),
                    format!("position {idx} expected column '{}'", expected.name),
                ));
            }
            if expected.kind != actual.kind {
                return Err(AiCoreError::schema_mismatch(
                    actual.name.clone(),
                    format!("expected {} column, found {}", expected.kind, actual.kind),
                ));
            }
        }

        if self.columns.len() != other.columns.len() {
            return Err(AiCoreError::schema_mismatch(
                "<schema>",
                format!(
                    "expected {} feature columns, found {}",
                    self.columns.len(),
                    other.columns.len()
                ),
            ));
        }

        if self.label != other.label || self.version != other.version {
            return Err(AiCoreError::schema_mismatch(
                "<schema>",
                format!(
                    "expected schema v{} labelled '{}', found v{} labelled '{}'",
                    self.version, self.label, other.version, other.label
                ),
            ));
        }

        Ok(())
    }

    /// Verify a CSV export header against the schema
    pub fn check_header(&self, header: &[String]) -> Result<()> {
        let expected = self.export_header();
        for (idx, (want, got)) in expected.iter().zip(header.iter()).enumerate() {
            if want != got.trim() {
                return Err(AiCoreError::schema_mismatch(
                    got.trim().to_string(),
                    format!("header position {idx} expected '{want}'"),
                ));
            }
        }
        if expected.len() != header.len() {
            return Err(AiCoreError::schema_mismatch(
                "<header>",
                format!("expected {} columns, found {}", expected.len(), header.len()),
            ));
        }
        Ok(())
    }
}
