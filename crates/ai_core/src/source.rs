//! Access to the relational data behind the predictors
//!
//! The CRUD backend is reached only through [`RecordSource`]. Its failures
//! are reported as `AiCoreError::Upstream` and passed through untouched.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{AiCoreError, Result};
use crate::label::Evaluation;
use crate::records::{AgreementRecord, JoinedRecord, LabeledRecord, Record, TaskRecord};
use crate::schema::PredictionTask;

/// Query collaborator: historical training rows and live rows by identifier
pub trait RecordSource: Send + Sync {
    /// Every row of `task` that carries a known evaluation
    fn labeled_records(&self, task: PredictionTask) -> Result<Vec<LabeledRecord>>;

    /// All joined rows for one identifier; normally exactly one
    fn records_for(&self, task: PredictionTask, id: Uuid) -> Result<Vec<Record>>;

    /// Annotation hook called after a prediction when requested
    fn record_prediction(
        &self,
        _task: PredictionTask,
        _id: Uuid,
        _label: Evaluation,
    ) -> Result<()> {
        Ok(())
    }
}

/// Serialized form of an [`InMemorySource`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceDump {
    #[serde(default)]
    pub agreements: Vec<AgreementRecord>,
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
}

/// Joined rows held in memory, loaded from a JSON dump
#[derive(Debug, Default)]
pub struct InMemorySource {
    data: RwLock<SourceDump>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dump(dump: SourceDump) -> Self {
        Self {
            data: RwLock::new(dump),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let dump: SourceDump = serde_json::from_str(json)?;
        Ok(Self::from_dump(dump))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let source = Self::from_json(&json)?;
        {
            let data = source.data.read();
            debug!(
                path = %path.display(),
                agreements = data.agreements.len(),
                tasks = data.tasks.len(),
                "loaded record dump"
            );
        }
        Ok(source)
    }

    /// Write the dump back, including any prediction annotations
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&*self.data.read())?;
        crate::store::write_atomic(path, json.as_bytes())?;
        Ok(())
    }

    pub fn push_agreement(&self, record: AgreementRecord) {
        self.data.write().agreements.push(record);
    }

    pub fn push_task(&self, record: TaskRecord) {
        self.data.write().tasks.push(record);
    }

    pub fn snapshot(&self) -> SourceDump {
        self.data.read().clone()
    }

    /// Stored prediction annotation of one row, if any
    pub fn predicted(&self, task: PredictionTask, id: Uuid) -> Option<Evaluation> {
        let data = self.data.read();
        match task {
            PredictionTask::Agreement => data
                .agreements
                .iter()
                .find(|r| r.id() == id)
                .and_then(|r| r.agreement.evaluacion_pred),
            PredictionTask::Task => data
                .tasks
                .iter()
                .find(|r| r.id() == id)
                .and_then(|r| r.task.evaluacion_pred),
        }
    }
}

fn labeled<R: JoinedRecord>(rows: &[R]) -> Vec<LabeledRecord> {
    let labeled: Vec<LabeledRecord> = rows.iter().filter_map(JoinedRecord::to_labeled).collect();
    if labeled.len() < rows.len() {
        warn!(
            task = %R::TASK,
            skipped = rows.len() - labeled.len(),
            "rows without an evaluation left out of training"
        );
    }
    labeled
}

fn matching<R: JoinedRecord>(rows: &[R], id: Uuid) -> Vec<Record> {
    rows.iter()
        .filter(|r| r.id() == id)
        .map(JoinedRecord::to_record)
        .collect()
}

impl RecordSource for InMemorySource {
    fn labeled_records(&self, task: PredictionTask) -> Result<Vec<LabeledRecord>> {
        let data = self.data.read();
        Ok(match task {
            PredictionTask::Agreement => labeled(&data.agreements),
            PredictionTask::Task => labeled(&data.tasks),
        })
    }

    fn records_for(&self, task: PredictionTask, id: Uuid) -> Result<Vec<Record>> {
        let data = self.data.read();
        Ok(match task {
            PredictionTask::Agreement => matching(&data.agreements, id),
            PredictionTask::Task => matching(&data.tasks, id),
        })
    }

    fn record_prediction(&self, task: PredictionTask, id: Uuid, label: Evaluation) -> Result<()> {
        let mut data = self.data.write();
        let mut updated = 0usize;
        match task {
            PredictionTask::Agreement => {
                for row in data.agreements.iter_mut().filter(|r| r.agreement.id == id) {
                    row.agreement.evaluacion_pred = Some(label);
                    updated += 1;
                }
            }
            PredictionTask::Task => {
                for row in data.tasks.iter_mut().filter(|r| r.task.id == id) {
                    row.task.evaluacion_pred = Some(label);
                    updated += 1;
                }
            }
        }
        if updated == 0 {
            return Err(AiCoreError::NoData(format!("no {task} with id {id}")));
        }
        Ok(())
    }
}
