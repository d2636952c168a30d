//! Training dataset loading and splitting
//!
//! Labeled tables come either from the record source or from a CSV export
//! whose header must match the task schema exactly. Splitting is a seeded
//! shuffle followed by a cut, so the same table and seed always produce the
//! same train and test rows.

use std::path::Path;

use practicas_ai_core::{
    extract_labeled, fixed, LabeledTable, PredictionTask, RecordSource, SCALE,
};
use tracing::{debug, info, warn};

use crate::deterministic::LcgRng;
use crate::errors::Result;

/// Train rows plus an optional held-out split
#[derive(Clone, Debug)]
pub struct DatasetSplit {
    pub train: LabeledTable,
    /// `None` when the table is too small to hold anything out
    pub test: Option<LabeledTable>,
}

/// Every labeled historical row of `task`, extracted against its schema
pub fn load_from_source(source: &dyn RecordSource, task: PredictionTask) -> Result<LabeledTable> {
    let records = source.labeled_records(task)?;
    debug!(%task, rows = records.len(), "labeled records fetched");
    let table = extract_labeled(&task.schema(), &records)?;
    info!(%task, rows = table.len(), "dataset extracted from record source");
    Ok(table)
}

/// Read a CSV export for `task`; the header is checked against the schema
pub fn load_csv(task: PredictionTask, path: &Path) -> Result<LabeledTable> {
    let table = LabeledTable::from_csv_path(&task.schema(), path)?;
    info!(%task, rows = table.len(), path = %path.display(), "dataset loaded from CSV");
    Ok(table)
}

/// Number of rows held out: `ceil(rows * fraction)`, computed in fixed point
pub fn test_rows(rows: usize, test_fraction: f64) -> usize {
    let fraction = fixed::to_fixed(test_fraction).clamp(0, SCALE) as u128;
    let scale = SCALE as u128;
    ((rows as u128 * fraction + scale - 1) / scale) as usize
}

/// Deterministic shuffle-and-cut into train and test
///
/// The first `test_rows` shuffled rows form the test split. When that
/// would leave no training row, everything trains and nothing is held out.
pub fn split(table: &LabeledTable, test_fraction: f64, seed: u64) -> DatasetSplit {
    let n = table.len();
    let n_test = test_rows(n, test_fraction);

    if n_test == 0 || n_test >= n {
        if n_test >= n && n > 0 {
            warn!(
                rows = n,
                test_fraction, "too few rows to hold out a test split; training on all rows"
            );
        }
        return DatasetSplit {
            train: table.clone(),
            test: None,
        };
    }

    let mut order: Vec<usize> = (0..n).collect();
    LcgRng::new(seed).shuffle(&mut order);
    let (test_idx, train_idx) = order.split_at(n_test);
    debug!(train = train_idx.len(), test = test_idx.len(), seed, "dataset split");

    DatasetSplit {
        train: table.select(train_idx),
        test: Some(table.select(test_idx)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use practicas_ai_core::{Evaluation, FeatureValue, LabeledRecord, Record};

    fn table(n: usize) -> LabeledTable {
        let schema = PredictionTask::Task.schema();
        let records: Vec<LabeledRecord> = (0..n)
            .map(|i| {
                let mut record = Record::new();
                for name in schema.column_names() {
                    record.insert(name, i as f64);
                }
                LabeledRecord {
                    record,
                    label: if i % 2 == 0 {
                        Evaluation::Positive
                    } else {
                        Evaluation::Improvable
                    },
                }
            })
            .collect();
        extract_labeled(&schema, &records).unwrap()
    }

    #[test]
    fn test_rows_rounds_up() {
        assert_eq!(test_rows(100, 0.3), 30);
        assert_eq!(test_rows(10, 0.25), 3);
        assert_eq!(test_rows(1, 0.3), 1);
        assert_eq!(test_rows(7, 0.0), 0);
    }

    #[test]
    fn test_split_sizes_and_disjointness() {
        let data = table(20);
        let split = split(&data, 0.3, 42);
        let test = split.test.unwrap();

        assert_eq!(split.train.len(), 14);
        assert_eq!(test.len(), 6);

        let participantes = data.schema().index_of("tarea_participantes").unwrap();
        let key = |row: &Vec<FeatureValue>| match &row[participantes] {
            FeatureValue::Numeric(v) => *v as i64,
            _ => -1,
        };
        let mut all: Vec<i64> = split
            .train
            .table
            .rows()
            .iter()
            .chain(test.table.rows())
            .map(key)
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_is_deterministic() {
        let data = table(30);
        let a = split(&data, 0.3, 7);
        let b = split(&data, 0.3, 7);
        assert_eq!(a.train, b.train);
        assert_eq!(a.test, b.test);

        let c = split(&data, 0.3, 8);
        assert_ne!(a.train, c.train);
    }

    #[test]
    fn test_tiny_table_trains_on_everything() {
        let data = table(1);
        let split = split(&data, 0.3, 42);
        assert_eq!(split.train.len(), 1);
        assert!(split.test.is_none());
    }
}
