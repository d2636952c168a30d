//! Artifact store behaviour through the public API

use std::fs;
use std::sync::Arc;
use std::thread;

use practicas_ai_core::{
    extract, ArtifactStore, ColumnKind, ErrorKind, FileArtifactStore, FittedPipeline,
    ForestParams, ModelArtifact, Node, PredictionTask, Preprocessor, RandomForest, Record,
    Tree, TrainingSummary, UnknownCategoryPolicy, SCALE,
};
use tempfile::TempDir;

/// Agreement rows that differ only in complexity and external actors
fn records() -> Vec<Record> {
    let schema = PredictionTask::Agreement.schema();
    ["Alta", "Baja", "Media", "Alta"]
        .iter()
        .enumerate()
        .map(|(i, complejidad)| {
            let mut record = Record::new();
            for column in &schema.columns {
                match column.kind {
                    ColumnKind::Numeric => record.insert(&column.name, i as f64),
                    ColumnKind::Categorical => record.insert(&column.name, "si"),
                }
            }
            record.insert("conc_complejidad", *complejidad);
            record
        })
        .collect()
}

/// One-tree pipeline: `Alta` (code 0) leans positive, the rest do not
fn artifact(positive_leaf: i64) -> ModelArtifact {
    let schema = PredictionTask::Agreement.schema();
    let table = extract(&schema, &records()).unwrap();
    let preprocessor = Preprocessor::fit(&table, UnknownCategoryPolicy::Bucket).unwrap();
    let complejidad = schema.index_of("conc_complejidad").unwrap();

    let tree = Tree::new(vec![
        Node::Split {
            feature: complejidad,
            threshold: SCALE / 2,
            left: 1,
            right: 2,
        },
        Node::Leaf {
            value: positive_leaf,
            samples: 2,
        },
        Node::Leaf {
            value: 100_000,
            samples: 2,
        },
    ]);
    let forest = RandomForest::new(schema.len(), vec![tree]);
    let pipeline =
        FittedPipeline::new(schema, preprocessor, forest, ForestParams::default()).unwrap();
    ModelArtifact::new(
        pipeline,
        TrainingSummary {
            train_rows: 4,
            test_rows: 0,
            class_counts: [2, 2],
            metrics: None,
        },
    )
    .unwrap()
}

#[test]
fn test_pipeline_scores_by_complexity() {
    let artifact = artifact(800_000);
    let table = extract(&PredictionTask::Agreement.schema(), &records()).unwrap();
    let scores = artifact.pipeline.score_table(&table).unwrap();

    assert_eq!(scores[0].positive_fixed, 800_000);
    assert_eq!(scores[1].positive_fixed, 100_000);
    for s in &scores {
        assert!((s.prob_class_0 + s.prob_class_1 - 1.0).abs() < 1e-9);
    }
}

#[test]
fn test_readers_never_see_partial_artifacts() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileArtifactStore::open(dir.path()).unwrap());
    let a = artifact(800_000);
    let b = artifact(700_000);
    store.put(PredictionTask::Agreement, &a).unwrap();

    thread::scope(|scope| {
        let writer_store = Arc::clone(&store);
        let (a_ref, b_ref) = (&a, &b);
        scope.spawn(move || {
            for i in 0..20 {
                let next = if i % 2 == 0 { b_ref } else { a_ref };
                writer_store.put(PredictionTask::Agreement, next).unwrap();
            }
        });

        for _ in 0..2 {
            let reader = FileArtifactStore::open(dir.path()).unwrap();
            let (ha, hb) = (a.hash.clone(), b.hash.clone());
            scope.spawn(move || {
                for _ in 0..50 {
                    let current = reader.get(PredictionTask::Agreement).unwrap();
                    assert!(current.hash == ha || current.hash == hb);
                }
            });
        }
    });
}

#[test]
fn test_concurrent_writers_to_one_task() {
    let dir = TempDir::new().unwrap();
    let store = FileArtifactStore::open(dir.path()).unwrap();
    let a = artifact(800_000);
    let b = artifact(700_000);

    for _ in 0..50 {
        thread::scope(|scope| {
            let first = scope.spawn(|| store.put(PredictionTask::Agreement, &a));
            let second = scope.spawn(|| store.put(PredictionTask::Agreement, &b));
            first.join().unwrap().unwrap();
            second.join().unwrap().unwrap();
        });

        // the cached artifact is the one on disk
        let cached = store.get(PredictionTask::Agreement).unwrap();
        let on_disk = FileArtifactStore::open(dir.path())
            .unwrap()
            .get(PredictionTask::Agreement)
            .unwrap();
        assert_eq!(cached.hash, on_disk.hash);
    }

    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with('.'))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[test]
fn test_tampered_artifact_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = FileArtifactStore::open(dir.path()).unwrap();
    store.put(PredictionTask::Agreement, &artifact(800_000)).unwrap();

    let path = store.artifact_path(PredictionTask::Agreement);
    let json = fs::read_to_string(&path).unwrap();
    fs::write(&path, json.replace("800000", "900000")).unwrap();

    let fresh = FileArtifactStore::open(dir.path()).unwrap();
    let err = fresh.get(PredictionTask::Agreement).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArtifact);
}

#[test]
fn test_store_is_per_task() {
    let dir = TempDir::new().unwrap();
    let store = FileArtifactStore::open(dir.path()).unwrap();
    store.put(PredictionTask::Agreement, &artifact(800_000)).unwrap();

    assert!(store.contains(PredictionTask::Agreement));
    let err = store.get(PredictionTask::Task).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArtifactNotFound);

    let err = store
        .put(PredictionTask::Task, &artifact(800_000))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}
