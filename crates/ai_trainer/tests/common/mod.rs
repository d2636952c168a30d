//! Shared fixtures for trainer integration tests
#![allow(dead_code)]

use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::Duration;

use chrono::NaiveDate;
use parking_lot::Mutex;
use practicas_ai_core::records::{
    Agreement, AgreementRecord, Mentor, Person, PracticeCenter, Student, Task, TaskRecord,
    University,
};
use practicas_ai_core::{
    Evaluation, ForestParams, InMemorySource, LabeledRecord, PredictionTask, Record, RecordSource,
};
use practicas_ai_trainer::TrainingParams;
use uuid::Uuid;

const COMPLEXITIES: [&str; 3] = ["Alta", "Media", "Baja"];

fn person(genero: &str, hijos: bool) -> Person {
    Person {
        genero: genero.to_string(),
        estado_civil: if hijos { "Casado" } else { "Soltero" }.to_string(),
        hijos,
    }
}

fn mentor(i: usize, categoria_docente: &str) -> Mentor {
    Mentor {
        id: Uuid::new_v4(),
        person: person(if i % 2 == 0 { "F" } else { "M" }, i % 3 == 0),
        numero_empleos: (i % 4) as u32 + 1,
        pos_tecnica_trabajo: Some("PC".to_string()),
        pos_tecnica_hogar: Some(if i % 5 == 0 { "Ninguna" } else { "Laptop" }.to_string()),
        trab_remoto: i % 2 == 1,
        cargo: i % 7 == 0,
        categoria_docente: categoria_docente.to_string(),
        categoria_cientifica: "Master".to_string(),
        experiencia_practicas: i % 3 != 1,
        numero_est_atendidos: (i % 6) as u32,
    }
}

fn university() -> University {
    University {
        id: Uuid::new_v4(),
        nombre: "Universidad Central".to_string(),
        tec: Some("Alta".to_string()),
        transp: true,
        teletrab: false,
    }
}

fn center(i: usize) -> PracticeCenter {
    PracticeCenter {
        id: Uuid::new_v4(),
        nombre: format!("Centro {i}"),
        tec: Some(if i % 2 == 0 { "Media" } else { "Alta" }.to_string()),
        transp: i % 3 == 0,
        experiencia: true,
        teletrab: i % 4 == 0,
    }
}

/// Outcome driven mostly by complexity, with a few exceptions
fn outcome(complejidad: &str, i: usize) -> Evaluation {
    let positive = match complejidad {
        "Baja" => true,
        "Media" => i % 4 != 0,
        _ => i % 5 == 0,
    };
    if positive {
        Evaluation::Positive
    } else {
        Evaluation::Improvable
    }
}

pub fn agreement_record(i: usize, complejidad: &str, label: Option<Evaluation>) -> AgreementRecord {
    AgreementRecord {
        agreement: Agreement {
            id: Uuid::new_v4(),
            tema: format!("Tema {i}"),
            descripcion: "Descripcion".to_string(),
            complejidad: complejidad.to_string(),
            actores_externos: (i % 8) as u32,
            activa: true,
            evaluacion: label,
            evaluacion_pred: None,
        },
        professor: mentor(i, "Titular"),
        university: university(),
        client: mentor(i + 1, if i % 2 == 0 { "Auxiliar" } else { "Ninguna" }),
        center: center(i),
    }
}

/// `n` labeled historical agreements
pub fn agreements(n: usize) -> Vec<AgreementRecord> {
    (0..n)
        .map(|i| {
            let complejidad = COMPLEXITIES[i % 3];
            agreement_record(i, complejidad, Some(outcome(complejidad, i)))
        })
        .collect()
}

pub fn task_record(i: usize, label: Option<Evaluation>) -> TaskRecord {
    let start = NaiveDate::from_ymd_opt(2024, 3, 1)
        .and_then(|d| d.and_hms_opt(8, 0, 0))
        .expect("valid date");
    TaskRecord {
        task: Task {
            id: Uuid::new_v4(),
            tipo: if i % 2 == 0 { "Desarrollo" } else { "Documentacion" }.to_string(),
            descripcion: "Tarea".to_string(),
            fecha_inicio: start,
            fecha_fin: start + chrono::Duration::days((i % 30) as i64),
            complejidad_estimada: COMPLEXITIES[i % 3].to_string(),
            participantes: (i % 4) as u32 + 1,
            evaluacion: label,
            evaluacion_pred: None,
        },
        student: Student {
            id: Uuid::new_v4(),
            person: person("M", false),
            trabajo: i % 2 == 0,
            becado: i % 3 == 0,
            posibilidad_economica: "Media".to_string(),
            pos_tecnica_escuela: Some("PC".to_string()),
            pos_tecnica_hogar: Some("Laptop".to_string()),
            trab_remoto: false,
        },
        university: university(),
        agreement: agreement_record(i, COMPLEXITIES[i % 3], None).agreement,
    }
}

/// Source holding 100 labeled agreements and 60 labeled tasks
pub fn populated_source() -> InMemorySource {
    let source = InMemorySource::new();
    for row in agreements(100) {
        source.push_agreement(row);
    }
    for i in 0..60 {
        let label = if i % 30 < 15 {
            Evaluation::Positive
        } else {
            Evaluation::Improvable
        };
        source.push_task(task_record(i, Some(label)));
    }
    source
}

/// Small, fast forest settings
pub fn quick_params(task: PredictionTask) -> TrainingParams {
    TrainingParams::new(task).with_forest(ForestParams {
        n_trees: 15,
        max_depth: 6,
        ..ForestParams::default()
    })
}

/// Record source whose `labeled_records` blocks until released
pub struct GatedSource {
    inner: InMemorySource,
    gate: Mutex<Receiver<()>>,
}

impl GatedSource {
    pub fn new(inner: InMemorySource) -> (Self, Sender<()>) {
        let (tx, rx) = channel();
        (
            Self {
                inner,
                gate: Mutex::new(rx),
            },
            tx,
        )
    }
}

impl RecordSource for GatedSource {
    fn labeled_records(
        &self,
        task: PredictionTask,
    ) -> practicas_ai_core::Result<Vec<LabeledRecord>> {
        // a dropped sender also releases the gate
        let _ = self.gate.lock().recv_timeout(Duration::from_secs(10));
        self.inner.labeled_records(task)
    }

    fn records_for(&self, task: PredictionTask, id: Uuid) -> practicas_ai_core::Result<Vec<Record>> {
        self.inner.records_for(task, id)
    }
}
