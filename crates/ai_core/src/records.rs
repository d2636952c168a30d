//! Joined relational records and their flat representation
//!
//! The CRUD layer owns universities, practice centers, professors, clients,
//! students, agreements and tasks. This module mirrors only the attributes
//! the predictors consume, plus the identifiers needed to look rows up.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::label::Evaluation;
use crate::schema::PredictionTask;

/// A single cell of a flat record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Number(f64),
    Text(String),
    Missing,
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Flag(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Missing)
    }
}

/// Flat field-name → value mapping produced by joining several entities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A record with its known outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRecord {
    pub record: Record,
    pub label: Evaluation,
}

/// Demographics stored on the user account behind every actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub genero: String,
    pub estado_civil: String,
    pub hijos: bool,
}

/// Origin institution of professors and students
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct University {
    pub id: Uuid,
    pub nombre: String,
    pub tec: Option<String>,
    pub transp: bool,
    pub teletrab: bool,
}

/// Destination institution of clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeCenter {
    pub id: Uuid,
    pub nombre: String,
    pub tec: Option<String>,
    pub transp: bool,
    pub experiencia: bool,
    pub teletrab: bool,
}

/// Attributes shared by professors and clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mentor {
    pub id: Uuid,
    pub person: Person,
    pub numero_empleos: u32,
    pub pos_tecnica_trabajo: Option<String>,
    pub pos_tecnica_hogar: Option<String>,
    pub trab_remoto: bool,
    pub cargo: bool,
    pub categoria_docente: String,
    pub categoria_cientifica: String,
    pub experiencia_practicas: bool,
    pub numero_est_atendidos: u32,
}

impl Mentor {
    fn write_into(&self, prefix: &str, record: &mut Record) {
        let key = |suffix: &str| format!("{prefix}_{suffix}");
        record.insert(&key("genero"), self.person.genero.as_str());
        record.insert(&key("estado_civil"), self.person.estado_civil.as_str());
        record.insert(&key("hijos"), self.person.hijos);
        record.insert(&key("numero_empleos"), self.numero_empleos);
        record.insert(&key("pos_tecnica_trabajo"), self.pos_tecnica_trabajo.clone());
        record.insert(&key("pos_tecnica_hogar"), self.pos_tecnica_hogar.clone());
        record.insert(&key("trab_remoto"), self.trab_remoto);
        record.insert(&key("cargo"), self.cargo);
        record.insert(&key("categoria_docente"), self.categoria_docente.as_str());
        record.insert(&key("categoria_cientifica"), self.categoria_cientifica.as_str());
        record.insert(&key("experiencia_practicas"), self.experiencia_practicas);
        record.insert(&key("numero_est_atendidos"), self.numero_est_atendidos);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub person: Person,
    pub trabajo: bool,
    pub becado: bool,
    pub posibilidad_economica: String,
    pub pos_tecnica_escuela: Option<String>,
    pub pos_tecnica_hogar: Option<String>,
    pub trab_remoto: bool,
}

/// Topic agreement between one professor and one client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agreement {
    pub id: Uuid,
    pub tema: String,
    pub descripcion: String,
    pub complejidad: String,
    pub actores_externos: u32,
    pub activa: bool,
    pub evaluacion: Option<Evaluation>,
    #[serde(default)]
    pub evaluacion_pred: Option<Evaluation>,
}

/// Unit of work derived from an agreement and assigned to a student
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub tipo: String,
    pub descripcion: String,
    pub fecha_inicio: NaiveDateTime,
    pub fecha_fin: NaiveDateTime,
    pub complejidad_estimada: String,
    pub participantes: u32,
    pub evaluacion: Option<Evaluation>,
    #[serde(default)]
    pub evaluacion_pred: Option<Evaluation>,
}

impl Task {
    /// Whole days between start and end; `None` when the dates are inverted
    pub fn duration_days(&self) -> Option<u32> {
        let days = (self.fecha_fin - self.fecha_inicio).num_days();
        u32::try_from(days).ok()
    }
}

/// Anything the query layer hands over as one unit of prediction
pub trait JoinedRecord {
    const TASK: PredictionTask;

    fn id(&self) -> Uuid;

    fn label(&self) -> Option<Evaluation>;

    fn to_record(&self) -> Record;

    fn to_labeled(&self) -> Option<LabeledRecord> {
        self.label().map(|label| LabeledRecord {
            record: self.to_record(),
            label,
        })
    }
}

/// Agreement joined with both actors and their institutions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreementRecord {
    pub agreement: Agreement,
    pub professor: Mentor,
    pub university: University,
    pub client: Mentor,
    pub center: PracticeCenter,
}

impl JoinedRecord for AgreementRecord {
    const TASK: PredictionTask = PredictionTask::Agreement;

    fn id(&self) -> Uuid {
        self.agreement.id
    }

    fn label(&self) -> Option<Evaluation> {
        self.agreement.evaluacion
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("conc_complejidad", self.agreement.complejidad.as_str())
            .with("conc_actores_externos", self.agreement.actores_externos);

        self.professor.write_into("prf", &mut record);
        record.insert("universidad_tec", self.university.tec.clone());
        record.insert("universidad_transp", self.university.transp);
        record.insert("universidad_teletrab", self.university.teletrab);

        self.client.write_into("cli", &mut record);
        record.insert("centro_tec", self.center.tec.clone());
        record.insert("centro_transp", self.center.transp);
        record.insert("centro_experiencia", self.center.experiencia);
        record.insert("centro_teletrab", self.center.teletrab);

        record
    }
}

/// Task joined with its student, the student's university and the agreement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task: Task,
    pub student: Student,
    pub university: University,
    pub agreement: Agreement,
}

impl JoinedRecord for TaskRecord {
    const TASK: PredictionTask = PredictionTask::Task;

    fn id(&self) -> Uuid {
        self.task.id
    }

    fn label(&self) -> Option<Evaluation> {
        self.task.evaluacion
    }

    fn to_record(&self) -> Record {
        let student = &self.student;
        Record::new()
            .with("tarea_tipo", self.task.tipo.as_str())
            .with("tarea_complejidad_estimada", self.task.complejidad_estimada.as_str())
            .with("tarea_participantes", self.task.participantes)
            .with("tarea_duracion_dias", self.task.duration_days())
            .with("est_genero", student.person.genero.as_str())
            .with("est_estado_civil", student.person.estado_civil.as_str())
            .with("est_hijos", student.person.hijos)
            .with("est_trabajo", student.trabajo)
            .with("est_becado", student.becado)
            .with("est_posibilidad_economica", student.posibilidad_economica.as_str())
            .with("est_pos_tecnica_escuela", student.pos_tecnica_escuela.clone())
            .with("est_pos_tecnica_hogar", student.pos_tecnica_hogar.clone())
            .with("est_trab_remoto", student.trab_remoto)
            .with("universidad_tec", self.university.tec.clone())
            .with("universidad_transp", self.university.transp)
            .with("universidad_teletrab", self.university.teletrab)
            .with("conc_complejidad", self.agreement.complejidad.as_str())
            .with("conc_actores_externos", self.agreement.actores_externos)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::NaiveDate;

    pub fn person(genero: &str) -> Person {
        Person {
            genero: genero.to_string(),
            estado_civil: "Casado".to_string(),
            hijos: true,
        }
    }

    pub fn mentor(categoria_docente: &str, atendidos: u32) -> Mentor {
        Mentor {
            id: Uuid::new_v4(),
            person: person("F"),
            numero_empleos: 1,
            pos_tecnica_trabajo: Some("PC".to_string()),
            pos_tecnica_hogar: Some("Laptop".to_string()),
            trab_remoto: true,
            cargo: false,
            categoria_docente: categoria_docente.to_string(),
            categoria_cientifica: "Master".to_string(),
            experiencia_practicas: true,
            numero_est_atendidos: atendidos,
        }
    }

    pub fn university() -> University {
        University {
            id: Uuid::new_v4(),
            nombre: "Universidad Central".to_string(),
            tec: Some("Alta".to_string()),
            transp: true,
            teletrab: false,
        }
    }

    pub fn center() -> PracticeCenter {
        PracticeCenter {
            id: Uuid::new_v4(),
            nombre: "Centro Norte".to_string(),
            tec: Some("Media".to_string()),
            transp: false,
            experiencia: true,
            teletrab: true,
        }
    }

    pub fn agreement(complejidad: &str, actores: u32, label: Option<Evaluation>) -> Agreement {
        Agreement {
            id: Uuid::new_v4(),
            tema: format!("Tema {actores}"),
            descripcion: "Descripcion".to_string(),
            complejidad: complejidad.to_string(),
            actores_externos: actores,
            activa: true,
            evaluacion: label,
            evaluacion_pred: None,
        }
    }

    pub fn agreement_record(
        complejidad: &str,
        actores: u32,
        label: Option<Evaluation>,
    ) -> AgreementRecord {
        AgreementRecord {
            agreement: agreement(complejidad, actores, label),
            professor: mentor("Titular", 4),
            university: university(),
            client: mentor("Ninguna", 0),
            center: center(),
        }
    }

    pub fn task_record(days: i64, label: Option<Evaluation>) -> TaskRecord {
        let start = NaiveDate::from_ymd_opt(2024, 2, 1)
            .and_then(|d| d.and_hms_opt(8, 0, 0))
            .expect("valid date");
        TaskRecord {
            task: Task {
                id: Uuid::new_v4(),
                tipo: "Desarrollo".to_string(),
                descripcion: "Modulo de reportes".to_string(),
                fecha_inicio: start,
                fecha_fin: start + chrono::Duration::days(days),
                complejidad_estimada: "Media".to_string(),
                participantes: 3,
                evaluacion: label,
                evaluacion_pred: None,
            },
            student: Student {
                id: Uuid::new_v4(),
                person: person("M"),
                trabajo: false,
                becado: true,
                posibilidad_economica: "Media".to_string(),
                pos_tecnica_escuela: Some("PC".to_string()),
                pos_tecnica_hogar: Some("Laptop".to_string()),
                trab_remoto: true,
            },
            university: university(),
            agreement: agreement("Alta", 2, None),
        }
    }
}
