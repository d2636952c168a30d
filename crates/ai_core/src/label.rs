//! Outcome labels
//!
//! The model is binary. Class indices follow the lexicographic order of the
//! stored label strings: `Mejorable` is class 0, `Positiva` is class 1.
//! `Negativa` appears in early schema revisions only and is rejected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{AiCoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Evaluation {
    #[serde(rename = "Mejorable")]
    Improvable,
    #[serde(rename = "Positiva")]
    Positive,
}

impl Evaluation {
    pub const CLASSES: [Evaluation; 2] = [Evaluation::Improvable, Evaluation::Positive];

    pub fn as_str(&self) -> &'static str {
        match self {
            Evaluation::Improvable => "Mejorable",
            Evaluation::Positive => "Positiva",
        }
    }

    pub fn class_index(&self) -> usize {
        match self {
            Evaluation::Improvable => 0,
            Evaluation::Positive => 1,
        }
    }

    pub fn from_class_index(idx: usize) -> Option<Self> {
        Self::CLASSES.get(idx).copied()
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Evaluation {
    type Err = AiCoreError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "positiva" | "positive" => Ok(Evaluation::Positive),
            "mejorable" | "improvable" => Ok(Evaluation::Improvable),
            "negativa" | "ngativa" | "negative" => Err(AiCoreError::InvalidInput(format!(
                "label '{}' belongs to a retired three-class scheme; only Positiva/Mejorable are supported",
                s.trim()
            ))),
            "" => Err(AiCoreError::InvalidInput("missing label".to_string())),
            _ => Err(AiCoreError::InvalidInput(format!("unknown label '{}'", s.trim()))),
        }
    }
}
