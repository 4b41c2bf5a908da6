//! Error kinds surfaced by the engine

use thiserror::Error;

use crate::entry::EntryStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Entry {entry_id}: cannot {action} while {actual:?} (expected {expected:?})")]
    InvalidStateTransition {
        entry_id: u64,
        action: &'static str,
        expected: EntryStatus,
        actual: EntryStatus,
    },

    #[error("Configuration error: {}", .0.join("; "))]
    Configuration(Vec<String>),

    #[error("Indicator error: {0}")]
    Indicator(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<ta::errors::TaError> for EngineError {
    fn from(e: ta::errors::TaError) -> Self {
        EngineError::Indicator(format!("{e:?}"))
    }
}
