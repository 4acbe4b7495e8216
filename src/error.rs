use crate::pipeline::AnalysisStage;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Stage {required:?} has not been computed (pipeline is at {current:?})")]
    StagePrecondition {
        required: AnalysisStage,
        current: AnalysisStage,
    },

    #[error("Cell index {index} out of range (recording has {count} cells)")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Invalid band {low}-{high} Hz (Nyquist frequency is {nyquist} Hz)")]
    InvalidBand { low: f64, high: f64, nyquist: f64 },

    #[error("Filter design failed: {0}")]
    FilterDesign(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("No inflection point found in the amplitude distribution")]
    NoInflectionFound,

    #[error("Activity window fit failed: {0}")]
    FitFailed(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl From<std::io::Error> for AnalysisError {
    fn from(err: std::io::Error) -> Self {
        AnalysisError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
