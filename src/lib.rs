pub mod analysis;
pub mod config;
pub mod constants;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod recording;
pub mod signal_processing;
pub mod table;

#[cfg(feature = "simulation")]
pub mod simulation;

pub use config::AnalysisConfig;
pub use error::{AnalysisError, Result};
pub use pipeline::{AnalysisPipeline, AnalysisStage};
pub use recording::Recording;
