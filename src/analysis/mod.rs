//! Per-cell analysis stages.
//!
//! Each stage works on one cell's traces and holds no state between cells,
//! so the pipeline can run them in parallel.

pub mod activity;
pub mod distribution;
pub mod fast_binarizer;
pub mod quality;
pub mod slow_binarizer;

pub use activity::{ActivityWindow, ActivityWindowEstimator, SearchBounds};
pub use distribution::{
    CellDistribution, DistributionModel, NoiseDistributionModel, StimulationWindows, describe,
};
pub use fast_binarizer::{FastSpikeBinarizer, SpikeTrain};
pub use quality::{
    CombinedStrategy, DistributionScoreStrategy, ExclusionStrategy, QualityClassifier,
    SkewStdStrategy, create_strategy,
};
pub use slow_binarizer::SlowPhaseBinarizer;
