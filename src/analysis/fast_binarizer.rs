use crate::analysis::distribution::CellDistribution;
use crate::config::SpikeThresholdRule;
use crate::error::{AnalysisError, Result};

/// Binary spike train of one cell
#[derive(Debug, Clone, PartialEq)]
pub struct SpikeTrain {
    /// 1 where the fast trace exceeds the threshold
    pub train: Vec<u8>,
    pub spike_count: usize,
    /// Threshold the train was cut at; `None` if the cell was unscored
    pub threshold: Option<f64>,
}

/// Threshold a fast-band trace into a 0/1 spike train
///
/// A sample is a spike when it is strictly above the threshold. The
/// threshold comes from the cell's distribution: either the inflection
/// root of its model or a multiple of the pre-stimulation noise spread.
#[derive(Debug, Clone, Copy)]
pub struct FastSpikeBinarizer {
    rule: SpikeThresholdRule,
    spike_fraction: f64,
}

impl FastSpikeBinarizer {
    pub fn new(rule: SpikeThresholdRule, spike_fraction: f64) -> Self {
        Self {
            rule,
            spike_fraction,
        }
    }

    /// Threshold for one cell
    ///
    /// # Errors
    /// Returns the stored model failure when the inflection rule is used on
    /// an unscored cell, and `AnalysisError::InsufficientData` when the
    /// noise rule is used without a stimulation frame.
    pub fn threshold(&self, distribution: &CellDistribution) -> Result<f64> {
        match self.rule {
            SpikeThresholdRule::Inflection => distribution
                .model
                .as_ref()
                .map(|m| m.p_root)
                .map_err(Clone::clone),
            SpikeThresholdRule::NoiseStd { multiplier } => distribution
                .noise()
                .map(|noise| multiplier * noise.std)
                .ok_or_else(|| {
                    AnalysisError::InsufficientData("no pre-stimulation window".to_string())
                }),
        }
    }

    /// Binarize one trace
    ///
    /// An unscored cell yields an all-zero train with no threshold; the
    /// returned error explains why.
    pub fn binarize(
        &self,
        fast_trace: &[f64],
        distribution: &CellDistribution,
    ) -> (SpikeTrain, Option<AnalysisError>) {
        match self.threshold(distribution) {
            Ok(threshold) => (threshold_trace(fast_trace, threshold), None),
            Err(err) => (
                SpikeTrain {
                    train: vec![0; fast_trace.len()],
                    spike_count: 0,
                    threshold: None,
                },
                Some(err),
            ),
        }
    }

    /// Whether the train has enough spikes to keep the cell
    pub fn passes(&self, spikes: &SpikeTrain) -> bool {
        spikes.threshold.is_some()
            && spikes.spike_count as f64 >= self.spike_fraction * spikes.train.len() as f64
    }
}

/// Cut `trace` at `threshold`
pub fn threshold_trace(trace: &[f64], threshold: f64) -> SpikeTrain {
    let train: Vec<u8> = trace.iter().map(|&x| u8::from(x > threshold)).collect();
    let spike_count = train.iter().filter(|&&s| s == 1).count();
    SpikeTrain {
        train,
        spike_count,
        threshold: Some(threshold),
    }
}
