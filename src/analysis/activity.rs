use serde::Serialize;

use crate::config::ActivityFitConfig;
use crate::constants::{ACTIVITY_LOWER_FRACTION, ACTIVITY_UPPER_FRACTION};
use crate::error::{AnalysisError, Result};
use crate::signal_processing::{CancelToken, DifferentialEvolution};

/// Interval of sustained spiking, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ActivityWindow {
    pub onset: f64,
    pub offset: f64,
    /// Fitted box height
    pub amplitude: f64,
}

/// Search box for `(amplitude, onset, offset)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchBounds {
    pub amplitude: (f64, f64),
    pub onset: (f64, f64),
    pub offset: (f64, f64),
}

/// Fits a rectangular window `a * (H(t - onset) - H(t - offset))` to a
/// spike train
///
/// The fit minimizes the squared residual against the 0/1 train over all
/// sample times `t = i / fs`. The onset and offset search ranges are seeded
/// from the times at which the cumulative spike count passes 10% and 90%
/// of its total.
#[derive(Debug, Clone)]
pub struct ActivityWindowEstimator {
    sampling_hz: f64,
    fit: ActivityFitConfig,
}

impl ActivityWindowEstimator {
    pub fn new(sampling_hz: f64, fit: &ActivityFitConfig) -> Self {
        Self {
            sampling_hz,
            fit: fit.clone(),
        }
    }

    /// Search ranges derived from the cumulative spike count
    ///
    /// Returns `None` for an empty train or one without spikes.
    pub fn search_bounds(&self, train: &[u8]) -> Option<SearchBounds> {
        let n = train.len();
        let total: usize = train.iter().map(|&s| s as usize).sum();
        if n == 0 || total == 0 {
            return None;
        }

        let lower_level = ACTIVITY_LOWER_FRACTION * total as f64;
        let upper_level = ACTIVITY_UPPER_FRACTION * total as f64;
        let mut below = 0usize;
        let mut above = 0usize;
        let mut running = 0usize;
        for &s in train {
            running += s as usize;
            if (running as f64) < lower_level {
                below += 1;
            }
            if (running as f64) > upper_level {
                above += 1;
            }
        }

        let lower = below as f64 / self.sampling_hz;
        let upper = (n - above) as f64 / self.sampling_hz;
        let t_max = (n - 1) as f64 / self.sampling_hz;

        Some(SearchBounds {
            amplitude: (0.0, self.fit.amplitude_max),
            onset: (0.0, (lower + 1.0).min(t_max)),
            offset: ((upper - 1.0).min(t_max).max(0.0), t_max),
        })
    }

    /// Fit the activity window of one spike train
    ///
    /// # Errors
    /// Returns `AnalysisError::FitFailed` for a train without spikes, on
    /// cancellation, or when the optimizer does not converge within its
    /// generation budget.
    pub fn estimate(&self, train: &[u8], seed: u64, cancel: &CancelToken) -> Result<ActivityWindow> {
        let bounds = self
            .search_bounds(train)
            .ok_or_else(|| AnalysisError::FitFailed("spike train has no spikes".to_string()))?;

        let objective = BoxObjective::new(train, self.sampling_hz);
        let optimizer = DifferentialEvolution::new(
            vec![bounds.amplitude, bounds.onset, bounds.offset],
            self.fit.population_factor,
            self.fit.max_generations,
            self.fit.tolerance,
            seed,
        );
        let minimum = optimizer.minimize(|p| objective.energy(p[0], p[1], p[2]), cancel)?;

        log::debug!(
            "Activity window {:.1}-{:.1} s (amplitude {:.3}) after {} generations",
            minimum.x[1],
            minimum.x[2],
            minimum.x[0],
            minimum.generations
        );

        Ok(ActivityWindow {
            amplitude: minimum.x[0],
            onset: minimum.x[1],
            offset: minimum.x[2],
        })
    }
}

/// Squared residual of a box against a spike train in O(1) per evaluation
struct BoxObjective {
    sampling_hz: f64,
    /// `prefix[k]` = spikes among the first `k` samples
    prefix: Vec<usize>,
}

impl BoxObjective {
    fn new(train: &[u8], sampling_hz: f64) -> Self {
        let mut prefix = Vec::with_capacity(train.len() + 1);
        prefix.push(0);
        let mut running = 0;
        for &s in train {
            running += s as usize;
            prefix.push(running);
        }
        Self {
            sampling_hz,
            prefix,
        }
    }

    fn len(&self) -> usize {
        self.prefix.len() - 1
    }

    /// Number of samples with `i / fs <= t`
    fn samples_through(&self, t: f64) -> usize {
        let k = (t * self.sampling_hz).floor() + 1.0;
        k.clamp(0.0, self.len() as f64) as usize
    }

    /// `sum((box(t_i) - y_i)^2)` for the 0/1 train `y`
    fn energy(&self, amplitude: f64, onset: f64, offset: f64) -> f64 {
        let total = self.prefix[self.len()] as f64;
        // Samples strictly after `lo` and up to `hi` carry `sign * amplitude`
        let (lo, hi, sign) = if onset <= offset {
            (onset, offset, 1.0)
        } else {
            (offset, onset, -1.0)
        };
        let first = self.samples_through(lo);
        let last = self.samples_through(hi);
        let count = (last - first) as f64;
        let spikes = (self.prefix[last] - self.prefix[first]) as f64;
        let height = sign * amplitude;
        total - 2.0 * height * spikes + height * height * count
    }
}
