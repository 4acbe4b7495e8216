use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{AnalysisError, Result};
use crate::recording::Recording;

/// Synthetic calcium trace of one cell
///
/// The trace is `baseline + slow oscillation + fast oscillation + noise`.
/// The fast component is switched on at `fast_onset_frame` and off at
/// `fast_offset_frame`, mimicking a cell that responds to stimulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalciumCellSpec {
    pub baseline: f64,
    pub slow_hz: f64,
    pub slow_amplitude: f64,
    pub fast_hz: f64,
    pub fast_amplitude: f64,
    pub fast_onset_frame: usize,
    pub fast_offset_frame: Option<usize>,
    pub noise_std: f64,
    /// Phase offset of both oscillations in radians
    pub phase: f64,
}

impl Default for CalciumCellSpec {
    fn default() -> Self {
        Self {
            baseline: 1.0,
            slow_hz: 0.003,
            slow_amplitude: 1.0,
            fast_hz: 0.2,
            fast_amplitude: 1.0,
            fast_onset_frame: 0,
            fast_offset_frame: None,
            noise_std: 0.05,
            phase: 0.0,
        }
    }
}

impl CalciumCellSpec {
    /// A cell with only the slow component and noise
    pub fn silent() -> Self {
        Self {
            fast_amplitude: 0.0,
            ..Self::default()
        }
    }

    pub fn with_slow(mut self, hz: f64, amplitude: f64) -> Self {
        self.slow_hz = hz;
        self.slow_amplitude = amplitude;
        self
    }

    pub fn with_fast(mut self, hz: f64, amplitude: f64) -> Self {
        self.fast_hz = hz;
        self.fast_amplitude = amplitude;
        self
    }

    pub fn with_fast_window(mut self, onset_frame: usize, offset_frame: Option<usize>) -> Self {
        self.fast_onset_frame = onset_frame;
        self.fast_offset_frame = offset_frame;
        self
    }

    pub fn with_noise(mut self, std: f64) -> Self {
        self.noise_std = std;
        self
    }

    pub fn with_phase(mut self, phase: f64) -> Self {
        self.phase = phase;
        self
    }

    fn fast_active(&self, frame: usize) -> bool {
        frame >= self.fast_onset_frame && self.fast_offset_frame.is_none_or(|end| frame < end)
    }

    /// Generate `samples` samples at `sampling_hz`
    ///
    /// # Errors
    /// Returns `AnalysisError::InvalidConfiguration` for a negative or
    /// non-finite noise level.
    pub fn generate(&self, samples: usize, sampling_hz: f64, seed: u64) -> Result<Vec<f64>> {
        let noise = Normal::new(0.0, self.noise_std).map_err(|e| {
            AnalysisError::InvalidConfiguration(format!("noise std {}: {}", self.noise_std, e))
        })?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        Ok((0..samples)
            .map(|i| {
                let t = i as f64 / sampling_hz;
                let slow = self.slow_amplitude * (2.0 * PI * self.slow_hz * t + self.phase).sin();
                let fast = if self.fast_active(i) {
                    self.fast_amplitude * (2.0 * PI * self.fast_hz * t + self.phase).sin()
                } else {
                    0.0
                };
                self.baseline + slow + fast + noise.sample(&mut rng)
            })
            .collect())
    }
}

/// Build a recording from cell specs; cell `i` uses noise seed `seed + i`
pub fn generate_recording(
    cells: &[CalciumCellSpec],
    samples: usize,
    sampling_hz: f64,
    seed: u64,
) -> Result<Recording> {
    let signal = cells
        .iter()
        .enumerate()
        .map(|(i, cell)| cell.generate(samples, sampling_hz, seed.wrapping_add(i as u64)))
        .collect::<Result<Vec<_>>>()?;
    Recording::new(signal, sampling_hz)
}

/// Cell positions on a square grid with `spacing` between neighbours
pub fn grid_positions(cells: usize, spacing: f64) -> Vec<[f64; 2]> {
    let side = (cells as f64).sqrt().ceil().max(1.0) as usize;
    (0..cells)
        .map(|i| [(i % side) as f64 * spacing, (i / side) as f64 * spacing])
        .collect()
}
