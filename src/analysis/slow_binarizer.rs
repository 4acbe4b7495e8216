use crate::config::PhaseInterpolation;
use crate::constants::{FALLING_PHASE_BASE, PHASE_STEPS, RISING_PHASE_BASE, UNDEFINED_PHASE};

/// Assigns cyclic phase labels to a slow-band trace
///
/// The trace is split at the points where the sign of its gradient flips.
/// Each rising half-cycle between two such extrema is labelled 1 to 6 and
/// each falling half-cycle 7 to 12, so a full oscillation walks through
/// labels 1..=12. Samples before the first and from the last extreme on
/// are labelled 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlowPhaseBinarizer {
    interpolation: PhaseInterpolation,
}

impl SlowPhaseBinarizer {
    pub fn new(interpolation: PhaseInterpolation) -> Self {
        Self { interpolation }
    }

    pub fn binarize(&self, slow_trace: &[f64]) -> Vec<u8> {
        let indicator = rising_indicator(slow_trace);
        self.label_phases(&indicator)
    }

    /// Label a rising indicator (1 = increasing)
    pub fn label_phases(&self, indicator: &[u8]) -> Vec<u8> {
        let mut labels = vec![UNDEFINED_PHASE; indicator.len()];
        let extrema = extrema(indicator);

        for pair in extrema.windows(2) {
            let (start, end) = (pair[0], pair[1]);
            let base = if indicator[start] == 1 {
                RISING_PHASE_BASE
            } else {
                FALLING_PHASE_BASE
            };
            let segment = &mut labels[start..end];
            match self.interpolation {
                PhaseInterpolation::Stepped => label_stepped(segment, base),
                PhaseInterpolation::Linspace => label_linspace(segment, base),
            }
        }

        labels
    }
}

/// 1 where the central-difference gradient is positive, else 0
///
/// Uses one-sided differences at both ends. Traces shorter than two
/// samples have no gradient and give all zeros.
pub fn rising_indicator(trace: &[f64]) -> Vec<u8> {
    let n = trace.len();
    if n < 2 {
        return vec![0; n];
    }
    (0..n)
        .map(|i| {
            let gradient = if i == 0 {
                trace[1] - trace[0]
            } else if i == n - 1 {
                trace[n - 1] - trace[n - 2]
            } else {
                (trace[i + 1] - trace[i - 1]) / 2.0
            };
            u8::from(gradient > 0.0)
        })
        .collect()
}

/// Indices where the indicator differs from its predecessor
pub fn extrema(indicator: &[u8]) -> Vec<usize> {
    indicator
        .windows(2)
        .enumerate()
        .filter(|(_, w)| w[0] != w[1])
        .map(|(i, _)| i + 1)
        .collect()
}

fn label_stepped(segment: &mut [u8], base: u8) {
    let len = segment.len();
    for phase in 0..PHASE_STEPS {
        let lo = len * phase / PHASE_STEPS;
        let hi = len * (phase + 1) / PHASE_STEPS;
        segment[lo..hi].fill(base + phase as u8);
    }
}

fn label_linspace(segment: &mut [u8], base: u8) {
    let len = segment.len();
    for (j, label) in segment.iter_mut().enumerate() {
        *label = base + (PHASE_STEPS * j / len) as u8;
    }
}
