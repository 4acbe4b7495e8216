//! Numeric constants shared by the analysis stages
//!
//! Values that are fixed by the analysis protocol rather than exposed as
//! configuration.

/// Number of histogram bins used for the fast-band amplitude distribution.
pub const DISTRIBUTION_BINS: usize = 50;

/// Histogram bins for the pre-stimulation (noise) window.
pub const NOISE_HISTOGRAM_BINS: usize = 20;

/// Histogram bins for the post-stimulation (spikes) window.
pub const SPIKES_HISTOGRAM_BINS: usize = 100;

/// Roots whose imaginary part is below this magnitude are treated as real.
pub const ROOT_IMAG_TOLERANCE: f64 = 1e-5;

/// Phase steps per half-cycle of the slow oscillation.
pub const PHASE_STEPS: usize = 6;

/// First label of a rising half-cycle (labels 1..=6).
pub const RISING_PHASE_BASE: u8 = 1;

/// First label of a falling half-cycle (labels 7..=12).
pub const FALLING_PHASE_BASE: u8 = 7;

/// Label for samples outside the first/last detected extreme.
pub const UNDEFINED_PHASE: u8 = 0;

/// Spikes-to-noise standard deviation ratio below which the skew heuristic
/// considers a cell inactive.
pub const STD_RATIO: f64 = 2.0;

/// Default Butterworth order for both bands.
pub const DEFAULT_FILTER_ORDER: usize = 5;

/// Fraction of the total spike count that seeds the activity onset bound.
pub const ACTIVITY_LOWER_FRACTION: f64 = 0.1;

/// Fraction of the total spike count that seeds the activity offset bound.
pub const ACTIVITY_UPPER_FRACTION: f64 = 0.9;

/// Maximum Durand-Kerner iterations when extracting polynomial roots.
pub const ROOT_MAX_ITERATIONS: usize = 500;

/// Relative step size at which root iteration is considered converged.
pub const ROOT_EPSILON: f64 = 1e-14;
