pub mod differential_evolution;
pub mod histogram;
pub mod iir_butterworth_bandpass;
pub mod polynomial;
pub mod stats;

pub use differential_evolution::{CancelToken, DifferentialEvolution, Minimum};
pub use histogram::Histogram;
pub use iir_butterworth_bandpass::{ZeroPhaseBandpass, validate_band};
pub use polynomial::Polynomial;
pub use stats::WindowStats;
