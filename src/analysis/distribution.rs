//! Adaptive spike threshold from the fast-band amplitude distribution.
//!
//! The positive part of the fast trace is binned, the reverse cumulative
//! count ("how many samples exceed this amplitude") is fitted in log space
//! by a weighted polynomial `p`, and the first inflection point of `p`
//! separates the noise body from the spike tail. A quadratic `q` expanded
//! around zero gives the noise scale the inflection is compared against.

use crate::config::RootSelection;
use crate::constants::{
    DISTRIBUTION_BINS, NOISE_HISTOGRAM_BINS, ROOT_IMAG_TOLERANCE, SPIKES_HISTOGRAM_BINS,
};
use crate::error::{AnalysisError, Result};
use crate::signal_processing::{Histogram, Polynomial, WindowStats};

/// Fitted distribution of one cell
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionModel {
    /// Centers of the amplitude bins
    pub bin_centers: Vec<f64>,
    /// Reverse cumulative counts per bin
    pub cumulative: Vec<usize>,
    /// Polynomial fitted to `ln(cumulative)`
    pub p: Polynomial,
    pub p_prime: Polynomial,
    pub p_double_prime: Polynomial,
    /// Second-order expansion of `p` around zero
    pub q: Polynomial,
    /// Selected inflection point of `p`; the spike threshold
    pub p_root: f64,
    /// Vertex of `q`; `None` stands for infinity
    pub q_root: Option<f64>,
    pub score: f64,
    /// `exp(p(p_root))`, the fitted count of samples above the threshold
    pub spike_count_estimate: f64,
}

/// Fits [`DistributionModel`]s to fast-band traces
#[derive(Debug, Clone)]
pub struct NoiseDistributionModel {
    order: usize,
    root_selection: RootSelection,
}

impl NoiseDistributionModel {
    pub fn new(order: usize, root_selection: RootSelection) -> Self {
        Self {
            order,
            root_selection,
        }
    }

    /// Fit the distribution of one fast-band trace
    ///
    /// # Errors
    /// * `AnalysisError::InsufficientData` if the trace has no positive
    ///   samples or the polynomial fit is underdetermined
    /// * `AnalysisError::NoInflectionFound` if `p''` has no real root inside
    ///   the histogram range
    pub fn fit(&self, fast_trace: &[f64]) -> Result<DistributionModel> {
        let clipped: Vec<f64> = fast_trace.iter().map(|&x| x.max(0.0)).collect();
        if !clipped.iter().any(|&x| x > 0.0) {
            return Err(AnalysisError::InsufficientData(
                "fast trace has no positive samples".to_string(),
            ));
        }

        let histogram = Histogram::new(&clipped, DISTRIBUTION_BINS).ok_or_else(|| {
            AnalysisError::InsufficientData("fast trace contains non-finite samples".to_string())
        })?;
        let bin_centers = histogram.centers();
        let cumulative = histogram.reverse_cumulative();
        let upper_edge = histogram.edges[histogram.bins()];

        // Every count is at least one: the maximum sits in the last bin
        let log_counts: Vec<f64> = cumulative.iter().map(|&c| (c as f64).ln()).collect();
        let weights: Vec<f64> = cumulative.iter().map(|&c| (c as f64).sqrt()).collect();

        let p = Polynomial::fit_weighted(&bin_centers, &log_counts, &weights, self.order)?;
        let p_prime = p.derivative();
        let p_double_prime = p_prime.derivative();

        let p_root = select_inflection(&p_double_prime, upper_edge, self.root_selection)?;

        let q = Polynomial::new(vec![
            p.eval(0.0),
            p_prime.eval(0.0),
            p_double_prime.eval(0.0) / 2.0,
        ]);
        let q_root = quadratic_vertex(&q, upper_edge);

        let phi = p_prime.eval(p_root).abs().atan() / std::f64::consts::FRAC_PI_2;
        let score = match q_root {
            Some(q_root) => (1.0 - phi) * p_root / q_root,
            None => 0.0,
        };
        let spike_count_estimate = p.eval(p_root).exp();

        log::debug!(
            "Distribution fit: p_root {:.4}, q_root {:?}, score {:.3}, estimated spikes {:.1}",
            p_root,
            q_root,
            score,
            spike_count_estimate
        );

        Ok(DistributionModel {
            bin_centers,
            cumulative,
            p,
            p_prime,
            p_double_prime,
            q,
            p_root,
            q_root,
            score,
            spike_count_estimate,
        })
    }
}

/// Pick the inflection root of `p` from the real roots of `p''` in `(0, upper)`
pub(crate) fn select_inflection(
    p_double_prime: &Polynomial,
    upper: f64,
    selection: RootSelection,
) -> Result<f64> {
    let roots = p_double_prime.real_roots_in(0.0, upper, ROOT_IMAG_TOLERANCE);
    let chosen = match selection {
        RootSelection::Smallest => roots.first(),
        RootSelection::Largest => roots.last(),
    };
    chosen.copied().ok_or(AnalysisError::NoInflectionFound)
}

/// Vertex of `q(x) = c0 + c1 x + c2 x^2`, or `None` when it is not a finite
/// point inside `(0, upper]`
fn quadratic_vertex(q: &Polynomial, upper: f64) -> Option<f64> {
    let coeffs = q.coefficients();
    let curvature = coeffs[2];
    if curvature == 0.0 {
        return None;
    }
    let vertex = -coeffs[1] / (2.0 * curvature);
    (vertex > 0.0 && vertex <= upper && vertex.is_finite()).then_some(vertex)
}

/// Statistics and histograms of the windows before and after stimulation
#[derive(Debug, Clone, PartialEq)]
pub struct StimulationWindows {
    pub noise: WindowStats,
    pub noise_histogram: Histogram,
    pub spikes: WindowStats,
    pub spikes_histogram: Histogram,
}

impl StimulationWindows {
    /// Split `[0, stimulation_frame)` from `[stimulation_frame, len)`
    ///
    /// # Errors
    /// Returns `AnalysisError::InsufficientData` if either window is empty or
    /// holds non-finite samples.
    pub fn new(fast_trace: &[f64], stimulation_frame: usize) -> Result<Self> {
        if stimulation_frame == 0 || stimulation_frame >= fast_trace.len() {
            return Err(AnalysisError::InsufficientData(format!(
                "stimulation frame {} leaves an empty window in a trace of {} samples",
                stimulation_frame,
                fast_trace.len()
            )));
        }
        let (noise_window, spikes_window) = fast_trace.split_at(stimulation_frame);
        let stats = |window: &[f64]| {
            WindowStats::from_samples(window)
                .ok_or_else(|| AnalysisError::InsufficientData("empty window".to_string()))
        };
        let histogram = |window: &[f64], bins: usize| {
            Histogram::new(window, bins).ok_or_else(|| {
                AnalysisError::InsufficientData("window contains non-finite samples".to_string())
            })
        };

        Ok(Self {
            noise: stats(noise_window)?,
            noise_histogram: histogram(noise_window, NOISE_HISTOGRAM_BINS)?,
            spikes: stats(spikes_window)?,
            spikes_histogram: histogram(spikes_window, SPIKES_HISTOGRAM_BINS)?,
        })
    }
}

/// Description of one fast-band trace
#[derive(Debug, Clone, PartialEq)]
pub struct CellDistribution {
    /// `None` when the recording has no stimulation frame
    pub windows: Option<StimulationWindows>,
    /// Distribution model, or the reason the cell is unscored
    pub model: std::result::Result<DistributionModel, AnalysisError>,
}

impl CellDistribution {
    pub fn model(&self) -> Option<&DistributionModel> {
        self.model.as_ref().ok()
    }

    pub fn score(&self) -> Option<f64> {
        self.model().map(|m| m.score)
    }

    /// Pre-stimulation statistics
    pub fn noise(&self) -> Option<&WindowStats> {
        self.windows.as_ref().map(|w| &w.noise)
    }

    /// Post-stimulation statistics
    pub fn spikes(&self) -> Option<&WindowStats> {
        self.windows.as_ref().map(|w| &w.spikes)
    }
}

/// Describe a fast-band trace, split at `stimulation_frame` unless it is 0
///
/// # Errors
/// Returns the [`StimulationWindows::new`] error for a non-zero frame that
/// leaves a window empty. A failed model fit is stored in
/// [`CellDistribution::model`] rather than returned.
pub fn describe(
    fast_trace: &[f64],
    stimulation_frame: usize,
    model: &NoiseDistributionModel,
) -> Result<CellDistribution> {
    let windows = match stimulation_frame {
        0 => None,
        frame => Some(StimulationWindows::new(fast_trace, frame)?),
    };
    Ok(CellDistribution {
        windows,
        model: model.fit(fast_trace),
    })
}
