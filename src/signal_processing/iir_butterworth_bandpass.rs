use crate::error::{AnalysisError, Result};
use iir_filters::filter::{DirectForm2Transposed, Filter};
use iir_filters::filter_design::{FilterType, butter};
use iir_filters::sos::zpk2sos;

/// Check a band against the sampling rate
///
/// # Errors
/// Returns `AnalysisError::InvalidBand` unless `0 < low < high < nyquist`.
pub fn validate_band(low_hz: f64, high_hz: f64, sample_rate: f64) -> Result<()> {
    let nyquist = 0.5 * sample_rate;
    let valid = low_hz.is_finite()
        && high_hz.is_finite()
        && low_hz > 0.0
        && low_hz < high_hz
        && high_hz < nyquist;
    if valid {
        Ok(())
    } else {
        Err(AnalysisError::InvalidBand {
            low: low_hz,
            high: high_hz,
            nyquist,
        })
    }
}

/// Zero-phase Butterworth IIR bandpass filter
///
/// Designs a Butterworth bandpass as cascaded second-order sections and
/// runs it forward and then backward over the whole trace, so the output
/// has no phase delay and a squared magnitude response.
///
/// Both passes start from the steady state of the edge value. A bandpass
/// has no DC response, so that state is reached by filtering the pass with
/// its first sample subtracted from every sample.
///
/// The trace is extended at both ends by odd reflection before filtering
/// to suppress edge transients.
#[derive(Debug, Clone)]
pub struct ZeroPhaseBandpass {
    low_hz: f64,
    high_hz: f64,
    sample_rate: f64,
    order: usize,
}

impl ZeroPhaseBandpass {
    /// Create a new zero-phase bandpass filter
    ///
    /// # Arguments
    /// * `low_hz` - Lower cutoff frequency in Hz
    /// * `high_hz` - Upper cutoff frequency in Hz
    /// * `sample_rate` - Sampling rate in Hz
    /// * `order` - Butterworth order (5 in the standard protocol)
    ///
    /// # Errors
    /// Returns `AnalysisError::InvalidBand` if the band is empty or reaches
    /// the Nyquist frequency, `AnalysisError::FilterDesign` if the design
    /// itself fails.
    pub fn new(low_hz: f64, high_hz: f64, sample_rate: f64, order: usize) -> Result<Self> {
        validate_band(low_hz, high_hz, sample_rate)?;
        if order == 0 {
            return Err(AnalysisError::FilterDesign(
                "filter order must be at least 1".to_string(),
            ));
        }

        let filter = Self {
            low_hz,
            high_hz,
            sample_rate,
            order,
        };
        // Surface design failures at construction rather than per trace
        filter.design()?;
        Ok(filter)
    }

    fn design(&self) -> Result<DirectForm2Transposed> {
        let zpk = butter(
            self.order as u32,
            FilterType::BandPass(self.low_hz, self.high_hz),
            self.sample_rate,
        )
        .map_err(|e| AnalysisError::FilterDesign(format!("{:?}", e)))?;

        let sos =
            zpk2sos(&zpk, None).map_err(|e| AnalysisError::FilterDesign(format!("{:?}", e)))?;

        Ok(DirectForm2Transposed::new(&sos))
    }

    /// Number of samples reflected onto each end of the trace
    ///
    /// A bandpass of order N has N second-order sections; the extension
    /// covers three times the equivalent FIR length, 2N + 1.
    pub fn pad_len(&self) -> usize {
        3 * (2 * self.order + 1)
    }

    /// Minimum trace length accepted by [`ZeroPhaseBandpass::apply`]
    pub fn min_len(&self) -> usize {
        self.pad_len() + 1
    }

    /// Filter a whole trace with zero phase delay
    ///
    /// Returns a new trace of the same length.
    ///
    /// # Errors
    /// Returns `AnalysisError::InsufficientData` if the trace is not longer
    /// than the edge extension.
    pub fn apply(&self, trace: &[f64]) -> Result<Vec<f64>> {
        let pad = self.pad_len();
        if trace.len() <= pad {
            return Err(AnalysisError::InsufficientData(format!(
                "need more than {} samples for zero-phase filtering, have {}",
                pad,
                trace.len()
            )));
        }

        let extended = odd_extension(trace, pad);
        let forward = self.single_pass(&extended)?;
        let reversed: Vec<f64> = forward.into_iter().rev().collect();
        let backward = self.single_pass(&reversed)?;

        Ok(backward
            .into_iter()
            .rev()
            .skip(pad)
            .take(trace.len())
            .collect())
    }

    fn single_pass(&self, input: &[f64]) -> Result<Vec<f64>> {
        let mut filter = self.design()?;
        let edge = input[0];
        Ok(input.iter().map(|&x| filter.filter(x - edge)).collect())
    }
}

/// Extend a trace at both ends by point reflection about its end samples
fn odd_extension(trace: &[f64], pad: usize) -> Vec<f64> {
    let n = trace.len();
    let first = trace[0];
    let last = trace[n - 1];

    let mut extended = Vec::with_capacity(n + 2 * pad);
    extended.extend((1..=pad).rev().map(|i| 2.0 * first - trace[i]));
    extended.extend_from_slice(trace);
    extended.extend((1..=pad).map(|i| 2.0 * last - trace[n - 1 - i]));
    extended
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const FS: f64 = 10.0;

    fn sine(freq_hz: f64, samples: usize) -> Vec<f64> {
        (0..samples)
            .map(|i| (2.0 * PI * freq_hz * i as f64 / FS).sin())
            .collect()
    }

    fn rms(samples: &[f64]) -> f64 {
        (samples.iter().map(|x| x * x).sum::<f64>() / samples.len() as f64).sqrt()
    }

    #[test]
    fn test_butterworth_bandpass_design() {
        let filter = ZeroPhaseBandpass::new(0.04, 0.4, FS, 5);
        assert!(filter.is_ok());
    }

    #[test]
    fn test_invalid_band() {
        assert!(matches!(
            ZeroPhaseBandpass::new(0.4, 0.04, FS, 5),
            Err(AnalysisError::InvalidBand { .. })
        ));
        assert!(matches!(
            ZeroPhaseBandpass::new(0.4, 0.4, FS, 5),
            Err(AnalysisError::InvalidBand { .. })
        ));
        assert!(matches!(
            ZeroPhaseBandpass::new(0.04, 5.0, FS, 5),
            Err(AnalysisError::InvalidBand { .. })
        ));
        assert!(matches!(
            ZeroPhaseBandpass::new(6.0, 7.0, FS, 5),
            Err(AnalysisError::InvalidBand { nyquist, .. }) if nyquist == 5.0
        ));
    }

    #[test]
    fn test_passes_center_frequency() {
        let filter = ZeroPhaseBandpass::new(0.04, 0.4, FS, 5).unwrap();
        let input = sine(0.126, 6000);
        let output = filter.apply(&input).unwrap();
        assert_eq!(output.len(), input.len());

        let ratio = rms(&output[1500..4500]) / rms(&input[1500..4500]);
        assert!(
            (ratio - 1.0).abs() < 0.05,
            "Passband amplitude ratio {} not within 5%",
            ratio
        );
    }

    #[test]
    fn test_no_phase_delay() {
        let filter = ZeroPhaseBandpass::new(0.04, 0.4, FS, 5).unwrap();
        let input = sine(0.126, 6000);
        let output = filter.apply(&input).unwrap();

        // Input peaks at sample 2004; output must peak within a sample of it
        let window = 1980..2030;
        let peak = |s: &[f64]| {
            window
                .clone()
                .max_by(|&a, &b| s[a].total_cmp(&s[b]))
                .unwrap()
        };
        let delay = peak(&output) as i64 - peak(&input) as i64;
        assert!(delay.abs() <= 1, "Phase delay of {} samples", delay);
    }

    #[test]
    fn test_attenuates_far_above_band() {
        let filter = ZeroPhaseBandpass::new(0.04, 0.4, FS, 5).unwrap();
        let input = sine(4.0, 6000);
        let output = filter.apply(&input).unwrap();

        let attenuation_db = 20.0 * (rms(&output[1500..4500]) / rms(&input[1500..4500])).log10();
        assert!(
            attenuation_db < -20.0,
            "Stopband attenuation only {} dB",
            attenuation_db
        );
    }

    #[test]
    fn test_deterministic() {
        let filter = ZeroPhaseBandpass::new(0.001, 0.005, FS, 5).unwrap();
        let input: Vec<f64> = (0..3000).map(|i| ((i * 7919) % 101) as f64 * 0.01).collect();
        let first = filter.apply(&input).unwrap();
        let second = filter.apply(&input).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_short_trace_rejected() {
        let filter = ZeroPhaseBandpass::new(0.04, 0.4, FS, 5).unwrap();
        let input = vec![0.0; filter.pad_len()];
        assert!(matches!(
            filter.apply(&input),
            Err(AnalysisError::InsufficientData(_))
        ));
        assert!(filter.apply(&vec![0.0; filter.min_len()]).is_ok());
    }

    #[test]
    fn test_odd_extension() {
        let extended = odd_extension(&[1.0, 2.0, 4.0, 7.0], 2);
        assert_eq!(extended, vec![-2.0, 0.0, 1.0, 2.0, 4.0, 7.0, 10.0, 12.0]);
    }
}
