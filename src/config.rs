//! Configuration for the cell classification pipeline.
//!
//! Settings are read from TOML or JSON. Required keys follow the settings
//! files produced by the acquisition tooling:
//!
//! ```toml
//! samplingHz = 10.0
//! stimulationFrame = [1200, 0]
//! distributionOrder = 5
//! distance_um = 1.0
//!
//! [filter]
//! slowBandHz = [0.001, 0.005]
//! fastBandHz = [0.04, 0.4]
//! plotWindowSeconds = [250.0, 1750.0]
//!
//! [exclude]
//! scoreThreshold = 1.0
//! spikeFraction = 0.01
//! ```
//!
//! Everything else is optional and falls back to the defaults below.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_FILTER_ORDER;
use crate::error::{AnalysisError, Result};
use crate::signal_processing::validate_band;

/// Complete analysis configuration
///
/// Immutable for the duration of a pipeline run. Replacing it through
/// [`AnalysisPipeline::set_config`](crate::pipeline::AnalysisPipeline::set_config)
/// resets every derived artifact.
///
/// # Example
/// ```
/// use cellphase::config::{AnalysisConfig, ExclusionStrategyKind};
///
/// let mut config = AnalysisConfig::default();
/// config.strategy = ExclusionStrategyKind::Simple;
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    /// Sampling rate of every trace in Hz
    pub sampling_hz: f64,
    /// Stimulation window `[start, end]` in frames; `end == 0` leaves it open.
    /// A start of 0 means no stimulation and is only allowed with the
    /// advanced strategy and the inflection threshold.
    pub stimulation_frame: [usize; 2],
    /// Band definitions
    pub filter: FilterConfig,
    /// Order of the polynomial fitted to the log cumulative histogram
    pub distribution_order: usize,
    /// Exclusion thresholds
    pub exclude: ExcludeConfig,
    /// Physical distance between neighbouring pixels in micrometres
    #[serde(rename = "distance_um")]
    pub distance_um: f64,
    /// Which exclusion heuristic `auto_classify` applies
    #[serde(default)]
    pub strategy: ExclusionStrategyKind,
    /// How the fast-band spike threshold is chosen
    #[serde(default)]
    pub spike_threshold: SpikeThresholdRule,
    /// Which in-range inflection root becomes the spike threshold
    #[serde(default)]
    pub inflection_root: RootSelection,
    /// Label interpolation between slow-band extrema
    #[serde(default)]
    pub phase_interpolation: PhaseInterpolation,
    /// Activity window optimizer budget
    #[serde(default)]
    pub activity: ActivityFitConfig,
}

/// Frequency bands for the slow and fast components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    /// Slow-wave band `[low, high]` in Hz
    pub slow_band_hz: [f64; 2],
    /// Fast-spike band `[low, high]` in Hz
    pub fast_band_hz: [f64; 2],
    /// Time window shown by viewers, in seconds
    pub plot_window_seconds: [f64; 2],
    /// Butterworth order for both bands
    #[serde(default = "default_filter_order")]
    pub order: usize,
}

/// Cell exclusion thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcludeConfig {
    /// Minimum goodness score (advanced) or spike-window skew (simple)
    pub score_threshold: f64,
    /// Minimum fraction of samples that must be spikes
    pub spike_fraction: f64,
}

/// Exclusion heuristic selected for automatic classification
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ExclusionStrategyKind {
    /// Skew of the post-stimulation window and spikes/noise std ratio
    Simple,
    /// Distribution goodness score and estimated spike count
    #[default]
    Advanced,
    /// Exclude when either heuristic excludes
    Strict,
    /// Exclude only when both heuristics exclude
    Lenient,
}

/// Spike threshold rule for the fast-band binarizer
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "kebab-case")]
pub enum SpikeThresholdRule {
    /// Use the distribution model's inflection root
    #[default]
    Inflection,
    /// Use a multiple of the pre-stimulation noise standard deviation
    NoiseStd {
        #[serde(default = "default_noise_multiplier")]
        multiplier: f64,
    },
}

/// Tie-break when several inflection roots fall inside the histogram range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RootSelection {
    #[default]
    Smallest,
    Largest,
}

/// Phase label interpolation between two extrema
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseInterpolation {
    /// Six equal floor-divided steps per half-cycle
    #[default]
    Stepped,
    /// Floor of an evenly spaced ramp over the half-cycle
    Linspace,
}

/// Differential evolution budget for the activity window fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityFitConfig {
    /// Population size per optimized parameter
    pub population_factor: usize,
    /// Generation budget before the fit is reported as failed
    pub max_generations: usize,
    /// Relative spread of population energies that counts as converged
    pub tolerance: f64,
    /// Upper bound of the box amplitude
    pub amplitude_max: f64,
    /// Base seed; cell `i` uses `seed + i`
    pub seed: u64,
}

impl Default for ActivityFitConfig {
    fn default() -> Self {
        Self {
            population_factor: 15,
            max_generations: 1000,
            tolerance: 0.01,
            amplitude_max: 100.0,
            seed: 0,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            slow_band_hz: [0.001, 0.005],
            fast_band_hz: [0.04, 0.4],
            plot_window_seconds: [250.0, 1750.0],
            order: DEFAULT_FILTER_ORDER,
        }
    }
}

impl Default for ExcludeConfig {
    fn default() -> Self {
        Self {
            score_threshold: 1.0,
            spike_fraction: 0.01,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sampling_hz: 10.0,
            stimulation_frame: [1200, 0],
            filter: FilterConfig::default(),
            distribution_order: 5,
            exclude: ExcludeConfig::default(),
            distance_um: 1.0,
            strategy: ExclusionStrategyKind::default(),
            spike_threshold: SpikeThresholdRule::default(),
            inflection_root: RootSelection::default(),
            phase_interpolation: PhaseInterpolation::default(),
            activity: ActivityFitConfig::default(),
        }
    }
}

fn default_filter_order() -> usize {
    DEFAULT_FILTER_ORDER
}

fn default_noise_multiplier() -> f64 {
    3.0
}

impl AnalysisConfig {
    /// Parse and validate a TOML settings document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AnalysisError::InvalidConfiguration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON settings document
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| AnalysisError::InvalidConfiguration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load settings from a file, choosing the format by extension
    ///
    /// `.json` files are parsed as JSON, everything else as TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_toml_str(&content),
        }
    }

    /// Serialize to a TOML document that [`AnalysisConfig::from_toml_str`] accepts
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| AnalysisError::InvalidConfiguration(e.to_string()))
    }

    /// Check internal consistency
    ///
    /// Band limits are checked against the Nyquist frequency here as well as
    /// at filter time, so a bad settings file is rejected on load.
    pub fn validate(&self) -> Result<()> {
        if !(self.sampling_hz > 0.0) || !self.sampling_hz.is_finite() {
            return Err(AnalysisError::InvalidConfiguration(format!(
                "samplingHz must be positive, got {}",
                self.sampling_hz
            )));
        }

        let [low, high] = self.filter.slow_band_hz;
        validate_band(low, high, self.sampling_hz)?;
        let [low, high] = self.filter.fast_band_hz;
        validate_band(low, high, self.sampling_hz)?;

        if self.filter.order == 0 {
            return Err(AnalysisError::InvalidConfiguration(
                "filter.order must be at least 1".to_string(),
            ));
        }
        if self.distribution_order < 3 {
            return Err(AnalysisError::InvalidConfiguration(format!(
                "distributionOrder must be at least 3, got {}",
                self.distribution_order
            )));
        }
        if !(0.0..=1.0).contains(&self.exclude.spike_fraction) {
            return Err(AnalysisError::InvalidConfiguration(format!(
                "exclude.spikeFraction must lie in [0, 1], got {}",
                self.exclude.spike_fraction
            )));
        }

        let [start, end] = self.stimulation_frame;
        if end != 0 && end < start {
            return Err(AnalysisError::InvalidConfiguration(format!(
                "stimulationFrame end {} precedes start {}",
                end, start
            )));
        }

        // Without a stimulation frame there is no noise window to judge by
        let needs_windows = self.strategy != ExclusionStrategyKind::Advanced
            || matches!(self.spike_threshold, SpikeThresholdRule::NoiseStd { .. });
        if start == 0 && needs_windows {
            return Err(AnalysisError::InvalidConfiguration(format!(
                "strategy {:?} with spike threshold {:?} needs a stimulationFrame start above 0",
                self.strategy, self.spike_threshold
            )));
        }

        if let SpikeThresholdRule::NoiseStd { multiplier } = self.spike_threshold {
            if !(multiplier > 0.0) {
                return Err(AnalysisError::InvalidConfiguration(format!(
                    "spikeThreshold.multiplier must be positive, got {}",
                    multiplier
                )));
            }
        }

        let activity = &self.activity;
        if activity.population_factor == 0 || activity.max_generations == 0 {
            return Err(AnalysisError::InvalidConfiguration(
                "activity fit budget must be positive".to_string(),
            ));
        }
        if !(activity.amplitude_max > 0.0) || !(activity.tolerance >= 0.0) {
            return Err(AnalysisError::InvalidConfiguration(
                "activity amplitudeMax must be positive and tolerance non-negative".to_string(),
            ));
        }

        Ok(())
    }

    /// Stimulation onset in seconds
    pub fn stimulation_onset_secs(&self) -> f64 {
        self.stimulation_frame[0] as f64 / self.sampling_hz
    }
}
