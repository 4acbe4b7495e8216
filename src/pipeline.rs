use rayon::prelude::*;
use serde::Serialize;

use crate::analysis::{
    ActivityWindow, ActivityWindowEstimator, CellDistribution, FastSpikeBinarizer,
    NoiseDistributionModel, QualityClassifier, SlowPhaseBinarizer, create_strategy, describe,
};
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::recording::{Recording, first_non_finite};
use crate::signal_processing::{CancelToken, ZeroPhaseBandpass};

/// Which derived artifacts are currently valid
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum AnalysisStage {
    Imported,
    Filtered,
    DistributionsComputed,
    Binarized,
}

/// A derived artifact slot
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact<T> {
    NotComputed,
    Computed(T),
}

impl<T> Default for Artifact<T> {
    fn default() -> Self {
        Artifact::NotComputed
    }
}

impl<T> Artifact<T> {
    pub fn get(&self) -> Option<&T> {
        match self {
            Artifact::Computed(value) => Some(value),
            Artifact::NotComputed => None,
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, Artifact::Computed(_))
    }
}

/// Band-separated traces, `[cell][time]`
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredTraces {
    pub slow: Vec<Vec<f64>>,
    pub fast: Vec<Vec<f64>>,
}

/// Symbolic traces, `[cell][time]`
#[derive(Debug, Clone, PartialEq)]
pub struct BinarizedTraces {
    /// Phase labels 0..=12
    pub slow: Vec<Vec<u8>>,
    /// Spike indicator 0/1
    pub fast: Vec<Vec<u8>>,
    /// Spike threshold per cell; `None` for unscored cells
    pub thresholds: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureStage {
    Distribution,
    Activity,
}

/// A per-cell failure absorbed by the run
#[derive(Debug, Clone, PartialEq)]
pub struct CellFailure {
    pub cell: usize,
    pub stage: FailureStage,
    pub error: AnalysisError,
}

/// Staged analysis of one recording
///
/// Stages advance `Imported -> Filtered -> DistributionsComputed ->
/// Binarized`; the activity window fit runs once binarized. Calling a
/// stage whose output already exists does nothing. Replacing the
/// configuration or calling [`AnalysisPipeline::reset`] clears every
/// derived artifact and quality flag.
///
/// Automatic classification runs once per analysis: a repeated
/// [`AnalysisPipeline::run`] keeps manual [`AnalysisPipeline::include`]
/// overrides. Each cell's activity fit has its own [`CancelToken`].
///
/// Per-cell work runs on the rayon thread pool. Results are collected per
/// cell index and quality flags are updated only after each parallel
/// section completes.
#[derive(Debug)]
pub struct AnalysisPipeline {
    recording: Recording,
    config: AnalysisConfig,
    stage: AnalysisStage,
    filtered: Artifact<FilteredTraces>,
    distributions: Artifact<Vec<CellDistribution>>,
    binarized: Artifact<BinarizedTraces>,
    activity: Artifact<Vec<std::result::Result<ActivityWindow, AnalysisError>>>,
    quality: QualityClassifier,
    classified: bool,
    cancel: Vec<CancelToken>,
}

impl AnalysisPipeline {
    /// # Errors
    /// Returns `AnalysisError::InvalidConfiguration` if the configuration is
    /// invalid or disagrees with the recording's sampling rate or
    /// stimulation window.
    pub fn new(recording: Recording, config: AnalysisConfig) -> Result<Self> {
        check_config(&recording, &config)?;
        let quality = QualityClassifier::new(recording.cell_count());
        let cancel = fresh_tokens(recording.cell_count());
        Ok(Self {
            recording,
            config,
            stage: AnalysisStage::Imported,
            filtered: Artifact::NotComputed,
            distributions: Artifact::NotComputed,
            binarized: Artifact::NotComputed,
            activity: Artifact::NotComputed,
            quality,
            classified: false,
            cancel,
        })
    }

    /// Replace the configuration and reset the pipeline
    ///
    /// The pipeline is left untouched if the new configuration is rejected.
    pub fn set_config(&mut self, config: AnalysisConfig) -> Result<()> {
        check_config(&self.recording, &config)?;
        self.config = config;
        self.reset();
        Ok(())
    }

    /// Drop all derived artifacts and mark every cell good
    ///
    /// Fits still running against the previous tokens are cancelled.
    pub fn reset(&mut self) {
        self.cancel_all();
        self.cancel = fresh_tokens(self.recording.cell_count());
        self.classified = false;
        self.stage = AnalysisStage::Imported;
        self.filtered = Artifact::NotComputed;
        self.distributions = Artifact::NotComputed;
        self.binarized = Artifact::NotComputed;
        self.activity = Artifact::NotComputed;
        self.quality.reset();
        log::debug!("Pipeline reset");
    }

    fn require(&self, required: AnalysisStage) -> Result<()> {
        if self.stage < required {
            return Err(AnalysisError::StagePrecondition {
                required,
                current: self.stage,
            });
        }
        Ok(())
    }

    /// Split every cell into slow and fast bands
    pub fn filter(&mut self) -> Result<()> {
        if self.filtered.is_computed() {
            return Ok(());
        }

        let order = self.config.filter.order;
        let fs = self.config.sampling_hz;
        let [slow_low, slow_high] = self.config.filter.slow_band_hz;
        let [fast_low, fast_high] = self.config.filter.fast_band_hz;
        let slow_filter = ZeroPhaseBandpass::new(slow_low, slow_high, fs, order)?;
        let fast_filter = ZeroPhaseBandpass::new(fast_low, fast_high, fs, order)?;

        let samples = self.recording.sample_count();
        if samples < slow_filter.min_len() {
            return Err(AnalysisError::InsufficientData(format!(
                "{} samples per cell, filtering needs at least {}",
                samples,
                slow_filter.min_len()
            )));
        }

        let bands: Vec<(Vec<f64>, Vec<f64>)> = self
            .recording
            .cells()
            .par_iter()
            .map(|trace| Ok((slow_filter.apply(trace)?, fast_filter.apply(trace)?)))
            .collect::<Result<_>>()?;
        let (slow, fast) = bands.into_iter().unzip();

        self.filtered = Artifact::Computed(FilteredTraces { slow, fast });
        self.stage = AnalysisStage::Filtered;
        log::info!("Filtered {} cells", self.recording.cell_count());
        Ok(())
    }

    /// Fit the fast-band amplitude distribution of every cell
    ///
    /// A cell whose model cannot be fitted keeps the failure in its
    /// [`CellDistribution::model`] and is treated as unscored downstream.
    pub fn compute_distributions(&mut self) -> Result<()> {
        self.require(AnalysisStage::Filtered)?;
        if self.distributions.is_computed() {
            return Ok(());
        }

        let stimulation = self.config.stimulation_frame[0];
        let filtered = self.filtered_traces()?;
        let model =
            NoiseDistributionModel::new(self.config.distribution_order, self.config.inflection_root);
        let distributions: Vec<CellDistribution> = filtered
            .fast
            .par_iter()
            .map(|fast| describe(fast, stimulation, &model))
            .collect::<Result<_>>()?;

        let unscored = distributions.iter().filter(|d| d.model.is_err()).count();
        for (cell, distribution) in distributions.iter().enumerate() {
            if let Err(err) = &distribution.model {
                log::warn!("Cell {}: distribution not scored: {}", cell, err);
            }
        }
        log::info!(
            "Computed distributions for {} cells ({} unscored)",
            distributions.len(),
            unscored
        );

        self.distributions = Artifact::Computed(distributions);
        self.stage = AnalysisStage::DistributionsComputed;
        Ok(())
    }

    /// Binarize both bands of every cell
    ///
    /// Cells with too few spikes, or without a threshold, are marked bad.
    pub fn binarize(&mut self) -> Result<()> {
        self.require(AnalysisStage::DistributionsComputed)?;
        if self.binarized.is_computed() {
            return Ok(());
        }

        let filtered = self.filtered_traces()?;
        let distributions = self.cell_distributions()?;
        let fast_binarizer =
            FastSpikeBinarizer::new(self.config.spike_threshold, self.config.exclude.spike_fraction);
        let slow_binarizer = SlowPhaseBinarizer::new(self.config.phase_interpolation);

        let fast: Vec<_> = filtered
            .fast
            .par_iter()
            .zip(distributions.par_iter())
            .map(|(trace, distribution)| fast_binarizer.binarize(trace, distribution).0)
            .collect();
        let slow: Vec<Vec<u8>> = filtered
            .slow
            .par_iter()
            .map(|trace| slow_binarizer.binarize(trace))
            .collect();

        let rejected: Vec<usize> = fast
            .iter()
            .enumerate()
            .filter(|(_, spikes)| !fast_binarizer.passes(spikes))
            .map(|(cell, _)| cell)
            .collect();
        for &cell in &rejected {
            log::debug!("Cell {}: too few spikes", cell);
            self.quality.mark_bad(cell);
        }
        log::info!(
            "Binarized {} cells ({} below spike fraction)",
            fast.len(),
            rejected.len()
        );

        let thresholds = fast.iter().map(|spikes| spikes.threshold).collect();
        let fast = fast.into_iter().map(|spikes| spikes.train).collect();
        self.binarized = Artifact::Computed(BinarizedTraces {
            slow,
            fast,
            thresholds,
        });
        self.stage = AnalysisStage::Binarized;
        Ok(())
    }

    /// Apply the configured exclusion strategy
    ///
    /// Only ever marks cells bad. Returns the number of newly excluded cells.
    /// [`AnalysisPipeline::run`] skips this once it has been applied.
    pub fn auto_classify(&mut self) -> Result<usize> {
        self.require(AnalysisStage::DistributionsComputed)?;
        let strategy = create_strategy(self.config.strategy);
        let samples = self.recording.sample_count();
        let distributions = match &self.distributions {
            Artifact::Computed(distributions) => distributions,
            Artifact::NotComputed => {
                return Err(AnalysisError::StagePrecondition {
                    required: AnalysisStage::DistributionsComputed,
                    current: self.stage,
                });
            }
        };
        let excluded = self.quality.auto_classify(
            strategy.as_ref(),
            distributions,
            &self.config.exclude,
            samples,
        );
        self.classified = true;
        Ok(excluded)
    }

    /// Fit the activity window of every cell
    ///
    /// Cells whose fit fails, or whose activity starts before stimulation,
    /// are marked bad; the failures are kept for [`AnalysisPipeline::failures`].
    pub fn estimate_activity(&mut self) -> Result<()> {
        self.require(AnalysisStage::Binarized)?;
        if self.activity.is_computed() {
            return Ok(());
        }

        let binarized = self.binarized_traces()?;
        let estimator = ActivityWindowEstimator::new(self.config.sampling_hz, &self.config.activity);
        let seed = self.config.activity.seed;
        let cancel = &self.cancel;

        let windows: Vec<_> = binarized
            .fast
            .par_iter()
            .enumerate()
            .map(|(cell, train)| {
                estimator.estimate(train, seed.wrapping_add(cell as u64), &cancel[cell])
            })
            .collect();

        let onset_limit = self.config.stimulation_onset_secs();
        for (cell, window) in windows.iter().enumerate() {
            match window {
                Ok(window) if window.onset < onset_limit => {
                    log::debug!(
                        "Cell {}: activity starts at {:.1} s, before stimulation at {:.1} s",
                        cell,
                        window.onset,
                        onset_limit
                    );
                    self.quality.mark_bad(cell);
                }
                Ok(_) => {}
                Err(err) => {
                    log::warn!("Cell {}: {}", cell, err);
                    self.quality.mark_bad(cell);
                }
            }
        }
        log::info!(
            "{} of {} good cells after activity fit",
            self.quality.good_count(),
            self.recording.cell_count()
        );

        self.activity = Artifact::Computed(windows);
        Ok(())
    }

    /// Run every stage in order, then classify and fit activity
    ///
    /// Classification is skipped when flags were already classified or
    /// imported, so manual overrides survive a repeated run.
    pub fn run(&mut self) -> Result<()> {
        self.filter()?;
        self.compute_distributions()?;
        self.binarize()?;
        if !self.classified {
            self.auto_classify()?;
        }
        self.estimate_activity()
    }

    /// True once every stage has produced output for every cell
    pub fn is_analyzed(&self) -> bool {
        self.stage == AnalysisStage::Binarized && self.activity.is_computed()
    }

    pub fn exclude(&mut self, cell: usize) -> Result<()> {
        self.quality.exclude(cell)
    }

    pub fn include(&mut self, cell: usize) -> Result<()> {
        self.quality.include(cell)
    }

    /// Replace the quality flags, e.g. from a saved good-cells table
    ///
    /// Imported flags count as classified.
    pub fn import_good_cells(&mut self, flags: Vec<bool>) -> Result<()> {
        self.quality.replace_flags(flags)?;
        self.classified = true;
        Ok(())
    }

    /// Install previously saved filtered traces
    ///
    /// Downstream artifacts are cleared and the pipeline moves to
    /// `Filtered`. Quality flags are kept and the next run classifies again.
    pub fn restore_filtered(&mut self, slow: Vec<Vec<f64>>, fast: Vec<Vec<f64>>) -> Result<()> {
        let cells = self.recording.cell_count();
        let samples = self.recording.sample_count();
        for (name, band) in [("slow", &slow), ("fast", &fast)] {
            if band.len() != cells || band.iter().any(|trace| trace.len() != samples) {
                return Err(AnalysisError::ShapeMismatch(format!(
                    "{} band does not match the {} x {} recording",
                    name, cells, samples
                )));
            }
            if let Some((cell, frame)) = first_non_finite(band) {
                return Err(AnalysisError::ShapeMismatch(format!(
                    "{} band of cell {} is not finite at frame {}",
                    name, cell, frame
                )));
            }
        }

        self.filtered = Artifact::Computed(FilteredTraces { slow, fast });
        self.distributions = Artifact::NotComputed;
        self.binarized = Artifact::NotComputed;
        self.activity = Artifact::NotComputed;
        self.stage = AnalysisStage::Filtered;
        self.classified = false;
        Ok(())
    }

    /// Spike times in seconds for each good cell, as `(cell, times)`
    pub fn event_raster(&self) -> Result<Vec<(usize, Vec<f64>)>> {
        let binarized = self.binarized_traces()?;
        let fs = self.config.sampling_hz;
        Ok(self
            .quality
            .good_cells()
            .into_iter()
            .map(|cell| {
                let times = binarized.fast[cell]
                    .iter()
                    .enumerate()
                    .filter(|&(_, &s)| s == 1)
                    .map(|(i, _)| i as f64 / fs)
                    .collect();
                (cell, times)
            })
            .collect())
    }

    /// Every per-cell failure retained by the computed stages
    pub fn failures(&self) -> Vec<CellFailure> {
        let mut failures = Vec::new();
        if let Some(distributions) = self.distributions.get() {
            failures.extend(distributions.iter().enumerate().filter_map(|(cell, d)| {
                d.model.as_ref().err().map(|error| CellFailure {
                    cell,
                    stage: FailureStage::Distribution,
                    error: error.clone(),
                })
            }));
        }
        if let Some(windows) = self.activity.get() {
            failures.extend(windows.iter().enumerate().filter_map(|(cell, w)| {
                w.as_ref().err().map(|error| CellFailure {
                    cell,
                    stage: FailureStage::Activity,
                    error: error.clone(),
                })
            }));
        }
        failures
    }

    /// Token that cancels the activity fit of one cell
    pub fn cancel_token(&self, cell: usize) -> Result<CancelToken> {
        self.cancel
            .get(cell)
            .cloned()
            .ok_or(AnalysisError::IndexOutOfRange {
                index: cell,
                count: self.cancel.len(),
            })
    }

    /// Cancel the activity fits of every cell
    pub fn cancel_all(&self) {
        for token in &self.cancel {
            token.cancel();
        }
    }

    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn stage(&self) -> AnalysisStage {
        self.stage
    }

    pub fn filtered(&self) -> Option<&FilteredTraces> {
        self.filtered.get()
    }

    pub fn distributions(&self) -> Option<&[CellDistribution]> {
        self.distributions.get().map(Vec::as_slice)
    }

    pub fn binarized(&self) -> Option<&BinarizedTraces> {
        self.binarized.get()
    }

    pub fn activity(&self) -> Option<&[std::result::Result<ActivityWindow, AnalysisError>]> {
        self.activity.get().map(Vec::as_slice)
    }

    pub fn quality_flags(&self) -> &[bool] {
        self.quality.flags()
    }

    pub fn good_cells(&self) -> Vec<usize> {
        self.quality.good_cells()
    }

    fn filtered_traces(&self) -> Result<&FilteredTraces> {
        self.filtered.get().ok_or(AnalysisError::StagePrecondition {
            required: AnalysisStage::Filtered,
            current: self.stage,
        })
    }

    fn cell_distributions(&self) -> Result<&[CellDistribution]> {
        self.distributions()
            .ok_or(AnalysisError::StagePrecondition {
                required: AnalysisStage::DistributionsComputed,
                current: self.stage,
            })
    }

    fn binarized_traces(&self) -> Result<&BinarizedTraces> {
        self.binarized.get().ok_or(AnalysisError::StagePrecondition {
            required: AnalysisStage::Binarized,
            current: self.stage,
        })
    }
}

fn fresh_tokens(cells: usize) -> Vec<CancelToken> {
    (0..cells).map(|_| CancelToken::new()).collect()
}

fn check_config(recording: &Recording, config: &AnalysisConfig) -> Result<()> {
    config.validate()?;
    let stimulation = config.stimulation_frame[0];
    if stimulation >= recording.sample_count() {
        return Err(AnalysisError::InvalidConfiguration(format!(
            "stimulation frame {} lies outside the {} sample recording",
            stimulation,
            recording.sample_count()
        )));
    }
    if (config.sampling_hz - recording.sampling_hz()).abs() > f64::EPSILON * recording.sampling_hz()
    {
        return Err(AnalysisError::InvalidConfiguration(format!(
            "configured sampling rate {} Hz differs from the recording's {} Hz",
            config.sampling_hz,
            recording.sampling_hz()
        )));
    }
    if let Some(frames) = recording.stimulation_frame()
        && frames != config.stimulation_frame
    {
        return Err(AnalysisError::InvalidConfiguration(format!(
            "configured stimulation window {:?} differs from the recording's {:?}",
            config.stimulation_frame, frames
        )));
    }
    Ok(())
}
