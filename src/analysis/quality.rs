use crate::analysis::distribution::CellDistribution;
use crate::config::{ExcludeConfig, ExclusionStrategyKind};
use crate::constants::STD_RATIO;
use crate::error::{AnalysisError, Result};

/// Decides whether a cell's distribution disqualifies it
pub trait ExclusionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `true` if the cell should be marked bad
    fn excludes(
        &self,
        cell: &CellDistribution,
        exclude: &ExcludeConfig,
        sample_count: usize,
    ) -> bool;
}

/// Low post-stimulation skew together with a spread close to the noise
#[derive(Debug, Clone, Copy, Default)]
pub struct SkewStdStrategy;

impl ExclusionStrategy for SkewStdStrategy {
    fn name(&self) -> &'static str {
        "simple"
    }

    /// A cell without stimulation windows cannot be judged and is excluded
    fn excludes(&self, cell: &CellDistribution, exclude: &ExcludeConfig, _: usize) -> bool {
        match (cell.noise(), cell.spikes()) {
            (Some(noise), Some(spikes)) => {
                spikes.skew < exclude.score_threshold && spikes.std < STD_RATIO * noise.std
            }
            _ => true,
        }
    }
}

/// Distribution goodness score and fitted spike count
///
/// Keeps a cell only if its score exceeds the threshold and the fitted
/// number of samples above the inflection exceeds the spike fraction of
/// the recording. Unscored cells are excluded.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistributionScoreStrategy;

impl ExclusionStrategy for DistributionScoreStrategy {
    fn name(&self) -> &'static str {
        "advanced"
    }

    fn excludes(
        &self,
        cell: &CellDistribution,
        exclude: &ExcludeConfig,
        sample_count: usize,
    ) -> bool {
        match cell.model() {
            Some(model) => {
                let keep = model.score > exclude.score_threshold
                    && model.spike_count_estimate > exclude.spike_fraction * sample_count as f64;
                !keep
            }
            None => true,
        }
    }
}

/// Both heuristics combined
#[derive(Debug, Clone, Copy)]
pub struct CombinedStrategy {
    /// Exclude only when both agree (lenient); otherwise when either does
    pub require_both: bool,
}

impl ExclusionStrategy for CombinedStrategy {
    fn name(&self) -> &'static str {
        if self.require_both { "lenient" } else { "strict" }
    }

    fn excludes(
        &self,
        cell: &CellDistribution,
        exclude: &ExcludeConfig,
        sample_count: usize,
    ) -> bool {
        let simple = SkewStdStrategy.excludes(cell, exclude, sample_count);
        let advanced = DistributionScoreStrategy.excludes(cell, exclude, sample_count);
        if self.require_both {
            simple && advanced
        } else {
            simple || advanced
        }
    }
}

pub fn create_strategy(kind: ExclusionStrategyKind) -> Box<dyn ExclusionStrategy> {
    match kind {
        ExclusionStrategyKind::Simple => Box::new(SkewStdStrategy),
        ExclusionStrategyKind::Advanced => Box::new(DistributionScoreStrategy),
        ExclusionStrategyKind::Strict => Box::new(CombinedStrategy {
            require_both: false,
        }),
        ExclusionStrategyKind::Lenient => Box::new(CombinedStrategy { require_both: true }),
    }
}

/// Per-cell good/bad flags with manual override
#[derive(Debug, Clone, PartialEq)]
pub struct QualityClassifier {
    flags: Vec<bool>,
}

impl QualityClassifier {
    /// All cells start good
    pub fn new(cell_count: usize) -> Self {
        Self {
            flags: vec![true; cell_count],
        }
    }

    /// Mark every cell the strategy rejects as bad
    ///
    /// Never re-includes a cell. Returns how many cells were newly excluded.
    pub fn auto_classify(
        &mut self,
        strategy: &dyn ExclusionStrategy,
        cells: &[CellDistribution],
        exclude: &ExcludeConfig,
        sample_count: usize,
    ) -> usize {
        let mut excluded = 0;
        for (flag, cell) in self.flags.iter_mut().zip(cells) {
            if *flag && strategy.excludes(cell, exclude, sample_count) {
                *flag = false;
                excluded += 1;
            }
        }

        let good = self.good_count();
        let total = self.flags.len();
        log::info!(
            "{} of {} good cells ({:.0}%) after {} exclusion",
            good,
            total,
            if total > 0 { 100.0 * good as f64 / total as f64 } else { 0.0 },
            strategy.name()
        );
        excluded
    }

    pub fn exclude(&mut self, index: usize) -> Result<()> {
        self.set(index, false)
    }

    pub fn include(&mut self, index: usize) -> Result<()> {
        self.set(index, true)
    }

    fn set(&mut self, index: usize, good: bool) -> Result<()> {
        let count = self.flags.len();
        let flag = self
            .flags
            .get_mut(index)
            .ok_or(AnalysisError::IndexOutOfRange { index, count })?;
        *flag = good;
        Ok(())
    }

    /// Mark a cell bad from a pipeline stage; out-of-range indices are ignored
    pub(crate) fn mark_bad(&mut self, index: usize) {
        if let Some(flag) = self.flags.get_mut(index) {
            *flag = false;
        }
    }

    pub fn reset(&mut self) {
        self.flags.fill(true);
    }

    /// Replace all flags at once
    ///
    /// # Errors
    /// Returns `AnalysisError::ShapeMismatch` if the count differs.
    pub fn replace_flags(&mut self, flags: Vec<bool>) -> Result<()> {
        if flags.len() != self.flags.len() {
            return Err(AnalysisError::ShapeMismatch(format!(
                "{} quality flags for {} cells",
                flags.len(),
                self.flags.len()
            )));
        }
        self.flags = flags;
        Ok(())
    }

    pub fn flags(&self) -> &[bool] {
        &self.flags
    }

    pub fn is_good(&self, index: usize) -> Option<bool> {
        self.flags.get(index).copied()
    }

    pub fn good_count(&self) -> usize {
        self.flags.iter().filter(|&&g| g).count()
    }

    pub fn good_cells(&self) -> Vec<usize> {
        self.flags
            .iter()
            .enumerate()
            .filter(|&(_, &g)| g)
            .map(|(i, _)| i)
            .collect()
    }
}
