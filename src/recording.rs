use crate::error::{AnalysisError, Result};

/// Raw multi-cell recording, stored as `[cell][time]`
///
/// Every cell has the same number of samples. The time axis is implied by
/// the sampling rate: sample `i` is at `i / sampling_hz` seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    signal: Vec<Vec<f64>>,
    sampling_hz: f64,
    stimulation_frame: Option<[usize; 2]>,
    positions: Option<Vec<[f64; 2]>>,
}

impl Recording {
    /// Build a recording from per-cell traces
    ///
    /// # Errors
    /// * `AnalysisError::ShapeMismatch` if there are no cells, no samples,
    ///   the traces differ in length, or a sample is NaN or infinite
    /// * `AnalysisError::InvalidConfiguration` for a non-positive sampling rate
    pub fn new(signal: Vec<Vec<f64>>, sampling_hz: f64) -> Result<Self> {
        if !(sampling_hz > 0.0) || !sampling_hz.is_finite() {
            return Err(AnalysisError::InvalidConfiguration(format!(
                "sampling rate must be positive, got {}",
                sampling_hz
            )));
        }
        let Some(first) = signal.first() else {
            return Err(AnalysisError::ShapeMismatch(
                "recording has no cells".to_string(),
            ));
        };
        let samples = first.len();
        if samples == 0 {
            return Err(AnalysisError::ShapeMismatch(
                "recording has no samples".to_string(),
            ));
        }
        if let Some((cell, trace)) = signal
            .iter()
            .enumerate()
            .find(|(_, trace)| trace.len() != samples)
        {
            return Err(AnalysisError::ShapeMismatch(format!(
                "cell {} has {} samples, cell 0 has {}",
                cell,
                trace.len(),
                samples
            )));
        }
        if let Some((cell, frame)) = first_non_finite(&signal) {
            return Err(AnalysisError::ShapeMismatch(format!(
                "cell {} has a non-finite sample at frame {}",
                cell, frame
            )));
        }

        Ok(Self {
            signal,
            sampling_hz,
            stimulation_frame: None,
            positions: None,
        })
    }

    /// Build a recording from a time-major series table
    ///
    /// Column 0 holds time stamps and is dropped; each further column is one
    /// cell.
    pub fn from_time_series(rows: &[Vec<f64>], sampling_hz: f64) -> Result<Self> {
        let columns = rows.first().map_or(0, Vec::len);
        if columns < 2 {
            return Err(AnalysisError::ShapeMismatch(format!(
                "series needs a time column and at least one cell, has {} columns",
                columns
            )));
        }
        if let Some(line) = rows.iter().position(|row| row.len() != columns) {
            return Err(AnalysisError::ShapeMismatch(format!(
                "series row {} has {} columns, expected {}",
                line,
                rows[line].len(),
                columns
            )));
        }

        let signal = (1..columns)
            .map(|cell| rows.iter().map(|row| row[cell]).collect())
            .collect();
        Self::new(signal, sampling_hz)
    }

    /// Attach cell positions
    ///
    /// # Errors
    /// Returns `AnalysisError::ShapeMismatch` unless there is one position
    /// per cell.
    pub fn with_positions(mut self, positions: Vec<[f64; 2]>) -> Result<Self> {
        if positions.len() != self.cell_count() {
            return Err(AnalysisError::ShapeMismatch(format!(
                "{} positions for {} cells",
                positions.len(),
                self.cell_count()
            )));
        }
        self.positions = Some(positions);
        Ok(self)
    }

    /// Record the stimulation window the data was acquired with
    pub fn with_stimulation(mut self, stimulation_frame: [usize; 2]) -> Self {
        self.stimulation_frame = Some(stimulation_frame);
        self
    }

    pub fn cells(&self) -> &[Vec<f64>] {
        &self.signal
    }

    pub fn cell(&self, index: usize) -> Result<&[f64]> {
        self.signal
            .get(index)
            .map(Vec::as_slice)
            .ok_or(AnalysisError::IndexOutOfRange {
                index,
                count: self.cell_count(),
            })
    }

    pub fn cell_count(&self) -> usize {
        self.signal.len()
    }

    pub fn sample_count(&self) -> usize {
        self.signal[0].len()
    }

    pub fn sampling_hz(&self) -> f64 {
        self.sampling_hz
    }

    pub fn stimulation_frame(&self) -> Option<[usize; 2]> {
        self.stimulation_frame
    }

    pub fn positions(&self) -> Option<&[[f64; 2]]> {
        self.positions.as_deref()
    }

    /// Sample times in seconds
    pub fn time(&self) -> Vec<f64> {
        (0..self.sample_count())
            .map(|i| i as f64 / self.sampling_hz)
            .collect()
    }

    /// Mean over all cells at each sample, with its own mean removed
    pub fn mean_trace(&self) -> Vec<f64> {
        let cells = self.cell_count() as f64;
        let mut mean: Vec<f64> = (0..self.sample_count())
            .map(|i| self.signal.iter().map(|trace| trace[i]).sum::<f64>() / cells)
            .collect();
        let offset = mean.iter().sum::<f64>() / mean.len() as f64;
        for value in mean.iter_mut() {
            *value -= offset;
        }
        mean
    }

    /// `[time, mean]` rows for saving the population trace as a table
    pub fn mean_trace_rows(&self) -> Vec<Vec<f64>> {
        self.time()
            .into_iter()
            .zip(self.mean_trace())
            .map(|(t, mean)| vec![t, mean])
            .collect()
    }
}

/// First `(cell, frame)` holding a NaN or infinite sample
pub(crate) fn first_non_finite(traces: &[Vec<f64>]) -> Option<(usize, usize)> {
    traces.iter().enumerate().find_map(|(cell, trace)| {
        trace
            .iter()
            .position(|value| !value.is_finite())
            .map(|frame| (cell, frame))
    })
}
