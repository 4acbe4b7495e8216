/// Equal-width histogram over the value range of a sample set
///
/// Bins span `[min, max]`; every bin is half-open except the last, which
/// also includes `max`. A constant sample set gets the range
/// `[value - 0.5, value + 0.5]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub counts: Vec<usize>,
    /// `counts.len() + 1` bin edges, ascending
    pub edges: Vec<f64>,
}

impl Histogram {
    /// Bin `values` into `bins` equal-width bins
    ///
    /// Returns `None` for an empty input, zero bins, or non-finite values.
    pub fn new(values: &[f64], bins: usize) -> Option<Self> {
        if values.is_empty() || bins == 0 || values.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let mut lo = values.iter().copied().fold(f64::INFINITY, f64::min);
        let mut hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }

        let width = (hi - lo) / bins as f64;
        let edges: Vec<f64> = (0..=bins)
            .map(|i| if i == bins { hi } else { lo + width * i as f64 })
            .collect();

        let mut counts = vec![0usize; bins];
        for &v in values {
            let bin = (((v - lo) / width) as usize).min(bins - 1);
            counts[bin] += 1;
        }

        Some(Self { counts, edges })
    }

    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    pub fn bin_width(&self) -> f64 {
        (self.edges[self.bins()] - self.edges[0]) / self.bins() as f64
    }

    pub fn centers(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }

    /// Count of samples in bin `i` or any bin above it
    pub fn reverse_cumulative(&self) -> Vec<usize> {
        let mut running = 0;
        let mut cumulative: Vec<usize> = self
            .counts
            .iter()
            .rev()
            .map(|&c| {
                running += c;
                running
            })
            .collect();
        cumulative.reverse();
        cumulative
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}
