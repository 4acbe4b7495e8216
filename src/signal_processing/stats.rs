use serde::Serialize;
use statrs::statistics::Statistics;

/// Population moments of a trace window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowStats {
    pub mean: f64,
    pub std: f64,
    /// Third standardized moment; 0 for a constant window
    pub skew: f64,
}

impl WindowStats {
    /// Returns `None` for an empty window
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mean = samples.iter().mean();
        let std = samples.iter().population_std_dev();

        // statrs has no population skewness for slices
        let m3 = samples.iter().map(|&x| (x - mean).powi(3)).sum::<f64>() / samples.len() as f64;
        let skew = if std > 0.0 { m3 / std.powi(3) } else { 0.0 };

        Some(Self { mean, std, skew })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_population_moments() {
        let stats = WindowStats::from_samples(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_abs_diff_eq!(stats.mean, 2.5);
        assert_abs_diff_eq!(stats.std, 1.25f64.sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(stats.skew, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_right_tail_has_positive_skew() {
        let mut samples = vec![0.0; 95];
        samples.extend([10.0; 5]);
        let stats = WindowStats::from_samples(&samples).unwrap();
        assert!(stats.skew > 3.0, "skew {} too small", stats.skew);
    }

    #[test]
    fn test_constant_window() {
        let stats = WindowStats::from_samples(&[3.0; 10]).unwrap();
        assert_eq!(stats.std, 0.0);
        assert_eq!(stats.skew, 0.0);
        assert!(WindowStats::from_samples(&[]).is_none());
    }
}
