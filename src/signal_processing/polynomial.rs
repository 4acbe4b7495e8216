use num_complex::Complex64;

use crate::constants::{ROOT_EPSILON, ROOT_MAX_ITERATIONS};
use crate::error::{AnalysisError, Result};

/// Real polynomial with coefficients in ascending order
///
/// `coeffs[i]` multiplies `x^i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coeffs: Vec<f64>,
}

impl Polynomial {
    pub fn new(coeffs: Vec<f64>) -> Self {
        Self { coeffs }
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coeffs
    }

    /// Degree ignoring zero leading coefficients (0 for constants)
    pub fn degree(&self) -> usize {
        self.coeffs
            .iter()
            .rposition(|&c| c != 0.0)
            .unwrap_or(0)
    }

    pub fn eval(&self, x: f64) -> f64 {
        self.coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
    }

    pub fn derivative(&self) -> Polynomial {
        if self.coeffs.len() <= 1 {
            return Polynomial::new(vec![0.0]);
        }
        Polynomial::new(
            self.coeffs
                .iter()
                .enumerate()
                .skip(1)
                .map(|(i, &c)| c * i as f64)
                .collect(),
        )
    }

    /// All complex roots
    ///
    /// Uses simultaneous Durand-Kerner iteration on the monic polynomial,
    /// starting from points spread on a circle of the Cauchy root bound.
    pub fn roots(&self) -> Vec<Complex64> {
        let degree = self.degree();
        if degree == 0 {
            return Vec::new();
        }

        let lead = self.coeffs[degree];
        let monic: Vec<f64> = self.coeffs[..=degree].iter().map(|c| c / lead).collect();
        if degree == 1 {
            return vec![Complex64::new(-monic[0], 0.0)];
        }

        let bound = 1.0
            + monic[..degree]
                .iter()
                .map(|c| c.abs())
                .fold(0.0, f64::max);

        let mut roots: Vec<Complex64> = (0..degree)
            .map(|k| {
                let angle = 2.0 * std::f64::consts::PI * k as f64 / degree as f64 + 0.4;
                Complex64::from_polar(bound, angle)
            })
            .collect();

        for _ in 0..ROOT_MAX_ITERATIONS {
            let mut max_step: f64 = 0.0;
            for i in 0..degree {
                let z = roots[i];
                let numerator = eval_monic(&monic, z);
                let denominator = roots
                    .iter()
                    .enumerate()
                    .filter(|&(j, _)| j != i)
                    .fold(Complex64::new(1.0, 0.0), |acc, (_, &r)| acc * (z - r));
                if denominator.norm() == 0.0 {
                    continue;
                }
                let step = numerator / denominator;
                roots[i] = z - step;
                max_step = max_step.max(step.norm());
            }
            if max_step < ROOT_EPSILON * bound {
                break;
            }
        }

        roots
    }

    /// Real roots strictly inside `(lo, hi)`, sorted ascending
    ///
    /// A root counts as real when its imaginary part is below `imag_tolerance`.
    pub fn real_roots_in(&self, lo: f64, hi: f64, imag_tolerance: f64) -> Vec<f64> {
        let mut real: Vec<f64> = self
            .roots()
            .into_iter()
            .filter(|r| r.im.abs() < imag_tolerance)
            .map(|r| r.re)
            .filter(|&r| r > lo && r < hi)
            .collect();
        real.sort_by(f64::total_cmp);
        real
    }

    /// Weighted least-squares polynomial fit
    ///
    /// Minimizes `sum((w[i] * (y[i] - p(x[i])))^2)`. The Vandermonde columns
    /// are scaled to unit norm and the system is solved by Householder QR.
    ///
    /// # Errors
    /// Returns `AnalysisError::InsufficientData` for mismatched inputs, fewer
    /// points than coefficients, or a rank-deficient design.
    pub fn fit_weighted(x: &[f64], y: &[f64], w: &[f64], degree: usize) -> Result<Polynomial> {
        let rows = x.len();
        let cols = degree + 1;
        if y.len() != rows || w.len() != rows {
            return Err(AnalysisError::InsufficientData(format!(
                "fit inputs differ in length: {} x, {} y, {} weights",
                rows,
                y.len(),
                w.len()
            )));
        }
        if rows < cols {
            return Err(AnalysisError::InsufficientData(format!(
                "need {} points for a degree {} fit, have {}",
                cols, degree, rows
            )));
        }

        // Row-major weighted Vandermonde matrix
        let mut a: Vec<Vec<f64>> = x
            .iter()
            .zip(w)
            .map(|(&xi, &wi)| (0..cols).map(|j| wi * xi.powi(j as i32)).collect())
            .collect();
        let mut b: Vec<f64> = y.iter().zip(w).map(|(&yi, &wi)| wi * yi).collect();

        let scale: Vec<f64> = (0..cols)
            .map(|j| {
                let norm = a.iter().map(|row| row[j] * row[j]).sum::<f64>().sqrt();
                if norm > 0.0 { norm } else { 1.0 }
            })
            .collect();
        for row in a.iter_mut() {
            for (value, s) in row.iter_mut().zip(&scale) {
                *value /= s;
            }
        }

        householder_reduce(&mut a, &mut b, cols);

        let mut coeffs = vec![0.0; cols];
        for k in (0..cols).rev() {
            let diagonal = a[k][k];
            if diagonal.abs() < f64::EPSILON * rows as f64 {
                return Err(AnalysisError::InsufficientData(
                    "rank-deficient polynomial fit".to_string(),
                ));
            }
            let tail: f64 = ((k + 1)..cols).map(|j| a[k][j] * coeffs[j]).sum();
            coeffs[k] = (b[k] - tail) / diagonal;
        }

        Ok(Polynomial::new(
            coeffs.iter().zip(&scale).map(|(c, s)| c / s).collect(),
        ))
    }
}

fn eval_monic(monic: &[f64], z: Complex64) -> Complex64 {
    monic
        .iter()
        .rev()
        .fold(Complex64::new(0.0, 0.0), |acc, &c| acc * z + c)
}

/// Triangularize `a` in place, applying the same reflections to `b`
fn householder_reduce(a: &mut [Vec<f64>], b: &mut [f64], cols: usize) {
    let rows = a.len();
    for k in 0..cols {
        let norm = (k..rows).map(|i| a[i][k] * a[i][k]).sum::<f64>().sqrt();
        if norm == 0.0 {
            continue;
        }
        let alpha = if a[k][k] > 0.0 { -norm } else { norm };

        let mut v: Vec<f64> = (k..rows).map(|i| a[i][k]).collect();
        v[0] -= alpha;
        let v_norm_sq: f64 = v.iter().map(|x| x * x).sum();
        if v_norm_sq == 0.0 {
            continue;
        }

        for j in k..cols {
            let dot: f64 = v.iter().zip(k..rows).map(|(vi, i)| vi * a[i][j]).sum();
            let factor = 2.0 * dot / v_norm_sq;
            for (vi, i) in v.iter().zip(k..rows) {
                a[i][j] -= factor * vi;
            }
        }
        let dot: f64 = v.iter().zip(k..rows).map(|(vi, i)| vi * b[i]).sum();
        let factor = 2.0 * dot / v_norm_sq;
        for (vi, i) in v.iter().zip(k..rows) {
            b[i] -= factor * vi;
        }
    }
}
