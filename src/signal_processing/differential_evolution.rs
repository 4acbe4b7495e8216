use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::RngExt;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{AnalysisError, Result};

/// Shared cancellation flag for long-running fits
///
/// Clones observe the same flag. Optimizers check it once per generation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Best point found by [`DifferentialEvolution::minimize`]
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub energy: f64,
    pub generations: usize,
}

/// Box-constrained derivative-free global minimizer
///
/// Classic `best/1/bin` differential evolution with Latin hypercube
/// initialisation, a mutation factor dithered in `[0.5, 1)` once per
/// generation and crossover probability 0.7. Trial components that leave
/// the box are redrawn uniformly inside it.
///
/// The run converges when the standard deviation of the population
/// energies drops to `tolerance * |mean energy|`. Runs are reproducible for
/// a given seed.
#[derive(Debug, Clone)]
pub struct DifferentialEvolution {
    bounds: Vec<(f64, f64)>,
    population_factor: usize,
    max_generations: usize,
    tolerance: f64,
    seed: u64,
}

const CROSSOVER_PROBABILITY: f64 = 0.7;
const MUTATION_MIN: f64 = 0.5;
const MUTATION_MAX: f64 = 1.0;

impl DifferentialEvolution {
    /// # Arguments
    /// * `bounds` - `(low, high)` per parameter, `low <= high`
    /// * `population_factor` - Population members per parameter
    /// * `max_generations` - Generation budget
    /// * `tolerance` - Relative energy spread that counts as converged
    /// * `seed` - Generator seed
    pub fn new(
        bounds: Vec<(f64, f64)>,
        population_factor: usize,
        max_generations: usize,
        tolerance: f64,
        seed: u64,
    ) -> Self {
        Self {
            bounds,
            population_factor,
            max_generations,
            tolerance,
            seed,
        }
    }

    /// Minimize `objective` inside the bounds
    ///
    /// # Errors
    /// Returns `AnalysisError::FitFailed` for invalid bounds, when the
    /// generation budget runs out before convergence, or when `cancel` is
    /// triggered.
    pub fn minimize<F>(&self, objective: F, cancel: &CancelToken) -> Result<Minimum>
    where
        F: Fn(&[f64]) -> f64,
    {
        let dims = self.bounds.len();
        if dims == 0 {
            return Err(AnalysisError::FitFailed("no parameters to fit".to_string()));
        }
        if self
            .bounds
            .iter()
            .any(|&(lo, hi)| !lo.is_finite() || !hi.is_finite() || lo > hi)
        {
            return Err(AnalysisError::FitFailed(format!(
                "invalid search bounds {:?}",
                self.bounds
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        // Population size must leave room for the candidate and two donors
        let size = (self.population_factor * dims).max(5);

        // Members live in the unit cube and are scaled on evaluation
        let mut population = latin_hypercube(&mut rng, size, dims);
        let mut energies: Vec<f64> = population
            .iter()
            .map(|member| objective(&self.scale(member)))
            .collect();
        let mut best = argmin(&energies);

        for generation in 1..=self.max_generations {
            if cancel.is_cancelled() {
                return Err(AnalysisError::FitFailed("cancelled".to_string()));
            }

            let mutation = MUTATION_MIN + (MUTATION_MAX - MUTATION_MIN) * rng.random::<f64>();

            for candidate in 0..size {
                let (r0, r1) = pick_donors(&mut rng, size, candidate);
                let forced = pick_index(&mut rng, dims);

                let mut trial = population[candidate].clone();
                for j in 0..dims {
                    if j == forced || rng.random::<f64>() < CROSSOVER_PROBABILITY {
                        trial[j] = population[best][j]
                            + mutation * (population[r0][j] - population[r1][j]);
                    }
                }
                for value in trial.iter_mut() {
                    if !(0.0..=1.0).contains(&*value) {
                        *value = rng.random::<f64>();
                    }
                }

                let energy = objective(&self.scale(&trial));
                if energy <= energies[candidate] {
                    population[candidate] = trial;
                    energies[candidate] = energy;
                    if energy <= energies[best] {
                        best = candidate;
                    }
                }
            }

            if self.converged(&energies) {
                log::trace!(
                    "Differential evolution converged after {} generations, energy {:.6}",
                    generation,
                    energies[best]
                );
                return Ok(Minimum {
                    x: self.scale(&population[best]),
                    energy: energies[best],
                    generations: generation,
                });
            }
        }

        Err(AnalysisError::FitFailed(format!(
            "no convergence within {} generations",
            self.max_generations
        )))
    }

    fn scale(&self, unit: &[f64]) -> Vec<f64> {
        unit.iter()
            .zip(&self.bounds)
            .map(|(u, &(lo, hi))| lo + u * (hi - lo))
            .collect()
    }

    fn converged(&self, energies: &[f64]) -> bool {
        let n = energies.len() as f64;
        let mean = energies.iter().sum::<f64>() / n;
        let variance = energies.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n;
        variance.sqrt() <= self.tolerance * mean.abs()
    }
}

fn latin_hypercube(rng: &mut ChaCha8Rng, size: usize, dims: usize) -> Vec<Vec<f64>> {
    let mut population = vec![vec![0.0; dims]; size];
    for j in 0..dims {
        let mut strata: Vec<f64> = (0..size)
            .map(|i| (i as f64 + rng.random::<f64>()) / size as f64)
            .collect();
        // Fisher-Yates
        for i in (1..size).rev() {
            strata.swap(i, pick_index(rng, i + 1));
        }
        for (member, value) in population.iter_mut().zip(strata) {
            member[j] = value;
        }
    }
    population
}

fn pick_index(rng: &mut ChaCha8Rng, len: usize) -> usize {
    ((rng.random::<f64>() * len as f64) as usize).min(len - 1)
}

/// Two distinct members, both different from `candidate`
fn pick_donors(rng: &mut ChaCha8Rng, size: usize, candidate: usize) -> (usize, usize) {
    let mut r0 = pick_index(rng, size);
    while r0 == candidate {
        r0 = pick_index(rng, size);
    }
    let mut r1 = pick_index(rng, size);
    while r1 == candidate || r1 == r0 {
        r1 = pick_index(rng, size);
    }
    (r0, r1)
}

fn argmin(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sphere(x: &[f64]) -> f64 {
        // Offset keeps the mean energy away from zero
        1.0 + (x[0] - 1.5).powi(2) + (x[1] + 0.5).powi(2)
    }

    #[test]
    fn test_finds_minimum() {
        let de = DifferentialEvolution::new(vec![(-5.0, 5.0), (-5.0, 5.0)], 15, 1000, 1e-6, 7);
        let min = de.minimize(sphere, &CancelToken::new()).unwrap();
        assert!((min.x[0] - 1.5).abs() < 1e-2, "x0 = {}", min.x[0]);
        assert!((min.x[1] + 0.5).abs() < 1e-2, "x1 = {}", min.x[1]);
        assert!(min.energy < 1.0 + 1e-3);
    }

    #[test]
    fn test_same_seed_same_result() {
        let de = DifferentialEvolution::new(vec![(-5.0, 5.0), (-5.0, 5.0)], 10, 1000, 0.01, 42);
        let a = de.minimize(sphere, &CancelToken::new()).unwrap();
        let b = de.minimize(sphere, &CancelToken::new()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_respects_bounds() {
        // Unconstrained minimum lies outside the box
        let de = DifferentialEvolution::new(vec![(0.0, 1.0), (2.0, 3.0)], 15, 1000, 1e-4, 3);
        let min = de.minimize(sphere, &CancelToken::new()).unwrap();
        assert!((0.0..=1.0).contains(&min.x[0]));
        assert!((2.0..=3.0).contains(&min.x[1]));
        assert!(min.x[0] > 0.95 && min.x[1] < 2.05, "x = {:?}", min.x);
    }

    #[test]
    fn test_cancelled_fit_fails() {
        let token = CancelToken::new();
        token.cancel();
        let de = DifferentialEvolution::new(vec![(-1.0, 1.0)], 15, 1000, 0.01, 0);
        assert_eq!(
            de.minimize(|x| 1.0 + x[0] * x[0], &token),
            Err(AnalysisError::FitFailed("cancelled".to_string()))
        );
    }

    #[test]
    fn test_budget_exhaustion_fails() {
        let de = DifferentialEvolution::new(vec![(-5.0, 5.0), (-5.0, 5.0)], 15, 1, 0.0, 0);
        assert!(matches!(
            de.minimize(sphere, &CancelToken::new()),
            Err(AnalysisError::FitFailed(_))
        ));
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
