//! Bounded Nelder–Mead minimization with random restarts, as used to fit the
//! per-fraction normalization factors

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// The inclusive search interval of one parameter
#[derive(Copy, Clone, Debug)]
pub struct ParameterBounds {
    pub min: f64,
    pub max: f64,
}

impl ParameterBounds {
    /// # Panics
    /// When `min >= max`.
    pub fn new(min: f64, max: f64) -> Self {
        assert!(min < max, "min {min} is not smaller than max {max}");
        Self { min, max }
    }
}

/// One evaluated parameter set
#[derive(Clone, Debug)]
pub struct OptimizerResult {
    pub error: f64,
    pub parameters: Vec<f64>,
}

/// Nelder–Mead simplex minimization from a given starting point, restarted
/// `max_restarts` times with randomly perturbed simplexes. Parameters are
/// clamped to their bounds on every step.
pub struct NelderMead {
    bounds: Vec<ParameterBounds>,
    start: Vec<f64>,
    max_restarts: usize,
    no_improvement_threshold: f64,
    max_iterations_without_improvement: usize,
    alpha: f64,
    gamma: f64,
    rho: f64,
    sigma: f64,
    rng: StdRng,
}

impl NelderMead {
    /// # Panics
    /// When no parameters are given or the starting point does not match them.
    pub fn new(bounds: Vec<ParameterBounds>, start: Vec<f64>, max_restarts: usize) -> Self {
        assert!(!bounds.is_empty(), "at least one parameter is needed");
        assert_eq!(
            bounds.len(),
            start.len(),
            "the starting point must give a value for every parameter"
        );
        // seeded from the starting point to keep runs reproducible
        let rng = StdRng::seed_from_u64(start[0].to_bits());
        Self {
            bounds,
            start,
            max_restarts,
            no_improvement_threshold: 0.001,
            max_iterations_without_improvement: 5,
            alpha: 1.0,
            gamma: 2.0,
            rho: -0.5,
            sigma: 0.5,
            rng,
        }
    }

    /// Minimize the function and return the best parameter set found
    pub fn optimize_best(&mut self, function: impl Fn(&[f64]) -> f64) -> OptimizerResult {
        let dim = self.bounds.len();
        let mut all_results: Vec<OptimizerResult> = Vec::new();

        for _restart in 0..self.max_restarts {
            let mut prev_best = evaluate(&function, self.start.clone());
            let mut iterations_without_improvement = 0;
            let mut results = vec![prev_best.clone()];

            // build the simplex around the starting point,
            // sized between 2% and 8% of each parameter's range
            for i in 0..dim {
                let a = (0.02 + 0.08 * self.rng.gen::<f64>())
                    * (self.bounds[i].max - self.bounds[i].min);
                let p = a * ((dim as f64 + 1.0).sqrt() + dim as f64 - 1.0)
                    / (dim as f64 * 2.0_f64.sqrt());
                let q = a * ((dim as f64 + 1.0).sqrt() - 1.0) / (dim as f64 * 2.0_f64.sqrt());

                let mut x = self.start.clone();
                x[i] += p;
                for (j, value) in x.iter_mut().enumerate() {
                    if j != i {
                        *value += q;
                    }
                }
                self.bound_check(&mut x);
                results.push(evaluate(&function, x));
            }

            loop {
                results.sort_by(|a, b| a.error.total_cmp(&b.error));
                let best = results[0].clone();

                let percent_improvement = -((best.error - prev_best.error) / prev_best.error);
                if percent_improvement > self.no_improvement_threshold {
                    iterations_without_improvement = 0;
                    prev_best = best;
                } else {
                    iterations_without_improvement += 1;
                }

                if iterations_without_improvement >= self.max_iterations_without_improvement {
                    all_results.append(&mut results);
                    break;
                }

                // centroid of all but the worst point
                let mut x0 = vec![0.0; dim];
                for result in &results[..results.len() - 1] {
                    for (i, parameter) in result.parameters.iter().enumerate() {
                        x0[i] += parameter / (results.len() - 1) as f64;
                    }
                }
                self.bound_check(&mut x0);

                // reflection
                let last = results.last().unwrap().clone();
                let mut xr = x0.clone();
                for i in 0..dim {
                    xr[i] += (x0[i] - last.parameters[i]) * self.alpha;
                }
                self.bound_check(&mut xr);
                let reflection = evaluate(&function, xr);

                let first = results[0].error;
                if first <= reflection.error && reflection.error < results[results.len() - 2].error
                {
                    results.pop();
                    results.push(reflection);
                    continue;
                }

                // expansion
                if reflection.error < first {
                    let mut xe = x0.clone();
                    for i in 0..dim {
                        xe[i] += (x0[i] - last.parameters[i]) * self.gamma;
                    }
                    self.bound_check(&mut xe);
                    let expansion = evaluate(&function, xe);
                    results.pop();
                    if expansion.error < reflection.error {
                        results.push(expansion);
                    } else {
                        results.push(reflection);
                    }
                    continue;
                }

                // contraction
                let mut xc = x0.clone();
                for i in 0..dim {
                    xc[i] += (x0[i] - last.parameters[i]) * self.rho;
                }
                self.bound_check(&mut xc);
                let contraction = evaluate(&function, xc);
                if contraction.error < last.error {
                    results.pop();
                    results.push(contraction);
                    continue;
                }

                // shrink towards the best point
                let x1 = results[0].parameters.clone();
                let mut shrunk = Vec::with_capacity(results.len());
                for result in &results {
                    let mut xs = x1.clone();
                    for i in 0..dim {
                        xs[i] += (x1[i] - result.parameters[i]) * self.sigma;
                    }
                    self.bound_check(&mut xs);
                    shrunk.push(evaluate(&function, xs));
                }
                results = shrunk;
            }
        }

        all_results.retain(|result| !result.error.is_nan());
        all_results
            .into_iter()
            .min_by(|a, b| a.error.total_cmp(&b.error))
            .unwrap_or_else(|| evaluate(&function, self.start.clone()))
    }

    fn bound_check(&self, parameters: &mut [f64]) {
        for (parameter, bounds) in parameters.iter_mut().zip(&self.bounds) {
            *parameter = parameter.clamp(bounds.min, bounds.max);
        }
    }
}

fn evaluate(function: &impl Fn(&[f64]) -> f64, parameters: Vec<f64>) -> OptimizerResult {
    let error = function(&parameters);
    OptimizerResult { error, parameters }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_quadratic_minimum() {
        let bounds = vec![ParameterBounds::new(0.3, 3.0), ParameterBounds::new(0.3, 3.0)];
        let mut optimizer = NelderMead::new(bounds, vec![1.0, 1.0], 10);
        let result =
            optimizer.optimize_best(|x| (x[0] - 2.0).powi(2) + (x[1] - 0.5).powi(2));
        assert!((result.parameters[0] - 2.0).abs() < 0.01);
        assert!((result.parameters[1] - 0.5).abs() < 0.01);
    }

    #[test]
    fn respects_bounds() {
        let bounds = vec![ParameterBounds::new(0.3, 3.0)];
        let mut optimizer = NelderMead::new(bounds, vec![1.0], 10);
        // unconstrained minimum at 10, the bound caps it at 3
        let result = optimizer.optimize_best(|x| (x[0] - 10.0).powi(2));
        assert!(result.parameters[0] <= 3.0);
        assert!(result.parameters[0] > 2.9);
    }

    #[test]
    fn deterministic_for_a_fixed_start() {
        let bounds = vec![ParameterBounds::new(0.3, 3.0), ParameterBounds::new(0.3, 3.0)];
        let run = || {
            NelderMead::new(bounds.clone(), vec![1.0, 1.0], 5)
                .optimize_best(|x| (x[0] - 1.7).powi(2) + (x[1] - 0.9).powi(2))
        };
        let a = run();
        let b = run();
        assert_eq!(a.parameters, b.parameters);
    }
}
