//! Fixed-point acceleration for implicit coupling (`spec.md` §4.5, §4.9, §9).
//!
//! An implicit [`crate::scheme::CouplingScheme`] repeats a time window until
//! every participant's residual falls below its convergence tolerance. Left
//! alone, that fixed-point iteration converges slowly or not at all; an
//! [`Accelerator`] relaxes the new iterate toward the old one (or, for IQN,
//! along a quasi-Newton update built from the iteration history) to speed
//! that up. The scheme owns one `Box<dyn Accelerator>` and calls
//! [`Accelerator::accelerate`] once per iteration, after every participant's
//! data has been exchanged and before convergence is checked against it.

/// One named data array's values as seen by an accelerator: current
/// (post-exchange) values and the values from the start of this iteration.
/// Accelerators read both but only ever write `current`.
pub struct AcceleratedValues<'a> {
    pub current: &'a mut [f64],
    pub iteration_start: &'a [f64],
}

pub trait Accelerator {
    /// Adjusts `values.current` in place, blending it with
    /// `values.iteration_start` (and, for stateful accelerators, with
    /// history from prior iterations of the same window). Called once per
    /// implicit iteration for every coupling data array in the scheme.
    fn accelerate(&mut self, values: &mut [AcceleratedValues<'_>]);

    /// Clears any per-window history. Called at the start of a new time
    /// window, once the previous one has converged.
    fn reset(&mut self);
}

/// `x_new = (1 - omega) * x_old + omega * x_current`, the same relaxation
/// factor applied on every iteration of every window. The simplest
/// accelerator `spec.md` §4.9 names, and the default when none is
/// configured.
pub struct ConstantRelaxation {
    omega: f64,
}

impl ConstantRelaxation {
    pub fn new(omega: f64) -> Self {
        assert!(omega > 0.0 && omega <= 1.0, "relaxation factor must be in (0, 1]");
        Self { omega }
    }
}

impl Accelerator for ConstantRelaxation {
    fn accelerate(&mut self, values: &mut [AcceleratedValues<'_>]) {
        for v in values.iter_mut() {
            for (current, &start) in v.current.iter_mut().zip(v.iteration_start.iter()) {
                *current = (1.0 - self.omega) * start + self.omega * *current;
            }
        }
    }

    fn reset(&mut self) {}
}

/// Aitken's Δ² method: a constant-relaxation accelerator whose factor is
/// re-derived every iteration from the ratio of successive residuals,
/// rather than fixed up front. Falls back to `initial_omega` on the first
/// iteration of each window, when there is no previous residual to compare
/// against.
pub struct AitkenRelaxation {
    initial_omega: f64,
    omega: Option<f64>,
    previous_residual: Option<Vec<f64>>,
}

impl AitkenRelaxation {
    pub fn new(initial_omega: f64) -> Self {
        Self { initial_omega, omega: None, previous_residual: None }
    }

    fn residual(values: &[AcceleratedValues<'_>]) -> Vec<f64> {
        values
            .iter()
            .flat_map(|v| v.current.iter().zip(v.iteration_start.iter()).map(|(c, s)| c - s))
            .collect()
    }
}

impl Accelerator for AitkenRelaxation {
    fn accelerate(&mut self, values: &mut [AcceleratedValues<'_>]) {
        let residual = Self::residual(values);

        let omega = match &self.previous_residual {
            None => self.omega.unwrap_or(self.initial_omega),
            Some(previous) => {
                let diff: Vec<f64> = residual.iter().zip(previous.iter()).map(|(r, p)| r - p).collect();
                let diff_norm_sq: f64 = diff.iter().map(|d| d * d).sum();
                let previous_omega = self.omega.unwrap_or(self.initial_omega);
                if diff_norm_sq == 0.0 {
                    previous_omega
                } else {
                    let dot: f64 = previous.iter().zip(diff.iter()).map(|(p, d)| p * d).sum();
                    -previous_omega * dot / diff_norm_sq
                }
            }
        };
        self.omega = Some(omega);

        for v in values.iter_mut() {
            for (current, &start) in v.current.iter_mut().zip(v.iteration_start.iter()) {
                *current = (1.0 - omega) * start + omega * *current;
            }
        }
        self.previous_residual = Some(residual);
    }

    fn reset(&mut self) {
        self.omega = None;
        self.previous_residual = None;
    }
}

/// Interface quasi-Newton acceleration (IQN-ILS), `spec.md` §9's rationale
/// for keeping `Accelerator` an interface rather than a fixed enum of
/// strategies. Builds a least-squares update from the accumulated history
/// of residuals and iterates across the current window, falling back to
/// constant relaxation on the first iteration when no history exists yet.
pub struct IqnIls {
    initial_omega: f64,
    residual_history: Vec<Vec<f64>>,
    iterate_history: Vec<Vec<f64>>,
    max_history: usize,
}

impl IqnIls {
    pub fn new(initial_omega: f64, max_history: usize) -> Self {
        Self { initial_omega, residual_history: Vec::new(), iterate_history: Vec::new(), max_history }
    }

    fn flatten_current(values: &[AcceleratedValues<'_>]) -> Vec<f64> {
        values.iter().flat_map(|v| v.current.iter().copied()).collect()
    }

    fn flatten_residual(values: &[AcceleratedValues<'_>]) -> Vec<f64> {
        values
            .iter()
            .flat_map(|v| v.current.iter().zip(v.iteration_start.iter()).map(|(c, s)| c - s))
            .collect()
    }
}

impl Accelerator for IqnIls {
    fn accelerate(&mut self, values: &mut [AcceleratedValues<'_>]) {
        let residual = Self::flatten_residual(values);
        let iterate = Self::flatten_current(values);

        if self.residual_history.is_empty() {
            for v in values.iter_mut() {
                for (current, &start) in v.current.iter_mut().zip(v.iteration_start.iter()) {
                    *current = (1.0 - self.initial_omega) * start + self.initial_omega * *current;
                }
            }
            self.residual_history.push(residual);
            self.iterate_history.push(iterate);
            return;
        }

        // Least-squares combination over the residual history: weights
        // minimizing the norm of `sum(w_i * delta_residual_i) - (-residual)`,
        // solved by the normal equations of the small (history-length ×
        // history-length) system. With a single prior iteration this
        // reduces to the same secant step as Aitken relaxation.
        let deltas_r: Vec<Vec<f64>> = self
            .residual_history
            .windows(2)
            .map(|w| w[1].iter().zip(w[0].iter()).map(|(a, b)| a - b).collect())
            .chain(std::iter::once(
                residual
                    .iter()
                    .zip(self.residual_history.last().unwrap().iter())
                    .map(|(a, b)| a - b)
                    .collect::<Vec<f64>>(),
            ))
            .collect();
        let deltas_x: Vec<Vec<f64>> = self
            .iterate_history
            .windows(2)
            .map(|w| w[1].iter().zip(w[0].iter()).map(|(a, b)| a - b).collect())
            .chain(std::iter::once(
                iterate
                    .iter()
                    .zip(self.iterate_history.last().unwrap().iter())
                    .map(|(a, b)| a - b)
                    .collect::<Vec<f64>>(),
            ))
            .collect();

        let m = deltas_r.len();
        let mut gram = vec![vec![0.0; m]; m];
        let mut rhs = vec![0.0; m];
        for i in 0..m {
            for j in 0..m {
                gram[i][j] = deltas_r[i].iter().zip(deltas_r[j].iter()).map(|(a, b)| a * b).sum();
            }
            rhs[i] = -deltas_r[i].iter().zip(residual.iter()).map(|(a, b)| a * b).sum::<f64>();
        }
        let weights = solve_small_system(&gram, &rhs);

        let mut update = residual.clone();
        for (w, (dr, dx)) in weights.iter().zip(deltas_r.iter().zip(deltas_x.iter())) {
            for k in 0..update.len() {
                update[k] += w * (dx[k] - dr[k]);
            }
        }

        let mut offset = 0;
        for v in values.iter_mut() {
            let len = v.current.len();
            for k in 0..len {
                v.current[k] = v.iteration_start[k] + update[offset + k];
            }
            offset += len;
        }

        self.residual_history.push(residual);
        self.iterate_history.push(iterate);
        if self.residual_history.len() > self.max_history {
            self.residual_history.remove(0);
            self.iterate_history.remove(0);
        }
    }

    fn reset(&mut self) {
        self.residual_history.clear();
        self.iterate_history.clear();
    }
}

/// Solves a small dense linear system by Gaussian elimination with partial
/// pivoting. `IqnIls`'s Gram matrix is at most `max_history`-square, far
/// too small to warrant pulling in a linear algebra crate.
fn solve_small_system(a: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut m: Vec<Vec<f64>> = a.iter().cloned().collect();
    let mut rhs = b.to_vec();

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| m[i][col].abs().partial_cmp(&m[j][col].abs()).unwrap()).unwrap();
        m.swap(col, pivot);
        rhs.swap(col, pivot);
        if m[col][col].abs() < 1e-300 {
            continue;
        }
        for row in (col + 1)..n {
            let factor = m[row][col] / m[col][col];
            for k in col..n {
                m[row][k] -= factor * m[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = rhs[row];
        for k in (row + 1)..n {
            sum -= m[row][k] * x[k];
        }
        x[row] = if m[row][row].abs() < 1e-300 { 0.0 } else { sum / m[row][row] };
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_relaxation_blends_toward_old_value() {
        let mut current = [2.0];
        let start = [0.0];
        let mut values = [AcceleratedValues { current: &mut current, iteration_start: &start }];
        let mut accel = ConstantRelaxation::new(0.5);
        accel.accelerate(&mut values);
        assert_eq!(current_of(&values), vec![1.0]);
    }

    fn current_of(values: &[AcceleratedValues<'_>]) -> Vec<f64> {
        values.iter().flat_map(|v| v.current.iter().copied()).collect()
    }

    #[test]
    fn aitken_falls_back_to_initial_omega_on_first_iteration() {
        let mut current = [4.0];
        let start = [0.0];
        let mut values = [AcceleratedValues { current: &mut current, iteration_start: &start }];
        let mut accel = AitkenRelaxation::new(0.25);
        accel.accelerate(&mut values);
        assert_eq!(current_of(&values), vec![1.0]);
    }

    #[test]
    fn iqn_ils_first_iteration_matches_constant_relaxation() {
        let mut current = [4.0];
        let start = [0.0];
        let mut values = [AcceleratedValues { current: &mut current, iteration_start: &start }];
        let mut accel = IqnIls::new(0.25, 4);
        accel.accelerate(&mut values);
        assert_eq!(current_of(&values), vec![1.0]);
    }

    #[test]
    fn solve_small_system_solves_diagonal_system() {
        let a = vec![vec![2.0, 0.0], vec![0.0, 4.0]];
        let b = vec![4.0, 8.0];
        let x = solve_small_system(&a, &b);
        assert!((x[0] - 2.0).abs() < 1e-9);
        assert!((x[1] - 2.0).abs() < 1e-9);
    }
}
