//! Gaussian-process surrogate used by sequential model-based optimization.
//!
//! Squared-exponential kernel over inputs normalized to the unit cube,
//! fitted by Cholesky factorization. Matrices stay small (one row per
//! completed experiment), so a dense direct solve is adequate.

use ndarray::{Array1, Array2};

use crate::domain::models::Constraint;
use crate::domain::ports::errors::{AlgorithmError, Result};

pub struct GaussianProcess {
    length_scale: f64,
    signal_variance: f64,
    noise: f64,
    /// Observed inputs, unit-cube normalized.
    x: Vec<Vec<f64>>,
    y: Vec<f64>,
    y_mean: f64,
    chol: Option<Array2<f64>>,
    alpha: Option<Array1<f64>>,
}

impl GaussianProcess {
    pub fn new(length_scale: f64, noise: f64) -> Self {
        Self {
            length_scale,
            signal_variance: 1.0,
            noise,
            x: Vec::new(),
            y: Vec::new(),
            y_mean: 0.0,
            chol: None,
            alpha: None,
        }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn best_observed(&self) -> Option<f64> {
        self.y.iter().copied().fold(None, |best, v| match best {
            Some(b) if b >= v => Some(b),
            _ => Some(v),
        })
    }

    /// Add one observation and refit.
    pub fn tell(&mut self, x: Vec<f64>, y: f64) -> Result<()> {
        self.x.push(x);
        self.y.push(y);
        self.refit()
    }

    fn kernel(&self, a: &[f64], b: &[f64]) -> f64 {
        let d2: f64 = a
            .iter()
            .zip(b)
            .map(|(ai, bi)| {
                let d = (ai - bi) / self.length_scale;
                d * d
            })
            .sum();
        self.signal_variance * (-0.5 * d2).exp()
    }

    fn refit(&mut self) -> Result<()> {
        let n = self.x.len();
        self.y_mean = self.y.iter().sum::<f64>() / n as f64;
        let mut k = Array2::zeros((n, n));
        for i in 0..n {
            for j in 0..n {
                k[[i, j]] = self.kernel(&self.x[i], &self.x[j]);
            }
            k[[i, i]] += self.noise;
        }
        let chol = cholesky(&k).ok_or_else(|| {
            AlgorithmError::InvalidArgument(
                "surrogate covariance is not positive definite".to_string(),
            )
        })?;
        let centered: Array1<f64> = self.y.iter().map(|v| v - self.y_mean).collect();
        let alpha = cholesky_solve(&chol, &centered);
        self.chol = Some(chol);
        self.alpha = Some(alpha);
        Ok(())
    }

    /// Posterior mean and standard deviation at one point.
    pub fn predict(&self, x: &[f64]) -> (f64, f64) {
        let (Some(chol), Some(alpha)) = (&self.chol, &self.alpha) else {
            return (self.y_mean, self.signal_variance.sqrt());
        };
        let n = self.x.len();
        let k_star: Array1<f64> = (0..n).map(|i| self.kernel(&self.x[i], x)).collect();
        let mean = self.y_mean + k_star.dot(alpha);
        let v = forward_substitute(chol, &k_star);
        let var = (self.kernel(x, x) - v.dot(&v)).max(1e-12);
        (mean, var.sqrt())
    }

    /// Expected improvement over the best observed value (maximization).
    pub fn expected_improvement(&self, x: &[f64], xi: f64) -> f64 {
        let Some(best) = self.best_observed() else {
            return 0.0;
        };
        let (mean, std) = self.predict(x);
        if std <= 0.0 {
            return 0.0;
        }
        let imp = mean - best - xi;
        let z = imp / std;
        imp * normal_cdf(z) + std * normal_pdf(z)
    }
}

/// Normalize one real-valued point into the unit cube.
pub fn normalize(point: &[f64], constraints: &[Constraint]) -> Vec<f64> {
    point
        .iter()
        .zip(constraints)
        .map(|(v, c)| {
            if c.span() <= 0.0 {
                0.5
            } else {
                ((v - c.min) / c.span()).clamp(0.0, 1.0)
            }
        })
        .collect()
}

/// Lower-triangular Cholesky factor, or `None` if not positive definite.
fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l: Array2<f64> = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                l[[i, j]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }
    Some(l)
}

/// Solve `L z = b` for lower-triangular `L`.
fn forward_substitute(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = b.len();
    let mut z = Array1::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * z[k];
        }
        z[i] = sum / l[[i, i]];
    }
    z
}

/// Solve `L L^T x = b` by forward then backward substitution.
fn cholesky_solve(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = b.len();
    let z = forward_substitute(l, b);
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = z[i];
        for k in (i + 1)..n {
            sum -= l[[k, i]] * x[k];
        }
        x[i] = sum / l[[i, i]];
    }
    x
}

fn normal_pdf(z: f64) -> f64 {
    (-(z * z) / 2.0).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Abramowitz & Stegun 7.1.26 rational approximation, |err| < 1.5e-7.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    sign * (1.0 - poly * (-x * x).exp())
}
