use std::f64::consts::PI;
use std::iter::Sum;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::momenta::{from_spherical, ThreeVector};

/// Estimate, uncertainty and convergence diagnostic of one numerical
/// integration.
#[derive(Copy, Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct IntegralResult {
    pub value: f64,
    pub error: f64,
    pub neval: u64,
    pub converged: bool,
}

impl Sum for IntegralResult {
    /// Accumulates independent estimates; errors combine in quadrature.
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        let mut value = 0.0;
        let mut variance = 0.0;
        let mut neval = 0;
        let mut converged = true;
        for r in iter {
            value += r.value;
            variance += r.error * r.error;
            neval += r.neval;
            converged &= r.converged;
        }
        Self {
            value,
            error: variance.sqrt(),
            neval,
            converged,
        }
    }
}

/// Numerical integrator over the unit hypercube. Integrands map their
/// own phase space and carry the jacobian.
pub trait Integrator {
    fn integrate(
        &self,
        dim: usize,
        seed: u64,
        integrand: &mut dyn FnMut(&[f64]) -> f64,
    ) -> IntegralResult;
}

/// Sample-mean Monte Carlo integration with a fixed call budget.
///
/// Each call seeds its own generator, so a given seed reproduces the
/// result bit for bit. Parallel use requires a distinct [`subseed`]
/// per worker.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PlainMonteCarlo {
    pub calls: u64,
    pub rel_tol: f64,
}

impl Default for PlainMonteCarlo {
    fn default() -> Self {
        Self {
            calls: 100_000,
            rel_tol: 1e-2,
        }
    }
}

impl PlainMonteCarlo {
    pub fn with_calls(calls: u64) -> Self {
        Self {
            calls,
            ..Self::default()
        }
    }
}

impl Integrator for PlainMonteCarlo {
    fn integrate(
        &self,
        dim: usize,
        seed: u64,
        integrand: &mut dyn FnMut(&[f64]) -> f64,
    ) -> IntegralResult {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut x = vec![0.0; dim];
        let mut mean = 0.0;
        let mut m2 = 0.0;
        for n in 1..=self.calls {
            for xi in &mut x {
                *xi = rng.gen();
            }
            let f = integrand(&x);
            let delta = f - mean;
            mean += delta / n as f64;
            m2 += delta * (f - mean);
        }
        let error = if self.calls > 1 {
            (m2 / (self.calls - 1) as f64 / self.calls as f64).sqrt()
        } else {
            f64::INFINITY
        };
        let converged = error <= self.rel_tol * mean.abs();
        debug!(
            "plain MC over {dim} dims, {} calls: {mean} +- {error}",
            self.calls
        );
        IntegralResult {
            value: mean,
            error,
            neval: self.calls,
            converged,
        }
    }
}

/// Deterministic sub-seed for the `n`-th independent integral under a
/// top-level seed (a splitmix64 step), so that workers never share a
/// random stream.
pub fn subseed(seed: u64, n: u64) -> u64 {
    let mut z = seed.wrapping_add(n.wrapping_mul(0x9e37_79b9_7f4a_7c15));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Maps unit-cube samples onto the ball |q| <= qmax.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LoopPhaseSpace {
    qmax: f64,
}

impl LoopPhaseSpace {
    pub fn new(qmax: f64) -> Self {
        Self { qmax }
    }

    pub fn qmax(&self) -> f64 {
        self.qmax
    }

    /// The jacobian and loop momentum for a unit-cube point; needs the
    /// first three coordinates of `x`.
    pub fn sample(&self, x: &[f64]) -> (f64, ThreeVector) {
        let r = self.qmax * x[0];
        let costheta = 2.0 * x[1] - 1.0;
        let phi = 2.0 * PI * x[2];
        let jacobian = 4.0 * PI * self.qmax * r * r;
        (jacobian, from_spherical(r, costheta, phi))
    }
}

/// Uniform average over the orientations of a unit vector.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct AngularPhaseSpace;

impl AngularPhaseSpace {
    /// The (unit) jacobian of the orientation average and the sampled
    /// direction; needs the first two coordinates of `x`.
    pub fn sample(&self, x: &[f64]) -> (f64, ThreeVector) {
        let costheta = 2.0 * x[0] - 1.0;
        let phi = 2.0 * PI * x[1];
        (1.0, from_spherical(1.0, costheta, phi))
    }
}
