use std::ops::Index;

use nalgebra::Vector3;

use crate::labels::{MomentumLabel, MomentumMap};

pub type ThreeVector = Vector3<f64>;

/// Builds a vector from spherical coordinates `(r, cos θ, φ)`.
pub fn from_spherical(r: f64, costheta: f64, phi: f64) -> ThreeVector {
    let sintheta = (1.0 - costheta * costheta).max(0.0).sqrt();
    ThreeVector::new(
        r * sintheta * phi.cos(),
        r * sintheta * phi.sin(),
        r * costheta,
    )
}

/// One phase-space point: a concrete vector for every momentum label.
///
/// The map is total over the label set, so labels a diagram does not
/// reference are simply never read.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DiagramMomenta {
    values: MomentumMap<ThreeVector>,
}

impl DiagramMomenta {
    pub fn new(values: MomentumMap<ThreeVector>) -> Self {
        Self { values }
    }

    pub fn zero() -> Self {
        Self {
            values: MomentumMap::from_fn(|_| ThreeVector::zeros()),
        }
    }

    /// External configuration with the loop momentum at the origin.
    pub fn external(
        k1: ThreeVector,
        k2: ThreeVector,
        k3: ThreeVector,
        k4: ThreeVector,
    ) -> Self {
        Self::zero()
            .with(MomentumLabel::K1, k1)
            .with(MomentumLabel::K2, k2)
            .with(MomentumLabel::K3, k3)
            .with(MomentumLabel::K4, k4)
    }

    pub fn with(mut self, label: MomentumLabel, p: ThreeVector) -> Self {
        self.values[label] = p;
        self
    }

    pub fn set(&mut self, label: MomentumLabel, p: ThreeVector) {
        self.values[label] = p;
    }

    /// Copy with the loop momentum replaced.
    pub fn with_loop(&self, q: ThreeVector) -> Self {
        self.with(MomentumLabel::LOOP, q)
    }

    /// Copy where every label reads the value held by its image under
    /// `map`.
    pub(crate) fn permuted(&self, map: &MomentumMap<MomentumLabel>) -> Self {
        Self {
            values: MomentumMap::from_fn(|label| self.values[map[label]]),
        }
    }
}

impl Index<MomentumLabel> for DiagramMomenta {
    type Output = ThreeVector;

    fn index(&self, label: MomentumLabel) -> &ThreeVector {
        &self.values[label]
    }
}
