use serde::{Deserialize, Serialize};

use crate::momenta::ThreeVector;

/// A symmetrized vertex kernel, evaluated on the ordered momenta
/// incident to one vertex.
pub trait VertexKernel {
    fn evaluate(&self, momenta: &[ThreeVector]) -> f64;
}

impl<F: Fn(&[ThreeVector]) -> f64> VertexKernel for F {
    fn evaluate(&self, momenta: &[ThreeVector]) -> f64 {
        self(momenta)
    }
}

/// The kernel that is identically one, i.e. a plain density vertex.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct UnitKernel;

impl VertexKernel for UnitKernel {
    fn evaluate(&self, _momenta: &[ThreeVector]) -> f64 {
        1.0
    }
}

/// Which family of kernels a vertex draws from. The set of kinds is
/// closed by perturbative order.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Deserialize,
    Serialize,
)]
pub enum KernelType {
    /// Standard perturbation theory kernels.
    Spt,
    /// Effective field theory counterterm kernels, with their
    /// coefficients folded in.
    Eft,
}

/// Supplies the kernel for a vertex with `n` incident propagators.
pub trait KernelFamily {
    fn order(&self, n: usize) -> &dyn VertexKernel;
}

/// A family of unit kernels at every order.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct UnitKernels;

impl KernelFamily for UnitKernels {
    fn order(&self, _n: usize) -> &dyn VertexKernel {
        &UnitKernel
    }
}
