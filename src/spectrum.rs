use std::ops::Index;

use log::debug;

use crate::diagram::{Diagram, DiagramError, Order};
use crate::integrate::{subseed, IntegralResult, Integrator, LoopPhaseSpace};
use crate::kernel::KernelFamily;
use crate::labels::MomentumLabel;
use crate::momenta::{DiagramMomenta, ThreeVector};
use crate::power_spectrum::LinearPowerSpectrum;
use crate::topology::{DiagramClass, DiagramSet, SpectrumGraph};

const DEFAULT_QMAX: f64 = 10.0;

/// The two-point observable: tree, one-loop and counterterm
/// contributions to the density power spectrum.
pub struct Spectrum<'a> {
    diagrams: DiagramSet<'a, SpectrumGraph>,
    qmax: f64,
    seed: u64,
}

impl<'a> Spectrum<'a> {
    pub fn new(
        order: Order,
        pl: &'a dyn LinearPowerSpectrum,
        spt: &'a dyn KernelFamily,
        eft: &'a dyn KernelFamily,
    ) -> Result<Self, DiagramError> {
        Ok(Self {
            diagrams: DiagramSet::new(order, pl, spt, eft)?,
            qmax: DEFAULT_QMAX,
            seed: 0,
        })
    }

    /// Upper bound on the loop-momentum magnitude.
    pub fn set_qmax(&mut self, qmax: f64) {
        self.qmax = qmax;
    }

    /// Seed handed to the loop integrator.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    pub fn diagram(&self, graph: SpectrumGraph) -> Option<&Diagram<'a>> {
        self.diagrams.get(graph)
    }

    fn momenta(k: f64) -> DiagramMomenta {
        let kvec = ThreeVector::new(0.0, 0.0, k);
        DiagramMomenta::zero()
            .with(MomentumLabel::K1, -kvec)
            .with(MomentumLabel::K2, kvec)
    }

    /// Tree-level spectrum, differential in k.
    pub fn tree(&self, k: f64) -> f64 {
        let momenta = Self::momenta(k);
        self.diagrams
            .of_class(DiagramClass::Tree)
            .map(|(_, diagram)| diagram.value_base(&momenta))
            .sum()
    }

    /// One-loop contribution, integrated over the loop momentum. Each
    /// loop diagram is integrated independently under its own sub-seed;
    /// errors combine in quadrature.
    pub fn loop_spt(
        &self,
        integrator: &dyn Integrator,
        k: f64,
    ) -> IntegralResult {
        let momenta = Self::momenta(k);
        let phase_space = LoopPhaseSpace::new(self.qmax);
        self.diagrams
            .of_class(DiagramClass::Loop)
            .enumerate()
            .map(|(n, (graph, diagram))| {
                let mut integrand = |x: &[f64]| {
                    let (jacobian, q) = phase_space.sample(x);
                    jacobian * diagram.value_ir_reg(&momenta.with_loop(q))
                };
                let result = integrator.integrate(
                    3,
                    subseed(self.seed, n as u64),
                    &mut integrand,
                );
                debug!(
                    "{graph:?}: {} +- {}",
                    result.value, result.error
                );
                result
            })
            .sum()
    }

    /// EFT counterterm contribution, differential in k.
    pub fn cterms_eft(&self, k: f64) -> f64 {
        let momenta = Self::momenta(k);
        self.diagrams
            .of_class(DiagramClass::Counterterm)
            .map(|(_, diagram)| diagram.value_base(&momenta))
            .sum()
    }
}

impl<'a> Index<SpectrumGraph> for Spectrum<'a> {
    type Output = Diagram<'a>;

    fn index(&self, graph: SpectrumGraph) -> &Self::Output {
        &self.diagrams[graph]
    }
}
