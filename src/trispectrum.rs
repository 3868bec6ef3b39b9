use std::ops::Index;

use log::debug;
use thiserror::Error;

use crate::diagram::{Diagram, DiagramError, Order};
use crate::integrate::{
    subseed, AngularPhaseSpace, IntegralResult, Integrator, LoopPhaseSpace,
};
use crate::kernel::KernelFamily;
use crate::momenta::{DiagramMomenta, ThreeVector};
use crate::power_spectrum::LinearPowerSpectrum;
use crate::topology::{DiagramClass, DiagramSet, TrispectrumGraph};
use crate::window::WindowFunction;

const DEFAULT_QMAX: f64 = 10.0;

/// Raised when an averaged observable is queried before its
/// configuration is complete.
#[derive(Debug, Error)]
pub enum ObservableError {
    #[error("bin size not set, call set_k_bin_size first")]
    BinSizeNotSet,
    #[error("window function not set, call set_window_function first")]
    WindowNotSet,
}

/// The four-point observable in the covariance configuration
/// `T(k, -k, k', -k')`: tree, one-loop and counterterm contributions,
/// differential or averaged over angles, bins and a survey window.
pub struct Trispectrum<'a> {
    diagrams: DiagramSet<'a, TrispectrumGraph>,
    qmax: f64,
    seed: u64,
    k_bin: Option<f64>,
    window: Option<&'a dyn WindowFunction>,
    loop_graph: Option<TrispectrumGraph>,
}

impl<'a> Trispectrum<'a> {
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
            k_bin: None,
            window: None,
            loop_graph: None,
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

    /// Width of the external-momentum bins for the `kbin` averages.
    pub fn set_k_bin_size(&mut self, k_bin: f64) {
        self.k_bin = Some(k_bin);
    }

    /// Survey window for the `win` averages.
    pub fn set_window_function(&mut self, window: &'a dyn WindowFunction) {
        self.window = Some(window);
    }

    /// Restricts the loop sum to a single topology; `None` restores
    /// the full sum. Diagnostic hook.
    pub fn set_loop_graph(&mut self, graph: Option<TrispectrumGraph>) {
        self.loop_graph = graph;
    }

    pub fn diagram(
        &self,
        graph: TrispectrumGraph,
    ) -> Option<&Diagram<'a>> {
        self.diagrams.get(graph)
    }

    fn cov_momenta_dir(k: f64, kp: f64, dir: ThreeVector) -> DiagramMomenta {
        let k1 = ThreeVector::new(0.0, 0.0, k);
        let k3 = kp * dir;
        DiagramMomenta::external(k1, -k1, k3, -k3)
    }

    fn cov_momenta(k: f64, kp: f64, costheta: f64) -> DiagramMomenta {
        let sintheta = (1.0 - costheta * costheta).max(0.0).sqrt();
        Self::cov_momenta_dir(
            k,
            kp,
            ThreeVector::new(sintheta, 0.0, costheta),
        )
    }

    fn tree_value(&self, momenta: &DiagramMomenta) -> f64 {
        self.diagrams
            .of_class(DiagramClass::Tree)
            .map(|(_, diagram)| diagram.value_base(momenta))
            .sum()
    }

    fn cterm_value(&self, momenta: &DiagramMomenta) -> f64 {
        self.diagrams
            .of_class(DiagramClass::Counterterm)
            .map(|(_, diagram)| diagram.value_base(momenta))
            .sum()
    }

    fn loop_diagrams(
        &self,
    ) -> impl Iterator<Item = (TrispectrumGraph, &Diagram<'a>)> {
        let only = self.loop_graph;
        self.diagrams
            .of_class(DiagramClass::Loop)
            .filter(move |(graph, _)| only.map_or(true, |sel| sel == *graph))
    }

    /// Integrates the regulated loop sum at fixed externals; one
    /// independent integral per diagram, errors in quadrature.
    fn loop_integral(
        &self,
        integrator: &dyn Integrator,
        momenta: &DiagramMomenta,
    ) -> IntegralResult {
        let phase_space = LoopPhaseSpace::new(self.qmax);
        self.loop_diagrams()
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
                debug!("{graph:?}: {} +- {}", result.value, result.error);
                result
            })
            .sum()
    }

    /// Radial bin average: the sample magnitude and its r^2-weighted
    /// jacobian over `[k - bin/2, k + bin/2]`.
    fn bin_sample(k: f64, bin: f64, x: f64) -> (f64, f64) {
        let klo = (k - 0.5 * bin).max(0.0);
        let khi = k + 0.5 * bin;
        let ks = klo + x * (khi - klo);
        let norm = (khi.powi(3) - klo.powi(3)) / 3.0;
        ((khi - klo) * ks * ks / norm, ks)
    }

    // -- full trispectrum, differential in the external momenta --

    /// Tree level at `(k1, k2, k3, -k1-k2-k3)`.
    pub fn tree(
        &self,
        k1: ThreeVector,
        k2: ThreeVector,
        k3: ThreeVector,
    ) -> f64 {
        let k4 = -(k1 + k2 + k3);
        self.tree_value(&DiagramMomenta::external(k1, k2, k3, k4))
    }

    /// Regulated one-loop sum, differential in the loop momentum.
    pub fn loop_spt_excl(
        &self,
        k1: ThreeVector,
        k2: ThreeVector,
        k3: ThreeVector,
        q: ThreeVector,
    ) -> f64 {
        let k4 = -(k1 + k2 + k3);
        let momenta = DiagramMomenta::external(k1, k2, k3, k4).with_loop(q);
        self.loop_diagrams()
            .map(|(_, diagram)| diagram.value_ir_reg(&momenta))
            .sum()
    }

    /// One-loop sum, integrated over the loop momentum.
    pub fn loop_spt(
        &self,
        integrator: &dyn Integrator,
        k1: ThreeVector,
        k2: ThreeVector,
        k3: ThreeVector,
    ) -> IntegralResult {
        let k4 = -(k1 + k2 + k3);
        self.loop_integral(
            integrator,
            &DiagramMomenta::external(k1, k2, k3, k4),
        )
    }

    /// EFT counterterm sum at `(k1, k2, k3, -k1-k2-k3)`.
    pub fn cterms_eft(
        &self,
        k1: ThreeVector,
        k2: ThreeVector,
        k3: ThreeVector,
    ) -> f64 {
        let k4 = -(k1 + k2 + k3);
        self.cterm_value(&DiagramMomenta::external(k1, k2, k3, k4))
    }

    // -- covariance limit, differential in the relative angle --

    pub fn cov_tree(&self, k: f64, kp: f64, costheta: f64) -> f64 {
        self.tree_value(&Self::cov_momenta(k, kp, costheta))
    }

    pub fn cov_loop_spt(
        &self,
        integrator: &dyn Integrator,
        k: f64,
        kp: f64,
        costheta: f64,
    ) -> IntegralResult {
        self.loop_integral(integrator, &Self::cov_momenta(k, kp, costheta))
    }

    pub fn cov_cterms_eft(&self, k: f64, kp: f64, costheta: f64) -> f64 {
        self.cterm_value(&Self::cov_momenta(k, kp, costheta))
    }

    // -- covariance limit, averaged over the relative orientation --

    pub fn cov_tree_avg(
        &self,
        integrator: &dyn Integrator,
        k: f64,
        kp: f64,
    ) -> IntegralResult {
        let angles = AngularPhaseSpace;
        let mut integrand = |x: &[f64]| {
            let (weight, dir) = angles.sample(x);
            weight * self.tree_value(&Self::cov_momenta_dir(k, kp, dir))
        };
        integrator.integrate(2, subseed(self.seed, 0), &mut integrand)
    }

    pub fn cov_loop_spt_avg(
        &self,
        integrator: &dyn Integrator,
        k: f64,
        kp: f64,
    ) -> IntegralResult {
        let phase_space = LoopPhaseSpace::new(self.qmax);
        let angles = AngularPhaseSpace;
        self.loop_diagrams()
            .enumerate()
            .map(|(n, (graph, diagram))| {
                let mut integrand = |x: &[f64]| {
                    let (wa, dir) = angles.sample(&x[..2]);
                    let (wq, q) = phase_space.sample(&x[2..]);
                    let momenta =
                        Self::cov_momenta_dir(k, kp, dir).with_loop(q);
                    wa * wq * diagram.value_ir_reg(&momenta)
                };
                let result = integrator.integrate(
                    5,
                    subseed(self.seed, n as u64),
                    &mut integrand,
                );
                debug!("{graph:?}: {} +- {}", result.value, result.error);
                result
            })
            .sum()
    }

    pub fn cov_cterms_eft_avg(
        &self,
        integrator: &dyn Integrator,
        k: f64,
        kp: f64,
    ) -> IntegralResult {
        let angles = AngularPhaseSpace;
        let mut integrand = |x: &[f64]| {
            let (weight, dir) = angles.sample(x);
            weight * self.cterm_value(&Self::cov_momenta_dir(k, kp, dir))
        };
        integrator.integrate(2, subseed(self.seed, 0), &mut integrand)
    }

    // -- covariance limit, averaged over k bins --

    pub fn cov_tree_kbin(
        &self,
        integrator: &dyn Integrator,
        k: f64,
        kp: f64,
    ) -> Result<IntegralResult, ObservableError> {
        self.binned_value(integrator, k, kp, None, &|momenta| {
            self.tree_value(momenta)
        })
    }

    pub fn cov_loop_spt_kbin(
        &self,
        integrator: &dyn Integrator,
        k: f64,
        kp: f64,
    ) -> Result<IntegralResult, ObservableError> {
        self.binned_loop(integrator, k, kp, None)
    }

    pub fn cov_cterms_eft_kbin(
        &self,
        integrator: &dyn Integrator,
        k: f64,
        kp: f64,
    ) -> Result<IntegralResult, ObservableError> {
        self.binned_value(integrator, k, kp, None, &|momenta| {
            self.cterm_value(momenta)
        })
    }

    // -- k-bin averages convolved with the survey window --

    pub fn cov_tree_kbin_win(
        &self,
        integrator: &dyn Integrator,
        k: f64,
        kp: f64,
    ) -> Result<IntegralResult, ObservableError> {
        let window = self.window.ok_or(ObservableError::WindowNotSet)?;
        self.binned_value(integrator, k, kp, Some(window), &|momenta| {
            self.tree_value(momenta)
        })
    }

    pub fn cov_loop_spt_kbin_win(
        &self,
        integrator: &dyn Integrator,
        k: f64,
        kp: f64,
    ) -> Result<IntegralResult, ObservableError> {
        let window = self.window.ok_or(ObservableError::WindowNotSet)?;
        self.binned_loop(integrator, k, kp, Some(window))
    }

    pub fn cov_cterms_eft_kbin_win(
        &self,
        integrator: &dyn Integrator,
        k: f64,
        kp: f64,
    ) -> Result<IntegralResult, ObservableError> {
        let window = self.window.ok_or(ObservableError::WindowNotSet)?;
        self.binned_value(integrator, k, kp, Some(window), &|momenta| {
            self.cterm_value(momenta)
        })
    }

    /// Bin-averaged scalar observable: two radial dimensions and the
    /// relative orientation, optionally weighted by the window.
    fn binned_value(
        &self,
        integrator: &dyn Integrator,
        k: f64,
        kp: f64,
        window: Option<&dyn WindowFunction>,
        value: &dyn Fn(&DiagramMomenta) -> f64,
    ) -> Result<IntegralResult, ObservableError> {
        let bin = self.k_bin.ok_or(ObservableError::BinSizeNotSet)?;
        let angles = AngularPhaseSpace;
        let mut integrand = |x: &[f64]| {
            let (wk, ks) = Self::bin_sample(k, bin, x[0]);
            let (wkp, kps) = Self::bin_sample(kp, bin, x[1]);
            let (wa, dir) = angles.sample(&x[2..]);
            let momenta = Self::cov_momenta_dir(ks, kps, dir);
            let ww = window.map_or(1.0, |w| w.weight(&momenta));
            wk * wkp * wa * ww * value(&momenta)
        };
        Ok(integrator.integrate(4, subseed(self.seed, 0), &mut integrand))
    }

    /// Bin-averaged loop sum: the loop integrand nested inside the
    /// radial and angular dimensions.
    fn binned_loop(
        &self,
        integrator: &dyn Integrator,
        k: f64,
        kp: f64,
        window: Option<&dyn WindowFunction>,
    ) -> Result<IntegralResult, ObservableError> {
        let bin = self.k_bin.ok_or(ObservableError::BinSizeNotSet)?;
        let phase_space = LoopPhaseSpace::new(self.qmax);
        let angles = AngularPhaseSpace;
        Ok(self
            .loop_diagrams()
            .enumerate()
            .map(|(n, (graph, diagram))| {
                let mut integrand = |x: &[f64]| {
                    let (wk, ks) = Self::bin_sample(k, bin, x[0]);
                    let (wkp, kps) = Self::bin_sample(kp, bin, x[1]);
                    let (wa, dir) = angles.sample(&x[2..4]);
                    let (wq, q) = phase_space.sample(&x[4..]);
                    let momenta =
                        Self::cov_momenta_dir(ks, kps, dir).with_loop(q);
                    let ww = window.map_or(1.0, |w| w.weight(&momenta));
                    wk * wkp * wa * wq * ww * diagram.value_ir_reg(&momenta)
                };
                let result = integrator.integrate(
                    7,
                    subseed(self.seed, n as u64),
                    &mut integrand,
                );
                debug!("{graph:?}: {} +- {}", result.value, result.error);
                result
            })
            .sum())
    }
}

impl<'a> Index<TrispectrumGraph> for Trispectrum<'a> {
    type Output = Diagram<'a>;

    fn index(&self, graph: TrispectrumGraph) -> &Self::Output {
        &self.diagrams[graph]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrate::PlainMonteCarlo;
    use crate::kernel::UnitKernels;
    use crate::window::UnitWindow;

    fn unit_pl(_k: f64) -> f64 {
        1.0
    }

    fn covariance(order: Order, pl: &dyn LinearPowerSpectrum) -> Trispectrum<'_> {
        Trispectrum::new(order, pl, &UnitKernels, &UnitKernels).unwrap()
    }

    #[test]
    fn tree_value_is_the_sum_of_symmetry_factors() {
        // unit kernels and PL = 1 leave exactly the symmetry factors:
        // 6 (T3111) + 4 (T2211)
        let pl = unit_pl;
        let ts = covariance(Order::Tree, &pl);
        assert!((ts.cov_tree(0.5, 0.7, 0.3) - 10.0).abs() < 1e-12);
        let k1 = ThreeVector::new(0.1, 1.0, 0.3);
        let k2 = ThreeVector::new(0.3, -0.2, 0.1);
        let k3 = ThreeVector::new(0.01, 0.1, 0.4);
        assert!((ts.tree(k1, k2, k3) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn counterterms_sum_over_the_x_diagrams() {
        let pl = unit_pl;
        let ts = covariance(Order::OneLoop, &pl);
        // four counterterm topologies with unit symmetry factor
        assert!((ts.cov_cterms_eft(0.5, 0.7, 0.3) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn loop_results_are_reproducible() {
        let _ = env_logger::builder().is_test(true).try_init();
        let pl = |k: f64| 1.0 / (1.0 + k * k);
        let mut ts = covariance(Order::OneLoop, &pl);
        ts.set_qmax(2.0);
        ts.set_seed(37);
        let mc = PlainMonteCarlo::with_calls(500);
        let a = ts.cov_loop_spt(&mc, 0.5, 0.7, 0.3);
        let b = ts.cov_loop_spt(&mc, 0.5, 0.7, 0.3);
        assert_eq!(a, b);
        assert!(a.value.is_finite());
    }

    #[test]
    fn loop_sum_can_be_restricted() {
        let pl = |k: f64| 1.0 / (1.0 + k * k);
        let mut ts = covariance(Order::OneLoop, &pl);
        ts.set_qmax(2.0);
        let mc = PlainMonteCarlo::with_calls(200);
        let full = ts.cov_loop_spt(&mc, 0.5, 0.7, 0.3);
        ts.set_loop_graph(Some(TrispectrumGraph::T5111));
        let single = ts.cov_loop_spt(&mc, 0.5, 0.7, 0.3);
        assert!(single.neval < full.neval);
        ts.set_loop_graph(None);
        assert_eq!(ts.cov_loop_spt(&mc, 0.5, 0.7, 0.3), full);
    }

    #[test]
    fn binned_averages_need_a_bin_size() {
        let pl = unit_pl;
        let ts = covariance(Order::Tree, &pl);
        let mc = PlainMonteCarlo::with_calls(100);
        assert!(matches!(
            ts.cov_tree_kbin(&mc, 0.5, 0.7),
            Err(ObservableError::BinSizeNotSet)
        ));
    }

    #[test]
    fn windowed_averages_need_a_window() {
        let pl = unit_pl;
        let mut ts = covariance(Order::Tree, &pl);
        ts.set_k_bin_size(0.1);
        let mc = PlainMonteCarlo::with_calls(100);
        assert!(matches!(
            ts.cov_tree_kbin_win(&mc, 0.5, 0.7),
            Err(ObservableError::WindowNotSet)
        ));
    }

    #[test]
    fn unit_window_reproduces_the_plain_bin_average() {
        let pl = unit_pl;
        let mut ts = covariance(Order::Tree, &pl);
        ts.set_k_bin_size(0.1);
        ts.set_window_function(&UnitWindow);
        let mc = PlainMonteCarlo::with_calls(1000);
        let plain = ts.cov_tree_kbin(&mc, 0.5, 0.7).unwrap();
        let windowed = ts.cov_tree_kbin_win(&mc, 0.5, 0.7).unwrap();
        assert_eq!(plain, windowed);
    }

    #[test]
    fn flat_integrands_average_exactly() {
        // PL = 1 makes the tree value constant, so every average
        // reproduces it with zero variance
        let pl = unit_pl;
        let mut ts = covariance(Order::Tree, &pl);
        ts.set_k_bin_size(0.1);
        let mc = PlainMonteCarlo::with_calls(500);
        let avg = ts.cov_tree_avg(&mc, 0.5, 0.7);
        assert_eq!(avg.value, 10.0);
        assert_eq!(avg.error, 0.0);
        // the radial bin weights fluctuate around unit mean, so the
        // bin average is only statistically 10
        let binned = ts.cov_tree_kbin(&mc, 0.5, 0.7).unwrap();
        assert!((binned.value - 10.0).abs() < 5.0 * binned.error);
    }
}
