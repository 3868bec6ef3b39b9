pub mod diagram;
pub mod integrate;
pub mod kernel;
pub mod labels;
pub mod momenta;
pub mod power_spectrum;
pub mod propagator;
pub mod spectrum;
pub mod topology;
pub mod trispectrum;
pub mod window;

pub use crate::diagram::{Diagram, DiagramError, Line, Order};
pub use crate::integrate::{
    IntegralResult, Integrator, LoopPhaseSpace, PlainMonteCarlo,
};
pub use crate::kernel::{
    KernelFamily, KernelType, UnitKernel, UnitKernels, VertexKernel,
};
pub use crate::labels::{MomentumLabel, Vertex};
pub use crate::momenta::{DiagramMomenta, ThreeVector};
pub use crate::power_spectrum::{
    LinearPowerSpectrum, OutOfRange, PowerLawSpectrum, PowerSpectrumError,
    TabulatedSpectrum,
};
pub use crate::propagator::{LabelFlow, Propagator};
pub use crate::spectrum::Spectrum;
pub use crate::topology::{
    DiagramClass, DiagramSet, GraphLabel, SpectrumGraph, TrispectrumGraph,
};
pub use crate::trispectrum::{ObservableError, Trispectrum};
pub use crate::window::{UnitWindow, WindowFunction};
