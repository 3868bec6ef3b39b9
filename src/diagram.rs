use ahash::RandomState;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::kernel::VertexKernel;
use crate::labels::{MomentumLabel, MomentumMap, Vertex, VertexMap};
use crate::momenta::{DiagramMomenta, ThreeVector};
use crate::power_spectrum::LinearPowerSpectrum;
use crate::propagator::Propagator;

type IndexMap<K, V> = indexmap::IndexMap<K, V, RandomState>;

/// Perturbative order of a diagram.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Deserialize,
    Serialize,
)]
pub enum Order {
    #[default]
    Tree,
    OneLoop,
}

/// A propagator and the ordered pair of vertices it connects.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Line {
    start: Vertex,
    end: Vertex,
    propagator: Propagator,
}

impl Line {
    pub fn new(start: Vertex, end: Vertex, propagator: Propagator) -> Self {
        Self {
            start,
            end,
            propagator,
        }
    }

    pub fn start(&self) -> Vertex {
        self.start
    }

    pub fn end(&self) -> Vertex {
        self.end
    }

    pub fn propagator(&self) -> &Propagator {
        &self.propagator
    }
}

#[derive(Debug, Error)]
pub enum DiagramError {
    #[error("diagram has no lines")]
    NoLines,
    #[error("line {0} carries {1}, which is neither the loop momentum nor an external label of this observable")]
    UnknownLabel(usize, MomentumLabel),
    #[error("vertex {0} has incident lines but no kernel")]
    MissingKernel(Vertex),
}

/// 1 if |a| < |b|, else 0. Ties sit on a measure-zero boundary.
pub(crate) fn theta(a: ThreeVector, b: ThreeVector) -> f64 {
    if a.norm() < b.norm() {
        1.0
    } else {
        0.0
    }
}

/// A fixed diagram topology bound to its kernels and power spectrum,
/// reduced to a real value per phase-space point.
///
/// Construction walks the lines once: a line carrying the loop momentum
/// makes the diagram one-loop, and its pole away from the origin is
/// recorded for IR regularization. Each line contributes its propagator
/// to the start vertex and the reversed propagator to the end vertex,
/// so the momentum leaving one end is the momentum entering the other.
pub struct Diagram<'a> {
    lines: Vec<Line>,
    kernels: VertexMap<Option<&'a dyn VertexKernel>>,
    pl: &'a dyn LinearPowerSpectrum,
    vertex_momenta: VertexMap<Vec<Propagator>>,
    ir_poles: Vec<Propagator>,
    routings: Vec<(MomentumMap<MomentumLabel>, usize)>,
    symmetry_factor: f64,
    order: Order,
}

impl<'a> Diagram<'a> {
    pub fn new(
        lines: Vec<Line>,
        kernels: Vec<(Vertex, &'a dyn VertexKernel)>,
        symmetry_factor: f64,
        externals: &[MomentumLabel],
        pl: &'a dyn LinearPowerSpectrum,
    ) -> Result<Self, DiagramError> {
        if lines.is_empty() {
            return Err(DiagramError::NoLines);
        }
        let mut kernel_map: VertexMap<Option<&dyn VertexKernel>> =
            VertexMap::default();
        for (vertex, kernel) in kernels {
            kernel_map[vertex] = Some(kernel);
        }

        let mut order = Order::Tree;
        let mut ir_poles = Vec::new();
        let mut vertex_momenta: VertexMap<Vec<Propagator>> =
            VertexMap::default();
        for (n, line) in lines.iter().enumerate() {
            for label in line.propagator().labels() {
                if label != MomentumLabel::LOOP && !externals.contains(&label)
                {
                    return Err(DiagramError::UnknownLabel(n, label));
                }
            }
            if line.propagator().has_label(MomentumLabel::LOOP) {
                order = Order::OneLoop;
                let pole = line.propagator().ir_pole(MomentumLabel::LOOP);
                if !pole.is_null() {
                    ir_poles.push(pole);
                }
            }
            vertex_momenta[line.start()].push(line.propagator().clone());
            vertex_momenta[line.end()].push(line.propagator().reverse());
        }

        for vertex in Vertex::ALL {
            if !vertex_momenta[vertex].is_empty()
                && kernel_map[vertex].is_none()
            {
                return Err(DiagramError::MissingKernel(vertex));
            }
        }

        let routings = group_routings(&lines, externals);

        Ok(Self {
            lines,
            kernels: kernel_map,
            pl,
            vertex_momenta,
            ir_poles,
            routings,
            symmetry_factor,
            order,
        })
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn symmetry_factor(&self) -> f64 {
        self.symmetry_factor
    }

    /// The recorded poles of the loop momentum, each a propagator over
    /// the external labels.
    pub fn ir_poles(&self) -> &[Propagator] {
        &self.ir_poles
    }

    /// The propagators incident to `vertex`, oriented outwards.
    pub fn incident(&self, vertex: Vertex) -> &[Propagator] {
        &self.vertex_momenta[vertex]
    }

    /// The distinct external-momentum routings of this diagram: one
    /// representative label permutation per group, with the number of
    /// permutations it stands for.
    pub fn routings(&self) -> &[(MomentumMap<MomentumLabel>, usize)] {
        &self.routings
    }

    /// The un-regulated diagram value: symmetry factor times the power
    /// spectrum of every line times the kernel of every vertex.
    pub fn value_base(&self, momenta: &DiagramMomenta) -> f64 {
        let mut value = self.symmetry_factor;
        for line in &self.lines {
            value *= self.pl.eval(line.propagator().eval(momenta).norm());
        }
        for vertex in Vertex::ALL {
            let incident = &self.vertex_momenta[vertex];
            if incident.is_empty() {
                continue;
            }
            let Some(kernel) = self.kernels[vertex] else {
                continue;
            };
            let p: Vec<_> =
                incident.iter().map(|prop| prop.eval(momenta)).collect();
            value *= kernel.evaluate(&p);
        }
        value
    }

    /// The diagram value with every IR pole regulated away.
    ///
    /// The loop-momentum domain is split into one cell per recorded
    /// pole plus a central cell, each containing the points closer to
    /// its pole than to any other. Inside a pole's cell the loop
    /// momentum is shifted so the pole sits at the origin; the shift
    /// preserves the measure, so the integral is unchanged while the
    /// integrand stays finite away from the cell centres.
    pub fn value_base_ir_reg(&self, momenta: &DiagramMomenta) -> f64 {
        if self.ir_poles.is_empty() {
            return self.value_base(momenta);
        }
        let q = momenta[MomentumLabel::LOOP];
        let mut value = 0.0;

        // central cell: q closer to the origin than to every pole
        let mut region = 1.0;
        for pole in &self.ir_poles {
            region *= theta(q, q - pole.eval(momenta));
        }
        if region > 0.0 {
            value += region * self.value_base(momenta);
        }

        // one cell per pole, evaluated at the shifted loop momentum
        // q + pole; the cuts keep q inside that pole's cell in the
        // shifted frame
        for (n, pole) in self.ir_poles.iter().enumerate() {
            let p = pole.eval(momenta);
            let mut region = theta(q, q + p);
            for (m, other) in self.ir_poles.iter().enumerate() {
                if m != n {
                    region *= theta(q, q + p - other.eval(momenta));
                }
            }
            if region > 0.0 {
                value += region * self.value_base(&momenta.with_loop(q + p));
            }
        }
        value
    }

    /// The IR-regulated value symmetrized over the external momenta:
    /// the sum over all distinct routings of the external values onto
    /// the diagram's label slots, each weighted by its multiplicity.
    pub fn value_ir_reg(&self, momenta: &DiagramMomenta) -> f64 {
        let mut value = 0.0;
        for (map, multiplicity) in &self.routings {
            value += *multiplicity as f64
                * self.value_base_ir_reg(&momenta.permuted(map));
        }
        value
    }
}

/// Groups the permutations of the external labels by the line structure
/// they induce. Two permutations that relabel every propagator
/// identically route the same momenta through the same lines, so each
/// group is evaluated once and weighted by its size.
fn group_routings(
    lines: &[Line],
    externals: &[MomentumLabel],
) -> Vec<(MomentumMap<MomentumLabel>, usize)> {
    let mut grouped: IndexMap<
        Vec<Propagator>,
        (MomentumMap<MomentumLabel>, usize),
    > = IndexMap::default();
    for images in externals.iter().copied().permutations(externals.len()) {
        let mut map = MomentumMap::from_fn(|label| label);
        for (&label, &image) in externals.iter().zip(&images) {
            map[label] = image;
        }
        let signature: Vec<_> = lines
            .iter()
            .map(|line| line.propagator().relabel(&map))
            .collect();
        grouped
            .entry(signature)
            .and_modify(|(_, multiplicity)| *multiplicity += 1)
            .or_insert((map, 1));
    }
    grouped.into_values().collect()
}
