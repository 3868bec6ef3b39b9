use std::fmt::Debug;
use std::hash::Hash;
use std::ops::Index;

use ahash::RandomState;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::diagram::{Diagram, DiagramError, Line, Order};
use crate::kernel::{KernelFamily, KernelType, VertexKernel};
use crate::labels::{MomentumLabel, Vertex, VertexMap};
use crate::power_spectrum::LinearPowerSpectrum;
use crate::propagator::{LabelFlow, Propagator};

type IndexMap<K, V> = indexmap::IndexMap<K, V, RandomState>;

/// How a topology enters an observable.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize,
)]
pub enum DiagramClass {
    Tree,
    Loop,
    Counterterm,
}

/// Line structure, symmetry factor and kernel assignment of one
/// catalogue topology.
pub struct Topology {
    pub lines: Vec<Line>,
    pub symmetry_factor: f64,
    pub kernels: Vec<(Vertex, KernelType)>,
}

/// A topology label out of the fixed catalogue of one observable.
pub trait GraphLabel: Copy + Eq + Hash + Debug + 'static {
    /// Catalogue order.
    const ALL: &'static [Self];
    /// External labels of the observable this catalogue belongs to.
    const EXTERNALS: &'static [MomentumLabel];

    fn class(self) -> DiagramClass;
    fn topology(self) -> Topology;
}

/// Topologies of the two-point function.
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
pub enum SpectrumGraph {
    P11,
    P31,
    P22,
    P31x,
}

impl GraphLabel for SpectrumGraph {
    const ALL: &'static [Self] = &[
        SpectrumGraph::P11,
        SpectrumGraph::P31,
        SpectrumGraph::P22,
        SpectrumGraph::P31x,
    ];

    const EXTERNALS: &'static [MomentumLabel] =
        &[MomentumLabel::K1, MomentumLabel::K2];

    fn class(self) -> DiagramClass {
        match self {
            SpectrumGraph::P11 => DiagramClass::Tree,
            SpectrumGraph::P31 | SpectrumGraph::P22 => DiagramClass::Loop,
            SpectrumGraph::P31x => DiagramClass::Counterterm,
        }
    }

    fn topology(self) -> Topology {
        use KernelType::{Eft, Spt};
        use LabelFlow::Plus;
        use MomentumLabel::{K2, Q};
        use Vertex::{V1, V2};
        match self {
            SpectrumGraph::P11 => Topology {
                lines: vec![Line::new(V2, V1, Propagator::plus(K2))],
                symmetry_factor: 1.0,
                kernels: vec![(V1, Spt), (V2, Spt)],
            },
            SpectrumGraph::P31 => Topology {
                lines: vec![
                    Line::new(V1, V1, Propagator::plus(Q)),
                    Line::new(V2, V1, Propagator::plus(K2)),
                ],
                symmetry_factor: 3.0,
                kernels: vec![(V1, Spt), (V2, Spt)],
            },
            SpectrumGraph::P22 => Topology {
                lines: vec![
                    Line::new(V1, V2, Propagator::plus(Q)),
                    Line::new(V2, V1, Propagator::plus(Q).with(K2, Plus)),
                ],
                symmetry_factor: 2.0,
                kernels: vec![(V1, Spt), (V2, Spt)],
            },
            SpectrumGraph::P31x => Topology {
                lines: vec![Line::new(V2, V1, Propagator::plus(K2))],
                symmetry_factor: 1.0,
                kernels: vec![(V1, Eft), (V2, Spt)],
            },
        }
    }
}

/// Topologies of the four-point function. The digits give the kernel
/// order at each vertex; letters distinguish wirings of the same
/// orders, a trailing `x` marks the EFT counterterm of the matching
/// loop family.
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
pub enum TrispectrumGraph {
    T3111,
    T2211,
    T5111,
    T4211a,
    T4211b,
    T3311a,
    T3311b,
    T3221a,
    T3221b,
    T3221c,
    T2222,
    T5111x,
    T4211ax,
    T3311ax,
    T3221ax,
}

impl GraphLabel for TrispectrumGraph {
    const ALL: &'static [Self] = &[
        TrispectrumGraph::T3111,
        TrispectrumGraph::T2211,
        TrispectrumGraph::T5111,
        TrispectrumGraph::T4211a,
        TrispectrumGraph::T4211b,
        TrispectrumGraph::T3311a,
        TrispectrumGraph::T3311b,
        TrispectrumGraph::T3221a,
        TrispectrumGraph::T3221b,
        TrispectrumGraph::T3221c,
        TrispectrumGraph::T2222,
        TrispectrumGraph::T5111x,
        TrispectrumGraph::T4211ax,
        TrispectrumGraph::T3311ax,
        TrispectrumGraph::T3221ax,
    ];

    const EXTERNALS: &'static [MomentumLabel] = &[
        MomentumLabel::K1,
        MomentumLabel::K2,
        MomentumLabel::K3,
        MomentumLabel::K4,
    ];

    fn class(self) -> DiagramClass {
        use TrispectrumGraph::*;
        match self {
            T3111 | T2211 => DiagramClass::Tree,
            T5111 | T4211a | T4211b | T3311a | T3311b | T3221a | T3221b
            | T3221c | T2222 => DiagramClass::Loop,
            T5111x | T4211ax | T3311ax | T3221ax => DiagramClass::Counterterm,
        }
    }

    fn topology(self) -> Topology {
        use KernelType::{Eft, Spt};
        use LabelFlow::{Minus, Plus};
        use MomentumLabel::{K1, K2, K3, K4, Q};
        use Vertex::{V1, V2, V3, V4};

        let spt_all =
            || vec![(V1, Spt), (V2, Spt), (V3, Spt), (V4, Spt)];
        // the tree wirings; the counterterms reuse them with one EFT
        // vertex swapped in
        let star = || {
            vec![
                Line::new(V2, V1, Propagator::plus(K2)),
                Line::new(V3, V1, Propagator::plus(K3)),
                Line::new(V4, V1, Propagator::plus(K4)),
            ]
        };
        let chain = || {
            vec![
                Line::new(V3, V1, Propagator::plus(K3)),
                Line::new(V4, V2, Propagator::plus(K4)),
                Line::new(V1, V2, Propagator::plus(K1).with(K3, Plus)),
            ]
        };

        match self {
            TrispectrumGraph::T3111 => Topology {
                lines: star(),
                symmetry_factor: 6.0,
                kernels: spt_all(),
            },
            TrispectrumGraph::T2211 => Topology {
                lines: chain(),
                symmetry_factor: 4.0,
                kernels: spt_all(),
            },
            TrispectrumGraph::T5111 => Topology {
                lines: vec![
                    Line::new(V1, V1, Propagator::plus(Q)),
                    Line::new(V2, V1, Propagator::plus(K2)),
                    Line::new(V3, V1, Propagator::plus(K3)),
                    Line::new(V4, V1, Propagator::plus(K4)),
                ],
                symmetry_factor: 15.0,
                kernels: spt_all(),
            },
            TrispectrumGraph::T4211a => Topology {
                lines: vec![
                    Line::new(V1, V2, Propagator::plus(Q)),
                    Line::new(V2, V1, Propagator::plus(Q).with(K2, Plus)),
                    Line::new(V3, V1, Propagator::plus(K3)),
                    Line::new(V4, V1, Propagator::plus(K4)),
                ],
                symmetry_factor: 12.0,
                kernels: spt_all(),
            },
            TrispectrumGraph::T4211b => Topology {
                lines: vec![
                    Line::new(V1, V1, Propagator::plus(Q)),
                    Line::new(
                        V2,
                        V1,
                        Propagator::plus(K2).with(K3, Plus),
                    ),
                    Line::new(V3, V2, Propagator::plus(K3)),
                    Line::new(V4, V1, Propagator::plus(K4)),
                ],
                symmetry_factor: 6.0,
                kernels: spt_all(),
            },
            TrispectrumGraph::T3311a => Topology {
                lines: vec![
                    Line::new(V1, V2, Propagator::plus(Q)),
                    Line::new(
                        V2,
                        V1,
                        Propagator::plus(Q).with(K2, Plus).with(K4, Plus),
                    ),
                    Line::new(V3, V1, Propagator::plus(K3)),
                    Line::new(V4, V2, Propagator::plus(K4)),
                ],
                symmetry_factor: 9.0,
                kernels: spt_all(),
            },
            TrispectrumGraph::T3311b => Topology {
                lines: vec![
                    Line::new(V1, V1, Propagator::plus(Q)),
                    Line::new(V2, V1, Propagator::minus(K1)),
                    Line::new(V3, V2, Propagator::plus(K3)),
                    Line::new(V4, V2, Propagator::plus(K4)),
                ],
                symmetry_factor: 6.0,
                kernels: spt_all(),
            },
            TrispectrumGraph::T3221a => Topology {
                lines: vec![
                    Line::new(V1, V2, Propagator::plus(Q)),
                    Line::new(V2, V1, Propagator::plus(Q).with(K2, Plus)),
                    Line::new(V4, V3, Propagator::plus(K4)),
                    Line::new(
                        V3,
                        V1,
                        Propagator::plus(K3).with(K4, Plus),
                    ),
                ],
                symmetry_factor: 12.0,
                kernels: spt_all(),
            },
            TrispectrumGraph::T3221b => Topology {
                lines: vec![
                    Line::new(V1, V1, Propagator::plus(Q)),
                    Line::new(V2, V1, Propagator::minus(K1)),
                    Line::new(
                        V3,
                        V2,
                        Propagator::plus(K3).with(K4, Plus),
                    ),
                    Line::new(V4, V3, Propagator::plus(K4)),
                ],
                symmetry_factor: 6.0,
                kernels: spt_all(),
            },
            TrispectrumGraph::T3221c => Topology {
                lines: vec![
                    Line::new(V1, V2, Propagator::plus(Q)),
                    Line::new(V2, V3, Propagator::plus(Q).with(K2, Plus)),
                    Line::new(
                        V3,
                        V1,
                        Propagator::plus(Q).with(K2, Plus).with(K3, Plus),
                    ),
                    Line::new(V4, V1, Propagator::plus(K4)),
                ],
                symmetry_factor: 8.0,
                kernels: spt_all(),
            },
            TrispectrumGraph::T2222 => Topology {
                lines: vec![
                    Line::new(V1, V2, Propagator::plus(Q)),
                    Line::new(V2, V3, Propagator::plus(Q).with(K2, Plus)),
                    Line::new(
                        V3,
                        V4,
                        Propagator::plus(Q).with(K2, Plus).with(K3, Plus),
                    ),
                    Line::new(V4, V1, Propagator::plus(Q).with(K1, Minus)),
                ],
                symmetry_factor: 16.0,
                kernels: spt_all(),
            },
            TrispectrumGraph::T5111x => Topology {
                lines: star(),
                symmetry_factor: 1.0,
                kernels: vec![(V1, Eft), (V2, Spt), (V3, Spt), (V4, Spt)],
            },
            TrispectrumGraph::T4211ax => Topology {
                lines: chain(),
                symmetry_factor: 1.0,
                kernels: vec![(V1, Eft), (V2, Spt), (V3, Spt), (V4, Spt)],
            },
            TrispectrumGraph::T3311ax => Topology {
                lines: star(),
                symmetry_factor: 1.0,
                kernels: vec![(V1, Spt), (V2, Eft), (V3, Spt), (V4, Spt)],
            },
            TrispectrumGraph::T3221ax => Topology {
                lines: chain(),
                symmetry_factor: 1.0,
                kernels: vec![(V1, Spt), (V2, Eft), (V3, Spt), (V4, Spt)],
            },
        }
    }
}

/// The diagrams of one observable at one perturbative order, indexed
/// by topology label in catalogue order.
pub struct DiagramSet<'a, G: GraphLabel> {
    diagrams: IndexMap<G, Diagram<'a>>,
}

impl<'a, G: GraphLabel> DiagramSet<'a, G> {
    /// Instantiates the catalogue: tree topologies always, loop and
    /// counterterm topologies only at one-loop order.
    pub fn new(
        order: Order,
        pl: &'a dyn LinearPowerSpectrum,
        spt: &'a dyn KernelFamily,
        eft: &'a dyn KernelFamily,
    ) -> Result<Self, DiagramError> {
        let mut diagrams = IndexMap::default();
        for &graph in G::ALL {
            if order == Order::Tree && graph.class() != DiagramClass::Tree {
                continue;
            }
            let Topology {
                lines,
                symmetry_factor,
                kernels,
            } = graph.topology();

            // the kernel order at a vertex is its incidence count
            let mut incidence: VertexMap<usize> = VertexMap::default();
            for line in &lines {
                incidence[line.start()] += 1;
                incidence[line.end()] += 1;
            }
            let kernels: Vec<(Vertex, &dyn VertexKernel)> = kernels
                .into_iter()
                .filter(|(vertex, _)| incidence[*vertex] > 0)
                .map(|(vertex, kind)| {
                    let family = match kind {
                        KernelType::Spt => spt,
                        KernelType::Eft => eft,
                    };
                    (vertex, family.order(incidence[vertex]))
                })
                .collect();

            let diagram = Diagram::new(
                lines,
                kernels,
                symmetry_factor,
                G::EXTERNALS,
                pl,
            )?;
            debug!(
                "{graph:?}: {} lines, {} IR poles, {:?}",
                diagram.lines().len(),
                diagram.ir_poles().len(),
                diagram.order()
            );
            diagrams.insert(graph, diagram);
        }
        Ok(Self { diagrams })
    }

    pub fn get(&self, graph: G) -> Option<&Diagram<'a>> {
        self.diagrams.get(&graph)
    }

    pub fn iter(&self) -> impl Iterator<Item = (G, &Diagram<'a>)> {
        self.diagrams.iter().map(|(graph, diagram)| (*graph, diagram))
    }

    /// The catalogue entries of one class, in catalogue order.
    pub fn of_class(
        &self,
        class: DiagramClass,
    ) -> impl Iterator<Item = (G, &Diagram<'a>)> {
        self.iter().filter(move |(graph, _)| graph.class() == class)
    }

    pub fn len(&self) -> usize {
        self.diagrams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagrams.is_empty()
    }
}

impl<'a, G: GraphLabel> Index<G> for DiagramSet<'a, G> {
    type Output = Diagram<'a>;

    fn index(&self, graph: G) -> &Self::Output {
        &self.diagrams[&graph]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::UnitKernels;
    use crate::momenta::{DiagramMomenta, ThreeVector};
    use MomentumLabel::{K1, K2, K3, K4};

    fn unit_pl(_k: f64) -> f64 {
        1.0
    }

    #[test]
    fn tree_sets_hold_only_tree_diagrams() {
        let pl = unit_pl;
        let set: DiagramSet<TrispectrumGraph> =
            DiagramSet::new(Order::Tree, &pl, &UnitKernels, &UnitKernels)
                .unwrap();
        assert_eq!(set.len(), 2);
        assert!(set
            .iter()
            .all(|(graph, _)| graph.class() == DiagramClass::Tree));
    }

    #[test]
    fn one_loop_set_holds_the_full_catalogue() {
        let pl = unit_pl;
        let set: DiagramSet<TrispectrumGraph> =
            DiagramSet::new(Order::OneLoop, &pl, &UnitKernels, &UnitKernels)
                .unwrap();
        assert_eq!(set.len(), TrispectrumGraph::ALL.len());
        assert_eq!(set.of_class(DiagramClass::Tree).count(), 2);
        assert_eq!(set.of_class(DiagramClass::Loop).count(), 9);
        assert_eq!(set.of_class(DiagramClass::Counterterm).count(), 4);
    }

    #[test]
    fn detected_orders_match_the_classes() {
        let pl = unit_pl;
        let set: DiagramSet<TrispectrumGraph> =
            DiagramSet::new(Order::OneLoop, &pl, &UnitKernels, &UnitKernels)
                .unwrap();
        for (graph, diagram) in set.iter() {
            let expected = match graph.class() {
                DiagramClass::Loop => Order::OneLoop,
                _ => Order::Tree,
            };
            assert_eq!(diagram.order(), expected, "{graph:?}");
        }
    }

    #[test]
    fn pole_counts() {
        let pl = unit_pl;
        let set: DiagramSet<TrispectrumGraph> =
            DiagramSet::new(Order::OneLoop, &pl, &UnitKernels, &UnitKernels)
                .unwrap();
        use TrispectrumGraph::*;
        let expected = [
            (T5111, 0),
            (T4211a, 1),
            (T4211b, 0),
            (T3311a, 1),
            (T3311b, 0),
            (T3221a, 1),
            (T3221b, 0),
            (T3221c, 2),
            (T2222, 3),
        ];
        for (graph, poles) in expected {
            assert_eq!(set[graph].ir_poles().len(), poles, "{graph:?}");
        }
    }

    #[test]
    fn spectrum_p22_pole_sits_at_minus_k2() {
        let pl = unit_pl;
        let set: DiagramSet<SpectrumGraph> =
            DiagramSet::new(Order::OneLoop, &pl, &UnitKernels, &UnitKernels)
                .unwrap();
        assert_eq!(
            set[SpectrumGraph::P22].ir_poles(),
            [Propagator::minus(K2)]
        );
        assert!(set[SpectrumGraph::P31].ir_poles().is_empty());
    }

    #[test]
    fn vertex_incidence_matches_kernel_order() {
        let pl = unit_pl;
        let set: DiagramSet<TrispectrumGraph> =
            DiagramSet::new(Order::OneLoop, &pl, &UnitKernels, &UnitKernels)
                .unwrap();
        use Vertex::*;
        let t5111 = &set[TrispectrumGraph::T5111];
        assert_eq!(t5111.incident(V1).len(), 5);
        assert_eq!(t5111.incident(V2).len(), 1);
        let t2222 = &set[TrispectrumGraph::T2222];
        for vertex in Vertex::ALL {
            assert_eq!(t2222.incident(vertex).len(), 2);
        }
    }

    #[test]
    fn momentum_is_conserved_at_every_vertex() {
        // with the external sum closed, the oriented incident momenta
        // at vertex vi add up to exactly ki
        let pl = unit_pl;
        let k1 = ThreeVector::new(0.1, 1.0, 0.3);
        let k2 = ThreeVector::new(0.3, -0.2, 0.1);
        let k3 = ThreeVector::new(0.01, 0.1, 0.4);
        let k4 = -(k1 + k2 + k3);
        let mom = DiagramMomenta::external(k1, k2, k3, k4)
            .with_loop(ThreeVector::new(0.7, -0.3, 0.2));
        let external = |vertex| match vertex {
            Vertex::V1 => k1,
            Vertex::V2 => k2,
            Vertex::V3 => k3,
            Vertex::V4 => k4,
        };

        let set: DiagramSet<TrispectrumGraph> =
            DiagramSet::new(Order::OneLoop, &pl, &UnitKernels, &UnitKernels)
                .unwrap();
        for (graph, diagram) in set.iter() {
            for vertex in Vertex::ALL {
                let incident = diagram.incident(vertex);
                if incident.is_empty() {
                    continue;
                }
                let total = incident
                    .iter()
                    .fold(ThreeVector::zeros(), |acc, prop| {
                        acc + prop.eval(&mom)
                    });
                assert!(
                    (total - external(vertex)).norm() < 1e-12,
                    "{graph:?} violates conservation at {vertex}"
                );
            }
        }
    }

    #[test]
    fn spectrum_momentum_is_conserved() {
        let pl = unit_pl;
        let k = ThreeVector::new(0.0, 0.0, 0.8);
        let mom = DiagramMomenta::zero()
            .with(K1, -k)
            .with(K2, k)
            .with_loop(ThreeVector::new(0.2, 0.1, -0.3));
        let set: DiagramSet<SpectrumGraph> =
            DiagramSet::new(Order::OneLoop, &pl, &UnitKernels, &UnitKernels)
                .unwrap();
        for (graph, diagram) in set.iter() {
            for (vertex, external) in
                [(Vertex::V1, -k), (Vertex::V2, k)]
            {
                let incident = diagram.incident(vertex);
                if incident.is_empty() {
                    continue;
                }
                let total = incident
                    .iter()
                    .fold(ThreeVector::zeros(), |acc, prop| {
                        acc + prop.eval(&mom)
                    });
                assert!(
                    (total - external).norm() < 1e-12,
                    "{graph:?} violates conservation at {vertex}"
                );
            }
        }
    }

    #[test]
    fn unused_labels_are_not_referenced() {
        // the two-point catalogue must stay inside its external set
        let pl = unit_pl;
        let set: DiagramSet<SpectrumGraph> =
            DiagramSet::new(Order::OneLoop, &pl, &UnitKernels, &UnitKernels)
                .unwrap();
        for (_, diagram) in set.iter() {
            for line in diagram.lines() {
                assert!(!line.propagator().has_label(K3));
                assert!(!line.propagator().has_label(K4));
            }
        }
    }
}
