use std::fmt::{self, Display};
use std::ops::Neg;

use serde::{Deserialize, Serialize};

use crate::labels::{MomentumLabel, MomentumMap};
use crate::momenta::{DiagramMomenta, ThreeVector};

/// Sign of one momentum label inside a propagator.
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
pub enum LabelFlow {
    Minus,
    #[default]
    Null,
    Plus,
}

impl LabelFlow {
    pub fn reverse(self) -> Self {
        match self {
            LabelFlow::Minus => LabelFlow::Plus,
            LabelFlow::Null => LabelFlow::Null,
            LabelFlow::Plus => LabelFlow::Minus,
        }
    }

    pub fn is_null(self) -> bool {
        self == LabelFlow::Null
    }

    fn sign(self) -> f64 {
        match self {
            LabelFlow::Minus => -1.0,
            LabelFlow::Null => 0.0,
            LabelFlow::Plus => 1.0,
        }
    }
}

/// A signed linear combination of labelled momenta, the abstract
/// momentum carried by one line of a diagram.
///
/// Coefficients are restricted to the unit flows of [`LabelFlow`], so
/// every label enters a propagator with weight -1, 0 or +1.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Propagator {
    flows: MomentumMap<LabelFlow>,
}

impl Propagator {
    pub fn new(
        terms: impl IntoIterator<Item = (MomentumLabel, LabelFlow)>,
    ) -> Self {
        let mut flows = MomentumMap::default();
        for (label, flow) in terms {
            flows[label] = flow;
        }
        Self { flows }
    }

    pub fn plus(label: MomentumLabel) -> Self {
        Self::new([(label, LabelFlow::Plus)])
    }

    pub fn minus(label: MomentumLabel) -> Self {
        Self::new([(label, LabelFlow::Minus)])
    }

    /// Adds a term, replacing any existing flow of `label`.
    pub fn with(mut self, label: MomentumLabel, flow: LabelFlow) -> Self {
        self.flows[label] = flow;
        self
    }

    pub fn flow(&self, label: MomentumLabel) -> LabelFlow {
        self.flows[label]
    }

    /// The labels entering with a non-null flow.
    pub fn labels(&self) -> impl Iterator<Item = MomentumLabel> + '_ {
        self.flows
            .iter()
            .filter(|(_, flow)| !flow.is_null())
            .map(|(label, _)| label)
    }

    pub fn has_label(&self, label: MomentumLabel) -> bool {
        !self.flows[label].is_null()
    }

    pub fn is_null(&self) -> bool {
        self.labels().next().is_none()
    }

    /// The propagator with the momentum reversed.
    pub fn reverse(&self) -> Self {
        Self {
            flows: MomentumMap::from_fn(|label| self.flows[label].reverse()),
        }
    }

    /// The concrete momentum carried by this propagator.
    pub fn eval(&self, momenta: &DiagramMomenta) -> ThreeVector {
        let mut p = ThreeVector::zeros();
        for (label, flow) in self.flows.iter() {
            if !flow.is_null() {
                p += flow.sign() * momenta[label];
            }
        }
        p
    }

    /// The value the momentum `label` has to take for the total to
    /// vanish, e.g. for the momentum `-q + k2 + k3` the pole in `q` sits
    /// at `k2 + k3`.
    ///
    /// Returns a null propagator if `label` is absent. The unit-flow
    /// invariant guarantees the coefficient of `label` is otherwise
    /// exactly ±1, so the result is `-flow(label) × (sum of the other
    /// terms)`.
    pub fn ir_pole(&self, label: MomentumLabel) -> Propagator {
        match self.flows[label] {
            LabelFlow::Null => Propagator::default(),
            flow => Propagator {
                flows: MomentumMap::from_fn(|l| {
                    if l == label {
                        LabelFlow::Null
                    } else if flow == LabelFlow::Plus {
                        self.flows[l].reverse()
                    } else {
                        self.flows[l]
                    }
                }),
            },
        }
    }

    /// Applies a permutation of the external labels. The map must be
    /// injective on the non-null labels.
    pub(crate) fn relabel(
        &self,
        map: &MomentumMap<MomentumLabel>,
    ) -> Propagator {
        let mut flows = MomentumMap::default();
        for (label, &flow) in self.flows.iter() {
            if !flow.is_null() {
                flows[map[label]] = flow;
            }
        }
        Propagator { flows }
    }
}

impl Neg for Propagator {
    type Output = Self;

    fn neg(self) -> Self {
        self.reverse()
    }
}

impl Neg for &Propagator {
    type Output = Propagator;

    fn neg(self) -> Propagator {
        self.reverse()
    }
}

impl Display for Propagator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (label, flow) in self.flows.iter() {
            match flow {
                LabelFlow::Null => continue,
                LabelFlow::Plus => {
                    if !first {
                        write!(f, "+")?;
                    }
                }
                LabelFlow::Minus => write!(f, "-")?,
            }
            label.fmt(f)?;
            first = false;
        }
        if first {
            '0'.fmt(f)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MomentumLabel::*;

    fn momenta() -> DiagramMomenta {
        DiagramMomenta::zero()
            .with(Q, ThreeVector::new(0.3, -0.1, 0.7))
            .with(K1, ThreeVector::new(1.0, 0.0, 0.0))
            .with(K2, ThreeVector::new(0.0, 1.0, 0.0))
            .with(K3, ThreeVector::new(0.0, 0.0, 1.0))
    }

    #[test]
    fn reverse_negates_eval() {
        let prop = Propagator::minus(Q)
            .with(K2, LabelFlow::Plus)
            .with(K3, LabelFlow::Plus);
        let mom = momenta();
        assert_eq!(prop.reverse().eval(&mom), -prop.eval(&mom));
        assert_eq!(prop.reverse().reverse(), prop);
        assert_eq!((-&prop).eval(&mom), -prop.eval(&mom));
    }

    #[test]
    fn null_and_labels() {
        let prop = Propagator::default();
        assert!(prop.is_null());
        let prop = Propagator::plus(K2).with(Q, LabelFlow::Minus);
        assert!(!prop.is_null());
        assert!(prop.has_label(Q));
        assert!(prop.has_label(K2));
        assert!(!prop.has_label(K1));
        assert_eq!(prop.labels().collect::<Vec<_>>(), vec![Q, K2]);
    }

    #[test]
    fn ir_pole_round_trip() {
        // -q + k2 + k3 vanishes at q = k2 + k3
        let prop = Propagator::minus(Q)
            .with(K2, LabelFlow::Plus)
            .with(K3, LabelFlow::Plus);
        let pole = prop.ir_pole(Q);
        assert_eq!(pole.flow(K2), LabelFlow::Plus);
        assert_eq!(pole.flow(K3), LabelFlow::Plus);
        assert!(!pole.has_label(Q));

        let mom = momenta();
        let at_pole = mom.with_loop(pole.eval(&mom));
        assert!(prop.eval(&at_pole).norm() < 1e-12);
    }

    #[test]
    fn ir_pole_flips_for_plus_flow() {
        // q + k2 vanishes at q = -k2
        let prop = Propagator::plus(Q).with(K2, LabelFlow::Plus);
        let pole = prop.ir_pole(Q);
        assert_eq!(pole, Propagator::minus(K2));

        let mom = momenta();
        let at_pole = mom.with_loop(pole.eval(&mom));
        assert!(prop.eval(&at_pole).norm() < 1e-12);
    }

    #[test]
    fn ir_pole_of_absent_label_is_null() {
        let prop = Propagator::plus(K2);
        assert!(prop.ir_pole(Q).is_null());
    }

    #[test]
    fn display() {
        let prop = Propagator::minus(Q)
            .with(K2, LabelFlow::Plus)
            .with(K3, LabelFlow::Plus);
        assert_eq!(prop.to_string(), "-q+k2+k3");
        assert_eq!(Propagator::default().to_string(), "0");
        assert_eq!(Propagator::plus(K1).to_string(), "k1");
    }
}
