use std::fmt::{self, Display};
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// Labels for the momenta flowing through a diagram: the loop momentum
/// plus the external legs.
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
pub enum MomentumLabel {
    Q,
    K1,
    K2,
    K3,
    K4,
}

impl MomentumLabel {
    pub const COUNT: usize = 5;

    pub const ALL: [MomentumLabel; Self::COUNT] = [
        MomentumLabel::Q,
        MomentumLabel::K1,
        MomentumLabel::K2,
        MomentumLabel::K3,
        MomentumLabel::K4,
    ];

    /// The designated loop momentum.
    pub const LOOP: MomentumLabel = MomentumLabel::Q;

    pub const EXTERNAL: [MomentumLabel; 4] = [
        MomentumLabel::K1,
        MomentumLabel::K2,
        MomentumLabel::K3,
        MomentumLabel::K4,
    ];

    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            MomentumLabel::Q => "q",
            MomentumLabel::K1 => "k1",
            MomentumLabel::K2 => "k2",
            MomentumLabel::K3 => "k3",
            MomentumLabel::K4 => "k4",
        }
    }
}

impl Display for MomentumLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name().fmt(f)
    }
}

/// Vertex labels. Vertex `Vn` carries the external momentum `Kn`.
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
pub enum Vertex {
    V1,
    V2,
    V3,
    V4,
}

impl Vertex {
    pub const COUNT: usize = 4;

    pub const ALL: [Vertex; Self::COUNT] =
        [Vertex::V1, Vertex::V2, Vertex::V3, Vertex::V4];

    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Vertex::V1 => "v1",
            Vertex::V2 => "v2",
            Vertex::V3 => "v3",
            Vertex::V4 => "v4",
        }
    }
}

impl Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name().fmt(f)
    }
}

// The label sets are small and fixed, so label-keyed maps are plain
// arrays indexed by the enumeration.

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct MomentumMap<T> {
    entries: [T; MomentumLabel::COUNT],
}

impl<T> MomentumMap<T> {
    pub fn from_fn(f: impl FnMut(MomentumLabel) -> T) -> Self {
        Self {
            entries: MomentumLabel::ALL.map(f),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (MomentumLabel, &T)> {
        MomentumLabel::ALL.into_iter().zip(self.entries.iter())
    }
}

impl<T> Index<MomentumLabel> for MomentumMap<T> {
    type Output = T;

    fn index(&self, label: MomentumLabel) -> &T {
        &self.entries[label.index()]
    }
}

impl<T> IndexMut<MomentumLabel> for MomentumMap<T> {
    fn index_mut(&mut self, label: MomentumLabel) -> &mut T {
        &mut self.entries[label.index()]
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct VertexMap<T> {
    entries: [T; Vertex::COUNT],
}

impl<T> VertexMap<T> {
    pub fn from_fn(f: impl FnMut(Vertex) -> T) -> Self {
        Self {
            entries: Vertex::ALL.map(f),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Vertex, &T)> {
        Vertex::ALL.into_iter().zip(self.entries.iter())
    }
}

impl<T> Index<Vertex> for VertexMap<T> {
    type Output = T;

    fn index(&self, vertex: Vertex) -> &T {
        &self.entries[vertex.index()]
    }
}

impl<T> IndexMut<Vertex> for VertexMap<T> {
    fn index_mut(&mut self, vertex: Vertex) -> &mut T {
        &mut self.entries[vertex.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_maps() {
        let mut map = MomentumMap::from_fn(|l| l.index());
        assert_eq!(map[MomentumLabel::Q], 0);
        assert_eq!(map[MomentumLabel::K4], 4);
        map[MomentumLabel::K2] = 7;
        assert_eq!(map[MomentumLabel::K2], 7);
        assert_eq!(map.iter().count(), MomentumLabel::COUNT);
    }

    #[test]
    fn display() {
        assert_eq!(MomentumLabel::Q.to_string(), "q");
        assert_eq!(Vertex::V3.to_string(), "v3");
    }
}
