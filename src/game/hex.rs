//! Axial hex coordinates

use serde::{Deserialize, Serialize};

/// The six axial neighbor offsets
pub const HEX_DIRS: [(i32, i32); 6] = [(1, 0), (-1, 0), (0, 1), (0, -1), (1, -1), (-1, 1)];

/// Axial hex coordinate `(q, r)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Hex {
    pub q: i32,
    pub r: i32,
}

impl Hex {
    pub const CENTER: Hex = Hex { q: 0, r: 0 };

    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    /// Distance from the map center: `max(|q|, |r|, |q+r|)`
    pub fn dist(self) -> u32 {
        self.distance_to(Self::CENTER)
    }

    pub fn distance_to(self, other: Hex) -> u32 {
        let dq = self.q - other.q;
        let dr = self.r - other.r;
        dq.abs().max(dr.abs()).max((dq + dr).abs()) as u32
    }

    pub fn neighbors(self) -> [Hex; 6] {
        HEX_DIRS.map(|(dq, dr)| Hex::new(self.q + dq, self.r + dr))
    }

    pub fn is_adjacent(self, other: Hex) -> bool {
        self.distance_to(other) == 1
    }

    pub fn is_center(self) -> bool {
        self == Self::CENTER
    }

    /// Polar angle of the hex center in a flat-top layout. Used to walk rings
    /// clockwise and to spread spawns around the edge.
    pub fn angle(self) -> f64 {
        let q = self.q as f64;
        let r = self.r as f64;
        (3f64.sqrt() * (r + q * 0.5)).atan2(1.5 * q)
    }
}

impl From<(i32, i32)> for Hex {
    fn from((q, r): (i32, i32)) -> Self {
        Self::new(q, r)
    }
}

impl std::fmt::Display for Hex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.q, self.r)
    }
}
