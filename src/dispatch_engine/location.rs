use serde::{Deserialize, Serialize};
use std::fmt;

/// A point on the simulation grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: i64,
    pub y: i64,
}

impl Coordinate {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Manhattan distance between two grid points: `|x1 - x2| + |y1 - y2|`.
pub fn distance(a: Coordinate, b: Coordinate) -> u64 {
    a.x.abs_diff(b.x).saturating_add(a.y.abs_diff(b.y))
}
