use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer grid coordinate. `y` grows southwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn manhattan(&self, other: &Cell) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// True for the four orthogonal neighbours.
    pub fn is_adjacent(&self, other: &Cell) -> bool {
        self.manhattan(other) == 1
    }

    pub fn as_tuple(&self) -> (i32, i32) {
        (self.x, self.y)
    }
}

impl From<(i32, i32)> for Cell {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    #[default]
    Four,
    Eight,
}

impl Connectivity {
    /// Neighbour offsets in the fixed expansion order: clockwise starting north.
    pub fn offsets(&self) -> &'static [(i32, i32)] {
        match self {
            Connectivity::Four => &[(0, -1), (1, 0), (0, 1), (-1, 0)],
            Connectivity::Eight => &[
                (0, -1),
                (1, -1),
                (1, 0),
                (1, 1),
                (0, 1),
                (-1, 1),
                (-1, 0),
                (-1, -1),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manhattan_is_symmetric() {
        let a = Cell::new(1, 4);
        let b = Cell::new(3, 0);
        assert_eq!(a.manhattan(&b), 6);
        assert_eq!(b.manhattan(&a), 6);
    }

    #[test]
    fn four_connectivity_starts_north_and_turns_clockwise() {
        let origin = Cell::new(2, 2);
        let order: Vec<Cell> = Connectivity::Four
            .offsets()
            .iter()
            .map(|(dx, dy)| origin.offset(*dx, *dy))
            .collect();
        assert_eq!(
            order,
            vec![Cell::new(2, 1), Cell::new(3, 2), Cell::new(2, 3), Cell::new(1, 2)]
        );
    }
}
