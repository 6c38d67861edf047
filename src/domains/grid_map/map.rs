use super::cell::{Cell, Connectivity};
use crate::common::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Traversability over a rectangular grid plus the set of charging stations.
///
/// Read-only during a tick; obstacle edits are applied between ticks by the
/// fleet orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridMap {
    width: i32,
    height: i32,
    connectivity: Connectivity,
    obstacles: Vec<bool>,
    charging_stations: BTreeSet<Cell>,
}

impl GridMap {
    /// An obstacle-free grid.
    pub fn new(width: u32, height: u32, connectivity: Connectivity) -> DomainResult<Self> {
        if width == 0 || height == 0 {
            return Err(DomainError::InvalidCommand {
                reason: format!("Grid dimensions must be positive, got {}x{}", width, height),
            });
        }
        let (width, height) = (Self::dimension(width)?, Self::dimension(height)?);
        Ok(Self {
            width,
            height,
            connectivity,
            obstacles: vec![false; (width as usize) * (height as usize)],
            charging_stations: BTreeSet::new(),
        })
    }

    /// Build from a traversability matrix indexed `[y][x]`, `true` meaning free.
    pub fn from_matrix(matrix: &[Vec<bool>], connectivity: Connectivity) -> DomainResult<Self> {
        let height = matrix.len();
        let width = matrix.first().map(Vec::len).unwrap_or(0);
        if matrix.iter().any(|row| row.len() != width) {
            return Err(DomainError::InvalidCommand {
                reason: "Traversability matrix rows must all have the same length".to_string(),
            });
        }
        let mut grid = Self::new(width as u32, height as u32, connectivity)?;
        for (y, row) in matrix.iter().enumerate() {
            for (x, free) in row.iter().enumerate() {
                grid.obstacles[y * width + x] = !free;
            }
        }
        Ok(grid)
    }

    pub fn with_charging_stations<I>(mut self, cells: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = Cell>,
    {
        for cell in cells {
            self.add_charging_station(cell)?;
        }
        Ok(self)
    }

    fn dimension(value: u32) -> DomainResult<i32> {
        i32::try_from(value).map_err(|_| DomainError::InvalidCommand {
            reason: format!("Grid dimension {} is too large", value),
        })
    }

    pub fn width(&self) -> u32 {
        self.width as u32
    }

    pub fn height(&self) -> u32 {
        self.height as u32
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.y >= 0 && cell.x < self.width && cell.y < self.height
    }

    fn index(&self, cell: Cell) -> DomainResult<usize> {
        if !self.contains(cell) {
            return Err(DomainError::OutOfBounds { x: cell.x, y: cell.y });
        }
        Ok(cell.y as usize * self.width as usize + cell.x as usize)
    }

    pub fn is_traversable(&self, cell: Cell) -> DomainResult<bool> {
        let idx = self.index(cell)?;
        Ok(!self.obstacles[idx])
    }

    fn free(&self, cell: Cell) -> bool {
        self.contains(cell) && !self.obstacles[cell.y as usize * self.width as usize + cell.x as usize]
    }

    /// Traversable neighbours in the connectivity's fixed order.
    ///
    /// Diagonal steps are only offered when both orthogonal cells they pass
    /// between are free, so a robot never clips an obstacle corner.
    pub fn neighbors(&self, cell: Cell) -> DomainResult<Vec<Cell>> {
        self.index(cell)?;
        let neighbors = self
            .connectivity
            .offsets()
            .iter()
            .filter_map(|&(dx, dy)| {
                let next = cell.offset(dx, dy);
                if !self.free(next) {
                    return None;
                }
                if dx != 0 && dy != 0 && !(self.free(cell.offset(dx, 0)) && self.free(cell.offset(0, dy))) {
                    return None;
                }
                Some(next)
            })
            .collect();
        Ok(neighbors)
    }

    pub fn is_charging_station(&self, cell: Cell) -> DomainResult<bool> {
        self.index(cell)?;
        Ok(self.charging_stations.contains(&cell))
    }

    pub fn charging_stations(&self) -> impl Iterator<Item = &Cell> {
        self.charging_stations.iter()
    }

    pub fn has_charging_stations(&self) -> bool {
        !self.charging_stations.is_empty()
    }

    pub fn add_charging_station(&mut self, cell: Cell) -> DomainResult<()> {
        if !self.is_traversable(cell)? {
            return Err(DomainError::OccupiedOrObstacle { x: cell.x, y: cell.y });
        }
        self.charging_stations.insert(cell);
        Ok(())
    }

    pub fn set_obstacle(&mut self, cell: Cell, is_obstacle: bool) -> DomainResult<()> {
        let idx = self.index(cell)?;
        self.obstacles[idx] = is_obstacle;
        Ok(())
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| Cell::new(x, y)))
    }

    pub fn free_cells(&self) -> impl Iterator<Item = Cell> + '_ {
        self.cells().filter(move |cell| self.free(*cell))
    }
}
