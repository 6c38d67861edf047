use super::cell::{Cell, Connectivity};
use super::map::GridMap;
use crate::common::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};

/// Textual grid description: `.` free, `#` obstacle, `C` charging station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridLayout {
    #[serde(default)]
    pub name: Option<String>,
    pub rows: Vec<String>,
    #[serde(default)]
    pub chargers: Vec<(i32, i32)>,
    #[serde(default)]
    pub connectivity: Option<Connectivity>,
}

impl GridLayout {
    pub fn from_json(json: &str) -> DomainResult<Self> {
        let layout: GridLayout = serde_json::from_str(json)?;
        Ok(layout)
    }

    pub fn into_grid(self, default_connectivity: Connectivity) -> DomainResult<GridMap> {
        if self.rows.is_empty() {
            return Err(DomainError::InvalidCommand {
                reason: "Grid layout has no rows".to_string(),
            });
        }

        let mut matrix = Vec::with_capacity(self.rows.len());
        let mut chargers: Vec<Cell> = self.chargers.iter().map(|&c| Cell::from(c)).collect();
        for (y, row) in self.rows.iter().enumerate() {
            let mut line = Vec::with_capacity(row.len());
            for (x, ch) in row.chars().enumerate() {
                match ch {
                    '.' => line.push(true),
                    '#' => line.push(false),
                    'C' => {
                        line.push(true);
                        chargers.push(Cell::new(x as i32, y as i32));
                    }
                    other => {
                        return Err(DomainError::InvalidCommand {
                            reason: format!("Unknown layout character '{}' at ({}, {})", other, x, y),
                        })
                    }
                }
            }
            matrix.push(line);
        }

        let connectivity = self.connectivity.unwrap_or(default_connectivity);
        GridMap::from_matrix(&matrix, connectivity)?.with_charging_stations(chargers)
    }
}
