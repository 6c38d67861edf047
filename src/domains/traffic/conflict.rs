use super::reservation::{ReservationTable, RobotId, ScheduledPath};
use crate::domains::grid_map::Cell;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConflictKind {
    /// Same cell, same tick.
    Occupancy,
    /// Two robots trading cells between consecutive ticks.
    Swap,
    /// A parked robot stands on the only route another robot has.
    Blocking,
}

/// One colliding key between a pair of robots. `robots` is ordered low id first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Collision {
    pub tick: u64,
    pub cell: Cell,
    pub kind: ConflictKind,
    pub robots: (RobotId, RobotId),
    /// Robot whose reservation-table entry was hit; `None` when two proposals
    /// collide with each other.
    pub holder: Option<RobotId>,
}

impl Collision {
    pub fn new(kind: ConflictKind, cell: Cell, tick: u64, a: RobotId, b: RobotId) -> Self {
        let robots = if a <= b { (a, b) } else { (b, a) };
        Self {
            tick,
            cell,
            kind,
            robots,
            holder: None,
        }
    }

    /// A collision of `proposer`'s path with keys `holder` already owns.
    pub fn against(kind: ConflictKind, cell: Cell, tick: u64, proposer: RobotId, holder: RobotId) -> Self {
        Self {
            holder: Some(holder),
            ..Self::new(kind, cell, tick, proposer, holder)
        }
    }

    pub fn involves(&self, robot_id: RobotId) -> bool {
        self.robots.0 == robot_id || self.robots.1 == robot_id
    }
}

/// Robots whose reservations collide, with every colliding key found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub robots: Vec<RobotId>,
    pub collisions: Vec<Collision>,
}

impl Conflict {
    pub fn from_collisions(mut collisions: Vec<Collision>) -> Self {
        collisions.sort();
        collisions.dedup();
        let mut robots: Vec<RobotId> = collisions
            .iter()
            .flat_map(|c| [c.robots.0, c.robots.1])
            .collect();
        robots.sort();
        robots.dedup();
        Self { robots, collisions }
    }

    pub fn involves(&self, robot_id: RobotId) -> bool {
        self.robots.contains(&robot_id)
    }

    pub fn first(&self) -> Option<&Collision> {
        self.collisions.first()
    }

    pub fn earliest_tick(&self) -> Option<u64> {
        self.first().map(|c| c.tick)
    }

    pub fn has_swap(&self) -> bool {
        self.collisions.iter().any(|c| c.kind == ConflictKind::Swap)
    }

    /// Waiting cannot clear swaps or blocked routes.
    pub fn forces_replan(&self) -> bool {
        self.collisions
            .iter()
            .any(|c| matches!(c.kind, ConflictKind::Swap | ConflictKind::Blocking))
    }

    /// One conflict per colliding pair, ordered by earliest tick.
    pub fn into_pairs(self) -> Vec<Conflict> {
        group_by_pair(self.collisions)
    }
}

fn group_by_pair(collisions: Vec<Collision>) -> Vec<Conflict> {
    let mut by_pair: BTreeMap<(RobotId, RobotId), Vec<Collision>> = BTreeMap::new();
    for collision in collisions {
        by_pair.entry(collision.robots).or_default().push(collision);
    }
    let mut conflicts: Vec<Conflict> = by_pair.into_values().map(Conflict::from_collisions).collect();
    conflicts.sort_by(|a, b| a.earliest_tick().cmp(&b.earliest_tick()).then_with(|| a.robots.cmp(&b.robots)));
    conflicts
}

/// Finds occupancy and swap conflicts for freshly proposed paths over the
/// next `horizon` ticks, both against the reservation table and between the
/// proposals themselves.
#[derive(Debug, Clone, Copy)]
pub struct ConflictDetector {
    horizon: u64,
}

impl ConflictDetector {
    pub fn new(horizon: u64) -> Self {
        Self {
            horizon: horizon.max(1),
        }
    }

    pub fn horizon(&self) -> u64 {
        self.horizon
    }

    pub fn detect(&self, table: &ReservationTable, proposals: &[(RobotId, ScheduledPath)]) -> Vec<Conflict> {
        let now = table.current_tick();
        let until = now + self.horizon;
        let mut collisions = Vec::new();

        for (robot_id, path) in proposals {
            collisions.extend(table.collisions_for(*robot_id, path, Some(until)));
        }

        for (i, (a_id, a_path)) in proposals.iter().enumerate() {
            for (b_id, b_path) in proposals.iter().skip(i + 1) {
                if a_id == b_id {
                    continue;
                }
                for tick in now..=until {
                    let a_here = a_path.cell_at(tick);
                    let b_here = b_path.cell_at(tick);
                    if a_here == b_here {
                        collisions.push(Collision::new(ConflictKind::Occupancy, a_here, tick, *a_id, *b_id));
                    }
                    if tick < until {
                        let a_next = a_path.cell_at(tick + 1);
                        let b_next = b_path.cell_at(tick + 1);
                        if a_here != a_next && a_here == b_next && a_next == b_here {
                            collisions.push(Collision::new(ConflictKind::Swap, a_next, tick + 1, *a_id, *b_id));
                        }
                    }
                }
            }
        }

        group_by_pair(collisions)
    }
}
