use super::conflict::{Collision, Conflict, ConflictKind};
use crate::common::{DomainError, DomainResult};
use crate::domains::grid_map::Cell;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RobotId(pub u32);

impl fmt::Display for RobotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "robot-{}", self.0)
    }
}

/// Cell sequence with its arrival-tick schedule.
///
/// Cell `i` is entered at `start_tick + i * ticks_per_cell` and held until the
/// next cell is entered. The last cell is held indefinitely from its arrival.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledPath {
    cells: Vec<Cell>,
    start_tick: u64,
    ticks_per_cell: u32,
}

impl ScheduledPath {
    pub fn new(cells: Vec<Cell>, start_tick: u64) -> DomainResult<Self> {
        Self::with_pace(cells, start_tick, 1)
    }

    pub fn with_pace(cells: Vec<Cell>, start_tick: u64, ticks_per_cell: u32) -> DomainResult<Self> {
        if cells.is_empty() {
            return Err(DomainError::InvalidCommand {
                reason: "A scheduled path needs at least one cell".to_string(),
            });
        }
        Ok(Self {
            cells,
            start_tick,
            ticks_per_cell: ticks_per_cell.max(1),
        })
    }

    /// Standing still on `cell` from `tick` onwards.
    pub fn stationary(cell: Cell, tick: u64) -> Self {
        Self {
            cells: vec![cell],
            start_tick: tick,
            ticks_per_cell: 1,
        }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn start_tick(&self) -> u64 {
        self.start_tick
    }

    pub fn ticks_per_cell(&self) -> u32 {
        self.ticks_per_cell
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn start(&self) -> Cell {
        self.cells[0]
    }

    pub fn goal(&self) -> Cell {
        self.cells[self.cells.len() - 1]
    }

    pub fn arrival_tick(&self, index: usize) -> u64 {
        self.start_tick + index as u64 * self.ticks_per_cell as u64
    }

    pub fn end_tick(&self) -> u64 {
        self.arrival_tick(self.cells.len() - 1)
    }

    /// Index of the cell held at `tick`; clamps before start and after the end.
    pub fn index_at(&self, tick: u64) -> usize {
        let elapsed = tick.saturating_sub(self.start_tick) / self.ticks_per_cell as u64;
        (elapsed as usize).min(self.cells.len() - 1)
    }

    pub fn cell_at(&self, tick: u64) -> Cell {
        self.cells[self.index_at(tick)]
    }

    /// Same schedule, ending at `last_index`; the robot then rests there.
    pub fn truncated(&self, last_index: usize) -> Self {
        let end = last_index.min(self.cells.len() - 1);
        Self {
            cells: self.cells[..=end].to_vec(),
            start_tick: self.start_tick,
            ticks_per_cell: self.ticks_per_cell,
        }
    }

    /// Every `(cell, tick)` key before the final cell is reached.
    pub fn timed_keys(&self) -> impl Iterator<Item = (Cell, u64)> + '_ {
        (0..self.cells.len() - 1).flat_map(move |i| {
            let cell = self.cells[i];
            (self.arrival_tick(i)..self.arrival_tick(i + 1)).map(move |tick| (cell, tick))
        })
    }

    /// Final cell and the tick from which it is held.
    pub fn rest(&self) -> (Cell, u64) {
        (self.goal(), self.end_tick())
    }

    /// `(from, to, tick)`: in `from` at `tick`, in `to` at `tick + 1`.
    pub fn transitions(&self) -> impl Iterator<Item = (Cell, Cell, u64)> + '_ {
        (0..self.cells.len() - 1)
            .filter(move |&i| self.cells[i] != self.cells[i + 1])
            .map(move |i| (self.cells[i], self.cells[i + 1], self.arrival_tick(i + 1) - 1))
    }
}

/// Keys granted by a successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub robot_id: RobotId,
    pub keys: Vec<(Cell, u64)>,
    pub rest: (Cell, u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Resting {
    robot_id: RobotId,
    since: u64,
}

#[derive(Debug, Clone, Default)]
struct Holdings {
    keys: Vec<(Cell, u64)>,
    rest: Option<Cell>,
}

/// Time-indexed occupancy of the grid: `(cell, tick) -> robot`.
///
/// Every robot in the table always owns exactly one resting cell (the end of
/// its committed path, or where it stands), so each robot is accounted for at
/// every future tick. Mutation only goes through `commit`, `release` and
/// `advance_tick`.
#[derive(Debug, Clone, Default)]
pub struct ReservationTable {
    current_tick: u64,
    timed: BTreeMap<(Cell, u64), RobotId>,
    resting: BTreeMap<Cell, Resting>,
    holdings: BTreeMap<RobotId, Holdings>,
}

impl ReservationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(tick: u64) -> Self {
        Self {
            current_tick: tick,
            ..Self::default()
        }
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    pub fn contains(&self, robot_id: RobotId) -> bool {
        self.holdings.contains_key(&robot_id)
    }

    pub fn occupant(&self, cell: Cell, tick: u64) -> Option<RobotId> {
        if let Some(robot_id) = self.timed.get(&(cell, tick)) {
            return Some(*robot_id);
        }
        self.resting
            .get(&cell)
            .filter(|rest| rest.since <= tick)
            .map(|rest| rest.robot_id)
    }

    /// Atomically reserve `path` for `robot_id`, replacing whatever the robot
    /// held before. Nothing changes when any key collides with another robot.
    pub fn commit(&mut self, robot_id: RobotId, path: &ScheduledPath) -> Result<Reservation, Conflict> {
        let collisions = self.collisions_for(robot_id, path, None);
        if !collisions.is_empty() {
            return Err(Conflict::from_collisions(collisions));
        }

        self.release(robot_id);
        let now = self.current_tick;
        let keys: Vec<(Cell, u64)> = path.timed_keys().filter(|(_, tick)| *tick >= now).collect();
        for key in &keys {
            let previous = self.timed.insert(*key, robot_id);
            debug_assert!(previous.is_none(), "reservation key {:?} double-booked", key);
        }
        let (cell, since) = path.rest();
        let previous = self.resting.insert(cell, Resting { robot_id, since });
        debug_assert!(previous.is_none(), "resting cell {} double-booked", cell);
        self.holdings.insert(
            robot_id,
            Holdings {
                keys: keys.clone(),
                rest: Some(cell),
            },
        );
        debug_assert!(
            self.find_double_booking().is_none(),
            "reservation table invariant violated after commit by {}",
            robot_id
        );

        Ok(Reservation {
            robot_id,
            keys,
            rest: (cell, since),
        })
    }

    /// Reserve `cell` for `robot_id` from the current tick onwards.
    pub fn hold(&mut self, robot_id: RobotId, cell: Cell) -> Result<Reservation, Conflict> {
        self.commit(robot_id, &ScheduledPath::stationary(cell, self.current_tick))
    }

    /// Drop every reservation of `robot_id`. Returns false when it held none.
    pub fn release(&mut self, robot_id: RobotId) -> bool {
        let Some(holdings) = self.holdings.remove(&robot_id) else {
            return false;
        };
        for key in holdings.keys {
            if self.timed.get(&key) == Some(&robot_id) {
                self.timed.remove(&key);
            }
        }
        if let Some(cell) = holdings.rest {
            if self.resting.get(&cell).map(|rest| rest.robot_id) == Some(robot_id) {
                self.resting.remove(&cell);
            }
        }
        true
    }

    /// Move to the next tick and drop every key older than it.
    pub fn advance_tick(&mut self) {
        self.current_tick += 1;
        let now = self.current_tick;
        self.timed.retain(|(_, tick), _| *tick >= now);
        for holdings in self.holdings.values_mut() {
            holdings.keys.retain(|(_, tick)| *tick >= now);
        }
    }

    /// Everything `path` would collide with, optionally ignoring ticks after
    /// `until`. Keys owned by `robot_id` itself never collide.
    pub fn collisions_for(&self, robot_id: RobotId, path: &ScheduledPath, until: Option<u64>) -> Vec<Collision> {
        let within = |tick: u64| until.map_or(true, |limit| tick <= limit);
        let other = |found: Option<RobotId>| found.filter(|id| *id != robot_id);
        let mut collisions = Vec::new();

        for (cell, tick) in path.timed_keys() {
            if !within(tick) {
                break;
            }
            if let Some(holder) = other(self.occupant(cell, tick)) {
                collisions.push(Collision::against(ConflictKind::Occupancy, cell, tick, robot_id, holder));
            }
        }

        let (last, end) = path.rest();
        if within(end) {
            if let Some(holder) = other(self.occupant(last, end)) {
                collisions.push(Collision::against(ConflictKind::Occupancy, last, end, robot_id, holder));
            }
        }
        for (&(cell, tick), holder) in self.timed.range((last, end.saturating_add(1))..=(last, u64::MAX)) {
            if *holder != robot_id && within(tick) {
                collisions.push(Collision::against(ConflictKind::Occupancy, cell, tick, robot_id, *holder));
            }
        }
        if let Some(rest) = self.resting.get(&last) {
            if rest.robot_id != robot_id && rest.since > end && within(rest.since) {
                collisions.push(Collision::against(ConflictKind::Occupancy, last, rest.since, robot_id, rest.robot_id));
            }
        }

        for (from, to, tick) in path.transitions() {
            if !within(tick + 1) {
                break;
            }
            if let Some(holder) = other(self.occupant(to, tick)) {
                if self.occupant(from, tick + 1) == Some(holder) {
                    collisions.push(Collision::against(ConflictKind::Swap, to, tick + 1, robot_id, holder));
                }
            }
        }

        collisions.sort();
        collisions.dedup();
        collisions
    }

    /// Cells `robot_id` holds at the current tick or later.
    pub fn reserved_cells(&self, robot_id: RobotId) -> BTreeSet<Cell> {
        let Some(holdings) = self.holdings.get(&robot_id) else {
            return BTreeSet::new();
        };
        holdings
            .keys
            .iter()
            .filter(|(_, tick)| *tick >= self.current_tick)
            .map(|(cell, _)| *cell)
            .chain(holdings.rest)
            .collect()
    }

    /// Cells where a robot other than `robot_id` comes to rest.
    pub fn resting_cells_except(&self, robot_id: RobotId) -> impl Iterator<Item = Cell> + '_ {
        self.resting
            .iter()
            .filter(move |(_, rest)| rest.robot_id != robot_id)
            .map(|(cell, _)| *cell)
    }

    pub fn resting_robot(&self, cell: Cell) -> Option<RobotId> {
        self.resting.get(&cell).map(|rest| rest.robot_id)
    }

    /// Some robot that holds `cell` now or at any later tick.
    pub fn holder_of(&self, cell: Cell) -> Option<RobotId> {
        if let Some(rest) = self.resting.get(&cell) {
            return Some(rest.robot_id);
        }
        self.timed
            .range((cell, self.current_tick)..=(cell, u64::MAX))
            .next()
            .map(|(_, robot_id)| *robot_id)
    }

    /// Every cell held now or later, by anyone.
    pub fn held_cells(&self) -> BTreeSet<Cell> {
        self.timed
            .keys()
            .filter(|(_, tick)| *tick >= self.current_tick)
            .map(|(cell, _)| *cell)
            .chain(self.resting.keys().copied())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.timed.len() + self.resting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timed.is_empty() && self.resting.is_empty()
    }

    /// A `(cell, tick)` key held by two robots at once, if any.
    pub fn find_double_booking(&self) -> Option<(Cell, u64)> {
        self.timed.iter().find_map(|(&(cell, tick), robot_id)| {
            self.resting
                .get(&cell)
                .filter(|rest| rest.robot_id != *robot_id && rest.since <= tick)
                .map(|_| (cell, tick))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(cells: &[(i32, i32)], start: u64) -> ScheduledPath {
        ScheduledPath::new(cells.iter().map(|&c| Cell::from(c)).collect(), start).unwrap()
    }

    #[test]
    fn slow_pace_holds_each_cell_longer() {
        let p = ScheduledPath::with_pace(vec![Cell::new(0, 0), Cell::new(1, 0)], 3, 2).unwrap();
        let keys: Vec<_> = p.timed_keys().collect();
        assert_eq!(keys, vec![(Cell::new(0, 0), 3), (Cell::new(0, 0), 4)]);
        assert_eq!(p.rest(), (Cell::new(1, 0), 5));
        assert_eq!(p.transitions().collect::<Vec<_>>(), vec![(Cell::new(0, 0), Cell::new(1, 0), 4)]);
    }

    #[test]
    fn truncated_rests_on_the_last_kept_cell() {
        let p = path(&[(0, 0), (1, 0), (2, 0), (3, 0)], 2);
        let short = p.truncated(1);
        assert_eq!(short.cells(), &[Cell::new(0, 0), Cell::new(1, 0)]);
        assert_eq!(short.rest(), (Cell::new(1, 0), 3));
        assert_eq!(p.truncated(9).len(), 4);
    }

    #[test]
    fn release_of_unknown_robot_is_a_noop() {
        let mut table = ReservationTable::new();
        table.commit(RobotId(1), &path(&[(0, 0), (1, 0)], 0)).unwrap();
        assert!(!table.release(RobotId(9)));
        assert_eq!(table.occupant(Cell::new(1, 0), 5), Some(RobotId(1)));
    }
}
