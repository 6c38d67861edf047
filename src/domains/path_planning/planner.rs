use crate::common::{DomainError, DomainResult};
use crate::domains::grid_map::{Cell, GridMap};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// What a planning call is trying to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanTarget {
    /// The cell itself.
    Exact(Cell),
    /// Any free cell orthogonally adjacent to the given one.
    Adjacent(Cell),
    /// The closest charging station that is not blocked.
    NearestCharger,
}

impl PlanTarget {
    pub fn anchor(&self) -> Option<Cell> {
        match self {
            PlanTarget::Exact(cell) | PlanTarget::Adjacent(cell) => Some(*cell),
            PlanTarget::NearestCharger => None,
        }
    }
}

/// Breadth-first planner over the grid graph.
///
/// Holds no mutable state, so one instance can serve concurrent planning
/// calls against the same grid snapshot.
#[derive(Debug, Clone, Copy)]
pub struct PathPlanner {
    max_expansions: usize,
}

impl Default for PathPlanner {
    fn default() -> Self {
        Self {
            max_expansions: usize::MAX,
        }
    }
}

impl PathPlanner {
    /// `max_expansions` bounds a single call; exceeding it yields
    /// `PlanningBudgetExceeded` so the caller can retry on a later tick.
    pub fn new(max_expansions: usize) -> Self {
        Self {
            max_expansions: max_expansions.max(1),
        }
    }

    pub fn find_path(&self, grid: &GridMap, start: Cell, goal: Cell) -> DomainResult<Vec<Cell>> {
        self.plan(grid, start, PlanTarget::Exact(goal), &HashSet::new())
    }

    /// Shortest path from `start` to `target`, inclusive at both ends, treating
    /// `blocked` as obstacles for this call only. The start cell is never
    /// considered blocked.
    pub fn plan(
        &self,
        grid: &GridMap,
        start: Cell,
        target: PlanTarget,
        blocked: &HashSet<Cell>,
    ) -> DomainResult<Vec<Cell>> {
        grid.is_traversable(start)?;
        let no_path = || DomainError::NoPathFound {
            from: start.as_tuple(),
            to: target.anchor().unwrap_or(start).as_tuple(),
        };

        if let PlanTarget::Exact(goal) | PlanTarget::Adjacent(goal) = target {
            let traversable = grid.is_traversable(goal)?;
            if matches!(target, PlanTarget::Exact(_))
                && goal != start
                && (!traversable || blocked.contains(&goal))
            {
                return Err(no_path());
            }
        }

        let is_goal = |cell: Cell| -> bool {
            match target {
                PlanTarget::Exact(goal) => cell == goal,
                PlanTarget::Adjacent(goal) => {
                    cell.is_adjacent(&goal) && (cell == start || !blocked.contains(&cell))
                }
                PlanTarget::NearestCharger => {
                    grid.is_charging_station(cell).unwrap_or(false)
                        && (cell == start || !blocked.contains(&cell))
                }
            }
        };

        self.search(grid, start, blocked, is_goal)?.ok_or_else(no_path)
    }

    /// Shortest path from `start` to the nearest free cell outside
    /// `keep_clear`. Cells in `keep_clear` may be crossed but not stopped on.
    pub fn plan_aside(
        &self,
        grid: &GridMap,
        start: Cell,
        keep_clear: &HashSet<Cell>,
        blocked: &HashSet<Cell>,
    ) -> DomainResult<Vec<Cell>> {
        grid.is_traversable(start)?;
        self.search(grid, start, blocked, |cell| !keep_clear.contains(&cell))?
            .ok_or(DomainError::NoPathFound {
                from: start.as_tuple(),
                to: start.as_tuple(),
            })
    }

    fn search(
        &self,
        grid: &GridMap,
        start: Cell,
        blocked: &HashSet<Cell>,
        is_goal: impl Fn(Cell) -> bool,
    ) -> DomainResult<Option<Vec<Cell>>> {
        if is_goal(start) {
            return Ok(Some(vec![start]));
        }

        let mut parents: HashMap<Cell, Cell> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        let mut expanded = 0usize;

        while let Some(cell) = queue.pop_front() {
            expanded += 1;
            if expanded > self.max_expansions {
                return Err(DomainError::PlanningBudgetExceeded { expanded });
            }
            for next in grid.neighbors(cell)? {
                if next == start || blocked.contains(&next) || parents.contains_key(&next) {
                    continue;
                }
                parents.insert(next, cell);
                if is_goal(next) {
                    return Ok(Some(Self::reconstruct(&parents, start, next)));
                }
                queue.push_back(next);
            }
        }

        Ok(None)
    }

    fn reconstruct(parents: &HashMap<Cell, Cell>, start: Cell, end: Cell) -> Vec<Cell> {
        let mut path = vec![end];
        let mut current = end;
        while current != start {
            match parents.get(&current) {
                Some(parent) => {
                    current = *parent;
                    path.push(current);
                }
                None => break,
            }
        }
        path.reverse();
        path
    }
}

/// Shortest obstacle-avoiding path on `grid`, unbounded search.
pub fn find_path(start: Cell, goal: Cell, grid: &GridMap) -> DomainResult<Vec<Cell>> {
    PathPlanner::default().find_path(grid, start, goal)
}
