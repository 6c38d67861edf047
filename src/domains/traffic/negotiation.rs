use super::conflict::Conflict;
use super::reservation::RobotId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Proceed,
    Wait(u32),
    Replan,
}

impl Decision {
    /// Replan beats Wait beats Proceed when a robot loses several conflicts.
    fn severity(&self) -> u8 {
        match self {
            Decision::Proceed => 0,
            Decision::Wait(_) => 1,
            Decision::Replan => 2,
        }
    }

    pub fn strongest(self, other: Decision) -> Decision {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

/// Which ranking criterion comes first after pinning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankOrder {
    /// Task priority, then first commit tick, then id.
    #[default]
    PriorityFirst,
    /// First commit tick, then task priority, then id.
    CommitFirst,
}

/// Ranking facts about one robot taking part in a negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contender {
    pub robot_id: RobotId,
    /// Cannot give way this tick: parked with no path to cut short, or its
    /// keys were already settled earlier in the tick.
    pub pinned: bool,
    /// Priority of the task being worked on; `None` without a task.
    pub priority: Option<u32>,
    /// Tick the current task's path was first committed.
    pub commit_tick: Option<u64>,
}

impl Contender {
    /// Total order, best first: higher task priority, earlier first commit,
    /// lower id. A pinned robot is treated as an obstacle and goes first.
    pub fn rank_cmp(&self, other: &Contender) -> Ordering {
        self.rank_by(other, RankOrder::default())
    }

    pub fn rank_by(&self, other: &Contender, order: RankOrder) -> Ordering {
        let priority = other.priority.cmp(&self.priority);
        let commit = match (self.commit_tick, other.commit_tick) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        let criteria = match order {
            RankOrder::PriorityFirst => priority.then(commit),
            RankOrder::CommitFirst => commit.then(priority),
        };
        other
            .pinned
            .cmp(&self.pinned)
            .then(criteria)
            .then_with(|| self.robot_id.cmp(&other.robot_id))
    }

    pub fn outranks(&self, other: &Contender) -> bool {
        self.rank_cmp(other) == Ordering::Less
    }
}

/// Outcome of one conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub tick: u64,
    pub conflict: Conflict,
    /// Best-ranked robot first.
    pub decisions: Vec<(RobotId, Decision)>,
}

impl Resolution {
    pub fn decision_for(&self, robot_id: RobotId) -> Option<Decision> {
        self.decisions
            .iter()
            .find(|(id, _)| *id == robot_id)
            .map(|(_, decision)| *decision)
    }

    pub fn winner(&self) -> Option<RobotId> {
        self.decisions.first().map(|(id, _)| *id)
    }
}

/// Deterministic right-of-way policy.
///
/// The best-ranked robot proceeds. Every other robot waits one tick, unless
/// the same pair has already collided on each of the previous
/// `wait_bound - 1` ticks, in which case it must replan. Swaps and blocked
/// routes always force a replan.
#[derive(Debug, Clone)]
pub struct NegotiationResolver {
    wait_bound: u32,
    rank_order: RankOrder,
    /// Consecutive-tick collision count per `(loser, winner)`.
    streaks: BTreeMap<(RobotId, RobotId), u32>,
    decided: BTreeMap<(RobotId, RobotId), Decision>,
}

impl NegotiationResolver {
    pub fn new(wait_bound: u32) -> Self {
        Self {
            wait_bound: wait_bound.max(1),
            rank_order: RankOrder::default(),
            streaks: BTreeMap::new(),
            decided: BTreeMap::new(),
        }
    }

    pub fn with_rank_order(mut self, rank_order: RankOrder) -> Self {
        self.rank_order = rank_order;
        self
    }

    pub fn wait_bound(&self) -> u32 {
        self.wait_bound
    }

    pub fn rank_order(&self) -> RankOrder {
        self.rank_order
    }

    pub fn resolve(&mut self, tick: u64, conflict: &Conflict, contenders: &[Contender]) -> Resolution {
        let mut ranked: Vec<Contender> = contenders
            .iter()
            .filter(|c| conflict.involves(c.robot_id))
            .copied()
            .collect();
        ranked.sort_by(|a, b| a.rank_by(b, self.rank_order));
        ranked.dedup_by_key(|c| c.robot_id);

        let mut decisions = Vec::with_capacity(ranked.len());
        if let Some((winner, losers)) = ranked.split_first() {
            decisions.push((winner.robot_id, Decision::Proceed));
            for loser in losers {
                let decision = self.decide(loser.robot_id, winner.robot_id, conflict.forces_replan());
                decisions.push((loser.robot_id, decision));
            }
        }

        Resolution {
            tick,
            conflict: conflict.clone(),
            decisions,
        }
    }

    fn decide(&mut self, loser: RobotId, winner: RobotId, forced: bool) -> Decision {
        let key = (loser, winner);
        if let Some(decision) = self.decided.get(&key) {
            return *decision;
        }
        let decision = if forced {
            self.streaks.remove(&key);
            Decision::Replan
        } else {
            let streak = self.streaks.entry(key).or_insert(0);
            *streak += 1;
            if *streak >= self.wait_bound {
                self.streaks.remove(&key);
                Decision::Replan
            } else {
                Decision::Wait(1)
            }
        };
        self.decided.insert(key, decision);
        decision
    }

    /// Close the tick: pairs that did not collide this tick start over.
    pub fn end_tick(&mut self) {
        let decided = std::mem::take(&mut self.decided);
        self.streaks.retain(|key, _| decided.contains_key(key));
    }

    pub fn forget(&mut self, robot_id: RobotId) {
        self.streaks.retain(|(a, b), _| *a != robot_id && *b != robot_id);
        self.decided.retain(|(a, b), _| *a != robot_id && *b != robot_id);
    }

    pub fn streak(&self, loser: RobotId, winner: RobotId) -> u32 {
        self.streaks.get(&(loser, winner)).copied().unwrap_or(0)
    }
}
