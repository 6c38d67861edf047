use super::FleetOrchestrator;
use crate::common::{DomainError, DomainResult};
use crate::domains::fleet::events::FleetEvent;
use crate::domains::fleet::projections::TickReport;
use crate::domains::fleet::robot::{PathPurpose, RobotStatus};
use crate::domains::grid_map::Cell;
use crate::domains::motion::{MotionOutcome, MotionStep};
use crate::domains::path_planning::PlanTarget;
use crate::domains::traffic::{
    Collision, Conflict, ConflictKind, Contender, Decision, Resolution, RobotId, ScheduledPath,
};
use chrono::Utc;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, Clone)]
struct PlanRequest {
    robot_id: RobotId,
    start: Cell,
    target: PlanTarget,
    purpose: PathPurpose,
    blocked: HashSet<Cell>,
}

#[derive(Debug, Clone)]
struct Proposal {
    robot_id: RobotId,
    target: PlanTarget,
    purpose: PathPurpose,
    path: ScheduledPath,
    contender: Contender,
}

/// Outcome for a robot that lost at least one conflict this tick.
#[derive(Debug, Clone)]
struct Loss {
    decision: Decision,
    winners: BTreeSet<RobotId>,
}

fn note_losses(resolution: &Resolution, losses: &mut BTreeMap<RobotId, Loss>) {
    let Some(winner) = resolution.winner() else {
        return;
    };
    for (robot_id, decision) in resolution.decisions.iter().skip(1) {
        let loss = losses.entry(*robot_id).or_insert(Loss {
            decision: *decision,
            winners: BTreeSet::new(),
        });
        loss.decision = loss.decision.strongest(*decision);
        loss.winners.insert(winner);
    }
}

impl FleetOrchestrator {
    /// Runs one simulation tick.
    ///
    /// Robots that need a path are planned against a snapshot of the state,
    /// in parallel when enabled. Proposals are then checked for conflicts over
    /// the lookahead horizon and negotiated. Committed robots that lose give
    /// way at their next cell boundary, and the remaining proposals are
    /// committed one at a time in rank order so the reservation table never
    /// holds two robots on one cell at one tick. Finally every robot is
    /// advanced and the clock moves on.
    pub fn tick(&mut self) -> DomainResult<TickReport> {
        let now = self.table.current_tick();
        let mut resolutions = Vec::new();

        let requests = self.planning_requests();
        let planned = self.plan_all(&requests);
        let pace = self.pace();
        let mut proposals = Vec::with_capacity(requests.len());
        for (request, result) in requests.into_iter().zip(planned) {
            match result.and_then(|cells| ScheduledPath::with_pace(cells, now, pace)) {
                Ok(path) => {
                    let Some(robot) = self.robots.get(&request.robot_id) else {
                        continue;
                    };
                    proposals.push(Proposal {
                        robot_id: request.robot_id,
                        target: request.target,
                        purpose: request.purpose,
                        path,
                        contender: robot.contender(false),
                    });
                }
                Err(error) => self.planning_failed(request.robot_id, request.target, &error, now, &mut resolutions)?,
            }
        }
        let order = self.resolver.rank_order();
        proposals.sort_by(|a, b| a.contender.rank_by(&b.contender, order));

        let proposers: BTreeSet<RobotId> = proposals.iter().map(|p| p.robot_id).collect();
        // Robots standing still with no path to cut short cannot give way.
        let pinned: BTreeSet<RobotId> = self
            .robots
            .values()
            .filter(|robot| !proposers.contains(&robot.id) && robot.active_path.is_none())
            .map(|robot| robot.id)
            .collect();
        let candidates: Vec<(RobotId, ScheduledPath)> =
            proposals.iter().map(|p| (p.robot_id, p.path.clone())).collect();
        let mut losses = BTreeMap::new();
        for conflict in self.detector.detect(&self.table, &candidates) {
            let resolution = self.negotiate(now, &conflict, &pinned)?;
            note_losses(&resolution, &mut losses);
            resolutions.push(resolution);
        }

        let giving_way: Vec<(RobotId, Decision)> = losses
            .iter()
            .filter(|(robot_id, loss)| {
                !proposers.contains(*robot_id)
                    && loss
                        .winners
                        .iter()
                        .any(|winner| proposers.contains(winner) && !losses.contains_key(winner))
            })
            .map(|(robot_id, loss)| (*robot_id, loss.decision))
            .collect();
        for (robot_id, decision) in giving_way {
            self.give_way(robot_id, decision, now)?;
        }

        for proposal in &proposals {
            if losses.contains_key(&proposal.robot_id) {
                continue;
            }
            match self.table.commit(proposal.robot_id, &proposal.path) {
                Ok(_) => self.path_committed(proposal.robot_id, &proposal.path, proposal.purpose, now)?,
                Err(rejected) => {
                    // Beyond the lookahead horizon, or a holder that could not
                    // stop in time; whoever owns the keys now keeps them.
                    let settled: BTreeSet<RobotId> =
                        self.robots.keys().filter(|id| **id != proposal.robot_id).copied().collect();
                    for pair in rejected.into_pairs() {
                        let resolution = self.negotiate(now, &pair, &settled)?;
                        note_losses(&resolution, &mut losses);
                        resolutions.push(resolution);
                    }
                }
            }
        }

        for proposal in &proposals {
            let Some(loss) = losses.get(&proposal.robot_id) else {
                continue;
            };
            match loss.decision {
                Decision::Proceed => {}
                Decision::Wait(_) => {
                    let blocked_on = proposal.path.cells().get(1).copied();
                    self.wait_in_place(proposal.robot_id, blocked_on, now)?;
                }
                Decision::Replan => self.replan_around(proposal, &loss.winners, now, &mut resolutions)?,
            }
        }

        let robot_ids: Vec<RobotId> = self.robots.keys().copied().collect();
        for robot_id in robot_ids {
            self.drive(robot_id, now)?;
        }

        self.table.advance_tick();
        self.resolver.end_tick();
        debug_assert!(
            self.table.find_double_booking().is_none(),
            "reservation table holds two robots on one cell"
        );

        let report = TickReport {
            tick: now,
            snapshot: self.snapshot(),
            resolutions,
        };
        tracing::debug!("{}", report.summary_line());
        Ok(report)
    }

    pub(super) fn pace(&self) -> u32 {
        self.motion.ticks_per_cell(self.speed_multiplier, self.simulation.dt)
    }

    fn planning_requests(&self) -> Vec<PlanRequest> {
        let has_chargers = self.grid.has_charging_stations();
        let mut requests = Vec::new();
        for robot in self.robots.values().filter(|robot| robot.needs_plan()) {
            let robot_id = robot.id;
            let (target, purpose) = if robot.seeking_charger && has_chargers {
                (PlanTarget::NearestCharger, PathPurpose::Charger)
            } else if let Some(task) = robot.task {
                // A robot parked on the goal cannot be planned through; stop next to it.
                match self.table.resting_robot(task.target) {
                    Some(other) if other != robot_id => (PlanTarget::Adjacent(task.target), PathPurpose::Task),
                    _ => (PlanTarget::Exact(task.target), PathPurpose::Task),
                }
            } else {
                continue;
            };

            let mut blocked: HashSet<Cell> = self.table.resting_cells_except(robot_id).collect();
            if robot.pending_replan.map_or(false, |reason| reason.avoids_reservations()) {
                blocked.extend(self.reserved_by_higher_ranked(robot_id));
            }
            requests.push(PlanRequest {
                robot_id,
                start: robot.cell,
                target,
                purpose,
                blocked,
            });
        }
        requests
    }

    fn plan_all(&self, requests: &[PlanRequest]) -> Vec<DomainResult<Vec<Cell>>> {
        let planner = self.planner;
        let grid = &self.grid;
        let plan = |request: &PlanRequest| planner.plan(grid, request.start, request.target, &request.blocked);
        if self.simulation.parallel_planning && requests.len() > 1 {
            requests.par_iter().map(plan).collect()
        } else {
            requests.iter().map(plan).collect()
        }
    }

    fn reserved_by_higher_ranked(&self, robot_id: RobotId) -> Vec<Cell> {
        let Some(me) = self.robots.get(&robot_id).map(|robot| robot.contender(false)) else {
            return Vec::new();
        };
        let order = self.resolver.rank_order();
        self.robots
            .values()
            .filter(|other| {
                other.id != robot_id && other.contender(false).rank_by(&me, order) == Ordering::Less
            })
            .flat_map(|other| self.table.reserved_cells(other.id))
            .collect()
    }

    fn negotiate(&mut self, now: u64, conflict: &Conflict, pinned: &BTreeSet<RobotId>) -> DomainResult<Resolution> {
        let contenders: Vec<Contender> = conflict
            .robots
            .iter()
            .filter_map(|robot_id| {
                self.robots
                    .get(robot_id)
                    .map(|robot| robot.contender(pinned.contains(robot_id)))
            })
            .collect();
        let resolution = self.resolver.resolve(now, conflict, &contenders);

        if let (Some(winner), Some(first)) = (resolution.winner(), conflict.first()) {
            tracing::info!(
                "Tick {}: {:?} conflict at {} (tick {}) between {:?}, {} proceeds",
                now,
                first.kind,
                first.cell,
                first.tick,
                conflict.robots,
                winner
            );
        }
        self.record(FleetEvent::ConflictResolved {
            fleet_id: self.id.clone(),
            resolution: resolution.clone(),
            timestamp: Utc::now(),
        })?;
        Ok(resolution)
    }

    /// Cuts a committed path short at the robot's next cell boundary so a
    /// higher-ranked proposal can take the keys after it. Nothing changes
    /// when the robot already stops there or the shortened path collides.
    fn give_way(&mut self, robot_id: RobotId, decision: Decision, now: u64) -> DomainResult<()> {
        let Some(robot) = self.robots.get(&robot_id) else {
            return Ok(());
        };
        let (Some(active), Some(stop)) = (robot.active_path.as_ref(), robot.next_boundary()) else {
            return Ok(());
        };
        if stop + 1 >= active.path.len() {
            return Ok(());
        }
        let shortened = active.path.truncated(stop);
        let cell = shortened.goal();
        if let Err(rejected) = self.table.commit(robot_id, &shortened) {
            tracing::debug!("{} cannot stop at {}: {:?}", robot_id, cell, rejected.robots);
            return Ok(());
        }
        tracing::info!("{} gives way, stopping at {}", robot_id, cell);
        self.record(FleetEvent::PathTruncated {
            fleet_id: self.id.clone(),
            robot_id,
            last_index: stop,
            cell,
            displaced: decision == Decision::Replan,
            tick: now,
            timestamp: Utc::now(),
        })
    }

    fn path_committed(&mut self, robot_id: RobotId, path: &ScheduledPath, purpose: PathPurpose, now: u64) -> DomainResult<()> {
        self.record(FleetEvent::PathCommitted {
            fleet_id: self.id.clone(),
            robot_id,
            cells: path.cells().to_vec(),
            start_tick: path.start_tick(),
            ticks_per_cell: path.ticks_per_cell(),
            purpose,
            timestamp: Utc::now(),
        })?;
        tracing::debug!("{} committed {} cells towards {}", robot_id, path.len(), path.goal());
        if path.len() == 1 {
            self.finish_path(robot_id, now)?;
        }
        Ok(())
    }

    fn planning_failed(
        &mut self,
        robot_id: RobotId,
        target: PlanTarget,
        error: &DomainError,
        now: u64,
        resolutions: &mut Vec<Resolution>,
    ) -> DomainResult<()> {
        let Some(robot) = self.robots.get(&robot_id) else {
            return Ok(());
        };
        if robot.active_path.is_some() {
            tracing::debug!("{} keeps its committed path, reroute failed: {}", robot_id, error);
            return Ok(());
        }
        if let DomainError::PlanningBudgetExceeded { expanded } = error {
            tracing::debug!("{} deferred planning after {} expansions", robot_id, expanded);
            return Ok(());
        }
        if matches!(error, DomainError::NoPathFound { .. }) {
            self.clear_the_way(robot_id, target, now, resolutions)?;
        }

        let Some(robot) = self.robots.get(&robot_id) else {
            return Ok(());
        };
        if robot.status == RobotStatus::Stuck {
            return Ok(());
        }
        tracing::warn!("{} is stuck at {}: {}", robot_id, robot.cell, error);
        let event = FleetEvent::RobotStuck {
            fleet_id: self.id.clone(),
            robot_id,
            cell: robot.cell,
            reason: error.to_string(),
            replan: false,
            tick: now,
            timestamp: Utc::now(),
        };
        self.record(event)
    }

    /// Parked robots standing on the only route `robot_id` has to `target`
    /// lose a blocking conflict and step off it. The robot itself plans
    /// again on the next tick.
    fn clear_the_way(
        &mut self,
        robot_id: RobotId,
        target: PlanTarget,
        now: u64,
        resolutions: &mut Vec<Resolution>,
    ) -> DomainResult<()> {
        let Some(start) = self.robots.get(&robot_id).map(|robot| robot.cell) else {
            return Ok(());
        };
        let parked: BTreeMap<Cell, RobotId> = self
            .robots
            .values()
            .filter(|other| other.id != robot_id && other.is_parked())
            .map(|other| (other.cell, other.id))
            .collect();
        if parked.is_empty() {
            return Ok(());
        }
        let blocked: HashSet<Cell> = self
            .table
            .resting_cells_except(robot_id)
            .filter(|cell| !parked.contains_key(cell))
            .collect();
        let Ok(route) = self.planner.plan(&self.grid, start, target, &blocked) else {
            return Ok(());
        };
        let keep_clear: HashSet<Cell> = route.iter().copied().collect();
        let pace = self.pace() as u64;

        for (step, cell) in route.iter().enumerate() {
            let Some(&parked_id) = parked.get(cell) else {
                continue;
            };
            let Some(aside) = self.aside_path(parked_id, &keep_clear, now) else {
                continue;
            };
            let collision = Collision::against(ConflictKind::Blocking, *cell, now + step as u64 * pace, robot_id, parked_id);
            let resolution = self.negotiate(now, &Conflict::from_collisions(vec![collision]), &BTreeSet::new())?;
            let cleared = resolution.winner() == Some(robot_id);
            resolutions.push(resolution);
            if !cleared {
                continue;
            }
            match self.table.commit(parked_id, &aside) {
                Ok(_) => {
                    tracing::info!("{} steps aside to {} for {}", parked_id, aside.goal(), robot_id);
                    self.path_committed(parked_id, &aside, PathPurpose::Aside, now)?;
                }
                Err(rejected) => tracing::debug!("{} cannot step aside: {:?}", parked_id, rejected.robots),
            }
        }
        Ok(())
    }

    fn aside_path(&self, robot_id: RobotId, keep_clear: &HashSet<Cell>, now: u64) -> Option<ScheduledPath> {
        let start = self.robots.get(&robot_id)?.cell;
        let blocked: HashSet<Cell> = self.table.resting_cells_except(robot_id).collect();
        let cells = self.planner.plan_aside(&self.grid, start, keep_clear, &blocked).ok()?;
        ScheduledPath::with_pace(cells, now, self.pace()).ok()
    }

    fn wait_in_place(&mut self, robot_id: RobotId, blocked_on: Option<Cell>, now: u64) -> DomainResult<()> {
        match self.robots.get(&robot_id) {
            // Still bound to its committed path; the reroute is retried next tick.
            Some(robot) if robot.active_path.is_some() => Ok(()),
            Some(_) => self.record(FleetEvent::RobotWaiting {
                fleet_id: self.id.clone(),
                robot_id,
                blocked_on,
                tick: now,
                timestamp: Utc::now(),
            }),
            None => Ok(()),
        }
    }

    fn replan_around(
        &mut self,
        proposal: &Proposal,
        winners: &BTreeSet<RobotId>,
        now: u64,
        resolutions: &mut Vec<Resolution>,
    ) -> DomainResult<()> {
        let robot_id = proposal.robot_id;
        let Some(start) = self.robots.get(&robot_id).map(|robot| robot.cell) else {
            return Ok(());
        };
        let mut blocked: HashSet<Cell> = self.table.resting_cells_except(robot_id).collect();
        for winner in winners {
            blocked.extend(self.table.reserved_cells(*winner));
        }

        let planned = self
            .planner
            .plan(&self.grid, start, proposal.target, &blocked)
            .and_then(|cells| ScheduledPath::with_pace(cells, now, self.pace()));
        match planned {
            Ok(path) => match self.table.commit(robot_id, &path) {
                Ok(_) => self.path_committed(robot_id, &path, proposal.purpose, now),
                Err(rejected) => {
                    tracing::debug!("{} replan rejected by {:?}", robot_id, rejected.robots);
                    self.wait_in_place(robot_id, path.cells().get(1).copied(), now)
                }
            },
            Err(error) => self.planning_failed(robot_id, proposal.target, &error, now, resolutions),
        }
    }

    fn drive(&mut self, robot_id: RobotId, now: u64) -> DomainResult<()> {
        let Some(robot) = self.robots.get(&robot_id) else {
            return Ok(());
        };

        if robot.status == RobotStatus::Charging {
            let battery = (robot.battery + self.battery.charge_per_tick).min(self.battery.capacity);
            let resume_task = robot.task.is_some();
            self.record(FleetEvent::BatteryCharged {
                fleet_id: self.id.clone(),
                robot_id,
                battery,
                tick: now,
                timestamp: Utc::now(),
            })?;
            if battery >= self.battery.capacity {
                self.record(FleetEvent::ChargingStopped {
                    fleet_id: self.id.clone(),
                    robot_id,
                    battery,
                    resume_task,
                    timestamp: Utc::now(),
                })?;
                tracing::info!("{} finished charging", robot_id);
            }
            return Ok(());
        }

        let decision = if robot.active_path.is_some() {
            Decision::Proceed
        } else if robot.status == RobotStatus::Waiting {
            Decision::Wait(1)
        } else {
            return Ok(());
        };
        let cell = robot.cell;

        match self.motion.advance(robot, decision, self.simulation.dt) {
            MotionOutcome::Idle => Ok(()),
            MotionOutcome::Held { wait_target, wait_streak } => self.record(FleetEvent::RobotHeld {
                fleet_id: self.id.clone(),
                robot_id,
                wait_target,
                wait_streak,
                tick: now,
                timestamp: Utc::now(),
            }),
            MotionOutcome::Moved(step) => self.moved(robot_id, step, now),
            MotionOutcome::PathComplete { .. } => self.finish_path(robot_id, now),
            MotionOutcome::StuckDetected { blocked_on } => {
                let reason = match blocked_on {
                    Some(target) => format!("kept waiting for {}", target),
                    None => "kept waiting".to_string(),
                };
                tracing::warn!("{} flagged stuck at {}: {}", robot_id, cell, reason);
                self.record(FleetEvent::RobotStuck {
                    fleet_id: self.id.clone(),
                    robot_id,
                    cell,
                    reason,
                    replan: true,
                    tick: now,
                    timestamp: Utc::now(),
                })
            }
        }
    }

    fn moved(&mut self, robot_id: RobotId, step: MotionStep, now: u64) -> DomainResult<()> {
        self.record(FleetEvent::RobotAdvanced {
            fleet_id: self.id.clone(),
            robot_id,
            cell: step.cell,
            path_index: step.path_index,
            transit_ticks: step.transit_ticks,
            progress: step.progress,
            battery: step.battery,
            tick: now,
            timestamp: Utc::now(),
        })?;

        if step.low_battery {
            if self.grid.has_charging_stations() {
                tracing::info!("{} low on battery ({:.1}), heading to a charger", robot_id, step.battery);
                self.record(FleetEvent::LowBattery {
                    fleet_id: self.id.clone(),
                    robot_id,
                    battery: step.battery,
                    reroute: !step.path_complete,
                    timestamp: Utc::now(),
                })?;
            } else {
                tracing::warn!(
                    "{} low on battery ({:.1}) with no charging station on the map",
                    robot_id,
                    step.battery
                );
            }
        }

        if step.path_complete {
            self.finish_path(robot_id, now)?;
        }
        Ok(())
    }

    /// End of a committed path: complete the task, start charging, or go back
    /// to planning when the path was abandoned underway.
    fn finish_path(&mut self, robot_id: RobotId, now: u64) -> DomainResult<()> {
        let Some(robot) = self.robots.get(&robot_id) else {
            return Ok(());
        };
        let cell = robot.cell;
        let purpose = robot.active_path.as_ref().map(|active| active.purpose);
        let abandoned = robot.pending_replan.map_or(false, |reason| reason.abandons_path());
        let on_charger = self.grid.is_charging_station(cell)?;

        let event = match (purpose, robot.task) {
            (Some(PathPurpose::Charger), _) if on_charger => FleetEvent::ChargingStarted {
                fleet_id: self.id.clone(),
                robot_id,
                cell,
                timestamp: Utc::now(),
            },
            (Some(PathPurpose::Task), Some(task)) if !abandoned => {
                tracing::info!("{} completed task {} at {}", robot_id, task.target, cell);
                FleetEvent::TaskCompleted {
                    fleet_id: self.id.clone(),
                    robot_id,
                    target: task.target,
                    reached: cell,
                    tick: now,
                    timestamp: Utc::now(),
                }
            }
            _ => FleetEvent::PathEnded {
                fleet_id: self.id.clone(),
                robot_id,
                cell,
                tick: now,
                timestamp: Utc::now(),
            },
        };
        self.record(event)
    }
}
