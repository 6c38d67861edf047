use fleet_traffic::domains::grid_map::Cell;
use fleet_traffic::domains::traffic::*;
use std::cmp::Ordering;

const A: RobotId = RobotId(0);
const B: RobotId = RobotId(1);
const C: RobotId = RobotId(2);

fn path(cells: &[(i32, i32)], start: u64) -> ScheduledPath {
    ScheduledPath::new(cells.iter().map(|&c| Cell::from(c)).collect(), start).unwrap()
}

fn occupancy(a: RobotId, b: RobotId) -> Conflict {
    Conflict::from_collisions(vec![Collision::new(ConflictKind::Occupancy, Cell::new(1, 1), 1, a, b)])
}

fn contender(robot_id: RobotId, priority: Option<u32>, commit_tick: Option<u64>) -> Contender {
    Contender {
        robot_id,
        pinned: false,
        priority,
        commit_tick,
    }
}

#[cfg(test)]
mod reservation_tests {
    use super::*;

    #[test]
    fn test_empty_path_rejected() {
        assert!(ScheduledPath::new(vec![], 0).is_err());
    }

    #[test]
    fn test_commit_reserves_every_step_and_the_rest_cell() {
        let mut table = ReservationTable::new();
        let reservation = table.commit(A, &path(&[(0, 0), (1, 0), (2, 0)], 0)).unwrap();

        assert_eq!(reservation.keys, vec![(Cell::new(0, 0), 0), (Cell::new(1, 0), 1)]);
        assert_eq!(reservation.rest, (Cell::new(2, 0), 2));
        assert_eq!(table.occupant(Cell::new(0, 0), 0), Some(A));
        assert_eq!(table.occupant(Cell::new(1, 0), 1), Some(A));
        assert_eq!(table.occupant(Cell::new(2, 0), 2), Some(A));
        assert_eq!(table.occupant(Cell::new(2, 0), 500), Some(A));
        assert_eq!(table.occupant(Cell::new(0, 0), 1), None);
        assert_eq!(table.occupant(Cell::new(2, 0), 1), None);
        assert!(table.contains(A));
    }

    #[test]
    fn test_rejected_commit_changes_nothing() {
        let mut table = ReservationTable::new();
        table.commit(A, &path(&[(0, 0), (1, 0), (2, 0)], 0)).unwrap();
        table.hold(B, Cell::new(2, 2)).unwrap();
        let before = table.len();

        // B would reach (2, 0) on the same tick as A.
        let conflict = table.commit(B, &path(&[(2, 2), (2, 1), (2, 0)], 0)).unwrap_err();

        assert_eq!(conflict.robots, vec![A, B]);
        assert!(conflict.collisions.iter().all(|c| c.holder == Some(A)));
        assert_eq!(table.len(), before);
        assert_eq!(table.occupant(Cell::new(2, 2), 10), Some(B));
        assert_eq!(table.occupant(Cell::new(2, 1), 1), None);
        assert!(table.find_double_booking().is_none());
    }

    #[test]
    fn test_swap_is_rejected() {
        let mut table = ReservationTable::new();
        table.commit(A, &path(&[(0, 0), (1, 0)], 0)).unwrap();

        let conflict = table.commit(B, &path(&[(1, 0), (0, 0)], 0)).unwrap_err();
        assert!(conflict.has_swap());
        let swap = conflict.first().unwrap();
        assert_eq!(swap.kind, ConflictKind::Swap);
        assert_eq!(swap.tick, 1);
        assert_eq!(swap.holder, Some(A));
    }

    #[test]
    fn test_following_one_tick_behind_is_allowed() {
        let mut table = ReservationTable::new();
        table.commit(A, &path(&[(1, 0), (2, 0), (3, 0)], 0)).unwrap();
        table.commit(B, &path(&[(0, 0), (0, 0), (1, 0), (2, 0)], 0)).unwrap();
        assert_eq!(table.occupant(Cell::new(1, 0), 2), Some(B));
        assert_eq!(table.occupant(Cell::new(2, 0), 1), Some(A));
        assert!(table.find_double_booking().is_none());
    }

    #[test]
    fn test_recommit_replaces_own_reservations() {
        let mut table = ReservationTable::new();
        table.hold(A, Cell::new(0, 0)).unwrap();
        table.commit(A, &path(&[(0, 0), (0, 1)], 0)).unwrap();
        assert_eq!(table.resting_robot(Cell::new(0, 0)), None);
        assert_eq!(table.resting_robot(Cell::new(0, 1)), Some(A));
        assert_eq!(table.reserved_cells(A).into_iter().collect::<Vec<_>>(), vec![Cell::new(0, 0), Cell::new(0, 1)]);
    }

    #[test]
    fn test_release_frees_everything() {
        let mut table = ReservationTable::new();
        table.commit(A, &path(&[(0, 0), (1, 0), (2, 0)], 0)).unwrap();
        assert!(table.release(A));
        assert!(!table.release(A));
        assert!(table.is_empty());
        assert_eq!(table.holder_of(Cell::new(2, 0)), None);

        table.commit(B, &path(&[(2, 0), (1, 0), (0, 0)], 0)).unwrap();
        assert_eq!(table.holder_of(Cell::new(0, 0)), Some(B));
    }

    #[test]
    fn test_advance_tick_prunes_the_past() {
        let mut table = ReservationTable::new();
        table.commit(A, &path(&[(0, 0), (1, 0), (2, 0)], 0)).unwrap();
        assert_eq!(table.len(), 3);

        table.advance_tick();
        assert_eq!(table.current_tick(), 1);
        assert_eq!(table.len(), 2);
        assert_eq!(table.occupant(Cell::new(0, 0), 0), None);

        table.advance_tick();
        assert_eq!(table.len(), 1);
        assert_eq!(table.holder_of(Cell::new(1, 0)), None);
        assert_eq!(table.holder_of(Cell::new(2, 0)), Some(A));
        assert_eq!(table.held_cells().into_iter().collect::<Vec<_>>(), vec![Cell::new(2, 0)]);
    }

    #[test]
    fn test_hold_starts_at_current_tick() {
        let mut table = ReservationTable::starting_at(5);
        let reservation = table.hold(C, Cell::new(3, 3)).unwrap();
        assert!(reservation.keys.is_empty());
        assert_eq!(reservation.rest, (Cell::new(3, 3), 5));
        assert_eq!(table.occupant(Cell::new(3, 3), 4), None);
        assert_eq!(table.occupant(Cell::new(3, 3), 5), Some(C));
        assert!(table.hold(A, Cell::new(3, 3)).is_err());
    }

    #[test]
    fn test_resting_cells_except_skips_the_asker() {
        let mut table = ReservationTable::new();
        table.hold(A, Cell::new(0, 0)).unwrap();
        table.hold(B, Cell::new(1, 1)).unwrap();
        let others: Vec<Cell> = table.resting_cells_except(A).collect();
        assert_eq!(others, vec![Cell::new(1, 1)]);
    }
}

#[cfg(test)]
mod conflict_detector_tests {
    use super::*;

    #[test]
    fn test_proposals_meeting_on_one_cell() {
        let table = ReservationTable::new();
        let proposals = vec![(A, path(&[(0, 1), (1, 1)], 0)), (B, path(&[(2, 1), (1, 1)], 0))];

        let conflicts = ConflictDetector::new(4).detect(&table, &proposals);
        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert_eq!(conflict.robots, vec![A, B]);
        assert_eq!(conflict.earliest_tick(), Some(1));
        let first = conflict.first().unwrap();
        assert_eq!(first.kind, ConflictKind::Occupancy);
        assert_eq!(first.cell, Cell::new(1, 1));
        assert_eq!(first.holder, None);
    }

    #[test]
    fn test_proposals_swapping_cells() {
        let table = ReservationTable::new();
        let proposals = vec![(A, path(&[(0, 0), (1, 0)], 0)), (B, path(&[(1, 0), (0, 0)], 0))];
        let conflicts = ConflictDetector::new(3).detect(&table, &proposals);
        assert_eq!(conflicts.len(), 1);
        assert!(conflicts[0].has_swap());
    }

    #[test]
    fn test_disjoint_proposals_do_not_conflict() {
        let table = ReservationTable::new();
        let proposals = vec![(A, path(&[(0, 0), (1, 0)], 0)), (B, path(&[(0, 2), (1, 2)], 0))];
        assert!(ConflictDetector::new(8).detect(&table, &proposals).is_empty());
    }

    #[test]
    fn test_proposal_against_committed_reservation() {
        let mut table = ReservationTable::new();
        table.commit(A, &path(&[(1, 0), (1, 1), (1, 2)], 0)).unwrap();
        let proposals = vec![(B, path(&[(0, 1), (1, 1), (2, 1)], 0))];

        let conflicts = ConflictDetector::new(4).detect(&table, &proposals);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].robots, vec![A, B]);
        assert!(conflicts[0].collisions.iter().all(|c| c.holder == Some(A)));
    }

    #[test]
    fn test_lookahead_is_bounded_but_commit_is_not() {
        let mut table = ReservationTable::new();
        table.hold(B, Cell::new(4, 0)).unwrap();
        let long = path(&[(0, 0), (1, 0), (2, 0), (3, 0), (4, 0)], 0);

        assert!(ConflictDetector::new(2).detect(&table, &[(A, long.clone())]).is_empty());
        assert_eq!(ConflictDetector::new(4).detect(&table, &[(A, long.clone())]).len(), 1);
        assert!(table.commit(A, &long).is_err());
    }

    #[test]
    fn test_conflicts_split_per_pair() {
        let table = ReservationTable::new();
        let proposals = vec![
            (A, path(&[(0, 1), (1, 1)], 0)),
            (B, path(&[(2, 1), (1, 1)], 0)),
            (C, path(&[(1, 0), (1, 1)], 0)),
        ];
        let conflicts = ConflictDetector::new(2).detect(&table, &proposals);
        let pairs: Vec<Vec<RobotId>> = conflicts.iter().map(|c| c.robots.clone()).collect();
        assert_eq!(pairs, vec![vec![A, B], vec![A, C], vec![B, C]]);
    }
}

#[cfg(test)]
mod negotiation_tests {
    use super::*;

    #[test]
    fn test_higher_priority_proceeds() {
        let mut resolver = NegotiationResolver::new(2);
        let resolution = resolver.resolve(
            0,
            &occupancy(A, B),
            &[contender(A, Some(1), None), contender(B, Some(3), None)],
        );
        assert_eq!(resolution.winner(), Some(B));
        assert_eq!(resolution.decisions, vec![(B, Decision::Proceed), (A, Decision::Wait(1))]);
    }

    #[test]
    fn test_ties_break_on_commit_time_then_id() {
        let earlier = contender(B, Some(1), Some(3));
        let later = contender(A, Some(1), Some(7));
        assert!(earlier.outranks(&later));

        let never_committed = contender(A, Some(1), None);
        assert!(later.outranks(&never_committed));

        assert!(contender(A, Some(1), None).outranks(&contender(B, Some(1), None)));
        assert!(contender(A, Some(0), None).outranks(&contender(B, None, None)));
    }

    #[test]
    fn test_higher_priority_latecomer_outranks_committed_robot() {
        let committed = contender(B, None, Some(0));
        let latecomer = contender(A, Some(10), None);
        assert!(latecomer.outranks(&committed));

        let mut resolver = NegotiationResolver::new(2);
        let resolution = resolver.resolve(1, &occupancy(A, B), &[committed, latecomer]);
        assert_eq!(resolution.decisions, vec![(A, Decision::Proceed), (B, Decision::Wait(1))]);
    }

    #[test]
    fn test_commit_first_order_keeps_committed_robot_ahead() {
        let committed = contender(B, None, Some(0));
        let latecomer = contender(A, Some(10), None);
        assert_eq!(committed.rank_by(&latecomer, RankOrder::CommitFirst), Ordering::Less);

        let mut resolver = NegotiationResolver::new(2).with_rank_order(RankOrder::CommitFirst);
        let resolution = resolver.resolve(1, &occupancy(A, B), &[latecomer, committed]);
        assert_eq!(resolution.winner(), Some(B));
        assert_eq!(resolution.decision_for(A), Some(Decision::Wait(1)));
    }

    #[test]
    fn test_pinned_robot_outranks_everyone() {
        let pinned = Contender {
            pinned: true,
            ..contender(B, None, None)
        };
        assert!(pinned.outranks(&contender(A, Some(9), Some(0))));
    }

    #[test]
    fn test_wait_then_replan() {
        let mut resolver = NegotiationResolver::new(2);
        let contenders = [contender(A, Some(2), None), contender(B, Some(1), None)];

        let first = resolver.resolve(0, &occupancy(A, B), &contenders);
        assert_eq!(first.decision_for(B), Some(Decision::Wait(1)));
        assert_eq!(resolver.streak(B, A), 1);
        resolver.end_tick();

        let second = resolver.resolve(1, &occupancy(A, B), &contenders);
        assert_eq!(second.decision_for(B), Some(Decision::Replan));
        assert_eq!(second.decision_for(A), Some(Decision::Proceed));
        resolver.end_tick();

        let third = resolver.resolve(2, &occupancy(A, B), &contenders);
        assert_eq!(third.decision_for(B), Some(Decision::Wait(1)));
    }

    #[test]
    fn test_streak_resets_after_a_quiet_tick() {
        let mut resolver = NegotiationResolver::new(2);
        let contenders = [contender(A, Some(2), None), contender(B, Some(1), None)];

        resolver.resolve(0, &occupancy(A, B), &contenders);
        resolver.end_tick();
        resolver.end_tick();
        assert_eq!(resolver.streak(B, A), 0);

        let again = resolver.resolve(2, &occupancy(A, B), &contenders);
        assert_eq!(again.decision_for(B), Some(Decision::Wait(1)));
    }

    #[test]
    fn test_same_pair_twice_in_one_tick_counts_once() {
        let mut resolver = NegotiationResolver::new(2);
        let contenders = [contender(A, Some(2), None), contender(B, Some(1), None)];

        let first = resolver.resolve(0, &occupancy(A, B), &contenders);
        let repeat = resolver.resolve(0, &occupancy(A, B), &contenders);
        assert_eq!(first.decision_for(B), repeat.decision_for(B));
        assert_eq!(resolver.streak(B, A), 1);
    }

    #[test]
    fn test_swap_forces_replan_immediately() {
        let mut resolver = NegotiationResolver::new(2);
        let swap = Conflict::from_collisions(vec![Collision::new(ConflictKind::Swap, Cell::new(1, 0), 1, A, B)]);
        let resolution = resolver.resolve(0, &swap, &[contender(A, Some(1), None), contender(B, Some(1), None)]);
        assert_eq!(resolution.decision_for(A), Some(Decision::Proceed));
        assert_eq!(resolution.decision_for(B), Some(Decision::Replan));
    }

    #[test]
    fn test_blocking_forces_replan_immediately() {
        let mut resolver = NegotiationResolver::new(2);
        let blocking = Conflict::from_collisions(vec![Collision::against(ConflictKind::Blocking, Cell::new(2, 0), 2, A, B)]);
        let resolution = resolver.resolve(0, &blocking, &[contender(A, Some(1), None), contender(B, None, None)]);
        assert_eq!(resolution.decision_for(A), Some(Decision::Proceed));
        assert_eq!(resolution.decision_for(B), Some(Decision::Replan));
        assert_eq!(resolver.streak(B, A), 0);
    }

    #[test]
    fn test_occupancy_far_ahead_still_waits_one_tick() {
        let mut resolver = NegotiationResolver::new(2);
        let far = Conflict::from_collisions(vec![Collision::new(ConflictKind::Occupancy, Cell::new(6, 0), 7, A, B)]);
        let resolution = resolver.resolve(0, &far, &[contender(A, Some(2), None), contender(B, Some(1), None)]);
        assert_eq!(resolution.decision_for(B), Some(Decision::Wait(1)));
    }

    #[test]
    fn test_forget_drops_streaks() {
        let mut resolver = NegotiationResolver::new(3);
        let contenders = [contender(A, Some(2), None), contender(B, Some(1), None)];
        resolver.resolve(0, &occupancy(A, B), &contenders);
        resolver.forget(A);
        assert_eq!(resolver.streak(B, A), 0);
    }

    #[test]
    fn test_strongest_decision() {
        assert_eq!(Decision::Proceed.strongest(Decision::Wait(1)), Decision::Wait(1));
        assert_eq!(Decision::Replan.strongest(Decision::Wait(1)), Decision::Replan);
        assert_eq!(Decision::Wait(1).strongest(Decision::Proceed), Decision::Wait(1));
    }

    #[test]
    fn test_contenders_outside_the_conflict_are_ignored() {
        let mut resolver = NegotiationResolver::new(2);
        let resolution = resolver.resolve(
            0,
            &occupancy(A, B),
            &[contender(C, Some(9), None), contender(A, Some(1), None), contender(B, Some(1), None)],
        );
        assert_eq!(resolution.decisions.len(), 2);
        assert_eq!(resolution.winner(), Some(A));
    }
}
