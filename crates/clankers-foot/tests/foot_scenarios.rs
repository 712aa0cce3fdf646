//! Integration test: drive foot modules through full walking sequences.
//!
//! Each scenario feeds scripted tick inputs and checks the regime the
//! module lands in, the commands it emits and the side effects on the
//! contact state:
//! 1. A stance foot pivoting off a ledge is held and cropped, and a polygon
//!    reset restores it
//! 2. A step runs swing, heel touchdown and flat support in order
//! 3. Toe-off drives the toe calculator every tick and clears it on exit
//! 4. Foothold exploration returns to flat support on its own
//! 5. Waypoint motion can be stopped and handed back to support

use approx::assert_relative_eq;
use clankers_core::config::FootControlConfig;
use clankers_core::types::{ConstraintType, FootWaypoint, RobotSide};
use clankers_foot::{FeetManager, FootControlModule};
use clankers_test_utils::{
    footstep_at, sole_at, test_config, FixedToeCalculator, RecordingToeCalculator, TickInputBuilder,
    ToeCall,
};
use nalgebra::{Point2, Point3, UnitQuaternion, Vector3};

const LEFT: RobotSide = RobotSide::Left;
const RIGHT: RobotSide = RobotSide::Right;

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn ticks_for(config: &FootControlConfig, seconds: f64) -> usize {
    (seconds / config.dt()).ceil() as usize
}

#[test]
fn pivoting_stance_foot_is_held_then_cropped_then_restored() {
    let config = test_config();
    let mut foot = FootControlModule::new(LEFT, config).unwrap();
    let mut pivoting = TickInputBuilder::standing(LEFT, 0.0, 0.1, Point2::new(0.1, 0.0))
        .with_angular_velocity(Vector3::new(0.0, 2.0, 0.0))
        .build();
    pivoting.desired_cop = Some(Point2::new(0.14, 0.0));

    foot.tick(&pivoting);
    assert_eq!(foot.current_constraint_type(), ConstraintType::HoldPosition);

    let mut cropped_after = None;
    for k in 1..=10 {
        foot.tick(&pivoting);
        if foot.contact_state().number_in_contact() < 4 {
            cropped_after = Some(k);
            break;
        }
    }
    assert!(cropped_after.is_some(), "foothold was never cropped");
    assert_eq!(foot.contact_state().number_in_contact(), 2);
    assert_eq!(foot.foothold_detector().shrink_count(), 1);
    assert!(foot.contact_state().is_cropped(0));
    assert!(foot.contact_state().is_cropped(1));

    // Back on solid ground with the full weight.
    let settled = TickInputBuilder::standing(LEFT, 0.0, 1.0, Point2::new(-0.04, 0.0)).build();
    foot.reset_foot_polygon();
    foot.tick(&settled);
    assert_eq!(foot.contact_state().number_in_contact(), 4);
    assert_eq!(foot.foothold_detector().shrink_count(), 0);

    foot.tick(&settled);
    assert_eq!(foot.current_constraint_type(), ConstraintType::Full);
}

#[test]
fn step_runs_swing_touchdown_and_flat_support() {
    let config = test_config();
    let mut feet = FeetManager::new(&config).unwrap();
    let right = TickInputBuilder::standing(RIGHT, 0.0, 1.0, Point2::new(0.04, 0.0)).build();
    let left_start = TickInputBuilder::standing(LEFT, 0.0, 0.5, Point2::new(0.04, 0.0)).build();
    feet.tick(&left_start, &right);

    let duration = 0.6;
    feet.request_swing(LEFT, footstep_at(LEFT, 0.3), duration).unwrap();
    let airborne = TickInputBuilder::airborne(sole_at(LEFT, 0.0)).build();
    feet.tick(&airborne, &right);
    assert_eq!(feet.foot(LEFT).current_constraint_type(), ConstraintType::Swing);
    assert!(feet.acceleration_command(LEFT).is_none());

    let mut peak: f64 = 0.0;
    for _ in 0..ticks_for(&config, duration) {
        feet.tick(&airborne, &right);
        peak = peak.max(feet.foot(LEFT).swing_state().desired_sole_position().z);
    }
    let landed = feet.foot(LEFT).swing_state().desired_sole_position();
    assert_relative_eq!(landed, Point3::new(0.3, 0.1, 0.0), epsilon = 1e-6);
    assert!(peak > 0.05, "swing never lifted, peak {peak}");

    // Heel strike.
    let heel_down = TickInputBuilder::standing(LEFT, 0.3, 0.1, Point2::new(-0.07, 0.0))
        .pitched(-0.2)
        .build();
    feet.request_touchdown(LEFT, ConstraintType::HeelTouchdown);
    feet.tick(&heel_down, &right);
    assert_eq!(feet.foot(LEFT).current_constraint_type(), ConstraintType::HeelTouchdown);
    assert!(feet.foot(LEFT).is_in_edge_touchdown_state());
    let rolling = feet.feedback_command(LEFT).unwrap().desired_angular_velocity.y;
    assert!(rolling > 0.0, "heel touchdown should roll toes down, got {rolling}");

    for _ in 0..ticks_for(&config, config.touchdown.duration) {
        feet.tick(&heel_down, &right);
    }
    let flat = feet.feedback_command(LEFT).unwrap().desired_pose.rotation;
    assert_relative_eq!(flat.angle(), 0.0, epsilon = 1e-9);

    // Weight comes onto the foot, then the caller declares it flat.
    let loaded = TickInputBuilder::standing(LEFT, 0.3, 0.5, Point2::new(0.04, 0.0)).build();
    feet.tick(&loaded, &right);
    feet.set_flat_foot_contact_state(LEFT, None);
    feet.tick(&loaded, &right);
    assert_eq!(feet.foot(LEFT).current_constraint_type(), ConstraintType::Full);
    assert!(feet.is_in_double_support());
    assert_eq!(feet.foot(LEFT).transition_count(), 3);
    assert_eq!(feet.foot(RIGHT).transition_count(), 0);
}

#[test]
fn toe_off_drives_calculator_and_clears_on_exit() {
    let config = test_config();
    let (calculator, log) = RecordingToeCalculator::new(FixedToeCalculator::at_front_edge(0.16, 0.055));
    let mut foot = FootControlModule::with_toe_calculator(LEFT, config, Box::new(calculator)).unwrap();
    let stance = TickInputBuilder::standing(LEFT, 0.0, 0.5, Point2::new(0.1, 0.0)).build();
    foot.tick(&stance);
    assert!(log.calls().is_empty());

    foot.set_toe_off_desired_cmp(Some(Point2::new(0.2, 0.0)));
    foot.request_state(ConstraintType::Toes);
    let on_toes = TickInputBuilder::standing(LEFT, 0.0, 0.5, Point2::new(0.15, 0.0))
        .raised(0.02)
        .pitched(0.15)
        .build();
    for _ in 0..5 {
        foot.tick(&on_toes);
    }
    assert_eq!(foot.current_constraint_type(), ConstraintType::Toes);
    assert_eq!(
        log.count(|c| *c == ToeCall::ComputeLine(Some(Point2::new(0.2, 0.0)))),
        5
    );
    assert!(foot
        .contact_state()
        .points()
        .iter()
        .all(|p| (p.x - 0.16).abs() < 1e-12));

    // Switch to a single toe point mid toe-off.
    foot.set_use_toe_point_contact(true);
    foot.tick(&on_toes);
    assert_eq!(log.count(|c| matches!(c, ToeCall::ComputePoint(_))), 1);
    assert!(foot
        .contact_state()
        .points()
        .iter()
        .all(|p| *p == Point2::new(0.16, 0.0)));

    log.clear();
    foot.set_contact_state(ConstraintType::Full, None);
    foot.tick(&stance);
    assert_eq!(foot.current_constraint_type(), ConstraintType::Full);
    assert_eq!(log.calls().first(), Some(&ToeCall::Clear));
    // Flat support restores the nominal points.
    assert_relative_eq!(foot.contact_state().points()[2].x, -0.08);
}

#[test]
fn exploration_returns_to_full_support() {
    let config = test_config();
    let total = config.exploration.recover_time + 4.0 * config.exploration.time_per_corner();
    let mut foot = FootControlModule::new(RIGHT, config.clone()).unwrap();
    let stance = TickInputBuilder::standing(RIGHT, 0.0, 0.5, Point2::new(0.04, 0.0)).build();
    foot.tick(&stance);

    foot.initialize_foot_exploration();
    foot.tick(&stance);
    assert_eq!(foot.current_constraint_type(), ConstraintType::ExplorePolygon);
    assert!(foot.cop_command().is_some());
    assert!(foot.feedback_command().is_none());

    let mut visited = Vec::new();
    for _ in 0..ticks_for(&config, total) + 2 {
        foot.tick(&stance);
        if let Some(corner) = foot.states().exploration.current_corner() {
            if visited.last() != Some(&corner) {
                visited.push(corner);
            }
        }
    }
    assert_eq!(visited, vec![0, 1, 2, 3]);
    assert_eq!(foot.current_constraint_type(), ConstraintType::Full);
    assert!(foot.cop_command().is_none());
}

#[test]
fn waypoint_motion_stops_and_returns_to_support() {
    let config = test_config();
    let mut foot = FootControlModule::new(LEFT, config).unwrap();
    let start = sole_at(LEFT, 0.0);
    let stance = TickInputBuilder::standing(LEFT, 0.0, 0.5, Point2::new(0.04, 0.0)).build();
    foot.tick(&stance);

    let level = UnitQuaternion::identity();
    let waypoints = vec![
        FootWaypoint::at_rest(0.3, Point3::new(0.0, 0.1, 0.1), level),
        FootWaypoint::at_rest(0.6, Point3::new(0.1, 0.1, 0.1), level),
    ];
    foot.handle_foot_trajectory(waypoints).unwrap();
    let lifted = TickInputBuilder::airborne(start).build();
    foot.tick(&lifted);
    assert_eq!(foot.current_constraint_type(), ConstraintType::MoveViaWaypoints);

    for _ in 0..75 {
        foot.tick(&lifted);
    }
    let mid = foot.states().waypoints.desired().position();
    assert!(mid.z > 0.05);
    assert!(!foot.states().waypoints.is_done());

    foot.request_stop_trajectory();
    foot.tick(&lifted);
    let frozen = foot.states().waypoints.desired().position();
    for _ in 0..10 {
        foot.tick(&lifted);
    }
    assert!(foot.states().waypoints.is_stopped());
    assert_relative_eq!(foot.states().waypoints.desired().position(), frozen, epsilon = 1e-12);

    foot.set_contact_state(ConstraintType::Full, None);
    foot.tick(&stance);
    assert_eq!(foot.current_constraint_type(), ConstraintType::HoldPosition);
    foot.tick(&stance);
    assert_eq!(foot.current_constraint_type(), ConstraintType::Full);
}
