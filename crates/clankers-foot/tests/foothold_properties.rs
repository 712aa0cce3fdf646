//! Property tests: the partial-foothold detector only ever shrinks the
//! support polygon, never below the configured minimum, and never more
//! often than allowed.

use clankers_core::config::FootholdConfig;
use clankers_core::types::{ConstraintType, RobotSide};
use clankers_foot::foothold::FootholdMeasurement;
use clankers_foot::{ContactState, PartialFootholdDetector};
use clankers_test_utils::rectangle_foot;
use nalgebra::{Isometry3, Point2, Vector3};
use proptest::prelude::*;

fn held_contact() -> ContactState {
    let mut contact = ContactState::new(&rectangle_foot(0.16, 0.08, 0.055), 0.8);
    contact.apply(ConstraintType::HoldPosition, Vector3::z(), 0.8);
    contact
}

#[derive(Debug, Clone)]
struct Sample {
    omega: Vector3<f64>,
    measured_cop: Point2<f64>,
    desired_cop: Point2<f64>,
}

fn sample() -> impl Strategy<Value = Sample> {
    (
        -4.0f64..4.0,
        -4.0f64..4.0,
        -0.08f64..0.16,
        -0.055f64..0.055,
        -0.08f64..0.16,
        -0.055f64..0.055,
    )
        .prop_map(|(wx, wy, mx, my, dx, dy)| Sample {
            omega: Vector3::new(wx, wy, 0.0),
            measured_cop: Point2::new(mx, my),
            desired_cop: Point2::new(dx, dy),
        })
}

/// Runs of identical samples, so rotations can settle and be verified.
fn run() -> impl Strategy<Value = Vec<(Sample, usize)>> {
    prop::collection::vec((sample(), 1usize..20), 1..12)
}

proptest! {
    #[test]
    fn contact_only_shrinks_and_respects_limits(runs in run()) {
        let config = FootholdConfig::default();
        let mut detector = PartialFootholdDetector::new(RobotSide::Left, config, 0.004);
        let mut contact = held_contact();
        let pose = Isometry3::identity();
        let mut previous = contact.number_in_contact();

        for (sample, repeats) in &runs {
            for _ in 0..*repeats {
                let removed = detector.update(
                    &FootholdMeasurement {
                        sole_pose: &pose,
                        angular_velocity: &sample.omega,
                        measured_cop: sample.measured_cop,
                        desired_cop: sample.desired_cop,
                    },
                    &mut contact,
                );
                let now = contact.number_in_contact();
                prop_assert_eq!(previous - now, removed);
                prop_assert!(now >= config.min_contact_points_after_shrink);
                prop_assert!(detector.shrink_count() <= config.max_shrink_count);
                previous = now;
            }
        }
        prop_assert_eq!(contact.number_cropped(), 4 - contact.number_in_contact());
    }

    #[test]
    fn disabled_detector_leaves_contact_untouched(runs in run()) {
        let config = FootholdConfig {
            use_partial_foothold: false,
            ..FootholdConfig::default()
        };
        let mut detector = PartialFootholdDetector::new(RobotSide::Left, config, 0.004);
        let mut contact = held_contact();
        let pose = Isometry3::identity();

        for (sample, repeats) in &runs {
            for _ in 0..*repeats {
                let removed = detector.update(
                    &FootholdMeasurement {
                        sole_pose: &pose,
                        angular_velocity: &sample.omega,
                        measured_cop: sample.measured_cop,
                        desired_cop: sample.desired_cop,
                    },
                    &mut contact,
                );
                prop_assert_eq!(removed, 0);
            }
        }
        prop_assert_eq!(contact.number_in_contact(), 4);
    }
}
