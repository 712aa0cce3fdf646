//! Clankers foot controller CLI.
//!
//! Drives both foot modules with a kinematic stand-in for the robot: every
//! measured sole pose is the pose the controller asked for on the previous
//! tick. Provides three modes:
//! - `walk`: scripted steps through swing, heel touchdown and toe-off
//! - `explore`: foothold exploration on one stance foot
//! - `config`: print the effective configuration as TOML

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use nalgebra::{Isometry3, Point2, Point3, Translation3, UnitQuaternion, Vector2, Vector3};
use tracing_subscriber::EnvFilter;

use clankers_foot::prelude::*;

/// Lateral distance of each sole from the pelvis centre line.
const HALF_STANCE_WIDTH: f64 = 0.1;
/// Nominal CoM height over flat ground.
const COM_HEIGHT: f64 = 0.9;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Per-foot contact constraint controller for bipedal walking.
#[derive(Parser, Debug)]
#[command(name = "clankers", version, about)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// TOML configuration file. Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Walk forward in scripted steps.
    Walk {
        /// Number of steps.
        #[arg(short = 'n', long, default_value_t = 4)]
        steps: u32,

        /// Forward distance per step (m).
        #[arg(short, long, default_value_t = 0.3)]
        length: f64,

        /// Swing duration (s).
        #[arg(short, long, default_value_t = 0.6)]
        swing: f64,

        /// Double support duration (s).
        #[arg(short, long, default_value_t = 0.2)]
        transfer: f64,
    },

    /// Probe the foothold under one foot.
    Explore {
        #[arg(long, value_enum, default_value_t = Side::Left)]
        side: Side,

        /// Walk the CoP along a spiral instead of the corners.
        #[arg(long)]
        spiral: bool,
    },

    /// Print the effective configuration.
    Config,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Side {
    Left,
    Right,
}

impl From<Side> for RobotSide {
    fn from(side: Side) -> Self {
        match side {
            Side::Left => Self::Left,
            Side::Right => Self::Right,
        }
    }
}

// ---------------------------------------------------------------------------
// Kinematic stand-in
// ---------------------------------------------------------------------------

/// Measured state of one foot, updated from the controller's own commands.
#[derive(Debug, Clone)]
struct SimulatedFoot {
    side: RobotSide,
    pose: Isometry3<f64>,
    load_fraction: f64,
}

impl SimulatedFoot {
    fn new(side: RobotSide, x: f64) -> Self {
        Self {
            side,
            pose: Isometry3::translation(x, side.sign() * HALF_STANCE_WIDTH, 0.0),
            load_fraction: 0.5,
        }
    }

    fn input(&self) -> FootTickInput {
        let loaded = self.load_fraction > 0.0;
        let cop = Point2::new(0.04, 0.0);
        let hip = self.pose.translation.vector + Vector3::new(0.0, -self.side.sign() * 0.02, COM_HEIGHT - 0.05);
        FootTickInput {
            sole_pose: self.pose,
            measured_cop: loaded.then_some(cop),
            desired_cop: loaded.then_some(cop),
            load_fraction: self.load_fraction,
            leg: LegKinematics {
                hip_pitch_position: Point3::from(hip),
                ankle_position: self.pose * Point3::new(0.0, 0.0, 0.08),
                ..LegKinematics::default()
            },
            ..FootTickInput::default()
        }
    }

    /// Track the swing trajectory exactly.
    fn follow_swing(&mut self, module: &FootControlModule) {
        let swing = module.swing_state();
        let position = swing.desired_sole_position();
        self.pose = Isometry3::from_parts(Translation3::from(position.coords), swing.desired().pose.rotation);
    }

    /// Track the commanded orientation about the commanded contact point.
    fn follow_pivot(&mut self, module: &FootControlModule) {
        let Some(feedback) = module.feedback_command() else {
            return;
        };
        let pivot = feedback.desired_pose.translation.vector;
        let rotation = feedback.desired_pose.rotation;
        let offset = feedback.control_point_offset;
        self.pose = Isometry3::from_parts(Translation3::from(pivot - rotation * offset), rotation);
    }

    fn flatten(&mut self) {
        let (_, _, yaw) = self.pose.rotation.euler_angles();
        let mut translation = self.pose.translation;
        translation.vector.z = 0.0;
        self.pose = Isometry3::from_parts(translation, UnitQuaternion::from_euler_angles(0.0, 0.0, yaw));
    }

    fn x(&self) -> f64 {
        self.pose.translation.vector.x
    }
}

struct Walker {
    feet: FeetManager,
    sim: [SimulatedFoot; 2],
    dt: f64,
    com: ComHeightData,
}

impl Walker {
    fn new(config: &FootControlConfig) -> anyhow::Result<Self> {
        Ok(Self {
            feet: FeetManager::new(config)?,
            sim: [
                SimulatedFoot::new(RobotSide::Left, 0.0),
                SimulatedFoot::new(RobotSide::Right, 0.0),
            ],
            dt: config.dt(),
            com: ComHeightData::new(COM_HEIGHT, 0.0, 0.0),
        })
    }

    fn sim(&mut self, side: RobotSide) -> &mut SimulatedFoot {
        &mut self.sim[side.index()]
    }

    fn tick(&mut self) {
        let left = self.sim[RobotSide::Left.index()].input();
        let right = self.sim[RobotSide::Right.index()].input();
        self.feet.tick(&left, &right);

        let mut data = ComHeightData::new(COM_HEIGHT, 0.0, 0.0);
        self.feet
            .correct_com_height(&Vector2::new(0.3, 0.0), COM_HEIGHT, &mut data);
        self.com = data;
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn ticks(&self, seconds: f64) -> usize {
        (seconds / self.dt).ceil() as usize
    }

    fn step(&mut self, swing_side: RobotSide, length: f64, swing: f64, transfer: f64) -> anyhow::Result<()> {
        let stance_side = swing_side.opposite();

        // Double support, then push off the trailing foot if it helps.
        self.sim(swing_side).load_fraction = 0.5;
        self.sim(stance_side).load_fraction = 0.5;
        for _ in 0..self.ticks(transfer) {
            self.tick();
        }
        let leading_x = self.sim[stance_side.index()].x();
        let ahead = Point2::new(leading_x + 0.12, 0.0);
        let signals = ToeOffSignals {
            exit_cmp: Some(Point2::new(leading_x + 0.1, 0.0)),
            desired_ecmp: ahead,
            desired_cop: ahead,
            desired_icp: ahead,
            current_icp: ahead,
        };
        if self.feet.do_toe_off_if_possible(swing_side, None, &signals) {
            for _ in 0..self.ticks(0.1) {
                self.tick();
                if self.feet.foot(swing_side).current_constraint_type() == ConstraintType::Toes {
                    let pitch = self.sim[swing_side.index()].pose.rotation.euler_angles().1 + 2.0 * self.dt;
                    let foot = &mut self.sim[swing_side.index()];
                    let (roll, _, yaw) = foot.pose.rotation.euler_angles();
                    foot.pose.rotation = UnitQuaternion::from_euler_angles(roll, pitch, yaw);
                }
            }
        }

        // Swing.
        let target_x = self.sim[swing_side.index()].x() + length;
        let target = Isometry3::translation(target_x, swing_side.sign() * HALF_STANCE_WIDTH, 0.0);
        self.feet
            .request_swing(swing_side, Footstep::new(swing_side, target), swing)
            .with_context(|| format!("{swing_side} swing rejected"))?;
        self.sim(swing_side).load_fraction = 0.0;
        self.sim(stance_side).load_fraction = 1.0;
        let mut apex: f64 = 0.0;
        for _ in 0..=self.ticks(swing) {
            self.tick();
            let module = self.feet.foot(swing_side);
            self.sim[swing_side.index()].follow_swing(module);
            apex = apex.max(self.sim[swing_side.index()].pose.translation.vector.z);
        }
        tracing::info!(side = %swing_side, apex, x = target_x, "swing finished");

        // Heel strike and roll down.
        let heel_angle = self.feet.foot(swing_side).config().touchdown.heel_touchdown_angle;
        let foot = self.sim(swing_side);
        foot.pose = Isometry3::from_parts(
            target.translation,
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), heel_angle),
        );
        foot.load_fraction = 0.1;
        self.feet.request_touchdown(swing_side, ConstraintType::HeelTouchdown);
        let duration = self.feet.foot(swing_side).config().touchdown.duration;
        for _ in 0..=self.ticks(duration) {
            self.tick();
            let module = self.feet.foot(swing_side);
            self.sim[swing_side.index()].follow_pivot(module);
        }

        let foot = self.sim(swing_side);
        foot.flatten();
        foot.load_fraction = 0.5;
        self.tick();
        self.feet.set_flat_foot_contact_state(swing_side, None);
        self.tick();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mode implementations
// ---------------------------------------------------------------------------

fn run_walk(config: &FootControlConfig, steps: u32, length: f64, swing: f64, transfer: f64) -> anyhow::Result<()> {
    let mut walker = Walker::new(config)?;
    walker.tick();

    let mut swing_side = RobotSide::Left;
    for step in 0..steps {
        walker.step(swing_side, length, swing, transfer)?;
        println!(
            "step {}: {swing_side} landed at x={:.3}, left={}, right={}",
            step + 1,
            walker.sim[swing_side.index()].x(),
            walker.feet.foot(RobotSide::Left).current_constraint_type(),
            walker.feet.foot(RobotSide::Right).current_constraint_type(),
        );
        swing_side = swing_side.opposite();
    }

    println!();
    for side in [RobotSide::Left, RobotSide::Right] {
        let foot = walker.feet.foot(side);
        println!(
            "{side}: transitions={}, time={:.3}s, leg length={:.3}",
            foot.transition_count(),
            foot.clock().now().secs_f64(),
            foot.avoidance().current_leg_length(),
        );
    }
    println!("CoM height after corrections: {:.4}", walker.com.height);
    Ok(())
}

fn run_explore(mut config: FootControlConfig, side: RobotSide, spiral: bool) -> anyhow::Result<()> {
    config.exploration.use_spiral = spiral;
    let dt = config.dt();
    let mut foot = FootControlModule::new(side, config)?;
    let stance = SimulatedFoot::new(side, 0.0);
    foot.tick(&stance.input());
    foot.initialize_foot_exploration();

    let mut ticks = 0_u32;
    loop {
        foot.tick(&stance.input());
        ticks += 1;
        if let Some(cop) = foot.cop_command() {
            tracing::debug!(x = cop.desired_cop.x, y = cop.desired_cop.y, "desired CoP");
        }
        if foot.current_constraint_type() == ConstraintType::Full && ticks > 1 {
            break;
        }
        if ticks > 100_000 {
            anyhow::bail!("exploration did not finish");
        }
    }
    println!(
        "{side}: exploration finished after {:.3}s, polygon vertices={}",
        f64::from(ticks) * dt,
        foot.support_polygon().len()
    );
    Ok(())
}

fn run_config(config: &FootControlConfig) -> anyhow::Result<()> {
    let text = toml::to_string_pretty(config).context("serializing configuration")?;
    println!("{text}");
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<FootControlConfig> {
    match path {
        Some(path) => FootControlConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(FootControlConfig::default()),
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let result = load_config(cli.config.as_ref()).and_then(|config| match cli.command {
        Some(Commands::Walk {
            steps,
            length,
            swing,
            transfer,
        }) => run_walk(&config, steps, length, swing, transfer),
        Some(Commands::Explore { side, spiral }) => run_explore(config, side.into(), spiral),
        Some(Commands::Config) => run_config(&config),
        // Default: a short walk
        None => run_walk(&config, 4, 0.3, 0.6, 0.2),
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
