//! Pegfall - simulation core for a peg-clearing pinball game
//!
//! Core modules:
//! - `sim`: Deterministic simulation (contacts, scoring, powers, frame driver)
//! - `audio`: Fire-and-forget audio contract
//! - `settings`: Persisted configuration
//! - `error`: Error types shared across the crate

pub mod audio;
pub mod error;
pub mod settings;
pub mod sim;

pub use error::{CollisionError, LevelError, SettingsError};
pub use settings::Settings;

use glam::Vec2;

/// Game configuration constants
pub mod consts {
    /// Logical simulation rate
    pub const TICK_RATE: u32 = 60;
    /// Fixed simulation timestep, rounded to 6 decimals so every platform feeds
    /// the physics step the same value
    pub const SIM_DT: f32 = 0.016667;
    /// Maximum physics substeps per logical step
    pub const MAX_SUBSTEPS: u32 = 3;
    /// Maximum logical ticks run for one rendered frame (spiral-of-death guard)
    pub const MAX_TICKS_PER_FRAME: u32 = 5;
    /// Longest real frame the driver accepts; anything longer is clamped
    pub const MAX_FRAME_TIME: f32 = 0.25;
    /// Frames averaged by the adaptive frame-rate monitor
    pub const FPS_WINDOW: usize = 30;
    /// Below this average, render every second frame
    pub const FPS_SKIP_ONE: f32 = 45.0;
    /// Below this average, render every third frame
    pub const FPS_SKIP_TWO: f32 = 25.0;
    /// Decimal places kept for published positions and velocities
    pub const VALUE_DECIMALS: i32 = 3;

    /// Board: x in [-BOARD_HALF_WIDTH, BOARD_HALF_WIDTH], y in [0, BOARD_HEIGHT], y up
    pub const BOARD_HALF_WIDTH: f32 = 400.0;
    pub const BOARD_HEIGHT: f32 = 600.0;
    /// Balls below this height are out of bounds
    pub const OUT_OF_BOUNDS_Y: f32 = -40.0;
    pub const GRAVITY: f32 = 600.0;
    pub const WALL_THICKNESS: f32 = 20.0;
    pub const WALL_RESTITUTION: f32 = 0.9;

    /// Launcher
    pub const LAUNCH_X: f32 = 0.0;
    pub const LAUNCH_Y: f32 = 570.0;
    pub const LAUNCH_SPEED: f32 = 500.0;
    /// Aim is measured from straight down; clamp keeps shots in the lower hemisphere
    pub const MAX_AIM_ANGLE: f32 = 1.45;

    /// Ball defaults
    pub const BALL_RADIUS: f32 = 8.0;
    pub const BALL_MASS: f32 = 1.0;
    /// Low so the surface (peg, wall) decides the bounce
    pub const BALL_RESTITUTION: f32 = 0.5;
    /// Rebound ceiling applied after every resolved peg/wall/bucket-wall contact
    pub const MAX_REBOUND_SPEED: f32 = 700.0;
    /// Hard cap on a single ball's life before it is forcibly retired
    pub const MAX_BALL_LIFETIME: f32 = 60.0;

    /// Peg geometry
    pub const PEG_RADIUS: f32 = 11.0;
    pub const SMALL_PEG_RADIUS: f32 = 7.0;
    pub const BRICK_HALF_LENGTH: f32 = 20.0;
    pub const BRICK_HALF_THICKNESS: f32 = 7.0;
    pub const SMALL_BRICK_HALF_LENGTH: f32 = 12.0;
    pub const SMALL_BRICK_HALF_THICKNESS: f32 = 5.0;
    pub const PEG_RESTITUTION: f32 = 0.75;
    pub const SUPER_BOUNCE_RESTITUTION: f32 = 1.05;

    /// Scoring
    pub const BLUE_PEG_POINTS: u64 = 10;
    pub const ORANGE_PEG_POINTS: u64 = 100;
    pub const GREEN_PEG_POINTS: u64 = 10;
    pub const PURPLE_PEG_POINTS: u64 = 2_000;
    pub const PURPLE_SHOT_MULTIPLIER: f64 = 1.25;
    pub const FREE_BALL_THRESHOLD: u64 = 10_000;
    pub const GREEN_PEGS_PER_LEVEL: usize = 2;
    pub const DEFAULT_STARTING_BALLS: u32 = 10;

    /// Bucket
    pub const BUCKET_Y: f32 = 14.0;
    pub const BUCKET_HALF_WIDTH: f32 = 40.0;
    pub const BUCKET_RIM_RADIUS: f32 = 6.0;
    pub const BUCKET_SPEED: f32 = 150.0;
    pub const BUCKET_MAX_X: f32 = 340.0;

    /// Stuck-ball heuristics
    pub const STUCK_CHECK_INTERVAL: f32 = 0.5;
    pub const STUCK_PATTERN_GAP: f32 = 0.2;
    pub const STUCK_PATTERN_TRIPS: u32 = 2;
    pub const STUCK_IDLE_SPEED: f32 = 25.0;
    pub const STUCK_IDLE_DURATION: f32 = 2.0;
    pub const STUCK_NO_NEW_PEG_DURATION: f32 = 4.0;
    /// Distinct pegs a ball must strike before it can be judged stuck
    pub const STUCK_MIN_HITS: u32 = 2;
    pub const STUCK_REMOVAL_INTERVAL: f32 = 0.25;
    pub const PAD_STUCK_FACTOR: f32 = 0.25;

    /// Lucky bounce
    pub const LUCKY_HIT_INTERVAL: usize = 3;
    pub const LUCKY_BOUNCE_FACTOR: f32 = 0.75;

    /// Roulette
    pub const ROULETTE_STEP: f32 = 0.1;
    pub const ROULETTE_STEPS: u32 = 15;

    /// Quill spikes
    pub const QUILL_VOLLEYS: u32 = 3;
    pub const QUILL_VOLLEY_INTERVAL: f32 = 0.4;
    pub const QUILL_SPIKES_PER_VOLLEY: u32 = 4;
    pub const SPIKE_SPEED: f32 = 600.0;
    pub const SPIKE_RADIUS: f32 = 3.0;
    pub const SPIKE_LIFETIME: f32 = 1.0;

    /// Rocket
    pub const ROCKET_MAX_FUEL: f32 = 100.0;
    pub const ROCKET_BURN_RATE: f32 = 40.0;
    pub const ROCKET_THRUST: f32 = 900.0;
    pub const ROCKET_RESTORE_BASE: f32 = 30.0;
    pub const ROCKET_RESTORE_DECAY: f32 = 0.5;
    pub const ROCKET_RESTORE_FLOOR: f32 = 10.0;

    /// Magnetism
    pub const MAGNET_RADIUS: f32 = 120.0;
    pub const MAGNET_STRENGTH: f32 = 500.0;

    /// Breaker paddle
    pub const PADDLE_DURATION: f32 = 8.0;
    pub const PADDLE_EXTENSION: f32 = 5.0;
    pub const PADDLE_Y: f32 = 60.0;
    pub const PADDLE_HALF_WIDTH: f32 = 50.0;
    pub const PADDLE_HALF_HEIGHT: f32 = 6.0;
    pub const PADDLE_SPEED: f32 = 400.0;
    pub const PAD_BOUNCE_SPEED: f32 = 450.0;

    /// Bombs
    pub const BOMB_FUSE: f32 = 0.4;
    pub const BOMB_RADIUS: f32 = 90.0;
    pub const BOMB_BODY_RADIUS: f32 = 9.0;
    pub const BOMB_IMPULSE: f32 = 300.0;
}

/// Round a scalar to `decimals` places
#[inline]
pub fn round_to(value: f32, decimals: i32) -> f32 {
    let scale = 10f32.powi(decimals);
    (value * scale).round() / scale
}

/// Round both components of a vector to the published precision
#[inline]
pub fn round_vec(v: Vec2) -> Vec2 {
    Vec2::new(
        round_to(v.x, consts::VALUE_DECIMALS),
        round_to(v.y, consts::VALUE_DECIMALS),
    )
}

/// Convert seconds to whole simulation ticks
#[inline]
pub fn secs_to_ticks(secs: f32) -> u64 {
    (secs * consts::TICK_RATE as f32).round().max(0.0) as u64
}

/// Convert simulation ticks to seconds
#[inline]
pub fn ticks_to_secs(ticks: u64) -> f32 {
    ticks as f32 / consts::TICK_RATE as f32
}

/// Direction of a shot aimed `angle` radians away from straight down (positive toward +x)
#[inline]
pub fn aim_direction(angle: f32) -> Vec2 {
    let angle = angle.clamp(-consts::MAX_AIM_ANGLE, consts::MAX_AIM_ANGLE);
    Vec2::new(angle.sin(), -angle.cos())
}

/// Scale a velocity down to `max_speed` (never up)
#[inline]
pub fn clamp_speed(v: Vec2, max_speed: f32) -> Vec2 {
    let speed = v.length();
    if speed > max_speed && speed > 0.0 {
        v * (max_speed / speed)
    } else {
        v
    }
}
