//! Pegfall headless runner
//!
//! Loads settings and a level, then plays a fixed sequence of shots through
//! the frame driver and logs what happened. Usage:
//!
//! ```text
//! pegfall [settings.json]
//! ```

use std::fs;

use pegfall::Settings;
use pegfall::audio::NullAudio;
use pegfall::consts::*;
use pegfall::sim::{FrameDriver, Game, GameEvent, GamePhase, Level, RapierWorld};

/// Shot angles cycled by the runner (radians from straight down)
const SHOT_ANGLES: [f32; 8] = [0.0, 0.35, -0.5, 0.8, -0.15, 0.6, -0.9, 0.25];
/// Give up after this many simulated seconds
const RUN_LIMIT_SECS: f32 = 30.0 * 60.0;

fn load_level(settings: &Settings) -> Level {
    let Some(path) = &settings.level_path else {
        return Level::demo();
    };
    let parsed = fs::read_to_string(path)
        .map_err(|err| err.to_string())
        .and_then(|json| Level::from_json(&json).map_err(|err| err.to_string()));
    match parsed {
        Ok(level) => level,
        Err(err) => {
            log::error!("could not load {}: {err}; using the demo board", path.display());
            Level::demo()
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Pegfall (headless) starting...");

    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::load_or_default(path),
        None => Settings::default(),
    };
    let level = load_level(&settings);
    let adaptive = settings.adaptive_frame_skip;

    let mut game = Game::new(settings, RapierWorld::default(), NullAudio);
    if let Err(err) = game.load_level(level) {
        log::error!("nothing to play: {err}");
        return;
    }

    let mut driver = FrameDriver::new(adaptive);
    let mut shots = 0usize;
    let limit = (RUN_LIMIT_SECS * TICK_RATE as f32) as u64;
    while game.state.time_ticks < limit {
        match game.state.phase {
            GamePhase::Aiming => {
                driver.fire(SHOT_ANGLES[shots % SHOT_ANGLES.len()]);
                shots += 1;
            }
            GamePhase::InFlight => {}
            _ => break,
        }
        let report = driver.advance(&mut game, 1.0 / TICK_RATE as f32);
        for event in report.events {
            match event {
                GameEvent::ShotEnded { shot, score } => {
                    log::info!("shot {shot}: {score} points");
                }
                GameEvent::FreeBalls { count } => log::info!("+{count} free ball(s)"),
                _ => log::trace!("{event:?}"),
            }
        }
    }

    let hud = game.snapshot().hud;
    log::info!(
        "finished in {:?} after {shots} shot(s): score {}, {} orange left, {} ball(s) left",
        game.state.phase,
        hud.score,
        hud.orange_remaining,
        hud.balls_remaining
    );
    log::info!("peg removal order: {:?}", game.state.removal_log);
}
