//! Read-only view handed to the renderer once per rendered frame
//!
//! Nothing here feeds back into the simulation. Positions are already
//! rounded by the tick; the snapshot copies them as-is.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::powers::{Character, PowerHud, PowerSystem};
use super::state::{BallVariant, GamePhase, MatchState, PegColor};
use crate::consts::*;

/// What a sprite should be drawn as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpriteKind {
    Peg { color: PegColor, hit: bool },
    Ball { power_shot: bool },
    Ghost,
    Spike,
    Bomb,
    BucketRim,
    Bucket,
    Paddle,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpriteState {
    pub id: u32,
    pub kind: SpriteKind,
    pub pos: Vec2,
    pub rotation: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HudState {
    pub score: u64,
    pub shot_score: u64,
    pub balls_remaining: u32,
    pub orange_multiplier: u32,
    pub effective_multiplier: f64,
    pub power_turns: u32,
    pub orange_remaining: usize,
    pub character: Character,
    /// Fuel of the first rocket ball in play
    pub rocket_fuel: Option<f32>,
    pub power: PowerHud,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSnapshot {
    pub tick: u64,
    pub phase: GamePhase,
    pub sprites: Vec<SpriteState>,
    pub hud: HudState,
}

impl RenderSnapshot {
    pub fn count(&self, matches: impl Fn(&SpriteKind) -> bool) -> usize {
        self.sprites.iter().filter(|s| matches(&s.kind)).count()
    }
}

pub fn build_snapshot(state: &MatchState, powers: &PowerSystem) -> RenderSnapshot {
    let mut sprites = Vec::with_capacity(
        state.pegs.len() + state.balls.len() + state.spikes.len() + state.bombs.len() + 4,
    );

    sprites.extend(state.pegs.iter().filter(|p| !p.removed).map(|peg| SpriteState {
        id: peg.id,
        kind: SpriteKind::Peg {
            color: peg.color,
            hit: peg.hit,
        },
        pos: peg.pos,
        rotation: peg.rotation,
    }));
    sprites.extend(state.balls.iter().map(|ball| SpriteState {
        id: ball.id,
        kind: SpriteKind::Ball {
            power_shot: ball.power_shot,
        },
        pos: ball.pos,
        rotation: 0.0,
    }));
    sprites.extend(state.ghosts.iter().map(|ghost| SpriteState {
        id: ghost.id,
        kind: SpriteKind::Ghost,
        pos: ghost.pos,
        rotation: 0.0,
    }));
    sprites.extend(state.spikes.iter().map(|spike| SpriteState {
        id: spike.id,
        kind: SpriteKind::Spike,
        pos: spike.pos,
        rotation: spike.vel.y.atan2(spike.vel.x),
    }));
    sprites.extend(state.bombs.iter().filter(|b| !b.exploded).map(|bomb| SpriteState {
        id: bomb.id,
        kind: SpriteKind::Bomb,
        pos: bomb.pos,
        rotation: 0.0,
    }));

    let x = state.bucket.x;
    sprites.push(SpriteState {
        id: 0,
        kind: SpriteKind::Bucket,
        pos: Vec2::new(x, BUCKET_Y),
        rotation: 0.0,
    });
    for (slot, offset) in [-BUCKET_HALF_WIDTH, BUCKET_HALF_WIDTH].into_iter().enumerate() {
        sprites.push(SpriteState {
            id: slot as u32,
            kind: SpriteKind::BucketRim,
            pos: Vec2::new(x + offset, BUCKET_Y),
            rotation: 0.0,
        });
    }

    let power = powers.hud(state.time_ticks);
    if let Some(x) = power.paddle_x {
        sprites.push(SpriteState {
            id: 0,
            kind: SpriteKind::Paddle,
            pos: Vec2::new(x, PADDLE_Y),
            rotation: 0.0,
        });
    }

    let rocket_fuel = state.balls.iter().find_map(|ball| match ball.variant {
        BallVariant::Rocket { fuel, .. } => Some(fuel),
        _ => None,
    });

    RenderSnapshot {
        tick: state.time_ticks,
        phase: state.phase,
        sprites,
        hud: HudState {
            score: state.score,
            shot_score: state.shot.score,
            balls_remaining: state.balls_remaining,
            orange_multiplier: state.orange_multiplier,
            effective_multiplier: state.effective_multiplier(),
            power_turns: state.power_turns,
            orange_remaining: state.oranges_remaining(),
            character: powers.character(),
            rocket_fuel,
            power,
        },
    }
}
