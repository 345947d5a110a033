//! Breaker: a temporary paddle above the bucket
//!
//! While the paddle is up, every peg hit is cleared on the spot and balls
//! that reach the paddle are relaunched upward. A green hit while it is
//! already up extends it instead of granting a turn.

use glam::Vec2;

use super::{Character, Power, PowerHud};
use crate::consts::*;
use crate::sim::physics::{BodyDesc, BodyHandle, Material, Shape};
use crate::sim::state::{EntityRef, SimContext};
use crate::sim::tick::TickInput;
use crate::{round_to, secs_to_ticks, ticks_to_secs};

#[derive(Debug, Clone, Copy)]
struct Paddle {
    body: BodyHandle,
    x: f32,
    expires: u64,
}

#[derive(Debug, Clone, Default)]
pub struct BreakerPower {
    paddle: Option<Paddle>,
}

impl BreakerPower {
    /// Raise the paddle, or extend it if already up
    fn activate(&mut self, cx: &mut SimContext) {
        if let Some(paddle) = &mut self.paddle {
            paddle.expires += secs_to_ticks(PADDLE_EXTENSION);
            log::debug!("paddle extended to tick {}", paddle.expires);
            return;
        }
        let body = cx.world.create_rigid_body(
            BodyDesc::kinematic(Shape::Box {
                half_extents: Vec2::new(PADDLE_HALF_WIDTH, PADDLE_HALF_HEIGHT),
                angle: 0.0,
            })
            .at(Vec2::new(0.0, PADDLE_Y))
            .material(Material {
                restitution: WALL_RESTITUTION,
            }),
        );
        cx.state.register(body, EntityRef::Paddle);
        self.paddle = Some(Paddle {
            body,
            x: 0.0,
            expires: cx.now() + secs_to_ticks(PADDLE_DURATION),
        });
        log::info!("paddle up");
    }

    fn lower(&mut self, cx: &mut SimContext) {
        if let Some(paddle) = self.paddle.take() {
            cx.world.remove_body(paddle.body);
            cx.state.unregister(paddle.body);
            log::info!("paddle down");
        }
    }

    /// Ticks until the paddle drops
    pub fn remaining_ticks(&self, now: u64) -> Option<u64> {
        self.paddle.map(|p| p.expires.saturating_sub(now))
    }
}

impl Power for BreakerPower {
    fn character(&self) -> Character {
        Character::Breaker
    }

    fn on_green_hit(&mut self, cx: &mut SimContext, _ball: Option<u32>) -> u32 {
        let was_active = self.paddle.is_some();
        self.activate(cx);
        if was_active {
            0
        } else {
            Character::Breaker.turns_per_green()
        }
    }

    fn on_shot_fired(&mut self, cx: &mut SimContext, _ball: u32) {
        if self.paddle.is_none() {
            self.activate(cx);
        }
    }

    fn update(&mut self, cx: &mut SimContext, input: &TickInput) {
        let Some(mut paddle) = self.paddle else {
            return;
        };
        if cx.now() >= paddle.expires {
            self.lower(cx);
            return;
        }

        if let Some(pos) = cx.world.position(paddle.body) {
            paddle.x = round_to(pos.x, VALUE_DECIMALS);
            cx.world.set_position(paddle.body, Vec2::new(paddle.x, PADDLE_Y));
        }
        // Follow the pointer, else the lowest ball
        let target = input
            .paddle_x
            .or_else(|| {
                cx.state
                    .balls
                    .iter()
                    .min_by(|a, b| a.pos.y.total_cmp(&b.pos.y))
                    .map(|b| b.pos.x)
            })
            .unwrap_or(paddle.x);
        let limit = BOARD_HALF_WIDTH - PADDLE_HALF_WIDTH;
        let target = target.clamp(-limit, limit);
        let vx = ((target - paddle.x) / SIM_DT).clamp(-PADDLE_SPEED, PADDLE_SPEED);
        cx.world
            .set_velocity(paddle.body, Vec2::new(round_to(vx, VALUE_DECIMALS), 0.0));
        self.paddle = Some(paddle);
    }

    fn clear(&mut self, cx: &mut SimContext) {
        self.lower(cx);
    }

    fn is_engaged(&self) -> bool {
        self.paddle.is_some()
    }

    fn pad_active(&self) -> bool {
        self.paddle.is_some()
    }

    fn hud(&self, now: u64) -> PowerHud {
        PowerHud {
            paddle_secs_left: self.remaining_ticks(now).map(ticks_to_secs),
            paddle_x: self.paddle.map(|p| p.x),
            engaged: self.is_engaged(),
            ..Default::default()
        }
    }
}
