//! Rocket: steerable thrust with a fuel tank
//!
//! Fuel burns only while thrust is held. Orange hits by a rocket ball top the
//! tank up by a decaying amount.

use super::{Character, PegHit, Power};
use crate::audio::SoundHandle;
use crate::audio::SoundEffect;
use crate::consts::*;
use crate::round_to;
use crate::sim::lifecycle::set_ball_velocity;
use crate::sim::state::{BallVariant, PegColor, SimContext};
use crate::sim::tick::TickInput;

/// Fuel restored by the `n`th orange refuel (0-based)
pub fn refuel_amount(n: u32) -> f32 {
    let decayed = ROCKET_RESTORE_BASE * ROCKET_RESTORE_DECAY.powi(n.min(64) as i32);
    decayed.max(ROCKET_RESTORE_FLOOR)
}

#[derive(Debug, Clone, Default)]
pub struct RocketPower {
    armed: bool,
    thrust_sound: Option<SoundHandle>,
}

impl RocketPower {
    fn stop_thrust_sound(&mut self, cx: &mut SimContext) {
        if let Some(handle) = self.thrust_sound.take() {
            cx.audio.stop(handle);
        }
    }
}

impl Power for RocketPower {
    fn character(&self) -> Character {
        Character::Rocket
    }

    fn on_green_hit(&mut self, _cx: &mut SimContext, _ball: Option<u32>) -> u32 {
        self.armed = true;
        Character::Rocket.turns_per_green()
    }

    fn on_shot_fired(&mut self, cx: &mut SimContext, ball: u32) {
        if !self.armed {
            return;
        }
        if let Some(ball) = cx.state.ball_mut(ball) {
            ball.variant = BallVariant::Rocket {
                fuel: ROCKET_MAX_FUEL,
                refuels: 0,
            };
        }
    }

    fn on_peg_hit(&mut self, cx: &mut SimContext, hit: &PegHit) {
        if hit.color != PegColor::Orange {
            return;
        }
        let Some(ball) = hit.ball.and_then(|id| cx.state.ball_mut(id)) else {
            return;
        };
        if let BallVariant::Rocket { fuel, refuels } = &mut ball.variant {
            let restored = refuel_amount(*refuels);
            *fuel = round_to((*fuel + restored).min(ROCKET_MAX_FUEL), VALUE_DECIMALS);
            *refuels += 1;
            log::debug!("rocket ball {} refuelled by {restored}", ball.id);
        }
    }

    fn update(&mut self, cx: &mut SimContext, input: &TickInput) {
        let mut burns = Vec::new();
        if let Some(dir) = input.thrust {
            let push = dir.normalize_or_zero() * ROCKET_THRUST * SIM_DT;
            for ball in &mut cx.state.balls {
                if let BallVariant::Rocket { fuel, .. } = &mut ball.variant {
                    if *fuel > 0.0 {
                        *fuel = round_to((*fuel - ROCKET_BURN_RATE * SIM_DT).max(0.0), VALUE_DECIMALS);
                        burns.push((ball.id, ball.vel + push));
                    }
                }
            }
        }

        let burning = !burns.is_empty();
        for (ball_id, vel) in burns {
            set_ball_velocity(cx, ball_id, vel);
        }
        if burning && self.thrust_sound.is_none() {
            self.thrust_sound = cx.play_loop(SoundEffect::RocketThrust);
        } else if !burning {
            self.stop_thrust_sound(cx);
        }
    }

    fn clear(&mut self, cx: &mut SimContext) {
        self.armed = false;
        self.stop_thrust_sound(cx);
    }

    fn is_engaged(&self) -> bool {
        self.armed
    }
}
