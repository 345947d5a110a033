//! Magnetic: special pegs pull power-shot balls
//!
//! A green hit only arms the effect. Magnets attach to the unhit special pegs
//! once the current shot has fully ended, so they are in place before the
//! next ball is fired.

use super::{Character, Power, PowerHud};
use crate::consts::*;
use crate::sim::lifecycle::set_ball_velocity;
use crate::sim::state::{Magnet, PegColor, SimContext};
use crate::sim::tick::TickInput;

#[derive(Debug, Clone, Default)]
pub struct MagnetPower {
    armed: bool,
    active: bool,
}

impl MagnetPower {
    pub fn is_active(&self) -> bool {
        self.active
    }

    fn attach(cx: &mut SimContext) -> usize {
        let mut attached = 0;
        for peg in &mut cx.state.pegs {
            if peg.is_fresh() && peg.color != PegColor::Blue {
                peg.magnet = Some(Magnet {
                    radius: MAGNET_RADIUS,
                    strength: MAGNET_STRENGTH,
                });
                attached += 1;
            }
        }
        attached
    }
}

impl Power for MagnetPower {
    fn character(&self) -> Character {
        Character::Magnetic
    }

    fn on_green_hit(&mut self, _cx: &mut SimContext, _ball: Option<u32>) -> u32 {
        self.armed = true;
        Character::Magnetic.turns_per_green()
    }

    fn on_shot_end(&mut self, cx: &mut SimContext) {
        if !self.armed || cx.state.shot.magnetism_activated {
            return;
        }
        let attached = Self::attach(cx);
        self.armed = false;
        self.active = true;
        cx.state.shot.magnetism_activated = true;
        log::info!("magnetism active on {attached} peg(s)");
    }

    fn update(&mut self, cx: &mut SimContext, _input: &TickInput) {
        if !self.active {
            return;
        }
        let magnets: Vec<_> = cx
            .state
            .pegs
            .iter()
            .filter(|p| p.is_fresh())
            .filter_map(|p| p.magnet.map(|m| (p.pos, m)))
            .collect();
        let pulls: Vec<_> = cx
            .state
            .balls
            .iter()
            .filter(|b| b.power_shot)
            .filter_map(|ball| {
                let mut dv = glam::Vec2::ZERO;
                for (pos, magnet) in &magnets {
                    let offset = *pos - ball.pos;
                    let dist = offset.length();
                    if dist > 1.0 && dist < magnet.radius {
                        let falloff = 1.0 - dist / magnet.radius;
                        dv += offset / dist * magnet.strength * falloff * SIM_DT;
                    }
                }
                (dv != glam::Vec2::ZERO).then_some((ball.id, ball.vel + dv))
            })
            .collect();
        for (ball_id, vel) in pulls {
            set_ball_velocity(cx, ball_id, vel);
        }
    }

    fn clear(&mut self, cx: &mut SimContext) {
        for peg in &mut cx.state.pegs {
            peg.magnet = None;
        }
        self.armed = false;
        self.active = false;
    }

    fn is_engaged(&self) -> bool {
        self.armed || self.active
    }

    fn hud(&self, _now: u64) -> PowerHud {
        PowerHud {
            magnetism_active: self.active,
            engaged: self.is_engaged(),
            ..Default::default()
        }
    }
}
