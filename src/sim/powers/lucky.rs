//! Lucky: scripted bounces and a bonus purple

use glam::Vec2;

use super::{Character, PegHit, Power};
use crate::consts::*;
use crate::sim::lifecycle::set_ball_velocity;
use crate::sim::state::{PegColor, SimContext};

#[derive(Debug, Clone, Default)]
pub struct LuckyPower {
    bonus_peg: Option<u32>,
}

impl LuckyPower {
    pub fn bonus_peg(&self) -> Option<u32> {
        self.bonus_peg
    }

    /// Turn a random fresh blue peg into a temporary purple
    fn spawn_bonus(cx: &mut SimContext) -> Option<u32> {
        let candidates: Vec<u32> = cx
            .state
            .pegs
            .iter()
            .filter(|p| p.color == PegColor::Blue && p.is_fresh() && p.can_be_special())
            .map(|p| p.id)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let pick = candidates[cx.state.rng.random_int(0, candidates.len() as i32) as usize];
        let peg = cx.state.peg_mut(pick)?;
        peg.color = PegColor::Purple;
        peg.bonus = true;
        log::debug!("lucky bonus purple on peg {pick}");
        Some(pick)
    }

    fn revert_bonus(&mut self, cx: &mut SimContext) {
        let Some(id) = self.bonus_peg.take() else {
            return;
        };
        if let Some(peg) = cx.state.peg_mut(id) {
            if peg.is_fresh() {
                peg.color = PegColor::Blue;
                peg.bonus = false;
            }
        }
    }
}

impl Power for LuckyPower {
    fn character(&self) -> Character {
        Character::Lucky
    }

    fn on_green_hit(&mut self, _cx: &mut SimContext, _ball: Option<u32>) -> u32 {
        Character::Lucky.turns_per_green()
    }

    fn on_peg_hit(&mut self, cx: &mut SimContext, hit: &PegHit) {
        let Some(ball_id) = hit.ball else {
            return;
        };
        if !hit.new_in_shot || cx.state.shot.pegs_hit.len() % LUCKY_HIT_INTERVAL != 0 {
            return;
        }
        let Some(vel) = cx
            .state
            .ball(ball_id)
            .filter(|b| b.power_shot)
            .map(|b| b.vel)
        else {
            return;
        };

        // Always upward, keeping the horizontal heading
        let speed = cx.state.shot.launch_speed * LUCKY_BOUNCE_FACTOR;
        let dir = Vec2::new(vel.x, vel.y.abs()).normalize_or(Vec2::Y);
        set_ball_velocity(cx, ball_id, dir * speed);
        log::debug!("lucky bounce for ball {ball_id}");

        if self.bonus_peg.is_none() {
            self.bonus_peg = Self::spawn_bonus(cx);
        }
    }

    fn on_shot_end(&mut self, cx: &mut SimContext) {
        self.revert_bonus(cx);
    }

    fn clear(&mut self, cx: &mut SimContext) {
        self.revert_bonus(cx);
    }

    fn is_engaged(&self) -> bool {
        self.bonus_peg.is_some()
    }
}
