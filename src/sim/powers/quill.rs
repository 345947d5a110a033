//! Quill: spike volleys from the next power shot

use super::{Character, Power};
use crate::consts::*;
use crate::secs_to_ticks;
use crate::sim::lifecycle::update_quill_volleys;
use crate::sim::state::{BallVariant, SimContext};
use crate::sim::tick::TickInput;

#[derive(Debug, Clone, Default)]
pub struct QuillPower {
    /// One charge per green, spent by the next power shot
    charges: u32,
}

impl Power for QuillPower {
    fn character(&self) -> Character {
        Character::Quill
    }

    fn on_green_hit(&mut self, _cx: &mut SimContext, _ball: Option<u32>) -> u32 {
        self.charges += 1;
        Character::Quill.turns_per_green()
    }

    fn on_shot_fired(&mut self, cx: &mut SimContext, ball: u32) {
        if self.charges == 0 {
            return;
        }
        self.charges -= 1;
        let next_volley = cx.now() + secs_to_ticks(QUILL_VOLLEY_INTERVAL);
        if let Some(ball) = cx.state.ball_mut(ball) {
            ball.variant = BallVariant::Quill {
                volleys_left: QUILL_VOLLEYS,
                next_volley,
            };
        }
    }

    fn update(&mut self, cx: &mut SimContext, _input: &TickInput) {
        update_quill_volleys(cx);
    }

    fn clear(&mut self, _cx: &mut SimContext) {
        self.charges = 0;
    }

    fn is_engaged(&self) -> bool {
        self.charges > 0
    }
}
