//! Mirror: a ghost ball shadows each power shot across the centre line

use super::{Character, Power};
use crate::sim::lifecycle::{spawn_ghost, sync_ghosts};
use crate::sim::state::SimContext;
use crate::sim::tick::TickInput;

#[derive(Debug, Clone, Default)]
pub struct MirrorPower {
    armed: bool,
}

impl Power for MirrorPower {
    fn character(&self) -> Character {
        Character::Mirror
    }

    fn on_green_hit(&mut self, _cx: &mut SimContext, _ball: Option<u32>) -> u32 {
        self.armed = true;
        Character::Mirror.turns_per_green()
    }

    fn on_shot_fired(&mut self, cx: &mut SimContext, ball: u32) {
        if self.armed {
            if let Some(ghost) = spawn_ghost(cx, ball) {
                log::debug!("ghost {ghost} mirrors ball {ball}");
            }
        }
    }

    fn update(&mut self, cx: &mut SimContext, _input: &TickInput) {
        sync_ghosts(cx);
    }

    fn clear(&mut self, _cx: &mut SimContext) {
        self.armed = false;
    }

    fn is_engaged(&self) -> bool {
        self.armed
    }
}
