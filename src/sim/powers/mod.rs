//! Character powers
//!
//! Each selectable character owns one power. Green pegs grant power turns;
//! a ball fired while turns remain is a power shot, and each power shot
//! spends one turn when it ends. When the counter reaches zero every power
//! flag is cleared.
//!
//! Hooks on [`Power`] run only for the selected character, so a power that
//! is not in play can never touch the board.

mod breaker;
mod lucky;
mod magnet;
mod mirror;
mod quill;
mod rocket;
mod roulette;

pub use breaker::BreakerPower;
pub use lucky::LuckyPower;
pub use magnet::MagnetPower;
pub use mirror::MirrorPower;
pub use quill::QuillPower;
pub use rocket::{RocketPower, refuel_amount};
pub use roulette::{RouletteOutcome, RoulettePower};

use serde::{Deserialize, Serialize};

use super::schedule::ScheduledEvent;
use super::state::{GameEvent, HitSource, PegColor, SimContext};
use super::tick::TickInput;

/// Selectable character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Character {
    #[default]
    Lucky,
    Roulette,
    Quill,
    Rocket,
    Mirror,
    Magnetic,
    Breaker,
}

impl Character {
    pub const ALL: [Character; 7] = [
        Character::Lucky,
        Character::Roulette,
        Character::Quill,
        Character::Rocket,
        Character::Mirror,
        Character::Magnetic,
        Character::Breaker,
    ];

    /// Power turns granted per green peg
    pub fn turns_per_green(self) -> u32 {
        match self {
            Character::Lucky => 3,
            Character::Roulette | Character::Quill | Character::Breaker => 1,
            Character::Rocket | Character::Mirror | Character::Magnetic => 2,
        }
    }

    /// Whether hitting the purple peg moves the purple role immediately
    pub fn reassigns_purple_on_hit(self) -> bool {
        self == Character::Lucky
    }

    pub fn name(self) -> &'static str {
        match self {
            Character::Lucky => "Lucky",
            Character::Roulette => "Roulette",
            Character::Quill => "Quill",
            Character::Rocket => "Rocket",
            Character::Mirror => "Mirror",
            Character::Magnetic => "Magnetic",
            Character::Breaker => "Breaker",
        }
    }
}

/// A fresh peg hit, as seen by the powers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PegHit {
    pub peg: u32,
    pub color: PegColor,
    pub source: HitSource,
    /// Ball that struck it directly, if any
    pub ball: Option<u32>,
    /// First time this peg was struck during the current shot
    pub new_in_shot: bool,
}

/// Power status shown on the HUD
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerHud {
    pub roulette_display: Option<RouletteOutcome>,
    pub roulette_spinning: bool,
    pub queued_outcomes: usize,
    pub paddle_secs_left: Option<f32>,
    pub paddle_x: Option<f32>,
    pub magnetism_active: bool,
    /// Some power flag is set
    pub engaged: bool,
}

/// Behaviour of one character's power
pub trait Power {
    fn character(&self) -> Character;

    /// A green peg was struck; returns the turns to grant
    fn on_green_hit(&mut self, cx: &mut SimContext, ball: Option<u32>) -> u32;

    /// A power-shot ball was just fired
    fn on_shot_fired(&mut self, _cx: &mut SimContext, _ball: u32) {}

    fn on_peg_hit(&mut self, _cx: &mut SimContext, _hit: &PegHit) {}

    /// Runs every tick before the physics step
    fn update(&mut self, _cx: &mut SimContext, _input: &TickInput) {}

    /// The last ball of a shot retired (before turns are spent)
    fn on_shot_end(&mut self, _cx: &mut SimContext) {}

    fn on_scheduled(&mut self, _cx: &mut SimContext, _event: ScheduledEvent) {}

    /// Drop every flag and any board objects the power owns
    fn clear(&mut self, cx: &mut SimContext);

    /// Some flag is set
    fn is_engaged(&self) -> bool;

    fn pad_active(&self) -> bool {
        false
    }

    fn hud(&self, _now: u64) -> PowerHud {
        PowerHud {
            engaged: self.is_engaged(),
            ..Default::default()
        }
    }
}

/// The selected character's power plus the shared turn bookkeeping
#[derive(Debug, Clone)]
pub enum PowerSystem {
    Lucky(LuckyPower),
    Roulette(RoulettePower),
    Quill(QuillPower),
    Rocket(RocketPower),
    Mirror(MirrorPower),
    Magnetic(MagnetPower),
    Breaker(BreakerPower),
}

impl PowerSystem {
    pub fn new(character: Character) -> Self {
        match character {
            Character::Lucky => PowerSystem::Lucky(LuckyPower::default()),
            Character::Roulette => PowerSystem::Roulette(RoulettePower::default()),
            Character::Quill => PowerSystem::Quill(QuillPower::default()),
            Character::Rocket => PowerSystem::Rocket(RocketPower::default()),
            Character::Mirror => PowerSystem::Mirror(MirrorPower::default()),
            Character::Magnetic => PowerSystem::Magnetic(MagnetPower::default()),
            Character::Breaker => PowerSystem::Breaker(BreakerPower::default()),
        }
    }

    fn power(&self) -> &dyn Power {
        match self {
            PowerSystem::Lucky(p) => p,
            PowerSystem::Roulette(p) => p,
            PowerSystem::Quill(p) => p,
            PowerSystem::Rocket(p) => p,
            PowerSystem::Mirror(p) => p,
            PowerSystem::Magnetic(p) => p,
            PowerSystem::Breaker(p) => p,
        }
    }

    fn power_mut(&mut self) -> &mut dyn Power {
        match self {
            PowerSystem::Lucky(p) => p,
            PowerSystem::Roulette(p) => p,
            PowerSystem::Quill(p) => p,
            PowerSystem::Rocket(p) => p,
            PowerSystem::Mirror(p) => p,
            PowerSystem::Magnetic(p) => p,
            PowerSystem::Breaker(p) => p,
        }
    }

    pub fn character(&self) -> Character {
        self.power().character()
    }

    pub fn green_hit(&mut self, cx: &mut SimContext, ball: Option<u32>) {
        let granted = self.power_mut().on_green_hit(cx, ball);
        if granted > 0 {
            cx.state.power_turns += granted;
            let turns = cx.state.power_turns;
            cx.state.push_event(GameEvent::PowerTurns { turns });
            log::info!(
                "{} power: +{granted} turn(s), {turns} remaining",
                self.character().name()
            );
        }
    }

    /// Run the fire hook if `ball` is a power shot
    pub fn shot_fired(&mut self, cx: &mut SimContext, ball: u32) {
        if cx.state.ball(ball).is_some_and(|b| b.power_shot) {
            self.power_mut().on_shot_fired(cx, ball);
        }
    }

    pub fn peg_hit(&mut self, cx: &mut SimContext, hit: &PegHit) {
        self.power_mut().on_peg_hit(cx, hit);
    }

    pub fn update(&mut self, cx: &mut SimContext, input: &TickInput) {
        self.power_mut().update(cx, input);
    }

    pub fn scheduled(&mut self, cx: &mut SimContext, event: ScheduledEvent) {
        self.power_mut().on_scheduled(cx, event);
    }

    /// Shot-end hook, then spend a turn for a power shot. Reaching zero
    /// turns clears every flag.
    pub fn shot_ended(&mut self, cx: &mut SimContext, was_power_shot: bool) {
        self.power_mut().on_shot_end(cx);
        if was_power_shot && cx.state.power_turns > 0 {
            cx.state.power_turns -= 1;
            let turns = cx.state.power_turns;
            cx.state.push_event(GameEvent::PowerTurns { turns });
        }
        if cx.state.power_turns == 0 && self.power().is_engaged() {
            log::debug!("{} power: out of turns, clearing", self.character().name());
            self.power_mut().clear(cx);
        }
    }

    pub fn clear(&mut self, cx: &mut SimContext) {
        self.power_mut().clear(cx);
    }

    pub fn is_engaged(&self) -> bool {
        self.power().is_engaged()
    }

    pub fn pad_active(&self) -> bool {
        self.power().pad_active()
    }

    pub fn hud(&self, now: u64) -> PowerHud {
        self.power().hud(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turns_per_green() {
        let turns: Vec<u32> = Character::ALL.iter().map(|c| c.turns_per_green()).collect();
        assert_eq!(turns, vec![3, 1, 1, 2, 2, 2, 1]);
    }

    #[test]
    fn test_only_lucky_reassigns_purple() {
        for character in Character::ALL {
            assert_eq!(
                character.reassigns_purple_on_hit(),
                character == Character::Lucky
            );
        }
    }

    #[test]
    fn test_system_reports_character() {
        for character in Character::ALL {
            let powers = PowerSystem::new(character);
            assert_eq!(powers.character(), character);
            assert!(!powers.is_engaged());
            assert!(!powers.pad_active());
        }
    }
}
