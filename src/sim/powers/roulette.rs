//! Roulette: spin for a bonus on each green hit
//!
//! A spin is a chain of scheduled steps. Each step shows a random outcome;
//! the last one sticks and is queued for the next power shot. Greens struck
//! mid-spin queue further spins, which replay when the current one ends.

use std::collections::VecDeque;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{Character, Power, PowerHud};
use crate::audio::SoundEffect;
use crate::consts::*;
use crate::sim::lifecycle::{spawn_ball, update_quill_volleys};
use crate::sim::schedule::ScheduledEvent;
use crate::sim::state::{BallVariant, GameEvent, SimContext};
use crate::sim::tick::TickInput;
use crate::{aim_direction, secs_to_ticks};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouletteOutcome {
    /// A second ball fired alongside the shot
    Multiball,
    FreeBall,
    /// One quill volley from the shot's ball
    QuillBurst,
}

impl RouletteOutcome {
    pub const ALL: [RouletteOutcome; 3] = [
        RouletteOutcome::Multiball,
        RouletteOutcome::FreeBall,
        RouletteOutcome::QuillBurst,
    ];
}

#[derive(Debug, Clone, Copy)]
struct Spin {
    step: u32,
    display: RouletteOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct RoulettePower {
    /// Bumped on every new spin and on clear; older step events are ignored
    spin_id: u32,
    spin: Option<Spin>,
    pending_spins: u32,
    outcomes: VecDeque<RouletteOutcome>,
}

impl RoulettePower {
    pub fn is_spinning(&self) -> bool {
        self.spin.is_some()
    }

    pub fn pending_spins(&self) -> u32 {
        self.pending_spins
    }

    pub fn queued(&self) -> impl Iterator<Item = &RouletteOutcome> {
        self.outcomes.iter()
    }

    fn trigger(&mut self, cx: &mut SimContext) {
        if self.spin.is_some() {
            self.pending_spins += 1;
            log::debug!("roulette busy, {} spin(s) pending", self.pending_spins);
            return;
        }
        self.start_spin(cx);
    }

    fn start_spin(&mut self, cx: &mut SimContext) {
        self.spin_id += 1;
        self.spin = Some(Spin {
            step: 0,
            display: RouletteOutcome::ALL[0],
        });
        self.schedule_step(cx);
    }

    fn schedule_step(&self, cx: &mut SimContext) {
        let due = cx.now() + secs_to_ticks(ROULETTE_STEP).max(1);
        cx.state
            .schedule
            .schedule_at(due, ScheduledEvent::RouletteStep { spin: self.spin_id });
    }

    fn step(&mut self, cx: &mut SimContext) {
        let Some(mut spin) = self.spin else {
            return;
        };
        let roll = cx.state.rng.random_int(0, RouletteOutcome::ALL.len() as i32);
        spin.step += 1;
        spin.display = RouletteOutcome::ALL[roll as usize];

        if spin.step < ROULETTE_STEPS {
            self.spin = Some(spin);
            cx.play(SoundEffect::RouletteTick);
            self.schedule_step(cx);
            return;
        }

        self.spin = None;
        if cx.state.power_turns == 0 {
            log::debug!("roulette landed on {:?} with no turns left, discarded", spin.display);
        } else {
            log::info!("roulette landed on {:?}", spin.display);
            self.outcomes.push_back(spin.display);
            cx.play(SoundEffect::RouletteResult);
        }

        if self.pending_spins > 0 {
            self.pending_spins -= 1;
            if cx.state.balls_remaining > 0 {
                self.start_spin(cx);
            } else {
                self.pending_spins = 0;
            }
        }
    }

    fn apply(&mut self, cx: &mut SimContext, ball_id: u32, outcome: RouletteOutcome) {
        match outcome {
            RouletteOutcome::Multiball => {
                let Some(vel) = cx.state.ball(ball_id).map(|b| b.vel) else {
                    return;
                };
                let angle = vel.x.atan2(-vel.y);
                let twin = if angle.abs() > 0.1 { -angle } else { 0.35 };
                let speed = vel.length();
                spawn_ball(
                    cx,
                    Vec2::new(LAUNCH_X, LAUNCH_Y),
                    aim_direction(twin) * speed,
                );
            }
            RouletteOutcome::FreeBall => {
                cx.state.balls_remaining += 1;
                cx.state.push_event(GameEvent::FreeBalls { count: 1 });
                cx.play(SoundEffect::FreeBall);
            }
            RouletteOutcome::QuillBurst => {
                let now = cx.now();
                if let Some(ball) = cx.state.ball_mut(ball_id) {
                    ball.variant = BallVariant::Quill {
                        volleys_left: 1,
                        next_volley: now,
                    };
                }
            }
        }
    }
}

impl Power for RoulettePower {
    fn character(&self) -> Character {
        Character::Roulette
    }

    fn on_green_hit(&mut self, cx: &mut SimContext, _ball: Option<u32>) -> u32 {
        self.trigger(cx);
        Character::Roulette.turns_per_green()
    }

    fn on_shot_fired(&mut self, cx: &mut SimContext, ball: u32) {
        if let Some(outcome) = self.outcomes.pop_front() {
            self.apply(cx, ball, outcome);
        }
    }

    fn update(&mut self, cx: &mut SimContext, _input: &TickInput) {
        update_quill_volleys(cx);
    }

    fn on_scheduled(&mut self, cx: &mut SimContext, event: ScheduledEvent) {
        if let ScheduledEvent::RouletteStep { spin } = event {
            if spin == self.spin_id {
                self.step(cx);
            }
        }
    }

    fn clear(&mut self, _cx: &mut SimContext) {
        self.spin_id += 1;
        self.spin = None;
        self.pending_spins = 0;
        self.outcomes.clear();
    }

    fn is_engaged(&self) -> bool {
        self.spin.is_some() || self.pending_spins > 0 || !self.outcomes.is_empty()
    }

    fn hud(&self, _now: u64) -> PowerHud {
        PowerHud {
            roulette_display: self.spin.map(|s| s.display).or(self.outcomes.front().copied()),
            roulette_spinning: self.spin.is_some(),
            queued_outcomes: self.outcomes.len(),
            engaged: self.is_engaged(),
            ..Default::default()
        }
    }
}
