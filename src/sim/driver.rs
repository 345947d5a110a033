//! Deterministic frame driver
//!
//! Converts variable real frame times into whole fixed ticks. The physics
//! step always receives `SIM_DT`; real-time jitter only changes how many
//! ticks run in a frame and, in adaptive mode, how often a frame is rendered.

use std::collections::VecDeque;

use glam::Vec2;

use super::physics::PhysicsWorld;
use super::snapshot::RenderSnapshot;
use super::state::GameEvent;
use super::tick::{Game, TickInput};
use crate::audio::AudioSink;
use crate::consts::*;

/// Rolling average of recent real frame times
#[derive(Debug, Clone)]
pub struct FrameRateMonitor {
    samples: VecDeque<f32>,
    window: usize,
}

impl Default for FrameRateMonitor {
    fn default() -> Self {
        Self::new(FPS_WINDOW)
    }
}

impl FrameRateMonitor {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            samples: VecDeque::with_capacity(window),
            window,
        }
    }

    pub fn record(&mut self, frame_secs: f32) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(frame_secs);
    }

    /// Average frames per second over the window, once there is any elapsed time
    pub fn average_fps(&self) -> Option<f32> {
        let total: f32 = self.samples.iter().sum();
        (total > 0.0).then(|| self.samples.len() as f32 / total)
    }

    /// Render every Nth frame. Stays at 1 until the window has filled.
    pub fn render_interval(&self) -> u32 {
        if self.samples.len() < self.window {
            return 1;
        }
        match self.average_fps() {
            Some(fps) if fps < FPS_SKIP_TWO => 3,
            Some(fps) if fps < FPS_SKIP_ONE => 2,
            _ => 1,
        }
    }
}

/// Outcome of one driver frame
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub ticks: u32,
    pub rendered: bool,
    pub average_fps: Option<f32>,
    pub render_interval: u32,
    /// Present only on rendered frames
    pub snapshot: Option<RenderSnapshot>,
    pub events: Vec<GameEvent>,
}

/// Fixed-step accumulator plus the host's pending input
#[derive(Debug, Clone)]
pub struct FrameDriver {
    accumulator: f32,
    input: TickInput,
    monitor: FrameRateMonitor,
    adaptive: bool,
    frames: u64,
}

impl FrameDriver {
    pub fn new(adaptive: bool) -> Self {
        Self {
            accumulator: 0.0,
            input: TickInput::default(),
            monitor: FrameRateMonitor::default(),
            adaptive,
            frames: 0,
        }
    }

    /// Queue a shot; it goes out on the next tick that runs
    pub fn fire(&mut self, angle: f32) {
        self.input.fire = Some(angle);
    }

    pub fn request_restart(&mut self) {
        self.input.restart = true;
    }

    pub fn set_thrust(&mut self, thrust: Option<Vec2>) {
        self.input.thrust = thrust;
    }

    pub fn set_paddle_x(&mut self, x: Option<f32>) {
        self.input.paddle_x = x;
    }

    pub fn set_adaptive(&mut self, adaptive: bool) {
        self.adaptive = adaptive;
    }

    /// Run however many ticks `real_dt` covers, then decide whether this
    /// frame is rendered
    pub fn advance<W: PhysicsWorld, A: AudioSink>(
        &mut self,
        game: &mut Game<W, A>,
        real_dt: f32,
    ) -> FrameReport {
        let real_dt = if real_dt.is_finite() {
            real_dt.clamp(0.0, MAX_FRAME_TIME)
        } else {
            log::warn!("non-finite frame time ignored");
            0.0
        };
        self.monitor.record(real_dt);
        self.accumulator += real_dt;

        let mut ticks = 0;
        while self.accumulator + 1e-6 >= SIM_DT && ticks < MAX_TICKS_PER_FRAME {
            self.accumulator -= SIM_DT;
            ticks += 1;
        }
        if self.accumulator >= SIM_DT {
            log::debug!(
                "dropping {:.3}s of simulation backlog",
                self.accumulator
            );
            self.accumulator = 0.0;
        }
        self.accumulator = self.accumulator.max(0.0);

        if ticks > 0 {
            game.frame(&self.input, ticks);
            self.input = self.input.held();
        }

        self.frames += 1;
        let render_interval = if self.adaptive {
            self.monitor.render_interval()
        } else {
            1
        };
        let rendered = self.frames % render_interval as u64 == 0;
        FrameReport {
            ticks,
            rendered,
            average_fps: self.monitor.average_fps(),
            render_interval,
            snapshot: rendered.then(|| game.snapshot()),
            events: game.take_events(),
        }
    }
}
