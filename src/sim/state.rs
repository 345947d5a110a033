//! Match state and core simulation types
//!
//! Everything that decides the outcome of a match lives in [`MatchState`]:
//! pegs, live entities, score counters, the schedule and the seeded generator.
//! Entities are kept in `Vec`s sorted by id so iteration order never depends
//! on hashing.

use std::collections::HashMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::level::{BounceType, PegDescriptor, PegSize, PegType};
use super::lifecycle::StuckTracker;
use super::physics::{BodyHandle, PhysicsWorld};
use super::rng::GameRng;
use super::schedule::Schedule;
use crate::audio::{AudioSink, PlayOptions, SoundEffect, SoundHandle};
use crate::consts::*;

/// Current phase of play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GamePhase {
    /// No level loaded (or the last load failed)
    #[default]
    Inert,
    /// Waiting for the player to fire
    Aiming,
    /// At least one ball is on the board
    InFlight,
    /// Every orange peg has been hit
    LevelCleared,
    /// Out of balls with oranges remaining
    GameOver,
}

/// Colour role of a peg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PegColor {
    #[default]
    Blue,
    Orange,
    Green,
    Purple,
}

impl PegColor {
    pub fn base_points(self) -> u64 {
        match self {
            PegColor::Blue => BLUE_PEG_POINTS,
            PegColor::Orange => ORANGE_PEG_POINTS,
            PegColor::Green => GREEN_PEG_POINTS,
            PegColor::Purple => PURPLE_PEG_POINTS,
        }
    }
}

/// Attraction attached to a peg while magnetism is active
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Magnet {
    pub radius: f32,
    pub strength: f32,
}

/// A peg on the board. `id` doubles as the index into [`MatchState::pegs`];
/// removed pegs keep their slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peg {
    pub id: u32,
    pub pos: Vec2,
    pub peg_type: PegType,
    pub size: PegSize,
    pub rotation: f32,
    pub bounce: BounceType,
    /// Renderer tint from the level file
    #[serde(default)]
    pub tint: Option<String>,
    pub color: PegColor,
    pub hit: bool,
    pub removed: bool,
    /// Temporary purple created by a power; reverts to blue if unhit
    #[serde(default)]
    pub bonus: bool,
    #[serde(default)]
    pub magnet: Option<Magnet>,
    #[serde(skip)]
    pub body: Option<BodyHandle>,
}

impl Peg {
    pub fn from_descriptor(id: u32, desc: &PegDescriptor) -> Self {
        Self {
            id,
            pos: Vec2::new(desc.x, desc.y),
            peg_type: desc.peg_type,
            size: desc.size,
            rotation: desc.rotation,
            bounce: desc.bounce_type,
            tint: desc.color.clone(),
            color: PegColor::Blue,
            hit: false,
            removed: false,
            bonus: false,
            magnet: None,
            body: None,
        }
    }

    /// Still on the board and never hit
    pub fn is_fresh(&self) -> bool {
        !self.hit && !self.removed
    }

    pub fn can_be_special(&self) -> bool {
        self.peg_type != PegType::Bomb
    }
}

/// Per-ball power behaviour, fixed when the ball spawns
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum BallVariant {
    #[default]
    Plain,
    Rocket {
        fuel: f32,
        /// Orange refuels granted so far (drives the decay)
        refuels: u32,
    },
    Quill {
        volleys_left: u32,
        next_volley: u64,
    },
    /// Primary ball with a mirrored ghost
    Mirrored { ghost: u32 },
}

/// A live ball
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ball {
    pub id: u32,
    pub pos: Vec2,
    pub vel: Vec2,
    pub spawn_tick: u64,
    /// Decided once at spawn from the turn counter
    pub power_shot: bool,
    pub variant: BallVariant,
    /// Distinct pegs this ball struck, in hit order
    pub hit_pegs: Vec<u32>,
    pub stuck: StuckTracker,
    pub caught: bool,
    pub marked_for_removal: bool,
    #[serde(skip)]
    pub body: Option<BodyHandle>,
}

impl Ball {
    pub fn new(id: u32, pos: Vec2, vel: Vec2, spawn_tick: u64, power_shot: bool) -> Self {
        Self {
            id,
            pos,
            vel,
            spawn_tick,
            power_shot,
            variant: BallVariant::Plain,
            hit_pegs: Vec::new(),
            stuck: StuckTracker::new(spawn_tick),
            caught: false,
            marked_for_removal: false,
            body: None,
        }
    }
}

/// Quill projectile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spike {
    pub id: u32,
    pub parent: u32,
    pub pos: Vec2,
    pub vel: Vec2,
    pub expires: u64,
    /// Hit something; retired at the end of the tick
    pub spent: bool,
    #[serde(skip)]
    pub body: Option<BodyHandle>,
}

/// Bomb dropped by a bomb peg
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bomb {
    pub id: u32,
    pub source_peg: u32,
    pub pos: Vec2,
    pub vel: Vec2,
    pub exploded: bool,
    #[serde(skip)]
    pub body: Option<BodyHandle>,
}

/// Kinematic mirror of a ball
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ghost {
    pub id: u32,
    pub parent: u32,
    pub pos: Vec2,
    pub vel: Vec2,
    #[serde(skip)]
    pub body: Option<BodyHandle>,
}

/// Moving catcher at the bottom of the board
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bucket {
    pub x: f32,
    /// +1 or -1
    pub direction: f32,
    #[serde(skip)]
    pub rims: [Option<BodyHandle>; 2],
    #[serde(skip)]
    pub catcher: Option<BodyHandle>,
}

/// What a physics body stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityRef {
    Ball(u32),
    Ghost(u32),
    Peg(u32),
    Spike(u32),
    Bomb(u32),
    Wall,
    BucketWall,
    BucketCatcher,
    Paddle,
}

impl EntityRef {
    pub fn as_ball(self) -> Option<u32> {
        match self {
            EntityRef::Ball(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_peg(self) -> Option<u32> {
        match self {
            EntityRef::Peg(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_ghost(self) -> Option<u32> {
        match self {
            EntityRef::Ghost(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_spike(self) -> Option<u32> {
        match self {
            EntityRef::Spike(id) => Some(id),
            _ => None,
        }
    }
}

/// How a peg was struck; purple scoring depends on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitSource {
    Direct,
    Spike,
    Explosion,
}

/// Why a ball left play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetireReason {
    Caught,
    OutOfBounds,
    /// Converted by the paddle or forced out by the stuck handler
    Marked,
    Expired,
}

/// Observable gameplay events, drained by the host every frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    LevelLoaded { pegs: usize, oranges: usize },
    ShotFired { shot: u32, ball: u32, power_shot: bool },
    PegHit { peg: u32, color: PegColor, points: u64, source: HitSource },
    PegRemoved { peg: u32 },
    OrangeMultiplier { multiplier: u32 },
    PurpleAssigned { peg: u32 },
    FreeBalls { count: u32 },
    BallRetired { ball: u32, reason: RetireReason },
    BallStuck { ball: u32 },
    BombExploded { bomb: u32, pos: Vec2 },
    PowerTurns { turns: u32 },
    ShotEnded { shot: u32, score: u64 },
    LevelCleared { score: u64 },
    GameOver { score: u64 },
}

/// Per-shot bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shot {
    pub number: u32,
    pub in_progress: bool,
    pub power_shot: bool,
    /// Points earned since the shot was fired, less free-ball conversions
    pub score: u64,
    pub purple_multiplier: f64,
    pub launch_speed: f32,
    /// Distinct pegs struck this shot, in hit order
    pub pegs_hit: Vec<u32>,
    pub magnetism_activated: bool,
}

impl Default for Shot {
    fn default() -> Self {
        Self {
            number: 0,
            in_progress: false,
            power_shot: false,
            score: 0,
            purple_multiplier: 1.0,
            launch_speed: LAUNCH_SPEED,
            pegs_hit: Vec::new(),
            magnetism_activated: false,
        }
    }
}

/// Complete match state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchState {
    pub phase: GamePhase,
    pub score: u64,
    pub balls_remaining: u32,
    pub power_turns: u32,
    /// Orange progress multiplier (1, 2, 3, 5 or 8)
    pub orange_multiplier: u32,
    pub shot: Shot,
    /// Indexed by peg id
    pub pegs: Vec<Peg>,
    pub balls: Vec<Ball>,
    pub spikes: Vec<Spike>,
    pub bombs: Vec<Bomb>,
    pub ghosts: Vec<Ghost>,
    pub bucket: Bucket,
    pub current_purple: Option<u32>,
    /// Simulation tick counter
    pub time_ticks: u64,
    /// Every removed peg id, in removal order
    pub removal_log: Vec<u32>,
    #[serde(skip)]
    pub events: Vec<GameEvent>,
    #[serde(skip)]
    pub bodies: HashMap<BodyHandle, EntityRef>,
    #[serde(skip)]
    pub walls: Vec<BodyHandle>,
    #[serde(skip)]
    pub schedule: Schedule,
    #[serde(skip)]
    pub rng: GameRng,
    next_id: u32,
}

impl MatchState {
    pub fn new(seed: Option<u64>, starting_balls: u32) -> Self {
        let rng = match seed {
            Some(seed) => GameRng::seeded(seed),
            None => GameRng::unseeded(),
        };
        Self::with_rng(rng, starting_balls)
    }

    pub fn with_rng(rng: GameRng, starting_balls: u32) -> Self {
        Self {
            phase: GamePhase::Inert,
            score: 0,
            balls_remaining: starting_balls,
            power_turns: 0,
            orange_multiplier: 1,
            shot: Shot::default(),
            pegs: Vec::new(),
            balls: Vec::new(),
            spikes: Vec::new(),
            bombs: Vec::new(),
            ghosts: Vec::new(),
            bucket: Bucket {
                direction: 1.0,
                ..Default::default()
            },
            current_purple: None,
            time_ticks: 0,
            removal_log: Vec::new(),
            events: Vec::new(),
            bodies: HashMap::new(),
            walls: Vec::new(),
            schedule: Schedule::new(),
            rng,
            next_id: 1,
        }
    }

    /// Allocate a new entity ID
    pub fn next_entity_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn register(&mut self, handle: BodyHandle, entity: EntityRef) {
        self.bodies.insert(handle, entity);
    }

    pub fn unregister(&mut self, handle: BodyHandle) {
        self.bodies.remove(&handle);
    }

    pub fn entity(&self, handle: BodyHandle) -> Option<EntityRef> {
        self.bodies.get(&handle).copied()
    }

    pub fn ball(&self, id: u32) -> Option<&Ball> {
        self.balls.iter().find(|b| b.id == id)
    }

    pub fn ball_mut(&mut self, id: u32) -> Option<&mut Ball> {
        self.balls.iter_mut().find(|b| b.id == id)
    }

    pub fn peg(&self, id: u32) -> Option<&Peg> {
        self.pegs.get(id as usize)
    }

    pub fn peg_mut(&mut self, id: u32) -> Option<&mut Peg> {
        self.pegs.get_mut(id as usize)
    }

    /// Orange multiplier times the per-shot purple multiplier
    pub fn effective_multiplier(&self) -> f64 {
        self.orange_multiplier as f64 * self.shot.purple_multiplier
    }

    /// (hit, total) orange pegs
    pub fn orange_progress(&self) -> (usize, usize) {
        self.pegs
            .iter()
            .filter(|p| p.color == PegColor::Orange)
            .fold((0, 0), |(hit, total), p| {
                (hit + usize::from(p.hit), total + 1)
            })
    }

    pub fn oranges_remaining(&self) -> usize {
        let (hit, total) = self.orange_progress();
        total - hit
    }

    pub fn push_event(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    /// Ensure entities are sorted by ID for deterministic iteration
    pub fn normalize_order(&mut self) {
        self.balls.sort_by_key(|b| b.id);
        self.spikes.sort_by_key(|s| s.id);
        self.bombs.sort_by_key(|b| b.id);
        self.ghosts.sort_by_key(|g| g.id);
    }
}

/// Mutable view handed to every subsystem during a tick
pub struct SimContext<'a> {
    pub state: &'a mut MatchState,
    pub world: &'a mut dyn PhysicsWorld,
    pub audio: &'a mut dyn AudioSink,
    pub sfx_volume: f32,
}

impl SimContext<'_> {
    pub fn now(&self) -> u64 {
        self.state.time_ticks
    }

    pub fn play(&mut self, effect: SoundEffect) -> Option<SoundHandle> {
        self.audio
            .play_sound(effect, PlayOptions::once(self.sfx_volume))
    }

    pub fn play_loop(&mut self, effect: SoundEffect) -> Option<SoundHandle> {
        self.audio
            .play_sound(effect, PlayOptions::looped(self.sfx_volume))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peg(id: u32, color: PegColor, hit: bool) -> Peg {
        let mut peg = Peg::from_descriptor(id, &PegDescriptor::round(0.0, 300.0));
        peg.color = color;
        peg.hit = hit;
        peg
    }

    #[test]
    fn test_entity_ids_are_unique() {
        let mut state = MatchState::new(Some(1), 10);
        let a = state.next_entity_id();
        let b = state.next_entity_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_orange_progress_counts_hits() {
        let mut state = MatchState::new(Some(1), 10);
        state.pegs = vec![
            peg(0, PegColor::Orange, true),
            peg(1, PegColor::Orange, false),
            peg(2, PegColor::Blue, true),
            peg(3, PegColor::Orange, true),
        ];
        assert_eq!(state.orange_progress(), (2, 3));
        assert_eq!(state.oranges_remaining(), 1);
    }

    #[test]
    fn test_effective_multiplier() {
        let mut state = MatchState::new(None, 10);
        state.orange_multiplier = 3;
        state.shot.purple_multiplier = PURPLE_SHOT_MULTIPLIER;
        assert!((state.effective_multiplier() - 3.75).abs() < 1e-12);
    }

    #[test]
    fn test_registry_lookup() {
        let mut state = MatchState::new(None, 10);
        state.register(BodyHandle(4), EntityRef::Peg(2));
        assert_eq!(state.entity(BodyHandle(4)), Some(EntityRef::Peg(2)));
        state.unregister(BodyHandle(4));
        assert_eq!(state.entity(BodyHandle(4)), None);
    }
}
