//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (by entity ID)
//! - Values published to the renderer rounded every tick
//! - No rendering or platform dependencies

pub mod collision;
pub mod driver;
pub mod ledger;
pub mod level;
pub mod lifecycle;
pub mod physics;
pub mod powers;
pub mod rng;
pub mod schedule;
pub mod snapshot;
pub mod state;
pub mod tick;

pub use collision::CollisionResolver;
pub use driver::{FrameDriver, FrameRateMonitor, FrameReport};
pub use level::{BounceType, Level, PegDescriptor, PegSize, PegType};
pub use lifecycle::{StuckReason, StuckTracker};
pub use physics::{
    BodyDesc, BodyHandle, ContactPair, Material, PhysicsWorld, RapierWorld, Shape,
};
pub use powers::{Character, PowerHud, PowerSystem, RouletteOutcome};
pub use rng::GameRng;
pub use schedule::{Schedule, ScheduledEvent};
pub use snapshot::{HudState, RenderSnapshot, SpriteKind, SpriteState, build_snapshot};
pub use state::{
    Ball, BallVariant, GameEvent, GamePhase, HitSource, MatchState, Peg, PegColor, RetireReason,
};
pub use tick::{Game, TickInput};
