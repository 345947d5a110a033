//! Entity lifecycle
//!
//! Spawning and retiring balls, spikes, bombs and ghosts; building the board;
//! peg removal; the stuck-ball heuristics and their staggered cleanup.
//! Every body created here is registered in [`MatchState::bodies`] and every
//! body destroyed here is unregistered in the same call.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::collision::strike_peg;
use super::level::{PegSize, PegType};
use super::physics::{BodyDesc, BodyHandle, Material, PhysicsWorld, Shape};
use super::powers::PowerSystem;
use super::schedule::ScheduledEvent;
use super::state::{
    Ball, BallVariant, Bomb, EntityRef, GameEvent, Ghost, HitSource, MatchState, Peg,
    RetireReason, SimContext, Spike,
};
use crate::audio::SoundEffect;
use crate::consts::*;
use crate::{clamp_speed, round_vec, secs_to_ticks};

/// Which heuristic declared a ball stuck
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StuckReason {
    /// Rapid repeat contacts on already-hit pegs across consecutive checks
    Pattern,
    /// Barely moving for too long
    Idle,
    /// No new peg for too long
    NoNewPeg,
}

/// Per-ball stuck detection state. All times are simulation ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StuckTracker {
    /// Ticks of the last two repeat contacts (pegs this ball had already
    /// struck), oldest first
    recent: Vec<u64>,
    /// Peg contacts since spawn or the last cleanup
    pub contacts: u32,
    /// Distinct pegs struck since spawn or the last cleanup
    pub distinct: u32,
    pattern_trips: u32,
    next_check: u64,
    last_moving: u64,
    last_new_peg: u64,
    pub cleanup_active: bool,
}

impl StuckTracker {
    pub fn new(spawn_tick: u64) -> Self {
        Self {
            recent: Vec::with_capacity(2),
            contacts: 0,
            distinct: 0,
            pattern_trips: 0,
            next_check: spawn_tick + secs_to_ticks(STUCK_CHECK_INTERVAL),
            last_moving: spawn_tick,
            last_new_peg: spawn_tick,
            cleanup_active: false,
        }
    }

    /// Record a peg contact; `new_peg` is true the first time this ball touches it
    pub fn record_hit(&mut self, tick: u64, new_peg: bool) {
        self.contacts += 1;
        if new_peg {
            self.distinct += 1;
            self.last_new_peg = tick;
            return;
        }
        self.recent.push(tick);
        if self.recent.len() > 2 {
            self.recent.remove(0);
        }
    }

    pub fn observe_speed(&mut self, tick: u64, speed: f32) {
        if speed > STUCK_IDLE_SPEED {
            self.last_moving = tick;
        }
    }

    /// Run the heuristics. Nothing fires until the ball has struck enough
    /// distinct pegs, or while a cleanup is in progress. An active paddle
    /// shortens every timer.
    pub fn check(&mut self, now: u64, pad_active: bool) -> Option<StuckReason> {
        if self.cleanup_active {
            return None;
        }
        let scale = if pad_active { PAD_STUCK_FACTOR } else { 1.0 };
        let interval = secs_to_ticks(STUCK_CHECK_INTERVAL * scale).max(1);
        let armed = self.distinct >= STUCK_MIN_HITS;

        if now >= self.next_check {
            self.next_check = now + interval;
            if armed && self.pattern_qualifies(now, interval) {
                self.pattern_trips += 1;
            } else {
                self.pattern_trips = 0;
            }
            if self.pattern_trips >= STUCK_PATTERN_TRIPS {
                return Some(StuckReason::Pattern);
            }
        }
        if !armed {
            return None;
        }
        if now.saturating_sub(self.last_moving) >= secs_to_ticks(STUCK_IDLE_DURATION * scale) {
            return Some(StuckReason::Idle);
        }
        if now.saturating_sub(self.last_new_peg) >= secs_to_ticks(STUCK_NO_NEW_PEG_DURATION * scale)
        {
            return Some(StuckReason::NoNewPeg);
        }
        None
    }

    fn pattern_qualifies(&self, now: u64, interval: u64) -> bool {
        match self.recent.as_slice() {
            [older, latest] => {
                latest.saturating_sub(*older) < secs_to_ticks(STUCK_PATTERN_GAP)
                    && now.saturating_sub(*latest) <= interval
            }
            _ => false,
        }
    }

    pub fn begin_cleanup(&mut self) {
        self.cleanup_active = true;
    }

    /// Start over as if the ball had just spawned
    pub fn finish_cleanup(&mut self, now: u64) {
        *self = Self::new(now);
    }
}

fn drop_body(cx: &mut SimContext, handle: Option<BodyHandle>) {
    if let Some(handle) = handle {
        cx.world.remove_body(handle);
        cx.state.unregister(handle);
    }
}

/// Create walls, the bucket and one fixed body per peg
pub fn build_board(cx: &mut SimContext) {
    let half_t = WALL_THICKNESS / 2.0;
    let side = Vec2::new(half_t, BOARD_HEIGHT / 2.0 + 60.0);
    let walls = [
        (
            Vec2::new(-(BOARD_HALF_WIDTH + half_t), BOARD_HEIGHT / 2.0),
            side,
        ),
        (Vec2::new(BOARD_HALF_WIDTH + half_t, BOARD_HEIGHT / 2.0), side),
        (
            Vec2::new(0.0, BOARD_HEIGHT + half_t),
            Vec2::new(BOARD_HALF_WIDTH + WALL_THICKNESS, half_t),
        ),
    ];
    for (pos, half_extents) in walls {
        let handle = cx.world.create_rigid_body(
            BodyDesc::fixed(Shape::Box {
                half_extents,
                angle: 0.0,
            })
            .at(pos)
            .material(Material {
                restitution: WALL_RESTITUTION,
            }),
        );
        cx.state.register(handle, EntityRef::Wall);
        cx.state.walls.push(handle);
    }

    let x = cx.state.bucket.x;
    let mut rims = [None, None];
    for (slot, offset) in [-BUCKET_HALF_WIDTH, BUCKET_HALF_WIDTH].into_iter().enumerate() {
        let handle = cx.world.create_rigid_body(
            BodyDesc::kinematic(Shape::Circle {
                radius: BUCKET_RIM_RADIUS,
            })
            .at(Vec2::new(x + offset, BUCKET_Y))
            .material(Material {
                restitution: WALL_RESTITUTION,
            }),
        );
        cx.state.register(handle, EntityRef::BucketWall);
        rims[slot] = Some(handle);
    }
    let catcher = cx.world.create_rigid_body(
        BodyDesc::kinematic(Shape::Box {
            half_extents: Vec2::new(BUCKET_HALF_WIDTH - BUCKET_RIM_RADIUS, 4.0),
            angle: 0.0,
        })
        .at(Vec2::new(x, BUCKET_Y))
        .sensor(),
    );
    cx.state.register(catcher, EntityRef::BucketCatcher);
    cx.state.bucket.rims = rims;
    cx.state.bucket.catcher = Some(catcher);

    for index in 0..cx.state.pegs.len() {
        let handle = create_peg_body(cx.world, &cx.state.pegs[index]);
        let peg = &mut cx.state.pegs[index];
        peg.body = Some(handle);
        let id = peg.id;
        cx.state.register(handle, EntityRef::Peg(id));
    }
}

fn create_peg_body(world: &mut dyn PhysicsWorld, peg: &Peg) -> BodyHandle {
    let small = peg.size == PegSize::Small;
    let shape = match peg.peg_type {
        PegType::Brick => {
            let half_extents = if small {
                Vec2::new(SMALL_BRICK_HALF_LENGTH, SMALL_BRICK_HALF_THICKNESS)
            } else {
                Vec2::new(BRICK_HALF_LENGTH, BRICK_HALF_THICKNESS)
            };
            Shape::Box {
                half_extents,
                angle: peg.rotation,
            }
        }
        PegType::Round | PegType::Bomb => Shape::Circle {
            radius: if small { SMALL_PEG_RADIUS } else { PEG_RADIUS },
        },
    };
    world.create_rigid_body(
        BodyDesc::fixed(shape)
            .at(peg.pos)
            .material(Material {
                restitution: peg.bounce.restitution(),
            }),
    )
}

/// Remove every body the match knows about
pub fn teardown(cx: &mut SimContext) {
    cx.world.clear();
    cx.state.bodies.clear();
    cx.state.walls.clear();
    cx.state.bucket.rims = [None, None];
    cx.state.bucket.catcher = None;
    for peg in &mut cx.state.pegs {
        peg.body = None;
    }
}

/// Spawn a ball. Whether it is a power shot is decided here, once.
pub fn spawn_ball(cx: &mut SimContext, pos: Vec2, vel: Vec2) -> u32 {
    let id = cx.state.next_entity_id();
    let now = cx.now();
    let power_shot = cx.state.power_turns > 0;
    let pos = round_vec(pos);
    let vel = round_vec(vel);
    let handle = cx.world.create_rigid_body(
        BodyDesc::dynamic(Shape::Circle { radius: BALL_RADIUS }, BALL_MASS)
            .at(pos)
            .with_velocity(vel)
            .material(Material {
                restitution: BALL_RESTITUTION,
            }),
    );
    cx.state.register(handle, EntityRef::Ball(id));
    let mut ball = Ball::new(id, pos, vel, now, power_shot);
    ball.body = Some(handle);
    cx.state.balls.push(ball);
    log::debug!("ball {id} spawned at {pos} (power shot: {power_shot})");
    id
}

/// Write a new velocity to both the ball and its body, rounded
pub fn set_ball_velocity(cx: &mut SimContext, ball_id: u32, vel: Vec2) {
    let vel = round_vec(vel);
    if let Some(ball) = cx.state.ball_mut(ball_id) {
        ball.vel = vel;
        if let Some(handle) = ball.body {
            cx.world.set_velocity(handle, vel);
        }
    }
}

/// Clamp a ball's post-contact speed and round it
pub fn clamp_rebound(cx: &mut SimContext, ball_id: u32) {
    let handle = cx.state.ball(ball_id).and_then(|b| b.body);
    let Some(vel) = handle.and_then(|h| cx.world.velocity(h)) else {
        return;
    };
    set_ball_velocity(cx, ball_id, clamp_speed(vel, MAX_REBOUND_SPEED));
}

pub fn retire_ball(cx: &mut SimContext, ball_id: u32, reason: RetireReason) {
    let Some(index) = cx.state.balls.iter().position(|b| b.id == ball_id) else {
        return;
    };
    let ball = cx.state.balls.remove(index);
    drop_body(cx, ball.body);
    if reason == RetireReason::Caught {
        cx.state.balls_remaining += 1;
        cx.play(SoundEffect::BucketCatch);
    }
    cx.state.push_event(GameEvent::BallRetired {
        ball: ball_id,
        reason,
    });
    log::debug!("ball {ball_id} retired ({reason:?})");
}

/// Remove a peg's body and record it. Returns false if it was already gone.
pub fn remove_peg(cx: &mut SimContext, peg_id: u32) -> bool {
    let Some(peg) = cx.state.peg_mut(peg_id) else {
        return false;
    };
    if peg.removed {
        return false;
    }
    peg.removed = true;
    peg.magnet = None;
    let body = peg.body.take();
    drop_body(cx, body);
    cx.state.removal_log.push(peg_id);
    cx.state.push_event(GameEvent::PegRemoved { peg: peg_id });
    true
}

/// Shot-end sweep of every hit peg, in the order they were hit
pub fn sweep_hit_pegs(cx: &mut SimContext) {
    let mut order = cx.state.shot.pegs_hit.clone();
    order.extend(
        cx.state
            .pegs
            .iter()
            .filter(|p| p.hit && !p.removed)
            .map(|p| p.id),
    );
    for id in order {
        if cx.state.peg(id).is_some_and(|p| p.hit) {
            remove_peg(cx, id);
        }
    }
}

pub fn spawn_spike(cx: &mut SimContext, parent: u32, pos: Vec2, dir: Vec2) -> u32 {
    let id = cx.state.next_entity_id();
    let vel = round_vec(dir.normalize_or_zero() * SPIKE_SPEED);
    let shape = Shape::Circle {
        radius: SPIKE_RADIUS,
    };
    let handle = cx.world.create_rigid_body(
        BodyDesc::dynamic(shape, 0.1)
            .at(pos)
            .with_velocity(vel)
            .gravity_scale(0.0)
            .sensor(),
    );
    cx.state.register(handle, EntityRef::Spike(id));
    let expires = cx.now() + secs_to_ticks(SPIKE_LIFETIME);
    cx.state.spikes.push(Spike {
        id,
        parent,
        pos,
        vel,
        expires,
        spent: false,
        body: Some(handle),
    });
    id
}

/// Fire due volleys for every quill ball
pub fn update_quill_volleys(cx: &mut SimContext) {
    let now = cx.now();
    let mut volleys = Vec::new();
    for ball in &mut cx.state.balls {
        let BallVariant::Quill {
            volleys_left,
            next_volley,
        } = &mut ball.variant
        else {
            continue;
        };
        if *volleys_left > 0 && now >= *next_volley {
            *volleys_left -= 1;
            *next_volley = now + secs_to_ticks(QUILL_VOLLEY_INTERVAL);
            volleys.push((ball.id, ball.pos));
        }
    }
    for (ball_id, pos) in volleys {
        for (dx, dy) in [(1.0, 1.0), (-1.0, 1.0), (1.0, -1.0), (-1.0, -1.0)]
            .into_iter()
            .take(QUILL_SPIKES_PER_VOLLEY as usize)
        {
            spawn_spike(cx, ball_id, pos, Vec2::new(dx, dy));
        }
        cx.play(SoundEffect::QuillVolley);
        log::debug!("quill volley from ball {ball_id}");
    }
}

/// Drop a bomb below a struck bomb peg and light its fuse
pub fn spawn_bomb(cx: &mut SimContext, peg_pos: Vec2, source_peg: u32) -> u32 {
    let id = cx.state.next_entity_id();
    let pos = round_vec(peg_pos - Vec2::new(0.0, PEG_RADIUS + BOMB_BODY_RADIUS + 1.0));
    let shape = Shape::Circle {
        radius: BOMB_BODY_RADIUS,
    };
    let handle = cx.world.create_rigid_body(BodyDesc::dynamic(shape, 2.0).at(pos));
    cx.state.register(handle, EntityRef::Bomb(id));
    cx.state.bombs.push(Bomb {
        id,
        source_peg,
        pos,
        vel: Vec2::ZERO,
        exploded: false,
        body: Some(handle),
    });
    let due = cx.now() + secs_to_ticks(BOMB_FUSE);
    cx.state
        .schedule
        .schedule_at(due, ScheduledEvent::DetonateBomb { bomb: id });
    id
}

/// Explode a bomb: strike every peg in range and push nearby balls away
pub fn detonate_bomb(cx: &mut SimContext, powers: &mut PowerSystem, bomb_id: u32) {
    let Some(bomb) = cx
        .state
        .bombs
        .iter_mut()
        .find(|b| b.id == bomb_id && !b.exploded)
    else {
        return;
    };
    bomb.exploded = true;
    let pos = bomb.pos;
    cx.state.push_event(GameEvent::BombExploded { bomb: bomb_id, pos });
    cx.play(SoundEffect::BombExplode);

    let targets: Vec<u32> = cx
        .state
        .pegs
        .iter()
        .filter(|p| p.is_fresh() && p.pos.distance(pos) <= BOMB_RADIUS)
        .map(|p| p.id)
        .collect();
    log::debug!("bomb {bomb_id} exploded, {} peg(s) in range", targets.len());
    for peg in targets {
        if let Err(err) = strike_peg(cx, powers, peg, HitSource::Explosion, None) {
            log::warn!("explosion skipped peg {peg}: {err}");
        }
    }

    let pushes: Vec<(u32, Vec2)> = cx
        .state
        .balls
        .iter()
        .filter_map(|ball| {
            let offset = ball.pos - pos;
            let dist = offset.length();
            (dist < BOMB_RADIUS).then(|| {
                let falloff = 1.0 - dist / BOMB_RADIUS;
                let dir = offset.normalize_or(Vec2::Y);
                (ball.id, ball.vel + dir * BOMB_IMPULSE * falloff)
            })
        })
        .collect();
    for (ball_id, vel) in pushes {
        set_ball_velocity(cx, ball_id, clamp_speed(vel, MAX_REBOUND_SPEED));
    }
}

/// Detonate every bomb still waiting on its fuse (chains included)
pub fn detonate_pending_bombs(cx: &mut SimContext, powers: &mut PowerSystem) {
    while let Some(id) = cx
        .state
        .bombs
        .iter()
        .find(|b| !b.exploded)
        .map(|b| b.id)
    {
        detonate_bomb(cx, powers, id);
    }
}

/// Spawn a kinematic mirror of `parent` across the vertical centre line
pub fn spawn_ghost(cx: &mut SimContext, parent: u32) -> Option<u32> {
    let (pos, vel) = cx.state.ball(parent).map(|b| (b.pos, b.vel))?;
    let id = cx.state.next_entity_id();
    let pos = mirror(pos);
    let vel = mirror(vel);
    let handle = cx.world.create_rigid_body(
        BodyDesc::kinematic(Shape::Circle { radius: BALL_RADIUS })
            .at(pos)
            .with_velocity(vel)
            .sensor(),
    );
    cx.state.register(handle, EntityRef::Ghost(id));
    cx.state.ghosts.push(Ghost {
        id,
        parent,
        pos,
        vel,
        body: Some(handle),
    });
    if let Some(ball) = cx.state.ball_mut(parent) {
        ball.variant = BallVariant::Mirrored { ghost: id };
    }
    Some(id)
}

fn mirror(v: Vec2) -> Vec2 {
    Vec2::new(-v.x, v.y)
}

/// Snap every ghost onto its parent's mirror image
pub fn sync_ghosts(cx: &mut SimContext) {
    for index in 0..cx.state.ghosts.len() {
        let parent = cx.state.ghosts[index].parent;
        let Some((pos, vel)) = cx.state.ball(parent).map(|b| (b.pos, b.vel)) else {
            continue;
        };
        let ghost = &mut cx.state.ghosts[index];
        ghost.pos = mirror(pos);
        ghost.vel = mirror(vel);
        if let Some(handle) = ghost.body {
            cx.world.set_position(handle, ghost.pos);
            cx.world.set_velocity(handle, ghost.vel);
        }
    }
}

/// A ball touched the paddle: retire it and launch a fresh one upward
pub fn convert_pad_bounce(cx: &mut SimContext, ball_id: u32) -> Option<u32> {
    let ball = cx.state.ball_mut(ball_id)?;
    if ball.marked_for_removal || ball.caught {
        return None;
    }
    ball.marked_for_removal = true;
    let pos = Vec2::new(
        ball.pos.x,
        PADDLE_Y + PADDLE_HALF_HEIGHT + BALL_RADIUS + 2.0,
    );
    let vel = Vec2::new(ball.vel.x.clamp(-200.0, 200.0), PAD_BOUNCE_SPEED);
    cx.play(SoundEffect::PaddleBounce);
    let new_id = spawn_ball(cx, pos, vel);
    log::debug!("ball {ball_id} bounced off the paddle as ball {new_id}");
    Some(new_id)
}

/// Set the bucket's sweep velocity before the step
pub fn drive_bucket(cx: &mut SimContext) {
    let bucket = &mut cx.state.bucket;
    if bucket.x >= BUCKET_MAX_X {
        bucket.direction = -1.0;
    } else if bucket.x <= -BUCKET_MAX_X {
        bucket.direction = 1.0;
    }
    let vel = Vec2::new(bucket.direction * BUCKET_SPEED, 0.0);
    let handles = [bucket.rims[0], bucket.rims[1], bucket.catcher];
    for handle in handles.into_iter().flatten() {
        cx.world.set_velocity(handle, vel);
    }
}

/// Read the bucket back after the step and re-seat its parts exactly
fn sync_bucket(cx: &mut SimContext) {
    let Some(catcher) = cx.state.bucket.catcher else {
        return;
    };
    let Some(pos) = cx.world.position(catcher) else {
        return;
    };
    let x = crate::round_to(pos.x, VALUE_DECIMALS);
    cx.state.bucket.x = x;
    cx.world.set_position(catcher, Vec2::new(x, BUCKET_Y));
    let rims = cx.state.bucket.rims;
    for (handle, offset) in rims.into_iter().zip([-BUCKET_HALF_WIDTH, BUCKET_HALF_WIDTH]) {
        if let Some(handle) = handle {
            cx.world.set_position(handle, Vec2::new(x + offset, BUCKET_Y));
        }
    }
}

/// Copy body state back from the world, rounding both sides
pub fn sync_from_world(cx: &mut SimContext) {
    fn pull(world: &mut dyn PhysicsWorld, handle: Option<BodyHandle>, pos: &mut Vec2, vel: &mut Vec2) {
        let Some(handle) = handle else { return };
        if let (Some(p), Some(v)) = (world.position(handle), world.velocity(handle)) {
            *pos = round_vec(p);
            *vel = round_vec(v);
            world.set_position(handle, *pos);
            world.set_velocity(handle, *vel);
        }
    }

    let state = &mut *cx.state;
    for ball in &mut state.balls {
        pull(cx.world, ball.body, &mut ball.pos, &mut ball.vel);
    }
    for spike in &mut state.spikes {
        pull(cx.world, spike.body, &mut spike.pos, &mut spike.vel);
    }
    for bomb in &mut state.bombs {
        pull(cx.world, bomb.body, &mut bomb.pos, &mut bomb.vel);
    }
    for ghost in &mut state.ghosts {
        pull(cx.world, ghost.body, &mut ghost.pos, &mut ghost.vel);
    }
    sync_bucket(cx);
}

/// Feed speeds to the stuck trackers and start cleanups for any that trip
pub fn update_stuck(cx: &mut SimContext, pad_active: bool) {
    let now = cx.now();
    let mut tripped = Vec::new();
    for ball in &mut cx.state.balls {
        if ball.marked_for_removal || ball.caught {
            continue;
        }
        ball.stuck.observe_speed(now, ball.vel.length());
        if let Some(reason) = ball.stuck.check(now, pad_active) {
            tripped.push((ball.id, reason));
        }
    }
    for (ball_id, reason) in tripped {
        start_stuck_cleanup(cx, ball_id, reason);
    }
}

/// Schedule removal of a stuck ball's hit pegs, one per interval, in hit
/// order. A ball with nothing left to clear is forced out instead.
pub fn start_stuck_cleanup(cx: &mut SimContext, ball_id: u32, reason: StuckReason) {
    let now = cx.now();
    let Some(ball) = cx.state.ball_mut(ball_id) else {
        return;
    };
    ball.stuck.begin_cleanup();
    let hit_pegs = ball.hit_pegs.clone();
    let removable: Vec<u32> = hit_pegs
        .into_iter()
        .filter(|&id| cx.state.peg(id).is_some_and(|p| !p.removed))
        .collect();

    cx.state.push_event(GameEvent::BallStuck { ball: ball_id });
    if removable.is_empty() {
        log::warn!("ball {ball_id} stuck ({reason:?}) with nothing to clear, retiring it");
        if let Some(ball) = cx.state.ball_mut(ball_id) {
            ball.marked_for_removal = true;
        }
        return;
    }

    log::info!(
        "ball {ball_id} stuck ({reason:?}), clearing {} peg(s)",
        removable.len()
    );
    let stagger = secs_to_ticks(STUCK_REMOVAL_INTERVAL).max(1);
    let count = removable.len() as u64;
    for (i, peg) in removable.into_iter().enumerate() {
        cx.state.schedule.schedule_at(
            now + i as u64 * stagger,
            ScheduledEvent::RemoveStuckPeg { ball: ball_id, peg },
        );
    }
    cx.state.schedule.schedule_at(
        now + count * stagger,
        ScheduledEvent::StuckCleanupDone { ball: ball_id },
    );
}

/// Apply a stuck-cleanup schedule event
pub fn handle_stuck_event(cx: &mut SimContext, event: ScheduledEvent) {
    match event {
        ScheduledEvent::RemoveStuckPeg { peg, .. } => {
            remove_peg(cx, peg);
        }
        ScheduledEvent::StuckCleanupDone { ball } => {
            let now = cx.now();
            if let Some(ball) = cx.state.ball_mut(ball) {
                ball.stuck.finish_cleanup(now);
            }
        }
        _ => {}
    }
}

fn outside_board(pos: Vec2) -> bool {
    pos.y < OUT_OF_BOUNDS_Y
        || pos.y > BOARD_HEIGHT + 40.0
        || pos.x.abs() > BOARD_HALF_WIDTH + 40.0
}

/// End-of-tick retirement of everything that has left play
pub fn retire_entities(cx: &mut SimContext) {
    let now = cx.now();
    let lifetime = secs_to_ticks(MAX_BALL_LIFETIME);

    let retiring: Vec<(u32, RetireReason)> = cx
        .state
        .balls
        .iter()
        .filter_map(|ball| {
            let reason = if ball.caught {
                RetireReason::Caught
            } else if ball.marked_for_removal {
                RetireReason::Marked
            } else if ball.pos.y < OUT_OF_BOUNDS_Y {
                RetireReason::OutOfBounds
            } else if now.saturating_sub(ball.spawn_tick) >= lifetime {
                RetireReason::Expired
            } else {
                return None;
            };
            Some((ball.id, reason))
        })
        .collect();
    for (ball_id, reason) in retiring {
        if reason == RetireReason::Expired {
            log::warn!("ball {ball_id} exceeded its lifetime, forcing it out");
        }
        retire_ball(cx, ball_id, reason);
    }

    let spikes: Vec<(u32, Option<BodyHandle>)> = cx
        .state
        .spikes
        .iter()
        .filter(|s| s.spent || now >= s.expires || outside_board(s.pos))
        .map(|s| (s.id, s.body))
        .collect();
    for (id, body) in spikes {
        drop_body(cx, body);
        cx.state.spikes.retain(|s| s.id != id);
    }

    let bombs: Vec<(u32, Option<BodyHandle>)> = cx
        .state
        .bombs
        .iter()
        .filter(|b| b.exploded || b.pos.y < OUT_OF_BOUNDS_Y)
        .map(|b| (b.id, b.body))
        .collect();
    for (id, body) in bombs {
        drop_body(cx, body);
        cx.state.bombs.retain(|b| b.id != id);
    }

    retire_orphan_ghosts(cx);
}

/// Ghosts never outlive their parent ball
pub fn retire_orphan_ghosts(cx: &mut SimContext) {
    let orphans: Vec<(u32, Option<BodyHandle>)> = cx
        .state
        .ghosts
        .iter()
        .filter(|g| cx.state.ball(g.parent).is_none())
        .map(|g| (g.id, g.body))
        .collect();
    for (id, body) in orphans {
        drop_body(cx, body);
        cx.state.ghosts.retain(|g| g.id != id);
    }
}

/// Clear spikes and ghosts at shot end
pub fn retire_projectiles(cx: &mut SimContext) {
    let spikes = std::mem::take(&mut cx.state.spikes);
    for spike in spikes {
        drop_body(cx, spike.body);
    }
    let ghosts = std::mem::take(&mut cx.state.ghosts);
    for ghost in ghosts {
        drop_body(cx, ghost.body);
    }
}

/// Live ball count; the shot is over when it reaches zero
pub fn live_balls(state: &MatchState) -> usize {
    state.balls.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secs_to_ticks;

    #[test]
    fn test_no_trip_before_min_distinct_pegs() {
        let mut tracker = StuckTracker::new(0);
        tracker.record_hit(0, true);
        for now in 1..secs_to_ticks(10.0) {
            if now % 4 == 0 {
                tracker.record_hit(now, false);
            }
            assert_eq!(tracker.check(now, false), None);
        }
        assert_eq!(tracker.distinct, 1);
    }

    #[test]
    fn test_same_pegs_repeatedly_trip_no_new_peg() {
        let mut tracker = StuckTracker::new(0);
        tracker.record_hit(0, true);
        tracker.record_hit(1, true);
        let mut tripped = None;
        for now in 2..secs_to_ticks(5.5) {
            if now % 30 == 0 {
                tracker.record_hit(now, false);
            }
            tracker.observe_speed(now, 300.0);
            if let Some(reason) = tracker.check(now, false) {
                tripped = Some((now, reason));
                break;
            }
        }
        let (at, reason) = tripped.expect("tracker should trip");
        assert_eq!(reason, StuckReason::NoNewPeg);
        assert!(at <= secs_to_ticks(5.0));
    }

    #[test]
    fn test_new_peg_every_two_seconds_never_trips() {
        let mut tracker = StuckTracker::new(0);
        for now in 0..secs_to_ticks(20.0) {
            if now % secs_to_ticks(2.0) == 0 {
                tracker.record_hit(now, true);
            }
            tracker.observe_speed(now, 400.0);
            assert_eq!(tracker.check(now, false), None, "tripped at tick {now}");
        }
    }

    #[test]
    fn test_fast_fall_through_fresh_pegs_never_trips() {
        let mut tracker = StuckTracker::new(0);
        for now in 0..secs_to_ticks(3.0) {
            // A new peg every few ticks, the odd double touch on the same
            // peg as it rolls off
            if now % 5 == 0 {
                tracker.record_hit(now, true);
            }
            if now % 45 == 1 {
                tracker.record_hit(now, false);
            }
            tracker.observe_speed(now, 270.0);
            assert_eq!(tracker.check(now, false), None, "tripped at tick {now}");
        }
        assert!(tracker.distinct > STUCK_MIN_HITS);
    }

    #[test]
    fn test_idle_ball_trips() {
        let mut tracker = StuckTracker::new(0);
        for now in [10, 20, 30] {
            tracker.record_hit(now, true);
        }
        let mut tripped = None;
        for now in 31..secs_to_ticks(4.0) {
            tracker.observe_speed(now, 5.0);
            if let Some(reason) = tracker.check(now, false) {
                tripped = Some(reason);
                break;
            }
        }
        assert_eq!(tripped, Some(StuckReason::Idle));
    }

    #[test]
    fn test_rattle_between_two_pegs_trips_pattern() {
        let mut tracker = StuckTracker::new(0);
        tracker.record_hit(0, true);
        tracker.record_hit(2, true);
        let mut tripped = None;
        for now in 3..secs_to_ticks(3.0) {
            if now % 4 == 0 {
                tracker.record_hit(now, false);
            }
            tracker.observe_speed(now, 300.0);
            if let Some(reason) = tracker.check(now, false) {
                tripped = Some((now, reason));
                break;
            }
        }
        let (at, reason) = tripped.expect("pattern should trip");
        assert_eq!(reason, StuckReason::Pattern);
        // Two consecutive qualifying checks
        assert_eq!(at, secs_to_ticks(1.0));
    }

    #[test]
    fn test_pad_scales_timers() {
        let mut normal = StuckTracker::new(0);
        let mut padded = StuckTracker::new(0);
        for tracker in [&mut normal, &mut padded] {
            tracker.record_hit(0, true);
            tracker.record_hit(30, true);
            tracker.record_hit(60, false);
        }
        let first_trip = |tracker: &mut StuckTracker, pad: bool| {
            (61..secs_to_ticks(10.0)).find(|&now| {
                tracker.observe_speed(now, 300.0);
                tracker.check(now, pad).is_some()
            })
        };
        let normal_at = first_trip(&mut normal, false).unwrap();
        let padded_at = first_trip(&mut padded, true).unwrap();
        assert_eq!(normal_at, 30 + secs_to_ticks(STUCK_NO_NEW_PEG_DURATION));
        assert!(padded_at <= secs_to_ticks(1.5));
    }

    #[test]
    fn test_cleanup_suspends_checks() {
        let mut tracker = StuckTracker::new(0);
        for now in [0, 1, 2] {
            tracker.record_hit(now, true);
        }
        tracker.begin_cleanup();
        assert_eq!(tracker.check(secs_to_ticks(30.0), false), None);
        tracker.finish_cleanup(secs_to_ticks(30.0));
        assert_eq!(tracker.contacts, 0);
        assert_eq!(tracker.distinct, 0);
        assert!(!tracker.cleanup_active);
    }
}
