//! Collision resolution
//!
//! Contacts arrive from two channels every tick: the world's begin-contact
//! events and a post-step scan of touching pairs. Both are merged here and
//! each unordered pair is resolved at most once per tick, however many
//! physics sub-steps the tick ran.

use std::collections::HashSet;

use super::ledger;
use super::level::{PegSize, PegType};
use super::lifecycle::{clamp_rebound, convert_pad_bounce, remove_peg, spawn_bomb};
use super::physics::{BodyHandle, ContactPair};
use super::powers::{PegHit, PowerSystem};
use super::state::{EntityRef, HitSource, PegColor, SimContext};
use crate::audio::SoundEffect;
use crate::error::CollisionError;

/// Unordered body pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairKey(BodyHandle, BodyHandle);

impl PairKey {
    pub fn new(a: BodyHandle, b: BodyHandle) -> Self {
        if a <= b { Self(a, b) } else { Self(b, a) }
    }
}

/// Per-tick contact deduplication and dispatch
#[derive(Debug, Default)]
pub struct CollisionResolver {
    processed: HashSet<PairKey>,
}

impl CollisionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget processed pairs; called at the start of every tick
    pub fn begin_tick(&mut self) {
        self.processed.clear();
    }

    pub fn is_processed(&self, a: BodyHandle, b: BodyHandle) -> bool {
        self.processed.contains(&PairKey::new(a, b))
    }

    /// Resolve every pair not yet handled this tick. A pair whose handler
    /// fails is logged and skipped; the rest still run. Returns the number of
    /// pairs dispatched.
    pub fn resolve(
        &mut self,
        cx: &mut SimContext,
        powers: &mut PowerSystem,
        contacts: &[ContactPair],
    ) -> usize {
        let mut dispatched = 0;
        for &(a, b) in contacts {
            // A body removed earlier this tick leaves stale pairs behind
            if !cx.world.contains(a) || !cx.world.contains(b) {
                continue;
            }
            if !self.processed.insert(PairKey::new(a, b)) {
                continue;
            }
            dispatched += 1;
            if let Err(err) = dispatch(cx, powers, a, b) {
                log::error!("contact {a:?}/{b:?} skipped: {err}");
            }
        }
        dispatched
    }
}

/// Match an unordered entity pair against two role extractors
fn roles<T, U>(
    ea: EntityRef,
    eb: EntityRef,
    first: impl Fn(EntityRef) -> Option<T>,
    second: impl Fn(EntityRef) -> Option<U>,
) -> Option<(T, U)> {
    match (first(ea), second(eb)) {
        (Some(t), Some(u)) => Some((t, u)),
        _ => match (first(eb), second(ea)) {
            (Some(t), Some(u)) => Some((t, u)),
            _ => None,
        },
    }
}

fn is(kind: EntityRef) -> impl Fn(EntityRef) -> Option<()> {
    move |e| (e == kind).then_some(())
}

fn dispatch(
    cx: &mut SimContext,
    powers: &mut PowerSystem,
    a: BodyHandle,
    b: BodyHandle,
) -> Result<(), CollisionError> {
    let ea = cx.state.entity(a).ok_or(CollisionError::UnknownBody(a))?;
    let eb = cx.state.entity(b).ok_or(CollisionError::UnknownBody(b))?;

    // Projectile/peg contacts are exclusive: nothing else runs for the pair
    if let Some((ball, peg)) = roles(ea, eb, EntityRef::as_ball, EntityRef::as_peg) {
        return ball_hits_peg(cx, powers, ball, peg);
    }
    if let Some((_, peg)) = roles(ea, eb, EntityRef::as_ghost, EntityRef::as_peg) {
        return strike_peg(cx, powers, peg, HitSource::Direct, None);
    }
    if let Some((spike, peg)) = roles(ea, eb, EntityRef::as_spike, EntityRef::as_peg) {
        spend_spike(cx, spike);
        return strike_peg(cx, powers, peg, HitSource::Spike, None);
    }

    if roles(ea, eb, EntityRef::as_ball, EntityRef::as_spike).is_some() {
        return Ok(());
    }
    if let Some((ball, ())) = roles(ea, eb, EntityRef::as_ball, is(EntityRef::Wall)) {
        clamp_rebound(cx, ball);
        cx.play(SoundEffect::WallHit);
        return Ok(());
    }
    if let Some((ball, ())) = roles(ea, eb, EntityRef::as_ball, is(EntityRef::BucketWall)) {
        clamp_rebound(cx, ball);
        return Ok(());
    }
    if let Some((ball, ())) = roles(ea, eb, EntityRef::as_ball, is(EntityRef::BucketCatcher)) {
        let ball = cx
            .state
            .ball_mut(ball)
            .ok_or(CollisionError::MissingBall(ball))?;
        if !ball.marked_for_removal {
            ball.caught = true;
        }
        return Ok(());
    }
    if let Some((ball, ())) = roles(ea, eb, EntityRef::as_ball, is(EntityRef::Paddle)) {
        if powers.pad_active() {
            convert_pad_bounce(cx, ball);
        }
        return Ok(());
    }

    let solid = |e: EntityRef| {
        matches!(
            e,
            EntityRef::Wall | EntityRef::BucketWall | EntityRef::BucketCatcher | EntityRef::Paddle
        )
        .then_some(())
    };
    if let Some((spike, ())) = roles(ea, eb, EntityRef::as_spike, solid) {
        spend_spike(cx, spike);
    }
    // Bombs, ghosts against solids and ball/ball pairs need no handling
    Ok(())
}

fn spend_spike(cx: &mut SimContext, spike_id: u32) {
    if let Some(spike) = cx.state.spikes.iter_mut().find(|s| s.id == spike_id) {
        spike.spent = true;
    }
}

fn ball_hits_peg(
    cx: &mut SimContext,
    powers: &mut PowerSystem,
    ball_id: u32,
    peg_id: u32,
) -> Result<(), CollisionError> {
    let now = cx.now();
    let removed = cx
        .state
        .peg(peg_id)
        .ok_or(CollisionError::MissingPeg(peg_id))?
        .removed;
    if removed {
        return Err(CollisionError::PegRemoved(peg_id));
    }
    let ball = cx
        .state
        .ball_mut(ball_id)
        .ok_or(CollisionError::MissingBall(ball_id))?;
    if ball.marked_for_removal {
        return Ok(());
    }
    let new_peg = !ball.hit_pegs.contains(&peg_id);
    if new_peg {
        ball.hit_pegs.push(peg_id);
    }
    ball.stuck.record_hit(now, new_peg);

    clamp_rebound(cx, ball_id);
    strike_peg(cx, powers, peg_id, HitSource::Direct, Some(ball_id))
}

/// Everything that follows a peg being struck, whatever struck it: scoring,
/// colour effects, power hooks, immediate removal and bomb drops
pub fn strike_peg(
    cx: &mut SimContext,
    powers: &mut PowerSystem,
    peg_id: u32,
    source: HitSource,
    ball: Option<u32>,
) -> Result<(), CollisionError> {
    let outcome = ledger::register_hit(cx, peg_id, source)?;
    if !outcome.newly_hit {
        return Ok(());
    }

    let new_in_shot = !cx.state.shot.pegs_hit.contains(&peg_id);
    if new_in_shot {
        cx.state.shot.pegs_hit.push(peg_id);
    }

    match outcome.color {
        PegColor::Green => powers.green_hit(cx, ball),
        PegColor::Purple if !outcome.bonus && powers.character().reassigns_purple_on_hit() => {
            ledger::assign_purple(cx.state);
        }
        _ => {}
    }
    powers.peg_hit(
        cx,
        &PegHit {
            peg: peg_id,
            color: outcome.color,
            source,
            ball,
            new_in_shot,
        },
    );

    let Some(peg) = cx.state.peg(peg_id) else {
        return Ok(());
    };
    let (pos, bomb, small) = (peg.pos, peg.peg_type == PegType::Bomb, peg.size == PegSize::Small);
    if bomb {
        spawn_bomb(cx, pos, peg_id);
    }
    if small || powers.pad_active() {
        remove_peg(cx, peg_id);
    }
    Ok(())
}
