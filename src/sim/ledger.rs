//! Peg & multiplier ledger
//!
//! Owns the scoring rules: colour roles, hit bookkeeping, the orange progress
//! multiplier, the per-shot purple multiplier and free-ball conversion.
//! Nothing here touches physics.

use super::state::{GameEvent, HitSource, MatchState, PegColor, SimContext};
use crate::audio::{SoundEffect, apply_music_layers};
use crate::consts::*;
use crate::error::CollisionError;

/// Orange-progress thresholds (percent) and the multiplier each unlocks
const ORANGE_STEPS: [(f64, u32); 4] = [(90.0, 8), (80.0, 5), (60.0, 3), (40.0, 2)];

/// Result of registering a hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitOutcome {
    pub peg: u32,
    pub color: PegColor,
    /// False when the peg had already been hit
    pub newly_hit: bool,
    pub bonus: bool,
    pub points: u64,
}

/// Step index for an orange percentage: 0 below 40%, 4 at 90% and above
pub fn orange_step(percent: f64) -> usize {
    ORANGE_STEPS
        .iter()
        .position(|&(threshold, _)| percent >= threshold)
        .map_or(0, |i| ORANGE_STEPS.len() - i)
}

/// Multiplier for an orange percentage
pub fn orange_multiplier_for(percent: f64) -> u32 {
    ORANGE_STEPS
        .iter()
        .find(|&&(threshold, _)| percent >= threshold)
        .map_or(1, |&(_, multiplier)| multiplier)
}

/// Percentage of orange pegs hit (0 when the level has none)
pub fn orange_percent(state: &MatchState) -> f64 {
    let (hit, total) = state.orange_progress();
    if total == 0 {
        0.0
    } else {
        hit as f64 * 100.0 / total as f64
    }
}

/// Points for striking a peg of `color` with the multipliers in effect.
/// The level's purple peg always pays a flat amount; a power-made purple is
/// multiplied unless an explosion reached it.
pub fn score_points(
    color: PegColor,
    bonus: bool,
    source: HitSource,
    orange: u32,
    purple: f64,
) -> u64 {
    if color == PegColor::Purple && (!bonus || source == HitSource::Explosion) {
        return PURPLE_PEG_POINTS;
    }
    (color.base_points() as f64 * orange as f64 * purple).floor() as u64
}

/// Free balls earned by a running shot score, and what is left over
pub fn free_balls_for(shot_score: u64, threshold: u64) -> (u32, u64) {
    if threshold == 0 {
        return (0, shot_score);
    }
    ((shot_score / threshold) as u32, shot_score % threshold)
}

/// Recompute the orange multiplier from the peg set. Music layers are
/// refreshed whenever the step changes (or `force` is set, e.g. on load).
pub fn recompute_orange_multiplier(cx: &mut SimContext, force: bool) {
    let percent = orange_percent(cx.state);
    let multiplier = orange_multiplier_for(percent);
    let changed = multiplier != cx.state.orange_multiplier;
    cx.state.orange_multiplier = multiplier;
    if changed {
        log::info!("orange multiplier x{multiplier} at {percent:.1}%");
        cx.state.push_event(GameEvent::OrangeMultiplier { multiplier });
    }
    if changed || force {
        apply_music_layers(cx.audio, orange_step(percent));
    }
}

/// Add points to the match and shot totals, converting the shot total into
/// free balls whenever it crosses the threshold
pub fn award_points(cx: &mut SimContext, points: u64) {
    let state = &mut *cx.state;
    state.score += points;
    state.shot.score += points;
    let (count, remainder) = free_balls_for(state.shot.score, FREE_BALL_THRESHOLD);
    if count > 0 {
        state.balls_remaining += count;
        state.shot.score = remainder;
        state.push_event(GameEvent::FreeBalls { count });
        log::info!("{count} free ball(s) awarded");
        cx.play(SoundEffect::FreeBall);
    }
}

/// Mark a peg hit and score it. Repeated hits return `newly_hit: false` and
/// change nothing.
pub fn register_hit(
    cx: &mut SimContext,
    peg_id: u32,
    source: HitSource,
) -> Result<HitOutcome, CollisionError> {
    let orange = cx.state.orange_multiplier;
    let purple = cx.state.shot.purple_multiplier;
    let peg = cx
        .state
        .peg_mut(peg_id)
        .ok_or(CollisionError::MissingPeg(peg_id))?;
    if peg.removed {
        return Err(CollisionError::PegRemoved(peg_id));
    }
    let color = peg.color;
    let bonus = peg.bonus;
    if peg.hit {
        return Ok(HitOutcome {
            peg: peg_id,
            color,
            newly_hit: false,
            bonus,
            points: 0,
        });
    }
    peg.hit = true;

    let points = score_points(color, bonus, source, orange, purple);
    award_points(cx, points);
    cx.state.push_event(GameEvent::PegHit {
        peg: peg_id,
        color,
        points,
        source,
    });
    log::debug!("peg {peg_id} ({color:?}) hit via {source:?} for {points}");

    match color {
        PegColor::Orange => {
            cx.play(SoundEffect::OrangeHit);
            recompute_orange_multiplier(cx, false);
        }
        PegColor::Purple => {
            cx.play(SoundEffect::PurpleHit);
            cx.state.shot.purple_multiplier = PURPLE_SHOT_MULTIPLIER;
        }
        PegColor::Green => {
            cx.play(SoundEffect::PowerActivate);
        }
        PegColor::Blue => {
            cx.play(SoundEffect::PegHit);
        }
    }

    Ok(HitOutcome {
        peg: peg_id,
        color,
        newly_hit: true,
        bonus,
        points,
    })
}

/// Roll colour roles for a freshly loaded level: two greens, `orange_count`
/// oranges, everything else blue, then one purple among the blues
pub fn assign_special_types(state: &mut MatchState, orange_count: usize) {
    let mut eligible: Vec<u32> = state
        .pegs
        .iter()
        .filter(|p| p.can_be_special())
        .map(|p| p.id)
        .collect();
    state.rng.shuffle(&mut eligible);

    for peg in &mut state.pegs {
        peg.color = PegColor::Blue;
        peg.bonus = false;
    }
    for (slot, &id) in eligible.iter().enumerate() {
        let color = if slot < GREEN_PEGS_PER_LEVEL {
            PegColor::Green
        } else if slot < GREEN_PEGS_PER_LEVEL + orange_count {
            PegColor::Orange
        } else {
            PegColor::Blue
        };
        if let Some(peg) = state.peg_mut(id) {
            peg.color = color;
        }
    }
    state.current_purple = None;
    assign_purple(state);
}

/// Move the purple role to a random unhit blue peg. An unhit previous purple
/// reverts to blue and is only picked again when no other blue is left; a
/// hit one keeps its colour until it is swept.
pub fn assign_purple(state: &mut MatchState) -> Option<u32> {
    let previous = state.current_purple.take();
    if let Some(peg) = previous.and_then(|id| state.peg_mut(id)) {
        if peg.is_fresh() && peg.color == PegColor::Purple {
            peg.color = PegColor::Blue;
        }
    }

    let eligible: Vec<u32> = state
        .pegs
        .iter()
        .filter(|p| p.color == PegColor::Blue && p.is_fresh() && !p.bonus && p.can_be_special())
        .map(|p| p.id)
        .collect();
    let others: Vec<u32> = eligible
        .iter()
        .copied()
        .filter(|&id| Some(id) != previous)
        .collect();
    let candidates = if others.is_empty() { eligible } else { others };
    if candidates.is_empty() {
        log::debug!("no blue peg left for purple");
        return None;
    }
    let pick = candidates[state.rng.fallback_int(0, candidates.len() as i32) as usize];
    if let Some(peg) = state.peg_mut(pick) {
        peg.color = PegColor::Purple;
    }
    state.current_purple = Some(pick);
    state.push_event(GameEvent::PurpleAssigned { peg: pick });
    Some(pick)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::RecordingAudio;
    use crate::sim::level::PegDescriptor;
    use crate::sim::physics::RapierWorld;
    use crate::sim::state::Peg;
    use proptest::prelude::*;

    fn state_with(colors: &[PegColor]) -> MatchState {
        let mut state = MatchState::new(Some(3), 10);
        state.pegs = colors
            .iter()
            .enumerate()
            .map(|(i, &color)| {
                let mut peg = Peg::from_descriptor(i as u32, &PegDescriptor::round(0.0, 300.0));
                peg.color = color;
                peg
            })
            .collect();
        state
    }

    #[test]
    fn test_orange_step_boundaries() {
        assert_eq!(orange_multiplier_for(39.9), 1);
        assert_eq!(orange_multiplier_for(40.0), 2);
        assert_eq!(orange_multiplier_for(40.1), 2);
        assert_eq!(orange_multiplier_for(60.0), 3);
        assert_eq!(orange_multiplier_for(79.99), 3);
        assert_eq!(orange_multiplier_for(80.0), 5);
        assert_eq!(orange_multiplier_for(90.0), 8);
        assert_eq!(orange_multiplier_for(100.0), 8);
        assert_eq!(orange_step(0.0), 0);
        assert_eq!(orange_step(45.0), 1);
        assert_eq!(orange_step(95.0), 4);
    }

    #[test]
    fn test_purple_pays_flat() {
        for orange in [1, 2, 3, 5, 8] {
            assert_eq!(
                score_points(PegColor::Purple, false, HitSource::Direct, orange, 1.25),
                PURPLE_PEG_POINTS
            );
        }
    }

    #[test]
    fn test_bonus_purple_multiplied_unless_exploded() {
        assert_eq!(
            score_points(PegColor::Purple, true, HitSource::Direct, 2, 1.0),
            4_000
        );
        assert_eq!(
            score_points(PegColor::Purple, true, HitSource::Spike, 3, 1.25),
            7_500
        );
        assert_eq!(
            score_points(PegColor::Purple, true, HitSource::Explosion, 8, 1.25),
            PURPLE_PEG_POINTS
        );
    }

    #[test]
    fn test_points_are_floored() {
        // 10 * 1 * 1.25 = 12.5
        assert_eq!(score_points(PegColor::Blue, false, HitSource::Direct, 1, 1.25), 12);
        assert_eq!(score_points(PegColor::Orange, false, HitSource::Direct, 3, 1.25), 375);
    }

    #[test]
    fn test_free_ball_conversion() {
        assert_eq!(free_balls_for(23_500, FREE_BALL_THRESHOLD), (2, 3_500));
        assert_eq!(free_balls_for(9_999, FREE_BALL_THRESHOLD), (0, 9_999));
        assert_eq!(free_balls_for(10_000, FREE_BALL_THRESHOLD), (1, 0));
    }

    #[test]
    fn test_award_points_converts_shot_score() {
        let mut state = state_with(&[PegColor::Blue]);
        let mut world = RapierWorld::default();
        let mut audio = RecordingAudio::new();
        let mut cx = SimContext {
            state: &mut state,
            world: &mut world,
            audio: &mut audio,
            sfx_volume: 1.0,
        };
        award_points(&mut cx, 23_500);
        assert_eq!(state.balls_remaining, 12);
        assert_eq!(state.shot.score, 3_500);
        assert_eq!(state.score, 23_500);
        assert_eq!(audio.played(SoundEffect::FreeBall), 1);
    }

    #[test]
    fn test_repeat_hit_scores_nothing() {
        let mut state = state_with(&[PegColor::Orange, PegColor::Blue]);
        let mut world = RapierWorld::default();
        let mut audio = RecordingAudio::new();
        let mut cx = SimContext {
            state: &mut state,
            world: &mut world,
            audio: &mut audio,
            sfx_volume: 1.0,
        };
        let first = register_hit(&mut cx, 0, HitSource::Direct).unwrap();
        assert!(first.newly_hit);
        assert_eq!(first.points, ORANGE_PEG_POINTS);
        let second = register_hit(&mut cx, 0, HitSource::Direct).unwrap();
        assert!(!second.newly_hit);
        assert_eq!(second.points, 0);
        assert_eq!(cx.state.score, ORANGE_PEG_POINTS);
        // Only orange on the board is now hit
        assert_eq!(cx.state.orange_multiplier, 8);
    }

    #[test]
    fn test_hit_scored_before_multiplier_moves() {
        // 2 of 5 oranges = 40%: the second hit still pays x1
        let mut state = state_with(&[PegColor::Orange; 5]);
        let mut world = RapierWorld::default();
        let mut audio = RecordingAudio::new();
        let mut cx = SimContext {
            state: &mut state,
            world: &mut world,
            audio: &mut audio,
            sfx_volume: 1.0,
        };
        register_hit(&mut cx, 0, HitSource::Direct).unwrap();
        let second = register_hit(&mut cx, 1, HitSource::Direct).unwrap();
        assert_eq!(second.points, 100);
        assert_eq!(cx.state.orange_multiplier, 2);
        let third = register_hit(&mut cx, 2, HitSource::Direct).unwrap();
        assert_eq!(third.points, 200);
        assert_eq!(audio.track_muted(1), Some(false));
    }

    #[test]
    fn test_purple_hit_sets_shot_multiplier() {
        let mut state = state_with(&[PegColor::Purple, PegColor::Blue]);
        let mut world = RapierWorld::default();
        let mut audio = RecordingAudio::new();
        let mut cx = SimContext {
            state: &mut state,
            world: &mut world,
            audio: &mut audio,
            sfx_volume: 1.0,
        };
        let outcome = register_hit(&mut cx, 0, HitSource::Direct).unwrap();
        assert_eq!(outcome.points, PURPLE_PEG_POINTS);
        assert_eq!(cx.state.shot.purple_multiplier, PURPLE_SHOT_MULTIPLIER);
        let blue = register_hit(&mut cx, 1, HitSource::Direct).unwrap();
        assert_eq!(blue.points, 12);
    }

    #[test]
    fn test_removed_peg_is_an_error() {
        let mut state = state_with(&[PegColor::Blue]);
        state.pegs[0].removed = true;
        let mut world = RapierWorld::default();
        let mut audio = RecordingAudio::new();
        let mut cx = SimContext {
            state: &mut state,
            world: &mut world,
            audio: &mut audio,
            sfx_volume: 1.0,
        };
        assert_eq!(
            register_hit(&mut cx, 0, HitSource::Direct),
            Err(CollisionError::PegRemoved(0))
        );
        assert_eq!(
            register_hit(&mut cx, 9, HitSource::Direct),
            Err(CollisionError::MissingPeg(9))
        );
    }

    #[test]
    fn test_assign_special_types_counts() {
        let mut state = state_with(&[PegColor::Blue; 30]);
        assign_special_types(&mut state, 10);
        let count = |c: PegColor| state.pegs.iter().filter(|p| p.color == c).count();
        assert_eq!(count(PegColor::Green), 2);
        assert_eq!(count(PegColor::Orange), 10);
        assert_eq!(count(PegColor::Purple), 1);
        assert_eq!(count(PegColor::Blue), 17);
    }

    #[test]
    fn test_assign_special_types_is_seeded() {
        let mut a = state_with(&[PegColor::Blue; 30]);
        let mut b = state_with(&[PegColor::Blue; 30]);
        assign_special_types(&mut a, 10);
        assign_special_types(&mut b, 10);
        let colors = |s: &MatchState| s.pegs.iter().map(|p| p.color).collect::<Vec<_>>();
        assert_eq!(colors(&a), colors(&b));
    }

    #[test]
    fn test_reassign_purple_reverts_unhit_previous() {
        let mut state = state_with(&[PegColor::Blue; 6]);
        let first = assign_purple(&mut state).unwrap();
        let second = assign_purple(&mut state).unwrap();
        assert_ne!(first, second);
        assert_eq!(state.current_purple, Some(second));
        let purples = state
            .pegs
            .iter()
            .filter(|p| p.color == PegColor::Purple)
            .count();
        assert_eq!(purples, 1);
        assert_eq!(state.pegs[first as usize].color, PegColor::Blue);
    }

    #[test]
    fn test_lone_blue_keeps_purple() {
        let mut state = state_with(&[PegColor::Orange, PegColor::Blue]);
        assert_eq!(assign_purple(&mut state), Some(1));
        assert_eq!(assign_purple(&mut state), Some(1));
        assert_eq!(state.pegs[1].color, PegColor::Purple);
    }

    #[test]
    fn test_hit_purple_keeps_colour_until_swept() {
        let mut state = state_with(&[PegColor::Blue; 4]);
        let first = assign_purple(&mut state).unwrap();
        state.pegs[first as usize].hit = true;
        let second = assign_purple(&mut state).unwrap();
        assert_ne!(first, second);
        assert_eq!(state.pegs[first as usize].color, PegColor::Purple);
    }

    proptest! {
        #[test]
        fn prop_orange_multiplier_monotonic(a in 0.0f64..=100.0, b in 0.0f64..=100.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(orange_multiplier_for(lo) <= orange_multiplier_for(hi));
        }

        #[test]
        fn prop_free_balls_preserve_total(score in 0u64..10_000_000) {
            let (count, rest) = free_balls_for(score, FREE_BALL_THRESHOLD);
            prop_assert!(rest < FREE_BALL_THRESHOLD);
            prop_assert_eq!(count as u64 * FREE_BALL_THRESHOLD + rest, score);
        }
    }
}
