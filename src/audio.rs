//! Audio contract
//!
//! The simulation never waits on audio: it asks a sink to play a sound and
//! moves on. Music is a stack of layers that are muted or unmuted as the
//! orange multiplier climbs.

use serde::{Deserialize, Serialize};

/// Sound effect types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoundEffect {
    /// Ball launched
    Launch,
    /// Ball hits a blue peg
    PegHit,
    /// Ball hits an orange peg
    OrangeHit,
    /// Ball hits the purple peg
    PurpleHit,
    /// Ball hits a green peg (power trigger)
    PowerActivate,
    /// Ball hits a wall or bucket rim
    WallHit,
    /// Ball dropped into the bucket
    BucketCatch,
    /// Free ball awarded
    FreeBall,
    /// Roulette tick
    RouletteTick,
    /// Roulette result
    RouletteResult,
    /// Quill volley
    QuillVolley,
    /// Rocket thrust (looped while held)
    RocketThrust,
    /// Paddle bounce
    PaddleBounce,
    BombExplode,
    LevelClear,
    GameOver,
}

/// Number of music layers above the base track
pub const MUSIC_LAYERS: u8 = 4;

/// Playback options
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayOptions {
    /// 0.0 - 1.0
    pub volume: f32,
    pub looped: bool,
}

impl PlayOptions {
    pub fn once(volume: f32) -> Self {
        Self {
            volume,
            looped: false,
        }
    }

    pub fn looped(volume: f32) -> Self {
        Self {
            volume,
            looped: true,
        }
    }
}

/// Handle to a playing sound that can be stopped later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SoundHandle(pub u32);

/// Fire-and-forget audio backend
pub trait AudioSink {
    /// Start a sound; a handle is returned only when the backend can stop it
    fn play_sound(&mut self, effect: SoundEffect, options: PlayOptions) -> Option<SoundHandle>;
    fn stop(&mut self, handle: SoundHandle);
    /// Mute or unmute music layer `track` (1-based)
    fn set_track_muted(&mut self, track: u8, muted: bool);
}

/// Effective volume from the two sliders
pub fn mix_volume(master: f32, sfx: f32, muted: bool) -> f32 {
    if muted {
        0.0
    } else {
        master.clamp(0.0, 1.0) * sfx.clamp(0.0, 1.0)
    }
}

/// Unmute layers up to `step` (0 = base track only)
pub fn apply_music_layers(sink: &mut dyn AudioSink, step: usize) {
    for track in 1..=MUSIC_LAYERS {
        sink.set_track_muted(track, usize::from(track) > step);
    }
}

/// Discards everything (headless runs)
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAudio;

impl AudioSink for NullAudio {
    fn play_sound(&mut self, _effect: SoundEffect, _options: PlayOptions) -> Option<SoundHandle> {
        None
    }

    fn stop(&mut self, _handle: SoundHandle) {}

    fn set_track_muted(&mut self, _track: u8, _muted: bool) {}
}

/// One call made against a [`RecordingAudio`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AudioCall {
    Play {
        effect: SoundEffect,
        options: PlayOptions,
        handle: SoundHandle,
    },
    Stop(SoundHandle),
    Track { track: u8, muted: bool },
}

/// Keeps a log of every call; used by tests and replay tooling
#[derive(Debug, Clone, Default)]
pub struct RecordingAudio {
    pub calls: Vec<AudioCall>,
    next_handle: u32,
}

impl RecordingAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self, effect: SoundEffect) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, AudioCall::Play { effect: e, .. } if *e == effect))
            .count()
    }

    /// Last mute state written for `track`
    pub fn track_muted(&self, track: u8) -> Option<bool> {
        self.calls.iter().rev().find_map(|c| match c {
            AudioCall::Track { track: t, muted } if *t == track => Some(*muted),
            _ => None,
        })
    }

    /// Looped sounds started and not yet stopped
    pub fn active_loops(&self) -> Vec<SoundHandle> {
        let mut active = Vec::new();
        for call in &self.calls {
            match call {
                AudioCall::Play {
                    options, handle, ..
                } if options.looped => active.push(*handle),
                AudioCall::Stop(handle) => active.retain(|h| h != handle),
                _ => {}
            }
        }
        active
    }
}

impl AudioSink for RecordingAudio {
    fn play_sound(&mut self, effect: SoundEffect, options: PlayOptions) -> Option<SoundHandle> {
        self.next_handle += 1;
        let handle = SoundHandle(self.next_handle);
        self.calls.push(AudioCall::Play {
            effect,
            options,
            handle,
        });
        Some(handle)
    }

    fn stop(&mut self, handle: SoundHandle) {
        self.calls.push(AudioCall::Stop(handle));
    }

    fn set_track_muted(&mut self, track: u8, muted: bool) {
        self.calls.push(AudioCall::Track { track, muted });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_music_layers_follow_step() {
        let mut audio = RecordingAudio::new();
        apply_music_layers(&mut audio, 2);
        assert_eq!(audio.track_muted(1), Some(false));
        assert_eq!(audio.track_muted(2), Some(false));
        assert_eq!(audio.track_muted(3), Some(true));
        assert_eq!(audio.track_muted(4), Some(true));

        apply_music_layers(&mut audio, 0);
        assert_eq!(audio.track_muted(1), Some(true));
    }

    #[test]
    fn test_active_loops_tracks_stop() {
        let mut audio = RecordingAudio::new();
        let handle = audio
            .play_sound(SoundEffect::RocketThrust, PlayOptions::looped(1.0))
            .unwrap();
        audio.play_sound(SoundEffect::PegHit, PlayOptions::once(1.0));
        assert_eq!(audio.active_loops(), vec![handle]);
        audio.stop(handle);
        assert!(audio.active_loops().is_empty());
        assert_eq!(audio.played(SoundEffect::PegHit), 1);
    }

    #[test]
    fn test_mix_volume() {
        assert_eq!(mix_volume(0.5, 0.5, false), 0.25);
        assert_eq!(mix_volume(1.0, 1.0, true), 0.0);
        assert_eq!(mix_volume(2.0, 1.0, false), 1.0);
    }
}
