//! Replay data model.
//!
//! A replay is a seed, the player's starting state, and a frame-ordered log
//! of input edges. Playing it back through the same build reproduces the
//! stage frame for frame; the simulation itself never reads the wall clock.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Game keys the simulation understands. This is the full input surface of
/// the core; menus and system keys live outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameKey {
    Up,
    Down,
    Left,
    Right,
    Focus,
    Shot,
    Bomb,
    Skip,
}

/// A single input edge: `key` went down or up on `frame`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplayEvent {
    pub frame: i32,
    pub key: GameKey,
    pub down: bool,
}

/// Player state at stage start, as recorded in the replay header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInit {
    pub pos: [f32; 2],
    pub lives: i32,
    pub bombs: i32,
    pub power: i32,
    pub shot_mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replay {
    pub seed: u64,
    pub stage: u16,
    pub player: PlayerInit,
    pub events: Vec<ReplayEvent>,
}

#[derive(Debug)]
pub enum ReplayError {
    Io(String),
    Parse(String),
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "replay IO error: {}", msg),
            Self::Parse(msg) => write!(f, "replay parse error: {}", msg),
        }
    }
}

impl Replay {
    pub fn new(seed: u64, stage: u16, player: PlayerInit) -> Self {
        Self { seed, stage, player, events: Vec::new() }
    }

    /// Record an input edge. Frames must be non-decreasing; the recorder is
    /// driven once per frame so this holds by construction.
    pub fn push(&mut self, frame: i32, key: GameKey, down: bool) {
        debug_assert!(self.events.last().map_or(true, |e| e.frame <= frame));
        self.events.push(ReplayEvent { frame, key, down });
    }

    /// All edges recorded for `frame`, in recording order.
    pub fn events_at(&self, frame: i32) -> impl Iterator<Item = &ReplayEvent> {
        self.events.iter().filter(move |e| e.frame == frame)
    }

    pub fn save(&self, path: &Path) -> Result<(), ReplayError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ReplayError::Parse(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| ReplayError::Io(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ReplayError::Io(e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| ReplayError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_player() -> PlayerInit {
        PlayerInit {
            pos: [240.0, 540.0],
            lives: 2,
            bombs: 3,
            power: 0,
            shot_mode: "standard".to_string(),
        }
    }

    #[test]
    fn test_events_at_filters_by_frame() {
        let mut rpy = Replay::new(1, 1, sample_player());
        rpy.push(10, GameKey::Shot, true);
        rpy.push(10, GameKey::Left, true);
        rpy.push(25, GameKey::Shot, false);
        let at10: Vec<_> = rpy.events_at(10).collect();
        assert_eq!(at10.len(), 2);
        assert_eq!(at10[0].key, GameKey::Shot);
        assert_eq!(rpy.events_at(11).count(), 0);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut rpy = Replay::new(0xDEAD, 3, sample_player());
        rpy.push(0, GameKey::Shot, true);
        rpy.push(120, GameKey::Bomb, true);
        rpy.push(121, GameKey::Bomb, false);
        let json = serde_json::to_string(&rpy).unwrap();
        let back: Replay = serde_json::from_str(&json).unwrap();
        assert_eq!(back.seed, 0xDEAD);
        assert_eq!(back.stage, 3);
        assert_eq!(back.events.len(), 3);
        assert_eq!(back.events[1].key, GameKey::Bomb);
    }
}
