//! Level descriptors
//!
//! A level is a list of peg descriptors plus the number of pegs that should
//! become orange. Colour roles are not part of the file: the simulation rolls
//! them itself from the seeded generator when the level is loaded.

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::LevelError;

/// Peg body type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PegType {
    #[default]
    Round,
    Brick,
    /// Round peg that drops a bomb when hit
    Bomb,
}

/// Size class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PegSize {
    /// Removed immediately on first hit
    Small,
    #[default]
    Normal,
}

/// Surface response class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BounceType {
    #[default]
    Normal,
    Super,
}

impl BounceType {
    pub fn restitution(self) -> f32 {
        match self {
            BounceType::Normal => PEG_RESTITUTION,
            BounceType::Super => SUPER_BOUNCE_RESTITUTION,
        }
    }
}

/// One peg as stored in a level file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PegDescriptor {
    pub x: f32,
    pub y: f32,
    #[serde(rename = "type", default)]
    pub peg_type: PegType,
    #[serde(default)]
    pub size: PegSize,
    /// Display tint passed through to the renderer
    #[serde(default)]
    pub color: Option<String>,
    /// Radians, bricks only
    #[serde(default)]
    pub rotation: f32,
    #[serde(default)]
    pub bounce_type: BounceType,
}

impl PegDescriptor {
    pub fn round(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            peg_type: PegType::Round,
            size: PegSize::Normal,
            color: None,
            rotation: 0.0,
            bounce_type: BounceType::Normal,
        }
    }

    /// Bombs never take a colour role
    pub fn can_be_special(&self) -> bool {
        self.peg_type != PegType::Bomb
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    #[serde(default)]
    pub name: String,
    pub orange_count: usize,
    pub pegs: Vec<PegDescriptor>,
}

impl Level {
    /// Parse and validate a level file
    pub fn from_json(json: &str) -> Result<Self, LevelError> {
        let level: Level = serde_json::from_str(json)?;
        level.validate()?;
        Ok(level)
    }

    /// Pegs needed for the colour roles: oranges, greens and one purple
    pub fn required_pegs(&self) -> usize {
        self.orange_count + GREEN_PEGS_PER_LEVEL + 1
    }

    pub fn validate(&self) -> Result<(), LevelError> {
        if self.pegs.is_empty() {
            return Err(LevelError::NoPegs);
        }

        let x_limit = BOARD_HALF_WIDTH - WALL_THICKNESS / 2.0;
        for (index, peg) in self.pegs.iter().enumerate() {
            if !(peg.x.is_finite() && peg.y.is_finite() && peg.rotation.is_finite()) {
                return Err(LevelError::InvalidPeg {
                    index,
                    reason: "non-finite coordinate".to_string(),
                });
            }
            if peg.x.abs() > x_limit || peg.y <= BUCKET_Y || peg.y >= BOARD_HEIGHT {
                return Err(LevelError::InvalidPeg {
                    index,
                    reason: format!("({}, {}) lies outside the board", peg.x, peg.y),
                });
            }
        }

        let available = self.pegs.iter().filter(|p| p.can_be_special()).count();
        let required = self.required_pegs();
        if available < required {
            return Err(LevelError::NotEnoughPegs {
                required,
                available,
            });
        }
        Ok(())
    }

    /// Built-in staggered grid used by the headless runner and tests
    pub fn demo() -> Self {
        let mut pegs = Vec::new();
        for row in 0..8 {
            let y = 160.0 + row as f32 * 45.0;
            let (start, count) = if row % 2 == 0 { (-330.0, 12) } else { (-300.0, 11) };
            for col in 0..count {
                let x = start + col as f32 * 60.0;
                let peg_type = if row == 4 && (col == 2 || col == count - 3) {
                    PegType::Bomb
                } else if row == 2 {
                    PegType::Brick
                } else {
                    PegType::Round
                };
                let rotation = match (peg_type, col % 2) {
                    (PegType::Brick, 0) => 0.3,
                    (PegType::Brick, _) => -0.3,
                    _ => 0.0,
                };
                let size = if row == 6 && col % 3 == 0 {
                    PegSize::Small
                } else {
                    PegSize::Normal
                };
                let bounce_type = if row == 0 && (col == 0 || col == count - 1) {
                    BounceType::Super
                } else {
                    BounceType::Normal
                };
                pegs.push(PegDescriptor {
                    x,
                    y,
                    peg_type,
                    size,
                    color: None,
                    rotation,
                    bounce_type,
                });
            }
        }
        Level {
            name: "Demo".to_string(),
            orange_count: 20,
            pegs,
        }
    }
}
