//! Background effect definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Effects that can be applied to the background of a video.
///
/// The set is closed: each variant has exactly one renderer in
/// `backdrop-media`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    /// Luma-only background with a slight contrast lift
    #[default]
    Grayscale,
    /// Warm brown tone
    Sepia,
    /// Gaussian blur (depth-of-field look)
    Blur,
}

impl Effect {
    /// All available effects, in display order.
    pub const ALL: &'static [Effect] = &[Effect::Grayscale, Effect::Sepia, Effect::Blur];

    /// Tag used in requests, cache keys and filenames.
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Grayscale => "grayscale",
            Effect::Sepia => "sepia",
            Effect::Blur => "blur",
        }
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Effect::Grayscale => "Grayscale",
            Effect::Sepia => "Sepia",
            Effect::Blur => "Blur",
        }
    }

    /// Short description for filter pickers.
    pub fn description(&self) -> &'static str {
        match self {
            Effect::Grayscale => "Convert background to grayscale",
            Effect::Sepia => "Apply sepia tone to background",
            Effect::Blur => "Blur the background",
        }
    }

    /// Describe this effect for listing endpoints.
    pub fn info(&self) -> EffectInfo {
        EffectInfo {
            id: self.as_str().to_string(),
            name: self.display_name().to_string(),
            description: self.description().to_string(),
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Effect {
    type Err = EffectParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "grayscale" | "greyscale" => Ok(Effect::Grayscale),
            "sepia" => Ok(Effect::Sepia),
            "blur" => Ok(Effect::Blur),
            _ => Err(EffectParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown effect: {0}")]
pub struct EffectParseError(String);

/// Listing entry for an effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectInfo {
    pub id: String,
    pub name: String,
    pub description: String,
}
