use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LookError;

pub const LEVEL_MAX: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Preset {
    #[default]
    Estate,
    Dark,
    Corporate,
    Analog,
}

impl Preset {
    pub const ALL: [Preset; 4] = [Self::Estate, Self::Dark, Self::Corporate, Self::Analog];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Estate => "Estate",
            Self::Dark => "Dark",
            Self::Corporate => "Corporate",
            Self::Analog => "Analog",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = LookError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        Self::ALL
            .into_iter()
            .find(|preset| preset.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                LookError::InvalidInput(format!(
                    "unknown preset '{trimmed}' (expected one of Estate, Dark, Corporate, Analog)"
                ))
            })
    }
}

/// Five-axis look score produced by the analyzer, each axis in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LookMetrics {
    pub contrast: u8,
    pub saturation: u8,
    pub warmth: u8,
    pub uniformity: u8,
    pub exposure: u8,
}

impl LookMetrics {
    pub const AXES: [&'static str; 5] = [
        "contrast",
        "saturation",
        "warmth",
        "uniformity",
        "exposure",
    ];

    /// Stand-in used when analysis fails in a way the UI degrades silently.
    pub const NEUTRAL: LookMetrics = LookMetrics {
        contrast: 50,
        saturation: 50,
        warmth: 50,
        uniformity: 50,
        exposure: 50,
    };

    pub fn from_axes(values: [i64; 5]) -> Result<Self, LookError> {
        let mut checked = [0u8; 5];
        for (idx, value) in values.into_iter().enumerate() {
            checked[idx] = checked_level(Self::AXES[idx], value)?;
        }
        Ok(Self {
            contrast: checked[0],
            saturation: checked[1],
            warmth: checked[2],
            uniformity: checked[3],
            exposure: checked[4],
        })
    }

    pub fn axes(&self) -> [(&'static str, u8); 5] {
        [
            ("contrast", self.contrast),
            ("saturation", self.saturation),
            ("warmth", self.warmth),
            ("uniformity", self.uniformity),
            ("exposure", self.exposure),
        ]
    }
}

/// Live grading controls; every version keeps a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingParams {
    pub intensity: u8,
    pub shadows: u8,
    pub highlights: u8,
    pub preset: Preset,
}

impl Default for GradingParams {
    fn default() -> Self {
        Self {
            intensity: 80,
            shadows: 50,
            highlights: 50,
            preset: Preset::Estate,
        }
    }
}

impl GradingParams {
    pub fn set_intensity(&mut self, value: i64) -> Result<(), LookError> {
        self.intensity = checked_level("intensity", value)?;
        Ok(())
    }

    pub fn set_shadows(&mut self, value: i64) -> Result<(), LookError> {
        self.shadows = checked_level("shadows", value)?;
        Ok(())
    }

    pub fn set_highlights(&mut self, value: i64) -> Result<(), LookError> {
        self.highlights = checked_level("highlights", value)?;
        Ok(())
    }

    pub fn with_preset(mut self, preset: Preset) -> Self {
        self.preset = preset;
        self
    }

    pub fn with_intensity(mut self, value: i64) -> Result<Self, LookError> {
        self.set_intensity(value)?;
        Ok(self)
    }
}

pub fn checked_level(name: &str, value: i64) -> Result<u8, LookError> {
    if (0..=i64::from(LEVEL_MAX)).contains(&value) {
        return Ok(value as u8);
    }
    Err(LookError::InvalidInput(format!(
        "{name} must be within 0..=100 (got {value})"
    )))
}
