//! Network-aware compression policy.
//!
//! A capture picks its profile once, from the network hint seen at capture
//! time. The profile is never re-evaluated while the upload is pending.

use crate::constants::{
    CONSERVATIVE_MAX_DIMENSION, CONSERVATIVE_QUALITY, FOUR_G_MAX_DIMENSION, FOUR_G_QUALITY,
    MAX_QUALITY, MIN_QUALITY, SLOW_2G_MAX_DIMENSION, SLOW_2G_QUALITY, THREE_G_MAX_DIMENSION,
    THREE_G_QUALITY, TWO_G_MAX_DIMENSION, TWO_G_QUALITY,
};
use crate::formats::TargetFormat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse network class reported by the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkHint {
    Slow2g,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    FourG,
    Unknown,
}

impl NetworkHint {
    /// Total over every input: missing or unrecognised signals become `Unknown`.
    pub fn parse(raw: Option<&str>) -> NetworkHint {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("slow-2g") => NetworkHint::Slow2g,
            Some("2g") => NetworkHint::TwoG,
            Some("3g") => NetworkHint::ThreeG,
            Some("4g") => NetworkHint::FourG,
            _ => NetworkHint::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkHint::Slow2g => "slow-2g",
            NetworkHint::TwoG => "2g",
            NetworkHint::ThreeG => "3g",
            NetworkHint::FourG => "4g",
            NetworkHint::Unknown => "unknown",
        }
    }

    pub fn all() -> [NetworkHint; 5] {
        [
            NetworkHint::Slow2g,
            NetworkHint::TwoG,
            NetworkHint::ThreeG,
            NetworkHint::FourG,
            NetworkHint::Unknown,
        ]
    }
}

impl fmt::Display for NetworkHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resize and encoding parameters for one capture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionProfile {
    /// Longest edge after resizing.
    pub max_dimension_px: u32,
    /// Encoder quality in `[MIN_QUALITY, MAX_QUALITY]`.
    pub quality_factor: f32,
    pub target_format: TargetFormat,
}

impl CompressionProfile {
    pub fn new(max_dimension_px: u32, quality_factor: f32, target_format: TargetFormat) -> Self {
        Self {
            max_dimension_px: max_dimension_px.max(1),
            quality_factor: quality_factor.clamp(MIN_QUALITY, MAX_QUALITY),
            target_format,
        }
    }

    /// Quality mapped onto the 1-100 scale encoders expect.
    pub fn encoder_quality(&self) -> u8 {
        (self.quality_factor * 100.0).round().clamp(1.0, 100.0) as u8
    }

    /// Same profile with a different output encoding.
    pub fn with_format(self, target_format: TargetFormat) -> Self {
        Self {
            target_format,
            ..self
        }
    }

    pub fn is_valid(&self) -> bool {
        self.max_dimension_px > 0
            && (MIN_QUALITY..=MAX_QUALITY).contains(&self.quality_factor)
    }
}

/// Profile for a parsed network class.
pub fn profile_for(hint: NetworkHint) -> CompressionProfile {
    let (max_dimension_px, quality_factor) = match hint {
        NetworkHint::Slow2g => (SLOW_2G_MAX_DIMENSION, SLOW_2G_QUALITY),
        NetworkHint::TwoG => (TWO_G_MAX_DIMENSION, TWO_G_QUALITY),
        NetworkHint::ThreeG => (THREE_G_MAX_DIMENSION, THREE_G_QUALITY),
        NetworkHint::FourG => (FOUR_G_MAX_DIMENSION, FOUR_G_QUALITY),
        NetworkHint::Unknown => (CONSERVATIVE_MAX_DIMENSION, CONSERVATIVE_QUALITY),
    };
    CompressionProfile::new(max_dimension_px, quality_factor, TargetFormat::Jpeg)
}

/// Select a profile from a raw, possibly absent, network hint. Never fails.
///
/// # Example
/// ```
/// use capture_queue::profile::select_profile;
///
/// let slow = select_profile(Some("slow-2g"));
/// let fast = select_profile(Some("4g"));
/// assert!(slow.max_dimension_px < fast.max_dimension_px);
///
/// let fallback = select_profile(Some("satellite"));
/// assert_eq!(fallback, select_profile(None));
/// ```
pub fn select_profile(network_hint: Option<&str>) -> CompressionProfile {
    profile_for(NetworkHint::parse(network_hint))
}

/// Source of the best-effort network quality hint.
pub trait NetworkSignal: Send + Sync {
    /// Effective connection type such as `"3g"`, or `None` when unknown.
    fn effective_type(&self) -> Option<String>;
}

/// Fixed hint, e.g. from a CLI flag or a platform callback snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticNetworkSignal(pub Option<String>);

impl StaticNetworkSignal {
    pub fn new(hint: Option<&str>) -> Self {
        Self(hint.map(str::to_string))
    }
}

impl NetworkSignal for StaticNetworkSignal {
    fn effective_type(&self) -> Option<String> {
        self.0.clone()
    }
}
