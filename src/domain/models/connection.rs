//! Connection quality model and classification.
//!
//! The host platform reports raw signals (an online/offline flag and, when
//! available, link-quality hints). `classify` turns them into one of four
//! tiers that drive every adaptive decision downstream.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Downlink below this is classified `Slow`.
pub const SLOW_DOWNLINK_MBPS: f64 = 1.0;
/// Downlink below this (and at least `SLOW_DOWNLINK_MBPS`) is `Moderate`.
pub const MODERATE_DOWNLINK_MBPS: f64 = 5.0;
/// Round trips above this are classified `Slow`.
pub const SLOW_RTT_MS: u32 = 1_000;
/// Round trips above this (and at most `SLOW_RTT_MS`) are `Moderate`.
pub const MODERATE_RTT_MS: u32 = 300;

/// Discrete connection-quality class, ordered worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionTier {
    Offline,
    Slow,
    Moderate,
    Fast,
}

impl ConnectionTier {
    pub const ALL: [Self; 4] = [Self::Fast, Self::Moderate, Self::Slow, Self::Offline];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Slow => "slow",
            Self::Moderate => "moderate",
            Self::Fast => "fast",
        }
    }

    /// Tiers where the offline queue holds back and waits.
    pub const fn is_degraded(self) -> bool {
        matches!(self, Self::Offline | Self::Slow)
    }
}

impl fmt::Display for ConnectionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse radio generation reported by the host, when it has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EffectiveType {
    #[serde(rename = "slow-2g")]
    Slow2g,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    FourG,
}

impl EffectiveType {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "slow-2g" => Some(Self::Slow2g),
            "2g" => Some(Self::TwoG),
            "3g" => Some(Self::ThreeG),
            "4g" => Some(Self::FourG),
            _ => None,
        }
    }

    const fn tier(self) -> ConnectionTier {
        match self {
            Self::Slow2g | Self::TwoG => ConnectionTier::Slow,
            Self::ThreeG => ConnectionTier::Moderate,
            Self::FourG => ConnectionTier::Fast,
        }
    }
}

/// Link-quality hints. Every field is optional because hosts expose
/// different subsets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkQuality {
    pub effective_type: Option<EffectiveType>,
    pub downlink_mbps: Option<f64>,
    pub rtt_ms: Option<u32>,
    /// The user asked for reduced data usage.
    #[serde(default)]
    pub save_data: bool,
}

/// Raw signals as handed over by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSignals {
    /// Explicit online/offline flag, `None` when the host has no such signal.
    pub online: Option<bool>,
    pub link: Option<LinkQuality>,
}

impl NetworkSignals {
    pub fn online() -> Self {
        Self {
            online: Some(true),
            link: None,
        }
    }

    pub fn offline() -> Self {
        Self {
            online: Some(false),
            link: None,
        }
    }

    pub fn with_link(mut self, link: LinkQuality) -> Self {
        self.link = Some(link);
        self
    }
}

/// Classified connection state. Produced only by the connection monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub tier: ConnectionTier,
    pub online: bool,
    pub downlink_mbps: Option<f64>,
    pub round_trip_ms: Option<u32>,
    pub reduced_data_requested: bool,
}

impl ConnectionProfile {
    pub fn from_signals(signals: &NetworkSignals) -> Self {
        let link = signals.link.as_ref();
        Self {
            tier: classify(signals),
            online: signals.online.unwrap_or(true),
            downlink_mbps: link.and_then(|l| l.downlink_mbps),
            round_trip_ms: link.and_then(|l| l.rtt_ms),
            reduced_data_requested: link.is_some_and(|l| l.save_data),
        }
    }
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        Self::from_signals(&NetworkSignals::default())
    }
}

/// Total, deterministic classification of host signals.
///
/// - an explicit offline flag always yields `Offline`
/// - with no link hints the tier is `Moderate`
/// - otherwise the worst of the available indicators wins
/// - `save_data` caps the result at `Slow`
pub fn classify(signals: &NetworkSignals) -> ConnectionTier {
    if signals.online == Some(false) {
        return ConnectionTier::Offline;
    }

    let Some(link) = signals.link.as_ref() else {
        return ConnectionTier::Moderate;
    };

    let indicators = [
        link.effective_type.map(EffectiveType::tier),
        link.downlink_mbps.map(downlink_tier),
        link.rtt_ms.map(rtt_tier),
    ];

    let tier = indicators
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(ConnectionTier::Moderate);

    if link.save_data {
        tier.min(ConnectionTier::Slow)
    } else {
        tier
    }
}

fn downlink_tier(mbps: f64) -> ConnectionTier {
    // NaN and negative readings are treated as no bandwidth at all.
    if mbps.is_nan() || mbps < SLOW_DOWNLINK_MBPS {
        ConnectionTier::Slow
    } else if mbps < MODERATE_DOWNLINK_MBPS {
        ConnectionTier::Moderate
    } else {
        ConnectionTier::Fast
    }
}

const fn rtt_tier(rtt_ms: u32) -> ConnectionTier {
    if rtt_ms > SLOW_RTT_MS {
        ConnectionTier::Slow
    } else if rtt_ms > MODERATE_RTT_MS {
        ConnectionTier::Moderate
    } else {
        ConnectionTier::Fast
    }
}
