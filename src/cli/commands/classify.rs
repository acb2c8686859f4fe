//! `seaworthy classify`: classify a set of network signals.

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{
    BehaviorConfig, Config, ConnectionProfile, EffectiveType, LinkQuality, NetworkSignals,
};
use crate::services::AdaptiveConfigResolver;

#[derive(Args, Debug, Default)]
pub struct ClassifyArgs {
    /// The host reports no connectivity
    #[arg(long)]
    pub offline: bool,

    /// Radio generation: slow-2g, 2g, 3g or 4g
    #[arg(long)]
    pub effective_type: Option<String>,

    /// Estimated downlink in Mbps
    #[arg(long)]
    pub downlink: Option<f64>,

    /// Estimated round-trip time in milliseconds
    #[arg(long)]
    pub rtt: Option<u32>,

    /// The user asked for reduced data usage
    #[arg(long)]
    pub save_data: bool,
}

impl ClassifyArgs {
    pub fn to_signals(&self) -> Result<NetworkSignals> {
        let effective_type = match &self.effective_type {
            Some(raw) => match EffectiveType::from_str(raw) {
                Some(parsed) => Some(parsed),
                None => bail!("Unknown effective type '{raw}'. Use slow-2g, 2g, 3g or 4g"),
            },
            None => None,
        };

        let has_link = effective_type.is_some()
            || self.downlink.is_some()
            || self.rtt.is_some()
            || self.save_data;

        Ok(NetworkSignals {
            online: Some(!self.offline),
            link: has_link.then(|| LinkQuality {
                effective_type,
                downlink_mbps: self.downlink,
                rtt_ms: self.rtt,
                save_data: self.save_data,
            }),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ClassifyOutput {
    pub profile: ConnectionProfile,
    pub behavior: BehaviorConfig,
}

impl CommandOutput for ClassifyOutput {
    fn to_human(&self) -> String {
        let p = &self.profile;
        let b = &self.behavior;
        let mut lines = vec![
            format!("Tier: {}", p.tier),
            format!("Online: {}", p.online),
        ];
        if let Some(downlink) = p.downlink_mbps {
            lines.push(format!("Downlink: {downlink} Mbps"));
        }
        if let Some(rtt) = p.round_trip_ms {
            lines.push(format!("Round trip: {rtt} ms"));
        }
        if p.reduced_data_requested {
            lines.push("Reduced data requested".to_string());
        }
        lines.push(String::new());
        lines.push(format!("Max concurrent requests: {}", b.max_concurrent_requests));
        lines.push(format!("Request timeout: {} ms", b.request_timeout_ms));
        lines.push(format!("Max attempts: {}", b.max_retry_attempts));
        lines.push(format!("Backoff: {}..{} ms", b.backoff_base_ms, b.backoff_cap_ms));
        lines.push(format!("Cache TTL: {} ms", b.cache_ttl_ms));
        lines.push(format!("Speculative prefetch: {}", b.enable_speculative_prefetch));
        lines.join("\n")
    }
}

pub fn execute(args: &ClassifyArgs, config: &Config, json_mode: bool) -> Result<()> {
    let signals = args.to_signals()?;
    let profile = ConnectionProfile::from_signals(&signals);
    let behavior = AdaptiveConfigResolver::with_table(config.policy.clone()).resolve(profile.tier);

    output(&ClassifyOutput { profile, behavior }, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ConnectionTier;

    fn classify(args: &ClassifyArgs) -> ConnectionTier {
        ConnectionProfile::from_signals(&args.to_signals().unwrap()).tier
    }

    #[test]
    fn test_no_link_hints_is_moderate() {
        assert_eq!(classify(&ClassifyArgs::default()), ConnectionTier::Moderate);
    }

    #[test]
    fn test_offline_flag_wins() {
        let args = ClassifyArgs {
            offline: true,
            downlink: Some(100.0),
            ..ClassifyArgs::default()
        };
        assert_eq!(classify(&args), ConnectionTier::Offline);
    }

    #[test]
    fn test_effective_type_is_parsed() {
        let args = ClassifyArgs {
            effective_type: Some("2G".to_string()),
            ..ClassifyArgs::default()
        };
        assert_eq!(classify(&args), ConnectionTier::Slow);

        let bad = ClassifyArgs {
            effective_type: Some("5g".to_string()),
            ..ClassifyArgs::default()
        };
        assert!(bad.to_signals().is_err());
    }
}
