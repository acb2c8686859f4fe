//! `seaworthy policy`: the resolved per-tier behaviour table.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::output::table::TableFormatter;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{BehaviorConfig, Config, ConnectionTier, PolicyTable};
use crate::services::AdaptiveConfigResolver;

#[derive(Args, Debug, Default)]
pub struct PolicyArgs {
    /// Print the table as a `policy:` block for config.yaml (overrides --json)
    #[arg(long)]
    pub yaml: bool,
}

#[derive(Debug, Serialize)]
pub struct PolicyRow {
    pub tier: ConnectionTier,
    #[serde(flatten)]
    pub config: BehaviorConfig,
}

#[derive(Debug, Serialize)]
pub struct PolicyOutput {
    pub tiers: Vec<PolicyRow>,
    #[serde(skip)]
    resolver: AdaptiveConfigResolver,
}

impl PolicyOutput {
    pub fn new(resolver: AdaptiveConfigResolver) -> Self {
        let tiers = ConnectionTier::ALL
            .into_iter()
            .map(|tier| PolicyRow {
                tier,
                config: resolver.resolve(tier),
            })
            .collect();
        Self { tiers, resolver }
    }
}

impl CommandOutput for PolicyOutput {
    fn to_human(&self) -> String {
        TableFormatter::new().format_policy(self.resolver.table())
    }
}

/// Render the table under a top-level `policy` key.
pub fn policy_yaml(table: &PolicyTable) -> Result<String> {
    #[derive(Serialize)]
    struct Document<'a> {
        policy: &'a PolicyTable,
    }

    serde_yaml::to_string(&Document { policy: table }).context("Failed to render policy as YAML")
}

pub fn execute(args: &PolicyArgs, config: &Config, json_mode: bool) -> Result<()> {
    if args.yaml {
        print!("{}", policy_yaml(&config.policy)?);
        return Ok(());
    }

    let resolver = AdaptiveConfigResolver::with_table(config.policy.clone());
    output(&PolicyOutput::new(resolver), json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_lists_tiers_best_first() {
        let out = PolicyOutput::new(AdaptiveConfigResolver::new());
        let json = out.to_json();

        let tiers: Vec<_> = json["tiers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row["tier"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(tiers, vec!["fast", "moderate", "slow", "offline"]);
        assert_eq!(json["tiers"][0]["max_concurrent_requests"], 6);
    }

    #[test]
    fn test_yaml_round_trips_through_config() {
        let mut table = PolicyTable::default();
        table.slow.max_retry_attempts = 9;

        let rendered = policy_yaml(&table).unwrap();
        assert!(rendered.starts_with("policy:"));

        let config: Config = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(config.policy, table);
    }
}
