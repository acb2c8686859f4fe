//! Table output for CLI commands, using comfy-table.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use super::truncate;
use crate::domain::models::{ConnectionTier, PolicyTable, QueuedAction};

/// Table formatter for CLI output
pub struct TableFormatter {
    use_colors: bool,
    max_width: Option<u16>,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    pub const fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    /// One row per tier, best tier first.
    pub fn format_policy(&self, table_rows: &PolicyTable) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&[
            "Tier",
            "Concurrency",
            "Timeout (ms)",
            "Attempts",
            "Backoff (ms)",
            "Cache TTL (ms)",
            "Prefetch",
        ]));

        for tier in ConnectionTier::ALL {
            let row = table_rows.row(tier);
            table.add_row(vec![
                self.tier_cell(tier),
                Cell::new(row.max_concurrent_requests),
                Cell::new(row.request_timeout_ms),
                Cell::new(row.max_retry_attempts),
                Cell::new(format!("{}..{}", row.backoff_base_ms, row.backoff_cap_ms)),
                Cell::new(row.cache_ttl_ms),
                Cell::new(if row.enable_speculative_prefetch { "yes" } else { "no" }),
            ]);
        }

        table.to_string()
    }

    pub fn format_actions(&self, actions: &[QueuedAction]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&[
            "ID", "Method", "Endpoint", "Enqueued", "Attempts", "Last error",
        ]));

        for action in actions {
            let attempts = format!("{}/{}", action.attempt_count, action.max_attempts);
            let attempts_cell = if self.use_colors && action.attempt_count > 0 {
                Cell::new(attempts).fg(Color::Yellow)
            } else {
                Cell::new(attempts)
            };

            table.add_row(vec![
                Cell::new(&action.id.to_string()[..8]),
                Cell::new(action.method.as_str()),
                Cell::new(truncate(&action.endpoint, 40)),
                Cell::new(action.enqueued_at.format("%Y-%m-%d %H:%M:%S").to_string()),
                attempts_cell,
                Cell::new(truncate(action.last_error.as_deref().unwrap_or("-"), 40)),
            ]);
        }

        table.to_string()
    }

    fn tier_cell(&self, tier: ConnectionTier) -> Cell {
        if self.use_colors {
            Cell::new(tier.as_str()).fg(tier_color(tier))
        } else {
            Cell::new(tier.as_str())
        }
    }

    fn create_base_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        if let Some(width) = self.max_width {
            table.set_width(width);
        }

        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn header(titles: &[&str]) -> Vec<Cell> {
    titles
        .iter()
        .map(|t| Cell::new(t).add_attribute(Attribute::Bold))
        .collect()
}

/// Respects `NO_COLOR` and dumb terminals.
fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}

pub const fn tier_color(tier: ConnectionTier) -> Color {
    match tier {
        ConnectionTier::Fast => Color::Green,
        ConnectionTier::Moderate => Color::Cyan,
        ConnectionTier::Slow => Color::Yellow,
        ConnectionTier::Offline => Color::Red,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ScheduledRequest, TargetDescriptor};

    #[test]
    fn test_policy_table_lists_every_tier() {
        let rendered = TableFormatter::with_config(false, Some(120)).format_policy(&PolicyTable::default());
        for tier in ConnectionTier::ALL {
            assert!(rendered.contains(tier.as_str()));
        }
    }

    #[test]
    fn test_actions_table() {
        let request = ScheduledRequest::mutation(TargetDescriptor::post("/maintenance")).durable();
        let action = QueuedAction::from_request(&request, 5);

        let rendered = TableFormatter::with_config(false, Some(160)).format_actions(&[action.clone()]);
        assert!(rendered.contains(&action.id.to_string()[..8]));
        assert!(rendered.contains("/maintenance"));
        assert!(rendered.contains("0/5"));
    }
}
