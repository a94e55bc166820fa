//! Implementation of `harmony metrics`: harmony aggregates over the
//! persisted event log.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use crate::adapters::sqlite::{initialize_from_config, SqliteEventStore};
use crate::cli::output::{output, CommandOutput};
use crate::cli::table::{detail_table, list_table};
use crate::domain::models::{Config, PriorityClass};
use crate::services::{EventStore, HarmonyMetrics, HarmonyMonitor};

#[derive(Args, Debug)]
pub struct MetricsArgs {
    /// Rolling window in hours for rates and resolution times
    #[arg(short, long, default_value = "24")]
    pub window_hours: u64,
}

#[derive(Debug, serde::Serialize)]
pub struct MetricsOutput {
    #[serde(flatten)]
    pub metrics: HarmonyMetrics,
}

impl CommandOutput for MetricsOutput {
    fn to_human(&self) -> String {
        let m = &self.metrics;
        let summary = detail_table(&[
            ("Health", m.health.to_string()),
            ("Window", format!("{}h", m.window_secs / 3600)),
            ("Active requests", m.active_total().to_string()),
            ("Open tickets", m.active_tickets.to_string()),
            ("Halted requests", m.halted_requests.to_string()),
            ("Received", m.received_in_window.to_string()),
            ("Resolved", m.resolved_in_window.to_string()),
            ("Breached", m.breached_in_window.to_string()),
            ("Breach rate", format!("{:.1}%", m.breach_rate * 100.0)),
            ("Resolution rate", format!("{:.1}%", m.resolution_rate * 100.0)),
            (
                "Persistence",
                if m.persistence_degraded { "degraded" } else { "ok" }.to_string(),
            ),
        ]);

        let mut by_class = list_table(&["priority", "active", "mean resolution"]);
        for class in PriorityClass::ALL {
            let active = m.active_requests.get(&class).copied().unwrap_or(0);
            let mttr = m
                .mean_time_to_resolution_secs
                .get(&class)
                .map_or_else(|| "-".to_string(), |secs| format_secs(*secs));
            by_class.add_row(vec![class.to_string(), active.to_string(), mttr]);
        }

        format!("{summary}\n\n{by_class}")
    }
}

fn format_secs(secs: f64) -> String {
    if secs >= 3600.0 {
        format!("{:.1}h", secs / 3600.0)
    } else if secs >= 60.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{secs:.1}s")
    }
}

pub async fn execute(args: MetricsArgs, config: &Config, json_mode: bool) -> Result<()> {
    let pool = initialize_from_config(&config.database)
        .await
        .context("Failed to open database; run `harmony init` first")?;
    let store: Arc<dyn EventStore> = Arc::new(SqliteEventStore::new(pool));
    let metrics = report(store, args.window_hours).await?;
    output(&metrics, json_mode);
    Ok(())
}

pub async fn report(store: Arc<dyn EventStore>, window_hours: u64) -> Result<MetricsOutput> {
    let window = Duration::from_secs(window_hours.max(1) * 3600);
    let metrics = HarmonyMonitor::new(store)
        .get_metrics(window)
        .await
        .context("Failed to read the event log")?;
    Ok(MetricsOutput { metrics })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryEventStore;

    #[test]
    fn test_format_secs() {
        assert_eq!(format_secs(42.0), "42.0s");
        assert_eq!(format_secs(90.0), "1.5m");
        assert_eq!(format_secs(5400.0), "1.5h");
    }

    #[tokio::test]
    async fn test_report_on_empty_log_is_harmonious() {
        let output = report(Arc::new(InMemoryEventStore::new()), 24).await.unwrap();
        assert_eq!(output.metrics.active_total(), 0);
        assert_eq!(output.metrics.breach_rate, 0.0);
        assert_eq!(output.metrics.window_secs, 24 * 3600);
        let human = output.to_human();
        assert!(human.contains("harmonious"));
        assert!(human.contains("PRIORITY"));
    }
}
