//! Implementation of `harmony submit`: run one request through an
//! in-process engine backed by simulated specialists.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use uuid::Uuid;

use super::{metadata_from, parse_metadata_entry};
use crate::adapters::sqlite::{initialize_from_config, SqliteEventStore, SqliteRecordStore};
use crate::adapters::{
    DirectoryContextProvider, InMemoryRecordStore, LogNotifier, SimulatedBehavior,
    SimulatedSpecialists, WebhookNotifier,
};
use crate::cli::output::{or_dash, output, CommandOutput};
use crate::cli::table::detail_table;
use crate::domain::models::{Config, IngestPayload, RequestState};
use crate::domain::ports::{Notifier, RecordStore};
use crate::infrastructure::config::ConfigLoader;
use crate::services::{
    report_channel, Engine, EngineDeps, EventStore, InMemoryEventStore, RequestView,
};

/// How the simulated specialists respond to assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Behavior {
    Complete,
    Acknowledge,
    Decline,
    Fail,
    Silent,
    Unavailable,
}

impl From<Behavior> for SimulatedBehavior {
    fn from(behavior: Behavior) -> Self {
        match behavior {
            Behavior::Complete => Self::Complete,
            Behavior::Acknowledge => Self::AcknowledgeOnly,
            Behavior::Decline => Self::Decline,
            Behavior::Fail => Self::Fail,
            Behavior::Silent => Self::Silent,
            Behavior::Unavailable => Self::Unavailable,
        }
    }
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Request text
    pub text: String,

    /// Business context the request belongs to
    #[arg(short, long, default_value = "default")]
    pub business: String,

    /// Channel the request arrived on
    #[arg(long, default_value = "cli")]
    pub channel: String,

    /// Metadata entries as key=value (repeatable)
    #[arg(short, long = "meta", value_parser = parse_metadata_entry)]
    pub metadata: Vec<(String, serde_json::Value)>,

    /// Simulated specialist behavior
    #[arg(long, value_enum, default_value = "complete")]
    pub behavior: Behavior,

    /// Seconds to wait for the request to settle
    #[arg(short, long, default_value = "10")]
    pub wait: u64,

    /// Keep records and events in memory instead of the project database
    #[arg(long)]
    pub in_memory: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct SubmitOutput {
    pub request_id: Uuid,
    pub accepted: bool,
    pub state: Option<RequestState>,
    pub halted: bool,
    pub settled: bool,
    pub category: Option<String>,
    pub tier: Option<u8>,
    pub priority: Option<String>,
    pub plan_revision: Option<u32>,
    pub specialists: Vec<String>,
    pub ticket_id: Option<Uuid>,
    pub ticket_reason: Option<String>,
    pub breached: bool,
}

impl SubmitOutput {
    fn from_view(request_id: Uuid, view: Option<RequestView>) -> Self {
        let Some(view) = view else {
            return Self {
                request_id,
                accepted: true,
                state: None,
                halted: false,
                settled: false,
                category: None,
                tier: None,
                priority: None,
                plan_revision: None,
                specialists: vec![],
                ticket_id: None,
                ticket_reason: None,
                breached: false,
            };
        };
        Self {
            request_id,
            accepted: true,
            state: Some(view.request.state),
            halted: view.request.halted,
            settled: is_settled(&view),
            category: view.classification.as_ref().map(|c| c.category.clone()),
            tier: view.classification.as_ref().map(|c| c.tier.level()),
            priority: view.priority.as_ref().map(|p| p.class.to_string()),
            plan_revision: view.plan.as_ref().map(|p| p.revision),
            specialists: view
                .plan
                .as_ref()
                .map(|plan| {
                    plan.assignments
                        .iter()
                        .map(|a| format!("{} ({:?})", a.role, a.status).to_lowercase())
                        .collect()
                })
                .unwrap_or_default(),
            ticket_id: view.ticket.as_ref().map(|t| t.id),
            ticket_reason: view.ticket.as_ref().map(|t| t.reason.as_str().to_string()),
            breached: view.breached,
        }
    }
}

impl CommandOutput for SubmitOutput {
    fn to_human(&self) -> String {
        let mut rows = vec![
            ("Request", self.request_id.to_string()),
            ("State", or_dash(self.state.map(|s| s.as_str()))),
            ("Category", or_dash(self.category.as_deref())),
            ("Tier", or_dash(self.tier.map(|t| format!("tier-{t}")))),
            ("Priority", or_dash(self.priority.as_deref())),
            ("Plan revision", or_dash(self.plan_revision)),
            (
                "Specialists",
                if self.specialists.is_empty() {
                    "-".to_string()
                } else {
                    self.specialists.join(", ")
                },
            ),
            ("Ticket", or_dash(self.ticket_id)),
            ("Ticket reason", or_dash(self.ticket_reason.as_deref())),
        ];
        if self.halted {
            rows.push(("Halted", "yes".to_string()));
        }
        if self.breached {
            rows.push(("SLA breached", "yes".to_string()));
        }
        let mut text = detail_table(&rows).to_string();
        if !self.settled {
            text.push_str("\n\nRequest had not settled when the wait expired.");
        }
        text
    }
}

fn is_settled(view: &RequestView) -> bool {
    view.request.halted
        || view.request.state.is_terminal()
        || view.request.state == RequestState::Escalated
}

pub async fn execute(args: SubmitArgs, config: &Config, json_mode: bool) -> Result<()> {
    let result = run(args, config).await?;
    output(&result, json_mode);
    Ok(())
}

pub async fn run(args: SubmitArgs, config: &Config) -> Result<SubmitOutput> {
    let rules = ConfigLoader::load_rules(config)?;

    let (record_store, event_store): (Arc<dyn RecordStore>, Arc<dyn EventStore>) = if args.in_memory {
        (
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(InMemoryEventStore::new()),
        )
    } else {
        let pool = initialize_from_config(&config.database)
            .await
            .context("Failed to open database; run `harmony init` first")?;
        (
            Arc::new(SqliteRecordStore::new(pool.clone())),
            Arc::new(SqliteEventStore::new(pool)),
        )
    };

    let notifier: Arc<dyn Notifier> = match &config.notifications.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())?),
        None => Arc::new(LogNotifier),
    };

    let (reporter, inbox) = report_channel(64);
    let specialists = SimulatedSpecialists::new(reporter).with_default(args.behavior.into());

    let engine = Engine::start(
        config.clone(),
        rules,
        EngineDeps {
            record_store,
            event_store,
            notifier,
            dispatcher: Arc::new(specialists),
            context: Arc::new(DirectoryContextProvider::new().with_vips(config.vip_contacts.iter())),
            reports: Some(inbox),
        },
    )
    .context("Failed to start engine")?;

    let mut payload = IngestPayload::new(args.business, args.text).with_channel(args.channel);
    payload.metadata = metadata_from(args.metadata);

    let response = engine.ingest(payload).await;
    if !response.accepted {
        engine.shutdown().await;
        anyhow::bail!(
            "Request rejected: {}",
            response.reason.unwrap_or_else(|| "no reason given".to_string())
        );
    }

    let view = engine
        .wait_for(response.request_id, Duration::from_secs(args.wait), is_settled)
        .await;
    engine.shutdown().await;

    Ok(SubmitOutput::from_view(response.request_id, view))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(text: &str, behavior: Behavior) -> SubmitArgs {
        SubmitArgs {
            text: text.to_string(),
            business: "acme".to_string(),
            channel: "cli".to_string(),
            metadata: vec![],
            behavior,
            wait: 5,
            in_memory: true,
        }
    }

    #[tokio::test]
    async fn test_submit_resolves_with_completing_specialists() {
        let result = run(args("I was charged twice on my invoice", Behavior::Complete), &Config::default())
            .await
            .unwrap();
        assert!(result.settled);
        assert_eq!(result.state, Some(RequestState::Resolved));
        assert!(result.ticket_id.is_none());
        assert!(!result.specialists.is_empty());
    }

    #[tokio::test]
    async fn test_submit_legal_threat_escalates() {
        let result = run(args("I am going to sue you", Behavior::Complete), &Config::default())
            .await
            .unwrap();
        assert_eq!(result.state, Some(RequestState::Escalated));
        assert_eq!(result.tier, Some(4));
        assert!(result.ticket_id.is_some());
        assert!(result.specialists.is_empty());
    }

    #[tokio::test]
    async fn test_submit_rejects_empty_text() {
        let err = run(args("   ", Behavior::Complete), &Config::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rejected"));
    }
}
