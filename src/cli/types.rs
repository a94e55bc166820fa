//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};

use super::commands::classify::ClassifyArgs;
use super::commands::init::InitArgs;
use super::commands::metrics::MetricsArgs;
use super::commands::rules::RulesArgs;
use super::commands::submit::SubmitArgs;

#[derive(Parser, Debug)]
#[command(name = "harmony")]
#[command(about = "Harmony - service request orchestration and escalation engine", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize Harmony configuration, rule table and database
    Init(InitArgs),

    /// Classify a request without running it (dry run)
    Classify(ClassifyArgs),

    /// Inspect and validate rule tables
    Rules(RulesArgs),

    /// Run one request through an in-process engine with simulated specialists
    Submit(SubmitArgs),

    /// Report harmony metrics from the event log
    Metrics(MetricsArgs),
}
