//! Implementation of the `harmony init` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tokio::fs;

use crate::adapters::sqlite::initialize_database;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, RuleBook};
use crate::infrastructure::config::PROJECT_DIR;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Force reinitialization even if already initialized
    #[arg(long, short)]
    pub force: bool,

    /// Target directory (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[derive(Debug, serde::Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub message: String,
    pub initialized_path: PathBuf,
    pub files_written: Vec<String>,
    pub database_initialized: bool,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        if !self.files_written.is_empty() {
            lines.push("\nWrote:".to_string());
            for file in &self.files_written {
                lines.push(format!("  - {file}"));
            }
        }
        if self.database_initialized {
            lines.push(format!("\nDatabase initialized at {PROJECT_DIR}/harmony.db"));
        }
        lines.join("\n")
    }
}

pub async fn execute(args: InitArgs, json_mode: bool) -> Result<()> {
    let target_path = if args.path.is_absolute() {
        args.path.clone()
    } else {
        std::env::current_dir()
            .context("Failed to get current directory")?
            .join(&args.path)
    };
    let project_dir = target_path.join(PROJECT_DIR);

    if project_dir.exists() && !args.force {
        let output_data = InitOutput {
            success: false,
            message: "Project already initialized. Use --force to reinitialize.".to_string(),
            initialized_path: target_path,
            files_written: vec![],
            database_initialized: false,
        };
        output(&output_data, json_mode);
        return Ok(());
    }

    if args.force && project_dir.exists() {
        fs::remove_dir_all(&project_dir)
            .await
            .with_context(|| format!("Failed to remove existing {PROJECT_DIR} directory"))?;
    }

    fs::create_dir_all(project_dir.join("logs"))
        .await
        .with_context(|| format!("Failed to create {}", project_dir.display()))?;

    // Paths in the written config are relative to the project root.
    let mut config = Config::default();
    config.database.path = format!("{PROJECT_DIR}/harmony.db");
    config.rules_path = Some(format!("{PROJECT_DIR}/rules.yaml"));
    config.logging.log_dir = Some(format!("{PROJECT_DIR}/logs"));

    let config_yaml = serde_yaml::to_string(&config).context("Failed to serialize default config")?;
    fs::write(project_dir.join("config.yaml"), config_yaml)
        .await
        .context("Failed to write config.yaml")?;

    // The embedded table is validated before it is written out.
    RuleBook::builtin().context("Embedded rule table is invalid")?;
    fs::write(project_dir.join("rules.yaml"), RuleBook::builtin_yaml())
        .await
        .context("Failed to write rules.yaml")?;

    let db_path = project_dir.join("harmony.db");
    let pool = initialize_database(&format!("sqlite:{}", db_path.display()), None)
        .await
        .context("Failed to initialize database")?;
    pool.close().await;

    let output_data = InitOutput {
        success: true,
        message: if args.force {
            "Project reinitialized successfully.".to_string()
        } else {
            "Project initialized successfully.".to_string()
        },
        initialized_path: target_path,
        files_written: vec![
            format!("{PROJECT_DIR}/config.yaml"),
            format!("{PROJECT_DIR}/rules.yaml"),
        ],
        database_initialized: true,
    };

    output(&output_data, json_mode);
    Ok(())
}
