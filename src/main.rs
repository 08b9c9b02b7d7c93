use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use dealdesk::config::{DEFAULT_CONFIG_FILE, DashboardConfig};
use dealdesk::logging::{LogFormat, init_logging};

mod cmd;

#[derive(Parser)]
#[command(name = "dealdesk")]
#[command(version, about = "Contract pipeline dashboard back-end")]
pub struct Cli {
    /// Path to the dealdesk.toml config file (missing file means defaults)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the dashboard HTTP API
    Serve {
        /// Port to serve on (overrides config and DEALDESK_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (permissive CORS, bind all interfaces)
        #[arg(long)]
        dev: bool,

        /// Open the dashboard in a browser once listening
        #[arg(long)]
        open: bool,
    },
    /// Create the database and its tables, then exit
    InitDb {
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Preview the tasks generated when a contract enters a stage
    Tasks {
        /// Pipeline stage label or Salesforce stage code (e.g. "S5")
        #[arg(short, long)]
        stage: String,

        /// Contract close date (YYYY-MM-DD)
        #[arg(long)]
        close_date: Option<NaiveDate>,

        /// Stage entry date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        entered: Option<NaiveDate>,

        /// Print the tasks as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compare two contract revisions
    Compare {
        /// Original text file
        original: PathBuf,

        /// Revised text file
        revised: PathBuf,

        /// Write a redline .docx to this path
        #[arg(long)]
        docx: Option<PathBuf>,

        /// Print the full comparison as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the pipeline stages and their Salesforce stage codes
    Stages,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = DashboardConfig::load(&cli.config)?;
    init_logging(cli.log_format, &config.logging.filter)?;

    match cli.command {
        Commands::Serve {
            port,
            db_path,
            dev,
            open,
        } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(db_path) = db_path {
                config.server.db_path = db_path;
            }
            config.server.dev_mode |= dev;
            cmd::cmd_serve(config, open).await?;
        }
        Commands::InitDb { db_path } => {
            let db_path = db_path.unwrap_or(config.server.db_path);
            cmd::cmd_init_db(&db_path)?;
        }
        Commands::Tasks {
            stage,
            close_date,
            entered,
            json,
        } => cmd::cmd_tasks(&stage, close_date, entered, json)?,
        Commands::Compare {
            original,
            revised,
            docx,
            json,
        } => cmd::cmd_compare(&original, &revised, docx.as_deref(), json)?,
        Commands::Stages => cmd::cmd_stages(),
    }

    Ok(())
}
