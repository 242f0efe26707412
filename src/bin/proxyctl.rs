//! Command line front end for the proxy control layer.
//!
//! Usage:
//! ```text
//! proxyctl --data-dir ./proxyctl_data run --rule 1 --port 8001
//! proxyctl rules list
//! proxyctl ca ensure
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use proxyctl::api::{init_core, ControlApi};
use proxyctl::config::ControllerConfig;
use proxyctl::models::RuleSetDocument;
use proxyctl::proxy::StartOptions;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "proxyctl")]
#[command(about = "Control an intercepting proxy: lifecycle, rules and certificates")]
struct Cli {
    /// Data directory for rules, certificates, captures and logs
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy and keep it running until Ctrl-C
    Run {
        /// Custom rule identifier to load
        #[arg(long)]
        rule: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
        /// Bind host (defaults to all interfaces)
        #[arg(long)]
        host: Option<String>,
        /// Address to report instead of the detected local IP
        #[arg(long)]
        address: Option<String>,
    },
    /// Rule management commands
    Rules {
        #[command(subcommand)]
        command: RuleCommands,
    },
    /// Root certificate commands
    Ca {
        #[command(subcommand)]
        command: CaCommands,
    },
    /// Captured traffic commands
    Log {
        #[command(subcommand)]
        command: LogCommands,
    },
}

#[derive(Subcommand)]
enum RuleCommands {
    /// List custom rule identifiers
    List,
    /// Print a custom rule
    Show { id: String },
    /// Save a custom rule from a JSON file
    Save { id: String, file: PathBuf },
    /// Delete a custom rule
    Delete { id: String },
    /// List bundled sample rules
    Samples,
    /// Print a sample rule
    Sample { name: String },
    /// Replace the rule-set document with the JSON array in a file
    SetDoc { file: PathBuf },
    /// Print the rule-set document
    Doc,
}

#[derive(Subcommand)]
enum CaCommands {
    /// Generate the root CA if missing and open its folder
    Ensure,
}

#[derive(Subcommand)]
enum LogCommands {
    /// Print the most recent captured requests
    Recent {
        #[arg(short, long)]
        limit: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = cli
        .data_dir
        .unwrap_or_else(|| ControllerConfig::default().data_dir);

    init_core(Some(data_dir.as_path()))?;
    let config = ControllerConfig::load(&data_dir)?;
    let api = ControlApi::open(config)?;

    match cli.command {
        Commands::Run {
            rule,
            port,
            host,
            address,
        } => run_proxy(&api, rule, port, host, address).await,
        Commands::Rules { command } => handle_rules(&api, command),
        Commands::Ca {
            command: CaCommands::Ensure,
        } => {
            let reply = api.generate_root_ca().await?;
            println!("{}", reply.msg);
            Ok(())
        }
        Commands::Log {
            command: LogCommands::Recent { limit },
        } => {
            let limit = limit.unwrap_or(api.config().recent_log_limit);
            let records = api.capture().list_recent(limit).await?;
            for record in records {
                let status = record
                    .status_code
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{}  {:<7} {} {}", record.id, record.method, status, record.url);
            }
            Ok(())
        }
    }
}

async fn run_proxy(
    api: &ControlApi,
    rule: Option<String>,
    port: Option<u16>,
    host: Option<String>,
    address: Option<String>,
) -> Result<()> {
    let options = StartOptions {
        rule_id: rule,
        port,
        host,
        address,
        ..Default::default()
    };
    let reply = api.start_proxy(options).await?;
    println!("{} at {}:{}", reply.msg, reply.address, reply.port);

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;

    let reply = api.stop_proxy()?;
    println!("{}", reply.msg);
    Ok(())
}

fn handle_rules(api: &ControlApi, command: RuleCommands) -> Result<()> {
    match command {
        RuleCommands::List => {
            for id in api.list_custom_rules()? {
                println!("{id}");
            }
        }
        RuleCommands::Show { id } => {
            let source = api
                .fetch_custom_rule(&id)
                .map_err(|_| anyhow!("custom rule {id} not found"))?;
            println!("{source}");
        }
        RuleCommands::Save { id, file } => {
            let source = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            api.save_custom_rule(&id, &source)?;
        }
        RuleCommands::Delete { id } => api.delete_custom_rule(&id)?,
        RuleCommands::Samples => {
            for name in api.list_sample_rules()? {
                println!("{name}");
            }
        }
        RuleCommands::Sample { name } => {
            let source = api
                .fetch_sample_rule(&name)
                .map_err(|_| anyhow!("sample rule {name} not found"))?;
            println!("{source}");
        }
        RuleCommands::SetDoc { file } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let doc: RuleSetDocument = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a JSON array", file.display()))?;
            api.save_rules(&doc)?;
        }
        RuleCommands::Doc => {
            let doc = api.read_rules()?;
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
    }
    Ok(())
}
