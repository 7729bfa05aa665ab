// 命令行入口：读取目标快照，运行一次整理或输出提示词。
use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use smartsort::config::{load_config, load_config_from, override_path_default, Config};
use smartsort::llm::{LlmClient, StaticTextService, TextService};
use smartsort::orchestrator::{build_container_prompt, build_inventory_prompt, select_model};
use smartsort::schemas::Destination;
use smartsort::shutdown::shutdown_signal;
use smartsort::{SortEngine, Trigger, TriggerOutcome};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// SmartSort CLI
///
/// 将容器或玩家背包的快照交给模型排序，再按守恒规则写回。
#[derive(Debug, Parser)]
#[command(author, version, bin_name = "smartsort")]
struct Cli {
    /// Base config path / 基础配置路径（默认 config/smartsort.yaml）。
    #[arg(long = "config", global = true)]
    config_path: Option<PathBuf>,

    /// Emit logs as JSON lines / 以 JSON 行输出日志。
    #[arg(long = "log-json", global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sort a snapshot and print the report / 整理快照并输出报告。
    Sort(SortArgs),
    /// Print the prompt that would be sent / 输出将要发送的提示词。
    Prompt(PromptArgs),
}

#[derive(Debug, Clone, Args)]
struct SortArgs {
    /// Snapshot JSON (container or inventory) / 快照 JSON 文件。
    #[arg(long)]
    snapshot: PathBuf,

    /// Destination key / 目标 key。
    #[arg(long, default_value = "cli")]
    key: String,

    /// Replay a saved reply instead of calling the model / 使用保存的回复代替模型调用。
    #[arg(long = "reply-file")]
    reply_file: Option<PathBuf>,

    /// Write the sorted snapshot back to the file / 把整理结果写回快照文件。
    #[arg(long, default_value_t = false)]
    write: bool,
}

#[derive(Debug, Clone, Args)]
struct PromptArgs {
    /// Snapshot JSON (container or inventory) / 快照 JSON 文件。
    #[arg(long)]
    snapshot: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config_path {
        Some(path) => load_config_from(&path.to_string_lossy(), &override_path_default()),
        None => load_config(),
    };
    init_tracing(&config, cli.log_json);

    match cli.command {
        Command::Sort(args) => run_sort(config, args).await,
        Command::Prompt(args) => run_prompt(&config, args),
    }
}

fn init_tracing(config: &Config, json: bool) {
    let default_level = config.observability.log_level.trim();
    let default_level = if default_level.is_empty() {
        "info".to_string()
    } else {
        default_level.to_lowercase()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_snapshot(path: &Path) -> Result<Destination> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read snapshot {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse snapshot {}", path.display()))
}

async fn run_sort(config: Config, args: SortArgs) -> Result<()> {
    let snapshot = read_snapshot(&args.snapshot)?;
    let service: Arc<dyn TextService> = match &args.reply_file {
        Some(path) => {
            let reply = fs::read_to_string(path)
                .with_context(|| format!("read reply {}", path.display()))?;
            Arc::new(StaticTextService::new(reply))
        }
        None => {
            let client = LlmClient::new(config.llm.clone())?;
            if !client.is_configured() {
                return Err(anyhow!(
                    "LLM api key not configured, set OPENAI_API_KEY or use --reply-file"
                ));
            }
            Arc::new(client)
        }
    };

    let engine = SortEngine::builder(config, service).build()?;
    engine.start();
    let mut host = HashMap::from([(args.key.clone(), snapshot)]);
    let trigger = Trigger::force_now(args.key.clone(), host[&args.key].clone());

    let report = match engine.submit(&mut host, trigger) {
        TriggerOutcome::Finished(report) => report,
        TriggerOutcome::Pending { session_id } => {
            info!("sort session {session_id} waiting for model reply");
            tokio::select! {
                report = engine.next_report(&mut host) => {
                    report.ok_or_else(|| anyhow!("sort engine closed"))?
                }
                _ = shutdown_signal() => {
                    engine.shutdown();
                    return Err(anyhow!("interrupted"));
                }
            }
        }
        TriggerOutcome::Ignored(reason) => {
            engine.shutdown();
            return Err(anyhow!("sort ignored: {reason:?}"));
        }
        TriggerOutcome::Skipped => {
            engine.shutdown();
            return Err(anyhow!("sort skipped by debounce"));
        }
    };
    engine.shutdown();

    let destination = host.remove(&args.key);
    if args.write && report.is_success() {
        if let Some(destination) = &destination {
            fs::write(&args.snapshot, serde_json::to_string_pretty(destination)?)
                .with_context(|| format!("write snapshot {}", args.snapshot.display()))?;
        }
    }
    let output = json!({
        "report": report.to_payload(),
        "destination": destination,
        "stats": engine.stats(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    if let Some(err) = report.error() {
        return Err(anyhow!("sort failed: {err}"));
    }
    Ok(())
}

fn run_prompt(config: &Config, args: PromptArgs) -> Result<()> {
    let snapshot = read_snapshot(&args.snapshot)?;
    let items = snapshot.items();
    let prompt = match &snapshot {
        Destination::Container(_) => build_container_prompt(&items),
        Destination::Inventory(_) => build_inventory_prompt(&items),
    };
    let model = select_model(&config.llm, snapshot.kind(), items.len());
    println!("# model: {model}\n{prompt}");
    Ok(())
}
