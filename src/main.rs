//! Relay 命令行
//!
//! - `relay plan <query> [--sources FILE]`：用配置的推理服务生成并打印计划
//! - `relay show <task-id>`：打印文件存储中的任务状态

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use relay::config::{load_config, AppConfig};
use relay::llm::ProviderRegistry;
use relay::plan::{DataSource, PlanBuilder, PlanContext};
use relay::store::{FileTaskStore, TaskStore};

#[derive(Parser)]
#[command(name = "relay", version, about = "Execution-plan orchestrator")]
struct Cli {
    /// 额外的配置文件
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 生成并打印执行计划
    Plan {
        query: String,
        /// 数据源描述（JSON 数组：[{"name", "kind", "description"}]）
        #[arg(long)]
        sources: Option<PathBuf>,
    },
    /// 打印持久化的任务状态
    Show { task_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    relay::observability::init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.clone()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    match cli.command {
        Command::Plan { query, sources } => {
            let sources: Vec<DataSource> = match sources {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("read {:?}", path))?;
                    serde_json::from_str(&raw).context("parse sources")?
                }
                None => Vec::new(),
            };

            let providers = ProviderRegistry::from_config(&cfg.llm);
            let builder = PlanBuilder::new(providers.selected(), cfg.planner.max_steps);
            let plan = builder
                .build_plan(&query, &PlanContext::new(sources))
                .await
                .context("plan generation failed")?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Command::Show { task_id } => {
            let store = FileTaskStore::new(&cfg.store.dir);
            let state = store
                .load(&task_id)
                .await?
                .with_context(|| format!("task {task_id} not found in {:?}", cfg.store.dir))?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
    }

    Ok(())
}
