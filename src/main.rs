//! Hive 命令行入口
//!
//! 用离线关键词响应图处理一条消息并以 JSON 输出结果：
//! `hive [--config PATH] [--classify] [--context JSON] MESSAGE...`

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use hive::config::load_config;
use hive::graph::{KeywordGraph, KeywordRouter};
use hive::routing::RoutingPolicy;
use hive::{Context, WorkflowError, WorkflowOrchestrator};

#[derive(Parser, Debug)]
#[command(name = "hive", about = "客服消息工作流编排引擎（离线关键词响应图）")]
struct Args {
    /// 额外的 TOML 配置文件，覆盖 config/default.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// 只运行入口阶段，输出 intent / confidence / sentiment
    #[arg(long)]
    classify: bool,

    /// 会话上下文（JSON 对象）
    #[arg(long, value_parser = parse_context)]
    context: Option<Context>,

    /// 客户消息，多个参数以空格拼接
    #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
    message: Vec<String>,
}

fn parse_context(raw: &str) -> Result<Context, String> {
    match serde_json::from_str(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err("context must be a JSON object".to_string()),
        Err(e) => Err(format!("context is not valid JSON: {e}")),
    }
}

fn report(err: WorkflowError) -> anyhow::Error {
    tracing::error!(error = %err, retryable = err.is_retryable(), "message processing failed");
    err.into()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let args = Args::parse();
    let cfg = load_config(args.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });

    let policy = RoutingPolicy::new(cfg.routing.strict);
    let router = KeywordRouter::default();
    let graph = Arc::new(KeywordGraph::new(router.clone(), policy));
    let orchestrator = WorkflowOrchestrator::from_config(graph, Arc::new(router), &cfg)?;

    let message = args.message.join(" ");
    let output = if args.classify {
        let triple = orchestrator.classify_intent(&message).await.map_err(report)?;
        serde_json::to_string_pretty(&triple)?
    } else {
        let result = orchestrator
            .execute(&message, args.context.as_ref())
            .await
            .map_err(report)?;
        serde_json::to_string_pretty(&result)?
    };
    println!("{output}");
    Ok(())
}
