//! Hive - 客服消息工作流编排引擎
//!
//! 模块划分：
//! - **config**: 引擎配置加载（TOML + 环境变量）
//! - **core**: 状态构建、图调度、超时/重试监管、结果解析与校验
//! - **graph**: 响应图边界（同步 invoke）与离线关键词实现
//! - **observability**: tracing 初始化
//! - **routing**: 意图分类、专家路由与人工升级策略

pub mod config;
pub mod core;
pub mod graph;
pub mod observability;
pub mod routing;

pub use crate::core::{
    build_initial_state, parse_result, Context, ConversationStatus, EngineOptions,
    ExecutionResult, ExecutionState, MessageWorkflow, WorkflowError, WorkflowOrchestrator,
};
pub use crate::graph::{EntryResponder, GraphError, RawState, ResponderGraph};
pub use crate::routing::{route_to_agent, should_escalate, IntentClassification, Responder};
