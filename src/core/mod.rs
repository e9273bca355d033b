//! 核心编排层：状态构建、图调度、超时/重试监管、结果校验

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod result;
pub mod runner;
pub mod state;

pub use builder::{build_initial_state, Context};
pub use error::WorkflowError;
pub use orchestrator::{EngineOptions, MessageWorkflow, WorkflowOrchestrator};
pub use result::{parse_result, ExecutionResult};
pub use runner::{AttemptError, GraphRunner};
pub use state::{ConversationStatus, ExecutionState, HistoryTurn, KbArticle};
