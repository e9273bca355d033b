//! 响应图抽象
//!
//! 响应图（入口路由 + 各专家响应者）由外部子系统提供，这里只定义边界：
//! 同步阻塞的 invoke(state) → RawState。引擎负责在工作线程上调度它。

use thiserror::Error;

use crate::core::ExecutionState;
use crate::routing::RoutingError;

/// 图返回的松散记录（JSON 对象），由 Result Parser 统一转成强类型结果
pub type RawState = serde_json::Value;

/// 响应图或入口响应者的失败
#[derive(Error, Debug)]
pub enum GraphError {
    /// 图判定状态结构非法；编排器不会重试
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// 严格路由下的查表失败；确定性错误，编排器不会重试
    #[error("Routing failed: {0}")]
    Routing(#[from] RoutingError),

    #[error("Responder {agent} failed: {message}")]
    Responder { agent: String, message: String },

    #[error("Graph worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 完整响应图：同步、可能阻塞（内部可能调用模型服务与检索）
pub trait ResponderGraph: Send + Sync + 'static {
    fn invoke(&self, state: ExecutionState) -> Result<RawState, GraphError>;
}

/// 入口/路由阶段：只产出 intent / confidence / sentiment，供轻量分类使用
pub trait EntryResponder: Send + Sync + 'static {
    fn classify(&self, state: &ExecutionState) -> Result<RawState, GraphError>;
}

impl<F> ResponderGraph for F
where
    F: Fn(ExecutionState) -> Result<RawState, GraphError> + Send + Sync + 'static,
{
    fn invoke(&self, state: ExecutionState) -> Result<RawState, GraphError> {
        self(state)
    }
}

impl<F> EntryResponder for F
where
    F: Fn(&ExecutionState) -> Result<RawState, GraphError> + Send + Sync + 'static,
{
    fn classify(&self, state: &ExecutionState) -> Result<RawState, GraphError> {
        self(state)
    }
}
