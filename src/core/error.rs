//! 编排错误类型
//!
//! 调用方只会看到四类错误之一：InvalidState（不重试）、AgentTimeout / AgentExecution（重试耗尽后）、
//! Routing（严格路由模式下的查表失败）。

use std::time::Duration;

use thiserror::Error;

use crate::graph::GraphError;
use crate::routing::RoutingError;

/// 工作流编排过程中对外暴露的错误
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// 输入或图输出结构非法；重试相同输入不可能成功，因此永不重试
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// 每次尝试都超出时间预算
    #[error("Agent execution timed out after {:.3}s", .timeout.as_secs_f64())]
    AgentTimeout { timeout: Duration },

    /// 每次尝试都因超时以外的原因失败；携带最后一次失败
    #[error("Agent execution failed: {source}")]
    AgentExecution {
        #[source]
        source: GraphError,
    },

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),
}

impl WorkflowError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// 超时错误中配置的预算（秒）；其它错误返回 None
    pub fn timeout_secs(&self) -> Option<f64> {
        match self {
            Self::AgentTimeout { timeout } => Some(timeout.as_secs_f64()),
            _ => None,
        }
    }

    /// 瞬时失败（超时或执行失败），调用方可以稍后重发同一条消息
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AgentTimeout { .. } | Self::AgentExecution { .. })
    }
}
