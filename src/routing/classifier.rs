//! 轻量分类路径
//!
//! 只运行入口/路由阶段，得到 intent / confidence / sentiment 三元组，
//! 用于预路由或分析，不付出完整响应图的开销。没有超时与重试包装。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::result::parse_classification;
use crate::core::{build_initial_state, GraphRunner, WorkflowError};
use crate::graph::{EntryResponder, GraphError};

/// 入口阶段的分类结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentClassification {
    pub intent: String,
    pub confidence: f64,
    pub sentiment: f64,
}

/// 入口阶段分类器；与完整响应图共用同一个工作线程池
#[derive(Clone)]
pub struct IntentClassifier {
    entry: Arc<dyn EntryResponder>,
    runner: GraphRunner,
}

impl IntentClassifier {
    pub fn new(entry: Arc<dyn EntryResponder>, runner: GraphRunner) -> Self {
        Self { entry, runner }
    }

    pub async fn classify(&self, message: &str) -> Result<IntentClassification, WorkflowError> {
        let state = build_initial_state(message, None)?;
        let raw = self
            .runner
            .run_entry(Arc::clone(&self.entry), state)
            .await
            .map_err(|e| match e {
                GraphError::InvalidState(msg) => WorkflowError::InvalidState(msg),
                GraphError::Routing(e) => WorkflowError::Routing(e),
                other => WorkflowError::AgentExecution { source: other },
            })?;
        let classification = parse_classification(&raw)?;
        tracing::debug!(
            intent = %classification.intent,
            confidence = classification.confidence,
            sentiment = classification.sentiment,
            "intent classified"
        );
        Ok(classification)
    }
}
