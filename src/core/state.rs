//! 执行状态：单次调用独占的可变工作记录
//!
//! ExecutionState 由 State Builder 创建，只在一次尝试中被响应图修改；重试时丢弃，
//! 从同一份初始状态的新副本重新开始。字段名即原始记录（RawState）中的键名。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::WorkflowError;
use crate::graph::{GraphError, RawState};

/// 会话状态（状态机：active → resolved / escalated / active，终态不可离开）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    #[default]
    Active,
    Resolved,
    Escalated,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Resolved => "resolved",
            Self::Escalated => "escalated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "resolved" => Some(Self::Resolved),
            "escalated" => Some(Self::Escalated),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }

    /// 终态只能停留在自身；重新打开会话由上层应用负责
    pub fn can_transition_to(&self, next: ConversationStatus) -> bool {
        match self {
            Self::Active => true,
            terminal => *terminal == next,
        }
    }
}

/// 知识库检索结果（对引擎而言是不透明数据，只提取标题）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KbArticle {
    pub title: String,
    pub content: String,
    pub category: String,
    pub score: f64,
}

/// 之前的对话轮次（来自上下文 conversation_history）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

/// 单次调用的执行状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub message: String,
    pub turn_count: u32,
    pub customer_metadata: Map<String, Value>,
    pub conversation_history: Vec<HistoryTurn>,
    pub agent_response: String,
    pub agent_history: Vec<String>,
    pub primary_intent: Option<String>,
    pub intent_confidence: f64,
    pub sentiment: f64,
    pub status: ConversationStatus,
    pub should_escalate: bool,
    pub escalation_reason: Option<String>,
    pub response_confidence: f64,
    pub entities: Map<String, Value>,
    pub tools_used: Vec<String>,
    pub kb_results: Vec<KbArticle>,
    pub conversation_id: Option<String>,
    pub customer_id: Option<String>,
}

impl ExecutionState {
    /// 仅设置消息，其余字段为初始值；校验由 `build_initial_state` 负责
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            turn_count: 0,
            customer_metadata: Map::new(),
            conversation_history: Vec::new(),
            agent_response: String::new(),
            agent_history: Vec::new(),
            primary_intent: None,
            intent_confidence: 0.0,
            sentiment: 0.0,
            status: ConversationStatus::Active,
            should_escalate: false,
            escalation_reason: None,
            response_confidence: 0.0,
            entities: Map::new(),
            tools_used: Vec::new(),
            kb_results: Vec::new(),
            conversation_id: None,
            customer_id: None,
        }
    }

    /// 记录一个已运行的响应者（只追加）
    pub fn record_agent(&mut self, agent_id: impl Into<String>) {
        self.agent_history.push(agent_id.into());
    }

    pub fn advance_turn(&mut self) {
        self.turn_count = self.turn_count.saturating_add(1);
    }

    /// 状态迁移：终态不可离开；resolved 需要非空回复且没有未处理的升级触发条件
    pub fn transition_to(&mut self, next: ConversationStatus) -> Result<(), WorkflowError> {
        if !self.status.can_transition_to(next) {
            return Err(WorkflowError::invalid_state(format!(
                "cannot transition from {} to {}",
                self.status.as_str(),
                next.as_str()
            )));
        }
        if next == ConversationStatus::Resolved && self.status != ConversationStatus::Resolved {
            if self.agent_response.trim().is_empty() {
                return Err(WorkflowError::invalid_state(
                    "resolved status requires a non-empty agent_response",
                ));
            }
            if crate::routing::should_escalate(self) {
                return Err(WorkflowError::invalid_state(
                    "cannot resolve while an escalation trigger is active",
                ));
            }
        }
        self.status = next;
        Ok(())
    }

    /// 转为响应图返回的松散记录
    pub fn to_raw(&self) -> Result<RawState, GraphError> {
        Ok(serde_json::to_value(self)?)
    }
}
