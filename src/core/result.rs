//! Result Parser / Validator
//!
//! 图返回的松散记录在这里且只在这里转成强类型：必需键、类型、取值范围、状态枚举。
//! 任一检查失败都返回 InvalidState，不做任何截断或修正。

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::{ConversationStatus, KbArticle, WorkflowError};
use crate::graph::RawState;
use crate::routing::{EscalationSignals, IntentClassification};

const REQUIRED_KEYS: &[&str] = &[
    "agent_response",
    "primary_intent",
    "intent_confidence",
    "sentiment",
    "agent_history",
    "status",
];

/// 已校验、不可变的执行结果；每次调用只创建一次
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    agent_response: String,
    primary_intent: Option<String>,
    intent_confidence: f64,
    sentiment: f64,
    response_confidence: f64,
    status: ConversationStatus,
    should_escalate: bool,
    escalation_reason: Option<String>,
    turn_count: u32,
    agent_history: Vec<String>,
    agent_path: Vec<String>,
    entities: Map<String, Value>,
    tools_used: Vec<String>,
    kb_results: Vec<KbArticle>,
    kb_articles_used: Vec<String>,
    conversation_id: Option<String>,
    customer_id: Option<String>,
    timestamp: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn agent_response(&self) -> &str {
        &self.agent_response
    }

    pub fn primary_intent(&self) -> Option<&str> {
        self.primary_intent.as_deref()
    }

    pub fn intent_confidence(&self) -> f64 {
        self.intent_confidence
    }

    pub fn sentiment(&self) -> f64 {
        self.sentiment
    }

    pub fn response_confidence(&self) -> f64 {
        self.response_confidence
    }

    pub fn status(&self) -> ConversationStatus {
        self.status
    }

    pub fn should_escalate(&self) -> bool {
        self.should_escalate
    }

    pub fn escalation_reason(&self) -> Option<&str> {
        self.escalation_reason.as_deref()
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    pub fn agent_history(&self) -> &[String] {
        &self.agent_history
    }

    /// agent_history 的别名
    pub fn agent_path(&self) -> &[String] {
        &self.agent_path
    }

    pub fn entities(&self) -> &Map<String, Value> {
        &self.entities
    }

    pub fn tools_used(&self) -> &[String] {
        &self.tools_used
    }

    pub fn kb_results(&self) -> &[KbArticle] {
        &self.kb_results
    }

    pub fn kb_articles_used(&self) -> &[String] {
        &self.kb_articles_used
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.customer_id.as_deref()
    }

    /// 校验时刻（不是执行开始时刻）
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// 将图输出解析为 ExecutionResult
pub fn parse_result(raw: &RawState) -> Result<ExecutionResult, WorkflowError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| WorkflowError::invalid_state("graph output is not an object"))?;

    let missing: Vec<&str> = REQUIRED_KEYS
        .iter()
        .copied()
        .filter(|k| !obj.contains_key(*k))
        .collect();
    if !missing.is_empty() {
        return Err(WorkflowError::invalid_state(format!(
            "graph output missing required keys: {}",
            missing.join(", ")
        )));
    }

    let agent_response = required_str(obj, "agent_response")?;
    let primary_intent = optional_str(obj, "primary_intent")?;
    let intent_confidence = unit_interval(obj, "intent_confidence")?;
    let sentiment = in_range(number(obj, "sentiment")?, "sentiment", -1.0, 1.0)?;
    let response_confidence = match obj.get("response_confidence") {
        None | Some(Value::Null) => 0.0,
        Some(_) => unit_interval(obj, "response_confidence")?,
    };
    let status = parse_status(obj)?;

    let agent_history = string_list(obj, "agent_history")?;
    let tools_used = match obj.get("tools_used") {
        None | Some(Value::Null) => Vec::new(),
        Some(_) => string_list(obj, "tools_used")?,
    };
    let kb_results = parse_kb_results(obj)?;
    let kb_articles_used = kb_results
        .iter()
        .filter(|a| !a.title.is_empty())
        .map(|a| a.title.clone())
        .collect();

    let should_escalate = match obj.get("should_escalate") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => return Err(type_error("should_escalate", "a boolean")),
    };
    let turn_count = match obj.get("turn_count") {
        None | Some(Value::Null) => 0,
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| type_error("turn_count", "a non-negative integer"))?,
    };
    if status == ConversationStatus::Resolved {
        check_resolvable(
            &agent_response,
            EscalationSignals {
                response_confidence,
                turn_count,
                sentiment,
                requested: should_escalate,
            },
        )?;
    }
    let entities = match obj.get("entities") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(m)) => m.clone(),
        Some(_) => return Err(type_error("entities", "an object")),
    };

    Ok(ExecutionResult {
        agent_response,
        primary_intent,
        intent_confidence,
        sentiment,
        response_confidence,
        status,
        should_escalate,
        escalation_reason: optional_str(obj, "escalation_reason")?,
        turn_count,
        agent_path: agent_history.clone(),
        agent_history,
        entities,
        tools_used,
        kb_results,
        kb_articles_used,
        conversation_id: optional_str(obj, "conversation_id")?,
        customer_id: optional_str(obj, "customer_id")?,
        timestamp: Utc::now(),
    })
}

/// 解析入口阶段输出的三元组（intent 必须存在且非空）
pub fn parse_classification(raw: &RawState) -> Result<IntentClassification, WorkflowError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| WorkflowError::invalid_state("entry stage output is not an object"))?;
    let intent = optional_str(obj, "primary_intent")?
        .filter(|s| !s.is_empty())
        .ok_or_else(|| WorkflowError::invalid_state("entry stage produced no primary_intent"))?;
    Ok(IntentClassification {
        intent,
        confidence: unit_interval(obj, "intent_confidence")?,
        sentiment: in_range(number(obj, "sentiment")?, "sentiment", -1.0, 1.0)?,
    })
}

/// resolved 需要非空回复，且不能有任何未处理的升级触发条件
fn check_resolvable(
    agent_response: &str,
    signals: EscalationSignals,
) -> Result<(), WorkflowError> {
    if agent_response.trim().is_empty() {
        return Err(WorkflowError::invalid_state(
            "status resolved requires a non-empty agent_response",
        ));
    }
    let triggers = signals.triggers();
    if !triggers.is_empty() {
        let reasons: Vec<String> = triggers.iter().map(ToString::to_string).collect();
        return Err(WorkflowError::invalid_state(format!(
            "status resolved while escalation triggers are active: {}",
            reasons.join("; ")
        )));
    }
    Ok(())
}

fn parse_status(obj: &Map<String, Value>) -> Result<ConversationStatus, WorkflowError> {
    let raw = required_str(obj, "status")?;
    ConversationStatus::parse(&raw)
        .ok_or_else(|| WorkflowError::invalid_state(format!("unknown status '{raw}'")))
}

fn parse_kb_results(obj: &Map<String, Value>) -> Result<Vec<KbArticle>, WorkflowError> {
    match obj.get("kb_results") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(v @ Value::Array(_)) => serde_json::from_value(v.clone()).map_err(|e| {
            WorkflowError::invalid_state(format!("kb_results are malformed: {e}"))
        }),
        Some(_) => Err(type_error("kb_results", "an array")),
    }
}

fn required_str(obj: &Map<String, Value>, key: &str) -> Result<String, WorkflowError> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| type_error(key, "a string"))
}

fn optional_str(obj: &Map<String, Value>, key: &str) -> Result<Option<String>, WorkflowError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(type_error(key, "a string or null")),
    }
}

fn number(obj: &Map<String, Value>, key: &str) -> Result<f64, WorkflowError> {
    obj.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| type_error(key, "a number"))
}

fn unit_interval(obj: &Map<String, Value>, key: &str) -> Result<f64, WorkflowError> {
    in_range(number(obj, key)?, key, 0.0, 1.0)
}

fn in_range(value: f64, key: &str, min: f64, max: f64) -> Result<f64, WorkflowError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(WorkflowError::invalid_state(format!(
            "{key} {value} is outside [{min}, {max}]"
        )))
    }
}

fn string_list(obj: &Map<String, Value>, key: &str) -> Result<Vec<String>, WorkflowError> {
    let items = obj
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| type_error(key, "an array of strings"))?;
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| type_error(key, "an array of strings"))
        })
        .collect()
}

fn type_error(key: &str, expected: &str) -> WorkflowError {
    WorkflowError::invalid_state(format!("{key} must be {expected}"))
}
