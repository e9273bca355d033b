//! 路由与升级策略（纯函数，无 I/O）
//!
//! - route_to_agent：置信度门控 + 静态类别表，决定交给哪个专家响应者
//! - should_escalate：四个独立触发条件取逻辑或
//!
//! 阈值都是策略常量，边界值本身不触发（严格小于 / 严格大于）。

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::ExecutionState;

/// 低于此意图置信度直接转人工
pub const MIN_ROUTING_CONFIDENCE: f64 = 0.5;
/// 高于此置信度且为简单意图时，入口阶段直接作答
pub const DIRECT_ANSWER_CONFIDENCE: f64 = 0.8;
pub const MIN_RESPONSE_CONFIDENCE: f64 = 0.4;
pub const MAX_TURNS_BEFORE_ESCALATION: u32 = 5;
pub const NEGATIVE_SENTIMENT_THRESHOLD: f64 = -0.7;

/// 高置信度时入口阶段可直接回答的意图
pub const SIMPLE_INTENTS: &[&str] = &["greeting", "general_inquiry", "faq", "thanks"];

/// 意图类别（意图名第一个下划线之前的部分）→ 专家响应者
const CATEGORY_TABLE: &[(&str, Responder)] = &[
    ("billing", Responder::Billing),
    ("technical", Responder::Technical),
    ("account", Responder::Account),
    ("product", Responder::Product),
    ("general", Responder::General),
    ("greeting", Responder::General),
    ("faq", Responder::General),
    ("thanks", Responder::General),
];

/// 响应图中的响应者标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Responder {
    Router,
    Billing,
    Technical,
    Account,
    Product,
    General,
    Escalation,
}

impl Responder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Router => "router",
            Self::Billing => "billing_agent",
            Self::Technical => "technical_agent",
            Self::Account => "account_agent",
            Self::Product => "product_agent",
            Self::General => "general_agent",
            Self::Escalation => "escalation_agent",
        }
    }
}

impl fmt::Display for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RoutingError {
    #[error("No responder mapped for intent '{0}'")]
    UnmappedIntent(String),

    #[error("Intent confidence {0} is outside [0, 1]")]
    InvalidConfidence(f64),
}

/// 升级触发条件（可同时命中多个）
#[derive(Debug, Clone, PartialEq)]
pub enum EscalationTrigger {
    LowResponseConfidence(f64),
    TooManyTurns(u32),
    NegativeSentiment(f64),
    Requested,
}

impl fmt::Display for EscalationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowResponseConfidence(c) => write!(f, "low response confidence ({c:.2})"),
            Self::TooManyTurns(n) => write!(
                f,
                "conversation exceeded {MAX_TURNS_BEFORE_ESCALATION} turns ({n})"
            ),
            Self::NegativeSentiment(s) => write!(f, "negative customer sentiment ({s:.2})"),
            Self::Requested => f.write_str("escalation requested upstream"),
        }
    }
}

/// 路由策略；strict 模式下未映射的意图返回 RoutingError 而不是默认转人工
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingPolicy {
    pub strict: bool,
}

impl RoutingPolicy {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    /// 总是给出结果：未映射意图与低置信度都默认转人工
    pub fn route_to_agent(&self, intent: &str, confidence: f64) -> Option<Responder> {
        match self.resolve(intent, confidence) {
            Resolution::Direct => None,
            Resolution::Mapped(r) => Some(r),
            Resolution::Unmapped => Some(Responder::Escalation),
        }
    }

    /// 与 route_to_agent 相同，但 strict 模式下未映射意图和越界置信度会报错
    pub fn resolve_agent(
        &self,
        intent: &str,
        confidence: f64,
    ) -> Result<Option<Responder>, RoutingError> {
        if self.strict && !(0.0..=1.0).contains(&confidence) {
            return Err(RoutingError::InvalidConfidence(confidence));
        }
        match self.resolve(intent, confidence) {
            Resolution::Direct => Ok(None),
            Resolution::Mapped(r) => Ok(Some(r)),
            Resolution::Unmapped if self.strict => {
                Err(RoutingError::UnmappedIntent(intent.to_string()))
            }
            Resolution::Unmapped => Ok(Some(Responder::Escalation)),
        }
    }

    fn resolve(&self, intent: &str, confidence: f64) -> Resolution {
        // NaN 也走转人工
        if !(confidence >= MIN_ROUTING_CONFIDENCE) {
            return Resolution::Mapped(Responder::Escalation);
        }
        if confidence > DIRECT_ANSWER_CONFIDENCE && is_simple_intent(intent) {
            return Resolution::Direct;
        }
        match lookup_category(intent) {
            Some(r) => Resolution::Mapped(r),
            None => Resolution::Unmapped,
        }
    }
}

enum Resolution {
    Direct,
    Mapped(Responder),
    Unmapped,
}

pub fn is_simple_intent(intent: &str) -> bool {
    SIMPLE_INTENTS.contains(&intent)
}

fn lookup_category(intent: &str) -> Option<Responder> {
    let category = intent.split('_').next().unwrap_or(intent);
    CATEGORY_TABLE
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, r)| *r)
}

/// 使用默认（非严格）策略路由
pub fn route_to_agent(intent: &str, confidence: f64) -> Option<Responder> {
    RoutingPolicy::default().route_to_agent(intent, confidence)
}

/// 升级判定所需的四个信号；状态与已解析的图输出都可以转换成它
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EscalationSignals {
    pub response_confidence: f64,
    pub turn_count: u32,
    pub sentiment: f64,
    pub requested: bool,
}

impl EscalationSignals {
    pub fn of(state: &ExecutionState) -> Self {
        Self {
            response_confidence: state.response_confidence,
            turn_count: state.turn_count,
            sentiment: state.sentiment,
            requested: state.should_escalate,
        }
    }

    pub fn triggers(&self) -> Vec<EscalationTrigger> {
        let mut triggers = Vec::new();
        if self.response_confidence < MIN_RESPONSE_CONFIDENCE {
            triggers.push(EscalationTrigger::LowResponseConfidence(self.response_confidence));
        }
        if self.turn_count > MAX_TURNS_BEFORE_ESCALATION {
            triggers.push(EscalationTrigger::TooManyTurns(self.turn_count));
        }
        if self.sentiment < NEGATIVE_SENTIMENT_THRESHOLD {
            triggers.push(EscalationTrigger::NegativeSentiment(self.sentiment));
        }
        if self.requested {
            triggers.push(EscalationTrigger::Requested);
        }
        triggers
    }
}

/// 列出所有命中的升级触发条件
pub fn escalation_triggers(state: &ExecutionState) -> Vec<EscalationTrigger> {
    EscalationSignals::of(state).triggers()
}

pub fn should_escalate(state: &ExecutionState) -> bool {
    !escalation_triggers(state).is_empty()
}

/// 升级原因文本；已有上游原因时优先保留
pub fn escalation_reason_for(state: &ExecutionState) -> Option<String> {
    if let Some(reason) = state.escalation_reason.as_ref().filter(|r| !r.is_empty()) {
        return Some(reason.clone());
    }
    let triggers = escalation_triggers(state);
    if triggers.is_empty() {
        return None;
    }
    Some(
        triggers
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calm_state() -> ExecutionState {
        let mut state = ExecutionState::new("hello");
        state.response_confidence = 0.9;
        state.sentiment = 0.0;
        state.turn_count = 1;
        state
    }

    #[test]
    fn test_billing_intent_routes_to_billing() {
        assert_eq!(route_to_agent("billing_upgrade", 0.95), Some(Responder::Billing));
        assert_eq!(route_to_agent("billing_refund", 0.6), Some(Responder::Billing));
    }

    #[test]
    fn test_unmapped_intent_escalates() {
        assert_eq!(route_to_agent("unmapped_intent", 0.6), Some(Responder::Escalation));
    }

    #[test]
    fn test_low_confidence_always_escalates() {
        for intent in ["billing_upgrade", "greeting", "technical_bug", "whatever"] {
            assert_eq!(route_to_agent(intent, 0.3), Some(Responder::Escalation));
        }
        assert_eq!(route_to_agent("billing_upgrade", f64::NAN), Some(Responder::Escalation));
    }

    #[test]
    fn test_confidence_boundaries() {
        // 0.5 本身不算低置信度
        assert_eq!(route_to_agent("technical_bug", 0.5), Some(Responder::Technical));
        assert_eq!(route_to_agent("technical_bug", 0.49), Some(Responder::Escalation));
        // 0.8 本身不足以直接回答
        assert_eq!(route_to_agent("greeting", 0.8), Some(Responder::General));
        assert_eq!(route_to_agent("greeting", 0.81), None);
    }

    #[test]
    fn test_simple_intent_answered_directly() {
        assert_eq!(route_to_agent("faq", 0.95), None);
        // 非简单意图即使高置信度也要交给专家
        assert_eq!(route_to_agent("account_locked", 0.99), Some(Responder::Account));
    }

    #[test]
    fn test_strict_mode_reports_unmapped() {
        let policy = RoutingPolicy::new(true);
        assert_eq!(
            policy.resolve_agent("unmapped_intent", 0.6),
            Err(RoutingError::UnmappedIntent("unmapped_intent".into()))
        );
        assert_eq!(
            policy.resolve_agent("unmapped_intent", 0.2),
            Ok(Some(Responder::Escalation))
        );
        assert_eq!(
            policy.resolve_agent("billing_upgrade", 1.2),
            Err(RoutingError::InvalidConfidence(1.2))
        );
        let lenient = RoutingPolicy::default();
        assert_eq!(
            lenient.resolve_agent("unmapped_intent", 0.6),
            Ok(Some(Responder::Escalation))
        );
    }

    #[test]
    fn test_response_confidence_boundary() {
        let mut state = calm_state();
        state.response_confidence = 0.39;
        assert!(should_escalate(&state));
        state.response_confidence = 0.40;
        assert!(!should_escalate(&state));
    }

    #[test]
    fn test_turn_count_boundary() {
        let mut state = calm_state();
        state.turn_count = 5;
        assert!(!should_escalate(&state));
        state.turn_count = 6;
        assert!(should_escalate(&state));
    }

    #[test]
    fn test_sentiment_boundary() {
        let mut state = calm_state();
        state.sentiment = -0.70;
        assert!(!should_escalate(&state));
        state.sentiment = -0.71;
        assert!(should_escalate(&state));
    }

    #[test]
    fn test_explicit_flag_escalates() {
        let mut state = calm_state();
        assert!(!should_escalate(&state));
        state.should_escalate = true;
        assert!(should_escalate(&state));
        assert_eq!(escalation_triggers(&state), vec![EscalationTrigger::Requested]);
    }

    #[test]
    fn test_escalation_reason_lists_triggers() {
        let mut state = calm_state();
        assert_eq!(escalation_reason_for(&state), None);
        state.sentiment = -0.9;
        state.turn_count = 7;
        let reason = escalation_reason_for(&state).unwrap();
        assert!(reason.contains("turns"));
        assert!(reason.contains("sentiment"));

        state.escalation_reason = Some("customer asked for a manager".into());
        assert_eq!(
            escalation_reason_for(&state).as_deref(),
            Some("customer asked for a manager")
        );
    }
}
