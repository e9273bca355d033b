//! 关键词响应图（离线、确定性）
//!
//! KeywordRouter 用规则匹配代替模型调用完成入口阶段分类；KeywordGraph 在其上套用
//! 路由与升级策略并填充完整状态。用于命令行、本地演示与测试，不需要任何外部服务。

use serde_json::json;

use crate::core::{ConversationStatus, ExecutionState};
use crate::graph::{EntryResponder, GraphError, RawState, ResponderGraph};
use crate::routing::{escalation_reason_for, should_escalate, Responder, RoutingPolicy};

/// 单条匹配规则：任一关键词命中即得到该意图
#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub intent: String,
    pub confidence: f64,
    pub keywords: Vec<String>,
}

impl KeywordRule {
    pub fn new(intent: &str, confidence: f64, keywords: &[&str]) -> Self {
        Self {
            intent: intent.to_string(),
            confidence,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

const FALLBACK_INTENT: &str = "general_inquiry";
/// 低于路由阈值：未命中任何规则的消息交给人工
const FALLBACK_CONFIDENCE: f64 = 0.45;
const SENTIMENT_STEP: f64 = 0.4;

const NEGATIVE_WORDS: &[&str] = &[
    "angry", "awful", "terrible", "useless", "worst", "hate", "frustrated", "ridiculous",
    "unacceptable", "disappointed",
];
const POSITIVE_WORDS: &[&str] = &[
    "thanks", "thank", "great", "love", "awesome", "happy", "appreciate", "perfect",
];
const HUMAN_REQUEST_WORDS: &[&str] = &["human", "manager", "representative", "supervisor"];

/// 入口路由：按规则顺序匹配，第一个命中的规则胜出
#[derive(Debug, Clone)]
pub struct KeywordRouter {
    rules: Vec<KeywordRule>,
}

impl Default for KeywordRouter {
    fn default() -> Self {
        Self::new(vec![
            KeywordRule::new("billing_upgrade", 0.92, &["upgrade", "upgrading"]),
            KeywordRule::new("billing_refund", 0.9, &["refund", "chargeback"]),
            KeywordRule::new(
                "billing_invoice",
                0.85,
                &["invoice", "bill", "billing", "charged", "payment"],
            ),
            KeywordRule::new("account_access", 0.88, &["password", "login", "locked", "2fa"]),
            KeywordRule::new(
                "technical_bug",
                0.85,
                &["error", "bug", "crash", "crashes", "broken"],
            ),
            KeywordRule::new(
                "technical_setup",
                0.75,
                &["install", "setup", "configure", "integration"],
            ),
            KeywordRule::new("account_update", 0.8, &["email", "profile", "username"]),
            KeywordRule::new("product_question", 0.7, &["feature", "pricing", "roadmap"]),
            KeywordRule::new("greeting", 0.9, &["hello", "hi", "hey"]),
            KeywordRule::new("thanks", 0.9, &["thanks", "thank"]),
            KeywordRule::new("faq", 0.85, &["hours", "contact", "faq"]),
        ])
    }
}

impl KeywordRouter {
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        Self { rules }
    }

    /// (intent, confidence, sentiment)
    pub fn classify_text(&self, message: &str) -> (String, f64, f64) {
        let words = tokenize(message);
        let (intent, confidence) = self
            .rules
            .iter()
            .find(|rule| rule.keywords.iter().any(|k| words.iter().any(|w| w == k)))
            .map(|rule| (rule.intent.clone(), rule.confidence))
            .unwrap_or_else(|| (FALLBACK_INTENT.to_string(), FALLBACK_CONFIDENCE));
        (intent, confidence, sentiment_score(&words))
    }
}

impl EntryResponder for KeywordRouter {
    fn classify(&self, state: &ExecutionState) -> Result<RawState, GraphError> {
        let (intent, confidence, sentiment) = self.classify_text(&state.message);
        Ok(json!({
            "primary_intent": intent,
            "intent_confidence": confidence,
            "sentiment": sentiment,
        }))
    }
}

/// 完整的关键词响应图：router → 专家（或直接作答 / 转人工）
#[derive(Debug, Clone, Default)]
pub struct KeywordGraph {
    router: KeywordRouter,
    policy: RoutingPolicy,
}

impl KeywordGraph {
    pub fn new(router: KeywordRouter, policy: RoutingPolicy) -> Self {
        Self { router, policy }
    }

    pub fn router(&self) -> &KeywordRouter {
        &self.router
    }
}

impl ResponderGraph for KeywordGraph {
    fn invoke(&self, mut state: ExecutionState) -> Result<RawState, GraphError> {
        let (intent, confidence, sentiment) = self.router.classify_text(&state.message);
        state.record_agent(Responder::Router.as_str());
        state.advance_turn();
        state.primary_intent = Some(intent.clone());
        state.intent_confidence = confidence;
        state.sentiment = sentiment;
        state.response_confidence = confidence;

        if tokenize(&state.message)
            .iter()
            .any(|w| HUMAN_REQUEST_WORDS.contains(&w.as_str()))
        {
            state.should_escalate = true;
            state.escalation_reason = Some("customer asked for a human agent".to_string());
        }

        let responder = self.policy.resolve_agent(&intent, confidence)?;
        match responder {
            None => {
                state.agent_response = direct_answer(&intent).to_string();
            }
            Some(Responder::Escalation) => {
                state.record_agent(Responder::Escalation.as_str());
                state.should_escalate = true;
                state.agent_response =
                    "I'm connecting you with a member of our support team.".to_string();
            }
            Some(specialist) => {
                state.record_agent(specialist.as_str());
                state.agent_response = specialist_answer(specialist, &intent);
            }
        }

        let next = if should_escalate(&state) {
            state.should_escalate = true;
            state.escalation_reason = escalation_reason_for(&state);
            ConversationStatus::Escalated
        } else {
            ConversationStatus::Resolved
        };
        state
            .transition_to(next)
            .map_err(|e| GraphError::InvalidState(e.to_string()))?;

        state.to_raw()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn sentiment_score(words: &[String]) -> f64 {
    let negative = words.iter().filter(|w| NEGATIVE_WORDS.contains(&w.as_str())).count() as f64;
    let positive = words.iter().filter(|w| POSITIVE_WORDS.contains(&w.as_str())).count() as f64;
    ((positive - negative) * SENTIMENT_STEP).clamp(-1.0, 1.0)
}

fn direct_answer(intent: &str) -> &'static str {
    match intent {
        "greeting" => "Hello! How can I help you today?",
        "thanks" => "You're welcome! Is there anything else I can help with?",
        "faq" => "Our support team is available 24/7 through chat and email.",
        _ => "Thanks for reaching out. How can I help?",
    }
}

fn specialist_answer(responder: Responder, intent: &str) -> String {
    let topic = intent.replace('_', " ");
    match responder {
        Responder::Billing => {
            format!("I've reviewed your {topic} request and updated your billing case.")
        }
        Responder::Technical => {
            format!("Here are the troubleshooting steps for your {topic} issue.")
        }
        Responder::Account => format!("I've checked your account regarding the {topic} request."),
        Responder::Product => format!("Here is what we can share about your {topic}."),
        _ => format!("Thanks for your {topic}. Here is what I found."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::result::parse_result;

    #[test]
    fn test_router_rule_order() {
        let router = KeywordRouter::default();
        let (intent, confidence, _) = router.classify_text("I'd like to upgrade my plan");
        assert_eq!(intent, "billing_upgrade");
        assert_eq!(confidence, 0.92);

        let (intent, _, _) = router.classify_text("My login is locked");
        assert_eq!(intent, "account_access");

        // "this" 不应命中 "hi"
        let (intent, confidence, _) = router.classify_text("this is something else");
        assert_eq!(intent, FALLBACK_INTENT);
        assert_eq!(confidence, FALLBACK_CONFIDENCE);
    }

    #[test]
    fn test_sentiment_scoring() {
        let router = KeywordRouter::default();
        let (_, _, neutral) = router.classify_text("my invoice is wrong");
        assert_eq!(neutral, 0.0);
        let (_, _, negative) = router.classify_text("terrible, useless, awful invoice");
        assert_eq!(negative, -1.0);
        let (_, _, positive) = router.classify_text("thanks, great work");
        assert!(positive > 0.0);
    }

    #[test]
    fn test_graph_resolves_specialist_request() {
        let state = ExecutionState::new("Please upgrade my subscription");
        let raw = KeywordGraph::default().invoke(state).unwrap();
        let result = parse_result(&raw).unwrap();
        assert_eq!(result.status(), ConversationStatus::Resolved);
        assert_eq!(result.agent_path(), ["router".to_string(), "billing_agent".to_string()]);
        assert_eq!(result.turn_count(), 1);
    }

    #[test]
    fn test_graph_answers_simple_intent_directly() {
        let raw = KeywordGraph::default()
            .invoke(ExecutionState::new("hello there"))
            .unwrap();
        let result = parse_result(&raw).unwrap();
        assert_eq!(result.agent_path(), ["router".to_string()]);
        assert_eq!(result.agent_response(), "Hello! How can I help you today?");
    }

    #[test]
    fn test_graph_escalates_low_confidence_and_angry_customers() {
        let raw = KeywordGraph::default()
            .invoke(ExecutionState::new("something odd happened"))
            .unwrap();
        let result = parse_result(&raw).unwrap();
        assert_eq!(result.status(), ConversationStatus::Escalated);
        assert!(result.agent_path().contains(&"escalation_agent".to_string()));

        let raw = KeywordGraph::default()
            .invoke(ExecutionState::new("this bug is terrible and useless"))
            .unwrap();
        let result = parse_result(&raw).unwrap();
        assert_eq!(result.status(), ConversationStatus::Escalated);
        assert!(result.escalation_reason().unwrap().contains("sentiment"));
    }

    #[test]
    fn test_graph_honours_human_request() {
        let raw = KeywordGraph::default()
            .invoke(ExecutionState::new("refund now, get me a manager"))
            .unwrap();
        let result = parse_result(&raw).unwrap();
        assert!(result.should_escalate());
        assert_eq!(result.escalation_reason(), Some("customer asked for a human agent"));
    }

    #[test]
    fn test_strict_graph_rejects_unmapped_rule() {
        let router =
            KeywordRouter::new(vec![KeywordRule::new("shipping_status", 0.9, &["parcel"])]);
        let graph = KeywordGraph::new(router, RoutingPolicy::new(true));
        let err = graph.invoke(ExecutionState::new("where is my parcel")).unwrap_err();
        assert!(matches!(err, GraphError::Routing(_)));
        assert!(err.to_string().contains("shipping_status"));
    }
}
