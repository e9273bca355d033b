//! 路由层：意图分类、专家路由与人工升级决策

pub mod classifier;
pub mod policy;

pub use classifier::{IntentClassification, IntentClassifier};
pub use policy::{
    escalation_reason_for, escalation_triggers, is_simple_intent, route_to_agent,
    should_escalate, EscalationSignals, EscalationTrigger, Responder, RoutingError, RoutingPolicy,
};
