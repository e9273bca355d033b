//! 工作流编排器：超时 / 重试监管
//!
//! 无状态协调者：每次 execute 自建初始状态，按 max_retries + 1 次尝试运行响应图，
//! 每次尝试都从同一份初始状态的新副本开始。结果只有两种：已校验的 ExecutionResult，
//! 或 InvalidState / AgentTimeout / AgentExecution / Routing 之一。
//!
//! 重试间隔是固定常量（默认 1 秒），不是指数退避：重试只用来吸收偶发抖动。

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use config::ConfigError;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{AppConfig, EngineSection};
use crate::core::{
    build_initial_state, parse_result, AttemptError, Context, ExecutionResult, ExecutionState,
    GraphRunner, WorkflowError,
};
use crate::graph::{EntryResponder, GraphError, ResponderGraph};
use crate::routing::{IntentClassification, IntentClassifier, Responder, RoutingPolicy};

/// 运行时引擎参数（由 [engine] 配置段转换而来）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineOptions {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_concurrent_graphs: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        let section = EngineSection::default();
        Self {
            timeout: Duration::from_secs_f64(section.timeout_secs),
            max_retries: section.max_retries,
            retry_delay: Duration::from_millis(section.retry_delay_ms),
            max_concurrent_graphs: section.max_concurrent_graphs,
        }
    }
}

/// 配置段 → 运行时参数；预算必须是正的有限秒数，并发上限至少为 1
impl TryFrom<&EngineSection> for EngineOptions {
    type Error = ConfigError;

    fn try_from(section: &EngineSection) -> Result<Self, Self::Error> {
        let timeout = Duration::try_from_secs_f64(section.timeout_secs)
            .ok()
            .filter(|t| !t.is_zero())
            .ok_or_else(|| {
                ConfigError::Message(format!(
                    "engine.timeout_secs must be a positive number, got {}",
                    section.timeout_secs
                ))
            })?;
        if section.max_concurrent_graphs == 0 {
            return Err(ConfigError::Message(
                "engine.max_concurrent_graphs must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            timeout,
            max_retries: section.max_retries,
            retry_delay: Duration::from_millis(section.retry_delay_ms),
            max_concurrent_graphs: section.max_concurrent_graphs,
        })
    }
}

/// 供应用层持有的异步接口（便于替换为测试替身）
#[async_trait]
pub trait MessageWorkflow: Send + Sync {
    async fn execute(
        &self,
        message: &str,
        context: Option<&Context>,
    ) -> Result<ExecutionResult, WorkflowError>;

    async fn classify_intent(&self, message: &str) -> Result<IntentClassification, WorkflowError>;
}

/// 工作流编排器；除共享工作线程池外不持有跨调用的可变状态，可并发调用
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    runner: GraphRunner,
    classifier: IntentClassifier,
    policy: RoutingPolicy,
    options: EngineOptions,
}

impl WorkflowOrchestrator {
    pub fn new(
        graph: Arc<dyn ResponderGraph>,
        entry: Arc<dyn EntryResponder>,
        options: EngineOptions,
        policy: RoutingPolicy,
    ) -> Self {
        let runner = GraphRunner::new(graph, options.max_concurrent_graphs);
        let classifier = IntentClassifier::new(entry, runner.clone());
        Self {
            runner,
            classifier,
            policy,
            options,
        }
    }

    pub fn from_config(
        graph: Arc<dyn ResponderGraph>,
        entry: Arc<dyn EntryResponder>,
        cfg: &AppConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            graph,
            entry,
            EngineOptions::try_from(&cfg.engine)?,
            RoutingPolicy::new(cfg.routing.strict),
        ))
    }

    /// 运行完整响应图并返回校验后的结果
    pub async fn execute(
        &self,
        message: &str,
        context: Option<&Context>,
    ) -> Result<ExecutionResult, WorkflowError> {
        let execution_id = Uuid::new_v4();
        let span = tracing::info_span!("workflow_execute", %execution_id);
        self.execute_inner(message, context).instrument(span).await
    }

    async fn execute_inner(
        &self,
        message: &str,
        context: Option<&Context>,
    ) -> Result<ExecutionResult, WorkflowError> {
        let started = Instant::now();
        let initial = build_initial_state(message, context).map_err(|e| {
            tracing::warn!(error = %e, "rejected input before execution");
            e
        })?;

        let mut attempt: u32 = 0;
        loop {
            let failure = match self.runner.run(initial.clone(), self.options.timeout).await {
                Ok(raw) => {
                    let result = self.finalize(&initial, &raw)?;
                    tracing::info!(
                        attempts = attempt + 1,
                        intent = result.primary_intent().unwrap_or("-"),
                        status = result.status().as_str(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "workflow completed"
                    );
                    return Ok(result);
                }
                Err(AttemptError::Failed(GraphError::InvalidState(msg))) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %msg,
                        "graph reported invalid state"
                    );
                    return Err(WorkflowError::InvalidState(msg));
                }
                Err(AttemptError::Failed(GraphError::Routing(e))) => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "graph routing failed");
                    return Err(WorkflowError::Routing(e));
                }
                Err(failure) => failure,
            };

            match &failure {
                AttemptError::TimedOut => tracing::warn!(
                    attempt = attempt + 1,
                    timeout_ms = self.options.timeout.as_millis() as u64,
                    "graph attempt timed out"
                ),
                AttemptError::Failed(e) => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "graph attempt failed")
                }
            }

            if attempt >= self.options.max_retries {
                let err = match failure {
                    AttemptError::TimedOut => WorkflowError::AgentTimeout {
                        timeout: self.options.timeout,
                    },
                    AttemptError::Failed(source) => WorkflowError::AgentExecution { source },
                };
                tracing::error!(attempts = attempt + 1, error = %err, "workflow failed");
                return Err(err);
            }

            attempt += 1;
            tokio::time::sleep(self.options.retry_delay).await;
        }
    }

    /// 解析图输出，并检查 turn_count 没有倒退
    fn finalize(
        &self,
        initial: &ExecutionState,
        raw: &crate::graph::RawState,
    ) -> Result<ExecutionResult, WorkflowError> {
        let result = parse_result(raw).map_err(|e| {
            tracing::warn!(error = %e, "graph output failed validation");
            e
        })?;
        if result.turn_count() < initial.turn_count {
            return Err(WorkflowError::invalid_state(format!(
                "turn_count decreased from {} to {}",
                initial.turn_count,
                result.turn_count()
            )));
        }
        Ok(result)
    }

    /// 只运行入口阶段，得到意图三元组
    pub async fn classify_intent(
        &self,
        message: &str,
    ) -> Result<IntentClassification, WorkflowError> {
        self.classifier.classify(message).await
    }

    pub fn route_to_agent(&self, intent: &str, confidence: f64) -> Option<Responder> {
        self.policy.route_to_agent(intent, confidence)
    }

    /// strict 模式下未映射意图返回 Routing 错误
    pub fn resolve_agent(
        &self,
        intent: &str,
        confidence: f64,
    ) -> Result<Option<Responder>, WorkflowError> {
        Ok(self.policy.resolve_agent(intent, confidence)?)
    }

    pub fn should_escalate(&self, state: &ExecutionState) -> bool {
        crate::routing::should_escalate(state)
    }
}

#[async_trait]
impl MessageWorkflow for WorkflowOrchestrator {
    async fn execute(
        &self,
        message: &str,
        context: Option<&Context>,
    ) -> Result<ExecutionResult, WorkflowError> {
        WorkflowOrchestrator::execute(self, message, context).await
    }

    async fn classify_intent(&self, message: &str) -> Result<IntentClassification, WorkflowError> {
        WorkflowOrchestrator::classify_intent(self, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RawState;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_options() -> EngineOptions {
        EngineOptions {
            timeout: Duration::from_millis(200),
            max_retries: 2,
            retry_delay: Duration::from_millis(5),
            max_concurrent_graphs: 4,
        }
    }

    fn entry() -> Arc<dyn EntryResponder> {
        Arc::new(|_state: &ExecutionState| -> Result<RawState, GraphError> {
            Ok(json!({"primary_intent": "faq", "intent_confidence": 0.9, "sentiment": 0.1}))
        })
    }

    fn orchestrator(graph: Arc<dyn ResponderGraph>) -> WorkflowOrchestrator {
        WorkflowOrchestrator::new(graph, entry(), fast_options(), RoutingPolicy::default())
    }

    fn completed(mut state: ExecutionState) -> Result<RawState, GraphError> {
        state.record_agent("router");
        state.primary_intent = Some("faq".into());
        state.intent_confidence = 0.9;
        state.response_confidence = 0.9;
        state.agent_response = "We are open 24/7.".into();
        state.status = crate::core::ConversationStatus::Resolved;
        state.to_raw()
    }

    #[test]
    fn test_options_from_section() {
        let opts = EngineOptions::default();
        assert_eq!(opts.timeout, Duration::from_secs(30));
        assert_eq!(opts.max_retries, 2);
        assert_eq!(opts.retry_delay, Duration::from_secs(1));
        assert_eq!(EngineOptions::try_from(&EngineSection::default()).unwrap(), opts);

        let section = EngineSection {
            timeout_secs: 0.25,
            retry_delay_ms: 50,
            ..EngineSection::default()
        };
        let opts = EngineOptions::try_from(&section).unwrap();
        assert_eq!(opts.timeout, Duration::from_millis(250));
        assert_eq!(opts.retry_delay, Duration::from_millis(50));
    }

    #[test]
    fn test_invalid_sections_rejected() {
        for timeout_secs in [f64::NAN, f64::INFINITY, 0.0, -1.0] {
            let section = EngineSection {
                timeout_secs,
                ..EngineSection::default()
            };
            assert!(EngineOptions::try_from(&section).is_err(), "{timeout_secs}");
        }
        let section = EngineSection {
            max_concurrent_graphs: 0,
            ..EngineSection::default()
        };
        assert!(EngineOptions::try_from(&section).is_err());
    }

    #[test]
    fn test_from_config_uses_routing_section() {
        let mut cfg = AppConfig::default();
        cfg.routing.strict = true;
        let orch = WorkflowOrchestrator::from_config(Arc::new(completed), entry(), &cfg).unwrap();
        assert!(matches!(
            orch.resolve_agent("unmapped_intent", 0.6),
            Err(WorkflowError::Routing(_))
        ));

        cfg.engine.timeout_secs = -2.0;
        assert!(WorkflowOrchestrator::from_config(Arc::new(completed), entry(), &cfg).is_err());
    }

    #[tokio::test]
    async fn test_execute_success_first_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let graph = Arc::new(move |state: ExecutionState| -> Result<RawState, GraphError> {
            counter.fetch_add(1, Ordering::SeqCst);
            completed(state)
        });
        let orch = orchestrator(graph);
        let result = orch.execute("What are your hours?", None).await.unwrap();
        assert_eq!(result.agent_response(), "We are open 24/7.");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_graph_invalid_state_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let graph = Arc::new(move |_state: ExecutionState| -> Result<RawState, GraphError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(GraphError::InvalidState("entities malformed".into()))
        });
        let orch = orchestrator(graph);
        let err = orch.execute("hi", None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execution_error_wraps_last_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let graph = Arc::new(move |_state: ExecutionState| -> Result<RawState, GraphError> {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Err(GraphError::Responder {
                agent: "billing_agent".into(),
                message: format!("failure #{n}"),
            })
        });
        let orch = orchestrator(graph);
        let err = orch.execute("refund please", None).await.unwrap_err();
        match err {
            WorkflowError::AgentExecution { source } => {
                assert!(source.to_string().contains("failure #3"));
            }
            other => panic!("expected AgentExecution, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_each_attempt_gets_fresh_state() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let graph = Arc::new(move |mut state: ExecutionState| -> Result<RawState, GraphError> {
            // 每次尝试都应看到空的 agent_history
            assert!(state.agent_history.is_empty());
            state.record_agent("router");
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(GraphError::Other(anyhow::anyhow!("transient")));
            }
            completed(state)
        });
        let orch = orchestrator(graph);
        let result = orch.execute("hours?", None).await.unwrap();
        assert_eq!(result.agent_history(), ["router".to_string(), "router".to_string()]);
    }

    #[tokio::test]
    async fn test_turn_count_regression_rejected() {
        let graph = Arc::new(|mut state: ExecutionState| -> Result<RawState, GraphError> {
            state.turn_count = 0;
            completed(state)
        });
        let orch = orchestrator(graph);
        let context = json!({
            "conversation_history": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"}
            ]
        });
        let err = orch
            .execute("hours?", context.as_object())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("turn_count"));
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let graph = Arc::new(move |_state: ExecutionState| -> Result<RawState, GraphError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(GraphError::Other(anyhow::anyhow!("down")))
        });
        let options = EngineOptions {
            max_retries: 0,
            ..fast_options()
        };
        let orch = WorkflowOrchestrator::new(graph, entry(), options, RoutingPolicy::default());
        assert!(orch.execute("hi", None).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_strict_policy_surfaces_routing_error() {
        let graph = Arc::new(completed);
        let orch =
            WorkflowOrchestrator::new(graph, entry(), fast_options(), RoutingPolicy::new(true));
        assert!(matches!(
            orch.resolve_agent("unmapped_intent", 0.6),
            Err(WorkflowError::Routing(_))
        ));
        assert_eq!(
            orch.route_to_agent("unmapped_intent", 0.6),
            Some(Responder::Escalation)
        );
    }
}
