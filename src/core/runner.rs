//! Graph Runner：在阻塞线程池上执行同步响应图，并施加墙钟超时
//!
//! 并发受 Semaphore 限制（与请求并发无关）。许可证随阻塞任务一起移动，
//! 超时后被放弃的执行仍占用许可直到真正结束；它的结果会被丢弃，不会进入解析。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use crate::core::ExecutionState;
use crate::graph::{EntryResponder, GraphError, RawState, ResponderGraph};

/// 单次尝试的失败
#[derive(Debug)]
pub enum AttemptError {
    /// 超出时间预算（包括等待工作线程许可的时间）
    TimedOut,
    Failed(GraphError),
}

/// 响应图调度器
#[derive(Clone)]
pub struct GraphRunner {
    graph: Arc<dyn ResponderGraph>,
    permits: Arc<Semaphore>,
}

impl GraphRunner {
    pub fn new(graph: Arc<dyn ResponderGraph>, max_concurrent: usize) -> Self {
        Self {
            graph,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// 当前空闲的工作许可数
    pub fn available_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// 在预算内运行一次完整响应图
    pub async fn run(
        &self,
        state: ExecutionState,
        budget: Duration,
    ) -> Result<RawState, AttemptError> {
        let start = Instant::now();
        let graph = Arc::clone(&self.graph);
        let permits = Arc::clone(&self.permits);

        let result = timeout(budget, async move {
            let permit = acquire(permits).await?;
            dispatch(permit, move || graph.invoke(state)).await
        })
        .await;

        let outcome = match &result {
            Ok(Ok(_)) => "ok",
            Ok(Err(_)) => "error",
            Err(_) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "graph_attempt",
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "budget_ms": budget.as_millis() as u64,
        });
        tracing::debug!(audit = %audit, "graph");

        match result {
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(e)) => Err(AttemptError::Failed(e)),
            Err(_) => Err(AttemptError::TimedOut),
        }
    }

    /// 只运行入口阶段（无超时、无重试）
    pub async fn run_entry(
        &self,
        entry: Arc<dyn EntryResponder>,
        state: ExecutionState,
    ) -> Result<RawState, GraphError> {
        let permit = acquire(Arc::clone(&self.permits)).await?;
        dispatch(permit, move || entry.classify(&state)).await
    }
}

async fn acquire(permits: Arc<Semaphore>) -> Result<OwnedSemaphorePermit, GraphError> {
    permits
        .acquire_owned()
        .await
        .map_err(|_| GraphError::Other(anyhow::anyhow!("graph worker pool closed")))
}

async fn dispatch<F>(permit: OwnedSemaphorePermit, f: F) -> Result<RawState, GraphError>
where
    F: FnOnce() -> Result<RawState, GraphError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let _permit = permit;
        f()
    })
    .await
    .map_err(|e| GraphError::WorkerPanicked(e.to_string()))?
}
