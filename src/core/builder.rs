//! State Builder：从消息与可选上下文构造已校验的初始执行状态
//!
//! 只做廉价的同步校验（消息非空、上下文字段类型正确），在任何昂贵工作之前拒绝非法输入。

use serde_json::{Map, Value};

use crate::core::{ExecutionState, HistoryTurn, WorkflowError};

/// 调用方上下文（松散 JSON 对象）
pub type Context = Map<String, Value>;

/// 构造初始状态；任何校验失败都返回 InvalidState（永不重试）
pub fn build_initial_state(
    message: &str,
    context: Option<&Context>,
) -> Result<ExecutionState, WorkflowError> {
    if message.trim().is_empty() {
        return Err(WorkflowError::invalid_state("message must not be empty"));
    }

    let mut state = ExecutionState::new(message);
    let Some(ctx) = context else {
        return Ok(state);
    };

    state.conversation_id = optional_string(ctx, "conversation_id")?;
    state.customer_id = optional_id(ctx, "customer_id")?;

    if let Some(value) = present(ctx, "customer_metadata") {
        state.customer_metadata = value
            .as_object()
            .cloned()
            .ok_or_else(|| type_error("customer_metadata", "an object"))?;
    }

    if let Some(value) = present(ctx, "conversation_history") {
        state.conversation_history = parse_history(value)?;
        state.turn_count = u32::try_from(state.conversation_history.len())
            .map_err(|_| WorkflowError::invalid_state("conversation_history is too long"))?;
    }

    Ok(state)
}

/// null 视为缺省
fn present<'a>(ctx: &'a Context, key: &str) -> Option<&'a Value> {
    ctx.get(key).filter(|v| !v.is_null())
}

fn optional_string(ctx: &Context, key: &str) -> Result<Option<String>, WorkflowError> {
    match present(ctx, key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(type_error(key, "a string")),
    }
}

/// 标识符允许字符串或整数，统一存为字符串
fn optional_id(ctx: &Context, key: &str) -> Result<Option<String>, WorkflowError> {
    match present(ctx, key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(Some(n.to_string())),
        Some(_) => Err(type_error(key, "a string or integer")),
    }
}

fn parse_history(value: &Value) -> Result<Vec<HistoryTurn>, WorkflowError> {
    let items = value
        .as_array()
        .ok_or_else(|| type_error("conversation_history", "an array"))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let role = item.get("role").and_then(Value::as_str);
            let content = item.get("content").and_then(Value::as_str);
            match (role, content) {
                (Some(role), Some(content)) => Ok(HistoryTurn {
                    role: role.to_string(),
                    content: content.to_string(),
                }),
                _ => Err(WorkflowError::invalid_state(format!(
                    "conversation_history[{i}] must have string role and content"
                ))),
            }
        })
        .collect()
}

fn type_error(key: &str, expected: &str) -> WorkflowError {
    WorkflowError::invalid_state(format!("context field {key} must be {expected}"))
}
