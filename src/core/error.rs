//! 错误分类与终止原因
//!
//! - ErrorCode：回传给模型的 ToolResult 错误码（固定枚举）
//! - ActionError / ReferenceError / OperationError：可恢复，转为 ToolResult 交还模型
//! - OrchestratorError：驱动或模型连接失败，重试一次后终止
//! - TerminationReason：TaskResult 的终止原因，CLI 据此映射退出码

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::browser::DriverError;
use crate::llm::LlmError;

/// ToolResult 中的错误码（序列化为 `"InvalidParameters"` 等）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    ReferenceInvalid,
    ElementDisabled,
    ElementObscured,
    ElementNotVisible,
    ActionTimeout,
    ActionFailed,
    InvalidParameters,
    HumanRejected,
    VerificationFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ReferenceInvalid => "ReferenceInvalid",
            ErrorCode::ElementDisabled => "ElementDisabled",
            ErrorCode::ElementObscured => "ElementObscured",
            ErrorCode::ElementNotVisible => "ElementNotVisible",
            ErrorCode::ActionTimeout => "ActionTimeout",
            ErrorCode::ActionFailed => "ActionFailed",
            ErrorCode::InvalidParameters => "InvalidParameters",
            ErrorCode::HumanRejected => "HumanRejected",
            ErrorCode::VerificationFailed => "VerificationFailed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单次浏览器交互失败（ActionExecutor 产生）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("Element is disabled: {0}")]
    ElementDisabled(String),

    #[error("Element is obscured by another element: {0}")]
    ElementObscured(String),

    #[error("Element is not visible: {0}")]
    ElementNotVisible(String),

    #[error("Action '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Action failed: {0}")]
    Failed(String),

    /// 驱动不可达（连接断开），不回传模型，由编排器重试后终止
    #[error("Browser driver unreachable: {0}")]
    Unreachable(String),
}

impl ActionError {
    /// 显式逐项映射，新增变体时编译器会要求补齐
    pub fn code(&self) -> ErrorCode {
        match self {
            ActionError::ElementDisabled(_) => ErrorCode::ElementDisabled,
            ActionError::ElementObscured(_) => ErrorCode::ElementObscured,
            ActionError::ElementNotVisible(_) => ErrorCode::ElementNotVisible,
            ActionError::Timeout { .. } => ErrorCode::ActionTimeout,
            ActionError::Failed(_) => ErrorCode::ActionFailed,
            ActionError::Unreachable(_) => ErrorCode::ActionFailed,
        }
    }
}

/// Handle 解析失败：不属于当前代、越界或尚无快照
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("Handle {handle} belongs to snapshot generation {issued}, current generation is {current}; take a fresh look at the latest snapshot")]
    StaleGeneration {
        handle: String,
        issued: u64,
        current: u64,
    },

    #[error("Handle {handle} does not exist in snapshot generation {generation}")]
    Unknown { handle: String, generation: u64 },

    #[error("No snapshot is registered; call get_snapshot first")]
    NoSnapshot,
}

impl ReferenceError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::ReferenceInvalid
    }
}

/// 模型给出的操作名或参数不合法
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Invalid parameters for '{operation}': {reason}")]
    InvalidParameters { operation: String, reason: String },
}

impl OperationError {
    pub fn invalid(operation: &str, reason: impl Into<String>) -> Self {
        OperationError::InvalidParameters {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        ErrorCode::InvalidParameters
    }
}

/// 致命错误：驱动 / 模型连接失败（已用尽重试）
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Browser driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Model error: {0}")]
    Llm(#[from] LlmError),

    #[error("Browser driver unreachable: {0}")]
    Unreachable(String),
}

/// 运行终止原因（序列化为 snake_case，如 `max_turns_exceeded`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// complete_task(success) 且经成功断言确认
    TaskCompleted,
    /// 模型主动声明失败
    TaskFailed,
    HumanRejected,
    /// 连续三次没有提出任何操作
    Stalled,
    MaxTurnsExceeded,
    ConnectionError,
    Interrupted,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::TaskCompleted => "task_completed",
            TerminationReason::TaskFailed => "task_failed",
            TerminationReason::HumanRejected => "human_rejected",
            TerminationReason::Stalled => "stalled",
            TerminationReason::MaxTurnsExceeded => "max_turns_exceeded",
            TerminationReason::ConnectionError => "connection_error",
            TerminationReason::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serializes_as_name() {
        let json = serde_json::to_string(&ErrorCode::InvalidParameters).unwrap();
        assert_eq!(json, "\"InvalidParameters\"");
    }

    #[test]
    fn test_termination_reason_snake_case() {
        let json = serde_json::to_string(&TerminationReason::MaxTurnsExceeded).unwrap();
        assert_eq!(json, "\"max_turns_exceeded\"");
        assert_eq!(TerminationReason::HumanRejected.to_string(), "human_rejected");
    }

    #[test]
    fn test_action_error_codes() {
        assert_eq!(
            ActionError::ElementObscured("div.overlay".into()).code(),
            ErrorCode::ElementObscured
        );
        assert_eq!(
            ActionError::Timeout {
                operation: "click".into(),
                timeout_ms: 10
            }
            .code(),
            ErrorCode::ActionTimeout
        );
        assert_eq!(ActionError::Failed("boom".into()).code(), ErrorCode::ActionFailed);
    }
}
