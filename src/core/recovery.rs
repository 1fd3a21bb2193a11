//! 错误恢复策略
//!
//! 根据错误类型决定：回传模型（ToolResult）、退避后重试一次、或终止运行。
//! 元素/参数/引用错误从不自动重试，只交还模型自行调整。

use std::time::Duration;

use crate::core::{ActionError, ErrorCode, OrchestratorError, TerminationReason};

/// 恢复引擎给出的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 转为失败的 ToolResult，交给模型下一轮处理
    ReportToModel(ErrorCode),
    /// 等待后重试一次（仅连接类错误）
    RetryAfter(Duration),
    /// 终止当前运行
    Terminate(TerminationReason),
}

/// 错误传播策略；退避时长按指数增长并封顶
#[derive(Debug, Clone)]
pub struct RecoveryEngine {
    max_retries: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl RecoveryEngine {
    pub fn new(max_retries: u32, backoff_base: Duration, backoff_max: Duration) -> Self {
        Self {
            max_retries,
            backoff_base,
            backoff_max,
        }
    }

    /// 第 attempt 次（从 0 开始）重试前的等待时长
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(6);
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_max)
    }

    /// 浏览器动作失败：连接类错误在额度内重试，其余回传模型
    pub fn handle_action(&self, err: &ActionError, attempt: u32) -> RecoveryAction {
        match err {
            ActionError::Unreachable(_) => self.retry_or_terminate(attempt),
            ActionError::ElementDisabled(_)
            | ActionError::ElementObscured(_)
            | ActionError::ElementNotVisible(_)
            | ActionError::Timeout { .. }
            | ActionError::Failed(_) => RecoveryAction::ReportToModel(err.code()),
        }
    }

    /// 快照 / 模型调用等致命路径：在额度内重试，否则以 connection_error 终止
    pub fn handle_fatal(&self, _err: &OrchestratorError, attempt: u32) -> RecoveryAction {
        self.retry_or_terminate(attempt)
    }

    fn retry_or_terminate(&self, attempt: u32) -> RecoveryAction {
        if attempt < self.max_retries {
            RecoveryAction::RetryAfter(self.backoff(attempt))
        } else {
            RecoveryAction::Terminate(TerminationReason::ConnectionError)
        }
    }
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(1, Duration::from_millis(500), Duration::from_millis(8000))
    }
}
