//! 运行过程事件：用于向 CLI / UI 推送进度（可序列化为 JSON）

use serde::Serialize;

use crate::core::{ErrorCode, TerminationReason};

/// 单步过程事件
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    RunStarted {
        run_id: String,
        service: String,
        goal: String,
    },
    /// 轮数更新（当前第几轮）
    TurnStarted { turn: usize, max_turns: usize },
    /// 正在等待模型
    Thinking,
    /// 模型附带的文字说明
    ModelText { text: String },
    OperationProposed {
        operation: String,
        args: serde_json::Value,
    },
    /// 同一轮提出多个操作，仅执行第一个
    OperationsDiscarded {
        executed: String,
        discarded: Vec<String>,
    },
    OperationResult {
        operation: String,
        success: bool,
        error: Option<ErrorCode>,
        message: String,
    },
    SnapshotCaptured {
        generation: u64,
        elements: usize,
        omitted: usize,
        url: String,
    },
    ApprovalRequested { action: String, reason: String },
    ApprovalResolved {
        approved: bool,
        feedback: Option<String>,
    },
    /// 错误恢复动作（重试等）
    Recovery { action: String, detail: String },
    Finished {
        success: bool,
        reason: TerminationReason,
        turns: usize,
    },
}
