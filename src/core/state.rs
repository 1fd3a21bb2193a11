//! 编排器状态机阶段
//!
//! Init → AwaitingModel ⇄ Dispatching (→ AwaitingApproval) → … → Terminated

use serde::Serialize;

/// 单次运行所处阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// 构建 system prompt、拍摄首个快照
    Init,
    AwaitingModel,
    Dispatching,
    /// 等待人工确认（检查点或模型主动请求）
    AwaitingApproval,
    Terminated,
}

impl RunPhase {
    /// 合法的阶段迁移；Terminated 为终态
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        match (self, next) {
            (Terminated, _) => false,
            (_, Terminated) => true,
            (Init, AwaitingModel) => true,
            (AwaitingModel, AwaitingModel) | (AwaitingModel, Dispatching) => true,
            (Dispatching, AwaitingModel) | (Dispatching, AwaitingApproval) => true,
            (AwaitingApproval, Dispatching) | (AwaitingApproval, AwaitingModel) => true,
            _ => false,
        }
    }
}
