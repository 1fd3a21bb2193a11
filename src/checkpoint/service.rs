//! 服务配置：检查点 / 成功 / 失败断言与附加到 system prompt 的指引
//!
//! 每次运行构建一次、之后只读；断言均为无副作用的 `Fn`。

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::browser::Snapshot;
use crate::checkpoint::PendingAction;

/// 检查点断言：拟执行/刚完成的动作 + 最新快照
pub type CheckpointPredicate = Arc<dyn Fn(&PendingAction, &Snapshot) -> bool + Send + Sync>;
/// 成功 / 失败断言：仅看最新快照
pub type SnapshotPredicate = Arc<dyn Fn(&Snapshot) -> bool + Send + Sync>;

/// 人工拒绝后的处理
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionPolicy {
    /// 以 human_rejected 终止运行
    #[default]
    Terminate,
    /// 把拒绝意见作为 HumanRejected 结果交还模型，继续运行
    ReturnToModel,
}

#[derive(Clone, Default)]
pub struct ServiceConfig {
    pub name: String,
    pub guidance: String,
    pub rejection_policy: RejectionPolicy,
    pub(crate) checkpoints: Vec<CheckpointPredicate>,
    pub(crate) success: Vec<SnapshotPredicate>,
    pub(crate) failure: Vec<SnapshotPredicate>,
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_guidance(mut self, guidance: impl Into<String>) -> Self {
        self.guidance = guidance.into();
        self
    }

    pub fn with_rejection_policy(mut self, policy: RejectionPolicy) -> Self {
        self.rejection_policy = policy;
        self
    }

    pub fn with_checkpoint<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&PendingAction, &Snapshot) -> bool + Send + Sync + 'static,
    {
        self.checkpoints.push(Arc::new(predicate));
        self
    }

    pub fn with_success<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Snapshot) -> bool + Send + Sync + 'static,
    {
        self.success.push(Arc::new(predicate));
        self
    }

    pub fn with_failure<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Snapshot) -> bool + Send + Sync + 'static,
    {
        self.failure.push(Arc::new(predicate));
        self
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("name", &self.name)
            .field("guidance", &self.guidance)
            .field("rejection_policy", &self.rejection_policy)
            .field("checkpoints", &self.checkpoints.len())
            .field("success", &self.success.len())
            .field("failure", &self.failure.len())
            .finish()
    }
}
