//! 检查点评估：纯断言求值，不做任何 I/O

use std::sync::Arc;

use serde::Serialize;

use crate::browser::{ElementDescriptor, Snapshot};
use crate::checkpoint::ServiceConfig;

/// 动作所处阶段：分发前（Proposed）或成功执行并重新快照后（Completed）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStage {
    Proposed,
    Completed,
}

/// 交给检查点断言的动作描述
#[derive(Debug, Clone)]
pub struct PendingAction {
    pub operation: String,
    pub stage: ActionStage,
    /// 目标元素（页面滚动时为 None）
    pub target: Option<ElementDescriptor>,
    /// fill / select 的值
    pub value: Option<String>,
    pub description: String,
}

impl PendingAction {
    pub fn new(operation: impl Into<String>, stage: ActionStage, description: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            stage,
            target: None,
            value: None,
            description: description.into(),
        }
    }

    pub fn with_target(mut self, target: ElementDescriptor) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn at_stage(&self, stage: ActionStage) -> Self {
        let mut next = self.clone();
        next.stage = stage;
        next
    }

    pub fn target_name(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.name.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointEvaluator {
    service: Arc<ServiceConfig>,
}

impl CheckpointEvaluator {
    pub fn new(service: Arc<ServiceConfig>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &ServiceConfig {
        &self.service
    }

    /// 任一检查点断言命中即需人工确认
    pub fn should_checkpoint(&self, pending: &PendingAction, snapshot: &Snapshot) -> bool {
        self.service.checkpoints.iter().any(|p| p(pending, snapshot))
    }

    /// 任一成功断言命中；未配置成功断言时永远为 false
    pub fn verify_success(&self, snapshot: &Snapshot) -> bool {
        self.service.success.iter().any(|p| p(snapshot))
    }

    pub fn check_failure(&self, snapshot: &Snapshot) -> bool {
        self.service.failure.iter().any(|p| p(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::Viewport;
    use chrono::Utc;

    fn snapshot(title: &str) -> Snapshot {
        Snapshot {
            generation: 1,
            elements: Vec::new(),
            focused: None,
            url: "https://example.test/account".into(),
            title: title.into(),
            screenshot: String::new(),
            viewport: Viewport::new(1280.0, 720.0),
            omitted: 0,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_evaluator_any_semantics() {
        let service = ServiceConfig::new("demo")
            .with_success(|s| s.title.contains("Cancelled"))
            .with_success(|s| s.url.ends_with("/done"))
            .with_failure(|s| s.title.contains("Error"))
            .with_checkpoint(|p, _| p.operation == "click" && p.stage == ActionStage::Proposed);
        let evaluator = CheckpointEvaluator::new(Arc::new(service));

        assert!(evaluator.verify_success(&snapshot("Subscription Cancelled")));
        assert!(!evaluator.verify_success(&snapshot("Account")));
        assert!(evaluator.check_failure(&snapshot("Error 500")));

        let pending = PendingAction::new("click", ActionStage::Proposed, "click @e1");
        assert!(evaluator.should_checkpoint(&pending, &snapshot("Account")));
        assert!(!evaluator.should_checkpoint(
            &pending.at_stage(ActionStage::Completed),
            &snapshot("Account")
        ));
    }

    #[test]
    fn test_empty_service_never_verifies() {
        let evaluator = CheckpointEvaluator::new(Arc::new(ServiceConfig::new("empty")));
        let snap = snapshot("Anything");
        assert!(!evaluator.verify_success(&snap));
        assert!(!evaluator.check_failure(&snap));
        assert!(!evaluator.should_checkpoint(
            &PendingAction::new("fill", ActionStage::Proposed, "fill"),
            &snap
        ));
    }
}
