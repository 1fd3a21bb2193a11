//! 人工确认通道
//!
//! ApprovalChannel 是编排器与人之间唯一的 I/O 接缝：CLI / UI 实现它，或通过 ApprovalBroker
//! 从 mpsc 队列逐个取出请求、用 oneshot 回复。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::checkpoint::ActionStage;

/// 确认请求的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalSource {
    /// 服务检查点命中
    Checkpoint { stage: ActionStage },
    /// 模型调用 request_human_approval
    Model,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApprovalRequest {
    pub action: String,
    pub reason: String,
    pub source: ApprovalSource,
    pub url: String,
    /// 请求时的截图（base64 PNG）
    #[serde(skip)]
    pub screenshot: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected { feedback: Option<String> },
}

impl ApprovalDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, ApprovalDecision::Approved)
    }
}

#[async_trait]
pub trait ApprovalChannel: Send + Sync {
    async fn request(&self, request: &ApprovalRequest) -> ApprovalDecision;
}

/// 固定答复的通道（无人值守运行 / 测试）
#[derive(Debug)]
pub struct StaticApproval {
    decision: ApprovalDecision,
    requests: Mutex<Vec<ApprovalRequest>>,
}

impl StaticApproval {
    pub fn approve() -> Self {
        Self::with_decision(ApprovalDecision::Approved)
    }

    pub fn reject(feedback: Option<&str>) -> Self {
        Self::with_decision(ApprovalDecision::Rejected {
            feedback: feedback.map(str::to_string),
        })
    }

    fn with_decision(decision: ApprovalDecision) -> Self {
        Self {
            decision,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 已收到的请求
    pub fn requests(&self) -> Vec<ApprovalRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ApprovalChannel for StaticApproval {
    async fn request(&self, request: &ApprovalRequest) -> ApprovalDecision {
        if let Ok(mut r) = self.requests.lock() {
            r.push(request.clone());
        }
        self.decision.clone()
    }
}

/// 排队等待人工答复的请求
#[derive(Debug)]
pub struct PendingApproval {
    pub request: ApprovalRequest,
    responder: oneshot::Sender<ApprovalDecision>,
}

impl PendingApproval {
    pub fn approve(self) {
        let _ = self.responder.send(ApprovalDecision::Approved);
    }

    pub fn reject(self, feedback: Option<String>) {
        let _ = self.responder.send(ApprovalDecision::Rejected { feedback });
    }
}

/// 基于通道的确认代理：编排器一侧实现 ApprovalChannel，UI 一侧消费 PendingApproval
#[derive(Debug)]
pub struct ApprovalBroker {
    tx: mpsc::UnboundedSender<PendingApproval>,
    issued: AtomicUsize,
}

impl ApprovalBroker {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PendingApproval>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                issued: AtomicUsize::new(0),
            },
            rx,
        )
    }

    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ApprovalChannel for ApprovalBroker {
    /// 接收端关闭或答复方丢弃请求时视为拒绝
    async fn request(&self, request: &ApprovalRequest) -> ApprovalDecision {
        let (responder, answer) = oneshot::channel();
        let pending = PendingApproval {
            request: request.clone(),
            responder,
        };
        if self.tx.send(pending).is_err() {
            tracing::warn!(action = %request.action, "approval receiver closed, treating as rejection");
            return ApprovalDecision::Rejected {
                feedback: Some("approval channel closed".to_string()),
            };
        }
        self.issued.fetch_add(1, Ordering::Relaxed);
        answer.await.unwrap_or_else(|_| ApprovalDecision::Rejected {
            feedback: Some("approval request dropped".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ApprovalRequest {
        ApprovalRequest {
            action: "click button \"Confirm cancellation\"".into(),
            reason: "irreversible".into(),
            source: ApprovalSource::Checkpoint {
                stage: ActionStage::Proposed,
            },
            url: "https://example.test".into(),
            screenshot: None,
        }
    }

    #[tokio::test]
    async fn test_static_approval_records_requests() {
        let channel = StaticApproval::reject(Some("not today"));
        let decision = channel.request(&request()).await;
        assert_eq!(
            decision,
            ApprovalDecision::Rejected {
                feedback: Some("not today".into())
            }
        );
        assert_eq!(channel.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_broker_round_trip() {
        let (broker, mut rx) = ApprovalBroker::new();
        let ui = tokio::spawn(async move {
            let pending = rx.recv().await.unwrap();
            assert_eq!(pending.request.reason, "irreversible");
            pending.approve();
        });
        let decision = broker.request(&request()).await;
        assert!(decision.is_approved());
        assert_eq!(broker.issued(), 1);
        ui.await.unwrap();
    }

    #[tokio::test]
    async fn test_broker_closed_receiver_rejects() {
        let (broker, rx) = ApprovalBroker::new();
        drop(rx);
        let decision = broker.request(&request()).await;
        assert!(!decision.is_approved());
    }
}
