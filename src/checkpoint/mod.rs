//! 检查点：服务断言、人工确认通道

pub mod approval;
pub mod evaluator;
pub mod predicates;
pub mod service;

pub use approval::{
    ApprovalBroker, ApprovalChannel, ApprovalDecision, ApprovalRequest, ApprovalSource,
    PendingApproval, StaticApproval,
};
pub use evaluator::{ActionStage, CheckpointEvaluator, PendingAction};
pub use service::{CheckpointPredicate, RejectionPolicy, ServiceConfig, SnapshotPredicate};
