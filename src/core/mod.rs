//! 核心编排层：错误与恢复、运行阶段、会话监管、任务编排器

pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod session_supervisor;
pub mod state;

pub use error::{
    ActionError, ErrorCode, OperationError, OrchestratorError, ReferenceError, TerminationReason,
};
pub use orchestrator::{TaskOrchestrator, TaskResult};
pub use recovery::{RecoveryAction, RecoveryEngine};
pub use session_supervisor::SessionSupervisor;
pub use state::RunPhase;
