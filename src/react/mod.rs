//! 编排循环：运行上下文、提示词、操作分发与过程事件

pub mod context;
pub mod dispatch;
pub mod events;
pub mod loop_;
pub mod prompt;

pub use context::RunContext;
pub use dispatch::{capture, DispatchOutcome};
pub use events::TaskEvent;
pub use loop_::{run_loop, send_event, LoopOutcome, RunSession};
