//! 记忆层：单次运行的对话历史（不跨进程持久化）

pub mod conversation;

pub use conversation::{Message, Role};
