//! LLM 层：推理模型客户端抽象、重试包装与脚本化 Mock

pub mod mock;
pub mod traits;

pub use mock::ScriptedLlmClient;
pub use traits::{LlmClient, LlmError, ModelResponse, RetryConfig, RetryingLlmClient, ToolCall};
