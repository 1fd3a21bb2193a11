//! 推理模型客户端抽象
//!
//! 编排器只要求：发送完整历史与操作 schema，返回零个或多个提议的操作（名称 + 参数）。
//! 具体厂商格式转换、鉴权由实现方负责。RetryingLlmClient 为任意实现加上超时与指数退避重试。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::timeout;

use crate::memory::Message;
use crate::tools::OperationSchema;

/// 模型提议的一次操作调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// 厂商侧调用 ID（用于把结果对应回调用）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: None,
            name: name.into(),
            arguments,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// 一次模型回复
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelResponse {
    /// 只含一个操作的回复
    pub fn call(name: &str, arguments: serde_json::Value) -> Self {
        Self {
            text: None,
            tool_calls: vec![ToolCall::new(name, arguments)],
        }
    }

    pub fn calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            text: None,
            tool_calls,
        }
    }

    /// 纯文本、没有操作的回复
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }
}

/// 模型调用错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("Model request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Network error: {0}")]
    Network(String),

    /// 厂商侧 5xx 等
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl LlmError {
    /// 瞬时错误才值得重试
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Timeout { .. }
            | LlmError::RateLimited { .. }
            | LlmError::Network(_)
            | LlmError::Provider(_) => true,
            LlmError::InvalidRequest(_) | LlmError::Auth(_) => false,
        }
    }
}

/// 模型客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn invoke(
        &self,
        messages: &[Message],
        operations: &[OperationSchema],
    ) -> Result<ModelResponse, LlmError>;
}

/// 重试配置
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// 单次请求超时
    pub request_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(8000),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    fn delay_for(&self, attempt: u32, err: &LlmError) -> Duration {
        let backoff = self.base_delay.saturating_mul(1u32 << attempt.min(6));
        let delay = match err {
            LlmError::RateLimited { retry_after_ms } => backoff.max(Duration::from_millis(*retry_after_ms)),
            _ => backoff,
        };
        delay.min(self.max_delay)
    }
}

/// 为任意 LlmClient 加上单次超时与瞬时错误的指数退避重试
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn invoke(
        &self,
        messages: &[Message],
        operations: &[OperationSchema],
    ) -> Result<ModelResponse, LlmError> {
        let mut attempt = 0;
        loop {
            let result = match timeout(self.config.request_timeout, self.inner.invoke(messages, operations)).await {
                Ok(r) => r,
                Err(_) => Err(LlmError::Timeout {
                    timeout_ms: self.config.request_timeout.as_millis() as u64,
                }),
            };
            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.config.delay_for(attempt, &e);
                    tracing::warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "model call failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
