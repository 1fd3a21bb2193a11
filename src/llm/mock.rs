//! 脚本化 LLM 客户端（用于测试，无需 API）
//!
//! 按顺序返回预设回复；脚本耗尽后返回不含任何操作的空回复。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, ModelResponse};
use crate::memory::Message;
use crate::tools::OperationSchema;

/// 脚本化客户端：记录调用次数与最近一次收到的历史
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<ModelResponse, LlmError>>>,
    invocations: AtomicUsize,
    last_messages: Mutex<Vec<Message>>,
}

impl ScriptedLlmClient {
    pub fn new(script: Vec<Result<ModelResponse, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            invocations: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        }
    }

    /// 全部为成功回复的脚本
    pub fn from_responses(responses: Vec<ModelResponse>) -> Self {
        Self::new(responses.into_iter().map(Ok).collect())
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn last_messages(&self) -> Vec<Message> {
        self.last_messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn invoke(
        &self,
        messages: &[Message],
        _operations: &[OperationSchema],
    ) -> Result<ModelResponse, LlmError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_messages.lock() {
            *last = messages.to_vec();
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| Ok(ModelResponse::default()))
    }
}
