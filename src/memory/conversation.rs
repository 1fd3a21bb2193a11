//! 对话历史消息
//!
//! 每次模型调用都发送完整历史；截图以 base64 PNG 附件形式挂在消息上，由模型客户端负责转换为具体厂商格式。

use serde::{Deserialize, Serialize};

use crate::llm::ToolCall;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// 操作结果（对应某个 tool_call_id）
    Tool,
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// base64 PNG 截图
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// assistant 消息中模型提出的操作
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn plain(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            image: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content.into())
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content.into())
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::plain(Role::Assistant, content.into());
        msg.tool_calls = tool_calls;
        msg
    }

    pub fn tool(tool_call_id: Option<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::plain(Role::Tool, content.into());
        msg.tool_call_id = tool_call_id;
        msg
    }

    /// 附加截图（空字符串视为无截图）
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        let image = image.into();
        if !image.is_empty() {
            self.image = Some(image);
        }
        self
    }
}
