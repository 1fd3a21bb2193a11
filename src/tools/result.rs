//! ToolResult：每个操作的结果，无论成败都作为下一轮输入交还模型

use serde::Serialize;

use crate::browser::Snapshot;
use crate::core::ErrorCode;

#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
    pub error: Option<ErrorCode>,
    pub message: String,
}

impl ToolResult {
    pub fn ok(message: impl Into<String>, snapshot: Option<Snapshot>) -> Self {
        Self {
            success: true,
            snapshot,
            error: None,
            message: message.into(),
        }
    }

    pub fn failure(code: ErrorCode, message: impl Into<String>, snapshot: Option<Snapshot>) -> Self {
        Self {
            success: false,
            snapshot,
            error: Some(code),
            message: message.into(),
        }
    }

    /// 交给模型的文本：结果头（JSON）+ 快照文本
    pub fn to_model_content(&self) -> String {
        let header = serde_json::json!({
            "success": self.success,
            "error": self.error,
            "message": self.message,
        });
        match &self.snapshot {
            Some(snapshot) => format!("{}\n\n{}", header, snapshot.render()),
            None => header.to_string(),
        }
    }

    pub fn screenshot(&self) -> Option<&str> {
        self.snapshot.as_ref().map(|s| s.screenshot.as_str())
    }
}
