//! 操作参数结构与 JSON Schema 生成（schemars 自动生成）
//!
//! 每个操作的参数结构同时用于解析模型参数（serde）和声明给模型的 schema（schemars），保证两者一致。
//! 字段文档注释会进入 schema 的 description，因此用英文书写。

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::browser::ScrollDirection;

pub const GET_SNAPSHOT: &str = "get_snapshot";
pub const CLICK: &str = "click";
pub const FILL: &str = "fill";
pub const SELECT: &str = "select";
pub const SCROLL: &str = "scroll";
pub const REQUEST_HUMAN_APPROVAL: &str = "request_human_approval";
pub const COMPLETE_TASK: &str = "complete_task";

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct GetSnapshotArgs {
    /// Only include elements inside the current viewport.
    #[serde(default)]
    pub viewport_only: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ClickArgs {
    /// Element handle from the latest snapshot, e.g. "@e3".
    pub handle: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FillArgs {
    /// Element handle from the latest snapshot, e.g. "@e3".
    pub handle: String,
    /// Text to type into the element.
    pub value: String,
    /// Clear existing content before typing.
    #[serde(default)]
    pub clear_first: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SelectArgs {
    /// Handle of a combobox or listbox from the latest snapshot.
    pub handle: String,
    /// Option value or visible label to select.
    pub value: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ScrollArgs {
    /// Scroll this element into view. Provide either handle or direction, not both.
    pub handle: Option<String>,
    /// Scroll the page in this direction. Provide either handle or direction, not both.
    pub direction: Option<ScrollDirection>,
    /// Pixels to scroll the page (only with direction).
    pub amount: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ApprovalArgs {
    /// The action you want a human to approve.
    pub action: String,
    /// Why approval is needed.
    pub reason: String,
}

/// complete_task 的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Success,
    Failed,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CompleteTaskArgs {
    /// "success" when the goal is achieved, "failed" when it cannot be achieved.
    pub status: CompletionStatus,
    /// Evidence for success, or why the task failed.
    pub reason: String,
}

/// 声明给模型的单个操作
#[derive(Debug, Clone, Serialize)]
pub struct OperationSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

fn schema_of<T: JsonSchema>(name: &str, description: &str) -> OperationSchema {
    let root = schema_for!(T);
    OperationSchema {
        name: name.to_string(),
        description: description.to_string(),
        parameters: serde_json::to_value(root).unwrap_or_else(|_| serde_json::json!({ "type": "object" })),
    }
}

/// 全部操作（5 个浏览器操作 + 2 个控制操作）
pub fn operation_schemas() -> Vec<OperationSchema> {
    vec![
        schema_of::<GetSnapshotArgs>(
            GET_SNAPSHOT,
            "Capture the current page state. Returns a fresh snapshot with new element handles.",
        ),
        schema_of::<ClickArgs>(CLICK, "Click an element by handle."),
        schema_of::<FillArgs>(FILL, "Type text into an input element by handle."),
        schema_of::<SelectArgs>(SELECT, "Select an option in a combobox or listbox by handle."),
        schema_of::<ScrollArgs>(
            SCROLL,
            "Scroll an element into view (handle) or scroll the page (direction, amount).",
        ),
        schema_of::<ApprovalArgs>(
            REQUEST_HUMAN_APPROVAL,
            "Ask a human to approve an irreversible or sensitive action, or to handle a 2FA/CAPTCHA challenge.",
        ),
        schema_of::<CompleteTaskArgs>(
            COMPLETE_TASK,
            "Finish the task. Use status=success only when the page shows the goal is achieved.",
        ),
    ]
}
