//! 操作联合类型
//!
//! 模型提议的 ToolCall 先解析为封闭的 Operation 枚举，分发处穷尽匹配；
//! 参数不合法（含 scroll 既无 handle 也无 direction）在此阶段就以 InvalidParameters 拒绝，不会触达驱动。

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::browser::{parse_handle_index, ScrollDirection};
use crate::core::OperationError;
use crate::llm::ToolCall;
use crate::tools::schema::{
    ApprovalArgs, ClickArgs, CompleteTaskArgs, CompletionStatus, FillArgs, GetSnapshotArgs,
    ScrollArgs, SelectArgs, CLICK, COMPLETE_TASK, FILL, GET_SNAPSHOT, REQUEST_HUMAN_APPROVAL,
    SCROLL, SELECT,
};

/// 模型给出的 Handle 文本及其序号（代号在分发时绑定）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleRef {
    pub text: String,
    pub index: usize,
}

/// scroll 的目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrollRequest {
    Element(HandleRef),
    Page {
        direction: ScrollDirection,
        /// 未提供时使用配置的默认像素数
        amount: Option<u32>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    GetSnapshot { viewport_only: bool },
    Click { target: HandleRef },
    Fill { target: HandleRef, value: String, clear_first: bool },
    Select { target: HandleRef, value: String },
    Scroll(ScrollRequest),
    RequestHumanApproval { action: String, reason: String },
    CompleteTask { status: CompletionStatus, reason: String },
}

impl Operation {
    pub fn parse(call: &ToolCall) -> Result<Operation, OperationError> {
        let name = call.name.as_str();
        match name {
            GET_SNAPSHOT => {
                let a: GetSnapshotArgs = args(name, &call.arguments)?;
                Ok(Operation::GetSnapshot {
                    viewport_only: a.viewport_only,
                })
            }
            CLICK => {
                let a: ClickArgs = args(name, &call.arguments)?;
                Ok(Operation::Click {
                    target: handle_ref(name, &a.handle)?,
                })
            }
            FILL => {
                let a: FillArgs = args(name, &call.arguments)?;
                Ok(Operation::Fill {
                    target: handle_ref(name, &a.handle)?,
                    value: a.value,
                    clear_first: a.clear_first,
                })
            }
            SELECT => {
                let a: SelectArgs = args(name, &call.arguments)?;
                Ok(Operation::Select {
                    target: handle_ref(name, &a.handle)?,
                    value: a.value,
                })
            }
            SCROLL => {
                let a: ScrollArgs = args(name, &call.arguments)?;
                match (a.handle, a.direction) {
                    (Some(_), Some(_)) => Err(OperationError::invalid(
                        name,
                        "provide either handle or direction, not both",
                    )),
                    (None, None) => Err(OperationError::invalid(
                        name,
                        "either handle or direction is required",
                    )),
                    (Some(handle), None) => Ok(Operation::Scroll(ScrollRequest::Element(
                        handle_ref(name, &handle)?,
                    ))),
                    (None, Some(direction)) => {
                        if a.amount == Some(0) {
                            return Err(OperationError::invalid(name, "amount must be positive"));
                        }
                        Ok(Operation::Scroll(ScrollRequest::Page {
                            direction,
                            amount: a.amount,
                        }))
                    }
                }
            }
            REQUEST_HUMAN_APPROVAL => {
                let a: ApprovalArgs = args(name, &call.arguments)?;
                Ok(Operation::RequestHumanApproval {
                    action: a.action,
                    reason: a.reason,
                })
            }
            COMPLETE_TASK => {
                let a: CompleteTaskArgs = args(name, &call.arguments)?;
                Ok(Operation::CompleteTask {
                    status: a.status,
                    reason: a.reason,
                })
            }
            other => Err(OperationError::UnknownOperation(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::GetSnapshot { .. } => GET_SNAPSHOT,
            Operation::Click { .. } => CLICK,
            Operation::Fill { .. } => FILL,
            Operation::Select { .. } => SELECT,
            Operation::Scroll(_) => SCROLL,
            Operation::RequestHumanApproval { .. } => REQUEST_HUMAN_APPROVAL,
            Operation::CompleteTask { .. } => COMPLETE_TASK,
        }
    }

    /// 控制操作由编排器直接处理，从不转发给驱动
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Operation::RequestHumanApproval { .. } | Operation::CompleteTask { .. }
        )
    }
}

/// 解析参数；null 视为空对象，字符串形式的 JSON 先解码
fn args<T: DeserializeOwned>(operation: &str, value: &Value) -> Result<T, OperationError> {
    let value = match value {
        Value::Null => Value::Object(Default::default()),
        Value::String(s) => serde_json::from_str(s)
            .map_err(|e| OperationError::invalid(operation, format!("arguments are not valid JSON: {e}")))?,
        other => other.clone(),
    };
    serde_json::from_value(value).map_err(|e| OperationError::invalid(operation, e.to_string()))
}

fn handle_ref(operation: &str, text: &str) -> Result<HandleRef, OperationError> {
    parse_handle_index(text)
        .map(|index| HandleRef {
            text: text.trim().to_string(),
            index,
        })
        .ok_or_else(|| {
            OperationError::invalid(
                operation,
                format!("handle '{text}' must look like @e<N> from the latest snapshot"),
            )
        })
}
