//! 操作面：封闭的 Operation 联合类型、参数 schema 与 ToolResult

pub mod operation;
pub mod result;
pub mod schema;

pub use operation::{HandleRef, Operation, ScrollRequest};
pub use result::ToolResult;
pub use schema::{operation_schemas, CompletionStatus, OperationSchema};
