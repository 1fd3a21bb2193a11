//! Wayfinder - 由推理模型驱动浏览器完成多步骤网页任务的编排器
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **observability**: tracing 订阅器初始化
//! - **core**: 错误分类、恢复策略、运行阶段、会话监管、任务编排器
//! - **browser**: 驱动抽象、快照构建、元素引用注册表、动作执行器、Mock 驱动
//! - **llm**: 模型客户端抽象、重试包装、脚本化 Mock
//! - **memory**: 对话历史消息
//! - **tools**: 操作联合类型、参数 schema、ToolResult
//! - **checkpoint**: 服务断言、检查点评估、人工确认通道
//! - **react**: 运行上下文、提示词、操作分发与主循环

pub mod browser;
pub mod checkpoint;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use crate::checkpoint::{ApprovalChannel, RejectionPolicy, ServiceConfig};
pub use crate::config::{load_config, AppConfig};
pub use crate::core::{TaskOrchestrator, TaskResult, TerminationReason};
