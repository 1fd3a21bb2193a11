//! 浏览器驱动抽象
//!
//! 编排器不直接接触浏览器进程：具体驱动（CDP / WebDriver / Playwright 桥）实现 BrowserDriver，
//! 提供无障碍树、截图、视口、URL/标题以及以内部 Locator 为键的交互原语。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::browser::{BoundingBox, Locator, Viewport};

/// 驱动层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// 与浏览器的连接已断开或不可达
    #[error("Driver disconnected: {0}")]
    Disconnected(String),

    #[error("Driver timeout: {0}")]
    Timeout(String),

    /// 驱动返回的交互失败，message 保留原文供执行器分类
    #[error("{0}")]
    Action(String),

    #[error("Driver protocol error: {0}")]
    Protocol(String),
}

/// 复选状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckedState {
    Checked,
    Unchecked,
    Mixed,
}

/// 驱动返回的原始无障碍节点（树形）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AxNode {
    /// 驱动内部节点 ID，作为 Locator 使用
    pub node_id: String,
    pub role: String,
    #[serde(default)]
    pub name: String,
    pub value: Option<String>,
    /// heading 级别（1-6）
    pub level: Option<u8>,
    #[serde(default)]
    pub focusable: bool,
    #[serde(default)]
    pub focused: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub readonly: bool,
    pub checked: Option<CheckedState>,
    pub expanded: Option<bool>,
    #[serde(default)]
    pub busy: bool,
    /// 无障碍数据自带的包围盒（文档坐标）；缺失时由 SnapshotBuilder 单独查询
    pub bounds: Option<BoundingBox>,
    #[serde(default)]
    pub children: Vec<AxNode>,
}

impl AxNode {
    pub fn new(node_id: impl Into<String>, role: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            role: role.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_children(mut self, children: Vec<AxNode>) -> Self {
        self.children = children;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn focused(mut self) -> Self {
        self.focused = true;
        self.focusable = true;
        self
    }

    pub fn locator(&self) -> Locator {
        Locator::new(self.node_id.clone())
    }
}

/// 页面级滚动方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::Left => "left",
            ScrollDirection::Right => "right",
        }
    }
}

/// 浏览器驱动 trait：读取页面状态与执行交互原语（均为异步挂起点）
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// 完整无障碍树（根节点）
    async fn accessibility_tree(&self) -> Result<AxNode, DriverError>;

    /// 当前视口截图（PNG 字节）
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    /// 视口尺寸与滚动偏移
    async fn viewport(&self) -> Result<Viewport, DriverError>;

    async fn url(&self) -> Result<String, DriverError>;

    async fn title(&self) -> Result<String, DriverError>;

    /// 单个元素的包围盒；元素不再渲染时返回 None
    async fn bounding_box(&self, locator: &Locator) -> Result<Option<BoundingBox>, DriverError>;

    async fn click(&self, locator: &Locator, timeout: Duration) -> Result<(), DriverError>;

    async fn fill(
        &self,
        locator: &Locator,
        value: &str,
        clear_first: bool,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    async fn select_option(
        &self,
        locator: &Locator,
        value: &str,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    /// 将元素滚动到视口内
    async fn scroll_into_view(&self, locator: &Locator, timeout: Duration) -> Result<(), DriverError>;

    /// 页面级滚动（像素）
    async fn scroll_page(
        &self,
        direction: ScrollDirection,
        amount: u32,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    /// 关闭浏览器会话；运行结束时无论成败都会调用
    async fn close(&self) -> anyhow::Result<()>;
}
