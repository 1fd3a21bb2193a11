//! 快照数据模型：Snapshot、ElementDescriptor、Handle 及几何类型
//!
//! Snapshot 一经创建不再修改，下一次拍摄产生新的 Snapshot（新的 generation）。
//! ElementDescriptor 中的 Locator 仅供执行器使用，序列化给模型时跳过。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::browser::CheckedState;

/// 包围盒（文档坐标，CSS 像素）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }
}

/// 视口尺寸与滚动偏移
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            scroll_x: 0.0,
            scroll_y: 0.0,
        }
    }

    pub fn scrolled_to(mut self, scroll_x: f64, scroll_y: f64) -> Self {
        self.scroll_x = scroll_x;
        self.scroll_y = scroll_y;
        self
    }

    /// 元素相对视口的可见程度；无包围盒或零面积按 Offscreen 处理
    pub fn presence_of(&self, bounds: Option<&BoundingBox>) -> Presence {
        let Some(b) = bounds else {
            return Presence::Offscreen;
        };
        if b.width <= 0.0 || b.height <= 0.0 {
            return Presence::Offscreen;
        }
        let (left, top) = (self.scroll_x, self.scroll_y);
        let (right, bottom) = (left + self.width, top + self.height);
        let intersects = b.x < right && b.x + b.width > left && b.y < bottom && b.y + b.height > top;
        if !intersects {
            return Presence::Offscreen;
        }
        let contained =
            b.x >= left && b.y >= top && b.x + b.width <= right && b.y + b.height <= bottom;
        if contained {
            Presence::Visible
        } else {
            Presence::Partial
        }
    }
}

/// 执行器定位元素用的内部引用（驱动节点 ID），不暴露给模型
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Locator(String);

impl Locator {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 视口可见程度（排序时 Visible > Partial > Offscreen）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Visible,
    Partial,
    Offscreen,
}

/// 可用状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Enablement {
    Enabled,
    Disabled,
    ReadOnly,
}

/// 元素状态标记集合
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementState {
    pub presence: Presence,
    pub enablement: Enablement,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked: Option<CheckedState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expanded: Option<bool>,
    pub focused: bool,
    pub busy: bool,
}

impl ElementState {
    /// 渲染用的简短标记（默认状态不输出）
    pub fn flags(&self) -> Vec<&'static str> {
        let mut flags = Vec::new();
        match self.presence {
            Presence::Visible => {}
            Presence::Partial => flags.push("partially visible"),
            Presence::Offscreen => flags.push("offscreen"),
        }
        match self.enablement {
            Enablement::Enabled => {}
            Enablement::Disabled => flags.push("disabled"),
            Enablement::ReadOnly => flags.push("readonly"),
        }
        match self.checked {
            Some(CheckedState::Checked) => flags.push("checked"),
            Some(CheckedState::Unchecked) => flags.push("unchecked"),
            Some(CheckedState::Mixed) => flags.push("mixed"),
            None => {}
        }
        match self.expanded {
            Some(true) => flags.push("expanded"),
            Some(false) => flags.push("collapsed"),
            None => {}
        }
        if self.focused {
            flags.push("focused");
        }
        if self.busy {
            flags.push("busy");
        }
        flags
    }
}

/// 快照中的单个元素
#[derive(Debug, Clone, Serialize)]
pub struct ElementDescriptor {
    pub role: String,
    pub name: String,
    pub state: ElementState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(skip)]
    pub locator: Locator,
    /// 在原始树中的深度优先序号
    #[serde(skip)]
    pub document_order: usize,
}

impl ElementDescriptor {
    pub fn is_disabled(&self) -> bool {
        self.state.enablement == Enablement::Disabled
    }

    /// 供日志与检查点描述使用，如 `button "Confirm cancellation"`
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            self.role.clone()
        } else {
            format!("{} \"{}\"", self.role, self.name)
        }
    }
}

/// 交给模型的元素视图：不含 Locator 与文档序
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotElement {
    pub role: String,
    pub name: String,
    pub state: ElementState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
}

impl From<&ElementDescriptor> for SnapshotElement {
    fn from(e: &ElementDescriptor) -> Self {
        Self {
            role: e.role.clone(),
            name: e.name.clone(),
            state: e.state.clone(),
            bounds: e.bounds,
            value: e.value.clone(),
            level: e.level,
        }
    }
}

/// 代内有效的元素引用：文本形式 `@e{N}`，内部携带签发代号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    generation: u64,
    index: usize,
}

impl Handle {
    pub fn new(generation: u64, index: usize) -> Self {
        Self { generation, index }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@e{}", self.index)
    }
}

impl Serialize for Handle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 某一时刻的页面状态（不可变）
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub generation: u64,
    pub elements: Vec<SnapshotElement>,
    pub focused: Option<Handle>,
    pub url: String,
    pub title: String,
    /// base64 编码的 PNG 截图，以图片附件形式交给模型
    #[serde(skip)]
    pub screenshot: String,
    pub viewport: Viewport,
    /// 因数量上限被裁掉的候选元素数
    pub omitted: usize,
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    /// 标题、元素名或值中是否出现 needle（忽略大小写）
    pub fn contains_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.title.to_lowercase().contains(&needle)
            || self.elements.iter().any(|e| {
                e.name.to_lowercase().contains(&needle)
                    || e
                        .value
                        .as_deref()
                        .is_some_and(|v| v.to_lowercase().contains(&needle))
            })
    }

    /// 供模型阅读的紧凑文本表示
    pub fn render(&self) -> String {
        let mut lines = vec![
            format!("Page: {}", self.title),
            format!("URL: {}", self.url),
            format!(
                "Snapshot generation {} | viewport {}x{} scrolled to ({}, {})",
                self.generation,
                self.viewport.width,
                self.viewport.height,
                self.viewport.scroll_x,
                self.viewport.scroll_y
            ),
        ];
        if self.omitted > 0 {
            lines.push(format!(
                "Elements ({} shown, {} lower-priority elements omitted):",
                self.elements.len(),
                self.omitted
            ));
        } else {
            lines.push(format!("Elements ({}):", self.elements.len()));
        }

        for (i, elem) in self.elements.iter().enumerate() {
            let mut line = format!("{} {}", Handle::new(self.generation, i), elem.role);
            if !elem.name.is_empty() {
                line.push_str(&format!(" \"{}\"", elem.name));
            }
            if let Some(level) = elem.level {
                line.push_str(&format!(" level={}", level));
            }
            if let Some(ref value) = elem.value {
                line.push_str(&format!(" value=\"{}\"", value));
            }
            let flags = elem.state.flags();
            if !flags.is_empty() {
                line.push_str(&format!(" [{}]", flags.join(", ")));
            }
            lines.push(line);
        }

        if let Some(focused) = self.focused {
            lines.push(format!("Focused: {}", focused));
        }
        lines.join("\n")
    }
}
