//! SnapshotBuilder：把驱动返回的原始页面状态转为有界、按优先级裁剪的 Snapshot
//!
//! 流程：深度优先过滤无障碍树 → 补齐缺失包围盒（有界并发）→ 计算视口可见度 →
//! 超出上限时按（可见度, 角色优先级, 文档序）裁剪 → 按文档序登记到注册表。
//! 驱动调用失败直接向上传播，不产生部分快照。

use std::sync::Arc;

use base64::Engine;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};

use crate::browser::{
    AxNode, BoundingBox, BrowserDriver, DriverError, ElementDescriptor, ElementRegistry,
    ElementState, Enablement, Handle, Presence, Snapshot, SnapshotElement, Viewport,
};

/// 可交互角色
const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "link",
    "checkbox",
    "radio",
    "textbox",
    "searchbox",
    "combobox",
    "listbox",
    "option",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "tab",
    "switch",
    "slider",
    "spinbutton",
];

/// 地标 / 对话框 / 警示区域
const REGION_ROLES: &[&str] = &[
    "banner",
    "main",
    "navigation",
    "contentinfo",
    "complementary",
    "region",
    "form",
    "search",
    "dialog",
    "alertdialog",
    "alert",
];

/// 纯布局或装饰角色（可聚焦时例外）
const EXCLUDED_ROLES: &[&str] = &["generic", "none", "presentation"];

/// 纳入的最大 heading 级别
const MAX_HEADING_LEVEL: u8 = 3;

const ELLIPSIS: &str = "...";

/// 快照上限
#[derive(Debug, Clone)]
pub struct SnapshotLimits {
    pub max_elements: usize,
    /// 名称最大字符数（超出部分以省略号替代）
    pub max_name_chars: usize,
    pub max_depth: usize,
    /// 单独查询包围盒时的最大并发
    pub bbox_concurrency: usize,
}

impl Default for SnapshotLimits {
    fn default() -> Self {
        Self {
            max_elements: 100,
            max_name_chars: 200,
            max_depth: 32,
            bbox_concurrency: 8,
        }
    }
}

/// 角色优先级：数值越小越优先
fn role_tier(role: &str) -> u8 {
    match role {
        "button" | "link" | "menuitem" | "menuitemcheckbox" | "menuitemradio" | "tab" => 0,
        "checkbox" | "radio" | "textbox" | "searchbox" | "combobox" | "listbox" | "option"
        | "switch" | "slider" | "spinbutton" => 1,
        "heading" => 2,
        r if REGION_ROLES.contains(&r) => 3,
        _ => 4,
    }
}

fn is_included(node: &AxNode, role: &str) -> bool {
    if EXCLUDED_ROLES.contains(&role) {
        return node.focusable;
    }
    INTERACTIVE_ROLES.contains(&role)
        || (role == "heading" && node.level.map_or(true, |l| l <= MAX_HEADING_LEVEL))
        || REGION_ROLES.contains(&role)
        || node.focusable
}

/// 超过 max_chars 个字符时截断并追加省略号
pub fn truncate_name(name: &str, max_chars: usize) -> String {
    let trimmed = name.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(max_chars).collect();
    cut.push_str(ELLIPSIS);
    cut
}

fn describe(node: &AxNode, role: String, order: usize, max_name_chars: usize) -> ElementDescriptor {
    let enablement = if node.disabled {
        Enablement::Disabled
    } else if node.readonly {
        Enablement::ReadOnly
    } else {
        Enablement::Enabled
    };
    ElementDescriptor {
        role,
        name: truncate_name(&node.name, max_name_chars),
        state: ElementState {
            // 包围盒补齐后再计算
            presence: Presence::Offscreen,
            enablement,
            checked: node.checked,
            expanded: node.expanded,
            focused: node.focused,
            busy: node.busy,
        },
        bounds: node.bounds,
        value: node.value.clone(),
        level: node.level,
        locator: node.locator(),
        document_order: order,
    }
}

/// 深度优先收集候选元素；隐藏节点连同子树跳过，超过深度上限的子树不再遍历
fn collect_candidates(
    node: &AxNode,
    depth: usize,
    limits: &SnapshotLimits,
    order: &mut usize,
    out: &mut Vec<ElementDescriptor>,
) {
    if node.hidden || depth > limits.max_depth {
        return;
    }
    let position = *order;
    *order += 1;

    let role = node.role.to_lowercase();
    if is_included(node, &role) {
        out.push(describe(node, role, position, limits.max_name_chars));
    }
    for child in &node.children {
        collect_candidates(child, depth + 1, limits, order, out);
    }
}

/// 超出上限时保留优先级最高的 max_elements 个，输出仍按文档序；返回（保留, 丢弃数）
pub fn prune(mut elements: Vec<ElementDescriptor>, max_elements: usize) -> (Vec<ElementDescriptor>, usize) {
    if elements.len() <= max_elements {
        return (elements, 0);
    }
    let omitted = elements.len() - max_elements;
    elements.sort_by_key(|e| (e.state.presence, role_tier(&e.role), e.document_order));
    elements.truncate(max_elements);
    elements.sort_by_key(|e| e.document_order);
    (elements, omitted)
}

/// 快照构建器：只读调用驱动
pub struct SnapshotBuilder {
    driver: Arc<dyn BrowserDriver>,
    limits: SnapshotLimits,
}

impl SnapshotBuilder {
    pub fn new(driver: Arc<dyn BrowserDriver>, limits: SnapshotLimits) -> Self {
        Self { driver, limits }
    }

    /// 拍摄快照并登记到 registry；返回模型侧 Snapshot 与完整元素列表（含 Locator）
    pub async fn create(
        &self,
        viewport_only: bool,
        registry: &mut ElementRegistry,
    ) -> Result<(Snapshot, Vec<ElementDescriptor>), DriverError> {
        let tree = self.driver.accessibility_tree().await?;
        let viewport = self.driver.viewport().await?;
        let url = self.driver.url().await?;
        let title = self.driver.title().await?;
        let screenshot = self.driver.screenshot().await?;

        let mut candidates = Vec::new();
        let mut order = 0;
        collect_candidates(&tree, 0, &self.limits, &mut order, &mut candidates);

        self.fill_missing_bounds(&mut candidates).await?;
        apply_presence(&mut candidates, &viewport);

        if viewport_only {
            // 无法确定位置的元素保留
            candidates.retain(|e| e.bounds.is_none() || e.state.presence != Presence::Offscreen);
        }

        let (elements, omitted) = prune(candidates, self.limits.max_elements);
        let generation = registry.register_snapshot(elements.clone());
        let focused = elements
            .iter()
            .position(|e| e.state.focused)
            .map(|i| Handle::new(generation, i));

        tracing::debug!(
            generation,
            elements = elements.len(),
            omitted,
            viewport_only,
            "snapshot created"
        );

        let snapshot = Snapshot {
            generation,
            elements: elements.iter().map(SnapshotElement::from).collect(),
            focused,
            url,
            title,
            screenshot: base64::engine::general_purpose::STANDARD.encode(screenshot),
            viewport,
            omitted,
            captured_at: Utc::now(),
        };
        Ok((snapshot, elements))
    }

    /// 无障碍数据未带包围盒的元素逐个查询（并发受 bbox_concurrency 限制）
    async fn fill_missing_bounds(&self, elements: &mut [ElementDescriptor]) -> Result<(), DriverError> {
        let missing: Vec<(usize, crate::browser::Locator)> = elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.bounds.is_none())
            .map(|(i, e)| (i, e.locator.clone()))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let driver = &self.driver;
        let results: Vec<(usize, Result<Option<BoundingBox>, DriverError>)> = stream::iter(missing)
            .map(|(i, locator)| async move { (i, driver.bounding_box(&locator).await) })
            .buffered(self.limits.bbox_concurrency.max(1))
            .collect()
            .await;

        for (i, result) in results {
            elements[i].bounds = result?;
        }
        Ok(())
    }
}

fn apply_presence(elements: &mut [ElementDescriptor], viewport: &Viewport) {
    for e in elements.iter_mut() {
        e.state.presence = viewport.presence_of(e.bounds.as_ref());
    }
}
