//! Mock 浏览器驱动（用于测试与演练，无需真实浏览器）
//!
//! 持有一棵静态无障碍树；每次成功的交互后可切换到预设的下一页，
//! 并记录所有动作，便于断言「某个点击从未执行」。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::browser::{
    AxNode, BoundingBox, BrowserDriver, DriverError, Locator, ScrollDirection, Viewport,
};

/// 1x1 透明 PNG
const PLACEHOLDER_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

/// 一个静态页面
#[derive(Debug, Clone)]
pub struct MockPage {
    pub url: String,
    pub title: String,
    pub tree: AxNode,
    pub viewport: Viewport,
}

impl MockPage {
    pub fn new(url: impl Into<String>, title: impl Into<String>, children: Vec<AxNode>) -> Self {
        let title = title.into();
        Self {
            url: url.into(),
            tree: AxNode::new("root", "RootWebArea", title.clone()).with_children(children),
            title,
            viewport: Viewport::new(1280.0, 720.0),
        }
    }

    fn find(&self, locator: &Locator) -> Option<&AxNode> {
        fn walk<'a>(node: &'a AxNode, id: &str) -> Option<&'a AxNode> {
            if node.node_id == id {
                return Some(node);
            }
            node.children.iter().find_map(|c| walk(c, id))
        }
        walk(&self.tree, locator.as_str())
    }
}

/// 驱动记录的动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedAction {
    Click(String),
    Fill {
        locator: String,
        value: String,
        clear_first: bool,
    },
    Select {
        locator: String,
        value: String,
    },
    ScrollIntoView(String),
    ScrollPage {
        direction: ScrollDirection,
        amount: u32,
    },
}

#[derive(Debug)]
struct MockState {
    page: MockPage,
    /// 每次成功交互后依次切换到的页面
    transitions: VecDeque<MockPage>,
    actions: Vec<RecordedAction>,
    /// 按 Locator 注入的交互失败
    action_failures: HashMap<String, DriverError>,
    boxes: HashMap<String, BoundingBox>,
    action_delay: Option<Duration>,
    snapshot_failures: usize,
    unreachable_actions: usize,
}

/// 脚本化驱动
#[derive(Debug)]
pub struct MockDriver {
    state: Mutex<MockState>,
    closed: AtomicBool,
    box_queries: AtomicUsize,
    driver_calls: AtomicUsize,
}

impl MockDriver {
    pub fn new(page: MockPage) -> Self {
        Self {
            state: Mutex::new(MockState {
                page,
                transitions: VecDeque::new(),
                actions: Vec::new(),
                action_failures: HashMap::new(),
                boxes: HashMap::new(),
                action_delay: None,
                snapshot_failures: 0,
                unreachable_actions: 0,
            }),
            closed: AtomicBool::new(false),
            box_queries: AtomicUsize::new(0),
            driver_calls: AtomicUsize::new(0),
        }
    }

    /// 成功交互后依次切换到这些页面
    pub fn with_transitions(mut self, pages: Vec<MockPage>) -> Self {
        self.state_mut().transitions.extend(pages);
        self
    }

    /// 针对某个节点的交互返回指定错误
    pub fn with_action_failure(mut self, node_id: &str, err: DriverError) -> Self {
        self.state_mut().action_failures.insert(node_id.to_string(), err);
        self
    }

    /// bounding_box 查询返回的包围盒（优先于树中自带的 bounds）
    pub fn with_box(mut self, node_id: &str, bounds: BoundingBox) -> Self {
        self.state_mut().boxes.insert(node_id.to_string(), bounds);
        self
    }

    /// 每次交互前等待，用于超时测试
    pub fn with_action_delay(mut self, delay: Duration) -> Self {
        self.state_mut().action_delay = Some(delay);
        self
    }

    /// 接下来 n 次读取无障碍树返回 Disconnected
    pub fn fail_next_snapshots(&self, n: usize) {
        self.lock().snapshot_failures = n;
    }

    /// 接下来 n 次交互返回 Disconnected
    pub fn fail_next_actions(&self, n: usize) {
        self.lock().unreachable_actions = n;
    }

    pub fn actions(&self) -> Vec<RecordedAction> {
        self.lock().actions.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn box_queries(&self) -> usize {
        self.box_queries.load(Ordering::SeqCst)
    }

    /// 驱动被调用的总次数（含读取与交互）
    pub fn driver_calls(&self) -> usize {
        self.driver_calls.load(Ordering::SeqCst)
    }

    fn state_mut(&mut self) -> &mut MockState {
        self.state.get_mut().unwrap_or_else(|e| e.into_inner())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn touch(&self) {
        self.driver_calls.fetch_add(1, Ordering::SeqCst);
    }

    /// 交互公共流程：注入失败 → 延时 → 校验节点存在 → 记录并切换页面
    async fn interact(&self, locator: &Locator, action: RecordedAction) -> Result<(), DriverError> {
        self.touch();
        let delay = {
            let mut state = self.lock();
            if state.unreachable_actions > 0 {
                state.unreachable_actions -= 1;
                return Err(DriverError::Disconnected("browser connection lost".to_string()));
            }
            if let Some(err) = state.action_failures.get(locator.as_str()) {
                return Err(err.clone());
            }
            state.action_delay
        };
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let mut state = self.lock();
        if !locator.as_str().is_empty() && state.page.find(locator).is_none() {
            return Err(DriverError::Action(format!(
                "No node found for locator {}",
                locator.as_str()
            )));
        }
        state.actions.push(action);
        if let Some(next) = state.transitions.pop_front() {
            state.page = next;
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for MockDriver {
    async fn accessibility_tree(&self) -> Result<AxNode, DriverError> {
        self.touch();
        let mut state = self.lock();
        if state.snapshot_failures > 0 {
            state.snapshot_failures -= 1;
            return Err(DriverError::Disconnected("browser connection lost".to_string()));
        }
        Ok(state.page.tree.clone())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        self.touch();
        Ok(PLACEHOLDER_PNG.to_vec())
    }

    async fn viewport(&self) -> Result<Viewport, DriverError> {
        self.touch();
        Ok(self.lock().page.viewport)
    }

    async fn url(&self) -> Result<String, DriverError> {
        self.touch();
        Ok(self.lock().page.url.clone())
    }

    async fn title(&self) -> Result<String, DriverError> {
        self.touch();
        Ok(self.lock().page.title.clone())
    }

    async fn bounding_box(&self, locator: &Locator) -> Result<Option<BoundingBox>, DriverError> {
        self.touch();
        self.box_queries.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        if let Some(b) = state.boxes.get(locator.as_str()) {
            return Ok(Some(*b));
        }
        Ok(state.page.find(locator).and_then(|n| n.bounds))
    }

    async fn click(&self, locator: &Locator, _timeout: Duration) -> Result<(), DriverError> {
        self.interact(locator, RecordedAction::Click(locator.as_str().to_string()))
            .await
    }

    async fn fill(
        &self,
        locator: &Locator,
        value: &str,
        clear_first: bool,
        _timeout: Duration,
    ) -> Result<(), DriverError> {
        self.interact(
            locator,
            RecordedAction::Fill {
                locator: locator.as_str().to_string(),
                value: value.to_string(),
                clear_first,
            },
        )
        .await
    }

    async fn select_option(
        &self,
        locator: &Locator,
        value: &str,
        _timeout: Duration,
    ) -> Result<(), DriverError> {
        self.interact(
            locator,
            RecordedAction::Select {
                locator: locator.as_str().to_string(),
                value: value.to_string(),
            },
        )
        .await
    }

    async fn scroll_into_view(&self, locator: &Locator, _timeout: Duration) -> Result<(), DriverError> {
        self.interact(locator, RecordedAction::ScrollIntoView(locator.as_str().to_string()))
            .await
    }

    async fn scroll_page(
        &self,
        direction: ScrollDirection,
        amount: u32,
        _timeout: Duration,
    ) -> Result<(), DriverError> {
        self.interact(&Locator::default(), RecordedAction::ScrollPage { direction, amount })
            .await?;
        let mut state = self.lock();
        let delta = amount as f64;
        let vp = &mut state.page.viewport;
        match direction {
            ScrollDirection::Down => vp.scroll_y += delta,
            ScrollDirection::Up => vp.scroll_y = (vp.scroll_y - delta).max(0.0),
            ScrollDirection::Right => vp.scroll_x += delta,
            ScrollDirection::Left => vp.scroll_x = (vp.scroll_x - delta).max(0.0),
        }
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
