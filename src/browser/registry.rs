//! 元素引用注册表
//!
//! 每次 register_snapshot 开启新的一代，Handle 文本从 `@e0` 重新编号；
//! 解析以（代号, 序号）复合键进行，旧代签发的 Handle 即使文本相同也一律拒绝。

use std::sync::OnceLock;

use regex::Regex;

use crate::browser::{ElementDescriptor, Handle};
use crate::core::ReferenceError;

static HANDLE_RE: OnceLock<Option<Regex>> = OnceLock::new();

/// 解析 `@e{N}` 文本，返回序号；格式不符时返回 None
pub fn parse_handle_index(text: &str) -> Option<usize> {
    let re = HANDLE_RE
        .get_or_init(|| Regex::new(r"^@e(\d+)$").ok())
        .as_ref()?;
    re.captures(text.trim())?.get(1)?.as_str().parse().ok()
}

#[derive(Debug)]
struct Generation {
    id: u64,
    elements: Vec<ElementDescriptor>,
}

/// 单次运行独占的注册表（代号计数器随运行隔离）
#[derive(Debug, Default)]
pub struct ElementRegistry {
    last_generation: u64,
    current: Option<Generation>,
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记新一代元素并吊销上一代全部 Handle；序号即传入顺序（深度优先文档序）
    pub fn register_snapshot(&mut self, elements: Vec<ElementDescriptor>) -> u64 {
        self.last_generation += 1;
        let id = self.last_generation;
        tracing::debug!(generation = id, elements = elements.len(), "registered snapshot");
        self.current = Some(Generation { id, elements });
        id
    }

    /// 当前有效代号；invalidate 之后为 None
    pub fn current_generation(&self) -> Option<u64> {
        self.current.as_ref().map(|g| g.id)
    }

    /// 当前代全部 Handle（按序号）
    pub fn handles(&self) -> Vec<Handle> {
        match &self.current {
            Some(g) => (0..g.elements.len()).map(|i| Handle::new(g.id, i)).collect(),
            None => Vec::new(),
        }
    }

    /// 仅当 Handle 属于当前代时返回对应元素
    pub fn resolve(&self, handle: &Handle) -> Result<ElementDescriptor, ReferenceError> {
        let current = self.current.as_ref().ok_or(ReferenceError::NoSnapshot)?;
        if handle.generation() != current.id {
            return Err(ReferenceError::StaleGeneration {
                handle: handle.to_string(),
                issued: handle.generation(),
                current: current.id,
            });
        }
        current
            .elements
            .get(handle.index())
            .cloned()
            .ok_or_else(|| ReferenceError::Unknown {
                handle: handle.to_string(),
                generation: current.id,
            })
    }

    /// 清空当前代但不登记新代（如致命错误后）
    pub fn invalidate(&mut self) {
        self.current = None;
    }
}
