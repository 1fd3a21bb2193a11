//! 单次运行的显式状态：注册表、消息历史、计数器与最新快照
//!
//! 每次运行独占一个 RunContext，不存在跨运行共享的全局状态。

use uuid::Uuid;

use crate::browser::{ElementRegistry, Handle, Snapshot};
use crate::core::{ReferenceError, RunPhase};
use crate::memory::Message;
use crate::tools::HandleRef;

#[derive(Debug)]
pub struct RunContext {
    pub run_id: Uuid,
    pub goal: String,
    pub registry: ElementRegistry,
    pub messages: Vec<Message>,
    /// 已完成的模型轮数
    pub turns: usize,
    pub consecutive_empty: usize,
    /// 最近一次交给模型的快照
    pub latest: Option<Snapshot>,
    /// 诊断信息（如被丢弃的操作）
    pub notes: Vec<String>,
    phase: RunPhase,
}

impl RunContext {
    pub fn new(run_id: Uuid, goal: impl Into<String>) -> Self {
        Self {
            run_id,
            goal: goal.into(),
            registry: ElementRegistry::new(),
            messages: Vec::new(),
            turns: 0,
            consecutive_empty: 0,
            latest: None,
            notes: Vec::new(),
            phase: RunPhase::Init,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn transition(&mut self, next: RunPhase) {
        if self.phase == next {
            return;
        }
        if self.phase.can_transition_to(next) {
            tracing::debug!(from = ?self.phase, to = ?next, "phase transition");
            self.phase = next;
        } else {
            tracing::warn!(from = ?self.phase, to = ?next, "ignored invalid phase transition");
        }
    }

    /// 模型给出的 Handle 文本绑定到最近交付的快照代号
    pub fn bind_handle(&self, reference: &HandleRef) -> Result<Handle, ReferenceError> {
        let generation = self
            .latest
            .as_ref()
            .map(|s| s.generation)
            .ok_or(ReferenceError::NoSnapshot)?;
        Ok(Handle::new(generation, reference.index))
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }
}
