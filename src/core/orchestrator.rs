//! 任务编排器：一次运行的入口
//!
//! 负责：组装快照构建器 / 动作执行器 / 恢复引擎 / 检查点评估器，拍摄首个快照，
//! 驱动编排主循环，并在任何退出路径上关闭浏览器会话、产出唯一的 TaskResult。

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::browser::{ActionExecutor, BrowserDriver, Snapshot, SnapshotBuilder};
use crate::checkpoint::{ApprovalChannel, CheckpointEvaluator, ServiceConfig};
use crate::config::AppConfig;
use crate::core::{RunPhase, TerminationReason};
use crate::llm::{LlmClient, RetryingLlmClient};
use crate::memory::Message;
use crate::react::{capture, prompt, run_loop, send_event, LoopOutcome, RunContext, RunSession, TaskEvent};

/// 一次运行的最终结果（每次运行恰好产出一个）
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub success: bool,
    pub reason: TerminationReason,
    /// 模型给出的理由或错误信息
    pub message: String,
    pub turns: usize,
    pub final_snapshot: Option<Snapshot>,
    pub run_id: Uuid,
    pub notes: Vec<String>,
}

pub struct TaskOrchestrator {
    driver: Arc<dyn BrowserDriver>,
    llm: RetryingLlmClient,
    approval: Arc<dyn ApprovalChannel>,
    service: Arc<ServiceConfig>,
    config: AppConfig,
    event_tx: Option<UnboundedSender<TaskEvent>>,
}

impl TaskOrchestrator {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        llm: Arc<dyn LlmClient>,
        approval: Arc<dyn ApprovalChannel>,
        service: ServiceConfig,
        config: AppConfig,
    ) -> Self {
        Self {
            driver,
            llm: RetryingLlmClient::new(llm, config.llm.retry_config()),
            approval,
            service: Arc::new(service),
            config,
            event_tx: None,
        }
    }

    /// 设置事件推送通道
    pub fn with_event_tx(mut self, tx: UnboundedSender<TaskEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// 执行一次任务；cancel_token 被取消时在下一个轮次边界（或人工等待中）以 interrupted 结束
    pub async fn run(&self, goal: &str, cancel_token: CancellationToken) -> TaskResult {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id, service = %self.service.name);
        self.run_inner(run_id, goal, cancel_token).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, goal: &str, cancel_token: CancellationToken) -> TaskResult {
        let snapshots = SnapshotBuilder::new(Arc::clone(&self.driver), self.config.snapshot.limits());
        let executor = ActionExecutor::new(Arc::clone(&self.driver), self.config.actions.timeout());
        let recovery = self.config.driver.recovery_engine();
        let evaluator = CheckpointEvaluator::new(Arc::clone(&self.service));

        let mut session = RunSession::new(
            &snapshots,
            &executor,
            &self.llm,
            self.approval.as_ref(),
            &evaluator,
            &recovery,
            &self.config,
            cancel_token,
        );
        if let Some(tx) = &self.event_tx {
            session = session.with_event_tx(tx);
        }

        tracing::info!(goal = %goal, "run started");
        send_event(
            &session.event_tx,
            TaskEvent::RunStarted {
                run_id: run_id.to_string(),
                service: self.service.name.clone(),
                goal: goal.to_string(),
            },
        );

        let mut ctx = RunContext::new(run_id, goal);
        let outcome = self.start(&session, &mut ctx).await;
        ctx.transition(RunPhase::Terminated);

        if let Err(e) = self.driver.close().await {
            tracing::warn!(error = %e, "browser cleanup failed");
        }

        let success = outcome.reason == TerminationReason::TaskCompleted;
        tracing::info!(success, reason = %outcome.reason, turns = ctx.turns, "run finished");
        send_event(
            &session.event_tx,
            TaskEvent::Finished {
                success,
                reason: outcome.reason,
                turns: ctx.turns,
            },
        );

        TaskResult {
            success,
            reason: outcome.reason,
            message: outcome.message,
            turns: ctx.turns,
            final_snapshot: ctx.latest.take(),
            run_id,
            notes: std::mem::take(&mut ctx.notes),
        }
    }

    /// Init：system prompt + 首个快照，然后进入主循环
    async fn start(&self, session: &RunSession<'_>, ctx: &mut RunContext) -> LoopOutcome {
        if session.cancel_token.is_cancelled() {
            return LoopOutcome {
                reason: TerminationReason::Interrupted,
                message: "Cancelled before start".to_string(),
            };
        }

        ctx.messages.push(Message::system(prompt::system_prompt(
            &ctx.goal,
            &self.service.guidance,
        )));

        let snapshot = match capture(session, ctx, false).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "initial snapshot failed");
                return LoopOutcome {
                    reason: TerminationReason::ConnectionError,
                    message: e.to_string(),
                };
            }
        };
        ctx.messages.push(prompt::initial_message(&ctx.goal, &snapshot));

        run_loop(session, ctx).await
    }
}
