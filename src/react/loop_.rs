//! 编排主循环
//!
//! AwaitingModel -> Dispatching (-> AwaitingApproval) -> AwaitingModel；每轮最多执行一个操作。
//! 可选 event_tx：向 CLI / UI 推送 TurnStarted / OperationProposed / OperationResult 等事件。

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::browser::{ActionExecutor, SnapshotBuilder};
use crate::checkpoint::{ApprovalChannel, CheckpointEvaluator};
use crate::config::AppConfig;
use crate::core::{RecoveryEngine, RunPhase, TerminationReason};
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::react::{dispatch, prompt, DispatchOutcome, RunContext, TaskEvent};
use crate::tools::{operation_schemas, Operation, ToolResult};

/// 一次运行所需的组件（均为借用，由 TaskOrchestrator 持有）
pub struct RunSession<'a> {
    pub snapshots: &'a SnapshotBuilder,
    pub executor: &'a ActionExecutor,
    pub llm: &'a dyn LlmClient,
    pub approval: &'a dyn ApprovalChannel,
    pub evaluator: &'a CheckpointEvaluator,
    pub recovery: &'a RecoveryEngine,
    pub config: &'a AppConfig,
    pub cancel_token: CancellationToken,
    /// 可选：事件推送通道
    pub event_tx: Option<&'a UnboundedSender<TaskEvent>>,
}

impl<'a> RunSession<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        snapshots: &'a SnapshotBuilder,
        executor: &'a ActionExecutor,
        llm: &'a dyn LlmClient,
        approval: &'a dyn ApprovalChannel,
        evaluator: &'a CheckpointEvaluator,
        recovery: &'a RecoveryEngine,
        config: &'a AppConfig,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            snapshots,
            executor,
            llm,
            approval,
            evaluator,
            recovery,
            config,
            cancel_token,
            event_tx: None,
        }
    }

    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<TaskEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }
}

pub fn send_event(tx: &Option<&UnboundedSender<TaskEvent>>, ev: TaskEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

/// 循环退出原因
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub reason: TerminationReason,
    pub message: String,
}

impl LoopOutcome {
    fn new(reason: TerminationReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// 运行主循环直到终止；调用前 ctx 中需已有 system prompt 与首个快照
pub async fn run_loop(session: &RunSession<'_>, ctx: &mut RunContext) -> LoopOutcome {
    let schemas = operation_schemas();
    let max_turns = session.config.orchestrator.max_turns;
    let max_empty = session.config.orchestrator.max_empty_responses.max(1);

    loop {
        if session.cancel_token.is_cancelled() {
            tracing::info!(turns = ctx.turns, "run interrupted");
            return LoopOutcome::new(TerminationReason::Interrupted, "Cancelled by user");
        }
        if ctx.turns >= max_turns {
            tracing::warn!(max_turns, "turn budget exhausted");
            return LoopOutcome::new(
                TerminationReason::MaxTurnsExceeded,
                format!("Stopped after {} turns without completing the goal", max_turns),
            );
        }

        ctx.transition(RunPhase::AwaitingModel);
        send_event(
            &session.event_tx,
            TaskEvent::TurnStarted {
                turn: ctx.turns + 1,
                max_turns,
            },
        );
        send_event(&session.event_tx, TaskEvent::Thinking);

        let response = tokio::select! {
            biased;
            _ = session.cancel_token.cancelled() => {
                tracing::info!(turns = ctx.turns, "run interrupted while awaiting model");
                return LoopOutcome::new(TerminationReason::Interrupted, "Cancelled by user");
            }
            r = session.llm.invoke(&ctx.messages, &schemas) => r,
        };
        let response = match response {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "model invocation failed");
                return LoopOutcome::new(TerminationReason::ConnectionError, e.to_string());
            }
        };
        ctx.turns += 1;

        let text = response.text.unwrap_or_default();
        if !text.trim().is_empty() {
            send_event(&session.event_tx, TaskEvent::ModelText { text: text.clone() });
        }

        let mut calls = response.tool_calls;
        if calls.is_empty() {
            ctx.consecutive_empty += 1;
            tracing::warn!(consecutive = ctx.consecutive_empty, "model proposed no operation");
            ctx.messages.push(Message::assistant(text, Vec::new()));
            if ctx.consecutive_empty >= max_empty {
                return LoopOutcome::new(
                    TerminationReason::Stalled,
                    format!("No operation proposed in {} consecutive responses", ctx.consecutive_empty),
                );
            }
            ctx.messages
                .push(prompt::nudge_message(max_empty - ctx.consecutive_empty));
            continue;
        }
        ctx.consecutive_empty = 0;

        ctx.messages.push(Message::assistant(text, calls.clone()));
        let discarded = calls.split_off(1);
        let call = calls.swap_remove(0);

        if !discarded.is_empty() {
            let names: Vec<String> = discarded.iter().map(|c| c.name.clone()).collect();
            tracing::warn!(executed = %call.name, discarded = ?names, "multiple operations proposed, executing only the first");
            ctx.note(format!(
                "turn {}: executed '{}', discarded {:?}",
                ctx.turns, call.name, names
            ));
            send_event(
                &session.event_tx,
                TaskEvent::OperationsDiscarded {
                    executed: call.name.clone(),
                    discarded: names,
                },
            );
        }

        ctx.transition(RunPhase::Dispatching);
        send_event(
            &session.event_tx,
            TaskEvent::OperationProposed {
                operation: call.name.clone(),
                args: call.arguments.clone(),
            },
        );

        let outcome = match Operation::parse(&call) {
            Ok(operation) => {
                tracing::debug!(operation = operation.name(), control = operation.is_control(), "dispatching");
                dispatch::dispatch(session, ctx, operation).await
            }
            Err(e) => {
                tracing::warn!(operation = %call.name, error = %e, "rejected operation");
                DispatchOutcome::Continue(ToolResult::failure(e.code(), e.to_string(), None))
            }
        };

        match outcome {
            DispatchOutcome::Terminate { reason, message } => {
                return LoopOutcome { reason, message };
            }
            DispatchOutcome::Continue(result) => {
                send_event(
                    &session.event_tx,
                    TaskEvent::OperationResult {
                        operation: call.name.clone(),
                        success: result.success,
                        error: result.error,
                        message: result.message.clone(),
                    },
                );
                let mut message = Message::tool(call.id.clone(), result.to_model_content());
                if let Some(screenshot) = result.screenshot() {
                    message = message.with_image(screenshot);
                }
                ctx.messages.push(message);
                for extra in &discarded {
                    ctx.messages.push(prompt::discarded_message(extra, &call.name));
                }
            }
        }
    }
}
