//! 单个操作的分发
//!
//! 浏览器操作：绑定 Handle → 解析 → 检查点（Proposed）→ 执行 → 重新快照 → 检查点（Completed）。
//! 控制操作（request_human_approval / complete_task）由此处直接处理，从不转发给驱动。

use crate::browser::{ElementDescriptor, ScrollTarget, Snapshot};
use crate::checkpoint::{
    ActionStage, ApprovalDecision, ApprovalRequest, ApprovalSource, PendingAction, RejectionPolicy,
};
use crate::core::{
    ActionError, ErrorCode, OrchestratorError, RecoveryAction, RunPhase, TerminationReason,
};
use crate::react::{send_event, RunContext, RunSession, TaskEvent};
use crate::tools::{CompletionStatus, HandleRef, Operation, ScrollRequest, ToolResult};

/// 分发结果：继续循环（结果交还模型）或终止运行
#[derive(Debug)]
pub enum DispatchOutcome {
    Continue(ToolResult),
    Terminate {
        reason: TerminationReason,
        message: String,
    },
}

impl DispatchOutcome {
    fn terminate(reason: TerminationReason, message: impl Into<String>) -> Self {
        DispatchOutcome::Terminate {
            reason,
            message: message.into(),
        }
    }
}

/// 拍摄快照并设为最新；驱动失败按恢复策略重试，用尽后返回错误（注册表同时失效）
pub async fn capture(
    session: &RunSession<'_>,
    ctx: &mut RunContext,
    viewport_only: bool,
) -> Result<Snapshot, OrchestratorError> {
    let mut attempt = 0;
    loop {
        match session.snapshots.create(viewport_only, &mut ctx.registry).await {
            Ok((snapshot, _)) => {
                send_event(
                    &session.event_tx,
                    TaskEvent::SnapshotCaptured {
                        generation: snapshot.generation,
                        elements: snapshot.elements.len(),
                        omitted: snapshot.omitted,
                        url: snapshot.url.clone(),
                    },
                );
                ctx.latest = Some(snapshot.clone());
                return Ok(snapshot);
            }
            Err(e) => {
                let err = OrchestratorError::from(e);
                match session.recovery.handle_fatal(&err, attempt) {
                    RecoveryAction::RetryAfter(delay) => {
                        tracing::warn!(error = %err, attempt, "snapshot failed, retrying");
                        send_event(
                            &session.event_tx,
                            TaskEvent::Recovery {
                                action: "retry_snapshot".to_string(),
                                detail: err.to_string(),
                            },
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    RecoveryAction::ReportToModel(_) | RecoveryAction::Terminate(_) => {
                        tracing::error!(error = %err, "snapshot failed, giving up");
                        ctx.registry.invalidate();
                        return Err(err);
                    }
                }
            }
        }
    }
}

pub async fn dispatch(
    session: &RunSession<'_>,
    ctx: &mut RunContext,
    operation: Operation,
) -> DispatchOutcome {
    match operation {
        Operation::GetSnapshot { viewport_only } => match capture(session, ctx, viewport_only).await {
            Ok(snapshot) => DispatchOutcome::Continue(ToolResult::ok(
                "Snapshot captured; handles from earlier snapshots are no longer valid.",
                Some(snapshot),
            )),
            Err(e) => DispatchOutcome::terminate(TerminationReason::ConnectionError, e.to_string()),
        },
        Operation::Click { target } => {
            browser_action(session, ctx, BrowserAction::Click, Some(&target)).await
        }
        Operation::Fill {
            target,
            value,
            clear_first,
        } => {
            browser_action(
                session,
                ctx,
                BrowserAction::Fill { value, clear_first },
                Some(&target),
            )
            .await
        }
        Operation::Select { target, value } => {
            browser_action(session, ctx, BrowserAction::Select { value }, Some(&target)).await
        }
        Operation::Scroll(ScrollRequest::Element(target)) => {
            browser_action(session, ctx, BrowserAction::ScrollIntoView, Some(&target)).await
        }
        Operation::Scroll(ScrollRequest::Page { direction, amount }) => {
            let amount = amount.unwrap_or(session.config.actions.scroll_amount);
            browser_action(
                session,
                ctx,
                BrowserAction::ScrollPage { direction, amount },
                None,
            )
            .await
        }
        Operation::RequestHumanApproval { action, reason } => {
            let request = approval_request(ctx, action, reason, ApprovalSource::Model);
            match ask_human(session, ctx, request).await {
                Err(outcome) => outcome,
                Ok(ApprovalDecision::Approved) => {
                    DispatchOutcome::Continue(ToolResult::ok("A human approved the request.", None))
                }
                Ok(ApprovalDecision::Rejected { feedback }) => rejected(session, feedback, None),
            }
        }
        Operation::CompleteTask {
            status: CompletionStatus::Failed,
            reason,
        } => {
            tracing::info!(reason = %reason, "model declared the task failed");
            DispatchOutcome::terminate(TerminationReason::TaskFailed, reason)
        }
        Operation::CompleteTask {
            status: CompletionStatus::Success,
            reason,
        } => verify_completion(session, ctx, reason),
    }
}

/// 浏览器动作（已解析参数）
enum BrowserAction {
    Click,
    Fill { value: String, clear_first: bool },
    Select { value: String },
    ScrollIntoView,
    ScrollPage {
        direction: crate::browser::ScrollDirection,
        amount: u32,
    },
}

impl BrowserAction {
    fn name(&self) -> &'static str {
        match self {
            BrowserAction::Click => "click",
            BrowserAction::Fill { .. } => "fill",
            BrowserAction::Select { .. } => "select",
            BrowserAction::ScrollIntoView | BrowserAction::ScrollPage { .. } => "scroll",
        }
    }

    fn value(&self) -> Option<&str> {
        match self {
            BrowserAction::Fill { value, .. } | BrowserAction::Select { value } => Some(value),
            _ => None,
        }
    }

    fn describe(&self, target: Option<&ElementDescriptor>, handle: Option<&HandleRef>) -> String {
        let label = match (target, handle) {
            (Some(t), Some(h)) => format!("{} {}", h.text, t.label()),
            (Some(t), None) => t.label(),
            _ => String::new(),
        };
        match self {
            BrowserAction::Click => format!("click {}", label),
            BrowserAction::Fill { value, .. } => format!("fill {} with \"{}\"", label, value),
            BrowserAction::Select { value } => format!("select \"{}\" in {}", value, label),
            BrowserAction::ScrollIntoView => format!("scroll {} into view", label),
            BrowserAction::ScrollPage { direction, amount } => {
                format!("scroll page {} {}px", direction.as_str(), amount)
            }
        }
    }
}

async fn browser_action(
    session: &RunSession<'_>,
    ctx: &mut RunContext,
    action: BrowserAction,
    handle: Option<&HandleRef>,
) -> DispatchOutcome {
    let target = match handle {
        Some(h) => match ctx.bind_handle(h).and_then(|bound| ctx.registry.resolve(&bound)) {
            Ok(element) => Some(element),
            Err(e) => {
                tracing::debug!(handle = %h.text, error = %e, "handle did not resolve");
                return after_action(session, ctx, Err((e.code(), e.to_string())), None).await;
            }
        },
        None => None,
    };

    let mut pending = PendingAction::new(
        action.name(),
        ActionStage::Proposed,
        action.describe(target.as_ref(), handle),
    );
    if let Some(t) = &target {
        pending = pending.with_target(t.clone());
    }
    if let Some(v) = action.value() {
        pending = pending.with_value(v);
    }

    let needs_approval = ctx
        .latest
        .as_ref()
        .is_some_and(|latest| session.evaluator.should_checkpoint(&pending, latest));
    if needs_approval {
        let request = approval_request(
            ctx,
            pending.description.clone(),
            "Service checkpoint before this action".to_string(),
            ApprovalSource::Checkpoint {
                stage: ActionStage::Proposed,
            },
        );
        match ask_human(session, ctx, request).await {
            Err(outcome) => return outcome,
            Ok(ApprovalDecision::Approved) => {}
            Ok(ApprovalDecision::Rejected { feedback }) => {
                return rejected(session, feedback, None);
            }
        }
    }

    let mut attempt = 0;
    let result = loop {
        match execute(session, &action, target.as_ref()).await {
            Ok(()) => break Ok(()),
            Err(e) => match session.recovery.handle_action(&e, attempt) {
                RecoveryAction::ReportToModel(code) => break Err((code, e.to_string())),
                RecoveryAction::RetryAfter(delay) => {
                    tracing::warn!(error = %e, attempt, "driver unreachable, retrying action");
                    send_event(
                        &session.event_tx,
                        TaskEvent::Recovery {
                            action: format!("retry_{}", action.name()),
                            detail: e.to_string(),
                        },
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RecoveryAction::Terminate(reason) => {
                    ctx.registry.invalidate();
                    return DispatchOutcome::terminate(reason, e.to_string());
                }
            },
        }
    };

    let success_message = pending.description.clone();
    after_action(
        session,
        ctx,
        result.map(|()| success_message),
        Some(pending),
    )
    .await
}

async fn execute(
    session: &RunSession<'_>,
    action: &BrowserAction,
    target: Option<&ElementDescriptor>,
) -> Result<(), ActionError> {
    let executor = session.executor;
    match (action, target) {
        (BrowserAction::Click, Some(t)) => executor.click(t, None).await,
        (BrowserAction::Fill { value, clear_first }, Some(t)) => {
            executor.fill(t, value, *clear_first, None).await
        }
        (BrowserAction::Select { value }, Some(t)) => executor.select(t, value, None).await,
        (BrowserAction::ScrollIntoView, Some(t)) => {
            executor.scroll(ScrollTarget::Element(t), None).await
        }
        (BrowserAction::ScrollPage { direction, amount }, _) => {
            executor
                .scroll(
                    ScrollTarget::Page {
                        direction: *direction,
                        amount: *amount,
                    },
                    None,
                )
                .await
        }
        (_, None) => Err(ActionError::Failed(format!(
            "{} requires a target element",
            action.name()
        ))),
    }
}

/// 动作之后（无论成败）重新快照；成功时再评估 Completed 检查点
async fn after_action(
    session: &RunSession<'_>,
    ctx: &mut RunContext,
    result: Result<String, (ErrorCode, String)>,
    pending: Option<PendingAction>,
) -> DispatchOutcome {
    let snapshot = match capture(session, ctx, false).await {
        Ok(s) => s,
        Err(e) => return DispatchOutcome::terminate(TerminationReason::ConnectionError, e.to_string()),
    };

    match result {
        Err((code, message)) => {
            DispatchOutcome::Continue(ToolResult::failure(code, message, Some(snapshot)))
        }
        Ok(message) => {
            if let Some(pending) = pending {
                let completed = pending.at_stage(ActionStage::Completed);
                if session.evaluator.should_checkpoint(&completed, &snapshot) {
                    let request = approval_request(
                        ctx,
                        completed.description.clone(),
                        "Service checkpoint after this action".to_string(),
                        ApprovalSource::Checkpoint {
                            stage: ActionStage::Completed,
                        },
                    );
                    match ask_human(session, ctx, request).await {
                        Err(outcome) => return outcome,
                        Ok(ApprovalDecision::Approved) => {}
                        Ok(ApprovalDecision::Rejected { feedback }) => {
                            return rejected(session, feedback, Some(snapshot));
                        }
                    }
                }
            }
            DispatchOutcome::Continue(ToolResult::ok(format!("Done: {}", message), Some(snapshot)))
        }
    }
}

fn approval_request(
    ctx: &RunContext,
    action: String,
    reason: String,
    source: ApprovalSource,
) -> ApprovalRequest {
    ApprovalRequest {
        action,
        reason,
        source,
        url: ctx.latest.as_ref().map(|s| s.url.clone()).unwrap_or_default(),
        screenshot: ctx.latest.as_ref().map(|s| s.screenshot.clone()),
    }
}

/// 挂起等待人工答复；等待期间取消则以 interrupted 终止
async fn ask_human(
    session: &RunSession<'_>,
    ctx: &mut RunContext,
    request: ApprovalRequest,
) -> Result<ApprovalDecision, DispatchOutcome> {
    ctx.transition(RunPhase::AwaitingApproval);
    tracing::info!(action = %request.action, reason = %request.reason, "awaiting human approval");
    send_event(
        &session.event_tx,
        TaskEvent::ApprovalRequested {
            action: request.action.clone(),
            reason: request.reason.clone(),
        },
    );

    let decision = tokio::select! {
        biased;
        _ = session.cancel_token.cancelled() => {
            return Err(DispatchOutcome::terminate(
                TerminationReason::Interrupted,
                "Interrupted while waiting for human approval",
            ));
        }
        d = session.approval.request(&request) => d,
    };
    ctx.transition(RunPhase::Dispatching);

    let (approved, feedback) = match &decision {
        ApprovalDecision::Approved => (true, None),
        ApprovalDecision::Rejected { feedback } => (false, feedback.clone()),
    };
    tracing::info!(approved, "human approval resolved");
    send_event(
        &session.event_tx,
        TaskEvent::ApprovalResolved { approved, feedback },
    );
    Ok(decision)
}

fn rejected(
    session: &RunSession<'_>,
    feedback: Option<String>,
    snapshot: Option<Snapshot>,
) -> DispatchOutcome {
    let message = match feedback {
        Some(f) if !f.trim().is_empty() => format!("A human rejected the action: {}", f),
        _ => "A human rejected the action.".to_string(),
    };
    match session.evaluator.service().rejection_policy {
        RejectionPolicy::Terminate => DispatchOutcome::terminate(TerminationReason::HumanRejected, message),
        RejectionPolicy::ReturnToModel => {
            DispatchOutcome::Continue(ToolResult::failure(ErrorCode::HumanRejected, message, snapshot))
        }
    }
}

/// complete_task(success)：成功断言命中且失败断言未命中才终止，否则交还 VerificationFailed
fn verify_completion(session: &RunSession<'_>, ctx: &RunContext, reason: String) -> DispatchOutcome {
    let Some(latest) = ctx.latest.as_ref() else {
        return DispatchOutcome::Continue(ToolResult::failure(
            ErrorCode::VerificationFailed,
            "No page state is available to verify completion.",
            None,
        ));
    };
    let evaluator = session.evaluator;
    let failed = evaluator.check_failure(latest);
    let succeeded = evaluator.verify_success(latest);
    if succeeded && !failed {
        tracing::info!(reason = %reason, "completion verified");
        return DispatchOutcome::terminate(TerminationReason::TaskCompleted, reason);
    }

    tracing::warn!(succeeded, failed, "completion claim not verified");
    let message = if failed {
        "Completion not verified: the page shows a failure state. Review the snapshot and continue."
    } else {
        "Completion not verified: the page does not confirm the goal yet. Continue working."
    };
    DispatchOutcome::Continue(ToolResult::failure(
        ErrorCode::VerificationFailed,
        message,
        Some(latest.clone()),
    ))
}
