//! 编排器集成测试：MockDriver + ScriptedLlmClient + 静态确认通道

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use wayfinder::browser::{AxNode, DriverError, MockDriver, MockPage, RecordedAction, ScrollDirection};
    use wayfinder::checkpoint::{predicates, ApprovalBroker, ApprovalChannel, StaticApproval};
    use wayfinder::core::SessionSupervisor;
    use wayfinder::llm::{LlmError, ModelResponse, ScriptedLlmClient, ToolCall};
    use wayfinder::memory::{Message, Role};
    use wayfinder::react::TaskEvent;
    use wayfinder::{AppConfig, RejectionPolicy, ServiceConfig, TaskOrchestrator, TerminationReason};

    fn fast_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.driver.backoff_base_ms = 1;
        cfg.driver.backoff_max_ms = 2;
        cfg.llm.backoff_base_ms = 1;
        cfg.llm.backoff_max_ms = 2;
        cfg
    }

    fn heading(id: &str, name: &str) -> AxNode {
        AxNode {
            level: Some(1),
            ..AxNode::new(id, "heading", name)
        }
    }

    /// @e0 link "Home", @e1 button "Cancel membership", @e2 button "Keep membership"
    fn account_page() -> MockPage {
        MockPage::new(
            "https://gym.test/account",
            "Account",
            vec![
                AxNode::new("nav-home", "link", "Home"),
                AxNode::new("btn-cancel", "button", "Cancel membership"),
                AxNode::new("btn-keep", "button", "Keep membership"),
            ],
        )
    }

    /// @e0 heading "Are you sure?", @e1 button "Confirm cancellation"
    fn confirm_page() -> MockPage {
        MockPage::new(
            "https://gym.test/cancel/confirm",
            "Confirm",
            vec![
                heading("h-confirm", "Are you sure?"),
                AxNode::new("btn-confirm", "button", "Confirm cancellation"),
            ],
        )
    }

    fn done_page() -> MockPage {
        MockPage::new(
            "https://gym.test/cancel/done",
            "Cancelled",
            vec![heading("h-done", "Your membership has been cancelled")],
        )
    }

    fn gym_service() -> ServiceConfig {
        ServiceConfig::new("gym")
            .with_guidance("The cancel button is on the account page.")
            .with_success(predicates::text_visible("has been cancelled"))
    }

    fn click(handle: &str) -> ModelResponse {
        ModelResponse::call("click", json!({ "handle": handle }))
    }

    fn complete(status: &str, reason: &str) -> ModelResponse {
        ModelResponse::call("complete_task", json!({ "status": status, "reason": reason }))
    }

    fn orchestrator(
        driver: &Arc<MockDriver>,
        llm: &Arc<ScriptedLlmClient>,
        approval: Arc<dyn ApprovalChannel>,
        service: ServiceConfig,
    ) -> TaskOrchestrator {
        TaskOrchestrator::new(driver.clone(), llm.clone(), approval, service, fast_config())
    }

    fn tool_messages(messages: &[Message]) -> Vec<String> {
        messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.content.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_happy_path_completes_with_verification() {
        let driver = Arc::new(
            MockDriver::new(account_page()).with_transitions(vec![confirm_page(), done_page()]),
        );
        let llm = Arc::new(ScriptedLlmClient::from_responses(vec![
            click("@e1"),
            click("@e1"),
            complete("success", "Confirmation page says the membership has been cancelled"),
        ]));
        let orch = orchestrator(&driver, &llm, Arc::new(StaticApproval::approve()), gym_service());

        let result = orch.run("Cancel my gym membership", CancellationToken::new()).await;

        assert!(result.success);
        assert_eq!(result.reason, TerminationReason::TaskCompleted);
        assert_eq!(result.turns, 3);
        assert_eq!(
            driver.actions(),
            vec![
                RecordedAction::Click("btn-cancel".into()),
                RecordedAction::Click("btn-confirm".into())
            ]
        );
        assert!(driver.is_closed());
        let final_snapshot = result.final_snapshot.unwrap();
        assert_eq!(final_snapshot.title, "Cancelled");
        assert_eq!(final_snapshot.generation, 3);
    }

    #[tokio::test]
    async fn test_first_message_carries_goal_snapshot_and_screenshot() {
        let driver = Arc::new(MockDriver::new(account_page()));
        let llm = Arc::new(ScriptedLlmClient::from_responses(vec![complete("failed", "stop")]));
        let orch = orchestrator(&driver, &llm, Arc::new(StaticApproval::approve()), gym_service());

        orch.run("Cancel my gym membership", CancellationToken::new()).await;

        let messages = llm.last_messages();
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("Cancel my gym membership"));
        assert!(messages[0].content.contains("The cancel button is on the account page."));
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1].content.contains("@e1 button \"Cancel membership\""));
        assert!(messages[1].image.as_deref().is_some_and(|s| !s.is_empty()));
    }

    #[tokio::test]
    async fn test_handles_from_previous_generation_are_not_reused() {
        let driver = Arc::new(MockDriver::new(account_page()).with_transitions(vec![confirm_page()]));
        let llm = Arc::new(ScriptedLlmClient::from_responses(vec![
            click("@e1"),
            // confirm page has only @e0 and @e1; @e2 existed only in the first snapshot
            click("@e2"),
            complete("failed", "lost"),
        ]));
        let orch = orchestrator(&driver, &llm, Arc::new(StaticApproval::approve()), gym_service());

        let result = orch.run("Cancel my gym membership", CancellationToken::new()).await;

        assert_eq!(result.reason, TerminationReason::TaskFailed);
        assert_eq!(driver.actions(), vec![RecordedAction::Click("btn-cancel".into())]);
        let tools = tool_messages(&llm.last_messages());
        assert!(tools[0].contains("Snapshot generation 2"));
        assert!(tools[1].contains("\"ReferenceInvalid\""));
        assert!(tools[1].contains("Snapshot generation 3"));
    }

    #[tokio::test]
    async fn test_scroll_without_target_is_rejected_before_driver() {
        let driver = Arc::new(MockDriver::new(account_page()));
        let llm = Arc::new(ScriptedLlmClient::from_responses(vec![
            ModelResponse::call("scroll", json!({})),
            complete("failed", "giving up"),
        ]));
        let orch = orchestrator(&driver, &llm, Arc::new(StaticApproval::approve()), gym_service());

        let result = orch.run("Cancel my gym membership", CancellationToken::new()).await;

        assert_eq!(result.reason, TerminationReason::TaskFailed);
        assert!(driver.actions().is_empty());
        let tools = tool_messages(&llm.last_messages());
        let parsed: serde_json::Value = serde_json::from_str(&tools[0]).unwrap();
        assert_eq!(parsed["success"], false);
        assert_eq!(parsed["error"], "InvalidParameters");
        // 未重新快照：仍是第一代
        assert_eq!(result.final_snapshot.unwrap().generation, 1);
    }

    #[tokio::test]
    async fn test_unverified_completion_keeps_running() {
        let driver = Arc::new(
            MockDriver::new(account_page()).with_transitions(vec![confirm_page(), done_page()]),
        );
        let llm = Arc::new(ScriptedLlmClient::from_responses(vec![
            complete("success", "I think it is done"),
            click("@e1"),
            click("@e1"),
            complete("success", "Cancelled"),
        ]));
        let orch = orchestrator(&driver, &llm, Arc::new(StaticApproval::approve()), gym_service());

        let result = orch.run("Cancel my gym membership", CancellationToken::new()).await;

        assert!(result.success);
        assert_eq!(result.turns, 4);
        let tools = tool_messages(&llm.last_messages());
        assert!(tools[0].contains("\"VerificationFailed\""));
    }

    #[tokio::test]
    async fn test_failure_predicate_blocks_completion() {
        let service = ServiceConfig::new("gym")
            .with_success(predicates::text_visible("membership"))
            .with_failure(predicates::url_contains("/account"));
        let driver = Arc::new(MockDriver::new(account_page()));
        let llm = Arc::new(ScriptedLlmClient::from_responses(vec![
            complete("success", "membership is mentioned"),
            complete("failed", "cannot verify"),
        ]));
        let orch = orchestrator(&driver, &llm, Arc::new(StaticApproval::approve()), service);

        let result = orch.run("Cancel my gym membership", CancellationToken::new()).await;

        assert!(!result.success);
        assert_eq!(result.reason, TerminationReason::TaskFailed);
        assert_eq!(result.message, "cannot verify");
        assert!(tool_messages(&llm.last_messages())[0].contains("failure state"));
    }

    #[tokio::test]
    async fn test_turn_budget_exhausted() {
        let driver = Arc::new(MockDriver::new(account_page()));
        let responses = (0..25)
            .map(|_| ModelResponse::call("get_snapshot", json!({})))
            .collect();
        let llm = Arc::new(ScriptedLlmClient::from_responses(responses));
        let orch = orchestrator(&driver, &llm, Arc::new(StaticApproval::approve()), gym_service());

        let result = orch.run("Cancel my gym membership", CancellationToken::new()).await;

        assert!(!result.success);
        assert_eq!(result.reason, TerminationReason::MaxTurnsExceeded);
        assert_eq!(result.turns, 20);
        assert_eq!(llm.invocations(), 20);
        assert!(driver.is_closed());
    }

    #[tokio::test]
    async fn test_checkpoint_rejection_terminates_without_clicking() {
        let service = gym_service().with_checkpoint(predicates::action_targets_name(["cancel"]));
        let approval = Arc::new(StaticApproval::reject(Some("do not cancel yet")));
        let driver = Arc::new(MockDriver::new(account_page()).with_transitions(vec![confirm_page()]));
        let llm = Arc::new(ScriptedLlmClient::from_responses(vec![click("@e1")]));
        let orch = orchestrator(&driver, &llm, approval.clone(), service);

        let result = orch.run("Cancel my gym membership", CancellationToken::new()).await;

        assert!(!result.success);
        assert_eq!(result.reason, TerminationReason::HumanRejected);
        assert!(result.message.contains("do not cancel yet"));
        assert!(driver.actions().is_empty());
        assert!(driver.is_closed());
        let requests = approval.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].action.contains("Cancel membership"));
    }

    #[tokio::test]
    async fn test_checkpoint_rejection_can_return_to_model() {
        let service = gym_service()
            .with_checkpoint(predicates::action_targets_name(["cancel"]))
            .with_rejection_policy(RejectionPolicy::ReturnToModel);
        let driver = Arc::new(MockDriver::new(account_page()));
        let llm = Arc::new(ScriptedLlmClient::from_responses(vec![
            click("@e1"),
            complete("failed", "human declined"),
        ]));
        let orch = orchestrator(
            &driver,
            &llm,
            Arc::new(StaticApproval::reject(Some("wait for Friday"))),
            service,
        );

        let result = orch.run("Cancel my gym membership", CancellationToken::new()).await;

        assert_eq!(result.reason, TerminationReason::TaskFailed);
        assert!(driver.actions().is_empty());
        let first = &tool_messages(&llm.last_messages())[0];
        assert!(first.contains("\"HumanRejected\""));
        // 人工反馈原文回传给模型
        assert!(first.contains("wait for Friday"));
    }

    #[tokio::test]
    async fn test_checkpoint_approval_lets_action_run() {
        let service = gym_service().with_checkpoint(predicates::action_targets_name(["confirm"]));
        let approval = Arc::new(StaticApproval::approve());
        let driver = Arc::new(
            MockDriver::new(account_page()).with_transitions(vec![confirm_page(), done_page()]),
        );
        let llm = Arc::new(ScriptedLlmClient::from_responses(vec![
            click("@e1"),
            click("@e1"),
            complete("success", "done"),
        ]));
        let orch = orchestrator(&driver, &llm, approval.clone(), service);

        let result = orch.run("Cancel my gym membership", CancellationToken::new()).await;

        assert!(result.success);
        assert_eq!(driver.actions().len(), 2);
        // 仅「Confirm cancellation」触发检查点
        assert_eq!(approval.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_checkpoint_after_action_sees_new_page() {
        let challenge = MockPage::new(
            "https://gym.test/verify",
            "Verify",
            vec![
                heading("h-verify", "Enter the verification code we sent"),
                AxNode::new("code", "textbox", "Code"),
            ],
        );
        let service = gym_service().with_checkpoint(predicates::page_shows_any(["verification code"]));
        let approval = Arc::new(StaticApproval::reject(Some("I'll do it myself")));
        let driver = Arc::new(MockDriver::new(account_page()).with_transitions(vec![challenge]));
        let llm = Arc::new(ScriptedLlmClient::from_responses(vec![click("@e1")]));
        let orch = orchestrator(&driver, &llm, approval.clone(), service);

        let result = orch.run("Cancel my gym membership", CancellationToken::new()).await;

        assert_eq!(result.reason, TerminationReason::HumanRejected);
        // 动作已执行，检查点在新快照上触发
        assert_eq!(driver.actions(), vec![RecordedAction::Click("btn-cancel".into())]);
        assert_eq!(approval.requests().len(), 1);
        assert_eq!(result.final_snapshot.unwrap().title, "Verify");
    }

    #[tokio::test]
    async fn test_model_requested_approval() {
        let driver = Arc::new(MockDriver::new(account_page()));
        let approval = Arc::new(StaticApproval::approve());
        let llm = Arc::new(ScriptedLlmClient::from_responses(vec![
            ModelResponse::call(
                "request_human_approval",
                json!({ "action": "enter 2FA code", "reason": "a code was sent by SMS" }),
            ),
            complete("failed", "stop"),
        ]));
        let orch = orchestrator(&driver, &llm, approval.clone(), gym_service());

        orch.run("Cancel my gym membership", CancellationToken::new()).await;

        assert_eq!(approval.requests()[0].action, "enter 2FA code");
        let parsed: serde_json::Value =
            serde_json::from_str(&tool_messages(&llm.last_messages())[0]).unwrap();
        assert_eq!(parsed["success"], true);
    }

    #[tokio::test]
    async fn test_stalled_after_three_empty_responses() {
        let driver = Arc::new(MockDriver::new(account_page()));
        let llm = Arc::new(ScriptedLlmClient::from_responses(vec![
            ModelResponse::text("Let me think."),
            ModelResponse::text("Still thinking."),
        ]));
        let orch = orchestrator(&driver, &llm, Arc::new(StaticApproval::approve()), gym_service());

        let result = orch.run("Cancel my gym membership", CancellationToken::new()).await;

        assert_eq!(result.reason, TerminationReason::Stalled);
        assert_eq!(result.turns, 3);
        assert!(driver.is_closed());
    }

    #[tokio::test]
    async fn test_empty_counter_resets_after_operation() {
        let driver = Arc::new(MockDriver::new(account_page()));
        let llm = Arc::new(ScriptedLlmClient::from_responses(vec![
            ModelResponse::text("hmm"),
            ModelResponse::text("hmm"),
            ModelResponse::call("get_snapshot", json!({ "viewport_only": true })),
            ModelResponse::text("hmm"),
            ModelResponse::text("hmm"),
            complete("failed", "stop"),
        ]));
        let orch = orchestrator(&driver, &llm, Arc::new(StaticApproval::approve()), gym_service());

        let result = orch.run("Cancel my gym membership", CancellationToken::new()).await;

        assert_eq!(result.reason, TerminationReason::TaskFailed);
        assert_eq!(result.turns, 6);
    }

    #[tokio::test]
    async fn test_only_first_operation_executes() {
        let driver = Arc::new(MockDriver::new(account_page()).with_transitions(vec![confirm_page()]));
        let llm = Arc::new(ScriptedLlmClient::from_responses(vec![
            ModelResponse::calls(vec![
                ToolCall::new("click", json!({ "handle": "@e1" })).with_id("call-1"),
                ToolCall::new("click", json!({ "handle": "@e2" })).with_id("call-2"),
            ]),
            complete("failed", "stop"),
        ]));
        let orch = orchestrator(&driver, &llm, Arc::new(StaticApproval::approve()), gym_service());

        let result = orch.run("Cancel my gym membership", CancellationToken::new()).await;

        assert_eq!(driver.actions(), vec![RecordedAction::Click("btn-cancel".into())]);
        assert_eq!(result.notes.len(), 1);
        let messages = llm.last_messages();
        let tool_ids: Vec<Option<String>> = messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.tool_call_id.clone())
            .collect();
        assert_eq!(tool_ids, vec![Some("call-1".into()), Some("call-2".into())]);
        assert!(tool_messages(&messages)[1].contains("Not executed"));
    }

    #[tokio::test]
    async fn test_element_errors_return_to_model() {
        let driver = Arc::new(MockDriver::new(account_page()).with_action_failure(
            "btn-cancel",
            DriverError::Action(
                "Element is not clickable at point (10, 20). Other element would receive the click".into(),
            ),
        ));
        let llm = Arc::new(ScriptedLlmClient::from_responses(vec![
            click("@e1"),
            complete("failed", "overlay in the way"),
        ]));
        let orch = orchestrator(&driver, &llm, Arc::new(StaticApproval::approve()), gym_service());

        let result = orch.run("Cancel my gym membership", CancellationToken::new()).await;

        assert_eq!(result.reason, TerminationReason::TaskFailed);
        let tools = tool_messages(&llm.last_messages());
        assert!(tools[0].contains("\"ElementObscured\""));
        // 失败后依然重新快照
        assert_eq!(result.final_snapshot.unwrap().generation, 2);
    }

    #[tokio::test]
    async fn test_page_scroll_uses_configured_amount() {
        let driver = Arc::new(MockDriver::new(account_page()));
        let llm = Arc::new(ScriptedLlmClient::from_responses(vec![
            ModelResponse::call("scroll", json!({ "direction": "down" })),
            complete("failed", "stop"),
        ]));
        let orch = orchestrator(&driver, &llm, Arc::new(StaticApproval::approve()), gym_service());

        let result = orch.run("Cancel my gym membership", CancellationToken::new()).await;

        assert_eq!(
            driver.actions(),
            vec![RecordedAction::ScrollPage {
                direction: ScrollDirection::Down,
                amount: 600
            }]
        );
        assert_eq!(result.final_snapshot.unwrap().viewport.scroll_y, 600.0);
    }

    #[tokio::test]
    async fn test_unreachable_action_is_retried_once() {
        let driver = Arc::new(MockDriver::new(account_page()));
        driver.fail_next_actions(1);
        let llm = Arc::new(ScriptedLlmClient::from_responses(vec![
            click("@e1"),
            complete("failed", "stop"),
        ]));
        let orch = orchestrator(&driver, &llm, Arc::new(StaticApproval::approve()), gym_service());

        let result = orch.run("Cancel my gym membership", CancellationToken::new()).await;

        assert_eq!(result.reason, TerminationReason::TaskFailed);
        assert_eq!(driver.actions(), vec![RecordedAction::Click("btn-cancel".into())]);
    }

    #[tokio::test]
    async fn test_persistent_disconnect_terminates_with_connection_error() {
        let driver = Arc::new(MockDriver::new(account_page()));
        driver.fail_next_actions(5);
        let llm = Arc::new(ScriptedLlmClient::from_responses(vec![click("@e1")]));
        let orch = orchestrator(&driver, &llm, Arc::new(StaticApproval::approve()), gym_service());

        let result = orch.run("Cancel my gym membership", CancellationToken::new()).await;

        assert_eq!(result.reason, TerminationReason::ConnectionError);
        assert!(driver.is_closed());
    }

    #[tokio::test]
    async fn test_initial_snapshot_retry() {
        let driver = Arc::new(MockDriver::new(account_page()));
        driver.fail_next_snapshots(1);
        let llm = Arc::new(ScriptedLlmClient::from_responses(vec![complete("failed", "stop")]));
        let orch = orchestrator(&driver, &llm, Arc::new(StaticApproval::approve()), gym_service());
        let result = orch.run("goal", CancellationToken::new()).await;
        assert_eq!(result.reason, TerminationReason::TaskFailed);

        let driver = Arc::new(MockDriver::new(account_page()));
        driver.fail_next_snapshots(2);
        let llm = Arc::new(ScriptedLlmClient::from_responses(vec![complete("failed", "stop")]));
        let orch = orchestrator(&driver, &llm, Arc::new(StaticApproval::approve()), gym_service());
        let result = orch.run("goal", CancellationToken::new()).await;
        assert_eq!(result.reason, TerminationReason::ConnectionError);
        assert_eq!(result.turns, 0);
        assert!(result.final_snapshot.is_none());
        assert_eq!(llm.invocations(), 0);
        assert!(driver.is_closed());
    }

    #[tokio::test]
    async fn test_model_failure_terminates_with_connection_error() {
        let driver = Arc::new(MockDriver::new(account_page()));
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            Err(LlmError::Network("connection reset".into())),
            Err(LlmError::Network("connection reset".into())),
        ]));
        let orch = orchestrator(&driver, &llm, Arc::new(StaticApproval::approve()), gym_service());

        let result = orch.run("goal", CancellationToken::new()).await;

        assert_eq!(result.reason, TerminationReason::ConnectionError);
        assert_eq!(llm.invocations(), 2);
        assert!(result.message.contains("connection reset"));
        assert!(driver.is_closed());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let driver = Arc::new(MockDriver::new(account_page()));
        let llm = Arc::new(ScriptedLlmClient::from_responses(vec![click("@e1")]));
        let orch = orchestrator(&driver, &llm, Arc::new(StaticApproval::approve()), gym_service());
        let token = CancellationToken::new();
        token.cancel();

        let result = orch.run("goal", token).await;

        assert_eq!(result.reason, TerminationReason::Interrupted);
        assert_eq!(result.turns, 0);
        assert_eq!(llm.invocations(), 0);
        assert!(driver.is_closed());
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_approval() {
        let (broker, _pending_rx) = ApprovalBroker::new();
        let service = gym_service().with_checkpoint(predicates::action_targets_name(["cancel"]));
        let driver = Arc::new(MockDriver::new(account_page()));
        let llm = Arc::new(ScriptedLlmClient::from_responses(vec![click("@e1")]));
        let orch = orchestrator(&driver, &llm, Arc::new(broker), service);
        let supervisor = Arc::new(SessionSupervisor::new());

        let canceller = Arc::clone(&supervisor);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });
        let result = orch.run("goal", supervisor.cancel_token()).await;

        assert_eq!(result.reason, TerminationReason::Interrupted);
        assert!(driver.actions().is_empty());
        assert!(driver.is_closed());
    }

    #[tokio::test]
    async fn test_events_cover_run_lifecycle() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let driver = Arc::new(MockDriver::new(account_page()));
        let llm = Arc::new(ScriptedLlmClient::from_responses(vec![complete("failed", "stop")]));
        let orch = orchestrator(&driver, &llm, Arc::new(StaticApproval::approve()), gym_service())
            .with_event_tx(tx);

        orch.run("goal", CancellationToken::new()).await;
        drop(orch);

        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        assert!(matches!(events.first(), Some(TaskEvent::RunStarted { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, TaskEvent::SnapshotCaptured { generation: 1, .. })));
        assert!(matches!(
            events.last(),
            Some(TaskEvent::Finished {
                success: false,
                reason: TerminationReason::TaskFailed,
                turns: 1
            })
        ));
    }
}
