//! 提示词构建：system prompt（目标 + 固定规则 + 服务指引）与各类引导消息

use crate::browser::Snapshot;
use crate::llm::ToolCall;
use crate::memory::Message;

const RULES: &str = "\
Rules:
1. Call exactly one operation per turn. Extra operations in the same turn are not executed.
2. Refer to elements only by handles (like @e3) from the most recent snapshot. Handles expire whenever a new snapshot is taken; every browser operation returns a new snapshot.
3. If an element is missing from the snapshot, scroll or call get_snapshot instead of guessing.
4. Before any irreversible or sensitive step you are unsure about, call request_human_approval. Never try to solve 2FA or CAPTCHA challenges yourself; ask for approval instead.
5. Call complete_task with status \"success\" only when the page visibly confirms the goal is achieved. Your claim is verified against the page; if it is not confirmed, keep working.
6. Call complete_task with status \"failed\" when the goal cannot be achieved, and explain why.";

pub fn system_prompt(goal: &str, guidance: &str) -> String {
    let mut prompt = format!(
        "You control a web browser to accomplish a goal for the user.\n\nGoal: {}\n\n{}",
        goal.trim(),
        RULES
    );
    let guidance = guidance.trim();
    if !guidance.is_empty() {
        prompt.push_str("\n\nService guidance:\n");
        prompt.push_str(guidance);
    }
    prompt
}

/// 首条 user 消息：目标 + 初始快照（附截图）
pub fn initial_message(goal: &str, snapshot: &Snapshot) -> Message {
    Message::user(format!(
        "Goal: {}\n\nCurrent page:\n{}",
        goal.trim(),
        snapshot.render()
    ))
    .with_image(snapshot.screenshot.clone())
}

/// 模型未提出任何操作时的提醒
pub fn nudge_message(remaining: usize) -> Message {
    Message::user(format!(
        "You did not call any operation. Call exactly one operation now, or call complete_task if you are done. \
         {} more empty response(s) will stop the task.",
        remaining
    ))
}

/// 被丢弃的额外操作的回执
pub fn discarded_message(call: &ToolCall, executed: &str) -> Message {
    Message::tool(
        call.id.clone(),
        format!(
            "{{\"success\":false,\"message\":\"Not executed: only the first operation ({}) of a turn runs. Re-issue '{}' in a later turn if it is still needed.\"}}",
            executed, call.name
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_includes_goal_and_guidance() {
        let prompt = system_prompt("Cancel the gym membership", "The cancel link is under Billing.");
        assert!(prompt.contains("Goal: Cancel the gym membership"));
        assert!(prompt.contains("exactly one operation"));
        assert!(prompt.ends_with("The cancel link is under Billing."));
        assert!(!system_prompt("g", "  ").contains("Service guidance"));
    }
}
