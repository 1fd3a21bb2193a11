//! 通用断言构造器，供服务配置组合使用

use regex::Regex;

use crate::browser::Snapshot;
use crate::checkpoint::{ActionStage, PendingAction};

/// 页面标题、元素名或值中出现文本（忽略大小写）
pub fn text_visible(text: impl Into<String>) -> impl Fn(&Snapshot) -> bool + Send + Sync + 'static {
    let text = text.into();
    move |snapshot| snapshot.contains_text(&text)
}

pub fn url_contains(fragment: impl Into<String>) -> impl Fn(&Snapshot) -> bool + Send + Sync + 'static {
    let fragment = fragment.into();
    move |snapshot| snapshot.url.contains(&fragment)
}

pub fn url_matches(pattern: Regex) -> impl Fn(&Snapshot) -> bool + Send + Sync + 'static {
    move |snapshot| pattern.is_match(&snapshot.url)
}

pub fn title_contains(fragment: impl Into<String>) -> impl Fn(&Snapshot) -> bool + Send + Sync + 'static {
    let fragment = fragment.into().to_lowercase();
    move |snapshot| snapshot.title.to_lowercase().contains(&fragment)
}

/// 拟执行动作的目标元素名包含任一关键字（忽略大小写）；只在 Proposed 阶段触发
pub fn action_targets_name<I, S>(keywords: I) -> impl Fn(&PendingAction, &Snapshot) -> bool + Send + Sync + 'static
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let keywords: Vec<String> = keywords.into_iter().map(|k| k.into().to_lowercase()).collect();
    move |pending, _| {
        pending.stage == ActionStage::Proposed
            && pending
                .target_name()
                .map(|name| name.to_lowercase())
                .is_some_and(|name| keywords.iter().any(|k| name.contains(k)))
    }
}

/// 动作完成后的新快照中出现任一文本时触发（如 2FA / CAPTCHA 提示）；只在 Completed 阶段触发
pub fn page_shows_any<I, S>(texts: I) -> impl Fn(&PendingAction, &Snapshot) -> bool + Send + Sync + 'static
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let texts: Vec<String> = texts.into_iter().map(Into::into).collect();
    move |pending, snapshot| {
        pending.stage == ActionStage::Completed && texts.iter().any(|t| snapshot.contains_text(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{
        ElementDescriptor, ElementState, Enablement, Locator, Presence, SnapshotElement, Viewport,
    };
    use chrono::Utc;

    fn heading(name: &str) -> ElementDescriptor {
        ElementDescriptor {
            role: "heading".into(),
            name: name.into(),
            state: ElementState {
                presence: Presence::Visible,
                enablement: Enablement::Enabled,
                checked: None,
                expanded: None,
                focused: false,
                busy: false,
            },
            bounds: None,
            value: None,
            level: Some(1),
            locator: Locator::new("h1"),
            document_order: 0,
        }
    }

    fn snapshot_with(name: &str) -> Snapshot {
        Snapshot {
            generation: 1,
            elements: vec![SnapshotElement::from(&heading(name))],
            focused: None,
            url: "https://example.test/membership/cancel/confirmed".into(),
            title: "Membership".into(),
            screenshot: String::new(),
            viewport: Viewport::new(1280.0, 720.0),
            omitted: 0,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_snapshot_predicates() {
        let snap = snapshot_with("Your membership has been cancelled");
        assert!(text_visible("HAS BEEN CANCELLED")(&snap));
        assert!(url_contains("/confirmed")(&snap));
        assert!(url_matches(Regex::new(r"/cancel/\w+$").unwrap())(&snap));
        assert!(title_contains("member")(&snap));
        assert!(!title_contains("billing")(&snap));
    }

    #[test]
    fn test_action_predicates() {
        let snap = snapshot_with("Enter the code we sent you");
        let target = heading("Enter the code we sent you");
        let pending = PendingAction::new("click", ActionStage::Proposed, "click").with_target(target);
        assert!(action_targets_name(["code we sent"])(&pending, &snap));
        assert!(!action_targets_name(["confirm"])(&pending, &snap));
        assert!(!action_targets_name(["code we sent"])(&pending.at_stage(ActionStage::Completed), &snap));

        let shows = page_shows_any(["captcha", "code we sent"]);
        assert!(!shows(&pending, &snap));
        assert!(shows(&pending.at_stage(ActionStage::Completed), &snap));
    }
}
