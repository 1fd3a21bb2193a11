//! 动作执行器
//!
//! 对已解析的元素执行 click / fill / select / scroll；每次调用施加超时（默认值可逐次覆盖），
//! 失败时返回类型化的 ActionError，由上层分发转换为 ToolResult；每次调用输出结构化审计日志（JSON）。

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::browser::{BrowserDriver, DriverError, ElementDescriptor, Enablement, ScrollDirection};
use crate::core::ActionError;

/// 滚动目标：元素（滚入视口）或页面方向
#[derive(Debug, Clone, Copy)]
pub enum ScrollTarget<'a> {
    Element(&'a ElementDescriptor),
    Page { direction: ScrollDirection, amount: u32 },
}

/// 按驱动返回的原文归类交互失败
pub fn classify_driver_error(err: DriverError, timeout_ms: u64, operation: &str) -> ActionError {
    match err {
        DriverError::Disconnected(msg) => ActionError::Unreachable(msg),
        DriverError::Timeout(_) => ActionError::Timeout {
            operation: operation.to_string(),
            timeout_ms,
        },
        DriverError::Action(msg) | DriverError::Protocol(msg) => {
            let lower = msg.to_lowercase();
            if lower.contains("intercepts pointer")
                || lower.contains("obscured")
                || lower.contains("not clickable at point")
                || lower.contains("would receive the click")
            {
                ActionError::ElementObscured(msg)
            } else if lower.contains("disabled") {
                ActionError::ElementDisabled(msg)
            } else if lower.contains("not visible") || lower.contains("is hidden") {
                ActionError::ElementNotVisible(msg)
            } else {
                ActionError::Failed(msg)
            }
        }
    }
}

/// 动作执行器：持有驱动与默认超时
pub struct ActionExecutor {
    driver: Arc<dyn BrowserDriver>,
    default_timeout: Duration,
}

impl ActionExecutor {
    pub fn new(driver: Arc<dyn BrowserDriver>, default_timeout: Duration) -> Self {
        Self {
            driver,
            default_timeout,
        }
    }

    pub async fn click(
        &self,
        element: &ElementDescriptor,
        timeout_override: Option<Duration>,
    ) -> Result<(), ActionError> {
        ensure_enabled(element)?;
        let t = timeout_override.unwrap_or(self.default_timeout);
        self.run("click", &element.label(), t, self.driver.click(&element.locator, t))
            .await
    }

    /// 输入文本；clear_first 为 true 时先清空已有内容
    pub async fn fill(
        &self,
        element: &ElementDescriptor,
        value: &str,
        clear_first: bool,
        timeout_override: Option<Duration>,
    ) -> Result<(), ActionError> {
        ensure_enabled(element)?;
        if element.state.enablement == Enablement::ReadOnly {
            return Err(ActionError::ElementDisabled(format!(
                "{} is read-only",
                element.label()
            )));
        }
        let t = timeout_override.unwrap_or(self.default_timeout);
        self.run(
            "fill",
            &element.label(),
            t,
            self.driver.fill(&element.locator, value, clear_first, t),
        )
        .await
    }

    pub async fn select(
        &self,
        element: &ElementDescriptor,
        value: &str,
        timeout_override: Option<Duration>,
    ) -> Result<(), ActionError> {
        ensure_enabled(element)?;
        let t = timeout_override.unwrap_or(self.default_timeout);
        self.run(
            "select",
            &element.label(),
            t,
            self.driver.select_option(&element.locator, value, t),
        )
        .await
    }

    pub async fn scroll(
        &self,
        target: ScrollTarget<'_>,
        timeout_override: Option<Duration>,
    ) -> Result<(), ActionError> {
        let t = timeout_override.unwrap_or(self.default_timeout);
        match target {
            ScrollTarget::Element(element) => {
                self.run(
                    "scroll",
                    &element.label(),
                    t,
                    self.driver.scroll_into_view(&element.locator, t),
                )
                .await
            }
            ScrollTarget::Page { direction, amount } => {
                let label = format!("page {} {}px", direction.as_str(), amount);
                self.run("scroll", &label, t, self.driver.scroll_page(direction, amount, t))
                    .await
            }
        }
    }

    async fn run<F>(&self, operation: &str, target: &str, t: Duration, fut: F) -> Result<(), ActionError>
    where
        F: Future<Output = Result<(), DriverError>>,
    {
        let start = Instant::now();
        let timeout_ms = t.as_millis() as u64;
        let result = match timeout(t, fut).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(classify_driver_error(e, timeout_ms, operation)),
            Err(_) => Err(ActionError::Timeout {
                operation: operation.to_string(),
                timeout_ms,
            }),
        };

        let outcome = match &result {
            Ok(()) => "ok".to_string(),
            Err(e) => e.code().to_string(),
        };
        let audit = serde_json::json!({
            "event": "action_audit",
            "operation": operation,
            "target": target,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
        });
        tracing::info!(audit = %audit.to_string(), "action");
        result
    }
}

fn ensure_enabled(element: &ElementDescriptor) -> Result<(), ActionError> {
    if element.is_disabled() {
        return Err(ActionError::ElementDisabled(format!(
            "{} is disabled",
            element.label()
        )));
    }
    Ok(())
}
