//! 应用配置：从 config/wayfinder.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `WAYFINDER__*` 覆盖（双下划线表示嵌套，如 `WAYFINDER__ORCHESTRATOR__MAX_TURNS=30`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::browser::SnapshotLimits;
use crate::core::RecoveryEngine;
use crate::llm::RetryConfig;

/// 应用配置根（对应 config/wayfinder.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub orchestrator: OrchestratorSection,
    pub snapshot: SnapshotSection,
    pub actions: ActionsSection,
    pub llm: LlmSection,
    pub driver: DriverSection,
}

/// [orchestrator] 段：轮数上限、连续空响应上限
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSection {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// 连续多少次没有提出操作即判定 stalled
    #[serde(default = "default_max_empty_responses")]
    pub max_empty_responses: usize,
}

fn default_max_turns() -> usize {
    20
}

fn default_max_empty_responses() -> usize {
    3
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_empty_responses: default_max_empty_responses(),
        }
    }
}

/// [snapshot] 段：元素数量、名称长度、遍历深度、包围盒查询并发
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotSection {
    #[serde(default = "default_max_elements")]
    pub max_elements: usize,
    #[serde(default = "default_max_name_chars")]
    pub max_name_chars: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_bbox_concurrency")]
    pub bbox_concurrency: usize,
}

fn default_max_elements() -> usize {
    100
}

fn default_max_name_chars() -> usize {
    200
}

fn default_max_depth() -> usize {
    32
}

fn default_bbox_concurrency() -> usize {
    8
}

impl Default for SnapshotSection {
    fn default() -> Self {
        Self {
            max_elements: default_max_elements(),
            max_name_chars: default_max_name_chars(),
            max_depth: default_max_depth(),
            bbox_concurrency: default_bbox_concurrency(),
        }
    }
}

impl SnapshotSection {
    pub fn limits(&self) -> SnapshotLimits {
        SnapshotLimits {
            max_elements: self.max_elements,
            max_name_chars: self.max_name_chars,
            max_depth: self.max_depth,
            bbox_concurrency: self.bbox_concurrency.max(1),
        }
    }
}

/// [actions] 段：单次动作超时（毫秒）、页面滚动默认像素
#[derive(Debug, Clone, Deserialize)]
pub struct ActionsSection {
    #[serde(default = "default_action_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_scroll_amount")]
    pub scroll_amount: u32,
}

fn default_action_timeout_ms() -> u64 {
    5000
}

fn default_scroll_amount() -> u32 {
    600
}

impl Default for ActionsSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_action_timeout_ms(),
            scroll_amount: default_scroll_amount(),
        }
    }
}

impl ActionsSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// [llm] 段：单次调用超时与瞬时错误重试
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_request_timeout() -> u64 {
    60
}

fn default_retries() -> u32 {
    1
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    8000
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            max_retries: default_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl LlmSection {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_delay: Duration::from_millis(self.backoff_max_ms),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

/// [driver] 段：驱动连接失败的重试与退避
#[derive(Debug, Clone, Deserialize)]
pub struct DriverSection {
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for DriverSection {
    fn default() -> Self {
        Self {
            max_retries: default_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl DriverSection {
    pub fn recovery_engine(&self) -> RecoveryEngine {
        RecoveryEngine::new(
            self.max_retries,
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_max_ms),
        )
    }
}

/// 加载配置，环境变量 WAYFINDER__* 可覆盖
///
/// 1. 按顺序查找 config/wayfinder.toml、wayfinder.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 WAYFINDER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/wayfinder", "wayfinder"] {
        if std::path::Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("WAYFINDER")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
