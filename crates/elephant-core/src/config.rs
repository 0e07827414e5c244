use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{ElephantError, Result};

/// Top-level config (elephant.toml + ELEPHANT_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElephantConfig {
    #[serde(default)]
    pub lark: LarkConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl ElephantConfig {
    /// Load config from a TOML file with `ELEPHANT_`-prefixed env var
    /// overrides, e.g. `ELEPHANT_LARK_APP_ID`.
    ///
    /// Checks, in order: explicit path argument, then
    /// `~/.elephant/elephant.toml`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: ElephantConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("ELEPHANT_").split("_"))
            .extract()
            .map_err(|e| ElephantError::Config(e.to_string()))?;

        Ok(config)
    }
}

/// SQLite-backed persistence used by the plan-review pending store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Every recognized Lark channel option (see spec §6 "Configuration").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LarkConfig {
    /// Gate startup: the channel is not registered unless true.
    #[serde(default)]
    pub enabled: bool,

    /// Messenger credentials.
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub app_secret: String,
    #[serde(default = "default_base_domain")]
    pub base_domain: String,

    /// Prefix for memory and session identifiers.
    #[serde(default = "default_session_prefix")]
    pub session_prefix: String,

    /// Channel admission.
    #[serde(default = "bool_true")]
    pub allow_direct: bool,
    #[serde(default)]
    pub allow_groups: bool,

    /// Propagated to the execution context; default `"full"` if empty.
    #[serde(default)]
    pub agent_preset: String,
    #[serde(default)]
    pub tool_preset: String,

    /// Per-task deadline, in seconds.
    #[serde(default = "default_reply_timeout_secs")]
    pub reply_timeout_secs: u64,

    /// Comma/semicolon/whitespace-separated emoji pool.
    #[serde(default)]
    pub react_emoji: String,

    /// Enable the progress listener (§4.5).
    #[serde(default = "bool_true")]
    pub show_tool_progress: bool,
    /// Enable the plan/clarify bubble decorator (§4.4 item 3).
    #[serde(default = "bool_true")]
    pub show_plan_clarify_messages: bool,

    /// Memory + context-injection policy.
    #[serde(default = "bool_true")]
    pub memory_enabled: bool,
    #[serde(default)]
    pub auto_chat_context: bool,
    #[serde(default = "default_auto_chat_context_size")]
    pub auto_chat_context_size: u32,

    /// Plan-review handshake.
    #[serde(default = "bool_true")]
    pub plan_review_enabled: bool,
    #[serde(default)]
    pub plan_review_require_confirmation: bool,
    #[serde(default = "default_plan_review_pending_ttl_secs")]
    pub plan_review_pending_ttl_secs: u64,

    /// Card surfaces.
    #[serde(default)]
    pub cards_enabled: bool,
    #[serde(default = "bool_true")]
    pub cards_plan_review: bool,
    #[serde(default)]
    pub cards_results: bool,
    #[serde(default)]
    pub cards_errors: bool,

    /// Attachment auto-upload policy.
    #[serde(default = "bool_true")]
    pub auto_upload_files: bool,
    #[serde(default = "default_auto_upload_max_bytes")]
    pub auto_upload_max_bytes: u64,
    #[serde(default)]
    pub auto_upload_allow_ext: Vec<String>,
}

impl Default for LarkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            app_id: String::new(),
            app_secret: String::new(),
            base_domain: default_base_domain(),
            session_prefix: default_session_prefix(),
            allow_direct: true,
            allow_groups: false,
            agent_preset: String::new(),
            tool_preset: String::new(),
            reply_timeout_secs: default_reply_timeout_secs(),
            react_emoji: String::new(),
            show_tool_progress: true,
            show_plan_clarify_messages: true,
            memory_enabled: true,
            auto_chat_context: false,
            auto_chat_context_size: default_auto_chat_context_size(),
            plan_review_enabled: true,
            plan_review_require_confirmation: false,
            plan_review_pending_ttl_secs: default_plan_review_pending_ttl_secs(),
            cards_enabled: false,
            cards_plan_review: true,
            cards_results: false,
            cards_errors: false,
            auto_upload_files: true,
            auto_upload_max_bytes: default_auto_upload_max_bytes(),
            auto_upload_allow_ext: Vec::new(),
        }
    }
}

impl LarkConfig {
    /// `agent_preset`, falling back to `"full"` when empty.
    pub fn agent_preset_or_default(&self) -> &str {
        if self.agent_preset.is_empty() {
            "full"
        } else {
            &self.agent_preset
        }
    }

    /// `tool_preset`, falling back to `"full"` when empty.
    pub fn tool_preset_or_default(&self) -> &str {
        if self.tool_preset.is_empty() {
            "full"
        } else {
            &self.tool_preset
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_base_domain() -> String {
    "https://open.feishu.cn".to_string()
}
fn default_session_prefix() -> String {
    "lark".to_string()
}
fn default_reply_timeout_secs() -> u64 {
    300
}
fn default_auto_chat_context_size() -> u32 {
    20
}
fn default_plan_review_pending_ttl_secs() -> u64 {
    3600
}
fn default_auto_upload_max_bytes() -> u64 {
    20 * 1024 * 1024
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.elephant/elephant.db", home)
}
fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.elephant/elephant.toml", home)
}
