//! Default value functions referenced from `#[serde(default = ...)]`.

pub(super) fn default_port() -> u16 {
    3536
}

pub(super) fn default_cors_origins() -> String {
    "*".to_string()
}

pub(super) fn default_public_base_url() -> String {
    "ws://localhost:3536".to_string()
}

pub(super) fn default_clock_tick_interval_ms() -> u64 {
    100
}

pub(super) fn default_abandonment_timeout_ms() -> u64 {
    60_000
}

pub(super) fn default_heartbeat_interval_secs() -> u64 {
    10
}

pub(super) fn default_heartbeat_timeout_secs() -> u64 {
    30
}

pub(super) fn default_max_spectators() -> usize {
    50
}

pub(super) fn default_max_chat_length() -> usize {
    500
}

pub(super) fn default_queue_ttl_secs() -> i64 {
    30
}

pub(super) fn default_pending_match_ttl_secs() -> i64 {
    60
}

pub(super) fn default_lobby_timeout_secs() -> u64 {
    300
}

pub(super) fn default_log_dir() -> String {
    "logs".to_string()
}

pub(super) fn default_log_filename() -> String {
    "server.log".to_string()
}

pub(super) fn default_rotation() -> String {
    "daily".to_string()
}

pub(super) fn default_enable_file_logging() -> bool {
    false
}

pub(super) fn default_log_format() -> super::logging::LogFormat {
    super::logging::LogFormat::Text
}
