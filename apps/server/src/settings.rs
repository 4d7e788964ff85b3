//! Server settings, loaded from `MERIDIAN_*` environment variables.

use std::collections::BTreeSet;

use meridian_dispatch::SelectionStrategy;

/// Validated settings for the control-plane server.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Log filter (`info`, `debug`, or any `EnvFilter` directive).
    pub log_level: String,
    /// Single worker token allowed for control-plane handshake.
    pub worker_token: Option<String>,
    /// Additional allowed worker tokens (comma-separated in the env).
    pub worker_tokens: Vec<String>,
    /// Secret used to sign/verify session resume tokens.
    pub session_secret: String,
    /// TTL for issued session resume tokens, seconds.
    pub session_token_ttl_seconds: u64,
    /// Sliding window size for session sequencing/ack bitmaps.
    pub session_window_size: usize,
    /// Worker selection strategy for dispatch.
    pub dispatch_worker_strategy: SelectionStrategy,
    /// Max heartbeat age (seconds) for eligible workers.
    pub dispatch_worker_max_heartbeat_age_seconds: u64,
    /// Seconds a worker has to acknowledge a dispatch.
    pub dispatch_ack_timeout_seconds: u64,
    /// Grace (seconds) a disconnected session gets before reassignment.
    pub session_disconnect_grace_seconds: u64,
    /// Bootstrap API token granted the admin role (dev convenience).
    pub api_token: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            log_level: "info".into(),
            worker_token: None,
            worker_tokens: Vec::new(),
            session_secret: "dev-session-secret".into(),
            session_token_ttl_seconds: 3600,
            session_window_size: 64,
            dispatch_worker_strategy: SelectionStrategy::Default,
            dispatch_worker_max_heartbeat_age_seconds: 90,
            dispatch_ack_timeout_seconds: 30,
            session_disconnect_grace_seconds: 60,
            api_token: None,
        }
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(format!("MERIDIAN_{name}"))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str) -> anyhow::Result<Option<T>> {
    match var(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("invalid MERIDIAN_{name}: {raw}")),
    }
}

impl Settings {
    /// Load settings, starting from defaults and overlaying the
    /// environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut settings = Self::default();

        if let Some(host) = var("HOST") {
            settings.host = host;
        }
        if let Some(port) = parse_var("PORT")? {
            settings.port = port;
        }
        if let Some(level) = var("LOG_LEVEL") {
            settings.log_level = level;
        }
        settings.worker_token = var("WORKER_TOKEN");
        if let Some(raw) = var("WORKER_TOKENS") {
            settings.worker_tokens = raw
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(secret) = var("SESSION_SECRET") {
            settings.session_secret = secret;
        }
        if let Some(ttl) = parse_var("SESSION_TOKEN_TTL_SECONDS")? {
            settings.session_token_ttl_seconds = ttl;
        }
        if let Some(window) = parse_var("SESSION_WINDOW_SIZE")? {
            settings.session_window_size = window;
        }
        if let Some(raw) = var("DISPATCH_WORKER_STRATEGY") {
            settings.dispatch_worker_strategy = raw
                .parse()
                .map_err(|err: String| anyhow::anyhow!(err))?;
        }
        if let Some(age) = parse_var("DISPATCH_WORKER_MAX_HEARTBEAT_AGE_SECONDS")? {
            settings.dispatch_worker_max_heartbeat_age_seconds = age;
        }
        if let Some(timeout) = parse_var("DISPATCH_ACK_TIMEOUT_SECONDS")? {
            settings.dispatch_ack_timeout_seconds = timeout;
        }
        if let Some(grace) = parse_var("SESSION_DISCONNECT_GRACE_SECONDS")? {
            settings.session_disconnect_grace_seconds = grace;
        }
        settings.api_token = var("API_TOKEN");

        Ok(settings)
    }

    /// The deduplicated worker-token allowlist.
    #[must_use]
    pub fn allowed_worker_tokens(&self) -> Vec<String> {
        let mut tokens: BTreeSet<String> = self
            .worker_tokens
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if let Some(token) = &self.worker_token {
            tokens.insert(token.trim().to_string());
        }
        tokens.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.session_window_size, 64);
        assert_eq!(settings.session_token_ttl_seconds, 3600);
        assert_eq!(settings.dispatch_worker_max_heartbeat_age_seconds, 90);
        assert_eq!(settings.session_secret, "dev-session-secret");
    }

    #[test]
    fn allowlist_merges_and_dedupes() {
        let settings = Settings {
            worker_token: Some("a".into()),
            worker_tokens: vec!["a".into(), " b ".into(), String::new()],
            ..Settings::default()
        };
        assert_eq!(settings.allowed_worker_tokens(), vec!["a", "b"]);
    }
}
