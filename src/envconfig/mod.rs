use std::env;
use std::time::Duration;

const DEFAULT_PORT: u16 = 11434;
const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Ollama endpoint location, read from `OLLAMA_HOST`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl Host {
    pub fn from_env() -> Self {
        let raw = env::var("OLLAMA_HOST").unwrap_or_else(|_| "127.0.0.1:11434".to_string());
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim().trim_end_matches('/');
        let (scheme, rest) = if let Some(rest) = raw.strip_prefix("https://") {
            ("https", rest)
        } else if let Some(rest) = raw.strip_prefix("http://") {
            ("http", rest)
        } else {
            ("http", raw)
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => (host, port.parse().unwrap_or(DEFAULT_PORT)),
            None => (rest, DEFAULT_PORT),
        };
        let host = if host.is_empty() { "127.0.0.1" } else { host };

        Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            port,
        }
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::from_env()
    }
}

/// HTTP request timeout, read from `RAGKIT_TIMEOUT` (seconds).
pub fn request_timeout() -> Duration {
    let secs = env::var("RAGKIT_TIMEOUT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    Duration::from_secs(secs)
}
