//! HTTP surface of the gateway: route paths and JSON payloads

use serde::{Deserialize, Serialize};

/// Route paths
pub mod routes {
    pub const CHAT: &str = "/api/openrouter";
    pub const STATUS: &str = "/api/status";
}

/// Body of `GET /api/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    /// Model candidates in dispatch order
    pub models: Vec<String>,
    pub api_key_configured: bool,
    pub uptime_secs: u64,
    /// RFC 3339 start time
    pub started_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_response_shape() {
        let status = StatusResponse {
            status: "ok".to_string(),
            models: vec!["a".to_string()],
            api_key_configured: true,
            uptime_secs: 3,
            started_at: "2025-01-01T00:00:00+00:00".to_string(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["models"][0], "a");
        assert_eq!(json["api_key_configured"], true);
    }
}
