//! HTTP fetch shim
//!
//! Requests are executed by a command-line transfer tool through the bridge's
//! shell proxy. The tool's stdout, stderr and exit code are folded into an
//! [`HttpResponse`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::bridge::{BridgeResult, BridgeSlot};
use crate::core::process::{shell_quote, ExecOutput};

use super::with_bridge;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequest {
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self {
            method: default_method(),
            headers: BTreeMap::new(),
            body: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub success: bool,
    pub data: Option<String>,
    pub error: Option<String>,
}

impl From<ExecOutput> for HttpResponse {
    fn from(out: ExecOutput) -> Self {
        if out.succeeded() {
            return Self {
                success: true,
                data: Some(out.stdout),
                error: None,
            };
        }
        let stderr = out.stderr.trim();
        Self {
            success: false,
            data: (!out.stdout.is_empty()).then_some(out.stdout.clone()),
            error: Some(if stderr.is_empty() {
                format!("Transfer tool exited with code {}", out.code)
            } else {
                stderr.to_string()
            }),
        }
    }
}

/// Fetch proxy bound to a transfer tool
#[derive(Debug, Clone)]
pub struct HttpApi {
    bridge: BridgeSlot,
    tool: String,
}

impl HttpApi {
    pub fn new(bridge: BridgeSlot, tool: impl Into<String>) -> Self {
        Self {
            bridge,
            tool: tool.into(),
        }
    }

    /// Shell line that performs the request
    pub fn command_line(&self, url: &str, request: &HttpRequest) -> String {
        let mut parts = vec![
            self.tool.clone(),
            "-sS".to_string(),
            "-L".to_string(),
            "-X".to_string(),
            shell_quote(&request.method.to_uppercase()),
        ];
        for (name, value) in &request.headers {
            parts.push("-H".to_string());
            parts.push(shell_quote(&format!("{name}: {value}")));
        }
        if let Some(body) = &request.body {
            parts.push("--data-binary".to_string());
            parts.push(shell_quote(body));
        }
        parts.push(shell_quote(url));
        parts.join(" ")
    }

    pub async fn fetch(&self, url: &str, request: HttpRequest) -> HttpResponse {
        let line = self.command_line(url, &request);
        let result: BridgeResult<ExecOutput> =
            with_bridge(&self.bridge, "http.fetch", |b| async move { b.exec(&line).await }).await;

        match (result.success, result.data) {
            (true, Some(out)) => out.into(),
            _ => HttpResponse {
                success: false,
                data: None,
                error: result.error,
            },
        }
    }

    pub async fn get(&self, url: &str) -> HttpResponse {
        self.fetch(url, HttpRequest::default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn command_line_quotes_every_argument() {
        let api = HttpApi::new(BridgeSlot::new(), "curl");
        let mut request = HttpRequest {
            method: "post".into(),
            body: Some(r#"{"name":"it's"}"#.into()),
            ..Default::default()
        };
        request
            .headers
            .insert("Content-Type".into(), "application/json".into());

        let line = api.command_line("https://example.com/api?q=1&x=2", &request);
        assert_eq!(
            line,
            "curl -sS -L -X 'POST' -H 'Content-Type: application/json' \
             --data-binary '{\"name\":\"it'\\''s\"}' 'https://example.com/api?q=1&x=2'"
        );
    }

    #[cfg(target_os = "windows")]
    #[test]
    fn command_line_uses_cmd_quoting() {
        let api = HttpApi::new(BridgeSlot::new(), "curl");
        let request = HttpRequest {
            method: "get".into(),
            ..Default::default()
        };
        let line = api.command_line("https://example.com/?q=100%&x=2", &request);
        assert_eq!(
            line,
            r#"curl -sS -L -X "GET" "https://example.com/?q=100"^%"&x=2""#
        );
    }

    #[test]
    fn exec_output_normalization() {
        let ok: HttpResponse = ExecOutput {
            stdout: "body".into(),
            stderr: String::new(),
            code: 0,
        }
        .into();
        assert!(ok.success);
        assert_eq!(ok.data.as_deref(), Some("body"));

        let failed: HttpResponse = ExecOutput {
            stdout: String::new(),
            stderr: "curl: (6) Could not resolve host\n".into(),
            code: 6,
        }
        .into();
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("curl: (6) Could not resolve host"));

        let silent: HttpResponse = ExecOutput {
            code: 22,
            ..Default::default()
        }
        .into();
        assert_eq!(silent.error.as_deref(), Some("Transfer tool exited with code 22"));
    }

    #[tokio::test]
    async fn fetch_without_bridge_is_unsuccessful() {
        let api = HttpApi::new(BridgeSlot::new(), "curl");
        let response = api.get("https://example.com").await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Host bridge unavailable"));
    }
}
