//! Built-in tools for the four integrated systems.
//!
//! Each system is an opaque HTTP service reached through its configured
//! base URL. The tools here only shape requests and collect responses —
//! the systems' internal behavior is unconstrained.

pub mod analysis;
pub mod library;
pub mod proposal;
pub mod search;

use futures::StreamExt;
use serde_json::Value;

use conflux_core::config::RemoteSystemConfig;
use conflux_core::error::{ConfluxError, Result};

/// Shared HTTP plumbing for one remote system.
#[derive(Clone)]
pub(crate) struct SystemClient {
    base_url: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl SystemClient {
    pub(crate) fn from_config(config: &RemoteSystemConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
        }
    }

    pub(crate) fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    fn client(&self, tool: &str) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .user_agent("Conflux/0.4")
            .build()
            .map_err(|e| ConfluxError::ToolExecution {
                tool: tool.to_string(),
                message: format!("Failed to create HTTP client: {}", e),
            })
    }

    fn request(
        &self,
        client: &reqwest::Client,
        method: reqwest::Method,
        path: &str,
    ) -> reqwest::RequestBuilder {
        let mut req = client.request(method, format!("{}{}", self.base_url, path));
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    pub(crate) async fn get_json(
        &self,
        tool: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Value> {
        let client = self.client(tool)?;
        let resp = self
            .request(&client, reqwest::Method::GET, path)
            .query(query)
            .send()
            .await
            .map_err(|e| request_failed(tool, e))?;
        read_json(tool, resp).await
    }

    pub(crate) async fn post_json(&self, tool: &str, path: &str, body: &Value) -> Result<Value> {
        let client = self.client(tool)?;
        let resp = self
            .request(&client, reqwest::Method::POST, path)
            .json(body)
            .send()
            .await
            .map_err(|e| request_failed(tool, e))?;
        read_json(tool, resp).await
    }

    /// POST to a streaming endpoint and collect its non-empty lines into a
    /// single string, the way the analysis system's event streams are
    /// consumed.
    pub(crate) async fn post_collect_lines(
        &self,
        tool: &str,
        path: &str,
        body: &Value,
    ) -> Result<String> {
        let client = self.client(tool)?;
        let resp = self
            .request(&client, reqwest::Method::POST, path)
            .header("Accept", "text/event-stream")
            .json(body)
            .send()
            .await
            .map_err(|e| request_failed(tool, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(http_error(tool, status, &text));
        }

        let mut collected: Vec<String> = Vec::new();
        let mut pending = String::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| request_failed(tool, e))?;
            pending.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = pending.find('\n') {
                let line: String = pending.drain(..=pos).collect();
                let line = line.trim();
                if !line.is_empty() {
                    collected.push(line.to_string());
                }
            }
        }
        let tail = pending.trim();
        if !tail.is_empty() {
            collected.push(tail.to_string());
        }

        Ok(collected.join("\n"))
    }

    /// POST and read a raw binary response body.
    pub(crate) async fn post_bytes(&self, tool: &str, path: &str, body: &Value) -> Result<Vec<u8>> {
        let client = self.client(tool)?;
        let resp = self
            .request(&client, reqwest::Method::POST, path)
            .json(body)
            .send()
            .await
            .map_err(|e| request_failed(tool, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(http_error(tool, status, &text));
        }

        let bytes = resp.bytes().await.map_err(|e| request_failed(tool, e))?;
        Ok(bytes.to_vec())
    }
}

async fn read_json(tool: &str, resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(http_error(tool, status, &text));
    }
    let value: Value = resp.json().await.map_err(|e| request_failed(tool, e))?;
    // Tool outputs are objects; wrap anything else the remote returns.
    Ok(match value {
        Value::Object(_) => value,
        other => serde_json::json!({ "result": other }),
    })
}

fn request_failed(tool: &str, e: reqwest::Error) -> ConfluxError {
    ConfluxError::ToolExecution {
        tool: tool.to_string(),
        message: format!("Request failed: {}", e),
    }
}

fn http_error(tool: &str, status: reqwest::StatusCode, body: &str) -> ConfluxError {
    let detail: String = body.chars().take(200).collect();
    ConfluxError::ToolExecution {
        tool: tool.to_string(),
        message: format!("HTTP {}: {}", status.as_u16(), detail),
    }
}
