//! HTTP 请求工具
//!
//! 支持任意方法、自定义 Header、JSON 或原始请求体，带超时；状态码 ≥ 400 视为失败但保留响应内容。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::tools::registry::{args_schema, parse_args};
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct HttpArgs {
    /// The URL to make the request to.
    url: String,
    /// Optional. HTTP method (GET, POST, PUT, DELETE, ...), defaults to GET.
    method: Option<String>,
    /// Optional. HTTP headers to send.
    headers: Option<HashMap<String, String>>,
    /// Optional. JSON body; Content-Type: application/json is added when absent.
    json_body: Option<Value>,
    /// Optional. Raw string body for non-JSON payloads.
    data_body: Option<String>,
    /// Optional. Seconds to wait for a response.
    timeout_seconds: Option<u64>,
}

pub struct HttpRequestTool {
    client: Client,
    default_timeout_secs: u64,
}

impl HttpRequestTool {
    pub fn new(default_timeout_secs: u64) -> Self {
        Self {
            client: Client::new(),
            default_timeout_secs,
        }
    }
}

#[async_trait]
impl Tool for HttpRequestTool {
    fn name(&self) -> &str {
        "http_request"
    }

    fn description(&self) -> &str {
        "Perform an HTTP request to a specified URL. Supports GET, POST, PUT, DELETE methods and custom headers/body."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<HttpArgs>()
    }

    async fn execute(
        &self,
        args: Map<String, Value>,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let args: HttpArgs = parse_args(args)?;
        let method_name = args.method.as_deref().unwrap_or("GET").to_uppercase();
        let method = Method::from_bytes(method_name.as_bytes())
            .map_err(|e| ToolError::InvalidParameters(format!("method: {}", e)))?;
        let timeout =
            Duration::from_secs(args.timeout_seconds.unwrap_or(self.default_timeout_secs));

        tracing::info!(
            trace_id = ctx.trace_id.as_deref().unwrap_or("-"),
            method = %method,
            url = %args.url,
            "http_request"
        );

        let mut req = self.client.request(method, &args.url).timeout(timeout);
        let headers = args.headers.unwrap_or_default();
        let has_content_type = headers.keys().any(|k| k.eq_ignore_ascii_case("content-type"));
        for (k, v) in &headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Some(body) = &args.json_body {
            if !has_content_type {
                req = req.header("Content-Type", "application/json");
            }
            req = req.body(body.to_string());
        } else if let Some(body) = args.data_body {
            req = req.body(body);
        }

        let response = match req.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Ok(ToolResult::failure_with(
                    "Timeout occurred",
                    json!({ "status_code": null }),
                ))
            }
            Err(e) if e.is_connect() => {
                return Ok(ToolResult::failure_with(
                    format!("Connection error: {}", e),
                    json!({ "status_code": null }),
                ))
            }
            Err(e) => {
                return Ok(ToolResult::failure_with(
                    format!("Request failed: {}", e),
                    json!({ "status_code": e.status().map(|s| s.as_u16()) }),
                ))
            }
        };

        let status = response.status();
        let response_headers: Map<String, Value> = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    Value::String(String::from_utf8_lossy(v.as_bytes()).to_string()),
                )
            })
            .collect();
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false);
        let text = response.text().await?;
        let response_json = if is_json {
            serde_json::from_str::<Value>(&text).unwrap_or(Value::Null)
        } else {
            Value::Null
        };

        let fields = json!({
            "status_code": status.as_u16(),
            "headers": response_headers,
            "response_json": response_json,
            "response_text": text,
        });
        if status.as_u16() >= 400 {
            return Ok(ToolResult::failure_with(
                format!(
                    "HTTP Error: {} - {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                ),
                fields,
            ));
        }
        Ok(ToolResult::ok(fields))
    }
}
