//! reqwest plumbing shared by the Swift and Keystone clients.

use imgtask_core::api::StoreError;
use reqwest::StatusCode;
use serde_json::Value;

const BODY_PREVIEW_LIMIT: usize = 512;

pub(crate) fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    let mut out: String = trimmed.chars().take(BODY_PREVIEW_LIMIT).collect();
    if trimmed.chars().nth(BODY_PREVIEW_LIMIT).is_some() {
        out.push_str("...");
    }
    out
}

pub(crate) fn transport_error(err: reqwest::Error, url: &str) -> StoreError {
    let kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else if err.is_body() {
        "body"
    } else if err.is_decode() {
        "decode"
    } else {
        "request"
    };
    StoreError::Backend(format!("http {kind} error url={url}: {err}"))
}

/// A failed request, tagged with whether another attempt could help.
#[derive(Debug)]
pub(crate) enum Failure {
    /// Transport failure or a 5xx answer.
    Transient(StoreError),
    Fatal(StoreError),
}

impl Failure {
    pub(crate) fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub(crate) fn into_inner(self) -> StoreError {
        match self {
            Self::Transient(e) | Self::Fatal(e) => e,
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error, url: &str) -> Self {
        let transient = err.is_timeout() || err.is_connect();
        let err = transport_error(err, url);
        if transient {
            Self::Transient(err)
        } else {
            Self::Fatal(err)
        }
    }

    pub(crate) async fn from_response(resp: reqwest::Response) -> Self {
        let transient = resp.status().is_server_error();
        let err = status_error(resp).await;
        if transient {
            Self::Transient(err)
        } else {
            Self::Fatal(err)
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient(e) => write!(f, "transient: {e}"),
            Self::Fatal(e) => write!(f, "{e}"),
        }
    }
}

pub(crate) async fn status_error(resp: reqwest::Response) -> StoreError {
    let status = resp.status();
    let url = resp.url().to_string();
    let body = resp.text().await.unwrap_or_default();
    let preview = preview_body(&body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StoreError::Auth(format!("status={} url={url}: {preview}", status.as_u16()))
        }
        StatusCode::NOT_FOUND => StoreError::NotFound(format!("{url} not found")),
        StatusCode::CONFLICT => StoreError::Duplicate(format!("{url} already exists")),
        _ => StoreError::Backend(format!(
            "http status error status={} url={url}: {preview}",
            status.as_u16()
        )),
    }
}

pub(crate) async fn parse_json_response(resp: reqwest::Response) -> Result<Value, StoreError> {
    if !resp.status().is_success() {
        return Err(status_error(resp).await);
    }
    let url = resp.url().to_string();
    let body = resp.text().await.map_err(|e| transport_error(e, &url))?;
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|e| {
        StoreError::Backend(format!(
            "failed to decode response body url={url}: {e} | body={}",
            preview_body(&body)
        ))
    })
}
