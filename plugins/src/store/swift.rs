//! Swift REST transport and the connector that finds its storage URL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use imgtask_core::api::{
    ChunkStream, Connector, ExponentialBackoff, ObjectClient, StoreError, SwiftConfig,
};
use reqwest::header::{CONTENT_LENGTH, ETAG};
use reqwest::StatusCode;
use tokio::sync::Mutex;

use super::http::{status_error, transport_error};
use super::keystone::{select_endpoint, AdminToken, KeystoneClient};

const AUTH_HEADER: &str = "X-Auth-Token";
const MANIFEST_HEADER: &str = "X-Object-Manifest";

/// One storage URL plus the token used against it.
#[derive(Clone)]
pub struct SwiftClient {
    http: reqwest::Client,
    storage_url: String,
    token: Option<String>,
}

impl SwiftClient {
    pub fn new(http: reqwest::Client, storage_url: &str, token: Option<String>) -> Self {
        Self {
            http,
            storage_url: storage_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn storage_url(&self) -> &str {
        &self.storage_url
    }

    fn url(&self, container: &str, object: Option<&str>) -> String {
        match object {
            Some(o) => format!("{}/{}/{}", self.storage_url, container, o),
            None => format!("{}/{}", self.storage_url, container),
        }
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let req = self.http.request(method, url);
        match &self.token {
            Some(t) => req.header(AUTH_HEADER, t),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder, url: &str) -> Result<reqwest::Response, StoreError> {
        req.send().await.map_err(|e| transport_error(e, url))
    }
}

fn content_length(resp: &reqwest::Response) -> u64 {
    resp.headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl ObjectClient for SwiftClient {
    async fn head_container(&self, container: &str) -> Result<bool, StoreError> {
        let url = self.url(container, None);
        let resp = self.send(self.request(reqwest::Method::HEAD, &url), &url).await?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(status_error(resp).await),
        }
    }

    async fn head_object(&self, container: &str, object: &str) -> Result<Option<u64>, StoreError> {
        let url = self.url(container, Some(object));
        let resp = self.send(self.request(reqwest::Method::HEAD, &url), &url).await?;
        match resp.status() {
            s if s.is_success() => Ok(Some(content_length(&resp))),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(status_error(resp).await),
        }
    }

    async fn get_object(
        &self,
        container: &str,
        object: &str,
        chunk_size: usize,
    ) -> Result<(ChunkStream, u64), StoreError> {
        let url = self.url(container, Some(object));
        tracing::debug!(target: "imgtask.swift", stage = "swift.get.in", url = %url);

        let resp = self.send(self.request(reqwest::Method::GET, &url), &url).await?;
        match resp.status() {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => {
                tracing::warn!(target: "imgtask.swift", stage = "swift.get.not_found", url = %url);
                return Err(StoreError::NotFound(format!(
                    "Swift could not find object {object}."
                )));
            }
            _ => return Err(status_error(resp).await),
        }

        let length = content_length(&resp);
        let body = resp
            .bytes_stream()
            .map_err(move |e| StoreError::Backend(format!("reading {url}: {e}")));
        Ok((ChunkStream::from_stream(body, chunk_size), length))
    }

    async fn put_object(
        &self,
        container: &str,
        object: &str,
        body: ChunkStream,
        content_length: Option<u64>,
        manifest: Option<&str>,
    ) -> Result<String, StoreError> {
        let url = self.url(container, Some(object));
        tracing::debug!(
            target: "imgtask.swift",
            stage = "swift.put.in",
            url = %url,
            content_length = ?content_length,
            manifest = ?manifest
        );

        let mut req = self
            .request(reqwest::Method::PUT, &url)
            .body(reqwest::Body::wrap_stream(body.into_stream()));
        if let Some(len) = content_length {
            req = req.header(CONTENT_LENGTH, len);
        }
        if let Some(m) = manifest {
            req = req.header(MANIFEST_HEADER, m);
        }

        let resp = self.send(req, &url).await?;
        match resp.status() {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(StoreError::NotFound(format!(
                    "container '{container}' does not exist"
                )))
            }
            _ => return Err(status_error(resp).await),
        }

        let etag = resp
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string())
            .unwrap_or_default();
        tracing::debug!(target: "imgtask.swift", stage = "swift.put.out", url = %url, etag = %etag);
        Ok(etag)
    }

    async fn delete_object(&self, container: &str, object: &str) -> Result<(), StoreError> {
        let url = self.url(container, Some(object));
        let resp = self.send(self.request(reqwest::Method::DELETE, &url), &url).await?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(format!(
                "object '{object}' not found in container '{container}'"
            ))),
            _ => Err(status_error(resp).await),
        }
    }
}

/// Opens [`SwiftClient`]s for caller tokens. With `preauth_url` set the URL is
/// used as-is; otherwise the caller's endpoints are looked up in Keystone with
/// a cached admin token.
pub struct SwiftConnector {
    cfg: SwiftConfig,
    http: reqwest::Client,
    keystone: KeystoneClient,
    admin_token: Mutex<Option<AdminToken>>,
}

impl SwiftConnector {
    /// Transfers have no overall deadline: the connect timeout bounds the
    /// handshake and `timeout_ms` bounds each wait for the next body bytes.
    pub fn new(cfg: SwiftConfig) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .read_timeout(Duration::from_millis(cfg.timeout_ms))
            .danger_accept_invalid_certs(cfg.insecure)
            .build()
            .map_err(|e| StoreError::BadConfiguration {
                store: "swift".into(),
                reason: e.to_string(),
            })?;
        Self::with_http(cfg, http, ExponentialBackoff::default())
    }

    pub fn with_http(
        cfg: SwiftConfig,
        http: reqwest::Client,
        retry: ExponentialBackoff,
    ) -> Result<Self, StoreError> {
        if cfg.preauth_url.is_none() && cfg.auth_address.trim().is_empty() {
            return Err(StoreError::BadConfiguration {
                store: "swift".into(),
                reason: "Could not find auth_address in configuration options.".into(),
            });
        }
        let keystone = KeystoneClient::new(
            http.clone(),
            &cfg.auth_address,
            retry.with_max_retries(cfg.auth_retries),
        );
        Ok(Self {
            cfg,
            http,
            keystone,
            admin_token: Mutex::new(None),
        })
    }

    async fn admin_token(&self, refresh: bool) -> Result<String, StoreError> {
        let mut cached = self.admin_token.lock().await;
        if refresh {
            *cached = None;
        }
        if let Some(token) = cached.as_ref() {
            return Ok(token.id.clone());
        }
        let token = self
            .keystone
            .admin_token(
                &self.cfg.admin_user,
                &self.cfg.admin_password,
                &self.cfg.admin_tenant_name,
            )
            .await?;
        let id = token.id.clone();
        *cached = Some(token);
        Ok(id)
    }

    async fn storage_url_for(&self, user_token: &str) -> Result<String, StoreError> {
        let admin = self.admin_token(false).await?;
        let endpoints = match self.keystone.endpoints(&admin, user_token).await {
            Err(StoreError::Auth(_)) => {
                let admin = self.admin_token(true).await?;
                self.keystone.endpoints(&admin, user_token).await?
            }
            other => other?,
        };

        select_endpoint(
            &endpoints,
            &self.cfg.service_type,
            self.cfg.service_name.as_deref(),
            self.cfg.region.as_deref(),
            &self.cfg.endpoint_type,
        )
        .ok_or_else(|| {
            StoreError::BadConfiguration {
                store: "swift".into(),
                reason: format!(
                    "no '{}' endpoint of type '{}' for region {:?}",
                    self.cfg.endpoint_type, self.cfg.service_type, self.cfg.region
                ),
            }
        })
    }
}

#[async_trait]
impl Connector for SwiftConnector {
    fn name(&self) -> &str {
        "swift"
    }

    async fn connect(&self, auth_token: Option<&str>) -> Result<Arc<dyn ObjectClient>, StoreError> {
        let token = auth_token.map(str::to_string);

        if let Some(url) = self.cfg.preauth_url.as_deref() {
            return Ok(Arc::new(SwiftClient::new(self.http.clone(), url, token)));
        }

        let user_token = token
            .as_deref()
            .ok_or_else(|| StoreError::Auth("an auth token is required for swift".into()))?;
        let url = self.storage_url_for(user_token).await?;
        tracing::debug!(target: "imgtask.swift", stage = "swift.connect", storage_url = %url);
        Ok(Arc::new(SwiftClient::new(self.http.clone(), &url, token)))
    }
}
