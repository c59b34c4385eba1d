//! Keystone v2 token negotiation used to find a caller's object-store URL.

use imgtask_core::api::{retry_async, ExponentialBackoff, StoreError};
use serde_json::{json, Value};

use super::http::{parse_json_response, Failure};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminToken {
    pub id: String,
    pub expires: Option<String>,
}

#[derive(Clone)]
pub struct KeystoneClient {
    http: reqwest::Client,
    auth_address: String,
    retry: ExponentialBackoff,
}

impl KeystoneClient {
    pub fn new(http: reqwest::Client, auth_address: &str, retry: ExponentialBackoff) -> Self {
        Self {
            http,
            auth_address: auth_address.trim_end_matches('/').to_string(),
            retry,
        }
    }

    /// `POST /v2.0/tokens` with password credentials.
    pub async fn admin_token(
        &self,
        user: &str,
        password: &str,
        tenant: &str,
    ) -> Result<AdminToken, StoreError> {
        let url = format!("{}/v2.0/tokens", self.auth_address);
        let body = json!({
            "auth": {
                "tenantName": tenant,
                "passwordCredentials": {"username": user, "password": password}
            }
        });
        tracing::debug!(
            target: "imgtask.keystone",
            stage = "keystone.token.in",
            url = %url,
            user = %user,
            tenant = %tenant
        );

        let v = self.send_json(&url, || self.http.post(&url).json(&body)).await?;
        let token = &v["access"]["token"];
        let id = token["id"]
            .as_str()
            .ok_or_else(|| StoreError::Auth("token response has no access.token.id".into()))?;

        tracing::debug!(target: "imgtask.keystone", stage = "keystone.token.out");
        Ok(AdminToken {
            id: id.to_string(),
            expires: token["expires"].as_str().map(str::to_string),
        })
    }

    /// `GET /v2.0/tokens/{user_token}/endpoints`, authorised by the admin token.
    pub async fn endpoints(&self, admin_token: &str, user_token: &str) -> Result<Vec<Value>, StoreError> {
        let url = format!("{}/v2.0/tokens/{}/endpoints", self.auth_address, user_token);
        tracing::debug!(target: "imgtask.keystone", stage = "keystone.endpoints.in", url = %url);

        let v = self
            .send_json(&url, || {
                self.http.get(&url).header("X-Auth-Token", admin_token)
            })
            .await?;
        let endpoints = v["endpoints"].as_array().cloned().unwrap_or_default();

        tracing::debug!(
            target: "imgtask.keystone",
            stage = "keystone.endpoints.out",
            count = endpoints.len()
        );
        Ok(endpoints)
    }

    async fn send_json(
        &self,
        url: &str,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<Value, StoreError> {
        retry_async(&self.retry, Failure::is_transient, || {
            let req = build();
            async move {
                let resp = req.send().await.map_err(|e| Failure::from_reqwest(e, url))?;
                if !resp.status().is_success() {
                    return Err(Failure::from_response(resp).await);
                }
                parse_json_response(resp).await.map_err(Failure::Fatal)
            }
        })
        .await
        .map_err(Failure::into_inner)
    }
}

/// Picks the URL of the matching endpoint: same `type`, same `name` when one
/// is configured, same `region` when one is configured.
pub fn select_endpoint(
    endpoints: &[Value],
    service_type: &str,
    service_name: Option<&str>,
    region: Option<&str>,
    endpoint_type: &str,
) -> Option<String> {
    endpoints
        .iter()
        .filter(|ep| ep["type"].as_str() == Some(service_type))
        .filter(|ep| service_name.is_none_or(|name| ep["name"].as_str() == Some(name)))
        .filter(|ep| region.is_none_or(|r| ep["region"].as_str() == Some(r)))
        .find_map(|ep| ep[endpoint_type].as_str().map(str::to_string))
}
