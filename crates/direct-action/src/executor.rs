//! Templated request execution with one-shot auth refresh
//!
//! The executor performs the remote side effect for a user decline when no
//! application listener can be assumed reachable. It resolves the configured
//! templates against the call's metadata, attaches a stored bearer credential
//! and, on a 401 with refresh configured, runs exactly one
//! refresh-and-retry cycle.

use std::collections::HashMap;
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{BackgroundActionConfig, RefreshConfig};
use crate::error::{ActionError, ActionResult};
use crate::secrets::SecretStore;
use crate::template;

/// Per-request timeout for the action and refresh requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Context key carrying the synthesized random token
const TOKEN_FIELD: &str = "requestToken";

/// Context key carrying the refresh credential during the refresh request
const REFRESH_TOKEN_FIELD: &str = "refreshToken";

/// Length of the synthesized random token
const TOKEN_LEN: usize = 32;

/// Executes the configured direct-action request.
///
/// Fire-and-forget relative to the triggering callback: callers run
/// [`execute`](DirectActionExecutor::execute) on a background task and treat
/// any error as log-only, since the durable pending slot remains the
/// recovery path either way.
#[derive(Debug, Clone)]
pub struct DirectActionExecutor {
    http: reqwest::Client,
    secrets: SecretStore,
}

impl DirectActionExecutor {
    /// Create an executor backed by `secrets` for credential lookups.
    pub fn new(secrets: SecretStore) -> ActionResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, secrets })
    }

    /// Perform the direct action for one call.
    ///
    /// `metadata` is the flat string view of the call's metadata; the
    /// resolution context additionally carries a fresh random
    /// `requestToken`, regenerated for the post-refresh retry.
    pub async fn execute(
        &self,
        config: &BackgroundActionConfig,
        metadata: &HashMap<String, String>,
    ) -> ActionResult<()> {
        let mut ctx = metadata.clone();
        ctx.insert(TOKEN_FIELD.to_string(), random_token());

        let response = self.send_action(config, &ctx).await?;
        let status = response.status();
        if status.is_success() {
            info!(status = %status, "direct action delivered");
            return Ok(());
        }

        if status == StatusCode::UNAUTHORIZED {
            if let Some(refresh) = &config.refresh {
                info!("direct action unauthorized, attempting credential refresh");
                self.refresh_credentials(config, refresh, metadata).await?;

                // Retry exactly once with the refreshed credential and a
                // regenerated request token.
                ctx.insert(TOKEN_FIELD.to_string(), random_token());
                let retry = self.send_action(config, &ctx).await?;
                let retry_status = retry.status();
                if retry_status.is_success() {
                    info!(status = %retry_status, "direct action delivered after refresh");
                    return Ok(());
                }
                return Err(ActionError::RequestFailed { status: retry_status.as_u16() });
            }
        }

        Err(ActionError::RequestFailed { status: status.as_u16() })
    }

    async fn send_action(
        &self,
        config: &BackgroundActionConfig,
        ctx: &HashMap<String, String>,
    ) -> ActionResult<Response> {
        let url = template::resolve(&config.url_template, ctx);
        let mut request = self.http.request(parse_method(&config.method), &url);

        for (name, value_template) in &config.headers {
            request = request.header(name, template::resolve(value_template, ctx));
        }

        if let Some(key) = &config.auth_key {
            match self.secrets.get(&config.auth_key_namespace, key) {
                Ok(Some(token)) => request = request.bearer_auth(token),
                Ok(None) => warn!(
                    namespace = %config.auth_key_namespace,
                    key = %key,
                    "bearer credential missing, sending without authorization"
                ),
                Err(e) => warn!(error = %e, "credential lookup failed, sending without authorization"),
            }
        }

        if let Some(body_template) = &config.body_template {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(template::resolve(body_template, ctx));
        }

        debug!(url = %url, method = %config.method, "sending direct action request");
        let response = request.send().await?;
        Ok(response)
    }

    /// Run the refresh request and persist the new credentials.
    ///
    /// Any failure here is terminal for the whole direct action: the caller
    /// performs zero further retries.
    async fn refresh_credentials(
        &self,
        config: &BackgroundActionConfig,
        refresh: &RefreshConfig,
        metadata: &HashMap<String, String>,
    ) -> ActionResult<()> {
        let auth_key = config
            .auth_key
            .as_ref()
            .ok_or_else(|| ActionError::refresh_failed("no authKey configured to store the refreshed credential"))?;

        let refresh_token = self
            .secrets
            .get(&config.auth_key_namespace, &refresh.refresh_token_key)
            .map_err(|e| ActionError::refresh_failed(format!("refresh credential lookup: {}", e)))?
            .ok_or_else(|| ActionError::MissingCredential {
                namespace: config.auth_key_namespace.clone(),
                key: refresh.refresh_token_key.clone(),
            })?;

        let mut ctx = metadata.clone();
        ctx.insert(REFRESH_TOKEN_FIELD.to_string(), refresh_token);

        let mut request = self.http.request(parse_method(&refresh.method), &refresh.url);
        for (name, value_template) in &refresh.headers {
            request = request.header(name, template::resolve(value_template, &ctx));
        }
        if let Some(body_template) = &refresh.body_template {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(template::resolve(body_template, &ctx));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ActionError::refresh_failed(format!("refresh endpoint returned {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ActionError::refresh_failed(format!("refresh response not JSON: {}", e)))?;

        let access_token = dot_path(&body, &refresh.access_token_path)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ActionError::refresh_failed(format!(
                    "access token not found at path '{}'",
                    refresh.access_token_path
                ))
            })?;
        self.secrets
            .put(&config.auth_key_namespace, auth_key, access_token)
            .map_err(|e| ActionError::refresh_failed(format!("persisting refreshed credential: {}", e)))?;

        if let Some(path) = &refresh.refresh_token_path {
            match dot_path(&body, path).and_then(Value::as_str) {
                Some(rotated) => {
                    self.secrets
                        .put(&config.auth_key_namespace, &refresh.refresh_token_key, rotated)
                        .map_err(|e| {
                            ActionError::refresh_failed(format!("persisting rotated refresh credential: {}", e))
                        })?;
                }
                None => warn!(
                    path = %path,
                    "rotated refresh token not found in refresh response, keeping previous one"
                ),
            }
        }

        info!("credentials refreshed");
        Ok(())
    }
}

fn parse_method(method: &str) -> Method {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes()).unwrap_or(Method::POST)
}

fn random_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Walk a JSON value by a dot-separated path, e.g. `data.auth.accessToken`.
fn dot_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}
