//! Direct-action configuration
//!
//! The configuration mirrors the wire payload the application supplies at
//! configure time (camelCase keys). It is persisted as a JSON blob so a
//! cold-started native layer can still perform the direct action with the
//! configuration from a previous application run.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ActionError, ActionResult};

/// Configuration for the background direct action request.
///
/// `url_template`, the header values and `body_template` may contain `{key}`
/// placeholders resolved against the call's metadata plus the synthesized
/// request token (see [`crate::executor::DirectActionExecutor`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BackgroundActionConfig {
    /// Request URL template
    pub url_template: String,
    /// HTTP method (defaults to POST)
    pub method: String,
    /// Credential key for the bearer token; no Authorization header when unset
    pub auth_key: Option<String>,
    /// Credential namespace the bearer and refresh tokens live in
    pub auth_key_namespace: String,
    /// Header name to header value template
    pub headers: HashMap<String, String>,
    /// Request body template; no body when unset
    pub body_template: Option<String>,
    /// Authentication refresh configuration; a 401 is terminal when unset
    pub refresh: Option<RefreshConfig>,
}

impl Default for BackgroundActionConfig {
    fn default() -> Self {
        Self {
            url_template: String::new(),
            method: "POST".to_string(),
            auth_key: None,
            auth_key_namespace: "callbridge".to_string(),
            headers: HashMap::new(),
            body_template: None,
            refresh: None,
        }
    }
}

impl BackgroundActionConfig {
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            ..Default::default()
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_auth_key(mut self, namespace: impl Into<String>, key: impl Into<String>) -> Self {
        self.auth_key_namespace = namespace.into();
        self.auth_key = Some(key.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value_template: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value_template.into());
        self
    }

    pub fn with_body_template(mut self, body: impl Into<String>) -> Self {
        self.body_template = Some(body.into());
        self
    }

    pub fn with_refresh(mut self, refresh: RefreshConfig) -> Self {
        self.refresh = Some(refresh);
        self
    }
}

/// Configuration for the one-shot authentication refresh on a 401.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RefreshConfig {
    /// Refresh endpoint URL
    pub url: String,
    /// HTTP method (defaults to POST)
    pub method: String,
    /// Credential key the refresh token is read from
    pub refresh_token_key: String,
    /// Refresh request body template; the context additionally exposes
    /// `{refreshToken}`
    pub body_template: Option<String>,
    /// Dot-path into the JSON response locating the new access token
    pub access_token_path: String,
    /// Dot-path locating a rotated refresh token; the stored refresh token
    /// is kept as-is when unset
    pub refresh_token_path: Option<String>,
    /// Header name to header value template
    pub headers: HashMap<String, String>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: "POST".to_string(),
            refresh_token_key: "refreshToken".to_string(),
            body_template: None,
            access_token_path: "accessToken".to_string(),
            refresh_token_path: None,
            headers: HashMap::new(),
        }
    }
}

const CONFIG_FILE: &str = "direct_action.json";

/// Durable store for the [`BackgroundActionConfig`] blob.
///
/// Saved on every configure so the config survives process death; loaded on
/// demand when a decline fires before any application instance configured.
#[derive(Debug, Clone)]
pub struct ActionConfigStore {
    dir: PathBuf,
}

impl ActionConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> ActionResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| ActionError::config_store(format!("create {}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    fn path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    /// Persist the config, fsynced before returning.
    pub fn save(&self, config: &BackgroundActionConfig) -> ActionResult<()> {
        let path = self.path();
        let data = serde_json::to_vec_pretty(config)?;
        let mut file = File::create(&path)
            .map_err(|e| ActionError::config_store(format!("create {}: {}", path.display(), e)))?;
        file.write_all(&data)
            .and_then(|_| file.sync_all())
            .map_err(|e| ActionError::config_store(format!("write {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "direct action config persisted");
        Ok(())
    }

    /// Load the persisted config, `None` if never saved.
    pub fn load(&self) -> ActionResult<Option<BackgroundActionConfig>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let mut raw = String::new();
        File::open(&path)
            .and_then(|mut f| f.read_to_string(&mut raw))
            .map_err(|e| ActionError::config_store(format!("read {}: {}", path.display(), e)))?;
        let config = serde_json::from_str(&raw)?;
        Ok(Some(config))
    }

    /// Drop the persisted config if present.
    pub fn clear(&self) -> ActionResult<()> {
        let path = self.path();
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| ActionError::config_store(format!("remove {}: {}", path.display(), e)))?;
        }
        Ok(())
    }
}
