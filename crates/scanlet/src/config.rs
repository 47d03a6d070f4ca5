//! Bridge configuration.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::ContextSpawner;

const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Engine options passed as the last `initialize` argument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitOptions {
    /// Forward the engine's console output as context log messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_console: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_threads: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_simd: Option<bool>,
    /// Default JPEG quality (0-100) for commands that encode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jpeg_quality: Option<u8>,
    /// Appended to every asset URL the engine fetches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_suffix: Option<String>,
}

/// Everything needed to bring up a bridge with [`crate::Bridge::connect`].
pub struct BridgeConfig {
    pub license_key: Option<String>,
    /// Location of the engine binary inside the compute context.
    pub engine_path: Option<String>,
    pub app_id: Option<String>,
    pub cdn_path: Option<String>,
    pub init: InitOptions,
    /// Upper bound on spawn plus `initialize`.
    pub init_timeout: Duration,
    pub spawner: Arc<dyn ContextSpawner>,
}

impl BridgeConfig {
    pub fn new(spawner: Arc<dyn ContextSpawner>) -> Self {
        Self {
            license_key: None,
            engine_path: None,
            app_id: None,
            cdn_path: None,
            init: InitOptions::default(),
            init_timeout: DEFAULT_INIT_TIMEOUT,
            spawner,
        }
    }

    /// Read settings from the process environment:
    /// `SCANLET_LICENSE_KEY`, `SCANLET_ENGINE_PATH`, `SCANLET_APP_ID`,
    /// `SCANLET_CDN_PATH` and `SCANLET_INIT_TIMEOUT_SECS`.
    pub fn from_env(spawner: Arc<dyn ContextSpawner>) -> Self {
        Self::from_lookup(spawner, |key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        spawner: Arc<dyn ContextSpawner>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut config = Self::new(spawner);
        config.license_key = lookup("SCANLET_LICENSE_KEY");
        config.engine_path = lookup("SCANLET_ENGINE_PATH");
        config.app_id = lookup("SCANLET_APP_ID");
        config.cdn_path = lookup("SCANLET_CDN_PATH");
        if let Some(raw) = lookup("SCANLET_INIT_TIMEOUT_SECS") {
            match raw.parse::<f64>() {
                Ok(secs) if secs.is_finite() && secs > 0.0 => {
                    config.init_timeout = Duration::from_secs_f64(secs);
                }
                _ => tracing::warn!(
                    value = %raw,
                    "Ignoring invalid SCANLET_INIT_TIMEOUT_SECS"
                ),
            }
        }
        config
    }

    pub fn with_license_key(mut self, key: impl Into<String>) -> Self {
        self.license_key = Some(key.into());
        self
    }

    pub fn with_engine_path(mut self, path: impl Into<String>) -> Self {
        self.engine_path = Some(path.into());
        self
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn with_cdn_path(mut self, path: impl Into<String>) -> Self {
        self.cdn_path = Some(path.into());
        self
    }

    pub fn with_init_options(mut self, init: InitOptions) -> Self {
        self.init = init;
        self
    }

    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn ContextSpawner>) -> Self {
        self.spawner = spawner;
        self
    }
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("license_key", &self.license_key.as_ref().map(|_| "<redacted>"))
            .field("engine_path", &self.engine_path)
            .field("app_id", &self.app_id)
            .field("cdn_path", &self.cdn_path)
            .field("init", &self.init)
            .field("init_timeout", &self.init_timeout)
            .finish_non_exhaustive()
    }
}
