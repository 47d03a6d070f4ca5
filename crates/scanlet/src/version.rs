//! Version information for scanlet.

/// Scanlet version from Cargo.toml
pub const SCANLET_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Versions of the bridge and the engine behind it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct VersionInfo {
    pub scanlet: &'static str,
    /// As reported by the engine's `version` command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            scanlet: SCANLET_VERSION,
            engine: None,
        }
    }
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(mut self, version: String) -> Self {
        self.engine = Some(version);
        self
    }
}
