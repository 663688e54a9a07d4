//! Environment-driven provider selection.
//!
//! | Variable | Meaning |
//! |---|---|
//! | `LAND_IMPACT_PROVIDER` | `remote` or `local`; defaults to `remote` when a URL is set |
//! | `LAND_IMPACT_PROVIDER_URL` | Base URL of the hosted compute service |
//! | `LAND_IMPACT_PROVIDER_TOKEN` | Bearer token |
//! | `LAND_IMPACT_PROVIDER_PROJECT` | Project the session is bound to |
//! | `LAND_IMPACT_PROVIDER_TIMEOUT_SECS` | Per-request timeout (default 120) |
//! | `LAND_IMPACT_LOCAL_SCENES` | Scenes JSON for the local provider |

use std::path::PathBuf;
use std::sync::Arc;

use crate::local::LocalProvider;
use crate::remote::RemoteProvider;
use crate::{ComputeProvider, ProviderError};

/// Default per-request timeout for the remote provider.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Settings for [`RemoteProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Service base URL.
    pub base_url: String,
    /// Bearer token.
    pub token: Option<String>,
    /// Project binding.
    pub project: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

/// Which provider to construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderConfig {
    /// Hosted compute service.
    Remote(RemoteConfig),
    /// In-memory scenes, optionally loaded from a file.
    Local {
        /// Scenes JSON path.
        scenes_path: Option<PathBuf>,
    },
}

impl ProviderConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Config`] if the variables are inconsistent.
    pub fn from_env() -> Result<Self, ProviderError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through a variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Config`] if the variables are inconsistent.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ProviderError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let url = var("LAND_IMPACT_PROVIDER_URL");

        let kind = var("LAND_IMPACT_PROVIDER").unwrap_or_else(|| {
            if url.is_some() { "remote" } else { "local" }.to_string()
        });

        match kind.to_lowercase().as_str() {
            "remote" => {
                let base_url = url.ok_or_else(|| ProviderError::Config {
                    message: "LAND_IMPACT_PROVIDER_URL environment variable not set".to_string(),
                })?;
                let timeout_secs = match var("LAND_IMPACT_PROVIDER_TIMEOUT_SECS") {
                    Some(raw) => raw.parse().map_err(|_| ProviderError::Config {
                        message: format!("Invalid LAND_IMPACT_PROVIDER_TIMEOUT_SECS: {raw}"),
                    })?,
                    None => DEFAULT_TIMEOUT_SECS,
                };
                Ok(Self::Remote(RemoteConfig {
                    base_url,
                    token: var("LAND_IMPACT_PROVIDER_TOKEN"),
                    project: var("LAND_IMPACT_PROVIDER_PROJECT"),
                    timeout_secs,
                }))
            }
            "local" => Ok(Self::Local {
                scenes_path: var("LAND_IMPACT_LOCAL_SCENES").map(PathBuf::from),
            }),
            other => Err(ProviderError::Config {
                message: format!("Unknown provider: {other}. Use 'remote' or 'local'."),
            }),
        }
    }

    /// Builds the shared provider handle.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the client cannot be built or the scenes
    /// file cannot be loaded.
    pub fn connect(self) -> Result<Arc<dyn ComputeProvider>, ProviderError> {
        match self {
            Self::Remote(config) => {
                log::info!("Using remote compute provider at {}", config.base_url);
                Ok(Arc::new(RemoteProvider::new(config)?))
            }
            Self::Local { scenes_path } => {
                let provider = match scenes_path {
                    Some(path) => LocalProvider::from_json_file(&path)?,
                    None => {
                        log::warn!(
                            "No LAND_IMPACT_LOCAL_SCENES set; local provider has no imagery"
                        );
                        LocalProvider::new()
                    }
                };
                Ok(Arc::new(provider))
            }
        }
    }
}
