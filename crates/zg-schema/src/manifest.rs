//! The `install.json` manifest shipped inside every feed archive.

use crate::error::SchemaError;
use crate::platform::HostPlatform;
use serde::{Deserialize, Serialize};

/// File name the manifest is looked up by, anywhere in the archive.
pub const MANIFEST_FILE_NAME: &str = "install.json";

/// Describes how to install an archive on several platforms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallManifest {
    /// One entry per supported platform.
    pub platforms: Vec<Platform>,
}

/// Platform-specific commands. Each command is an argv vector run from the
/// extraction root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// Platform identifier, matched exactly against [`HostPlatform`].
    pub name: String,

    /// Installs the archive.
    #[serde(rename = "install")]
    pub install_command: Vec<String>,

    /// Uninstalls the archive.
    #[serde(rename = "uninstall", default)]
    pub uninstall_command: Vec<String>,

    /// Runs the software provided in the archive.
    #[serde(rename = "run", default)]
    pub run_command: Vec<String>,
}

impl InstallManifest {
    /// Parse a manifest from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Parse`] if the bytes are not a manifest.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SchemaError> {
        serde_json::from_slice(bytes).map_err(|source| SchemaError::Parse {
            document: "install manifest",
            source,
        })
    }

    /// Serialize to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Serialize`] if encoding fails.
    pub fn to_json(&self) -> Result<String, SchemaError> {
        serde_json::to_string_pretty(self).map_err(|source| SchemaError::Serialize {
            document: "install manifest",
            source,
        })
    }

    /// The entry whose name equals `host` exactly.
    pub fn platform_for(&self, host: &HostPlatform) -> Option<&Platform> {
        self.platforms.iter().find(|p| p.name == host.as_str())
    }

    /// Names of all platforms the manifest declares.
    pub fn platform_names(&self) -> Vec<&str> {
        self.platforms.iter().map(|p| p.name.as_str()).collect()
    }
}
