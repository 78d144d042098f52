//! Host platform detection and the identifiers manifests use for it.

/// Identifier of the operating system the installer is running on.
///
/// Manifests name platforms with the Go-style identifiers feed authors
/// already use (`linux`, `darwin`, `windows`). Matching is exact and
/// case-sensitive.
///
/// # Example
///
/// ```
/// use zg_schema::HostPlatform;
///
/// let host = HostPlatform::current();
/// println!("Installing for: {host}");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostPlatform(String);

impl HostPlatform {
    /// Platform of the running process.
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Map a Rust `target_os` value to the manifest identifier.
    pub fn from_os(os: &str) -> Self {
        let name = match os {
            "macos" => "darwin",
            other => other,
        };
        Self(name.to_string())
    }

    /// Use an explicit identifier as-is.
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HostPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HostPlatform {
    fn from(s: &str) -> Self {
        Self::named(s)
    }
}
