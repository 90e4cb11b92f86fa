/// Package information baked in from Cargo.toml at compile time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub repository: &'static str,
}

impl VersionInfo {
    pub const fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            repository: env!("CARGO_PKG_REPOSITORY"),
        }
    }

    /// One-line description logged at startup, e.g. `homeautomation-mqtt v0.1.0`
    pub fn banner(&self) -> String {
        format!("{} v{}", self.name, self.version)
    }
}
