use std::time::Duration;

use fleetnode_util::http::Uri;

/// Port used when the endpoint does not name one
pub const DEFAULT_PORT: u16 = 7442;

/// Remote API configuration
#[derive(Clone, Debug)]
pub struct RegistrationConfig {
    pub endpoint: Uri,
    /// Sent as the `User-Agent` of every check-in
    pub user_agent: String,
    /// Hard deadline for reading the response, counted from the first read
    pub response_timeout: Duration,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            endpoint: Uri::from_static("http://thinx.cloud:7442"),
            user_agent: "FleetNode-Client".to_string(),
            response_timeout: Duration::from_millis(10_000),
        }
    }
}

/// Description of the running build
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildInfo {
    pub firmware: String,
    pub version: String,
    /// Identifier of the running build, compared against the commit
    /// announced with a firmware update
    pub commit: String,
    pub platform: String,
}
