use std::io;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fleetnode_util::types::ApiKey;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to run `{0}`: {1}")]
    Spawn(String, #[source] io::Error),

    #[error("`{0}` exited with {1}: {2}")]
    Command(String, String, String),

    #[error("provisioning endpoint failed: {0}")]
    Portal(#[source] io::Error),
}

/// Credentials of the local configuration access point
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessPoint {
    pub ssid: String,
    pub password: String,
}

impl Default for AccessPoint {
    fn default() -> Self {
        Self {
            ssid: "AP-FLEETNODE".to_string(),
            password: "PASSWORD".to_string(),
        }
    }
}

/// Credentials of the network the node should join
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

impl std::fmt::Debug for WifiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WifiCredentials")
            .field("ssid", &self.ssid)
            .finish_non_exhaustive()
    }
}

/// What an operator submitted through the configuration access point
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PortalSubmission {
    #[serde(flatten)]
    pub network: WifiCredentials,

    #[serde(default, rename = "apikey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<ApiKey>,
}

/// Network hardware as seen by the connectivity manager
#[async_trait]
pub trait NetworkAdapter: Send {
    /// Try to associate using the stored network credentials, waiting at
    /// most `timeout`
    async fn associate(&mut self, timeout: Duration) -> bool;

    /// Whether the link is currently associated
    async fn is_associated(&mut self) -> bool;

    /// Open the configuration access point and wait up to `timeout` for an
    /// operator to submit credentials. The access point is closed before
    /// returning.
    async fn serve_portal(
        &mut self,
        access_point: &AccessPoint,
        timeout: Duration,
    ) -> Result<Option<PortalSubmission>, LinkError>;

    /// Store new network credentials so later associations use them
    async fn save_credentials(&mut self, credentials: &WifiCredentials) -> Result<(), LinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn test_submission_decodes_form_fields() {
        let submission: PortalSubmission = serde_json::from_str(
            r#"{"ssid":"home","password":"secret","apikey":"abcdefghij"}"#,
        )
        .unwrap();

        assert_eq!(submission.network.ssid, "home");
        assert_eq!(submission.network.password, "secret");
        assert_eq!(submission.api_key, Some(ApiKey::from("abcdefghij")));
    }

    #[test]
    fn test_submission_api_key_is_optional() {
        let submission: PortalSubmission =
            serde_json::from_str(r#"{"ssid":"home","password":"secret"}"#).unwrap();
        assert_eq!(submission.api_key, None);
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = WifiCredentials {
            ssid: "home".to_string(),
            password: "secret".to_string(),
        };
        assert!(!format!("{creds:?}").contains("secret"));
    }
}
