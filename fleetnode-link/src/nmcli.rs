use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::process::Command;
use tracing::{debug, instrument, trace, warn};

use crate::adapter::{AccessPoint, LinkError, NetworkAdapter, PortalSubmission, WifiCredentials};
use crate::portal::serve_portal;

const HOTSPOT_CONNECTION: &str = "fleetnode-hotspot";

// Extra time given to nmcli on top of its own wait
const COMMAND_GRACE: Duration = Duration::from_secs(5);

/// Network adapter driven through the NetworkManager CLI
pub struct NmcliAdapter {
    interface: String,
    portal_address: SocketAddr,
}

impl NmcliAdapter {
    /// Manage `interface`, serving the provisioning endpoint on
    /// `portal_address` while the access point is up
    pub fn new(interface: impl Into<String>, portal_address: SocketAddr) -> Self {
        Self {
            interface: interface.into(),
            portal_address,
        }
    }
}

/// Run nmcli, returning its standard output
///
/// `what` names the operation in errors so arguments (which may include
/// passwords) never end up in logs.
async fn nmcli(what: &str, args: &[&str]) -> Result<String, LinkError> {
    trace!("running nmcli {what}");
    let output = Command::new("nmcli")
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|err| LinkError::Spawn(format!("nmcli {what}"), err))?;

    if !output.status.success() {
        return Err(LinkError::Command(
            format!("nmcli {what}"),
            output.status.to_string(),
            String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[async_trait]
impl NetworkAdapter for NmcliAdapter {
    #[instrument(skip_all, fields(interface = %self.interface))]
    async fn associate(&mut self, timeout: Duration) -> bool {
        let wait = timeout.as_secs().max(1).to_string();
        let res = tokio::time::timeout(
            timeout + COMMAND_GRACE,
            nmcli(
                "device connect",
                &["--wait", &wait, "device", "connect", &self.interface],
            ),
        )
        .await;

        match res {
            Ok(Ok(_)) => true,
            Ok(Err(err)) => {
                debug!("association failed: {err}");
                false
            }
            Err(_) => {
                debug!("association timed out");
                false
            }
        }
    }

    async fn is_associated(&mut self) -> bool {
        match nmcli(
            "device show",
            &["-t", "-g", "GENERAL.STATE", "device", "show", &self.interface],
        )
        .await
        {
            // e.g. "100 (connected)"
            Ok(state) => state.trim().starts_with("100"),
            Err(err) => {
                warn!("failed to read link state: {err}");
                false
            }
        }
    }

    #[instrument(skip_all, fields(interface = %self.interface))]
    async fn serve_portal(
        &mut self,
        access_point: &AccessPoint,
        timeout: Duration,
    ) -> Result<Option<PortalSubmission>, LinkError> {
        nmcli(
            "device wifi hotspot",
            &[
                "device",
                "wifi",
                "hotspot",
                "ifname",
                &self.interface,
                "con-name",
                HOTSPOT_CONNECTION,
                "ssid",
                &access_point.ssid,
                "password",
                &access_point.password,
            ],
        )
        .await?;

        let res = match TcpListener::bind(self.portal_address).await {
            Ok(listener) => serve_portal(listener, &access_point.ssid, timeout).await,
            Err(err) => Err(LinkError::Portal(err)),
        };

        if let Err(err) = nmcli("connection down", &["connection", "down", HOTSPOT_CONNECTION]).await
        {
            warn!("failed to stop access point: {err}");
        }

        res
    }

    #[instrument(skip_all, fields(interface = %self.interface, ssid = %credentials.ssid))]
    async fn save_credentials(&mut self, credentials: &WifiCredentials) -> Result<(), LinkError> {
        nmcli(
            "device wifi connect",
            &[
                "device",
                "wifi",
                "connect",
                &credentials.ssid,
                "password",
                &credentials.password,
                "ifname",
                &self.interface,
            ],
        )
        .await?;
        Ok(())
    }
}
