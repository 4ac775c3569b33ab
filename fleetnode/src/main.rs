use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

mod agent;
mod cli;

use fleetnode_identity as identity;
use fleetnode_link as link;
use fleetnode_remote as remote;
use fleetnode_session as session;
use fleetnode_update as update;
use fleetnode_util as util;

use crate::agent::{Agent, Flow};
use crate::cli::Cli;
use crate::identity::{DeviceIdentity, IdentityStore};
use crate::link::{AccessPoint, Connectivity, LinkConfig, NmcliAdapter, normalize_mac, read_mac};
use crate::remote::{BuildInfo, RegistrationClient, RegistrationConfig, TcpTransport};
use crate::session::{Messenger, MqttBroker};
use crate::update::{HttpApplier, UpdateConfig, UpdateController};
use crate::util::dirs::{config_dir, state_dir};
use crate::util::http::Uri;
use crate::util::store::Store;

const DEFAULT_MQTT_ENDPOINT: &str = "mqtt://thinx.cloud:1883";
const DEFAULT_CHECKIN_INTERVAL: Duration = Duration::from_secs(3600);
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn initialize_tracing() {
    // Initialize tracing subscriber for human-readable logs
    tracing_subscriber::registry()
        .with(
            // Use some log defaults. These can be overriden using
            // RUST_LOG
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("debug,rumqttc=warn,hyper=error,reqwest=info")
            }),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE)
                .event_format(fmt::format().compact().with_target(false).without_time()),
        )
        .init();
}

/// Identity used until one is stored, from the command line or baked in at
/// build time
fn default_identity(cli: &Cli) -> DeviceIdentity {
    DeviceIdentity {
        udid: cli
            .udid
            .clone()
            .unwrap_or_else(|| option_env!("FLEETNODE_DEFAULT_UDID").unwrap_or_default().into()),
        owner: cli
            .owner
            .clone()
            .unwrap_or_else(|| option_env!("FLEETNODE_DEFAULT_OWNER").unwrap_or_default().into()),
        alias: cli
            .alias
            .clone()
            .unwrap_or_else(|| option_env!("FLEETNODE_DEFAULT_ALIAS").unwrap_or_default().into()),
        api_key: cli.api_key.clone().unwrap_or_else(|| {
            option_env!("FLEETNODE_DEFAULT_API_KEY")
                .unwrap_or_default()
                .into()
        }),
    }
}

fn link_config(cli: &Cli) -> LinkConfig {
    let mut config = LinkConfig::default();
    if let (Some(ssid), Some(password)) = (&cli.ap_ssid, &cli.ap_password) {
        config.access_point = AccessPoint {
            ssid: ssid.clone(),
            password: password.clone(),
        };
    }
    if let Some(timeout) = cli.portal_timeout {
        config.portal_timeout = timeout;
    }
    config
}

fn build_info() -> BuildInfo {
    BuildInfo {
        firmware: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: env!("FLEETNODE_COMMIT_ID").to_string(),
        platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
    }
}

fn mqtt_broker(cli: &Cli) -> Result<MqttBroker> {
    let endpoint = cli
        .mqtt_endpoint
        .clone()
        .unwrap_or_else(|| Uri::from_static(DEFAULT_MQTT_ENDPOINT));
    let host = endpoint
        .host()
        .with_context(|| format!("no host in broker endpoint {endpoint}"))?;
    let port = endpoint
        .port_or_default()
        .with_context(|| format!("no port in broker endpoint {endpoint}"))?;
    Ok(MqttBroker::new(host, port, CONNECT_TIMEOUT))
}

fn main() -> Result<()> {
    initialize_tracing();

    let cli = cli::parse();

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?
        .block_on(run(cli))
}

#[instrument(name = "fleetnode", skip_all, err)]
async fn run(cli: Cli) -> Result<()> {
    let mac = match &cli.mac {
        Some(mac) => normalize_mac(mac),
        None => read_mac(&cli.interface)
            .await
            .with_context(|| format!("failed to read the hardware address of {}", cli.interface))?,
    };
    debug!(%mac, interface = %cli.interface, "using hardware address");

    let store = IdentityStore::new(Store::new(config_dir()), default_identity(&cli));
    let link = Connectivity::new(
        NmcliAdapter::new(&cli.interface, cli.portal_address),
        link_config(&cli),
    );

    let mut registration_config = RegistrationConfig::default();
    if let Some(endpoint) = &cli.api_endpoint {
        registration_config.endpoint = endpoint.clone();
    }
    if let Some(timeout) = cli.checkin_timeout {
        registration_config.response_timeout = timeout;
    }
    let build = build_info();
    let running_version = build.version.clone();
    let registration = RegistrationClient::new(
        TcpTransport::new(CONNECT_TIMEOUT),
        registration_config,
        build,
    );

    let mut applier = HttpApplier::new(&mac, state_dir().join("update"));
    if let Some(hook) = &cli.update_hook {
        applier = applier.with_hook(hook);
    }
    let mut update_config = UpdateConfig::default();
    if let Some(base) = &cli.update_base {
        update_config.base = base.clone();
    }
    let updates = UpdateController::new(applier, update_config, running_version);

    let messenger = Messenger::new(mqtt_broker(&cli)?, &mac);

    let mut agent = Agent::new(
        store,
        link,
        registration,
        updates,
        messenger,
        mac,
        cli.checkin_interval.unwrap_or(DEFAULT_CHECKIN_INTERVAL),
    );

    let flow = tokio::select! {
        flow = agent.start() => flow,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted during startup");
            return Ok(());
        }
    };
    if flow == Flow::Restart {
        info!("exiting to run the new image");
        return Ok(());
    }
    info!(udid = %agent.identity().udid, owner = %agent.identity().owner, "device is up");

    let mut interval = tokio::time::interval(cli.tick_interval.unwrap_or(DEFAULT_TICK_INTERVAL));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if agent.tick().await == Flow::Restart {
                    info!("exiting to run the new image");
                    return Ok(());
                }
            }
            res = tokio::signal::ctrl_c() => {
                if let Err(err) = res {
                    warn!("failed to listen for shutdown signal: {err}");
                }
                info!("shutting down");
                break;
            }
        }
    }

    agent.shutdown().await;
    Ok(())
}
