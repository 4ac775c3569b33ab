use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::util::duration::parse_duration_ms;
use crate::util::http::Uri;
use crate::util::types::{ApiKey, Udid};

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)] // read from Cargo.toml
pub struct Cli {
    /// Network interface to manage
    #[arg(
        env = "FLEETNODE_INTERFACE",
        long = "interface",
        value_name = "iface",
        default_value = "wlan0"
    )]
    pub interface: String,

    /// Hardware address to identify as, read from the interface if not given
    #[arg(env = "FLEETNODE_MAC", long = "mac", value_name = "mac")]
    pub mac: Option<String>,

    /// Unique device identifier to use until the remote assigns one
    #[arg(env = "FLEETNODE_UDID", long = "udid", value_name = "udid")]
    pub udid: Option<Udid>,

    /// Owner to use until the remote assigns one
    #[arg(env = "FLEETNODE_OWNER", long = "owner", value_name = "owner")]
    pub owner: Option<String>,

    /// Alias to use until the remote assigns one
    #[arg(env = "FLEETNODE_ALIAS", long = "alias", value_name = "alias")]
    pub alias: Option<String>,

    /// API key for the remote, used when none is stored
    #[arg(env = "FLEETNODE_API_KEY", long = "api-key", value_name = "key")]
    pub api_key: Option<ApiKey>,

    /// Remote API endpoint URI
    #[arg(
        env = "FLEETNODE_API_ENDPOINT",
        long = "api-endpoint",
        value_name = "uri"
    )]
    pub api_endpoint: Option<Uri>,

    /// Check-in response timeout in milliseconds
    #[arg(
        env = "FLEETNODE_CHECKIN_TIMEOUT_MS",
        long = "checkin-timeout-ms",
        value_name = "ms",
        value_parser = parse_duration_ms
    )]
    pub checkin_timeout: Option<Duration>,

    /// Interval between successful check-ins in milliseconds
    #[arg(
        env = "FLEETNODE_CHECKIN_INTERVAL_MS",
        long = "checkin-interval-ms",
        value_name = "ms",
        value_parser = parse_duration_ms
    )]
    pub checkin_interval: Option<Duration>,

    /// Message broker URI
    #[arg(
        env = "FLEETNODE_MQTT_ENDPOINT",
        long = "mqtt-endpoint",
        value_name = "uri"
    )]
    pub mqtt_endpoint: Option<Uri>,

    /// Base URI for relative firmware image locations
    #[arg(
        env = "FLEETNODE_UPDATE_BASE",
        long = "update-base",
        value_name = "uri"
    )]
    pub update_base: Option<Uri>,

    /// Program run with the path of a downloaded image as its last argument
    #[arg(
        env = "FLEETNODE_UPDATE_HOOK",
        long = "update-hook",
        value_name = "path"
    )]
    pub update_hook: Option<PathBuf>,

    /// SSID of the configuration access point
    #[arg(
        env = "FLEETNODE_AP_SSID",
        long = "ap-ssid",
        value_name = "ssid",
        requires = "ap_password"
    )]
    pub ap_ssid: Option<String>,

    /// Password of the configuration access point
    #[arg(
        env = "FLEETNODE_AP_PASSWORD",
        long = "ap-password",
        value_name = "password",
        requires = "ap_ssid"
    )]
    pub ap_password: Option<String>,

    /// Listen address of the provisioning endpoint
    #[arg(
        env = "FLEETNODE_PORTAL_ADDRESS",
        long = "portal-address",
        value_name = "addr",
        default_value = "0.0.0.0:80"
    )]
    pub portal_address: SocketAddr,

    /// How long the configuration access point waits for an operator, in
    /// milliseconds
    #[arg(
        env = "FLEETNODE_PORTAL_TIMEOUT_MS",
        long = "portal-timeout-ms",
        value_name = "ms",
        value_parser = parse_duration_ms
    )]
    pub portal_timeout: Option<Duration>,

    /// Agent loop period in milliseconds
    #[arg(
        env = "FLEETNODE_TICK_INTERVAL_MS",
        long = "tick-interval-ms",
        value_name = "ms",
        value_parser = parse_duration_ms
    )]
    pub tick_interval: Option<Duration>,
}

pub fn parse() -> Cli {
    Parser::parse()
}
