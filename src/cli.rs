//! CLI for this application
//!
use url::Url;

use crate::error::Result;
use crate::settings;

#[derive(Clone, Debug, clap::Parser)]
pub struct Cli {
    // Server listen address
    #[clap(
        long,
        default_value = "0.0.0.0",
        env("TURNSTILE_LISTEN_ADDRESS"),
        help = "IP Address to listen on"
    )]
    pub listen_address: String,

    // HTTP API listen port
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_HTTP,
        env("TURNSTILE_LISTEN_PORT"),
        help = "Port to bind the Turnstile HTTP API server to"
    )]
    pub listen_port: u16,

    // URL peers use to reach this node
    #[clap(
        long,
        env("TURNSTILE_ADVERTISE_URL"),
        help = "URL other nodes use to reach this node. Defaults to http://{listen_address}:{listen_port}"
    )]
    pub advertise_url: Option<Url>,

    // Quota: max calls per key per window
    #[clap(
        long,
        default_value = settings::DEFAULT_MAX_PER_WINDOW,
        env("TURNSTILE_MAX_PER_WINDOW"),
        help = "Max calls allowed per key per window"
    )]
    pub max_per_window: u32,

    // Quota: window length before counters reset
    #[clap(
        long,
        default_value = settings::DEFAULT_WINDOW_SECONDS,
        env("TURNSTILE_WINDOW_SECONDS"),
        help = "Window length in seconds before all counters reset"
    )]
    pub window_seconds: u64,

    // Deadline for calls to the counter-owner
    #[clap(
        long,
        default_value = settings::DEFAULT_CALL_TIMEOUT_SECONDS,
        env("TURNSTILE_CALL_TIMEOUT_SECONDS"),
        help = "Deadline in seconds for calls to the counter-owner"
    )]
    pub call_timeout_seconds: u64,

    // Peer failure detection timeout
    #[clap(
        long,
        default_value = settings::DEFAULT_FAILURE_TIMEOUT_SECONDS,
        env("TURNSTILE_FAILURE_TIMEOUT_SECONDS"),
        help = "Seconds of missed heartbeats before a peer is considered down"
    )]
    pub failure_timeout_seconds: u64,

    // Logical name for the cluster-wide limiter singleton
    #[clap(
        long,
        default_value = settings::DEFAULT_SINGLETON_NAME,
        env("TURNSTILE_SINGLETON_NAME"),
        help = "Logical name the counter-owner registers under"
    )]
    pub singleton_name: String,

    // Cluster configuration information: topology
    #[clap(
        long,
        env("TURNSTILE_TOPOLOGY"),
        value_delimiter = ',',
        help = "Peer node URLs (e.g., http://node1:8620,http://node2:8620). If empty, runs in single-node mode."
    )]
    pub topology: Vec<Url>,
}

impl Cli {
    pub fn into_settings(self) -> Result<settings::Settings> {
        let advertise_url = match self.advertise_url {
            Some(url) => url,
            None => {
                let fallback = format!("http://{}:{}", self.listen_address, self.listen_port);
                Url::parse(&fallback).map_err(|err| {
                    crate::error::TurnstileError::Config(format!(
                        "Cannot derive advertise URL from '{}': {}",
                        fallback, err
                    ))
                })?
            }
        };
        Ok(settings::Settings {
            listen_address: self.listen_address,
            listen_port: self.listen_port,
            advertise_url,
            topology: self.topology,
            max_per_window: self.max_per_window,
            window_seconds: self.window_seconds,
            call_timeout_seconds: self.call_timeout_seconds,
            failure_timeout_seconds: self.failure_timeout_seconds,
            singleton_name: self.singleton_name,
        })
    }
}
