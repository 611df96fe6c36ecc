use crate::error::Error;
use crate::response::ResponseConfig;
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::fs::File;
use std::io::BufReader;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[serde_as]
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub bind_ip: IpAddr,
    pub dns_port: u16,
    pub http_port: u16,
    pub https_port: u16,
    /// The address every `A` query is answered with.
    pub answer_addr: Ipv4Addr,
    /// Directory holding `ca.p12` and `ca.crt`.
    pub storage_dir: PathBuf,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub dns_tcp_timeout: Duration,
    /// How long in-flight HTTP(S) connections get to finish once a stop is requested.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub shutdown_grace: Duration,
    pub response: ResponseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            dns_port: 53,
            http_port: 80,
            https_port: 443,
            answer_addr: Ipv4Addr::LOCALHOST,
            storage_dir: PathBuf::from("."),
            dns_tcp_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(2),
            response: ResponseConfig::default(),
        }
    }
}

impl Config {
    pub fn try_from_file(p: impl AsRef<Path>) -> Result<Self, Error> {
        let f = File::open(p)?;
        let reader = BufReader::new(f);
        let conf: Config = serde_json::from_reader(reader)?;
        Ok(conf)
    }

    /// Replace the configured ports with the given strings. A string that isn't a valid port
    /// number leaves the previously configured port in place.
    pub fn apply_port_strings(&mut self, dns: &str, http: &str, https: &str) {
        self.dns_port = parse_port_or(dns, self.dns_port);
        self.http_port = parse_port_or(http, self.http_port);
        self.https_port = parse_port_or(https, self.https_port);
    }

    pub fn dns_bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.dns_port)
    }

    pub fn http_bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.http_port)
    }

    pub fn https_bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.https_port)
    }
}

fn parse_port_or(value: &str, current: u16) -> u16 {
    match value.trim().parse() {
        Ok(port) => port,
        Err(_) => {
            tracing::warn!("ignoring invalid port \"{value}\", keeping {current}");
            current
        }
    }
}
