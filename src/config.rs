//! Loads the cluster configuration file: a JSON object with `clients`,
//! `proposers`, `acceptors`, `learners`
//! keys (each `{"ip": ..., "port": ...}`) and an integer `n` (number of
//! acceptors), parsed with the `config` crate into a typed shape
//! rather than a stringly `HashMap<String, HashMap<String, String>>`,
//! because `n` and `port` are integers, not strings.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

use config::{Config, File};
use serde::Deserialize;

use crate::error::{PaxosError, Result};

/// Default location of the config file, relative to the running
/// executable: `<exec_dir>/../logs/config.json`.
pub fn default_config_path() -> std::path::PathBuf {
    let exe = std::env::current_exe().unwrap_or_else(|_| std::path::PathBuf::from("."));
    let exe_dir = exe.parent().unwrap_or_else(|| std::path::Path::new("."));
    exe_dir.join("..").join("logs").join("config.json")
}

#[derive(Debug, Deserialize, Clone, Copy)]
struct RawGroup {
    ip: String,
    port: u16,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    clients: RawGroup,
    proposers: RawGroup,
    acceptors: RawGroup,
    learners: RawGroup,
    n: usize,
}

/// The four multicast group addresses plus the acceptor count, parsed
/// and ready to use.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub clients: SocketAddrV4,
    pub proposers: SocketAddrV4,
    pub acceptors: SocketAddrV4,
    pub learners: SocketAddrV4,
    pub num_acceptors: usize,
}

impl ClusterConfig {
    /// Number of acceptors that must agree for a quorum: floor(n/2) + 1.
    pub fn majority(&self) -> usize {
        self.num_acceptors / 2 + 1
    }
}

fn to_socket_addr(g: RawGroup) -> Result<SocketAddrV4> {
    let ip = Ipv4Addr::from_str(&g.ip).map_err(|_| {
        PaxosError::ConfigShape(config::ConfigError::Message(format!(
            "invalid IPv4 address: {}",
            g.ip
        )))
    })?;
    Ok(SocketAddrV4::new(ip, g.port))
}

pub fn load_config(path: &std::path::Path) -> Result<ClusterConfig> {
    let path_str = path.to_string_lossy().to_string();

    let settings = Config::builder()
        .add_source(File::from(path.to_path_buf()))
        .build()
        .map_err(|source| PaxosError::ConfigRead {
            path: path_str.clone(),
            source,
        })?;

    let raw: RawConfig = settings
        .try_deserialize()
        .map_err(|source| PaxosError::ConfigRead {
            path: path_str,
            source,
        })?;

    Ok(ClusterConfig {
        clients: to_socket_addr(raw.clients)?,
        proposers: to_socket_addr(raw.proposers)?,
        acceptors: to_socket_addr(raw.acceptors)?,
        learners: to_socket_addr(raw.learners)?,
        num_acceptors: raw.n,
    })
}
