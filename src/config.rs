//! Launch configuration.
//!
//! A process learns whether it is part of a distributed run from its
//! environment:
//!
//! | Variable                     | Meaning                                              |
//! |------------------------------|------------------------------------------------------|
//! | `PARCOMM_PEERS`              | Comma separated `host:port` list, one entry per rank |
//! | `PARCOMM_RANK`               | Index of this process in `PARCOMM_PEERS`             |
//! | `PARCOMM_CONNECT_TIMEOUT_MS` | Time budget for connecting to all peers              |
//!
//! Without `PARCOMM_PEERS` the process runs serially.

use std::{
    net::{SocketAddr, ToSocketAddrs},
    time::Duration,
};

pub const ENV_PEERS: &str = "PARCOMM_PEERS";
pub const ENV_RANK: &str = "PARCOMM_RANK";
pub const ENV_CONNECT_TIMEOUT_MS: &str = "PARCOMM_CONNECT_TIMEOUT_MS";

/// Indicates an invalid launch configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The peer list is empty.
    #[error("Peer list must not be empty")]
    NoPeers,

    /// The rank does not index the peer list.
    #[error("Rank {rank} is out of range for {size} peers")]
    RankOutOfRange { rank: usize, size: usize },

    /// The same address was listed for two ranks.
    #[error("Peer address {0} is listed more than once")]
    DuplicatePeer(SocketAddr),

    /// The connect timeout is zero.
    #[error("Connect timeout must be greater than zero")]
    ConnectTimeoutZero,

    /// A required environment variable is not set.
    #[error("Environment variable {0} is required")]
    MissingVariable(&'static str),

    /// An environment variable could not be parsed.
    #[error("Invalid value {value:?} for {name}")]
    InvalidValue { name: &'static str, value: String },

    /// A peer address could not be resolved.
    #[error("Cannot resolve peer address {0:?}")]
    UnresolvedPeer(String),
}

/// Configuration of a [`TcpTransport`](crate::tcp::TcpTransport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    /// Rank of this process. The transport listens on `peers[rank]`.
    pub rank: usize,

    /// Listen addresses of all ranks in rank order.
    pub peers: Vec<SocketAddr>,

    /// The time to wait for all peers to connect.
    ///
    /// The default is 30 seconds.
    pub connect_timeout: Duration,
}

impl TcpConfig {
    pub fn new(rank: usize, peers: Vec<SocketAddr>) -> Self {
        Self {
            rank,
            peers,
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Validates the configuration.
    ///
    /// See [`ConfigError`] for details.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.peers.is_empty() {
            return Err(ConfigError::NoPeers);
        }

        if self.rank >= self.peers.len() {
            return Err(ConfigError::RankOutOfRange {
                rank: self.rank,
                size: self.peers.len(),
            });
        }

        let mut seen = ahash::HashSet::default();
        if let Some(duplicate) = self.peers.iter().find(|addr| !seen.insert(**addr)) {
            return Err(ConfigError::DuplicatePeer(*duplicate));
        }

        if self.connect_timeout.is_zero() {
            return Err(ConfigError::ConnectTimeoutZero);
        }
        Ok(())
    }
}

/// How the current process participates in the computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchConfig {
    /// The process runs on its own.
    Serial,
    /// The process is one rank of a TCP connected group.
    Tcp(TcpConfig),
}

impl LaunchConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, ConfigError> {
        let peers = match lookup(ENV_PEERS) {
            Some(peers) if !peers.trim().is_empty() => peers,
            _ => return Ok(LaunchConfig::Serial),
        };

        let peers = peers
            .split(',')
            .map(str::trim)
            .filter(|peer| !peer.is_empty())
            .map(resolve)
            .collect::<Result<Vec<_>, _>>()?;

        let rank = lookup(ENV_RANK).ok_or(ConfigError::MissingVariable(ENV_RANK))?;
        let rank = parse(ENV_RANK, &rank)?;

        let mut config = TcpConfig::new(rank as usize, peers);
        if let Some(timeout) = lookup(ENV_CONNECT_TIMEOUT_MS) {
            config.connect_timeout = Duration::from_millis(parse(ENV_CONNECT_TIMEOUT_MS, &timeout)?);
        }

        config.validate()?;
        Ok(LaunchConfig::Tcp(config))
    }
}

fn parse(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            name,
            value: value.to_owned(),
        })
}

fn resolve(peer: &str) -> Result<SocketAddr, ConfigError> {
    peer.to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ConfigError::UnresolvedPeer(peer.to_owned()))
}

#[cfg(test)]
mod test {
    use super::*;
    use ahash::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn missing_peers_means_serial() {
        assert_eq!(LaunchConfig::from_lookup(lookup(&[])).unwrap(), LaunchConfig::Serial);
        assert_eq!(
            LaunchConfig::from_lookup(lookup(&[(ENV_PEERS, "  "), (ENV_RANK, "3")])).unwrap(),
            LaunchConfig::Serial
        );
    }

    #[test]
    fn peers_and_rank() {
        let config = LaunchConfig::from_lookup(lookup(&[
            (ENV_PEERS, "127.0.0.1:4000, 127.0.0.1:4001"),
            (ENV_RANK, "1"),
            (ENV_CONNECT_TIMEOUT_MS, "250"),
        ]))
        .unwrap();

        let LaunchConfig::Tcp(config) = config else {
            panic!("expected a tcp configuration");
        };
        assert_eq!(config.rank, 1);
        assert_eq!(config.peers.len(), 2);
        assert_eq!(config.peers[1].port(), 4001);
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
    }

    #[test]
    fn rank_is_required() {
        let err = LaunchConfig::from_lookup(lookup(&[(ENV_PEERS, "127.0.0.1:4000")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVariable(ENV_RANK)));

        let err = LaunchConfig::from_lookup(lookup(&[(ENV_PEERS, "127.0.0.1:4000"), (ENV_RANK, "x")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: ENV_RANK, .. }));
    }

    #[test]
    fn validate() {
        let peers: Vec<SocketAddr> = vec![
            "127.0.0.1:4000".parse().unwrap(),
            "127.0.0.1:4001".parse().unwrap(),
        ];

        assert!(TcpConfig::new(1, peers.clone()).validate().is_ok());
        assert!(matches!(
            TcpConfig::new(2, peers.clone()).validate(),
            Err(ConfigError::RankOutOfRange { rank: 2, size: 2 })
        ));
        assert!(matches!(
            TcpConfig::new(0, vec![]).validate(),
            Err(ConfigError::NoPeers)
        ));
        assert!(matches!(
            TcpConfig::new(0, vec![peers[0], peers[0]]).validate(),
            Err(ConfigError::DuplicatePeer(_))
        ));

        let mut config = TcpConfig::new(0, peers);
        config.connect_timeout = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::ConnectTimeoutZero)));
    }
}
