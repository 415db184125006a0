use clap::Parser;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::codec::DEFAULT_MAX_FRAME_SIZE;
use crate::store::{StoreConfig, DEFAULT_EXPIRY_SWEEP_INTERVAL, DEFAULT_WAITER_CLEANUP_EVERY};

pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// An in-memory server for Redis strings, lists and streams.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(version, about)]
pub struct Config {
    /// The port to listen on
    #[arg(short, long, env = "REDSTREAM_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// The address to bind to
    #[arg(long, default_value = DEFAULT_BIND)]
    pub bind: String,

    /// Report this server as a replica of the given master, as "<host> <port>"
    #[arg(long, value_name = "HOST PORT")]
    pub replicaof: Option<ReplicaOf>,

    /// How often expired string keys are actively evicted, in milliseconds
    #[arg(long, default_value_t = DEFAULT_EXPIRY_SWEEP_INTERVAL.as_millis() as u64)]
    pub expiry_sweep_interval_ms: u64,

    /// Number of commands a store processes between two cleanups of blocked clients
    #[arg(long, default_value_t = DEFAULT_WAITER_CLEANUP_EVERY)]
    pub waiter_cleanup_every: u64,

    /// Largest request, in bytes, a connection buffers before giving up
    #[arg(long, env = "MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,
}

impl Config {
    pub fn role(&self) -> Role {
        match &self.replicaof {
            Some(master) => Role::Replica(master.clone()),
            None => Role::Master,
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            expiry_sweep_interval: Duration::from_millis(self.expiry_sweep_interval_ms),
            waiter_cleanup_every: self.waiter_cleanup_every,
            role: self.role(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            replicaof: None,
            expiry_sweep_interval_ms: DEFAULT_EXPIRY_SWEEP_INTERVAL.as_millis() as u64,
            waiter_cleanup_every: DEFAULT_WAITER_CLEANUP_EVERY,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// The master a replica follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaOf {
    pub host: String,
    pub port: u16,
}

impl FromStr for ReplicaOf {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();

        match (parts.next(), parts.next(), parts.next()) {
            (Some(host), Some(port), None) => {
                let port = port
                    .parse()
                    .map_err(|_| format!("invalid master port {:?}", port))?;

                Ok(ReplicaOf {
                    host: host.to_string(),
                    port,
                })
            }
            _ => Err(format!("expected \"<host> <port>\", got {:?}", s)),
        }
    }
}

impl fmt::Display for ReplicaOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.host, self.port)
    }
}

/// Replication role reported by `INFO replication`. No replication takes place.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Master,
    Replica(ReplicaOf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::try_parse_from(["redstream"]).unwrap();

        assert_eq!(config.bind, "127.0.0.1");
        assert_eq!(config.replicaof, None);
        assert_eq!(config.expiry_sweep_interval_ms, 10_000);
        assert_eq!(config.waiter_cleanup_every, 1000);
        assert_eq!(config.role(), Role::Master);
    }

    #[test]
    fn replica_of() {
        let config =
            Config::try_parse_from(["redstream", "--port", "6380", "--replicaof", "localhost 6379"])
                .unwrap();

        assert_eq!(config.port, 6380);
        assert_eq!(
            config.role(),
            Role::Replica(ReplicaOf {
                host: "localhost".to_string(),
                port: 6379,
            })
        );
    }

    #[test]
    fn invalid_replica_of() {
        assert!(Config::try_parse_from(["redstream", "--replicaof", "localhost"]).is_err());
        assert!(Config::try_parse_from(["redstream", "--replicaof", "localhost abc"]).is_err());
    }

    #[test]
    fn store_config() {
        let config = Config::try_parse_from([
            "redstream",
            "--expiry-sweep-interval-ms",
            "250",
            "--waiter-cleanup-every",
            "10",
        ])
        .unwrap();

        let store_config = config.store_config();

        assert_eq!(store_config.expiry_sweep_interval, Duration::from_millis(250));
        assert_eq!(store_config.waiter_cleanup_every, 10);
    }
}
