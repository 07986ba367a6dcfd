use std::{
    env,
    error::Error,
    fmt::{self, Display},
};

use comms::specs::object::WorkerId;

const DEFAULT_HOST: &str = "127.0.0.1";

/// The configuration of a worker node, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub id: WorkerId,
    pub addr: String,
    pub peers: Vec<PeerConfig>,
}

/// A peer to connect to on startup.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerConfig {
    pub id: WorkerId,
    pub addr: String,
}

#[derive(Debug, PartialEq)]
pub enum ConfigErr {
    Missing(&'static str),
    InvalidPort(String),
    InvalidPeer(String),
}

impl Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErr::Missing(var) => write!(f, "missing environment variable {var}"),
            ConfigErr::InvalidPort(port) => write!(f, "invalid port `{port}`"),
            ConfigErr::InvalidPeer(peer) => {
                write!(f, "invalid peer `{peer}`, expected name@host:port")
            }
        }
    }
}

impl Error for ConfigErr {}

impl NodeConfig {
    /// Reads the configuration from `WORKER_ID`, `HOST`, `PORT` and `PEERS`.
    pub fn from_env() -> Result<Self, ConfigErr> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    /// A `ConfigErr` if a required variable is missing or a value is malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigErr>
    where
        F: Fn(&str) -> Option<String>,
    {
        let id = lookup("WORKER_ID").ok_or(ConfigErr::Missing("WORKER_ID"))?;
        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = lookup("PORT").ok_or(ConfigErr::Missing("PORT"))?;
        port.parse::<u16>()
            .map_err(|_| ConfigErr::InvalidPort(port.clone()))?;

        let peers = match lookup("PEERS") {
            Some(peers) => peers
                .split(',')
                .map(str::trim)
                .filter(|peer| !peer.is_empty())
                .map(parse_peer)
                .collect::<Result<_, _>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            id: WorkerId::new(id),
            addr: format!("{host}:{port}"),
            peers,
        })
    }
}

fn parse_peer(peer: &str) -> Result<PeerConfig, ConfigErr> {
    let invalid = || ConfigErr::InvalidPeer(peer.to_string());

    let (id, addr) = peer.split_once('@').ok_or_else(invalid)?;
    let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;
    if id.is_empty() || host.is_empty() || port.parse::<u16>().is_err() {
        return Err(invalid());
    }

    Ok(PeerConfig {
        id: WorkerId::from(id),
        addr: addr.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        move |var: &str| vars.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = NodeConfig::from_lookup(lookup(&[("WORKER_ID", "bob"), ("PORT", "9000")]))
            .unwrap();

        assert_eq!(config.id.as_str(), "bob");
        assert_eq!(config.addr, "127.0.0.1:9000");
        assert!(config.peers.is_empty());
    }

    #[test]
    fn test_peers() {
        let config = NodeConfig::from_lookup(lookup(&[
            ("WORKER_ID", "bob"),
            ("HOST", "0.0.0.0"),
            ("PORT", "9000"),
            ("PEERS", "alice@10.0.0.2:9001, james@localhost:9002"),
        ]))
        .unwrap();

        assert_eq!(config.addr, "0.0.0.0:9000");
        assert_eq!(
            config.peers,
            [
                PeerConfig {
                    id: "alice".into(),
                    addr: "10.0.0.2:9001".into(),
                },
                PeerConfig {
                    id: "james".into(),
                    addr: "localhost:9002".into(),
                },
            ]
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            NodeConfig::from_lookup(lookup(&[("PORT", "9000")])),
            Err(ConfigErr::Missing("WORKER_ID"))
        );
        assert_eq!(
            NodeConfig::from_lookup(lookup(&[("WORKER_ID", "bob"), ("PORT", "http")])),
            Err(ConfigErr::InvalidPort("http".into()))
        );
        assert_eq!(
            NodeConfig::from_lookup(lookup(&[
                ("WORKER_ID", "bob"),
                ("PORT", "9000"),
                ("PEERS", "alice:9001"),
            ])),
            Err(ConfigErr::InvalidPeer("alice:9001".into()))
        );
    }
}
