use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// The network address of a remote actor: the `host:port` of the node hosting it plus the
/// logical name it was registered under on that node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorAddr {
    pub host: String,
    pub name: String,
}

impl ActorAddr {
    /// Creates a new `ActorAddr`.
    ///
    /// # Arguments
    /// * `host` - The `host:port` of the node.
    /// * `name` - The name the actor is registered under.
    pub fn new(host: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ActorAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.host)
    }
}

impl FromStr for ActorAddr {
    type Err = String;

    /// Parses the `name@host:port` notation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, host) = s
            .split_once('@')
            .ok_or_else(|| format!("expected name@host:port, got {s:?}"))?;

        if name.is_empty() || host.is_empty() || !host.contains(':') {
            return Err(format!("expected name@host:port, got {s:?}"));
        }

        Ok(Self::new(host, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays_the_same_notation() {
        let addr: ActorAddr = "aggregator@127.0.0.1:8091".parse().unwrap();
        assert_eq!(addr.name, "aggregator");
        assert_eq!(addr.host, "127.0.0.1:8091");
        assert_eq!(addr.to_string(), "aggregator@127.0.0.1:8091");
    }

    #[test]
    fn rejects_missing_parts() {
        assert!("127.0.0.1:8091".parse::<ActorAddr>().is_err());
        assert!("aggregator@".parse::<ActorAddr>().is_err());
        assert!("aggregator@localhost".parse::<ActorAddr>().is_err());
    }
}
