use std::net::Ipv4Addr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{Error, Result};

/// How the station derives its UDP port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortMode {
    /// Use exactly this port
    Fixed(u16),
    /// Use `base + team`
    PerTeam {
        /// Base port
        base: u16,
    },
}

/// Configuration for a station
///
/// Built once at startup and handed to the station by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Station identifier within the team
    pub station: u32,
    /// Team identifier
    pub team: u32,
    /// Multicast group shared by all stations
    pub group: Ipv4Addr,
    /// Port selection
    pub port: PortMode,
    /// Directory for the event sink log
    pub log_dir: PathBuf,
    /// Seed for free slot selection, derived from the station id when unset
    pub seed: Option<u64>,
    /// Consecutive failed receives tolerated before the station gives up
    pub max_consecutive_transport_errors: u32,
    /// Buffered event sink lines
    pub sink_capacity: usize,
}

impl Config {
    /// Resolves the UDP port
    pub fn port(&self) -> Result<u16> {
        match self.port {
            PortMode::Fixed(port) => Ok(port),
            PortMode::PerTeam { base } => u16::try_from(self.team)
                .ok()
                .and_then(|team| base.checked_add(team))
                .ok_or_else(|| {
                    Error::config(format!("port {} + team {} overflows", base, self.team))
                }),
        }
    }

    /// Seed for this station's slot selection generator
    pub fn rng_seed(&self) -> u64 {
        self.seed
            .unwrap_or_else(|| u64::from(self.station) * 1_000_000)
    }

    /// Checks the configuration for values the station cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.group.is_multicast() {
            return Err(Error::config(format!("{} is not a multicast group", self.group)));
        }

        if self.port()? == 0 {
            return Err(Error::config("port must not be zero"));
        }

        if self.sink_capacity == 0 {
            return Err(Error::config("sink capacity must be positive"));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            station: 1,
            team: super::DEFAULT_TEAM,
            group: super::DEFAULT_GROUP,
            port: PortMode::PerTeam {
                base: super::DEFAULT_BASE_PORT,
            },
            log_dir: PathBuf::from("../log/"),
            seed: None,
            max_consecutive_transport_errors: 0,
            sink_capacity: super::DEFAULT_SINK_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port() {
        let config = Config::default();
        assert_eq!(config.port().unwrap(), 15017);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_port_modes() {
        let config = Config {
            port: PortMode::Fixed(4000),
            ..Default::default()
        };
        assert_eq!(config.port().unwrap(), 4000);

        let config = Config {
            team: 10,
            port: PortMode::PerTeam { base: u16::MAX - 5 },
            ..Default::default()
        };
        assert!(matches!(config.port(), Err(Error::Config(_))));
    }

    #[test]
    fn test_seed_derivation() {
        let config = Config {
            station: 3,
            ..Default::default()
        };
        assert_eq!(config.rng_seed(), 3_000_000);

        let config = Config {
            seed: Some(42),
            ..config
        };
        assert_eq!(config.rng_seed(), 42);
    }

    #[test]
    fn test_config_validation() {
        let config = Config {
            group: Ipv4Addr::new(10, 0, 0, 1),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            sink_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            port: PortMode::Fixed(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config {
            station: 4,
            seed: Some(7),
            ..Default::default()
        };

        let json = serde_json::to_string(&config).unwrap();
        let decoded: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, config);
        assert!(json.contains("per_team"));
    }
}
