//! Command line configuration.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use std::vec::Vec;

use clap::Parser;

use crate::error::ConfigError;
use crate::name::DomainName;
use crate::partition::MAX_PARALLELISM;
use crate::retry::Backoff;
use crate::walker::WalkOptions;

/// The default port of upstream servers.
const DEFAULT_PORT: u16 = 53;

//------------ Args ----------------------------------------------------------

/// Lists all names of a DNSSEC-signed zone by walking its NSEC chain.
#[derive(Clone, Debug, Parser)]
#[command(name = "zonewalk", version)]
pub struct Args {
    /// The zone to walk.
    pub zone: String,

    /// Number of partitions to walk concurrently (1 to 36).
    #[arg(short = 'P', long = "parallel", default_value_t = 1)]
    pub parallel: usize,

    /// Maximum number of queries per second and partition, 0 for no limit.
    #[arg(long, default_value_t = WalkOptions::DEFAULT_RATE)]
    pub rps: u32,

    /// Resume the walk after this name.
    #[arg(long, value_name = "NAME")]
    pub start: Option<String>,

    /// Upstream resolver to use instead of the system's.
    #[arg(short = 's', long = "server", value_name = "ADDR")]
    pub servers: Vec<String>,

    /// Query the zone's authoritative name servers directly.
    #[arg(long, conflicts_with = "servers")]
    pub authoritative: bool,

    /// Timeout for a single query in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    pub timeout: u64,

    /// Delay before retrying a failed query in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    pub retry_initial: u64,

    /// Maximum delay between retries in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 60_000)]
    pub retry_max: u64,

    /// Log more.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log less.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Args {
    /// Checks the arguments and turns them into a config.
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let zone =
            DomainName::normalize(&self.zone).map_err(|source| {
                ConfigError::Zone {
                    name: self.zone.clone(),
                    source,
                }
            })?;
        let zone = zone.to_canonical();

        if !(1..=MAX_PARALLELISM).contains(&self.parallel) {
            return Err(ConfigError::Parallelism(self.parallel));
        }

        let start = match self.start.as_ref() {
            Some(start) => {
                if self.parallel > 1 {
                    return Err(ConfigError::StartWithParallel);
                }
                let name = DomainName::normalize(start).map_err(|source| {
                    ConfigError::Start {
                        name: start.clone(),
                        source,
                    }
                })?;
                if !name.ends_with(&zone) {
                    return Err(ConfigError::StartOutsideZone {
                        start: name.to_string(),
                        zone: zone.to_string(),
                    });
                }
                Some(name.to_canonical())
            }
            None => None,
        };

        let upstreams = if self.authoritative {
            Upstreams::Authoritative
        } else if self.servers.is_empty() {
            Upstreams::System
        } else {
            Upstreams::Servers(
                self.servers
                    .iter()
                    .map(|server| parse_server(server))
                    .collect::<Result<_, _>>()?,
            )
        };

        if self.retry_initial == 0 || self.retry_max < self.retry_initial {
            return Err(ConfigError::RetryDelays);
        }

        Ok(Config {
            zone,
            parallelism: self.parallel,
            start,
            upstreams,
            timeout: Duration::from_millis(self.timeout),
            walk: WalkOptions {
                rate: self.rps,
                backoff: Backoff::new(
                    Duration::from_millis(self.retry_initial),
                    Duration::from_millis(self.retry_max),
                ),
            },
            verbosity: i8::try_from(self.verbose).unwrap_or(i8::MAX)
                - i8::try_from(self.quiet).unwrap_or(i8::MAX),
        })
    }
}

/// Parses an upstream server address.
///
/// This is either an IP address with or without a port. IPv6 addresses
/// with a port need to be in brackets.
pub fn parse_server(s: &str) -> Result<SocketAddr, ConfigError> {
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Ok(addr);
    }
    s.parse::<IpAddr>()
        .map(|addr| SocketAddr::new(addr, DEFAULT_PORT))
        .map_err(|_| ConfigError::Server(s.into()))
}

//------------ Upstreams -----------------------------------------------------

/// Where to send queries to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Upstreams {
    /// The resolvers configured for the system.
    System,

    /// The given validating resolvers.
    Servers(Vec<SocketAddr>),

    /// The authoritative name servers of the zone.
    Authoritative,
}

//------------ Config --------------------------------------------------------

/// A checked configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub zone: DomainName,
    pub parallelism: usize,
    pub start: Option<DomainName>,
    pub upstreams: Upstreams,
    pub timeout: Duration,
    pub walk: WalkOptions,

    /// Positive for more logging, negative for less.
    pub verbosity: i8,
}

//============ Testing =======================================================
