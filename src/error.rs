//! Error types.
//!
//! Every concern of the crate has its own error type. Names that cannot be
//! represented are [`NameError`]s, failures of the resolver collaborator are
//! [`ResolveError`]s, a single NSEC probe fails with a [`ProbeError`] and an
//! unusable command line leads to a [`ConfigError`]. The binary collects all
//! of them in [`Error`].

use std::io;
use std::time::Duration;

use domain::base::iana::Rcode;
use domain::base::wire::ParseError;
use domain::net::client::request;

//------------ NameError -----------------------------------------------------

/// A domain name could not be built.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum NameError {
    /// A label was longer than 63 octets.
    #[error("label exceeds 63 octets")]
    LongLabel,

    /// The encoded name was longer than 255 octets.
    #[error("domain name exceeds 255 octets")]
    LongName,

    /// A backslash was followed by something other than a character or a
    /// three digit decimal value up to 255.
    #[error("illegal escape sequence")]
    BadEscape,

    /// There is no name following the given one.
    #[error("name space exhausted")]
    Exhausted,
}

//------------ ResolveError --------------------------------------------------

/// A query to the resolver collaborator failed.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The client transport failed.
    #[error("{0}")]
    Request(#[from] request::Error),

    /// The response could not be parsed.
    #[error("malformed response: {0}")]
    Parse(#[from] ParseError),

    /// The query name could not be encoded.
    #[error("invalid query name: {0}")]
    QueryName(#[from] domain::base::name::NameError),

    /// A name in the response could not be represented.
    #[error("unusable name in response: {0}")]
    Name(#[from] NameError),

    /// The query message could not be assembled.
    #[error("cannot compose query message")]
    Compose,

    /// The server answered with an error.
    #[error("server responded with {0}")]
    Rcode(Rcode),

    /// No response arrived in time.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The built-in trust anchor could not be loaded.
    #[error("invalid trust anchor: {0}")]
    TrustAnchor(#[from] domain::validator::context::Error),

    /// There are no upstream servers to send queries to.
    #[error("no upstream servers available")]
    NoUpstream,

    /// An I/O error occured.
    #[error(transparent)]
    Io(#[from] io::Error),
}

//------------ ProbeError ----------------------------------------------------

/// A single NSEC probe failed.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// No probe name can be derived from the current name.
    #[error("cannot derive probe name: {0}")]
    Name(#[from] NameError),

    /// The resolver returned no reply at all.
    #[error("empty response")]
    EmptyResponse,

    /// The reply was not DNSSEC-secure.
    ///
    /// Either the zone isn’t signed or the resolver cannot validate it. In
    /// both cases the zone cannot be walked.
    #[error("response is not DNSSEC-secure, is the zone signed?")]
    Unsecured,

    /// The reply didn’t contain any NSEC records.
    #[error("no NSEC records in response")]
    MissingNsec,

    /// An NSEC record lacked a usable next name.
    #[error("NSEC record without a usable next name")]
    MalformedNsec,

    /// The query itself failed.
    #[error("query failed: {0}")]
    Resolve(#[from] ResolveError),
}

impl ProbeError {
    /// Returns whether retrying the probe may succeed.
    ///
    /// Only an insecure zone and a name space that has run out are
    /// permanent. Everything else is a hiccup of the network, the
    /// resolver, or the server.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ProbeError::Name(_) | ProbeError::Unsecured)
    }
}

//------------ ConfigError ---------------------------------------------------

/// The command line describes no usable walk.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid zone '{name}': {source}")]
    Zone { name: String, source: NameError },

    #[error("invalid start name '{name}': {source}")]
    Start { name: String, source: NameError },

    #[error("start name {start} is not within zone {zone}")]
    StartOutsideZone { start: String, zone: String },

    #[error("--start cannot be combined with a parallelism above 1")]
    StartWithParallel,

    #[error("parallelism must be between 1 and 36, got {0}")]
    Parallelism(usize),

    #[error("invalid server address '{0}'")]
    Server(String),

    #[error("retry delays must be positive and the maximum not below the initial delay")]
    RetryDelays,
}

//------------ Error ---------------------------------------------------------

/// Any error that stops the program before or outside of a walk.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Name(#[from] NameError),

    #[error("cannot set up resolver: {0}")]
    Resolve(#[from] ResolveError),

    #[error("cannot write output: {0}")]
    Io(#[from] io::Error),
}

//============ Testing =======================================================
