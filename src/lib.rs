//! Listing the names of a DNSSEC-signed zone.
//!
//! A zone signed with DNSSEC using NSEC records proves the non-existence of
//! a name by returning the record that spans the gap the name would fall
//! into. Such a record names the next existing name of the zone. By asking
//! for a name just after one known to exist, one thus learns the following
//! name, and by repeating this the whole zone can be enumerated. This is
//! called walking the zone.
//!
//! This crate provides the pieces for walking a zone:
//!
//! * [name] contains the domain names of a walk with their canonical
//!   ordering and the derivation of the next name to ask for,
//! * [probe] finds the next name through a [resolver],
//! * [walker] walks a zone step by step, with help from [retry] and [rate],
//! * [partition] splits a walk into slices walked concurrently.
//!
//! The [upstream] module provides the resolver used by the `zonewalk`
//! binary which talks to actual DNS servers, found via [discover] if asked
//! to. [config] and [logging] provide the remaining bits of the binary.

pub mod config;
pub mod discover;
pub mod error;
pub mod logging;
pub mod name;
pub mod partition;
pub mod probe;
pub mod rate;
pub mod resolver;
pub mod retry;
pub mod upstream;
pub mod walker;

pub use self::error::Error;
pub use self::name::DomainName;
pub use self::partition::PartitionPlanner;
pub use self::resolver::Resolver;
pub use self::walker::{EndReason, WalkSummary, ZoneWalker};
