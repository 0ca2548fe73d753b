//! Deterministic rule engines used by the query stages.
//!
//! - [`skills`]: collapses free-text skill mentions to canonical identifiers
//! - [`period`]: parses raw period strings into year ranges
//! - [`temporal`]: narrows experience records by a temporal connector

pub mod period;
pub mod skills;
pub mod temporal;

pub use period::{Period, parse_period};
pub use skills::canonicalize;
pub use temporal::{Connector, apply_temporal_rule, filter_experiences, resolve_reference_year};
