//! URL handling module for Moebius
//!
//! This module provides the URL canonicalizer (decomposition into dedup-key
//! components and reconstruction), link resolution, and host pattern
//! matching used by the fetch policy.

mod canonical;
mod matcher;

pub use canonical::{parse, resolve, unparse, UrlComponents};
pub use matcher::{host_matches, host_matches_any};
