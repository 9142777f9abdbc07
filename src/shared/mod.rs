//! Shared modules used by the library, the CLI and test servers
//!
//! Configuration types and the wire framing live here so that both sides of a
//! connection agree on them.

pub mod config;
pub mod framing;
