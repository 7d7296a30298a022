//! PAC driven outbound connection dispatch.
//!
//! A PAC script is fetched, rewritten so that calls reaching DNS-backed
//! helpers are awaited, compiled into an isolated interpreter and evaluated
//! per request. Its answer drives an ordered fallback chain over direct,
//! HTTP(S) and SOCKS transports.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;
