//! I/O adapters: configuration, persistence, network, host processes and
//! message catalogs.

pub mod config;
pub mod fetcher;
pub mod host;
pub mod messages;
pub mod paths;
pub mod persist;
pub mod process;
