//! Fetch command scripts from remote text hosts and dispatch them line by
//! line to a command host.
//!
//! The crate keeps a strict split between pure logic and side effects:
//!
//! - **[`core`]**: Deterministic rules (line parsing, blocklist matching,
//!   reference resolution, error classification). No I/O.
//! - **[`io`]**: Config, persistence, HTTP fetch, child processes and
//!   message catalogs. Each side effect sits behind a trait so tests can
//!   swap in doubles.
//!
//! [`modes`] and [`store`] hold the shared mutable state. [`dispatch`] and
//! [`pipeline`] orchestrate one script run; [`commands`] is the user-facing
//! surface that ties them together.

pub mod commands;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod modes;
pub mod pipeline;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
