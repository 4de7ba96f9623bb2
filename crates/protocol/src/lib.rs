//! Wire types for the remote execution endpoint and cluster directory.
//!
//! This crate contains the serde-serializable types exchanged with the
//! interactive execution endpoint (sessions, statements, logs) and with the
//! cluster directory. These types represent the "protocol layer": the shapes
//! of data as they appear on the wire.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: behavior is limited to state classification predicates
//! * 1:1 with the REST payloads the endpoint produces and accepts
//! * Stable: changes only when the wire protocol changes
//!
//! Session and job lifecycle logic lives in `shortline-runtime`.

pub mod cluster;
pub mod log;
pub mod session;
pub mod statement;

pub use cluster::*;
pub use log::*;
pub use session::*;
pub use statement::*;
