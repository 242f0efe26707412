//! proxyctl control API
//!
//! The operations a UI or the command line calls. Everything here goes
//! through a [`control_api::ControlApi`] session handle.

pub mod control_api;

pub use control_api::{init_core, ControlApi, Rejection, Reply, StartReply};
