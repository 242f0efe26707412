//! Proxy engine lifecycle
//!
//! The engine contract, the controller that owns the running engine, and the
//! root CA the engine would sign interception certificates with.

pub mod cert_manager;
pub mod controller;
pub mod engine;

pub use controller::{local_ip_address, ProxyController, ProxyStatus, StartOptions};
