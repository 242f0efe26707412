//! # proxyctl
//!
//! Control layer for an intercepting HTTP(S) proxy engine.
//!
//! ## Features
//!
//! - Start/stop lifecycle with a single engine per session
//! - Custom interception rules resolved by identifier
//! - Rule persistence on disk
//! - Root CA provisioning
//! - Read access to captured traffic
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 CLI (proxyctl) / UI                      │
//! ├─────────────────────────────────────────────────────────┤
//! │                  ControlApi session                      │
//! │  ┌────────────┐  ┌──────────┐  ┌─────────┐  ┌────────┐  │
//! │  │ Controller │──│  Rules   │  │ Capture │  │  CA    │  │
//! │  │  (engine)  │  │ registry │  │ (SQLite)│  │ bridge │  │
//! │  └────────────┘  └──────────┘  └─────────┘  └────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod capture;
pub mod config;
pub mod error;
pub mod models;
pub mod platform;
pub mod provisioning;
pub mod proxy;
pub mod rules;
pub mod storage;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
