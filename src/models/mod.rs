//! Data models shared by the controller, the rule store and the capture façade.

pub mod capture;
pub mod rule;

pub use capture::*;
pub use rule::*;
