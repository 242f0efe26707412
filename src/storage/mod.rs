//! Capture persistence

mod capture_store;

pub use capture_store::{classify_mime, CaptureStore, NewCapture, CAPTURE_UPDATE_CAPACITY};
