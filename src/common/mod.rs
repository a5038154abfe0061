//! Common traits and test helpers used across the echo-server library

pub mod test_utils;
pub mod traits;

pub use test_utils::{Observed, RecordingObserver, spawn_test_server};
pub use traits::EchoServerTrait;
