//! Testing utilities and harness for Trellis

pub mod fetcher;
pub mod harness;
pub mod logger;

pub use fetcher::{MemoryFetcher, MemorySfcLoader};
pub use harness::TestApp;
pub use logger::{captured_logs, logs_at, CapturedLog};
pub use log::Level;

pub mod prelude {
    pub use crate::fetcher::*;
    pub use crate::harness::*;
    pub use crate::logger::*;
}
