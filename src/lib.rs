pub mod badge;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod notifications;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use engine::{ProcessReport, StepOutcome, Watcher};
pub use event::{BuildEvent, BuildStatus};
