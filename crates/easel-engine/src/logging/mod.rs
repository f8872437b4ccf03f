//! Logger initialization for hosts that embed the renderer.
//!
//! The engine itself only talks to the `log` facade; binaries call
//! [`init_logging`] once to install `env_logger`.

mod init;

pub use init::{init_logging, LoggingConfig};
