//! ASIS core crate - configuration, domain entities, errors and clock.
//!
//! Every other crate in the workspace depends on this one. It holds no I/O
//! beyond reading and writing the TOML configuration file.

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::AsisConfig;
pub use error::{AsisError, Result};
pub use types::*;
