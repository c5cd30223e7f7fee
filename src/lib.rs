pub mod cli;
pub mod dedupe;
pub mod error;
pub mod logging;
pub mod migrate;
pub mod providers;
pub mod util;

pub use error::{MigrateError, ParseError};
