//! Logging setup for embedders that want this crate's `log::info!`/`warn!`/
//! `error!` calls to actually go somewhere. The engine itself only ever
//! calls into the `log` facade; wiring up a concrete logger is optional and
//! left to the embedding application, same as the teacher's server binary
//! does it in its own `main`.

use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

/// Initializes a simple terminal logger at the given level. Intended for
/// examples, tests, and small standalone tools embedding this crate; larger
/// applications will typically set up their own `log` backend instead.
pub fn init(level: LevelFilter) -> crate::error::Result<()> {
    TermLogger::init(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto)
        .map_err(|err| crate::error::Error::InvalidOptions(err.to_string()))
}
