//! Logger initialization, split out of `main` for testability — a
//! single-call `simple_logger` setup.

use crate::config::LogLevel;

pub fn init(level: LogLevel) -> anyhow::Result<()> {
    simple_logger::init_with_level(level.as_level())?;
    Ok(())
}
