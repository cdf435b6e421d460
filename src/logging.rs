/// log4rs setup for the binaries.  The library itself only uses the `log`
/// macros.
use std::path::Path;

use anyhow::Result;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

pub const DEFAULT_CONFIG_FILE: &str = "config/log4rs.yml";

const CONSOLE_PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%S%.3f)} {l:5} {t} - {m}{n}";

/// load the log config file if it exists, otherwise log to the console
pub fn init(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        log4rs::init_file(path, Default::default())?;
        log::info!("logging configured from {}", path.display());
    } else {
        log4rs::init_config(console_config(LevelFilter::Info)?)?;
        log::info!("no {}, logging to the console", path.display());
    }

    Ok(())
}

pub fn console_config(level: LevelFilter) -> Result<Config> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(CONSOLE_PATTERN)))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))?;

    Ok(config)
}
