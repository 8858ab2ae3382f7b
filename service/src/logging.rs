use crate::config::Config;
use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// Dependencies whose output drowns out the broker's own logging at normal
/// levels. Trace keeps everything so wire-level debugging stays possible.
const NOISY_DEPENDENCIES: &[&str] = &["tower", "tracing", "hyper", "axum", "mio"];

/// Install the global terminal logger from the service config. Call once at
/// startup, before any state is constructed.
pub fn init(config: &Config) {
    TermLogger::init(
        config.log_level_filter,
        term_config(config.log_level_filter),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .expect("Failed to start simplelog");
}

fn term_config(level: LevelFilter) -> simplelog::Config {
    let mut builder = ConfigBuilder::new();
    builder.set_time_format_rfc3339();

    if level != LevelFilter::Trace {
        for dependency in NOISY_DEPENDENCIES {
            builder.add_filter_ignore_str(dependency);
        }
    }

    builder.build()
}
