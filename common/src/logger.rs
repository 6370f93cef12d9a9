use env_logger::{Builder, Env, Target};

pub fn output_level() -> log::LevelFilter {
    log::LevelFilter::Info
}

/// Configures stderr logging for a single driver; `RUST_LOG` overrides
/// `level`. Safe to call more than once, later calls are no-ops.
pub fn setup_logging(name: &str, level: log::LevelFilter) {
    let mut builder = Builder::from_env(Env::default().default_filter_or(level.as_str()));
    builder.target(Target::Stderr).format_timestamp_micros();
    if builder.try_init().is_ok() {
        log::debug!("{}: logging initialized", name);
    }
}
