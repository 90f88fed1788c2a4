use clap::builder::styling::{AnsiColor, Effects, Styles};

/// Help styling shared by the CLI.
pub fn get_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Cyan.on_default())
}

/// Map the `-v` flag count to a tracing level.
pub fn verbose_level_to_trace(level: Option<log::Level>) -> &'static tracing::Level {
    match level {
        Some(log::Level::Error) => &tracing::Level::WARN,
        Some(log::Level::Warn) => &tracing::Level::INFO,
        Some(log::Level::Info) => &tracing::Level::DEBUG,
        Some(log::Level::Debug) | Some(log::Level::Trace) => &tracing::Level::TRACE,
        None => &tracing::Level::ERROR,
    }
}

/// Install the global fmt subscriber, logging to stderr so the report on
/// stdout stays parseable.
pub fn logging_setup(level: &tracing::Level) {
    tracing_subscriber::fmt()
        .with_max_level(*level)
        .with_writer(std::io::stderr)
        .init();
}
