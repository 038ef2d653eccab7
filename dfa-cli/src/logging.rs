//! Terminal output shared by the `dfa` commands.

use ansi_term::Colour;
use std::env;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

pub fn println_red_err(txt: &str) {
    tracing::error!("{}", Colour::Red.paint(txt));
}

pub fn println_yellow_err(txt: &str) {
    tracing::warn!("{}", Colour::Yellow.paint(txt));
}

pub fn println_green_err(txt: &str) {
    tracing::info!("{}", Colour::Green.paint(txt));
}

const LOG_FILTER: &str = "RUST_LOG";

#[derive(Default)]
pub struct TracingSubscriberOptions {
    pub verbosity: u8,
    pub silent: bool,
}

impl TracingSubscriberOptions {
    fn level_filter(&self) -> Option<LevelFilter> {
        if self.silent {
            return Some(LevelFilter::OFF);
        }
        match self.verbosity {
            0 => None,
            1 => Some(LevelFilter::DEBUG),
            _ => Some(LevelFilter::TRACE),
        }
    }
}

/// Log to stderr so the analysis report on stdout stays machine readable.
///
/// `RUST_LOG` sets the minimum level, `INFO` by default.  `-v` and `--silent` override it.
pub fn init_tracing_subscriber(options: TracingSubscriberOptions) {
    let env_filter = match env::var_os(LOG_FILTER) {
        Some(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::new("info"),
    };

    let builder = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_ansi(true)
        .with_level(false)
        .with_file(false)
        .with_line_number(false)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr);

    if let Some(level_filter) = options.level_filter() {
        builder.with_max_level(level_filter).init();
    } else {
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_wins_over_verbosity() {
        let options = TracingSubscriberOptions {
            verbosity: 2,
            silent: true,
        };
        assert_eq!(options.level_filter(), Some(LevelFilter::OFF));
    }

    #[test]
    fn verbosity_levels() {
        let level = |verbosity| {
            TracingSubscriberOptions {
                verbosity,
                silent: false,
            }
            .level_filter()
        };
        assert_eq!(level(0), None);
        assert_eq!(level(1), Some(LevelFilter::DEBUG));
        assert_eq!(level(3), Some(LevelFilter::TRACE));
    }
}
