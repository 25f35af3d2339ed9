//! Optional log output for hosts without their own subscriber.
//!
//! The library itself only emits `tracing` events. Hosts that want the
//! panel's traffic on stderr call [`init`] once, usually with
//! `LoadConfig::enable_debug_log`.

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Level used for a given debug flag.
pub fn level(debug: bool) -> Level {
    if debug {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Install a compact stderr subscriber. `RUST_LOG` overrides the level.
///
/// Returns false when a global subscriber was already installed.
pub fn init(debug: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default().add_directive(LevelFilter::from_level(level(debug)).into())
    });
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_follows_debug_flag() {
        assert_eq!(level(true), Level::DEBUG);
        assert_eq!(level(false), Level::INFO);
    }

    #[test]
    fn test_second_init_is_refused() {
        init(false);
        assert!(!init(true));
    }
}
