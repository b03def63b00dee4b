// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `tracing` subscriber setup for hosts that do not install their own.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Map a native log level (2 = verbose … 6 = error, 7 = assert) to a filter.
/// Anything else leaves logging at `INFO`.
pub const fn level_from_native(level: i32) -> LevelFilter {
    match level {
        2 => LevelFilter::TRACE,
        3 => LevelFilter::DEBUG,
        4 => LevelFilter::INFO,
        5 => LevelFilter::WARN,
        6 | 7 => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    }
}

/// Install a global fmt subscriber on stderr at `level`. `RUST_LOG`
/// directives, when set, refine it. Returns false if a subscriber was already
/// installed.
pub fn init(level: LevelFilter) -> bool {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_levels_map_to_filters() {
        assert_eq!(level_from_native(2), LevelFilter::TRACE);
        assert_eq!(level_from_native(5), LevelFilter::WARN);
        assert_eq!(level_from_native(7), LevelFilter::ERROR);
        assert_eq!(level_from_native(-1), LevelFilter::INFO);
    }

    #[test]
    fn second_init_is_refused() {
        let _ = init(LevelFilter::WARN);
        assert!(!init(LevelFilter::DEBUG));
    }
}
