//! Engine configuration.

/// Tuning knobs for the build pass and the per-packet matcher.
///
/// The defaults mirror a production deployment; [`EngineConfig::testing`]
/// keeps build logging out of test output.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Payload-size boundary between the two dsize buckets. A packet with
    /// payload length `<= dsize_threshold` resolves through the small
    /// bucket, anything larger through the big one.
    pub dsize_threshold: u16,

    /// Route signatures that match on address/port/protocol alone through
    /// the prefix-hash fast path instead of the group tables.
    ///
    /// Disabling this folds ip-only signatures back into the regular
    /// grouping pass; results are identical, dispatch is slower.
    pub enable_ip_only: bool,

    /// Suppress build-time logging.
    pub quiet: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dsize_threshold: 100,
            enable_ip_only: true,
            quiet: false,
        }
    }
}

impl EngineConfig {
    /// Configuration for tests: quiet build.
    pub fn testing() -> Self {
        Self {
            quiet: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.dsize_threshold, 100);
        assert!(config.enable_ip_only);
        assert!(!config.quiet);
    }

    #[test]
    fn test_testing_preset_is_quiet() {
        assert!(EngineConfig::testing().quiet);
    }
}
