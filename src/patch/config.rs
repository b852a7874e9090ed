//! Configuration for the patch engine.

/// Default number of instructions searched backward from a constructor call for the
/// address-of-local anchor.
pub const DEFAULT_ANCHOR_WINDOW: usize = 12;

/// Default distance from the window edge at which an anchor is reported as borderline.
pub const DEFAULT_BOUNDARY_MARGIN: usize = 2;

/// Configuration for the patch engine.
///
/// Controls the search limits of the rules and whether the engine verifies that a rule
/// preserved the stream's control-flow metadata before committing its edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Backward search window for address-of-local anchors (default: 12).
    pub anchor_window: usize,

    /// Anchors found more than `anchor_window - boundary_margin` instructions before
    /// their call are reported as near the window boundary (default: 2).
    pub boundary_margin: usize,

    /// Reject rule results that lost labels or exception blocks, or left branches
    /// pointing at unattached labels (default: true).
    pub verify_integrity: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            anchor_window: DEFAULT_ANCHOR_WINDOW,
            boundary_margin: DEFAULT_BOUNDARY_MARGIN,
            verify_integrity: true,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the anchor search window.
    #[must_use]
    pub fn with_anchor_window(mut self, window: usize) -> Self {
        self.anchor_window = window;
        self
    }

    /// Sets the boundary warning margin.
    #[must_use]
    pub fn with_boundary_margin(mut self, margin: usize) -> Self {
        self.boundary_margin = margin;
        self
    }

    /// Enables or disables post-rule integrity verification.
    #[must_use]
    pub fn with_integrity_checks(mut self, enabled: bool) -> Self {
        self.verify_integrity = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new();
        assert_eq!(config.anchor_window, 12);
        assert_eq!(config.boundary_margin, 2);
        assert!(config.verify_integrity);
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::new()
            .with_anchor_window(20)
            .with_boundary_margin(0)
            .with_integrity_checks(false);
        assert_eq!(config.anchor_window, 20);
        assert_eq!(config.boundary_margin, 0);
        assert!(!config.verify_integrity);
    }
}
