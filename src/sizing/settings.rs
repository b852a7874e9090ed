//! Map-size configuration and the process-wide snapshot provider.
//!
//! Configuration reaches the decision logic as an immutable [`SizingSnapshot`] behind an
//! [`Arc`]. Writers replace the whole snapshot at once; readers clone the `Arc`. A reader
//! therefore always sees either the old or the new snapshot in full, never a mix of the
//! two.

use std::sync::{Arc, PoisonError, RwLock};

/// Smallest custom dimension accepted from persisted settings.
pub const MIN_MAP_DIMENSION: i32 = 101;
/// Largest custom dimension accepted from persisted settings.
pub const MAX_MAP_DIMENSION: i32 = 600;
/// Default for every size setting.
pub const DEFAULT_MAP_SIZE: i32 = 250;
/// `selected_map_size` value meaning "use the custom width and height".
pub const CUSTOM_SELECTION: i32 = -1;

/// How a sentinel construction is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingMode {
    /// Use the configured custom width and height
    Automatic,
    /// Use this size for both horizontal axes
    Fixed(i32),
}

/// Immutable view of the sizing configuration at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizingSnapshot {
    /// Resolution mode
    pub mode: SizingMode,
    /// Custom width, used in [`SizingMode::Automatic`]
    pub custom_width: i32,
    /// Custom height, used in [`SizingMode::Automatic`]
    pub custom_height: i32,
}

impl SizingSnapshot {
    /// Snapshot resolving to the custom dimensions.
    #[must_use]
    pub fn automatic(custom_width: i32, custom_height: i32) -> Self {
        SizingSnapshot {
            mode: SizingMode::Automatic,
            custom_width,
            custom_height,
        }
    }

    /// Snapshot resolving to a square of `size`.
    #[must_use]
    pub fn fixed(size: i32) -> Self {
        SizingSnapshot {
            mode: SizingMode::Fixed(size),
            custom_width: DEFAULT_MAP_SIZE,
            custom_height: DEFAULT_MAP_SIZE,
        }
    }
}

/// Read access to the current sizing configuration.
pub trait SettingsProvider: Send + Sync {
    /// The current snapshot, `None` when no configuration is available.
    fn snapshot(&self) -> Option<Arc<SizingSnapshot>>;
}

/// Thread-safe holder of the current [`SizingSnapshot`].
///
/// # Examples
///
/// ```rust
/// use cilpatch::sizing::{SettingsProvider, SharedSettings, SizingSnapshot};
///
/// let settings = SharedSettings::new();
/// assert!(settings.snapshot().is_none());
///
/// settings.publish(SizingSnapshot::fixed(300));
/// assert_eq!(settings.snapshot().as_deref(), Some(&SizingSnapshot::fixed(300)));
/// ```
#[derive(Debug, Default)]
pub struct SharedSettings {
    current: RwLock<Option<Arc<SizingSnapshot>>>,
}

impl SharedSettings {
    /// Creates a provider with no configuration published.
    #[must_use]
    pub const fn new() -> Self {
        SharedSettings {
            current: RwLock::new(None),
        }
    }

    /// Replaces the current snapshot.
    pub fn publish(&self, snapshot: SizingSnapshot) {
        let snapshot = Arc::new(snapshot);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }

    /// Removes the current snapshot.
    pub fn clear(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl SettingsProvider for SharedSettings {
    fn snapshot(&self) -> Option<Arc<SizingSnapshot>> {
        // Values are whole Arcs, so a poisoned lock still holds a consistent snapshot
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

static GLOBAL_SETTINGS: SharedSettings = SharedSettings::new();

/// The process-wide provider consulted by [`crate::sizing::create_custom_vector`].
#[must_use]
pub fn global_settings() -> &'static SharedSettings {
    &GLOBAL_SETTINGS
}

/// Persisted map-size preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapSizeSettings {
    /// Chosen standard size, or [`CUSTOM_SELECTION`] for custom dimensions
    pub selected_map_size: i32,
    /// Custom width
    pub custom_width: i32,
    /// Custom height
    pub custom_height: i32,
}

impl Default for MapSizeSettings {
    fn default() -> Self {
        MapSizeSettings {
            selected_map_size: DEFAULT_MAP_SIZE,
            custom_width: DEFAULT_MAP_SIZE,
            custom_height: DEFAULT_MAP_SIZE,
        }
    }
}

impl MapSizeSettings {
    /// Settings with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the custom dimensions are selected.
    #[must_use]
    pub fn is_custom(&self) -> bool {
        self.selected_map_size == CUSTOM_SELECTION
    }

    /// Copy with custom dimensions clamped to
    /// [`MIN_MAP_DIMENSION`]..=[`MAX_MAP_DIMENSION`], as applied after loading.
    #[must_use]
    pub fn sanitized(self) -> Self {
        let clamp = |value: i32| value.clamp(MIN_MAP_DIMENSION, MAX_MAP_DIMENSION);
        let width = clamp(self.custom_width);
        let height = clamp(self.custom_height);
        if width != self.custom_width || height != self.custom_height {
            log::warn!(
                "custom map size {}x{} clamped to {width}x{height}",
                self.custom_width,
                self.custom_height
            );
        }

        MapSizeSettings {
            custom_width: width,
            custom_height: height,
            ..self
        }
    }

    /// The snapshot these settings translate to, `None` if no size is usable.
    #[must_use]
    pub fn to_snapshot(&self) -> Option<SizingSnapshot> {
        let mode = match self.selected_map_size {
            CUSTOM_SELECTION => SizingMode::Automatic,
            size if size > 0 => SizingMode::Fixed(size),
            _ => return None,
        };
        Some(SizingSnapshot {
            mode,
            custom_width: self.custom_width,
            custom_height: self.custom_height,
        })
    }

    /// Publishes these settings to `provider`, clearing it when no size is usable.
    pub fn publish_to(&self, provider: &SharedSettings) {
        match self.to_snapshot() {
            Some(snapshot) => provider.publish(snapshot),
            None => provider.clear(),
        }
    }
}
