//! Size substitution performed by redirected construction sites.
//!
//! - [`decide`] / [`create_custom_vector`] - the pure substitution rule
//! - [`SharedSettings`] / [`SettingsProvider`] - where the rule reads its configuration
//! - [`MapSizeSettings`] - persisted preferences and their sanitization

mod decision;
mod settings;

pub use decision::{create_custom_vector, create_with, decide, IntVec3, SENTINEL};
pub use settings::{
    global_settings, MapSizeSettings, SettingsProvider, SharedSettings, SizingMode,
    SizingSnapshot, CUSTOM_SELECTION, DEFAULT_MAP_SIZE, MAX_MAP_DIMENSION, MIN_MAP_DIMENSION,
};
