//! What a redirected construction site actually builds.
//!
//! The factory a redirected constructor call lands in receives the original arguments.
//! When both horizontal arguments carry [`SENTINEL`], the caller asked for "the default
//! map size", and the configured size is substituted. Any other arguments construct
//! exactly what they always did.

use std::fmt;

use crate::sizing::settings::{
    global_settings, SettingsProvider, SizingMode, SizingSnapshot,
};

/// Argument value meaning "use the configured size".
pub const SENTINEL: i32 = -1;

/// Integer 3-component vector, the value a redirected construction produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IntVec3 {
    /// Horizontal extent
    pub x: i32,
    /// Vertical component, never altered by substitution
    pub y: i32,
    /// Depth extent
    pub z: i32,
}

impl IntVec3 {
    /// Creates a vector.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        IntVec3 { x, y, z }
    }
}

impl fmt::Display for IntVec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Resolves construction arguments against a configuration snapshot.
///
/// # Examples
///
/// ```rust
/// use cilpatch::sizing::{decide, IntVec3, SizingSnapshot};
///
/// let custom = SizingSnapshot::automatic(300, 275);
/// assert_eq!(decide(-1, 0, -1, Some(&custom)), IntVec3::new(300, 0, 275));
/// assert_eq!(decide(150, 0, 150, Some(&custom)), IntVec3::new(150, 0, 150));
/// assert_eq!(decide(-1, 0, -1, None), IntVec3::new(-1, 0, -1));
/// ```
#[must_use]
pub fn decide(x: i32, y: i32, z: i32, snapshot: Option<&SizingSnapshot>) -> IntVec3 {
    if x != SENTINEL || z != SENTINEL {
        return IntVec3::new(x, y, z);
    }

    match snapshot.map(|snapshot| (snapshot.mode, snapshot)) {
        Some((SizingMode::Automatic, snapshot)) => {
            IntVec3::new(snapshot.custom_width, y, snapshot.custom_height)
        }
        Some((SizingMode::Fixed(size), _)) if size > 0 => IntVec3::new(size, y, size),
        _ => IntVec3::new(x, y, z),
    }
}

/// [`decide`] against a specific provider.
#[must_use]
pub fn create_with(provider: &dyn SettingsProvider, x: i32, y: i32, z: i32) -> IntVec3 {
    let snapshot = provider.snapshot();
    decide(x, y, z, snapshot.as_deref())
}

/// The factory redirected constructor calls invoke, reading the process-wide settings.
#[must_use]
pub fn create_custom_vector(x: i32, y: i32, z: i32) -> IntVec3 {
    create_with(global_settings(), x, y, z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sizing::settings::SharedSettings;

    #[test]
    fn test_sentinel_requires_both_axes() {
        let snapshot = SizingSnapshot::fixed(300);
        assert_eq!(decide(-1, 5, 10, Some(&snapshot)), IntVec3::new(-1, 5, 10));
        assert_eq!(decide(10, 5, -1, Some(&snapshot)), IntVec3::new(10, 5, -1));
        assert_eq!(decide(-1, 5, -1, Some(&snapshot)), IntVec3::new(300, 5, 300));
    }

    #[test]
    fn test_unusable_fixed_size_falls_through() {
        for size in [0, -1, -250] {
            let snapshot = SizingSnapshot::fixed(size);
            assert_eq!(decide(-1, 0, -1, Some(&snapshot)), IntVec3::new(-1, 0, -1));
        }
    }

    #[test]
    fn test_y_is_preserved() {
        let snapshot = SizingSnapshot::automatic(400, 120);
        for y in [i32::MIN, -1, 0, 7, i32::MAX] {
            assert_eq!(decide(-1, y, -1, Some(&snapshot)).y, y);
        }
    }

    #[test]
    fn test_create_with_provider() {
        let provider = SharedSettings::new();
        assert_eq!(create_with(&provider, -1, 0, -1), IntVec3::new(-1, 0, -1));

        provider.publish(SizingSnapshot::automatic(300, 275));
        assert_eq!(create_with(&provider, -1, 0, -1), IntVec3::new(300, 0, 275));
        assert_eq!(create_with(&provider, 1, 2, 3), IntVec3::new(1, 2, 3));
    }

    #[test]
    fn test_display() {
        assert_eq!(IntVec3::new(250, 1, 250).to_string(), "(250, 1, 250)");
    }
}
