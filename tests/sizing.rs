//! Size substitution integration tests.
//!
//! Covers the decision rules a redirected construction site relies on and the
//! publish/read behavior of the settings provider under concurrent access.

use std::{sync::Arc, thread};

use cilpatch::sizing::{
    create_with, decide, IntVec3, MapSizeSettings, SettingsProvider, SharedSettings,
    SizingSnapshot, CUSTOM_SELECTION, SENTINEL,
};

#[test]
fn test_decision_rules() {
    let automatic = SizingSnapshot::automatic(300, 275);
    let fixed = SizingSnapshot::fixed(250);

    for y in [0, 1, 42] {
        assert_eq!(
            decide(SENTINEL, y, SENTINEL, Some(&automatic)),
            IntVec3::new(300, y, 275)
        );
        assert_eq!(
            decide(SENTINEL, y, SENTINEL, Some(&fixed)),
            IntVec3::new(250, y, 250)
        );
        for snapshot in [Some(&automatic), Some(&fixed), None] {
            assert_eq!(decide(150, y, 150, snapshot), IntVec3::new(150, y, 150));
        }
    }
}

#[test]
fn test_saved_settings_drive_factory() {
    let provider = SharedSettings::new();
    assert_eq!(
        create_with(&provider, SENTINEL, 0, SENTINEL),
        IntVec3::new(SENTINEL, 0, SENTINEL)
    );

    let saved = MapSizeSettings {
        selected_map_size: CUSTOM_SELECTION,
        custom_width: 900,
        custom_height: 40,
    }
    .sanitized();
    saved.publish_to(&provider);
    assert_eq!(
        create_with(&provider, SENTINEL, 0, SENTINEL),
        IntVec3::new(600, 0, 101)
    );

    MapSizeSettings {
        selected_map_size: 325,
        ..saved
    }
    .publish_to(&provider);
    assert_eq!(
        create_with(&provider, SENTINEL, 0, SENTINEL),
        IntVec3::new(325, 0, 325)
    );

    MapSizeSettings {
        selected_map_size: 0,
        ..saved
    }
    .publish_to(&provider);
    assert!(provider.snapshot().is_none());
}

#[test]
fn test_concurrent_readers_see_whole_snapshots() {
    let provider = Arc::new(SharedSettings::new());
    provider.publish(SizingSnapshot::automatic(300, 275));

    let writer = {
        let provider = Arc::clone(&provider);
        thread::spawn(move || {
            for round in 0..1_000 {
                if round % 2 == 0 {
                    provider.publish(SizingSnapshot::fixed(250));
                } else {
                    provider.publish(SizingSnapshot::automatic(300, 275));
                }
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let provider = Arc::clone(&provider);
            thread::spawn(move || {
                for _ in 0..1_000 {
                    let result = create_with(provider.as_ref(), SENTINEL, 7, SENTINEL);
                    assert!(
                        result == IntVec3::new(300, 7, 275) || result == IntVec3::new(250, 7, 250),
                        "torn snapshot produced {result}"
                    );
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}
