//! Property tests for key resolution and checksum copying
//!
//! Run with: cargo test --package stowage-core --test properties

use proptest::prelude::*;
use std::path::Path;
use stowage_core::{copy_with_checksum, resolve_path, Checksum};

fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("..".to_string()),
        Just(".".to_string()),
        Just(String::new()),
        "[a-z0-9_]{1,8}",
    ]
}

proptest! {
    #[test]
    fn resolved_paths_stay_under_root(segments in prop::collection::vec(segment(), 0..8)) {
        let root = Path::new("/srv/stowage");
        let key = segments.join("/");
        if let Ok(path) = resolve_path(root, &key) {
            prop_assert!(path.starts_with(root));
            prop_assert!(!path.components().any(|c| c.as_os_str() == ".."));
        }
    }

    #[test]
    fn keys_climbing_above_root_are_rejected(depth in 1usize..5, name in "[a-z]{1,8}") {
        let key = format!("{}{}", "../".repeat(depth), name);
        let err = resolve_path(Path::new("/srv/stowage"), &key).unwrap_err();
        prop_assert!(err.is_invalid_path());
    }

    #[test]
    fn checksum_is_independent_of_chunk_size(
        data in prop::collection::vec(any::<u8>(), 0..20_000),
        chunk_size in 1usize..4096,
    ) {
        let mut copied = Vec::new();
        let checksum = copy_with_checksum(&mut &data[..], &mut copied, chunk_size).unwrap();
        prop_assert_eq!(&copied, &data);
        prop_assert_eq!(checksum, Checksum::compute(&data));
    }
}
