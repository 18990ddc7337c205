//! Property-based tests for path, comment, and stream invariants
//!
//! Uses proptest to check invariants across many random inputs

use novuspack::io::decode_package;
use novuspack::path::normalize_path;
use novuspack::{
    sanitize_comment, validate_bytes, AccessMode, Package, PackageConfig, TagValue,
    ValidationOptions,
};
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_normalize_is_idempotent(path in "[a-z./\\\\]{1,40}") {
        if let Ok(once) = normalize_path(&path) {
            prop_assert!(once.starts_with('/'));
            prop_assert!(!once.contains("//"));
            prop_assert_eq!(normalize_path(&once).unwrap(), once);
        }
    }

    #[test]
    fn prop_sanitized_comment_respects_ceiling(text in "[ -~\r\n]{0,200}", max in 1usize..256) {
        match sanitize_comment(&text, max) {
            Ok(clean) => {
                prop_assert!(clean.len() <= max);
                prop_assert!(!clean.as_str().contains('\r'));
                // Sanitizing is stable
                let again = sanitize_comment(clean.as_str(), max).unwrap();
                prop_assert_eq!(again.as_str(), clean.as_str());
                prop_assert_eq!(again.digest(), clean.digest());
            }
            Err(_) => {}
        }
    }

    #[test]
    fn prop_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = decode_package(&bytes);
        let _ = validate_bytes(&bytes, &ValidationOptions::new());
    }

    #[test]
    fn prop_written_packages_validate(
        files in prop::collection::btree_map("[a-z]{1,8}", prop::collection::vec(any::<u8>(), 0..64), 1..12),
        tag in prop::option::of(any::<i64>()),
        comment in prop::option::of("[a-zA-Z0-9 ]{1,40}"),
    ) {
        let pkg = Package::create(PackageConfig::default()).unwrap();
        for (name, data) in &files {
            pkg.add_file(&format!("/dir/{}", name), data.clone()).unwrap();
            if let Some(value) = tag {
                pkg.set_tag(&format!("/dir/{}", name), "n", value).unwrap();
            }
        }
        if let Some(text) = &comment {
            pkg.set_comment(text).unwrap();
        }

        let bytes = pkg.to_bytes().unwrap();
        let report = validate_bytes(&bytes, &ValidationOptions::new()).unwrap();
        prop_assert!(report.is_valid(), "{:?}", report.failures);

        let loaded = Package::from_bytes(&bytes, AccessMode::ReadOnly).unwrap();
        prop_assert_eq!(loaded.header().unwrap().file_count as usize, files.len());
        prop_assert_eq!(loaded.to_bytes().unwrap(), bytes);
        if let Some(value) = tag {
            prop_assert_eq!(
                loaded.get_files_by_tag("n", &TagValue::Integer(value)).unwrap().len(),
                files.len()
            );
        }
    }

    #[test]
    fn prop_single_byte_payload_flip_is_detected(
        data in prop::collection::vec(any::<u8>(), 1..64),
        idx in any::<prop::sample::Index>(),
    ) {
        let pkg = Package::create(PackageConfig::default()).unwrap();
        pkg.add_file("/payload.bin", data.clone()).unwrap();
        let mut bytes = pkg.to_bytes().unwrap();

        // The payload is the tail of the stream when there is no comment
        let pos = bytes.len() - data.len() + idx.index(data.len());
        bytes[pos] ^= 0x01;

        let report = validate_bytes(&bytes, &ValidationOptions::new()).unwrap();
        prop_assert!(!report.status.checksum_valid);
    }
}
