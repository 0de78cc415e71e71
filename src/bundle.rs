//! Modern bundle-directory parser.
//!
//! Each note is a `<identifier>.rtfd` directory holding `TXT.rtf` plus any
//! attachments. Colors live in the saved-state descriptor, see
//! [`crate::saved_state`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::error::{ImportError, Result};
use crate::models::{RawNoteRecord, RawTimestamp};
use crate::saved_state::{self, ColorMap};

/// Rich-text payload inside every bundle.
pub const PAYLOAD_FILE: &str = "TXT.rtf";

/// Outcome of scanning a bundle directory.
#[derive(Debug, Default)]
pub struct BundleScan {
    /// Records sorted by identifier.
    pub records: Vec<RawNoteRecord>,
    /// Identifiers of bundles skipped for a missing or unreadable payload.
    pub missing_payload: Vec<String>,
    /// Whether colors came from a saved-state descriptor.
    pub colors_loaded: bool,
}

/// Whether `path` looks like a note bundle.
pub fn is_bundle(path: &Path) -> bool {
    path.is_dir()
        && path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("rtfd"))
            .unwrap_or(false)
}

/// Scan `root` for bundles and join them with colors from `state_path`.
pub fn scan_bundles(root: &Path, state_path: Option<&Path>) -> Result<BundleScan> {
    // Surface permission problems on the root itself rather than per entry.
    std::fs::read_dir(root).map_err(|e| ImportError::from_io(root, e))?;

    let (colors, colors_loaded) = load_colors(state_path);
    let mut scan = BundleScan {
        colors_loaded,
        ..Default::default()
    };

    let walker = WalkDir::new(root).min_depth(1).max_depth(1);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("skipping unreadable entry in {}: {}", root.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if !is_bundle(path) {
            continue;
        }
        let identifier = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        match read_bundle(path, &identifier, &colors) {
            Ok(record) => scan.records.push(record),
            Err(e) => {
                tracing::warn!("skipping bundle {}: {}", identifier, e);
                scan.missing_payload.push(identifier);
            }
        }
    }

    // Sort for deterministic ordering
    scan.records.sort_by(|a, b| identifier_of(a).cmp(identifier_of(b)));
    scan.missing_payload.sort();

    tracing::debug!(
        bundles = scan.records.len(),
        missing_payload = scan.missing_payload.len(),
        colors = colors.len(),
        "scanned bundle directory"
    );
    Ok(scan)
}

fn load_colors(state_path: Option<&Path>) -> (ColorMap, bool) {
    let Some(path) = state_path else {
        return (ColorMap::new(), false);
    };
    match saved_state::parse_saved_state(path) {
        Ok(map) => (map, true),
        Err(e) => {
            tracing::warn!("colors unavailable, using Unknown: {}", e);
            (ColorMap::new(), false)
        }
    }
}

fn read_bundle(path: &Path, identifier: &str, colors: &ColorMap) -> std::io::Result<RawNoteRecord> {
    let payload_path = path.join(PAYLOAD_FILE);
    let rtf = std::fs::read(&payload_path)?;
    let metadata = std::fs::metadata(path)?;

    Ok(RawNoteRecord::Modern {
        identifier: identifier.to_string(),
        bundle_path: PathBuf::from(path),
        rtf,
        color_code: colors.get(identifier).copied(),
        created: metadata.created().ok().map(to_timestamp),
        modified: metadata.modified().ok().map(to_timestamp),
    })
}

fn to_timestamp(t: std::time::SystemTime) -> RawTimestamp {
    RawTimestamp::Instant(DateTime::<Utc>::from(t))
}

fn identifier_of(record: &RawNoteRecord) -> &str {
    match record {
        RawNoteRecord::Modern { identifier, .. } => identifier,
        RawNoteRecord::Legacy { .. } => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn bundle(root: &Path, id: &str, rtf: Option<&str>) {
        let dir = root.join(format!("{}.rtfd", id));
        fs::create_dir_all(&dir).unwrap();
        if let Some(rtf) = rtf {
            fs::write(dir.join(PAYLOAD_FILE), rtf).unwrap();
        }
    }

    fn state(root: &Path, entries: &[(&str, i64)]) -> PathBuf {
        let dicts: String = entries
            .iter()
            .map(|(id, c)| {
                format!(
                    "<dict><key>UUID</key><string>{}</string><key>Color</key><integer>{}</integer></dict>",
                    id, c
                )
            })
            .collect();
        let path = root.join(crate::locator::SAVED_STATE_FILE);
        fs::write(
            &path,
            format!("<plist version=\"1.0\"><array>{}</array></plist>", dicts),
        )
        .unwrap();
        path
    }

    #[test]
    fn sorted_with_colors_and_missing_payload() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        bundle(root, "C", Some(r"{\rtf1 third}"));
        bundle(root, "A", Some(r"{\rtf1 first}"));
        bundle(root, "B", None);
        fs::write(root.join("notes.txt"), "not a bundle").unwrap();
        let state_path = state(root, &[("A", 1), ("C", 3)]);

        let scan = scan_bundles(root, Some(&state_path)).unwrap();
        assert!(scan.colors_loaded);
        assert_eq!(scan.missing_payload, vec!["B".to_string()]);
        let ids: Vec<&str> = scan.records.iter().map(identifier_of).collect();
        assert_eq!(ids, vec!["A", "C"]);
        match &scan.records[0] {
            RawNoteRecord::Modern {
                color_code,
                modified,
                ..
            } => {
                assert_eq!(*color_code, Some(1));
                assert!(modified.is_some());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn timestamps_come_from_the_bundle_directory() {
        let tmp = TempDir::new().unwrap();
        bundle(tmp.path(), "A", Some(r"{\rtf1 x}"));
        let dir = tmp.path().join("A.rtfd");
        let payload = fs::File::options()
            .write(true)
            .open(dir.join(PAYLOAD_FILE))
            .unwrap();
        let old = std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000_000);
        payload.set_modified(old).unwrap();

        let scan = scan_bundles(tmp.path(), None).unwrap();
        let dir_modified = fs::metadata(&dir).unwrap().modified().unwrap();
        match &scan.records[0] {
            RawNoteRecord::Modern { modified, .. } => {
                assert_eq!(*modified, Some(to_timestamp(dir_modified)));
                assert_ne!(*modified, Some(to_timestamp(old)));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn missing_state_means_unknown_colors() {
        let tmp = TempDir::new().unwrap();
        bundle(tmp.path(), "A", Some(r"{\rtf1 x}"));
        let scan = scan_bundles(tmp.path(), Some(&tmp.path().join("absent"))).unwrap();
        assert!(!scan.colors_loaded);
        assert!(matches!(
            &scan.records[0],
            RawNoteRecord::Modern { color_code: None, .. }
        ));
    }

    #[test]
    fn missing_root_is_not_found() {
        let err = scan_bundles(Path::new("/nonexistent/stickies"), None).unwrap_err();
        assert!(matches!(err, ImportError::SourceNotFound(_)));
    }

    #[test]
    fn bundle_detection() {
        let tmp = TempDir::new().unwrap();
        bundle(tmp.path(), "X", None);
        assert!(is_bundle(&tmp.path().join("X.rtfd")));
        assert!(!is_bundle(&tmp.path().join("Y.rtfd")));
        assert!(!is_bundle(tmp.path()));
    }
}
