//! Saved-state descriptor parser.
//!
//! Modern Stickies keeps note color outside the `.rtfd` bundle, in a
//! property list next to the bundles. The file is usually XML:
//!
//! ```xml
//! <plist version="1.0">
//! <array>
//!   <dict>
//!     <key>UUID</key><string>4A1C…</string>
//!     <key>Color</key><integer>2</integer>
//!     <key>Frame</key><string>{{10, 20}, {250, 200}}</string>
//!   </dict>
//! </array>
//! </plist>
//! ```
//!
//! Any dictionary holding a `Color` integer contributes an entry, keyed by its
//! `UUID` string or, failing that, by the key it is stored under. Binary
//! property lists are accepted too; the `plist` crate detects the format.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use crate::error::{ImportError, Result};

/// Bundle identifier → color code.
pub type ColorMap = HashMap<String, i64>;

/// Read the descriptor at `path`.
pub fn parse_saved_state(path: &Path) -> Result<ColorMap> {
    let bytes = std::fs::read(path).map_err(|e| ImportError::from_io(path, e))?;
    parse_saved_state_bytes(path, &bytes)
}

/// Decode an in-memory descriptor in either plist format; `path` is only
/// used in error messages.
pub fn parse_saved_state_bytes(path: &Path, bytes: &[u8]) -> Result<ColorMap> {
    let root = plist::Value::from_reader(Cursor::new(bytes)).map_err(|e| {
        ImportError::MalformedSource {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;
    let mut map = ColorMap::new();
    collect(&root, None, &mut map);
    Ok(map)
}

fn collect(value: &plist::Value, parent_key: Option<&str>, map: &mut ColorMap) {
    match value {
        plist::Value::Array(items) => {
            for item in items {
                collect(item, None, map);
            }
        }
        plist::Value::Dictionary(dict) => {
            let color = dict.get("Color").and_then(plist::Value::as_signed_integer);
            let id = dict
                .get("UUID")
                .and_then(plist::Value::as_string)
                .or(parent_key);
            if let (Some(id), Some(color)) = (id, color) {
                map.insert(id.to_string(), color);
            }
            for (key, child) in dict.iter() {
                collect(child, Some(key.as_str()), map);
            }
        }
        _ => {}
    }
}
