//! Source discovery.
//!
//! Stickies has stored notes in two layouts over the years:
//!
//! | Kind | Default location |
//! |------|------------------|
//! | legacy | `~/Library/StickiesDatabase` (one property-list file) |
//! | modern | `~/Library/Containers/com.apple.Stickies/Data/Library/Stickies` (`*.rtfd` bundles) |
//!
//! [`locate`] turns a requested [`SourceMode`] plus optional path overrides
//! into an ordered list of usable [`ResolvedSource`]s. Probing is read-only.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::bail;

use crate::config::SourcesConfig;
use crate::error::{ImportError, Result};

/// Saved-state descriptor file name inside the bundle directory.
pub const SAVED_STATE_FILE: &str = ".SavedStickiesState";

/// What the user asked for on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    Auto,
    Db,
    RtfDir,
}

impl SourceMode {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "auto" => Ok(SourceMode::Auto),
            "db" => Ok(SourceMode::Db),
            "rtf-dir" | "rtf_dir" => Ok(SourceMode::RtfDir),
            other => bail!("Unknown mode: '{}'. Must be auto, db, or rtf-dir.", other),
        }
    }
}

/// Which parser a resolved source needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Legacy,
    Modern,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Legacy => f.write_str("db"),
            SourceKind::Modern => f.write_str("rtf-dir"),
        }
    }
}

/// An existing source location and the mode used to read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub kind: SourceKind,
    pub path: PathBuf,
    /// Saved-state descriptor for modern sources.
    pub state_path: Option<PathBuf>,
}

/// Per-mode default locations, normally derived from the home directory.
#[derive(Debug, Clone, Default)]
pub struct DefaultPaths {
    pub db_path: Option<PathBuf>,
    pub rtf_dir: Option<PathBuf>,
}

impl DefaultPaths {
    pub fn system() -> Self {
        Self::under_home(dirs::home_dir().as_deref())
    }

    pub fn under_home(home: Option<&Path>) -> Self {
        match home {
            Some(home) => Self {
                db_path: Some(home.join("Library").join("StickiesDatabase")),
                rtf_dir: Some(
                    home.join("Library/Containers/com.apple.Stickies/Data/Library/Stickies"),
                ),
            },
            None => Self::default(),
        }
    }
}

/// Resolve the sources to read, in the order they should be tried.
///
/// Explicit modes return exactly one source. Auto mode returns every usable
/// candidate, legacy first, so the caller can fall back when a parser fails.
pub fn locate(
    mode: SourceMode,
    sources: &SourcesConfig,
    defaults: &DefaultPaths,
) -> Result<Vec<ResolvedSource>> {
    let db_path = sources.db_path.clone().or_else(|| defaults.db_path.clone());
    let rtf_dir = sources.rtf_dir.clone().or_else(|| defaults.rtf_dir.clone());

    // Overrides are checked only for the storage the mode will read.
    let overrides = match mode {
        SourceMode::Db => [sources.db_path.as_ref(), None],
        SourceMode::RtfDir => [None, sources.rtf_dir.as_ref()],
        SourceMode::Auto => [sources.db_path.as_ref(), sources.rtf_dir.as_ref()],
    };
    for explicit in overrides.into_iter().flatten() {
        if !explicit.exists() {
            return Err(ImportError::SourceNotFound(format!(
                "{} does not exist",
                explicit.display()
            )));
        }
    }

    let legacy = db_path.map(|path| ResolvedSource {
        kind: SourceKind::Legacy,
        path,
        state_path: None,
    });
    let modern = rtf_dir.map(|path| ResolvedSource {
        kind: SourceKind::Modern,
        state_path: Some(
            sources
                .state_path
                .clone()
                .unwrap_or_else(|| path.join(SAVED_STATE_FILE)),
        ),
        path,
    });

    match mode {
        SourceMode::Db => {
            let src = legacy.ok_or_else(|| {
                ImportError::SourceNotFound("no database path and no home directory".into())
            })?;
            if !src.path.is_file() {
                return Err(ImportError::SourceNotFound(format!(
                    "{} is not a file",
                    src.path.display()
                )));
            }
            Ok(vec![src])
        }
        SourceMode::RtfDir => {
            let src = modern.ok_or_else(|| {
                ImportError::SourceNotFound("no bundle directory and no home directory".into())
            })?;
            if !src.path.is_dir() {
                return Err(ImportError::SourceNotFound(format!(
                    "{} is not a directory",
                    src.path.display()
                )));
            }
            Ok(vec![src])
        }
        SourceMode::Auto => {
            let mut found = Vec::new();
            if let Some(src) = legacy.filter(|s| legacy_has_data(&s.path)) {
                tracing::debug!(path = %src.path.display(), "legacy database found");
                found.push(src);
            }
            if let Some(src) = modern.filter(|s| modern_has_bundles(&s.path)) {
                tracing::debug!(path = %src.path.display(), "bundle directory found");
                found.push(src);
            }
            if found.is_empty() {
                return Err(ImportError::SourceNotFound(
                    "neither a legacy database nor .rtfd bundles were found".into(),
                ));
            }
            Ok(found)
        }
    }
}

fn legacy_has_data(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

fn modern_has_bundles(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries
        .flatten()
        .any(|e| crate::bundle::is_bundle(&e.path()))
}

/// Print the resolved source(s) without importing anything.
pub fn print_sources(found: &[ResolvedSource]) {
    println!("{:<10} {:<8} PATH", "SOURCE", "MODE");
    for (i, src) in found.iter().enumerate() {
        let role = if i == 0 { "primary" } else { "fallback" };
        println!("{:<10} {:<8} {}", role, src.kind, src.path.display());
        if let Some(state) = &src.state_path {
            let note = if state.exists() { "" } else { " (missing)" };
            println!("{:<10} {:<8} {}{}", "", "state", state.display(), note);
        }
    }
}
