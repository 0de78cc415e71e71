//! Import pipeline orchestration.
//!
//! Coordinates the full flow: locate → parse → normalize → convert → dedup →
//! upload. Notes are handled strictly one at a time; a failing note is
//! counted and the run moves on.

use anyhow::Result;
use chrono::Utc;

use crate::bundle;
use crate::config::Config;
use crate::convert::{convert_note, RichTextConverter};
use crate::dedup::{DedupGate, Decision};
use crate::error::ImportError;
use crate::legacy;
use crate::locator::{self, DefaultPaths, ResolvedSource, SourceKind, SourceMode};
use crate::models::RawNoteRecord;
use crate::normalize::Normalizer;
use crate::notion::PageStore;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub mode: SourceMode,
    /// Look up and classify, but never create pages.
    pub dry_run: bool,
    /// Process only the first N notes in source order.
    pub limit: Option<usize>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            mode: SourceMode::Auto,
            dry_run: false,
            limit: None,
        }
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    /// Notes read from the source, before `--limit`.
    pub found: usize,
    pub processed: usize,
    /// Pages created (or, in a dry run, that would be created).
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
    pub malformed: usize,
    pub missing_payload: usize,
    pub degraded: usize,
}

/// Raw records from the first source that parsed.
#[derive(Debug)]
pub struct LoadedRecords {
    pub source: ResolvedSource,
    pub records: Vec<RawNoteRecord>,
    pub malformed: usize,
    pub missing_payload: usize,
}

/// Parse candidates in order, moving to the next one when a parser fails in
/// a way that allows it or finds no notes.
pub fn load_records(candidates: &[ResolvedSource]) -> crate::error::Result<LoadedRecords> {
    let mut last_err = None;

    for (i, source) in candidates.iter().enumerate() {
        let has_next = i + 1 < candidates.len();
        match read_source(source) {
            Ok(loaded) if loaded.records.is_empty() && has_next => {
                tracing::warn!(
                    "{} source has no notes, trying {}",
                    source.kind,
                    candidates[i + 1].kind
                );
            }
            Ok(loaded) => return Ok(loaded),
            Err(e) if e.allows_fallback() && has_next => {
                tracing::warn!(
                    "{} source unusable, trying {}: {}",
                    source.kind,
                    candidates[i + 1].kind,
                    e
                );
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| ImportError::SourceNotFound("no source candidates".into())))
}

fn read_source(source: &ResolvedSource) -> crate::error::Result<LoadedRecords> {
    match source.kind {
        SourceKind::Legacy => {
            let parsed = legacy::parse_legacy_db(&source.path)?;
            Ok(LoadedRecords {
                source: source.clone(),
                records: parsed.records,
                malformed: parsed.malformed.len(),
                missing_payload: 0,
            })
        }
        SourceKind::Modern => {
            let scan = bundle::scan_bundles(&source.path, source.state_path.as_deref())?;
            Ok(LoadedRecords {
                source: source.clone(),
                records: scan.records,
                malformed: 0,
                missing_payload: scan.missing_payload.len(),
            })
        }
    }
}

/// Run one import and print its summary.
///
/// Fails only when no source can be located or read; per-note problems are
/// counted in the returned [`Summary`].
pub async fn run_import(
    config: &Config,
    options: &ImportOptions,
    defaults: &DefaultPaths,
    store: &dyn PageStore,
    converter: &dyn RichTextConverter,
) -> Result<Summary> {
    let candidates = locator::locate(options.mode, &config.sources, defaults)?;
    let mut loaded = load_records(&candidates)?;

    let mut summary = Summary {
        found: loaded.records.len(),
        malformed: loaded.malformed,
        missing_payload: loaded.missing_payload,
        ..Default::default()
    };

    // Apply --limit
    if let Some(lim) = options.limit {
        loaded.records.truncate(lim);
    }

    tracing::info!(
        source = %loaded.source.path.display(),
        mode = %loaded.source.kind,
        notes = loaded.records.len(),
        converter = converter.name(),
        "starting import"
    );

    let mode_label = if options.dry_run { " (dry-run)" } else { "" };
    println!(
        "import {} {}{}",
        loaded.source.kind,
        loaded.source.path.display(),
        mode_label
    );

    let normalizer = Normalizer::new(config, Utc::now());
    let mut gate = DedupGate::new();

    for (i, raw) in loaded.records.iter().enumerate() {
        let note = normalizer.normalize(raw, i + 1);
        summary.processed += 1;

        let decision = match gate.decide(store, &note.fingerprint).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(note = %note.source_label, "lookup failed: {}", e);
                summary.failed += 1;
                continue;
            }
        };

        if let Decision::Skip { page_id } = decision {
            summary.skipped += 1;
            if options.dry_run {
                println!("  would skip: {} ({})", note.title, note.source_label);
            }
            tracing::debug!(
                note = %note.source_label,
                page = page_id.as_deref().unwrap_or("this run"),
                "already imported"
            );
            continue;
        }

        let conversion = convert_note(converter, &note).await;
        if conversion.degraded {
            summary.degraded += 1;
        }

        if options.dry_run {
            println!("  would create: {} ({})", note.title, note.source_label);
            summary.created += 1;
            continue;
        }

        match store.create_page(&note, &conversion.blocks).await {
            Ok(page_id) => {
                tracing::info!(note = %note.source_label, page = %page_id, "created");
                summary.created += 1;
            }
            Err(e) => {
                tracing::warn!(note = %note.source_label, "create failed: {}", e);
                gate.release(&note.fingerprint);
                summary.failed += 1;
            }
        }
    }

    print_summary(&summary, options.dry_run);
    Ok(summary)
}

fn print_summary(summary: &Summary, dry_run: bool) {
    println!("  found: {} notes", summary.found);
    println!("  processed: {}", summary.processed);
    if dry_run {
        println!("  would create: {}", summary.created);
        println!("  would skip: {}", summary.skipped);
    } else {
        println!("  created: {}", summary.created);
        println!("  skipped: {}", summary.skipped);
    }
    println!("  failed: {}", summary.failed);
    println!("  malformed records: {}", summary.malformed);
    println!("  missing payloads: {}", summary.missing_payload);
    println!("  degraded conversions: {}", summary.degraded);
    println!("ok");
}
