//! Create-or-skip decision per note.
//!
//! A note is skipped when the destination already holds a page with the same
//! fingerprint, or when an earlier note in this run was already planned for
//! creation with it. Edited notes hash differently and are created as new
//! pages; nothing is ever updated in place.

use std::collections::HashSet;

use crate::error::Result;
use crate::notion::PageStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Create,
    /// `page_id` is `None` when the duplicate was seen earlier in this run.
    Skip { page_id: Option<String> },
}

#[derive(Default)]
pub struct DedupGate {
    planned: HashSet<String>,
}

impl DedupGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `fingerprint`. A `Create` is remembered, so the same
    /// fingerprint classifies as `Skip` for the rest of the run.
    pub async fn decide(&mut self, store: &dyn PageStore, fingerprint: &str) -> Result<Decision> {
        if self.planned.contains(fingerprint) {
            return Ok(Decision::Skip { page_id: None });
        }
        if let Some(existing) = store.find_by_fingerprint(fingerprint).await? {
            return Ok(Decision::Skip {
                page_id: Some(existing.page_id),
            });
        }
        self.planned.insert(fingerprint.to_string());
        Ok(Decision::Create)
    }

    /// Forget a planned creation that did not happen, so a later duplicate
    /// gets another chance.
    pub fn release(&mut self, fingerprint: &str) {
        self.planned.remove(fingerprint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::Block;
    use crate::models::{CanonicalNote, RemoteRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OneExisting {
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl PageStore for OneExisting {
        async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<RemoteRecord>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok((fingerprint == "old").then(|| RemoteRecord {
                page_id: "page-1".into(),
                fingerprint: fingerprint.into(),
            }))
        }

        async fn create_page(&self, _note: &CanonicalNote, _blocks: &[Block]) -> Result<String> {
            unreachable!("the gate never creates pages")
        }
    }

    #[tokio::test]
    async fn existing_page_is_skipped() {
        let store = OneExisting {
            lookups: AtomicUsize::new(0),
        };
        let mut gate = DedupGate::new();
        assert_eq!(
            gate.decide(&store, "old").await.unwrap(),
            Decision::Skip {
                page_id: Some("page-1".into())
            }
        );
        assert_eq!(gate.decide(&store, "new").await.unwrap(), Decision::Create);
    }

    #[tokio::test]
    async fn duplicate_within_run_skipped_without_lookup() {
        let store = OneExisting {
            lookups: AtomicUsize::new(0),
        };
        let mut gate = DedupGate::new();
        assert_eq!(gate.decide(&store, "new").await.unwrap(), Decision::Create);
        assert_eq!(
            gate.decide(&store, "new").await.unwrap(),
            Decision::Skip { page_id: None }
        );
        assert_eq!(store.lookups.load(Ordering::SeqCst), 1);

        gate.release("new");
        assert_eq!(gate.decide(&store, "new").await.unwrap(), Decision::Create);
    }
}
