//! Versioned score snapshots.
//!
//! A [`ScoreSnapshot`] is an immutable, fully scored view of the corpus plus
//! the indexes built from it. The recompute loop builds a new snapshot off
//! to the side and publishes it with a single pointer swap; request handlers
//! grab the current `Arc` once and read only from it, so a request can never
//! observe half of one recompute and half of another.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::index::{InvertedIndex, VectorStore};
use crate::models::{NoveltyType, Paper};

/// One consistent corpus state.
#[derive(Debug)]
pub struct ScoreSnapshot {
    version: u64,
    computed_at: DateTime<Utc>,
    papers: Vec<Paper>,
    by_id: HashMap<String, usize>,
    keyword: Arc<InvertedIndex>,
    vectors: Arc<VectorStore>,
    novelty_distribution: BTreeMap<NoveltyType, usize>,
}

impl ScoreSnapshot {
    /// Build a snapshot from (normally already scored) papers.
    pub fn build(version: u64, computed_at: DateTime<Utc>, mut papers: Vec<Paper>) -> Self {
        papers.sort_by(|a, b| a.id.cmp(&b.id));
        papers.dedup_by(|a, b| a.id == b.id);

        let by_id = papers
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.clone(), i))
            .collect();
        let keyword = Arc::new(InvertedIndex::build(&papers));
        let vectors = Arc::new(VectorStore::build(&papers));

        let mut novelty_distribution: BTreeMap<NoveltyType, usize> =
            NoveltyType::ALL.iter().map(|t| (*t, 0)).collect();
        for paper in &papers {
            *novelty_distribution.entry(paper.novelty_type()).or_default() += 1;
        }

        Self {
            version,
            computed_at,
            papers,
            by_id,
            keyword,
            vectors,
            novelty_distribution,
        }
    }

    /// The state before the first recompute: version 0, no papers.
    pub fn empty() -> Self {
        Self::build(0, DateTime::<Utc>::default(), Vec::new())
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn computed_at(&self) -> DateTime<Utc> {
        self.computed_at
    }

    /// Papers in id order.
    pub fn papers(&self) -> &[Paper] {
        &self.papers
    }

    pub fn get(&self, id: &str) -> Option<&Paper> {
        self.by_id.get(id).map(|&i| &self.papers[i])
    }

    pub fn len(&self) -> usize {
        self.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }

    pub fn keyword_index(&self) -> Arc<InvertedIndex> {
        Arc::clone(&self.keyword)
    }

    pub fn vectors(&self) -> Arc<VectorStore> {
        Arc::clone(&self.vectors)
    }

    /// Paper count per novelty type over the whole corpus; every type is present.
    pub fn novelty_distribution(&self) -> &BTreeMap<NoveltyType, usize> {
        &self.novelty_distribution
    }
}

/// Holder of the current snapshot.
#[derive(Debug)]
pub struct SnapshotStore {
    current: RwLock<Arc<ScoreSnapshot>>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(ScoreSnapshot::empty())
    }
}

impl SnapshotStore {
    pub fn new(initial: ScoreSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// The snapshot to use for the whole of one request.
    pub fn current(&self) -> Arc<ScoreSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// Version the next published snapshot should carry.
    pub fn next_version(&self) -> u64 {
        self.current().version() + 1
    }

    /// Swap in `snapshot` if it is newer than the current one.
    ///
    /// Returns false (and keeps the current snapshot) for stale versions.
    pub fn publish(&self, snapshot: ScoreSnapshot) -> bool {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if snapshot.version() <= guard.version() {
            return false;
        }
        *guard = Arc::new(snapshot);
        true
    }
}
