//! In-memory Paper Store.
//!
//! Backs tests and fixture-driven deployments. Papers are kept in id order so
//! `get_all_papers` is deterministic.

use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use super::{PaperStorage, ScoreUpdate, StorageError, StorageResult};
use crate::embedding::normalize_text;
use crate::models::{EmbeddingConfig, Paper};

#[derive(Default)]
struct MemoryState {
    papers: BTreeMap<String, Paper>,
    titles: HashSet<String>,
    config: Option<EmbeddingConfig>,
}

/// Paper Store held entirely in process memory.
#[derive(Default)]
pub struct InMemoryStorage {
    state: RwLock<MemoryState>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `papers`, skipping duplicates.
    pub fn with_papers(papers: impl IntoIterator<Item = Paper>) -> Self {
        let storage = Self::new();
        if let Ok(mut state) = storage.state.write() {
            for paper in papers {
                let title = normalize_text(&paper.title);
                if state.papers.contains_key(&paper.id) || !state.titles.insert(title) {
                    continue;
                }
                state.papers.insert(paper.id.clone(), paper);
            }
        }
        storage
    }

    fn read(&self) -> StorageResult<std::sync::RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| StorageError::Other("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> StorageResult<std::sync::RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| StorageError::Other("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl PaperStorage for InMemoryStorage {
    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn store_config(&self, config: &EmbeddingConfig) -> StorageResult<()> {
        self.write()?.config = Some(config.clone());
        Ok(())
    }

    async fn get_config(&self) -> StorageResult<Option<EmbeddingConfig>> {
        Ok(self.read()?.config.clone())
    }

    async fn insert_paper(&self, paper: &Paper) -> StorageResult<()> {
        let mut state = self.write()?;
        if state.papers.contains_key(&paper.id) {
            return Err(StorageError::DuplicateEntry(format!("id '{}'", paper.id)));
        }
        let title = normalize_text(&paper.title);
        if state.titles.contains(&title) {
            return Err(StorageError::DuplicateEntry(format!("title '{}'", paper.title)));
        }
        state.titles.insert(title);
        state.papers.insert(paper.id.clone(), paper.clone());
        Ok(())
    }

    async fn exists_by_title(&self, normalized_title: &str) -> StorageResult<bool> {
        Ok(self.read()?.titles.contains(normalized_title))
    }

    async fn get_all_papers(&self) -> StorageResult<Vec<Paper>> {
        Ok(self.read()?.papers.values().cloned().collect())
    }

    async fn get_paper_by_id(&self, id: &str) -> StorageResult<Paper> {
        self.read()?
            .papers
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("Paper {} not found", id)))
    }

    async fn count_papers(&self) -> StorageResult<usize> {
        Ok(self.read()?.papers.len())
    }

    async fn update_scores(&self, updates: &[ScoreUpdate]) -> StorageResult<usize> {
        let mut state = self.write()?;
        let mut updated = 0;
        for update in updates {
            if let Some(paper) = state.papers.get_mut(&update.paper_id) {
                paper.scores = Some(update.scores.clone());
                updated += 1;
            }
        }
        Ok(updated)
    }
}
