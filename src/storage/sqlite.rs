//! SQLite storage implementation.
//!
//! This module provides a SQLite-based implementation of the `PaperStorage` trait.
//! It uses rusqlite for database access and stores embeddings as BLOBs.
//! Statements run on the blocking thread pool so a slow disk never stalls
//! request handlers.
//!
//! # Schema
//! - `config`: key/value pairs (embedding model name and dimension as JSON)
//! - `papers`: metadata columns, list fields as JSON text, the embedding as a
//!   little-endian f32 BLOB and the latest derived scores as JSON

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::{PaperStorage, ScoreUpdate, StorageError, StorageResult};
use crate::embedding::normalize_text;
use crate::models::{Author, Difficulty, EmbeddingConfig, Paper, PaperScores, PublishedDate};

const EMBEDDING_CONFIG_KEY: &str = "embedding_config";

const PAPER_COLUMNS: &str = "id, title, authors, abstract, category, published, citation_count, \
     github_urls, has_deep_analysis, dataset_mentions, difficulty, embedding, scores";

/// SQLite-backed Paper Store.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create a private in-memory database.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StorageError::ConnectionError("connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StorageError::Other(format!("storage task failed: {}", e)))?
    }

    fn create_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS papers (
                id TEXT PRIMARY KEY,
                normalized_title TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                authors TEXT NOT NULL,
                abstract TEXT NOT NULL,
                category TEXT NOT NULL,
                published TEXT NOT NULL,
                citation_count INTEGER NOT NULL,
                github_urls TEXT NOT NULL,
                has_deep_analysis INTEGER NOT NULL,
                dataset_mentions TEXT NOT NULL,
                difficulty TEXT,
                embedding BLOB,
                scores TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_papers_category ON papers(category);
            ",
        )
        .map_err(|e| StorageError::SchemaError(e.to_string()))
    }

    /// Serialize an embedding vector to little-endian bytes for BLOB storage.
    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Deserialize an embedding vector from BLOB bytes.
    fn deserialize_embedding(bytes: &[u8]) -> StorageResult<Vec<f32>> {
        if bytes.len() % 4 != 0 {
            return Err(StorageError::SerializationError(format!(
                "embedding blob length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    fn read_paper(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawPaperRow> {
        Ok(RawPaperRow {
            id: row.get(0)?,
            title: row.get(1)?,
            authors: row.get(2)?,
            abstract_text: row.get(3)?,
            category: row.get(4)?,
            published: row.get(5)?,
            citation_count: row.get(6)?,
            github_urls: row.get(7)?,
            has_deep_analysis: row.get(8)?,
            dataset_mentions: row.get(9)?,
            difficulty: row.get(10)?,
            embedding: row.get(11)?,
            scores: row.get(12)?,
        })
    }
}

/// Column values as stored, before JSON decoding.
struct RawPaperRow {
    id: String,
    title: String,
    authors: String,
    abstract_text: String,
    category: String,
    published: String,
    citation_count: i64,
    github_urls: String,
    has_deep_analysis: bool,
    dataset_mentions: String,
    difficulty: Option<String>,
    embedding: Option<Vec<u8>>,
    scores: Option<String>,
}

fn decode<T: serde::de::DeserializeOwned>(field: &str, text: &str) -> StorageResult<T> {
    serde_json::from_str(text)
        .map_err(|e| StorageError::SerializationError(format!("{}: {}", field, e)))
}

fn encode<T: serde::Serialize>(field: &str, value: &T) -> StorageResult<String> {
    serde_json::to_string(value)
        .map_err(|e| StorageError::SerializationError(format!("{}: {}", field, e)))
}

impl RawPaperRow {
    fn into_paper(self) -> StorageResult<Paper> {
        let authors: Vec<Author> = decode("authors", &self.authors)?;
        let published: PublishedDate = decode("published", &self.published)?;
        let github_urls: Vec<String> = decode("github_urls", &self.github_urls)?;
        let dataset_mentions: Vec<String> = decode("dataset_mentions", &self.dataset_mentions)?;
        let difficulty = self
            .difficulty
            .as_deref()
            .map(|d| d.parse::<Difficulty>())
            .transpose()
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        let embedding = self
            .embedding
            .as_deref()
            .map(SqliteStorage::deserialize_embedding)
            .transpose()?;
        let scores: Option<PaperScores> = self
            .scores
            .as_deref()
            .map(|s| decode("scores", s))
            .transpose()?;

        Ok(Paper {
            id: self.id,
            title: self.title,
            authors,
            abstract_text: self.abstract_text,
            category: self.category,
            published,
            citation_count: self.citation_count.max(0) as u64,
            github_urls,
            has_deep_analysis: self.has_deep_analysis,
            dataset_mentions,
            difficulty,
            embedding,
            scores,
        })
    }
}

#[async_trait]
impl PaperStorage for SqliteStorage {
    async fn initialize(&self) -> StorageResult<()> {
        self.with_conn(|conn| Self::create_schema(conn)).await
    }

    async fn store_config(&self, config: &EmbeddingConfig) -> StorageResult<()> {
        let value = encode("embedding_config", config)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO config (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![EMBEDDING_CONFIG_KEY, value],
            )
            .map_err(|e| StorageError::QueryError(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn get_config(&self) -> StorageResult<Option<EmbeddingConfig>> {
        self.with_conn(|conn| {
            let value: Option<String> = conn
                .query_row(
                    "SELECT value FROM config WHERE key = ?1",
                    params![EMBEDDING_CONFIG_KEY],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| StorageError::QueryError(e.to_string()))?;
            value.map(|v| decode("embedding_config", &v)).transpose()
        })
        .await
    }

    async fn insert_paper(&self, paper: &Paper) -> StorageResult<()> {
        let paper = paper.clone();
        let normalized_title = normalize_text(&paper.title);
        let authors = encode("authors", &paper.authors)?;
        let published = encode("published", &paper.published)?;
        let github_urls = encode("github_urls", &paper.github_urls)?;
        let dataset_mentions = encode("dataset_mentions", &paper.dataset_mentions)?;
        let scores = paper.scores.as_ref().map(|s| encode("scores", s)).transpose()?;
        let embedding = paper.embedding.as_deref().map(Self::serialize_embedding);

        self.with_conn(move |conn| {
            let result = conn.execute(
                "INSERT INTO papers (id, normalized_title, title, authors, abstract, category,
                    published, citation_count, github_urls, has_deep_analysis, dataset_mentions,
                    difficulty, embedding, scores)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    paper.id,
                    normalized_title,
                    paper.title,
                    authors,
                    paper.abstract_text,
                    paper.category,
                    published,
                    paper.citation_count as i64,
                    github_urls,
                    paper.has_deep_analysis,
                    dataset_mentions,
                    paper.difficulty.map(|d| d.as_str().to_string()),
                    embedding,
                    scores,
                ],
            );
            match result {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Err(StorageError::DuplicateEntry(format!(
                        "paper '{}' ({})",
                        paper.id, paper.title
                    )))
                }
                Err(e) => Err(StorageError::QueryError(e.to_string())),
            }
        })
        .await
    }

    async fn exists_by_title(&self, normalized_title: &str) -> StorageResult<bool> {
        let title = normalized_title.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM papers WHERE normalized_title = ?1)",
                params![title],
                |row| row.get::<_, bool>(0),
            )
            .map_err(|e| StorageError::QueryError(e.to_string()))
        })
        .await
    }

    async fn get_all_papers(&self) -> StorageResult<Vec<Paper>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {} FROM papers ORDER BY id", PAPER_COLUMNS))
                .map_err(|e| StorageError::QueryError(e.to_string()))?;
            let rows = stmt
                .query_map([], Self::read_paper)
                .map_err(|e| StorageError::QueryError(e.to_string()))?;

            let mut papers = Vec::new();
            for row in rows {
                let raw = row.map_err(|e| StorageError::QueryError(e.to_string()))?;
                papers.push(raw.into_paper()?);
            }
            Ok(papers)
        })
        .await
    }

    async fn get_paper_by_id(&self, id: &str) -> StorageResult<Paper> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let raw = conn
                .query_row(
                    &format!("SELECT {} FROM papers WHERE id = ?1", PAPER_COLUMNS),
                    params![id],
                    Self::read_paper,
                )
                .optional()
                .map_err(|e| StorageError::QueryError(e.to_string()))?
                .ok_or_else(|| StorageError::NotFound(format!("Paper {} not found", id)))?;
            raw.into_paper()
        })
        .await
    }

    async fn count_papers(&self) -> StorageResult<usize> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM papers", [], |row| row.get::<_, i64>(0))
                .map(|n| n.max(0) as usize)
                .map_err(|e| StorageError::QueryError(e.to_string()))
        })
        .await
    }

    async fn update_scores(&self, updates: &[ScoreUpdate]) -> StorageResult<usize> {
        let encoded: Vec<(String, String)> = updates
            .iter()
            .map(|u| Ok((u.paper_id.clone(), encode("scores", &u.scores)?)))
            .collect::<StorageResult<_>>()?;

        self.with_conn(move |conn| {
            let tx = conn
                .transaction()
                .map_err(|e| StorageError::QueryError(e.to_string()))?;
            let mut updated = 0;
            {
                let mut stmt = tx
                    .prepare("UPDATE papers SET scores = ?2 WHERE id = ?1")
                    .map_err(|e| StorageError::QueryError(e.to_string()))?;
                for (id, scores) in &encoded {
                    updated += stmt
                        .execute(params![id, scores])
                        .map_err(|e| StorageError::QueryError(e.to_string()))?;
                }
            }
            tx.commit()
                .map_err(|e| StorageError::QueryError(e.to_string()))?;
            Ok(updated)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ImpactScore, NoveltyClassification, NoveltyType, ReproducibilityScore,
    };
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn sample_paper(id: &str, title: &str) -> Paper {
        let mut paper = Paper::new(id, title, "We study things.");
        paper.authors = vec![Author::new("Ada Lovelace")];
        paper.category = "cs.LG".to_string();
        paper.published = PublishedDate::parse("2023-04-01");
        paper.citation_count = 42;
        paper.github_urls = vec!["https://github.com/org/repo".to_string()];
        paper.has_deep_analysis = true;
        paper.dataset_mentions = vec!["ImageNet".to_string()];
        paper.difficulty = Some(Difficulty::Advanced);
        paper.embedding = Some(vec![0.25, -1.5, 3.0]);
        paper
    }

    fn sample_scores() -> PaperScores {
        PaperScores {
            citation_velocity: Some(3.5),
            reproducibility: ReproducibilityScore {
                score: 7.0,
                signals: vec![],
            },
            novelty: NoveltyClassification {
                novelty_type: NoveltyType::Technique,
                cue_counts: BTreeMap::new(),
            },
            impact: ImpactScore {
                score: 6.0,
                components: vec![],
            },
            difficulty: Difficulty::Advanced,
            scored_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    async fn open_initialized() -> SqliteStorage {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.initialize().await.unwrap();
        storage
    }

    #[test]
    fn test_embedding_blob_layout() {
        let bytes = SqliteStorage::serialize_embedding(&[1.0, -2.5]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(SqliteStorage::deserialize_embedding(&bytes).unwrap(), vec![1.0, -2.5]);
        assert!(SqliteStorage::deserialize_embedding(&[0, 1, 2]).is_err());
    }

    #[tokio::test]
    async fn test_paper_survives_storage() {
        let storage = open_initialized().await;
        let paper = sample_paper("2304.00001", "Sparse Mixtures");
        storage.insert_paper(&paper).await.unwrap();

        let loaded = storage.get_paper_by_id("2304.00001").await.unwrap();
        assert_eq!(loaded.title, "Sparse Mixtures");
        assert_eq!(loaded.published, paper.published);
        assert_eq!(loaded.embedding, paper.embedding);
        assert_eq!(loaded.difficulty, Some(Difficulty::Advanced));
        assert!(loaded.scores.is_none());
    }

    #[tokio::test]
    async fn test_unknown_dates_are_preserved() {
        let storage = open_initialized().await;
        let mut paper = sample_paper("x", "Undated");
        paper.published = PublishedDate::parse("Invalid Date");
        storage.insert_paper(&paper).await.unwrap();

        let loaded = storage.get_paper_by_id("x").await.unwrap();
        assert_eq!(
            loaded.published,
            PublishedDate::DateUnknown {
                raw: Some("Invalid Date".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_duplicate_title_rejected() {
        let storage = open_initialized().await;
        storage.insert_paper(&sample_paper("a", "Same Title")).await.unwrap();
        let err = storage
            .insert_paper(&sample_paper("b", "same   title"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateEntry(_)));
        assert!(storage.exists_by_title("same title").await.unwrap());
    }

    #[tokio::test]
    async fn test_config_roundtrip_and_overwrite() {
        let storage = open_initialized().await;
        assert!(storage.get_config().await.unwrap().is_none());

        let config = EmbeddingConfig {
            model_name: "m".to_string(),
            dimension: 3,
        };
        storage.store_config(&config).await.unwrap();
        storage.store_config(&config).await.unwrap();
        assert_eq!(storage.get_config().await.unwrap(), Some(config));
    }

    #[tokio::test]
    async fn test_update_scores_skips_unknown_ids() {
        let storage = open_initialized().await;
        storage.insert_paper(&sample_paper("a", "One")).await.unwrap();

        let updated = storage
            .update_scores(&[
                ScoreUpdate {
                    paper_id: "a".to_string(),
                    scores: sample_scores(),
                },
                ScoreUpdate {
                    paper_id: "ghost".to_string(),
                    scores: sample_scores(),
                },
            ])
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let loaded = storage.get_paper_by_id("a").await.unwrap();
        assert_eq!(loaded.scores, Some(sample_scores()));
        assert_eq!(storage.count_papers().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atlas.db");
        {
            let storage = SqliteStorage::open(&path).unwrap();
            storage.initialize().await.unwrap();
            storage.insert_paper(&sample_paper("a", "One")).await.unwrap();
        }
        let reopened = SqliteStorage::open(&path).unwrap();
        reopened.initialize().await.unwrap();
        assert_eq!(reopened.count_papers().await.unwrap(), 1);
    }
}
