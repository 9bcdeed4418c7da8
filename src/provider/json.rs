//! JSON file paper provider.
//!
//! Reads a dump of paper records, either a top-level array or an object with
//! a `papers` array. Field names follow the upstream export (camelCase), with
//! snake_case aliases accepted.
//!
//! ```json
//! [{
//!   "id": "2401.00001",
//!   "title": "...",
//!   "abstract": "...",
//!   "authors": ["Ada Lovelace", {"name": "Alan Turing", "affiliation": "NPL"}],
//!   "category": "cs.CL",
//!   "publishedDate": "2024-01-02",
//!   "citationCount": 12,
//!   "githubUrls": ["https://github.com/org/repo"],
//!   "hasDeepAnalysis": true,
//!   "datasetMentions": ["SQuAD"],
//!   "difficulty": "advanced",
//!   "embedding": [0.1, 0.2]
//! }]
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{PaperProvider, ProviderError, ProviderResult};
use crate::models::{Author, Difficulty, Paper, PublishedDate};

/// Author entry as it appears in exports: a bare name or a full object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AuthorRecord {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        affiliation: Option<String>,
    },
}

impl From<AuthorRecord> for Author {
    fn from(record: AuthorRecord) -> Self {
        match record {
            AuthorRecord::Name(name) => Author::new(name),
            AuthorRecord::Full { name, affiliation } => Author { name, affiliation },
        }
    }
}

/// Raw paper record before normalization.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperRecord {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract", alias = "abstract_text")]
    pub abstract_text: String,
    #[serde(default)]
    authors: Vec<AuthorRecord>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, alias = "published_date", alias = "published")]
    pub published_date: Option<String>,
    #[serde(default, alias = "citation_count")]
    pub citation_count: Option<u64>,
    #[serde(default, alias = "github_urls")]
    pub github_urls: Vec<String>,
    #[serde(default, alias = "has_deep_analysis")]
    pub has_deep_analysis: bool,
    #[serde(default, alias = "dataset_mentions")]
    pub dataset_mentions: Vec<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

impl PaperRecord {
    /// Convert into a `Paper`. Unrecognized difficulty labels are dropped
    /// rather than failing the record.
    pub fn into_paper(self) -> Paper {
        let difficulty = match self.difficulty.as_deref() {
            Some(raw) => match raw.parse::<Difficulty>() {
                Ok(d) => Some(d),
                Err(e) => {
                    warn!("Paper {}: ignoring {}", self.id, e);
                    None
                }
            },
            None => None,
        };

        let published = PublishedDate::from_optional(self.published_date.as_deref());
        if let PublishedDate::DateUnknown { raw: Some(raw) } = &published {
            debug!("Paper {}: unparseable published date '{}'", self.id, raw);
        }

        Paper {
            id: self.id,
            title: self.title,
            authors: self.authors.into_iter().map(Author::from).collect(),
            abstract_text: self.abstract_text,
            category: self.category.unwrap_or_default(),
            published,
            citation_count: self.citation_count.unwrap_or(0),
            github_urls: self.github_urls,
            has_deep_analysis: self.has_deep_analysis,
            dataset_mentions: self.dataset_mentions,
            difficulty,
            embedding: self.embedding.filter(|v| !v.is_empty()),
            scores: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Document {
    List(Vec<PaperRecord>),
    Wrapped { papers: Vec<PaperRecord> },
}

/// Provider backed by a JSON file, parsed once at construction.
#[derive(Debug)]
pub struct JsonFilePaperProvider {
    path: PathBuf,
    name: String,
    papers: Vec<Paper>,
}

impl JsonFilePaperProvider {
    /// Load and parse a JSON dump.
    ///
    /// # Errors
    /// `Io` if the file cannot be read, `Malformed` if it is not a paper dump
    pub async fn from_file(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref().to_path_buf();
        let content = tokio::fs::read_to_string(&path).await?;
        let papers = Self::parse(&content)?;
        let name = format!("JSON file {}", path.display());
        Ok(Self { path, name, papers })
    }

    /// Parse a JSON document into papers.
    pub fn parse(content: &str) -> ProviderResult<Vec<Paper>> {
        let document: Document = serde_json::from_str(content)
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let records = match document {
            Document::List(records) => records,
            Document::Wrapped { papers } => papers,
        };
        Ok(records.into_iter().map(PaperRecord::into_paper).collect())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PaperProvider for JsonFilePaperProvider {
    async fn fetch_papers(&self) -> ProviderResult<Vec<Paper>> {
        Ok(self.papers.clone())
    }

    async fn count_papers(&self) -> ProviderResult<usize> {
        Ok(self.papers.len())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
