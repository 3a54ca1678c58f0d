//! Pair discovery over a corpus directory.
//!
//! Layout: `<corpus>/<requests_subdir>/<id>.json` pairs with
//! `<corpus>/<responses_subdir>/<id>.json`. The file stem is the identifier.
//! Discovery lists both sides once; parsing happens lazily while iterating, and
//! a [`CorpusScan`] can be iterated any number of times.

use crate::config::CorpusConfig;
use crate::errors::LoadError;
use crate::model::{SuggestionRequest, SuggestionResponse};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// A parsed pair ready for evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPair {
    pub identifier: String,
    pub request: SuggestionRequest,
    pub response: SuggestionResponse,
}

/// A pair that could not be loaded. Never fatal for a batch.
#[derive(Debug)]
pub struct PairLoadFailure {
    pub identifier: String,
    pub error: LoadError,
}

/// One discovered identifier and which sides exist for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorpusEntry {
    Matched {
        identifier: String,
        request_path: PathBuf,
        response_path: PathBuf,
    },
    OrphanRequest {
        identifier: String,
        path: PathBuf,
    },
    OrphanResponse {
        identifier: String,
        path: PathBuf,
    },
}

impl CorpusEntry {
    pub fn identifier(&self) -> &str {
        match self {
            Self::Matched { identifier, .. }
            | Self::OrphanRequest { identifier, .. }
            | Self::OrphanResponse { identifier, .. } => identifier,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }

    fn load(&self) -> Result<LoadedPair, PairLoadFailure> {
        let fail = |error| PairLoadFailure {
            identifier: self.identifier().to_string(),
            error,
        };
        match self {
            Self::Matched {
                identifier,
                request_path,
                response_path,
            } => {
                let request = load_request(request_path).map_err(fail)?;
                let response = read_json::<SuggestionResponse>(response_path).map_err(fail)?;
                Ok(LoadedPair {
                    identifier: identifier.clone(),
                    request,
                    response,
                })
            }
            Self::OrphanRequest { identifier, .. } => Err(fail(LoadError::MissingResponse {
                identifier: identifier.clone(),
            })),
            Self::OrphanResponse { identifier, .. } => Err(fail(LoadError::MissingRequest {
                identifier: identifier.clone(),
            })),
        }
    }
}

/// Discovers pairs in a corpus directory.
#[derive(Debug, Clone)]
pub struct PairLoader {
    requests_dir: PathBuf,
    responses_dir: PathBuf,
}

impl PairLoader {
    /// Loader for `corpus_dir` using the subdirectory names from `cfg`.
    pub fn new(corpus_dir: &Path, cfg: &CorpusConfig) -> Self {
        Self {
            requests_dir: corpus_dir.join(&cfg.requests_subdir),
            responses_dir: corpus_dir.join(&cfg.responses_subdir),
        }
    }

    pub fn requests_dir(&self) -> &Path {
        &self.requests_dir
    }

    pub fn responses_dir(&self) -> &Path {
        &self.responses_dir
    }

    /// List both sides and match them by stem. Entries are sorted by identifier.
    pub fn scan(&self) -> Result<CorpusScan, LoadError> {
        let requests = list_json_stems(&self.requests_dir)?;
        let mut responses = list_json_stems(&self.responses_dir)?;

        let ids: BTreeSet<String> = requests.keys().chain(responses.keys()).cloned().collect();
        let mut entries = Vec::with_capacity(ids.len());
        for identifier in ids {
            let entry = match (requests.get(&identifier), responses.remove(&identifier)) {
                (Some(request_path), Some(response_path)) => CorpusEntry::Matched {
                    identifier,
                    request_path: request_path.clone(),
                    response_path,
                },
                (Some(path), None) => CorpusEntry::OrphanRequest {
                    identifier,
                    path: path.clone(),
                },
                (None, Some(path)) => CorpusEntry::OrphanResponse { identifier, path },
                (None, None) => continue,
            };
            entries.push(entry);
        }

        tracing::debug!(
            requests_dir = %self.requests_dir.display(),
            entries = entries.len(),
            "corpus scanned"
        );
        Ok(CorpusScan { entries })
    }
}

/// Result of one discovery pass.
#[derive(Debug, Clone, Default)]
pub struct CorpusScan {
    entries: Vec<CorpusEntry>,
}

impl CorpusScan {
    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }

    /// Number of discovered identifiers, orphans included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn matched_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_matched()).count()
    }

    pub fn orphan_count(&self) -> usize {
        self.len() - self.matched_count()
    }

    /// Lazily parse every entry in identifier order. Orphans yield an error.
    pub fn pairs(&self) -> Pairs<'_> {
        Pairs {
            inner: self.entries.iter(),
        }
    }
}

/// Iterator returned by [`CorpusScan::pairs`].
pub struct Pairs<'a> {
    inner: std::slice::Iter<'a, CorpusEntry>,
}

impl Iterator for Pairs<'_> {
    type Item = Result<LoadedPair, PairLoadFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(CorpusEntry::load)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Pairs<'_> {}

fn list_json_stems(dir: &Path) -> Result<BTreeMap<String, PathBuf>, LoadError> {
    let unreadable = |source| LoadError::CorpusUnreadable {
        path: dir.to_path_buf(),
        source,
    };
    let mut out = BTreeMap::new();
    for entry in std::fs::read_dir(dir).map_err(unreadable)? {
        let path = entry.map_err(unreadable)?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            out.insert(stem.to_string(), path.clone());
        }
    }
    Ok(out)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a request file and reject one without a usable explanation.
pub fn load_request(path: &Path) -> Result<SuggestionRequest, LoadError> {
    let request: SuggestionRequest = read_json(path)?;
    if request.explanation_is_blank() {
        return Err(LoadError::Invalid {
            path: path.to_path_buf(),
            reason: "explanation is empty".to_string(),
        });
    }
    Ok(request)
}

/// Parse a response file.
pub fn load_response(path: &Path) -> Result<SuggestionResponse, LoadError> {
    read_json(path)
}
