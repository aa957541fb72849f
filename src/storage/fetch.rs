//! Byte fetching across tiers and the remote origin.

use std::io;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::Storage;
use crate::reply::Reply;

/// Where a fetch should look.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchSource {
    /// An absolute remote URI.
    Remote(String),
    /// A path relative to the read-only tier.
    ReadOnly(String),
    /// A path relative to the read-write tier.
    ReadWrite(String),
}

impl std::fmt::Display for FetchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote(uri) => write!(f, "remote:{uri}"),
            Self::ReadOnly(path) => write!(f, "read-only:{path}"),
            Self::ReadWrite(path) => write!(f, "read-write:{path}"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("fetch failed: {0}")]
    Failed(String),
}

impl From<io::Error> for FetchError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::NotFound {
            Self::NotFound(e.to_string())
        } else {
            Self::Failed(e.to_string())
        }
    }
}

pub type FetchResult = Result<Vec<u8>, FetchError>;
pub type FetchReply = Reply<FetchResult>;

/// Asynchronous byte fetch collaborator.
pub trait ByteFetcher {
    /// Start a fetch; the outcome is posted to `reply`, possibly before this
    /// call returns.
    fn fetch(&self, source: FetchSource, reply: FetchReply);
}

/// Serves the two local tiers from [`Storage`] and forwards remote URIs.
pub struct TieredFetcher {
    read_only: Arc<dyn Storage>,
    read_write: Arc<dyn Storage>,
    remote: Option<Box<dyn ByteFetcher>>,
}

impl TieredFetcher {
    pub fn new(read_only: Arc<dyn Storage>, read_write: Arc<dyn Storage>) -> Self {
        Self {
            read_only,
            read_write,
            remote: None,
        }
    }

    pub fn with_remote(mut self, remote: Box<dyn ByteFetcher>) -> Self {
        self.remote = Some(remote);
        self
    }
}

impl ByteFetcher for TieredFetcher {
    fn fetch(&self, source: FetchSource, reply: FetchReply) {
        debug!(source = %source, "fetch");
        let result = match &source {
            FetchSource::ReadOnly(path) => self.read_only.read(path).map_err(FetchError::from),
            FetchSource::ReadWrite(path) => self.read_write.read(path).map_err(FetchError::from),
            FetchSource::Remote(uri) => match &self.remote {
                Some(remote) => return remote.fetch(source, reply),
                None => Err(FetchError::Failed(format!("no remote fetcher for '{uri}'"))),
            },
        };
        reply.send(result);
    }
}
