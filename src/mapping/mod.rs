// src/mapping/mod.rs
// The mapping file is a JSON array of {"source": Item, "destination": Item}
// entries. One bad entry rejects the whole file.

mod helper;

pub use helper::{ConsumerConstructor, ForwarderConstructor, Helper, Registry};

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::common::{MappingError, PairEntry};
use crate::consumer::Consumer;
use crate::forwarder::{Forwarder, ForwarderKind};

/// A consumer and the forwarder it drives, supervised as one unit.
#[derive(Clone)]
pub struct Pair {
    pub consumer: Arc<dyn Consumer>,
    pub forwarder: Arc<dyn Forwarder>,
}

impl fmt::Debug for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pair")
            .field("consumer", &self.consumer.name())
            .field("forwarder", &self.forwarder.name())
            .finish()
    }
}

/// Consumer to forwarder correspondence, keyed by consumer name.
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    pairs: BTreeMap<String, Pair>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails when a pair with the same consumer name is already present.
    pub fn insert(&mut self, pair: Pair) -> Result<(), MappingError> {
        let name = pair.consumer.name().to_string();
        if self.pairs.contains_key(&name) {
            return Err(MappingError::DuplicateConsumer(name));
        }
        self.pairs.insert(name, pair);
        Ok(())
    }

    pub fn get(&self, consumer: &str) -> Option<&Pair> {
        self.pairs.get(consumer)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pair> {
        self.pairs.values()
    }

    /// `(consumer, forwarder)` names, ordered by consumer.
    pub fn names(&self) -> Vec<(String, String)> {
        self.iter()
            .map(|pair| {
                (
                    pair.consumer.name().to_string(),
                    pair.forwarder.name().to_string(),
                )
            })
            .collect()
    }
}

impl IntoIterator for Mapping {
    type Item = Pair;
    type IntoIter = std::collections::btree_map::IntoValues<String, Pair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.into_values()
    }
}

/// Reads the mapping file and builds pairs through a [`Helper`].
pub struct MappingLoader {
    path: PathBuf,
    helper: Arc<dyn Helper>,
}

impl MappingLoader {
    pub fn new(path: impl Into<PathBuf>, helper: Arc<dyn Helper>) -> Self {
        Self {
            path: path.into(),
            helper,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn helper(&self) -> &dyn Helper {
        self.helper.as_ref()
    }

    /// Build every pair of the mapping file. No connection is opened here.
    pub fn load(&self) -> Result<Mapping, MappingError> {
        let contents = self.load_file()?;
        let entries = self.parse(&contents)?;

        let mut mapping = Mapping::new();
        for entry in &entries {
            mapping.insert(self.build_pair(entry)?)?;
            info!(
                consumer = %entry.source.name,
                forwarder = %entry.destination.name,
                "Loaded mapping pair"
            );
        }

        debug!(path = %self.path.display(), pairs = mapping.len(), "Mapping loaded");
        Ok(mapping)
    }

    /// Raw contents of the mapping file.
    pub fn load_file(&self) -> Result<String, MappingError> {
        debug!("Loading mapping file {}", self.path.display());
        fs::read_to_string(&self.path).map_err(|source| MappingError::Load {
            path: self.path.clone(),
            source,
        })
    }

    pub fn parse(&self, contents: &str) -> Result<Vec<PairEntry>, MappingError> {
        serde_json::from_str(contents).map_err(|source| MappingError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn build_pair(&self, entry: &PairEntry) -> Result<Pair, MappingError> {
        let consumer = self.helper.create_consumer(&entry.source).ok_or_else(|| {
            MappingError::UnknownConsumerType {
                name: entry.source.name.clone(),
                kind: entry.source.kind.clone(),
            }
        })?;

        let forwarder = self.helper.create_forwarder(&entry.destination);
        if forwarder.kind() == ForwarderKind::Unresolved {
            return Err(MappingError::UnknownForwarderType {
                name: entry.destination.name.clone(),
                kind: entry.destination.kind.clone(),
            });
        }

        Ok(Pair {
            consumer,
            forwarder,
        })
    }
}
