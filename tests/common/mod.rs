//! Deterministic providers and fixtures shared by the integration tests.
//!
//! Every word gets a fixed slot from a vocabulary. Dense vectors are bags of
//! words over the slots, sparse vectors are (slot, count) pairs and
//! multivectors are one one-hot token vector per word, so relevance is just
//! word overlap and rankings are predictable.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use trilane::config::Config;
use trilane::context::AppContext;
use trilane::embedding::{
    DenseProvider, EmbedRole, EmbeddingError, EmbeddingGateway, LateInteractionProvider,
    SparseProvider,
};
use trilane::indexing::CorpusItem;
use trilane::store::{MemoryStore, SparseVector};

pub const DIM: usize = 64;

pub const TEXTS: [&str; 10] = [
    "solar panels convert sunlight into electricity",
    "wind turbines generate power offshore",
    "hydroelectric dams store river water",
    "tolkien wrote lord rings hobbits middle earth",
    "geothermal plants tap underground heat",
    "tolkien letters describe oxford life",
    "nuclear reactors split uranium atoms",
    "battery storage smooths grid demand",
    "tidal energy follows lunar cycles",
    "biomass burns organic waste",
];

pub fn words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Word → slot in `[0, DIM)`, first-seen order
#[derive(Debug, Default)]
pub struct Vocabulary {
    slots: BTreeMap<String, usize>,
}

impl Vocabulary {
    pub fn from_texts<'a>(texts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut slots = BTreeMap::new();
        for text in texts {
            for word in words(text) {
                let next = slots.len() % DIM;
                slots.entry(word).or_insert(next);
            }
        }
        Self { slots }
    }

    pub fn slot(&self, word: &str) -> usize {
        self.slots.get(word).copied().unwrap_or_else(|| {
            // FNV-1a for words outside the corpus
            let mut hash: u64 = 0xcbf29ce484222325;
            for byte in word.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
            (hash % DIM as u64) as usize
        })
    }
}

pub struct BagOfWordsDense {
    pub vocab: Arc<Vocabulary>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl DenseProvider for BagOfWordsDense {
    async fn embed_batch(
        &self,
        texts: Vec<String>,
        _role: EmbedRole,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0; DIM];
                for word in words(text) {
                    v[self.vocab.slot(&word)] += 1.0;
                }
                v
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        "bag-of-words"
    }
}

pub struct TermCountSparse {
    pub vocab: Arc<Vocabulary>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl SparseProvider for TermCountSparse {
    async fn embed_batch(
        &self,
        texts: Vec<String>,
        _role: EmbedRole,
    ) -> Result<Vec<SparseVector>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let mut counts: BTreeMap<u32, f32> = BTreeMap::new();
                for word in words(text) {
                    *counts.entry(self.vocab.slot(&word) as u32).or_default() += 1.0;
                }
                SparseVector::new(counts.keys().copied().collect(), counts.values().copied().collect())
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "term-count"
    }
}

pub struct OneHotLate {
    pub vocab: Arc<Vocabulary>,
    pub calls: AtomicUsize,
    pub fail: bool,
}

#[async_trait]
impl LateInteractionProvider for OneHotLate {
    async fn embed_batch(
        &self,
        texts: Vec<String>,
        _role: EmbedRole,
    ) -> Result<Vec<Vec<Vec<f32>>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EmbeddingError::GenerationError(
                "late interaction server unreachable".to_string(),
            ));
        }
        Ok(texts
            .iter()
            .map(|text| {
                words(text)
                    .iter()
                    .map(|word| {
                        let mut v = vec![0.0; DIM];
                        v[self.vocab.slot(word)] = 1.0;
                        v
                    })
                    .collect()
            })
            .collect())
    }

    fn token_dimension(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        "one-hot"
    }
}

/// Providers plus their call counters
pub struct Providers {
    pub dense: Arc<BagOfWordsDense>,
    pub sparse: Arc<TermCountSparse>,
    pub late: Arc<OneHotLate>,
}

impl Providers {
    pub fn new(vocab: Arc<Vocabulary>, late_fails: bool) -> Self {
        Self {
            dense: Arc::new(BagOfWordsDense {
                vocab: vocab.clone(),
                calls: AtomicUsize::new(0),
            }),
            sparse: Arc::new(TermCountSparse {
                vocab: vocab.clone(),
                calls: AtomicUsize::new(0),
            }),
            late: Arc::new(OneHotLate {
                vocab,
                calls: AtomicUsize::new(0),
                fail: late_fails,
            }),
        }
    }

    pub fn gateway(&self) -> EmbeddingGateway {
        EmbeddingGateway::new(self.dense.clone(), self.sparse.clone(), self.late.clone())
    }

    pub fn total_calls(&self) -> usize {
        self.dense.calls.load(Ordering::SeqCst)
            + self.sparse.calls.load(Ordering::SeqCst)
            + self.late.calls.load(Ordering::SeqCst)
    }
}

/// Small in-memory configuration sized for the fake providers
pub fn test_config(num_tenants: usize) -> Config {
    let mut config = Config::default();
    config.collection.name = "test_corpus".to_string();
    config.collection.shard_number = 1;
    config.collection.replication_factor = 1;
    config.collection.dense.size = DIM as u64;
    config.collection.late_interaction.size = DIM as u64;
    config.indexing.num_tenants = num_tenants;
    config.indexing.max_documents = None;
    config
}

pub fn corpus(texts: &[&str]) -> Vec<CorpusItem> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| CorpusItem {
            key: format!("doc{}", i),
            title: format!("Document {}", i),
            text: text.to_string(),
        })
        .collect()
}

/// Larger synthetic corpus; every document shares the word "energy"
pub fn synthetic_texts(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("energy topic{} region{}", i, i % 7))
        .collect()
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub providers: Providers,
    pub context: AppContext,
}

impl Harness {
    pub fn new(config: Config, texts: &[&str], late_fails: bool) -> Self {
        let vocab = Arc::new(Vocabulary::from_texts(texts.iter().copied()));
        let store = Arc::new(MemoryStore::new());
        let providers = Providers::new(vocab, late_fails);
        let context = AppContext::new(config, store.clone(), providers.gateway());
        Self {
            store,
            providers,
            context,
        }
    }

    /// Harness over `texts` with the corpus already indexed
    pub async fn indexed(config: Config, texts: &[&str]) -> Self {
        let harness = Self::new(config, texts, false);
        harness
            .context
            .indexer()
            .run(corpus(texts))
            .await
            .expect("indexing should succeed");
        harness
    }
}
