//! Approximate name matching over canonical security names.
//!
//! Names are lower-cased and decomposed into overlapping character
//! trigrams ("shingles"). Two names are compared by cosine similarity over
//! their shingle sets: `|A ∩ B| / sqrt(|A| * |B|)`.
//!
//! [`NameIndex`] holds the names of one instrument type. [`SimilarityIndex`]
//! partitions several of them by type so a query never crosses a type
//! boundary.

use crate::domain::security::search_key;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

pub const SHINGLE_LEN: usize = 3;

/// Shingle set of a name. Names shorter than [`SHINGLE_LEN`] characters are
/// their own single shingle.
pub fn shingles(name: &str) -> HashSet<String> {
    let key = search_key(name);
    let chars: Vec<char> = key.chars().collect();
    if chars.is_empty() {
        return HashSet::new();
    }
    if chars.len() < SHINGLE_LEN {
        return HashSet::from([key]);
    }
    chars
        .windows(SHINGLE_LEN)
        .map(|w| w.iter().collect())
        .collect()
}

fn cosine(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let shared = small.iter().filter(|s| large.contains(*s)).count();
    shared as f64 / ((a.len() * b.len()) as f64).sqrt()
}

/// Cosine similarity of two names over their shingle sets.
pub fn similarity(a: &str, b: &str) -> f64 {
    cosine(&shingles(a), &shingles(b))
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredName {
    pub name: String,
    pub score: f64,
}

/// Orders by score descending, then name ascending.
pub fn rank_order(a: &ScoredName, b: &ScoredName) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.name.cmp(&b.name))
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    shingles: HashSet<String>,
}

/// Shingle index over the names of a single instrument type.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    entries: Vec<Option<Entry>>,
    by_key: HashMap<String, usize>,
    postings: HashMap<String, Vec<usize>>,
}

impl NameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = Self::new();
        for name in names {
            index.add(name.as_ref());
        }
        index
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_key.contains_key(&search_key(name))
    }

    /// Indexes one more name. A name whose key is already present replaces
    /// the stored display name.
    pub fn add(&mut self, name: &str) {
        let key = search_key(name);
        if let Some(&slot) = self.by_key.get(&key) {
            if let Some(entry) = self.entries[slot].as_mut() {
                entry.name = name.to_string();
            }
            return;
        }

        let slot = self.entries.len();
        let shingles = shingles(name);
        for s in &shingles {
            self.postings.entry(s.clone()).or_default().push(slot);
        }
        self.entries.push(Some(Entry {
            name: name.to_string(),
            shingles,
        }));
        self.by_key.insert(key, slot);
    }

    /// Drops a name from the index. Returns false if it was not indexed.
    pub fn remove(&mut self, name: &str) -> bool {
        let Some(slot) = self.by_key.remove(&search_key(name)) else {
            return false;
        };
        if let Some(entry) = self.entries[slot].take() {
            for s in &entry.shingles {
                if let Some(slots) = self.postings.get_mut(s) {
                    slots.retain(|&i| i != slot);
                }
            }
        }
        true
    }

    /// All indexed names scoring at least `threshold` against `query`,
    /// best first. Equal scores are ordered by name.
    pub fn ranked_search(&self, query: &str, threshold: f64) -> Vec<ScoredName> {
        let query_shingles = shingles(query);

        // With a positive threshold only names sharing a shingle can qualify,
        // unless both sides are empty.
        let slots: Vec<usize> = if threshold > 0.0 && !query_shingles.is_empty() {
            let mut seen = HashSet::new();
            query_shingles
                .iter()
                .filter_map(|s| self.postings.get(s))
                .flatten()
                .copied()
                .filter(|slot| seen.insert(*slot))
                .collect()
        } else {
            (0..self.entries.len()).collect()
        };

        let mut hits: Vec<ScoredName> = slots
            .into_iter()
            .filter_map(|slot| self.entries[slot].as_ref())
            .map(|entry| ScoredName {
                name: entry.name.clone(),
                score: cosine(&query_shingles, &entry.shingles),
            })
            .filter(|hit| hit.score >= threshold)
            .collect();

        hits.sort_by(rank_order);
        hits
    }
}

/// Name indexes partitioned by instrument type name.
#[derive(Debug, Clone, Default)]
pub struct SimilarityIndex {
    partitions: BTreeMap<String, NameIndex>,
}

impl SimilarityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_partition(&self, instrument_type: &str) -> bool {
        self.partitions.contains_key(instrument_type)
    }

    /// Installs a fully built partition, replacing any previous one.
    pub fn insert_partition(&mut self, instrument_type: &str, index: NameIndex) {
        self.partitions.insert(instrument_type.to_string(), index);
    }

    pub fn add(&mut self, instrument_type: &str, name: &str) {
        self.partitions
            .entry(instrument_type.to_string())
            .or_default()
            .add(name);
    }

    pub fn remove(&mut self, instrument_type: &str, name: &str) -> bool {
        self.partitions
            .get_mut(instrument_type)
            .is_some_and(|index| index.remove(name))
    }

    pub fn ranked_search(
        &self,
        instrument_type: &str,
        query: &str,
        threshold: f64,
    ) -> Vec<ScoredName> {
        self.partitions
            .get(instrument_type)
            .map(|index| index.ranked_search(query, threshold))
            .unwrap_or_default()
    }
}
