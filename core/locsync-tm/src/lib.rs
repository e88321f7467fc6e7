//! Translation memory.
//!
//! A derived, rebuildable index of `(source, target)` pairs taken from
//! approved translations. Lookups pre-filter candidates through a trigram
//! index over normalized source text and rank survivors by Levenshtein
//! similarity. The index is never a source of truth.

mod distance;

pub use distance::{levenshtein, similarity};

use locsync_model::{Entity, Translation};
use locsync_types::{EntityId, TranslationId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// One `(source, target)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmEntry {
    pub translation_id: TranslationId,
    pub entity_id: EntityId,
    pub locale: String,
    pub source: String,
    pub target: String,
}

impl TmEntry {
    pub fn from_translation(entity: &Entity, translation: &Translation) -> Self {
        Self {
            translation_id: translation.id,
            entity_id: entity.id,
            locale: translation.locale.clone(),
            source: entity.source.to_plain_text(),
            target: translation.value.to_plain_text(),
        }
    }
}

/// A search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmMatch {
    pub entry: TmEntry,
    /// Similarity of the query to `entry.source`, 0 to 100.
    pub quality: u8,
}

/// Collapses whitespace runs and trims.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn trigrams(normalized: &str) -> HashSet<String> {
    let padded: Vec<char> = format!("  {} ", normalized.to_lowercase()).chars().collect();
    padded.windows(3).map(|w| w.iter().collect()).collect()
}

#[derive(Debug, Default)]
struct Index {
    entries: HashMap<TranslationId, (TmEntry, String)>,
    postings: HashMap<String, HashSet<TranslationId>>,
}

impl Index {
    fn insert(&mut self, entry: TmEntry) {
        self.remove(entry.translation_id);
        let normalized = normalize(&entry.source);
        for gram in trigrams(&normalized) {
            self.postings.entry(gram).or_default().insert(entry.translation_id);
        }
        self.entries.insert(entry.translation_id, (entry, normalized));
    }

    fn remove(&mut self, id: TranslationId) -> bool {
        let Some((_, normalized)) = self.entries.remove(&id) else {
            return false;
        };
        for gram in trigrams(&normalized) {
            if let Some(ids) = self.postings.get_mut(&gram) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.postings.remove(&gram);
                }
            }
        }
        true
    }
}

/// Thread-safe translation memory. Readers run concurrently; a writer
/// holds the lock for one entry at a time.
#[derive(Debug, Default)]
pub struct TranslationMemory {
    index: RwLock<Index>,
}

impl TranslationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the entry for its translation.
    pub fn index(&self, entry: TmEntry) {
        self.index.write().unwrap_or_else(PoisonError::into_inner).insert(entry);
    }

    /// Drops the entry of a translation. Returns whether one existed.
    pub fn remove(&self, translation_id: TranslationId) -> bool {
        self.index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(translation_id)
    }

    /// Replaces the whole index.
    pub fn rebuild(&self, entries: impl IntoIterator<Item = TmEntry>) {
        let mut fresh = Index::default();
        for entry in entries {
            fresh.insert(entry);
        }
        debug!(entries = fresh.entries.len(), "translation memory rebuilt");
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = fresh;
    }

    pub fn len(&self) -> usize {
        self.index.read().unwrap_or_else(PoisonError::into_inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in `locale` whose source is at least `min_quality` percent
    /// similar to `text`, best first.
    pub fn search(&self, text: &str, locale: &str, min_quality: u8, limit: usize) -> Vec<TmMatch> {
        let query = normalize(text);
        let grams = trigrams(&query);
        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);

        let mut shared: HashMap<TranslationId, usize> = HashMap::new();
        for gram in &grams {
            if let Some(ids) = index.postings.get(gram) {
                for id in ids {
                    *shared.entry(*id).or_default() += 1;
                }
            }
        }

        // Each edit touches at most three trigrams, so a candidate sharing
        // fewer than `grams - 3 * max_edits` cannot reach `min_quality`.
        let query_len = query.chars().count();
        let mut matches: Vec<TmMatch> = shared
            .into_iter()
            .filter_map(|(id, count)| {
                let (entry, normalized) = index.entries.get(&id)?;
                if entry.locale != locale {
                    return None;
                }
                let longest = query_len.max(normalized.chars().count());
                let max_edits = (longest * (100 - usize::from(min_quality.min(100))) + 99) / 100 + 1;
                if count + 3 * max_edits < grams.len() {
                    return None;
                }
                let quality = similarity(&query, normalized);
                (quality >= min_quality).then(|| TmMatch {
                    entry: entry.clone(),
                    quality,
                })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.quality
                .cmp(&a.quality)
                .then_with(|| a.entry.source.cmp(&b.entry.source))
                .then_with(|| a.entry.translation_id.cmp(&b.entry.translation_id))
        });
        matches.truncate(limit);
        matches
    }
}
