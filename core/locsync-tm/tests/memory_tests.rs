use locsync_model::{Entity, Translation};
use locsync_tm::{TmEntry, TranslationMemory, levenshtein, normalize, similarity};
use locsync_types::{Actor, EntityId, Message, ResourceId, TranslationId};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;

fn entry(locale: &str, source: &str, target: &str) -> TmEntry {
    TmEntry {
        translation_id: TranslationId::new(),
        entity_id: EntityId::new(),
        locale: locale.into(),
        source: source.into(),
        target: target.into(),
    }
}

// ── Distance ──────────────────────────────────────────────────────

#[test]
fn levenshtein_basics() {
    assert_eq!(levenshtein("", "abc"), 3);
    assert_eq!(levenshtein("kitten", "sitting"), 3);
    assert_eq!(levenshtein("flaw", "lawn"), 2);
    assert_eq!(levenshtein("äbc", "abc"), 1);
}

#[test]
fn similarity_is_percentage() {
    assert_eq!(similarity("Save file", "Save file"), 100);
    assert_eq!(similarity("", ""), 100);
    assert_eq!(similarity("abcd", "abcx"), 75);
    assert_eq!(similarity("abc", "xyz"), 0);
}

#[test]
fn normalize_collapses_whitespace() {
    assert_eq!(normalize("  Save \n  file "), "Save file");
}

// ── Search ────────────────────────────────────────────────────────

#[test]
fn exact_match_scores_100() {
    let tm = TranslationMemory::new();
    tm.index(entry("de", "Save file", "Datei speichern"));

    let hits = tm.search("Save  file", "de", 70, 5);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].quality, 100);
    assert_eq!(hits[0].entry.target, "Datei speichern");
}

#[test]
fn fuzzy_matches_ranked_best_first() {
    let tm = TranslationMemory::new();
    tm.index(entry("de", "Save file as", "Datei speichern unter"));
    tm.index(entry("de", "Save file", "Datei speichern"));
    tm.index(entry("de", "Open folder", "Ordner öffnen"));

    let hits = tm.search("Save files", "de", 50, 10);
    let sources: Vec<&str> = hits.iter().map(|h| h.entry.source.as_str()).collect();
    assert_eq!(sources, vec!["Save file", "Save file as"]);
    assert!(hits[0].quality > hits[1].quality);
}

#[test]
fn search_filters_by_locale_and_quality() {
    let tm = TranslationMemory::new();
    tm.index(entry("fr", "Save file", "Enregistrer le fichier"));
    tm.index(entry("de", "Completely different", "Ganz anders"));

    assert!(tm.search("Save file", "de", 50, 10).is_empty());
    assert_eq!(tm.search("Save file", "fr", 50, 10).len(), 1);
}

#[test]
fn limit_truncates() {
    let tm = TranslationMemory::new();
    for i in 0..5 {
        tm.index(entry("de", &format!("Item {i}"), &format!("Eintrag {i}")));
    }
    assert_eq!(tm.search("Item 1", "de", 50, 2).len(), 2);
}

// ── Maintenance ───────────────────────────────────────────────────

#[test]
fn index_and_remove_are_idempotent() {
    let tm = TranslationMemory::new();
    let e = entry("de", "Save", "Speichern");
    tm.index(e.clone());
    tm.index(e.clone());
    assert_eq!(tm.len(), 1);

    assert!(tm.remove(e.translation_id));
    assert!(!tm.remove(e.translation_id));
    assert!(tm.is_empty());
    assert!(tm.search("Save", "de", 0, 10).is_empty());
}

#[test]
fn reindexing_replaces_source() {
    let tm = TranslationMemory::new();
    let mut e = entry("de", "Save", "Speichern");
    tm.index(e.clone());
    e.source = "Load".into();
    tm.index(e);

    assert!(tm.search("Save", "de", 90, 10).is_empty());
    assert_eq!(tm.search("Load", "de", 90, 10).len(), 1);
}

#[test]
fn rebuild_replaces_everything() {
    let tm = TranslationMemory::new();
    tm.index(entry("de", "Old", "Alt"));
    tm.rebuild(vec![entry("de", "New", "Neu"), entry("fr", "New", "Nouveau")]);

    assert_eq!(tm.len(), 2);
    assert!(tm.search("Old", "de", 90, 10).is_empty());
}

#[test]
fn entry_from_translation() {
    let entity = Entity::new(ResourceId::new(), "save", Message::plain("Save"));
    let translation = Translation::new(entity.id, "de", Message::plain("Speichern"), Actor::User("a".into()));
    let e = TmEntry::from_translation(&entity, &translation);
    assert_eq!(e.translation_id, translation.id);
    assert_eq!((e.source.as_str(), e.target.as_str()), ("Save", "Speichern"));
}

#[test]
fn concurrent_readers_and_writer() {
    let tm = Arc::new(TranslationMemory::new());
    tm.index(entry("de", "Save file", "Datei speichern"));
    let writer = {
        let tm = tm.clone();
        std::thread::spawn(move || {
            for i in 0..100 {
                tm.index(entry("de", &format!("Entry {i}"), "x"));
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let tm = tm.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    assert_eq!(tm.search("Save file", "de", 100, 1).len(), 1);
                }
            })
        })
        .collect();
    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(tm.len(), 101);
}

proptest! {
    /// Hits always meet the threshold and exact sources are never missed.
    #[test]
    fn search_hits_are_sound(
        sources in proptest::collection::vec("[a-e ]{1,12}", 1..12),
        query in "[a-e]{1,3}[a-e ]{0,9}",
        min in 0u8..=100,
    ) {
        let tm = TranslationMemory::new();
        for s in &sources {
            tm.index(entry("de", s, "t"));
        }
        tm.index(entry("de", &query, "exact"));
        let q = normalize(&query);

        let hits = tm.search(&query, "de", min, usize::MAX);
        for hit in &hits {
            prop_assert!(hit.quality >= min);
            prop_assert_eq!(hit.quality, similarity(&q, &normalize(&hit.entry.source)));
        }
        prop_assert!(hits.iter().any(|h| h.entry.target == "exact" && h.quality == 100));
    }
}
