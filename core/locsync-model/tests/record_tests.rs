use locsync_formats::Format;
use locsync_model::{
    Entity, RejectedCandidate, Resource, ReviewState, SkippedResource, SyncRun, SyncStatus,
    SyncSummary, Translation,
};
use locsync_types::{Actor, Message, ProjectId, SyncId};
use pretty_assertions::assert_eq;
use std::str::FromStr;

// ── Resource / Entity ────────────────────────────────────────────

#[test]
fn new_resource_is_live() {
    let resource = Resource::new(ProjectId::new(), "browser/menu.ftl", Format::Ftl);
    assert!(!resource.obsolete);
    assert_eq!(resource.format, Format::Ftl);
}

#[test]
fn empty_comment_is_dropped() {
    let resource = Resource::new(ProjectId::new(), "a.properties", Format::Properties);
    let entity = Entity::new(resource.id, "key", Message::plain("Value")).with_comment(Some(String::new()));
    assert_eq!(entity.comment, None);
    assert!(!entity.obsolete);
}

// ── Translation ──────────────────────────────────────────────────

#[test]
fn new_translation_is_active_unreviewed() {
    let entity = Entity::new(
        Resource::new(ProjectId::new(), "a.po", Format::Po).id,
        "hello",
        Message::plain("Hello"),
    );
    let t = Translation::new(entity.id, "de", Message::plain("Hallo"), Actor::User("anna".into()));
    assert!(t.active);
    assert_eq!(t.state, ReviewState::Unreviewed);
    assert!(t.machinery_sources.is_empty());
}

#[test]
fn approved_sets_timestamp() {
    let entity_id = locsync_types::EntityId::new();
    let t = Translation::new(entity_id, "fr", Message::plain("Bonjour"), Actor::Sync(SyncId::new()))
        .approved()
        .with_machinery_source("google-translate");
    assert!(t.is_approved());
    assert_eq!(t.approved_at, Some(t.created_at));
    assert_eq!(t.last_transition(), t.created_at);
    assert!(t.machinery_sources.contains("google-translate"));
}

#[test]
fn review_state_roundtrip() {
    for state in [ReviewState::Unreviewed, ReviewState::Approved, ReviewState::Rejected] {
        assert_eq!(ReviewState::from_str(state.as_str()).unwrap(), state);
    }
    assert!(ReviewState::from_str("fuzzy").is_err());
}

// ── SyncRun ──────────────────────────────────────────────────────

#[test]
fn sync_status_roundtrip_and_terminality() {
    for status in [SyncStatus::InProgress, SyncStatus::Done, SyncStatus::NoChanges, SyncStatus::Failed] {
        assert_eq!(SyncStatus::from_str(status.as_str()).unwrap(), status);
    }
    assert!(!SyncStatus::InProgress.is_terminal());
    assert!(SyncStatus::NoChanges.is_terminal());
}

#[test]
fn started_run_is_in_progress() {
    let run = SyncRun::start(ProjectId::new());
    assert_eq!(run.status, SyncStatus::InProgress);
    assert!(run.finished_at.is_none());
    assert!(!run.summary.has_changes());
}

#[test]
fn summary_reports_skips_and_rejections() {
    let summary = SyncSummary {
        entities_added: 1,
        skipped_resources: vec![SkippedResource {
            path: "broken.po".into(),
            locale: Some("de".into()),
            error: "unterminated string".into(),
        }],
        rejected_candidates: vec![RejectedCandidate {
            path: "app.lang".into(),
            key: "Hello".into(),
            locale: "de".into(),
            findings: vec!["Translation too long".into()],
        }],
        ..Default::default()
    };
    assert!(summary.has_changes());
    let text = summary.render();
    assert!(text.contains("skipped broken.po [de]: unterminated string"));
    assert!(text.contains("rejected app.lang [de] Hello: Translation too long"));
}

#[test]
fn summary_serde_roundtrip() {
    let summary = SyncSummary {
        translations_imported: 3,
        revision: Some("abc123".into()),
        ..Default::default()
    };
    let json = serde_json::to_string(&summary).unwrap();
    let back: SyncSummary = serde_json::from_str(&json).unwrap();
    assert_eq!(back, summary);
}
