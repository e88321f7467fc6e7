//! What a run read and what it decided to write.
//!
//! Diffing fills a [`ProjectPlan`] from repository and database reads;
//! merging and checking turn it into decisions; committing lowers the
//! decisions into [`WriteOp`]s applied in bounded transactions.

use crate::config::LocaleConfig;
use crate::diff::{ChangeSet, SourceString, TranslationDelta};
use chrono::{DateTime, Utc};
use locsync_formats::ParsedResource;
use locsync_model::{Entity, Resource, Translation};
use locsync_storage::{StorageResult, Store, Writer};
use locsync_types::{ActionLogEntry, Actor, EntityId, Message, ResourceId, TranslationId};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Everything read during diffing.
#[derive(Debug, Default)]
pub(crate) struct ProjectPlan {
    pub resources: Vec<ResourcePlan>,
    /// Resources missing upstream, with their live entities.
    pub vanished: Vec<(ResourceId, Vec<EntityId>)>,
}

#[derive(Debug)]
pub(crate) struct ResourcePlan {
    pub resource: Resource,
    pub created: bool,
    pub source_bytes: Vec<u8>,
    /// Entities before this run, by key.
    pub entities: BTreeMap<String, Entity>,
    /// Entities after this run's source changes, by key.
    pub live: BTreeMap<String, Entity>,
    pub source_changes: ChangeSet<SourceString>,
    pub locales: Vec<LocalePlan>,
    /// Changed markers read for this resource.
    pub markers: BTreeSet<(EntityId, String)>,
}

impl ResourcePlan {
    /// Entity key by id, over live entities.
    pub fn keys_by_id(&self) -> BTreeMap<EntityId, String> {
        self.live.iter().map(|(k, e)| (e.id, k.clone())).collect()
    }
}

#[derive(Debug)]
pub(crate) struct LocalePlan {
    pub locale: LocaleConfig,
    /// Checkout-relative path of the locale file.
    pub file: PathBuf,
    /// Repository values of live keys; after an export, the exported values.
    pub repository: BTreeMap<String, Message>,
    /// Active database translations of live keys.
    pub database: BTreeMap<String, Translation>,
    pub deltas: Vec<TranslationDelta>,
    pub imports: Vec<Import>,
    pub removals: Vec<Removal>,
    pub resolutions: Vec<ActionLogEntry>,
    /// The database holds changes the repository lacks.
    pub export: bool,
    pub exported_at: Option<DateTime<Utc>>,
}

impl LocalePlan {
    pub fn code(&self) -> &str {
        self.locale.code()
    }
}

/// A repository value to write as the active translation.
#[derive(Debug, Clone)]
pub(crate) struct Import {
    pub key: String,
    pub value: Message,
    pub replaces: Option<Replaced>,
}

/// The active translation an import or removal displaces.
#[derive(Debug, Clone)]
pub(crate) struct Replaced {
    pub id: TranslationId,
    /// Log as a rejection (lost a conflict) rather than a supersession.
    pub reject: bool,
    pub detail: String,
}

/// An active translation whose repository value disappeared.
#[derive(Debug, Clone)]
pub(crate) struct Removal {
    pub key: String,
    pub replaced: Replaced,
}

/// Values of live, translated, non-fuzzy units.
pub(crate) fn repository_values(parsed: &ParsedResource, live: &BTreeMap<String, Entity>) -> BTreeMap<String, Message> {
    parsed
        .units()
        .filter(|u| live.contains_key(&u.key))
        .filter(|u| !u.has_flag("fuzzy") && !u.value.is_empty())
        .map(|u| (u.key.clone(), u.value.clone()))
        .collect()
}

/// One database write.
#[derive(Debug, Clone)]
pub(crate) enum WriteOp {
    InsertResource(Resource),
    ReviveResource(ResourceId),
    ObsoleteResource(ResourceId),
    InsertEntity(Entity),
    UpdateEntity {
        id: EntityId,
        source: Message,
        comment: Option<String>,
    },
    ObsoleteEntity(EntityId),
    Import {
        translation: Translation,
        replaces: Option<Replaced>,
    },
    Remove(Replaced),
    Log(ActionLogEntry),
}

impl WriteOp {
    pub fn apply(&self, w: &Writer<'_>, actor: &Actor) -> StorageResult<()> {
        match self {
            Self::InsertResource(resource) => w.insert_resource(resource),
            Self::ReviveResource(id) => w.set_resource_obsolete(*id, false),
            Self::ObsoleteResource(id) => w.set_resource_obsolete(*id, true),
            Self::InsertEntity(entity) => w.insert_entity(entity),
            Self::UpdateEntity { id, source, comment } => w.update_entity(*id, source, comment.as_deref()),
            Self::ObsoleteEntity(id) => w.obsolete_entity(*id, actor),
            Self::Import { translation, replaces } => {
                // Whatever is active now gets displaced, even if a human
                // edit replaced the translation read during diffing.
                if let Some(active) = w.active_translation(translation.entity_id, &translation.locale)? {
                    match replaces {
                        Some(r) if r.id == active && r.reject => w.reject_translation(active, actor, &r.detail)?,
                        Some(r) => w.supersede_translation(active, actor, &r.detail)?,
                        None => w.supersede_translation(active, actor, "replaced by repository edit")?,
                    }
                }
                w.insert_translation(translation)
            }
            Self::Remove(replaced) => {
                if replaced.reject {
                    w.reject_translation(replaced.id, actor, &replaced.detail)
                } else {
                    w.remove_translation(replaced.id, actor, &replaced.detail)
                }
            }
            Self::Log(entry) => w.log(entry),
        }
    }
}

/// Applies `ops` in order, at most `batch_size` per transaction.
pub(crate) fn apply_batched(store: &Store, ops: &[WriteOp], actor: &Actor, batch_size: usize) -> StorageResult<()> {
    for chunk in ops.chunks(batch_size.max(1)) {
        store.transaction(|w| {
            for op in chunk {
                op.apply(w, actor)?;
            }
            Ok(())
        })?;
    }
    Ok(())
}
