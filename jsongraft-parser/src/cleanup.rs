//! Reconciliation of relationship members dropped by a parse.
//!
//! Merging a to-many relationship keeps the union of the members it already
//! had and the freshly parsed ones. The cleanup state of one parse call
//! remembers which old members were not re-parsed, and [`Cleanup::sweep`]
//! deletes those still unclaimed when the call finishes.

use jsongraft_dao::{Dao, DaoResult};
use jsongraft_model::RelationshipSchema;
use jsongraft_storage::{Context, ObjectRef, StorageResult};
use jsongraft_types::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Which cleanup rule a parser applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupOption {
    /// Never delete; relationships only grow.
    #[default]
    None,
    /// Delete every dropped member not re-parsed anywhere in the same call.
    Light,
    /// Like `Light`, but only delete a dropped member once no other parent
    /// still references it through the inverse relationship.
    Advanced,
}

/// Cleanup bookkeeping for one parse call.
#[derive(Debug, Default)]
pub struct Cleanup {
    option: CleanupOption,
    tracked: BTreeSet<EntityId>,
    /// Objects merged during this call; never tracked again.
    alive: HashSet<EntityId>,
    /// Candidate to the parents that dropped it during this call.
    severed: HashMap<EntityId, HashSet<EntityId>>,
}

impl Cleanup {
    pub fn new(option: CleanupOption) -> Self {
        Self {
            option,
            ..Self::default()
        }
    }

    pub fn option(&self) -> CleanupOption {
        self.option
    }

    pub fn is_tracked(&self, id: EntityId) -> bool {
        self.tracked.contains(&id)
    }

    pub fn tracked(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.tracked.iter().copied()
    }

    /// Records that `id` was merged in this call.
    pub fn validate(&mut self, id: EntityId) {
        if self.option == CleanupOption::None {
            return;
        }
        self.tracked.remove(&id);
        self.alive.insert(id);
    }

    /// Reconciles one relationship of `parent`: members in `old` but not in
    /// `new` become deletion candidates under the configured rule.
    pub fn mark(
        &mut self,
        context: &Context,
        old: &[ObjectRef],
        new: &[ObjectRef],
        relationship: &RelationshipSchema,
        parent: &ObjectRef,
    ) -> StorageResult<()> {
        if self.option == CleanupOption::None {
            return Ok(());
        }

        let parsed: HashSet<EntityId> = new.iter().map(ObjectRef::id).collect();
        for id in &parsed {
            self.tracked.remove(id);
            if let Some(parents) = self.severed.get_mut(id) {
                parents.remove(&parent.id());
            }
        }

        let stale: Vec<&ObjectRef> = old
            .iter()
            .filter(|o| !parsed.contains(&o.id()) && !self.alive.contains(&o.id()))
            .collect();
        for candidate in stale {
            let orphaned = match self.option {
                CleanupOption::Advanced => self.is_orphaned(context, candidate, relationship, parent)?,
                _ => true,
            };
            if orphaned {
                debug!(
                    "Tracking {} dropped from {}.{}",
                    candidate, parent, relationship.name
                );
                self.tracked.insert(candidate.id());
            }
        }
        Ok(())
    }

    /// True if, apart from `parent` and parents that already dropped it in
    /// this call, nothing references `candidate` through the inverse of
    /// `relationship`. Records `parent` as having dropped it.
    fn is_orphaned(
        &mut self,
        context: &Context,
        candidate: &ObjectRef,
        relationship: &RelationshipSchema,
        parent: &ObjectRef,
    ) -> StorageResult<bool> {
        let schema = context.schema().require(candidate.entity())?;
        let back_references: Vec<&RelationshipSchema> = schema
            .relationships_for_destination(parent.entity())
            .filter(|r| r.inverse.as_deref() == Some(relationship.name.as_str()))
            .collect();
        if back_references.is_empty() {
            return Ok(false);
        }

        let severed = self.severed.entry(candidate.id()).or_default();
        severed.insert(parent.id());

        for back_reference in back_references {
            let holders = context.related(candidate, &back_reference.name)?;
            if holders.iter().all(|holder| severed.contains(&holder.id())) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Deletes every tracked object. Returns how many were deleted.
    pub fn sweep(&mut self, dao: &Dao) -> DaoResult<usize> {
        let tracked = std::mem::take(&mut self.tracked);
        if tracked.is_empty() {
            return Ok(0);
        }
        let mut deleted = 0;
        for id in tracked {
            if dao.delete_by_identity(id)? {
                deleted += 1;
            } else {
                warn!("Tracked object {} was already deleted", id);
            }
        }
        info!("Cleanup deleted {} dropped objects", deleted);
        Ok(deleted)
    }
}
