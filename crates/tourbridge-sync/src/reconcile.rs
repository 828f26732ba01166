//! Converges the tour/category join relation for one category onto the remote tour set.

use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;
use tourbridge_core::{AssociatedGroups, GroupId, ItemId, NewGroup};
use tourbridge_storage::{GroupStore, ItemStore, JoinStore, StoreError, StoreHandles};

use crate::log::RunLog;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("looking up category {alias:?}: {source}")]
    GroupLookup {
        alias: String,
        #[source]
        source: StoreError,
    },
    #[error("creating category {alias:?}: {source}")]
    GroupCreate {
        alias: String,
        #[source]
        source: StoreError,
    },
    #[error("reading tours of category {group}: {source}")]
    ExistingLookup {
        group: GroupId,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub item_id: ItemId,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub group_id: Option<GroupId>,
    pub inserted: Vec<ItemId>,
    pub deleted: Vec<ItemId>,
    pub unchanged: usize,
    /// IDs in the diff with no local tour row. Inserts are skipped; deletes still
    /// drop the join row, but there is no `associated_groups` to rewrite.
    pub missing: Vec<ItemId>,
    pub failures: Vec<ItemFailure>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Insert,
    Delete,
}

enum ItemOutcome {
    Applied {
        before: AssociatedGroups,
        after: AssociatedGroups,
    },
    Missing,
}

/// Holds the three store capabilities for the duration of a run.
pub struct Reconciler<'a> {
    groups: &'a dyn GroupStore,
    items: &'a dyn ItemStore,
    joins: &'a dyn JoinStore,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        groups: &'a dyn GroupStore,
        items: &'a dyn ItemStore,
        joins: &'a dyn JoinStore,
    ) -> Self {
        Self {
            groups,
            items,
            joins,
        }
    }

    pub fn from_handles(handles: &'a StoreHandles) -> Self {
        Self::new(&*handles.groups, &*handles.items, &*handles.joins)
    }

    /// Finds the category for `alias`, creating it with showcase defaults when absent.
    pub async fn resolve_group(
        &self,
        alias: &str,
        log: &mut RunLog,
    ) -> Result<GroupId, ReconcileError> {
        log.info(format!("looking up category {alias:?}"));
        let found = self
            .groups
            .find_by_alias(alias)
            .await
            .map_err(|source| ReconcileError::GroupLookup {
                alias: alias.to_string(),
                source,
            })?;
        if let Some(id) = found {
            return Ok(id);
        }

        log.info(format!("creating category {alias:?}"));
        self.groups
            .create(NewGroup::for_showcase(alias))
            .await
            .map_err(|source| ReconcileError::GroupCreate {
                alias: alias.to_string(),
                source,
            })
    }

    pub async fn existing_item_ids(
        &self,
        group: GroupId,
    ) -> Result<BTreeSet<ItemId>, ReconcileError> {
        let ids = self
            .joins
            .item_ids_for_group(group)
            .await
            .map_err(|source| ReconcileError::ExistingLookup { group, source })?;
        Ok(ids.into_iter().collect())
    }

    /// Resolves `alias` and reconciles it. An empty alias is a no-op and returns `None`.
    pub async fn sync_alias(
        &self,
        alias: &str,
        remote: &BTreeSet<ItemId>,
        existing: &BTreeSet<ItemId>,
        log: &mut RunLog,
    ) -> Result<Option<ReconcileReport>, ReconcileError> {
        if alias.is_empty() {
            return Ok(None);
        }
        let group = self.resolve_group(alias, log).await?;
        Ok(Some(self.reconcile(group, remote, existing, log).await))
    }

    /// Applies the minimal inserts and deletes so `group` holds exactly `remote`.
    ///
    /// Each changed tour gets its `associated_groups` rebuilt from its join rows.
    /// Tours in both sets are not read or written. There is no transaction across
    /// tours: a failure is recorded in the report and the loop moves on.
    pub async fn reconcile(
        &self,
        group: GroupId,
        remote: &BTreeSet<ItemId>,
        existing: &BTreeSet<ItemId>,
        log: &mut RunLog,
    ) -> ReconcileReport {
        let mut report = ReconcileReport {
            group_id: Some(group),
            ..Default::default()
        };

        for &id in remote.union(existing) {
            let change = match (remote.contains(&id), existing.contains(&id)) {
                (true, true) => {
                    report.unchanged += 1;
                    continue;
                }
                (false, _) => Change::Delete,
                (true, false) => Change::Insert,
            };

            match self.apply(id, group, change).await {
                Ok(ItemOutcome::Applied { before, after }) => {
                    match change {
                        Change::Insert => {
                            log.info(format!("tour {id} added to category {group}"));
                            report.inserted.push(id);
                        }
                        Change::Delete => {
                            log.info(format!("tour {id} removed from category {group}"));
                            report.deleted.push(id);
                        }
                    }
                    let dropped = before
                        .iter()
                        .filter(|g| *g != group && !after.contains(*g))
                        .map(|g| g.to_string())
                        .collect::<Vec<_>>();
                    if !dropped.is_empty() {
                        log.warn(format!(
                            "tour {id} had stale categories [{}] without join rows",
                            dropped.join(",")
                        ));
                    }
                }
                Ok(ItemOutcome::Missing) => {
                    match change {
                        Change::Insert => {
                            log.warn(format!("tour {id} not found locally, mapping skipped"))
                        }
                        Change::Delete => log.warn(format!(
                            "tour {id} not found locally, dangling join row removed"
                        )),
                    }
                    report.missing.push(id);
                }
                Err(err) => {
                    log.error(format!("tour {id} mapping failed: {err}"));
                    report.failures.push(ItemFailure {
                        item_id: id,
                        message: err.to_string(),
                    });
                }
            }
        }

        report
    }

    async fn apply(
        &self,
        id: ItemId,
        group: GroupId,
        change: Change,
    ) -> Result<ItemOutcome, StoreError> {
        let Some(item) = self.items.load_item(id).await? else {
            if change == Change::Delete {
                self.joins.delete_pair(id, group).await?;
            }
            return Ok(ItemOutcome::Missing);
        };

        match change {
            Change::Insert => self.joins.insert_pair(id, group).await?,
            Change::Delete => self.joins.delete_pair(id, group).await?,
        }

        let after: AssociatedGroups = self
            .joins
            .group_ids_for_item(id)
            .await?
            .into_iter()
            .collect();
        self.items.save_associated_groups(id, &after).await?;

        Ok(ItemOutcome::Applied {
            before: item.associated_groups,
            after,
        })
    }
}
