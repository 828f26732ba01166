use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tourbridge_core::{AssociatedGroups, GroupId, ItemId, ItemRecord, NewGroup, TourRecord};

use crate::{GroupStore, ItemStore, JoinStore, StoreError};

#[derive(Debug, Default)]
struct MemoryState {
    groups: BTreeMap<GroupId, NewGroup>,
    next_group_id: i64,
    tours: BTreeMap<ItemId, StoredTour>,
    pairs: BTreeSet<(ItemId, GroupId)>,
    writes: usize,
}

#[derive(Debug, Clone)]
struct StoredTour {
    tour: Option<TourRecord>,
    associated_groups: AssociatedGroups,
}

/// In-process store used by tests and `--memory` runs. Counts every mutation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_group(&self, alias: &str) -> GroupId {
        let mut state = self.state.lock().await;
        state.next_group_id += 1;
        let id = GroupId(state.next_group_id);
        state.groups.insert(id, NewGroup::for_showcase(alias));
        id
    }

    /// Adds a bare item with the given stored `associated_groups` string.
    pub async fn seed_item(&self, id: ItemId, associated_groups: &str) {
        let mut state = self.state.lock().await;
        state.tours.insert(
            id,
            StoredTour {
                tour: None,
                associated_groups: AssociatedGroups::parse(associated_groups),
            },
        );
    }

    pub async fn seed_pair(&self, item: ItemId, group: GroupId) {
        self.state.lock().await.pairs.insert((item, group));
    }

    pub async fn pairs(&self) -> Vec<(ItemId, GroupId)> {
        self.state.lock().await.pairs.iter().copied().collect()
    }

    pub async fn item(&self, id: ItemId) -> Option<ItemRecord> {
        let state = self.state.lock().await;
        state.tours.get(&id).map(|stored| ItemRecord {
            id,
            associated_groups: stored.associated_groups.clone(),
        })
    }

    pub async fn tour(&self, id: ItemId) -> Option<TourRecord> {
        let state = self.state.lock().await;
        state.tours.get(&id).and_then(|stored| stored.tour.clone())
    }

    pub async fn group_alias(&self, id: GroupId) -> Option<String> {
        let state = self.state.lock().await;
        state.groups.get(&id).map(|group| group.alias.clone())
    }

    pub async fn write_count(&self) -> usize {
        self.state.lock().await.writes
    }

    pub async fn reset_write_count(&self) {
        self.state.lock().await.writes = 0;
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn find_by_alias(&self, alias: &str) -> Result<Option<GroupId>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .groups
            .iter()
            .find(|(_, group)| group.alias == alias)
            .map(|(id, _)| *id))
    }

    async fn create(&self, group: NewGroup) -> Result<GroupId, StoreError> {
        let mut state = self.state.lock().await;
        if state.groups.values().any(|g| g.alias == group.alias) {
            return Err(StoreError::DuplicateAlias(group.alias));
        }
        state.next_group_id += 1;
        let id = GroupId(state.next_group_id);
        state.groups.insert(id, group);
        state.writes += 1;
        Ok(id)
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn load_item(&self, id: ItemId) -> Result<Option<ItemRecord>, StoreError> {
        Ok(self.item(id).await)
    }

    async fn save_associated_groups(
        &self,
        id: ItemId,
        groups: &AssociatedGroups,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let stored = state.tours.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "tour",
            id: id.0,
        })?;
        stored.associated_groups = groups.clone();
        state.writes += 1;
        Ok(())
    }

    async fn upsert_tour(&self, tour: &TourRecord) -> Result<ItemId, StoreError> {
        let mut state = self.state.lock().await;
        state
            .tours
            .entry(tour.id)
            .and_modify(|stored| stored.tour = Some(tour.clone()))
            .or_insert_with(|| StoredTour {
                tour: Some(tour.clone()),
                associated_groups: AssociatedGroups::new(),
            });
        state.writes += 1;
        Ok(tour.id)
    }
}

#[async_trait]
impl JoinStore for MemoryStore {
    async fn insert_pair(&self, item: ItemId, group: GroupId) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.pairs.insert((item, group));
        state.writes += 1;
        Ok(())
    }

    async fn delete_pair(&self, item: ItemId, group: GroupId) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.pairs.remove(&(item, group));
        state.writes += 1;
        Ok(())
    }

    async fn item_ids_for_group(&self, group: GroupId) -> Result<Vec<ItemId>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .pairs
            .iter()
            .filter(|(_, g)| *g == group)
            .map(|(item, _)| *item)
            .collect())
    }

    async fn group_ids_for_item(&self, item: ItemId) -> Result<Vec<GroupId>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .pairs
            .range((item, GroupId(i64::MIN))..=(item, GroupId(i64::MAX)))
            .map(|(_, group)| *group)
            .collect())
    }
}
