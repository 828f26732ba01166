//! Store capabilities for categories, tours and the tour/category join relation.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tourbridge_core::{AssociatedGroups, GroupId, ItemId, ItemRecord, NewGroup, TourRecord};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const CRATE_NAME: &str = "tourbridge-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("category alias {0:?} already exists")]
    DuplicateAlias(String),
    #[error("{0}")]
    Backend(String),
}

#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn find_by_alias(&self, alias: &str) -> Result<Option<GroupId>, StoreError>;

    async fn create(&self, group: NewGroup) -> Result<GroupId, StoreError>;
}

#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn load_item(&self, id: ItemId) -> Result<Option<ItemRecord>, StoreError>;

    async fn save_associated_groups(
        &self,
        id: ItemId,
        groups: &AssociatedGroups,
    ) -> Result<(), StoreError>;

    /// Inserts or refreshes a tour. Existing `associated_groups` are preserved.
    async fn upsert_tour(&self, tour: &TourRecord) -> Result<ItemId, StoreError>;
}

#[async_trait]
pub trait JoinStore: Send + Sync {
    async fn insert_pair(&self, item: ItemId, group: GroupId) -> Result<(), StoreError>;

    async fn delete_pair(&self, item: ItemId, group: GroupId) -> Result<(), StoreError>;

    async fn item_ids_for_group(&self, group: GroupId) -> Result<Vec<ItemId>, StoreError>;

    async fn group_ids_for_item(&self, item: ItemId) -> Result<Vec<GroupId>, StoreError>;
}

/// All three capabilities behind one handle.
pub trait SyncStore: GroupStore + ItemStore + JoinStore {}

impl<T: GroupStore + ItemStore + JoinStore> SyncStore for T {}

/// Shared trait-object handles over one backing store.
#[derive(Clone)]
pub struct StoreHandles {
    pub groups: Arc<dyn GroupStore>,
    pub items: Arc<dyn ItemStore>,
    pub joins: Arc<dyn JoinStore>,
}

impl StoreHandles {
    pub fn from_store<S: SyncStore + 'static>(store: Arc<S>) -> Self {
        Self {
            groups: store.clone(),
            items: store.clone(),
            joins: store,
        }
    }
}
