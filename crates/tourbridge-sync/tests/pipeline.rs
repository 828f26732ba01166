use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tourbridge_core::{
    AssociatedGroups, GroupId, ItemId, ItemRecord, NewGroup, RunStatus, TourRecord,
};
use tourbridge_remote::{FetchError, FixtureShowcaseSource, ShowcaseSource, SourceError};
use tourbridge_storage::{GroupStore, ItemStore, MemoryStore, StoreError, StoreHandles};
use tourbridge_sync::{LogLevel, SyncPipeline};
use uuid::Uuid;

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn fixture_source() -> Arc<FixtureShowcaseSource> {
    Arc::new(
        FixtureShowcaseSource::load(workspace_root().join("fixtures/sample-showcase/tours.json"))
            .expect("fixture"),
    )
}

#[derive(Default)]
struct ScriptedSource {
    tours: BTreeMap<i64, JsonValue>,
    failing_details: BTreeSet<i64>,
    fail_listing: bool,
}

impl ScriptedSource {
    fn with_tours(ids: &[i64]) -> Self {
        Self {
            tours: ids
                .iter()
                .map(|&id| (id, json!({ "id": id, "title": format!("Tour {id}") })))
                .collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ShowcaseSource for ScriptedSource {
    async fn list_tour_ids(
        &self,
        _run_id: Uuid,
        _showcase: &str,
    ) -> Result<Vec<ItemId>, SourceError> {
        if self.fail_listing {
            return Err(SourceError::Fetch(FetchError::HttpStatus {
                status: 503,
                url: "https://showcase.test/getTours".to_string(),
            }));
        }
        Ok(self.tours.keys().copied().map(ItemId).collect())
    }

    async fn fetch_tour(
        &self,
        _run_id: Uuid,
        _showcase: &str,
        id: ItemId,
    ) -> Result<Option<JsonValue>, SourceError> {
        if self.failing_details.contains(&id.0) {
            return Err(SourceError::Shape(format!("tour {id} payload truncated")));
        }
        Ok(self.tours.get(&id.0).cloned())
    }
}

struct RejectingGroups;

#[async_trait]
impl GroupStore for RejectingGroups {
    async fn find_by_alias(&self, _alias: &str) -> Result<Option<GroupId>, StoreError> {
        Ok(None)
    }

    async fn create(&self, _group: NewGroup) -> Result<GroupId, StoreError> {
        Err(StoreError::Backend("categories table is read-only".to_string()))
    }
}

struct LockedTour {
    inner: Arc<MemoryStore>,
    locked: ItemId,
}

#[async_trait]
impl ItemStore for LockedTour {
    async fn load_item(&self, id: ItemId) -> Result<Option<ItemRecord>, StoreError> {
        self.inner.load_item(id).await
    }

    async fn save_associated_groups(
        &self,
        id: ItemId,
        groups: &AssociatedGroups,
    ) -> Result<(), StoreError> {
        if id == self.locked {
            return Err(StoreError::Backend(format!("tour {id} row is locked")));
        }
        self.inner.save_associated_groups(id, groups).await
    }

    async fn upsert_tour(&self, tour: &TourRecord) -> Result<ItemId, StoreError> {
        self.inner.upsert_tour(tour).await
    }
}

async fn members(store: &MemoryStore, group: GroupId) -> BTreeSet<i64> {
    store
        .pairs()
        .await
        .into_iter()
        .filter(|(_, g)| *g == group)
        .map(|(item, _)| item.0)
        .collect()
}

#[tokio::test]
async fn fixture_run_creates_category_and_maps_every_tour() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = SyncPipeline::new(StoreHandles::from_store(store.clone()), fixture_source());

    let summary = pipeline.run("sample-showcase").await;

    assert_eq!(summary.status, RunStatus::Ok);
    assert_eq!(summary.remote_tours, 3);
    assert_eq!(summary.upserted, 3);
    let report = summary.reconcile.expect("report");
    let group = report.group_id.expect("group");
    assert_eq!(
        store.group_alias(group).await.as_deref(),
        Some("sample-showcase")
    );
    assert_eq!(members(&store, group).await, BTreeSet::from([101, 102, 103]));

    let tour = store.tour(ItemId(102)).await.expect("tour 102");
    assert_eq!(tour.title, "Kamchatka Volcano Weekend");
    assert_eq!(tour.duration_days, Some(3));
    let item = store.item(ItemId(103)).await.expect("item 103");
    assert!(item.associated_groups.contains(group));
}

#[tokio::test]
async fn repeated_run_only_refreshes_tours() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = SyncPipeline::new(StoreHandles::from_store(store.clone()), fixture_source());
    assert_eq!(pipeline.run("sample-showcase").await.status, RunStatus::Ok);
    store.reset_write_count().await;

    let summary = pipeline.run("sample-showcase").await;

    assert_eq!(summary.status, RunStatus::Ok);
    let report = summary.reconcile.expect("report");
    assert!(report.inserted.is_empty());
    assert!(report.deleted.is_empty());
    assert_eq!(report.unchanged, 3);
    // three tour upserts, no mapping writes
    assert_eq!(store.write_count().await, 3);
}

#[tokio::test]
async fn empty_showcase_key_is_no_run() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = SyncPipeline::new(StoreHandles::from_store(store.clone()), fixture_source());

    let summary = pipeline.run("").await;

    assert_eq!(summary.status, RunStatus::NoRun);
    assert!(summary.reconcile.is_none());
    assert!(summary.log.is_empty());
    assert_eq!(store.write_count().await, 0);
}

#[tokio::test]
async fn failed_detail_still_applies_deletions_but_knocks_out() {
    let store = Arc::new(MemoryStore::new());
    let group = store.seed_group("spring").await;
    for id in [1, 2, 3] {
        store.seed_item(ItemId(id), &group.to_string()).await;
        store.seed_pair(ItemId(id), group).await;
    }
    let mut source = ScriptedSource::with_tours(&[2, 3, 4]);
    source.failing_details.insert(4);
    let pipeline = SyncPipeline::new(StoreHandles::from_store(store.clone()), Arc::new(source));

    let summary = pipeline.run("spring").await;

    assert_eq!(summary.status, RunStatus::Knockout);
    assert_eq!(summary.upserted, 2);
    let report = summary.reconcile.expect("report");
    assert_eq!(report.deleted, vec![ItemId(1)]);
    assert_eq!(report.missing, vec![ItemId(4)]);
    assert_eq!(members(&store, group).await, BTreeSet::from([2, 3]));
    let item1 = store.item(ItemId(1)).await.expect("item 1");
    assert!(item1.associated_groups.is_empty());
    assert!(summary
        .log
        .iter()
        .any(|e| e.level == LogLevel::Error && e.message.contains("fetching tour 4 failed")));
}

#[tokio::test]
async fn tour_missing_from_showcase_marks_run_failed() {
    let store = Arc::new(MemoryStore::new());
    let mut source = ScriptedSource::with_tours(&[5, 6]);
    source.tours.insert(6, json!(false));
    let pipeline = SyncPipeline::new(StoreHandles::from_store(store.clone()), Arc::new(source));

    let summary = pipeline.run("autumn").await;

    assert_eq!(summary.status, RunStatus::Knockout);
    assert_eq!(summary.item_errors, 1);
    let report = summary.reconcile.expect("report");
    assert_eq!(report.inserted, vec![ItemId(5)]);
}

#[tokio::test]
async fn category_creation_failure_aborts_before_mapping() {
    let store = Arc::new(MemoryStore::new());
    let handles = StoreHandles {
        groups: Arc::new(RejectingGroups),
        items: store.clone(),
        joins: store.clone(),
    };
    let pipeline = SyncPipeline::new(handles, Arc::new(ScriptedSource::with_tours(&[1])));

    let summary = pipeline.run("winter").await;

    assert_eq!(summary.status, RunStatus::Knockout);
    assert!(summary.reconcile.is_none());
    assert_eq!(summary.upserted, 0);
    assert_eq!(store.write_count().await, 0);
    assert!(summary
        .log
        .iter()
        .any(|e| e.message.contains("categories table is read-only")));
}

#[tokio::test]
async fn listing_failure_leaves_existing_mapping_alone() {
    let store = Arc::new(MemoryStore::new());
    let group = store.seed_group("spring").await;
    store.seed_item(ItemId(9), &group.to_string()).await;
    store.seed_pair(ItemId(9), group).await;
    let source = ScriptedSource {
        fail_listing: true,
        ..Default::default()
    };
    let pipeline = SyncPipeline::new(StoreHandles::from_store(store.clone()), Arc::new(source));

    let summary = pipeline.run("spring").await;

    assert_eq!(summary.status, RunStatus::Knockout);
    assert!(summary.reconcile.is_none());
    assert_eq!(members(&store, group).await, BTreeSet::from([9]));
}

#[tokio::test]
async fn failed_mapping_write_knocks_out_but_keeps_going() {
    let store = Arc::new(MemoryStore::new());
    let group = store.seed_group("spring").await;
    for id in [1, 2] {
        store.seed_item(ItemId(id), &group.to_string()).await;
        store.seed_pair(ItemId(id), group).await;
    }
    let handles = StoreHandles {
        groups: store.clone(),
        items: Arc::new(LockedTour {
            inner: store.clone(),
            locked: ItemId(3),
        }),
        joins: store.clone(),
    };
    let pipeline = SyncPipeline::new(handles, Arc::new(ScriptedSource::with_tours(&[2, 3, 4])));

    let summary = pipeline.run("spring").await;

    assert_eq!(summary.status, RunStatus::Knockout);
    assert_eq!(summary.upserted, 3);
    assert_eq!(summary.item_errors, 1);
    let report = summary.reconcile.expect("report");
    assert_eq!(report.deleted, vec![ItemId(1)]);
    assert_eq!(report.inserted, vec![ItemId(4)]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].item_id, ItemId(3));
    let item4 = store.item(ItemId(4)).await.expect("item 4");
    assert!(item4.associated_groups.contains(group));
    let item1 = store.item(ItemId(1)).await.expect("item 1");
    assert!(item1.associated_groups.is_empty());
}
