use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tourbridge_core::{AssociatedGroups, GroupId, ItemId, ItemRecord, NewGroup, TourRecord};
use tracing::debug;

use crate::{GroupStore, ItemStore, JoinStore, StoreError};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl GroupStore for PgStore {
    async fn find_by_alias(&self, alias: &str) -> Result<Option<GroupId>, StoreError> {
        let row = sqlx::query("SELECT id FROM categories WHERE alias = $1")
            .bind(alias)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get::<i64, _>("id").map(GroupId))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn create(&self, group: NewGroup) -> Result<GroupId, StoreError> {
        let params = serde_json::to_value(&group.params)
            .map_err(|err| StoreError::Backend(format!("encoding category params: {err}")))?;
        let row = sqlx::query(
            r#"
            INSERT INTO categories (alias, title, state, show, parent_id, params)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (alias) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&group.alias)
        .bind(&group.title)
        .bind(if group.published { 1i16 } else { 0i16 })
        .bind(group.show)
        .bind(group.parent_id)
        .bind(sqlx::types::Json(params))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(GroupId(row.try_get("id")?)),
            None => Err(StoreError::DuplicateAlias(group.alias)),
        }
    }
}

#[async_trait]
impl ItemStore for PgStore {
    async fn load_item(&self, id: ItemId) -> Result<Option<ItemRecord>, StoreError> {
        let row = sqlx::query("SELECT id, additional_categories FROM tours WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let stored: Option<String> = row.try_get("additional_categories")?;
        Ok(Some(ItemRecord {
            id: ItemId(row.try_get("id")?),
            associated_groups: AssociatedGroups::parse(stored.as_deref().unwrap_or_default()),
        }))
    }

    async fn save_associated_groups(
        &self,
        id: ItemId,
        groups: &AssociatedGroups,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE tours SET additional_categories = $2 WHERE id = $1")
            .bind(id.0)
            .bind(groups.encode())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "tour",
                id: id.0,
            });
        }
        Ok(())
    }

    async fn upsert_tour(&self, tour: &TourRecord) -> Result<ItemId, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tours (
                id, title, alias, description, price_from, currency,
                duration_days, additional_categories, payload, synced_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, '', $8, $9)
            ON CONFLICT (id) DO UPDATE
               SET title = EXCLUDED.title,
                   alias = EXCLUDED.alias,
                   description = EXCLUDED.description,
                   price_from = EXCLUDED.price_from,
                   currency = EXCLUDED.currency,
                   duration_days = EXCLUDED.duration_days,
                   payload = EXCLUDED.payload,
                   synced_at = EXCLUDED.synced_at
            "#,
        )
        .bind(tour.id.0)
        .bind(&tour.title)
        .bind(&tour.alias)
        .bind(&tour.description)
        .bind(tour.price_from)
        .bind(&tour.currency)
        .bind(tour.duration_days.map(i32::try_from).transpose().map_err(|_| {
            StoreError::Backend(format!("tour {} duration out of range", tour.id))
        })?)
        .bind(sqlx::types::Json(&tour.payload))
        .bind(tour.synced_at)
        .execute(&self.pool)
        .await?;
        debug!(tour_id = tour.id.0, "upserted tour");
        Ok(tour.id)
    }
}

#[async_trait]
impl JoinStore for PgStore {
    async fn insert_pair(&self, item: ItemId, group: GroupId) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tour_categories (tour_id, category_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(item.0)
        .bind(group.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_pair(&self, item: ItemId, group: GroupId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM tour_categories WHERE tour_id = $1 AND category_id = $2")
            .bind(item.0)
            .bind(group.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn item_ids_for_group(&self, group: GroupId) -> Result<Vec<ItemId>, StoreError> {
        let rows = sqlx::query(
            "SELECT tour_id FROM tour_categories WHERE category_id = $1 ORDER BY tour_id",
        )
        .bind(group.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| row.try_get::<i64, _>("tour_id").map(ItemId))
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    async fn group_ids_for_item(&self, item: ItemId) -> Result<Vec<GroupId>, StoreError> {
        let rows = sqlx::query(
            "SELECT category_id FROM tour_categories WHERE tour_id = $1 ORDER BY category_id",
        )
        .bind(item.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| row.try_get::<i64, _>("category_id").map(GroupId))
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }
}
