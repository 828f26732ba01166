//! Core domain model for showcase tour synchronization.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub const CRATE_NAME: &str = "tourbridge-core";

/// Local category identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub i64);

/// Tour identifier, shared between the remote showcase and local storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub i64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Denormalized copy of an item's join rows, persisted as `"3,7,12"`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssociatedGroups(BTreeSet<GroupId>);

impl AssociatedGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the stored delimited form. Empty and non-numeric fragments are dropped.
    pub fn parse(stored: &str) -> Self {
        Self(
            stored
                .split(',')
                .filter_map(|part| part.trim().parse::<i64>().ok())
                .map(GroupId)
                .collect(),
        )
    }

    pub fn encode(&self) -> String {
        self.0
            .iter()
            .map(|id| id.0.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn contains(&self, group: GroupId) -> bool {
        self.0.contains(&group)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<GroupId> for AssociatedGroups {
    fn from_iter<I: IntoIterator<Item = GroupId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupParams {
    pub tours_show: bool,
    pub seo_category_title: String,
    pub seo_category_h1: String,
}

impl Default for GroupParams {
    fn default() -> Self {
        Self {
            tours_show: false,
            seo_category_title: "Tours".to_string(),
            seo_category_h1: "Tours".to_string(),
        }
    }
}

/// Category row created lazily the first time a showcase is synchronized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGroup {
    pub alias: String,
    pub title: String,
    pub published: bool,
    pub show: bool,
    pub parent_id: i64,
    pub params: GroupParams,
}

impl NewGroup {
    pub fn for_showcase(alias: &str) -> Self {
        Self {
            alias: alias.to_string(),
            title: format!("Showcase {alias}"),
            published: true,
            show: false,
            parent_id: 1,
            params: GroupParams::default(),
        }
    }
}

/// The slice of a stored tour the reconciler reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: ItemId,
    pub associated_groups: AssociatedGroups,
}

/// Normalized tour ready to be upserted. Never carries `associated_groups`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourRecord {
    pub id: ItemId,
    pub title: String,
    pub alias: String,
    pub description: Option<String>,
    pub price_from: Option<f64>,
    pub currency: Option<String>,
    pub duration_days: Option<u32>,
    pub payload: JsonValue,
    pub synced_at: DateTime<Utc>,
}

/// Coarse outcome reported to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Ok,
    NoRun,
    Knockout,
}

impl RunStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Ok => 0,
            RunStatus::Knockout => 1,
            RunStatus::NoRun => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Ok => "ok",
            RunStatus::NoRun => "no_run",
            RunStatus::Knockout => "knockout",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn new_run_id() -> Uuid {
    Uuid::new_v4()
}
