//! Work-item providers.
//!
//! Runs may reference a work item (ticket, issue) by id. A provider resolves
//! and manages those items. The engine only uses `fetch`, to enrich a new
//! run's metadata; everything else is exposed through `runway item`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::errors::{Result, RunwayError};
use crate::store::{self, StoreLayout};

pub const WORK_ITEMS_DIR: &str = "work-items";

/// Which provider implementation to use, chosen by `[provider] kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// No work-item tracking. Runs keep the raw `work_item_id` only.
    #[default]
    None,
    /// Work items stored as JSON files in the state root.
    Local,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::None => write!(f, "none"),
            ProviderKind::Local => write!(f, "local"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Create,
    Fetch,
    Update,
    Close,
    Comment,
    Label,
    Milestone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkItemState {
    #[default]
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItemComment {
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub state: WorkItemState,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone: Option<String>,
    #[serde(default)]
    pub comments: Vec<WorkItemComment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields that `update` may change. `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct WorkItemUpdate {
    pub title: Option<String>,
    pub body: Option<String>,
}

pub trait WorkItemProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn capabilities(&self) -> &'static [Capability];

    fn create(&self, title: &str, body: &str) -> Result<WorkItem>;

    fn fetch(&self, id: &str) -> Result<WorkItem>;

    fn update(&self, id: &str, update: WorkItemUpdate) -> Result<WorkItem>;

    fn close(&self, id: &str) -> Result<WorkItem>;

    fn comment(&self, id: &str, body: &str) -> Result<WorkItem>;

    fn label(&self, id: &str, label: &str) -> Result<WorkItem>;

    fn milestone(&self, id: &str, milestone: &str) -> Result<WorkItem>;
}

/// Build the configured provider, or `None` when tracking is disabled.
pub fn build_provider(kind: ProviderKind, layout: &StoreLayout) -> Option<Arc<dyn WorkItemProvider>> {
    match kind {
        ProviderKind::None => None,
        ProviderKind::Local => Some(Arc::new(LocalProvider::new(layout))),
    }
}

/// Work items as `<root>/work-items/<id>.json`, with ids `WI-1`, `WI-2`, ...
#[derive(Debug, Clone)]
pub struct LocalProvider {
    dir: PathBuf,
}

impl LocalProvider {
    pub fn new(layout: &StoreLayout) -> Self {
        Self {
            dir: layout.root().join(WORK_ITEMS_DIR),
        }
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(RunwayError::WorkItemNotFound(id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }

    fn next_number(&self) -> Result<u64> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(1),
            Err(e) => return Err(RunwayError::storage(&self.dir, e)),
        };
        let highest = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                e.file_name()
                    .to_str()
                    .and_then(|name| name.strip_prefix("WI-"))
                    .and_then(|rest| rest.strip_suffix(".json"))
                    .and_then(|n| n.parse::<u64>().ok())
            })
            .max()
            .unwrap_or(0);
        Ok(highest + 1)
    }

    fn modify(&self, id: &str, change: impl FnOnce(&mut WorkItem)) -> Result<WorkItem> {
        let mut item = self.fetch(id)?;
        change(&mut item);
        item.updated_at = Utc::now();
        store::write_json(&self.path_for(id)?, &item)?;
        debug!(work_item = %id, "updated work item");
        Ok(item)
    }
}

impl WorkItemProvider for LocalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[
            Capability::Create,
            Capability::Fetch,
            Capability::Update,
            Capability::Close,
            Capability::Comment,
            Capability::Label,
            Capability::Milestone,
        ]
    }

    fn create(&self, title: &str, body: &str) -> Result<WorkItem> {
        if title.trim().is_empty() {
            return Err(RunwayError::Validation(
                "work item title must not be empty".to_string(),
            ));
        }
        store::ensure_dir(&self.dir)?;
        loop {
            let id = format!("WI-{}", self.next_number()?);
            let now = Utc::now();
            let item = WorkItem {
                id: id.clone(),
                title: title.trim().to_string(),
                body: body.to_string(),
                state: WorkItemState::Open,
                labels: Vec::new(),
                milestone: None,
                comments: Vec::new(),
                created_at: now,
                updated_at: now,
            };
            let path = self.path_for(&id)?;
            let json = serde_json::to_vec_pretty(&item)
                .map_err(|e| RunwayError::serialization(&path, e))?;
            if store::atomic_create(&path, &json)? {
                debug!(work_item = %id, "created work item");
                return Ok(item);
            }
        }
    }

    fn fetch(&self, id: &str) -> Result<WorkItem> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Err(RunwayError::WorkItemNotFound(id.to_string()));
        }
        store::read_json(&path)
    }

    fn update(&self, id: &str, update: WorkItemUpdate) -> Result<WorkItem> {
        self.modify(id, |item| {
            if let Some(title) = update.title {
                item.title = title;
            }
            if let Some(body) = update.body {
                item.body = body;
            }
        })
    }

    fn close(&self, id: &str) -> Result<WorkItem> {
        self.modify(id, |item| item.state = WorkItemState::Closed)
    }

    fn comment(&self, id: &str, body: &str) -> Result<WorkItem> {
        self.modify(id, |item| {
            item.comments.push(WorkItemComment {
                body: body.to_string(),
                created_at: Utc::now(),
            })
        })
    }

    fn label(&self, id: &str, label: &str) -> Result<WorkItem> {
        self.modify(id, |item| {
            if !item.labels.iter().any(|l| l == label) {
                item.labels.push(label.to_string());
            }
        })
    }

    fn milestone(&self, id: &str, milestone: &str) -> Result<WorkItem> {
        self.modify(id, |item| item.milestone = Some(milestone.to_string()))
    }
}
