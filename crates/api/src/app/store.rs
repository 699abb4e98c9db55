//! In-memory item storage, registered as a service.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use routekit_core::{ResourceId, UserId};

use crate::orchestrator::{ComponentHealth, HealthCheckable, Initializable};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ResourceId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub quantity: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewItem {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ItemPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SortField {
    Name,
    Quantity,
    CreatedAt,
}

impl std::str::FromStr for SortField {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(Self::Name),
            "quantity" => Ok(Self::Quantity),
            "createdAt" | "created_at" => Ok(Self::CreatedAt),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct ItemStore {
    items: RwLock<BTreeMap<ResourceId, Item>>,
    ready: AtomicBool,
}

fn poisoned() -> anyhow::Error {
    anyhow::anyhow!("item store lock poisoned")
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, new: NewItem, owner: Option<UserId>) -> anyhow::Result<Item> {
        let now = Utc::now();
        let item = Item {
            id: ResourceId::new(),
            name: new.name,
            description: new.description,
            quantity: new.quantity,
            tags: new.tags,
            attachments: Vec::new(),
            owner,
            created_at: now,
            updated_at: now,
        };
        self.items
            .write()
            .map_err(|_| poisoned())?
            .insert(item.id, item.clone());
        Ok(item)
    }

    pub fn get(&self, id: ResourceId) -> anyhow::Result<Option<Item>> {
        Ok(self.items.read().map_err(|_| poisoned())?.get(&id).cloned())
    }

    /// Items matching `search` (case-insensitive, name or tags), sorted.
    /// Insertion order (ids are time-ordered) when no sort is given.
    pub fn query(&self, search: Option<&str>, sort: Option<(SortField, bool)>) -> anyhow::Result<Vec<Item>> {
        let needle = search.map(str::to_lowercase);
        let mut items: Vec<Item> = self
            .items
            .read()
            .map_err(|_| poisoned())?
            .values()
            .filter(|item| match &needle {
                Some(n) => {
                    item.name.to_lowercase().contains(n.as_str())
                        || item.tags.iter().any(|t| t.to_lowercase().contains(n.as_str()))
                }
                None => true,
            })
            .cloned()
            .collect();

        if let Some((field, descending)) = sort {
            items.sort_by(|a, b| {
                let ord = match field {
                    SortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
                    SortField::Quantity => a.quantity.cmp(&b.quantity),
                    SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                };
                if descending { ord.reverse() } else { ord }
            });
        }
        Ok(items)
    }

    pub fn update(&self, id: ResourceId, patch: ItemPatch) -> anyhow::Result<Option<Item>> {
        let mut items = self.items.write().map_err(|_| poisoned())?;
        let Some(item) = items.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            item.name = name;
        }
        if let Some(description) = patch.description {
            item.description = Some(description);
        }
        if let Some(quantity) = patch.quantity {
            item.quantity = quantity;
        }
        if let Some(tags) = patch.tags {
            item.tags = tags;
        }
        item.updated_at = Utc::now();
        Ok(Some(item.clone()))
    }

    pub fn attach(&self, id: ResourceId, attachments: Vec<Attachment>) -> anyhow::Result<Option<Item>> {
        let mut items = self.items.write().map_err(|_| poisoned())?;
        let Some(item) = items.get_mut(&id) else {
            return Ok(None);
        };
        item.attachments.extend(attachments);
        item.updated_at = Utc::now();
        Ok(Some(item.clone()))
    }

    pub fn remove(&self, id: ResourceId) -> anyhow::Result<bool> {
        Ok(self.items.write().map_err(|_| poisoned())?.remove(&id).is_some())
    }

    pub fn len(&self) -> usize {
        self.items.read().map(|i| i.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Initializable for ItemStore {
    async fn initialize(&self) -> anyhow::Result<()> {
        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        self.ready.store(false, Ordering::Release);
        self.items.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }
}

#[async_trait]
impl HealthCheckable for ItemStore {
    async fn health(&self) -> Option<ComponentHealth> {
        if !self.ready.load(Ordering::Acquire) {
            return Some(ComponentHealth::unhealthy("store not initialized"));
        }
        match self.items.read() {
            Ok(_) => Some(ComponentHealth::healthy()),
            Err(_) => Some(ComponentHealth::unhealthy("store lock poisoned")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_item(name: &str, quantity: i64, tags: &[&str]) -> NewItem {
        NewItem {
            name: name.to_string(),
            description: None,
            quantity,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn search_matches_name_and_tags() {
        let store = ItemStore::new();
        store.insert(new_item("Hex bolt", 10, &["metal"]), None).unwrap();
        store.insert(new_item("Washer", 5, &["Metal", "small"]), None).unwrap();
        store.insert(new_item("Glue", 1, &[]), None).unwrap();

        assert_eq!(store.query(Some("bolt"), None).unwrap().len(), 1);
        assert_eq!(store.query(Some("METAL"), None).unwrap().len(), 2);
        assert_eq!(store.query(None, None).unwrap().len(), 3);
    }

    #[test]
    fn sorts_in_both_directions() {
        let store = ItemStore::new();
        store.insert(new_item("b", 2, &[]), None).unwrap();
        store.insert(new_item("a", 3, &[]), None).unwrap();
        store.insert(new_item("c", 1, &[]), None).unwrap();

        let names = |items: Vec<Item>| items.into_iter().map(|i| i.name).collect::<Vec<_>>();
        assert_eq!(names(store.query(None, Some((SortField::Name, false))).unwrap()), ["a", "b", "c"]);
        assert_eq!(names(store.query(None, Some((SortField::Quantity, true))).unwrap()), ["a", "b", "c"]);
    }

    #[test]
    fn update_and_remove_report_absence() {
        let store = ItemStore::new();
        let item = store.insert(new_item("bolt", 1, &[]), None).unwrap();

        let patched = store
            .update(
                item.id,
                ItemPatch {
                    quantity: Some(9),
                    ..ItemPatch::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(patched.quantity, 9);
        assert_eq!(patched.name, "bolt");

        assert!(store.remove(item.id).unwrap());
        assert!(!store.remove(item.id).unwrap());
        assert_eq!(store.update(item.id, ItemPatch::default()).unwrap(), None);
    }

    #[tokio::test]
    async fn health_follows_lifecycle() {
        let store = ItemStore::new();
        assert!(!store.health().await.unwrap().healthy);
        store.initialize().await.unwrap();
        assert!(store.health().await.unwrap().healthy);
        store.insert(new_item("bolt", 1, &[]), None).unwrap();
        store.cleanup().await.unwrap();
        assert!(store.is_empty());
    }
}
