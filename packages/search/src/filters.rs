//! Filter parameters passed alongside a radius search, and the region
//! hierarchy used to label them.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Result ordering requested from the content API.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SortOrder {
    /// Alphabetical by name.
    Name,
    /// Nearest to the query center first.
    Distance,
}

/// Filters carried with a search.
///
/// Every field is optional; unset and blank fields are left out of the
/// request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    /// Region id.
    pub region: Option<i64>,
    /// Category id.
    pub category: Option<i64>,
    /// Free-text term.
    pub term: Option<String>,
    /// 1-based page number.
    pub page: Option<u32>,
    /// Results per page.
    pub page_size: Option<u32>,
    /// Result ordering.
    pub ordering: Option<SortOrder>,
}

impl SearchFilters {
    /// The free-text term, trimmed, if it is not blank.
    #[must_use]
    pub fn term(&self) -> Option<&str> {
        self.term
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }

    /// Same filters, on page `page`.
    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Query parameters for the set fields.
    #[must_use]
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(region) = self.region {
            pairs.push(("region", region.to_string()));
        }
        if let Some(category) = self.category {
            pairs.push(("category", category.to_string()));
        }
        if let Some(term) = self.term() {
            pairs.push(("search", term.to_string()));
        }
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(page_size) = self.page_size {
            pairs.push(("page_size", page_size.to_string()));
        }
        if let Some(ordering) = self.ordering {
            pairs.push(("ordering", ordering.to_string()));
        }
        pairs
    }

    /// Picks the filter parameters out of `pairs`, ignoring unknown keys
    /// and values that do not parse.
    pub fn from_query_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut filters = Self::default();
        for (key, value) in pairs {
            let value = value.as_ref();
            match key.as_ref() {
                "region" => filters.region = value.parse().ok(),
                "category" => filters.category = value.parse().ok(),
                "search" => filters.term = Some(value.to_string()),
                "page" => filters.page = value.parse().ok(),
                "page_size" => filters.page_size = value.parse().ok(),
                "ordering" => filters.ordering = value.parse().ok(),
                _ => {}
            }
        }
        filters
    }
}

/// Index of a node in a [`RegionTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionIndex(usize);

/// A region option as listed by the content API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRecord {
    /// Region id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Id of the enclosing region.
    #[serde(default, alias = "parent")]
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone)]
struct RegionNode {
    id: i64,
    name: String,
    parent: Option<RegionIndex>,
}

/// Region options as a flat arena with parent back-references.
///
/// Used to label a selected region filter with its full path. Nodes do
/// not own their children.
#[derive(Debug, Clone, Default)]
pub struct RegionTree {
    nodes: Vec<RegionNode>,
}

impl RegionTree {
    /// Builds the tree from records in any order.
    ///
    /// Records whose parent is unknown, or that take part in a parent
    /// cycle, become roots.
    #[must_use]
    pub fn from_records(records: &[RegionRecord]) -> Self {
        let mut tree = Self::default();
        let mut pending: Vec<&RegionRecord> = records.iter().collect();

        while !pending.is_empty() {
            let before = pending.len();
            pending.retain(|record| {
                let parent = match record.parent_id {
                    None => None,
                    Some(parent_id) => match tree.find(parent_id) {
                        Some(index) => Some(index),
                        None if records.iter().any(|r| r.id == parent_id) => return true,
                        None => None,
                    },
                };
                tree.insert(record.id, &record.name, parent);
                false
            });

            if pending.len() == before {
                log::warn!(
                    "Region hierarchy has a cycle; treating {} regions as roots",
                    pending.len()
                );
                for record in pending.drain(..) {
                    tree.insert(record.id, &record.name, None);
                }
            }
        }

        tree
    }

    /// Adds a region below `parent`.
    pub fn insert(&mut self, id: i64, name: &str, parent: Option<RegionIndex>) -> RegionIndex {
        self.nodes.push(RegionNode {
            id,
            name: name.to_string(),
            parent,
        });
        RegionIndex(self.nodes.len() - 1)
    }

    /// Number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no regions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Finds the region with `id`.
    #[must_use]
    pub fn find(&self, id: i64) -> Option<RegionIndex> {
        self.nodes
            .iter()
            .position(|node| node.id == id)
            .map(RegionIndex)
    }

    /// Display name of `index`.
    #[must_use]
    pub fn name(&self, index: RegionIndex) -> Option<&str> {
        self.nodes.get(index.0).map(|node| node.name.as_str())
    }

    /// Names from the root down to `index`.
    #[must_use]
    pub fn breadcrumb(&self, index: RegionIndex) -> Vec<&str> {
        let mut names = Vec::new();
        let mut current = Some(index);
        while let Some(RegionIndex(i)) = current {
            let Some(node) = self.nodes.get(i) else {
                break;
            };
            names.push(node.name.as_str());
            current = node.parent;
        }
        names.reverse();
        names
    }

    /// Breadcrumb label for the region with `id`, e.g.
    /// `"Jihomoravský kraj › Brno-město"`.
    #[must_use]
    pub fn label(&self, id: i64) -> Option<String> {
        self.find(id)
            .map(|index| self.breadcrumb(index).join(" › "))
    }
}
