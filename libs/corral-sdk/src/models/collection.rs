use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pagination block of a collection page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Absolute URL of the next page; absent or empty when exhausted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Set by the server when `total` is an estimate
    #[serde(default)]
    pub partial: bool,
}

/// One page of entities of a single type.
///
/// Concatenating every page in cursor order yields the full result set as of
/// the time each page was fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    /// Collection-scoped actions permitted for the caller
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub actions: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            pagination: None,
            actions: BTreeMap::new(),
            links: BTreeMap::new(),
            resource_type: None,
        }
    }
}

impl<T> Collection<T> {
    /// Cursor of the next page, if any
    #[must_use]
    pub fn next_cursor(&self) -> Option<&str> {
        self.pagination
            .as_ref()
            .and_then(|p| p.next.as_deref())
            .filter(|next| !next.is_empty())
    }

    /// Whether more pages follow this one
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.next_cursor().is_some()
    }

    /// URL of a collection-scoped action, if permitted
    #[must_use]
    pub fn action_url(&self, name: &str) -> Option<&str> {
        self.actions.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Move the elements of a later page onto this one and take over its cursor
    pub fn append_page(&mut self, page: Collection<T>) {
        self.data.extend(page.data);
        self.pagination = page.pagination;
    }
}

impl<T> IntoIterator for Collection<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}

/// Query options for a list call.
///
/// Filters are passed through verbatim as query parameters; nothing is
/// validated client-side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOpts {
    pub filters: BTreeMap<String, String>,
    pub limit: Option<u64>,
}

impl ListOpts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality filter (`?name=value`)
    #[must_use]
    pub fn filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(name.into(), value.into());
        self
    }

    /// Ask the server for at most `limit` items per page
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query pairs in a stable order, `limit` last
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .filters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_owned(), limit.to_string()));
        }
        pairs
    }
}
