//! Schema discovery.
//!
//! `GET <base>/schemas` lists every type the caller can see together with
//! its collection URL and the payload types of its actions. Knowing a schema
//! is never required: unknown types fall back to `<base>/<type>`.

use corral_sdk::models::{ActionDescriptor, ActionScope, HasResource, Resource};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// Input/output payload types of one action
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ActionSchema {
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(flatten)]
    pub resource: Resource,
    #[serde(default)]
    pub plural_name: Option<String>,
    #[serde(default)]
    pub resource_actions: BTreeMap<String, ActionSchema>,
    #[serde(default)]
    pub collection_actions: BTreeMap<String, ActionSchema>,
}

impl HasResource for Schema {
    fn resource(&self) -> &Resource {
        &self.resource
    }
}

impl Schema {
    /// Collection URL advertised by the schema
    #[must_use]
    pub fn collection_url(&self) -> Option<&str> {
        self.resource.link("collection")
    }
}

/// Known schemas by type name
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    by_type: HashMap<String, Schema>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_schemas(schemas: impl IntoIterator<Item = Schema>) -> Self {
        let by_type = schemas
            .into_iter()
            .filter(|s| !s.resource.id.is_empty())
            .map(|s| (s.resource.id.clone(), s))
            .collect();
        Self { by_type }
    }

    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<&Schema> {
        self.by_type.get(type_name)
    }

    #[must_use]
    pub fn collection_url(&self, type_name: &str) -> Option<&str> {
        self.get(type_name).and_then(Schema::collection_url)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    /// Action descriptor enriched with the payload types the schema declares
    #[must_use]
    pub fn describe(
        &self,
        type_name: &str,
        name: &str,
        url: &str,
        scope: ActionScope,
    ) -> ActionDescriptor {
        let mut descriptor = ActionDescriptor::new(name, url, scope);
        let declared = self.get(type_name).and_then(|schema| match scope {
            ActionScope::Resource => schema.resource_actions.get(name),
            ActionScope::Collection => schema.collection_actions.get(name),
        });
        if let Some(declared) = declared {
            descriptor.input.clone_from(&declared.input);
            descriptor.output.clone_from(&declared.output);
        }
        descriptor
    }
}
