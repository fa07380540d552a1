use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// `transitioning` value while the server is still converging an entity
pub const TRANSITIONING_YES: &str = "yes";
/// `transitioning` value once an entity has settled successfully
pub const TRANSITIONING_NO: &str = "no";
/// `transitioning` value once an entity has settled into a failure
pub const TRANSITIONING_ERROR: &str = "error";

/// The envelope every server-managed entity carries.
///
/// `actions` only lists what the server currently authorizes for the caller;
/// it is refreshed by re-fetching, never edited locally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub actions: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transitioning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transitioning_message: Option<String>,
}

impl Resource {
    /// URL of a named link (`self`, `remove`, related collections, ...)
    #[must_use]
    pub fn link(&self, name: &str) -> Option<&str> {
        self.links.get(name).map(String::as_str)
    }

    /// URL of a named action, if the server currently permits it
    #[must_use]
    pub fn action_url(&self, name: &str) -> Option<&str> {
        self.actions.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn has_action(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Whether the server is still converging this entity
    #[must_use]
    pub fn is_transitioning(&self) -> bool {
        self.transitioning.as_deref() == Some(TRANSITIONING_YES)
    }

    /// `<type>/<id>` label used in errors and logs
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}/{}", self.type_name, self.id)
    }
}

/// Access to the embedded [`Resource`] envelope.
pub trait HasResource {
    fn resource(&self) -> &Resource;

    fn id(&self) -> &str {
        &self.resource().id
    }
}

impl HasResource for Resource {
    fn resource(&self) -> &Resource {
        self
    }
}

/// A typed entity bound to one schema type name.
pub trait ApiType: HasResource {
    /// Schema type name, e.g. `"cluster"`
    const TYPE_NAME: &'static str;
}

/// An entity of any type: the envelope plus every other field, untyped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenericObject {
    #[serde(flatten)]
    pub resource: Resource,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl GenericObject {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

impl HasResource for GenericObject {
    fn resource(&self) -> &Resource {
        &self.resource
    }
}
