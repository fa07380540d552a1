/// Whether an action addresses a single entity or a whole collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionScope {
    Resource,
    Collection,
}

/// Everything needed to invoke a named action.
///
/// Built from the action map of a fetched entity or collection, so only
/// actions the server currently permits can be described. `input`/`output`
/// name the payload schema types when schema discovery knows them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDescriptor {
    pub name: String,
    pub url: String,
    pub scope: ActionScope,
    pub input: Option<String>,
    pub output: Option<String>,
}

impl ActionDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>, scope: ActionScope) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            scope,
            input: None,
            output: None,
        }
    }

    /// Whether the server declares an input payload for this action
    #[must_use]
    pub fn takes_input(&self) -> bool {
        self.input.is_some()
    }
}
