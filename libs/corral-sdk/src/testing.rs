//! In-memory [`RawOps`] used by unit tests.

use crate::error::{ApiError, RequestError};
use crate::models::{ActionDescriptor, ListOpts, RawWatchEvent, Resource, WatchOptions};
use crate::ops::{RawEventStream, RawOps};
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

const BASE: &str = "https://rancher.local/v3";

#[derive(Default)]
struct State {
    next_id: u64,
    objects: BTreeMap<(String, String), Value>,
    scripted: HashMap<(String, String), VecDeque<Value>>,
    first_pages: HashMap<String, Value>,
    open_cursor: HashMap<String, String>,
    cursor_pages: HashMap<String, Value>,
    failing_cursors: HashSet<String>,
    events: Vec<RawWatchEvent>,
    fetch_calls: usize,
    action_calls: usize,
    by_id_calls: usize,
}

#[derive(Default)]
pub struct FakeOps {
    state: Mutex<State>,
}

fn status_error(status: u16, status_text: &str, url: String) -> ApiError {
    ApiError::from_status(RequestError {
        status,
        status_text: status_text.to_owned(),
        url,
        code: None,
        message: None,
    })
}

fn not_found(url: String) -> ApiError {
    status_error(404, "Not Found", url)
}

impl FakeOps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the next page of `type_name`. The first page answers `list`,
    /// every later page answers the cursor named by the page before it.
    pub fn push_page(&self, type_name: &str, ids: &[&str], next: Option<&str>) {
        let data: Vec<Value> = ids
            .iter()
            .map(|id| json!({"id": id, "type": type_name}))
            .collect();
        let page = json!({
            "data": data,
            "pagination": {"next": next},
            "resourceType": type_name,
        });

        let mut state = self.state.lock();
        match state.open_cursor.remove(type_name) {
            Some(cursor) => {
                state.cursor_pages.insert(cursor, page);
            }
            None => {
                state.first_pages.insert(type_name.to_owned(), page);
            }
        }
        if let Some(next) = next {
            state.open_cursor.insert(type_name.to_owned(), next.to_owned());
        }
    }

    /// Make fetching `cursor` fail with a server error.
    pub fn fail_cursor(&self, cursor: &str) {
        self.state.lock().failing_cursors.insert(cursor.to_owned());
    }

    /// Queue successive representations returned by `by_id`; the last one sticks.
    pub fn script(&self, type_name: &str, id: &str, states: Vec<Value>) {
        self.state
            .lock()
            .scripted
            .insert((type_name.to_owned(), id.to_owned()), states.into());
    }

    /// Events replayed by the next watch subscription.
    pub fn push_events(&self, events: Vec<RawWatchEvent>) {
        self.state.lock().events.extend(events);
    }

    pub fn fetch_calls(&self) -> usize {
        self.state.lock().fetch_calls
    }

    pub fn action_calls(&self) -> usize {
        self.state.lock().action_calls
    }

    pub fn by_id_calls(&self) -> usize {
        self.state.lock().by_id_calls
    }
}

#[async_trait]
impl RawOps for FakeOps {
    async fn raw_create(&self, type_name: &str, body: Value) -> Result<Value, ApiError> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = format!("{type_name}-{}", state.next_id);
        let url = format!("{BASE}/{type_name}s/{id}");

        let mut object = match body {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        object.insert("id".to_owned(), json!(id));
        object.insert("type".to_owned(), json!(type_name));
        object.insert("links".to_owned(), json!({"self": url}));
        object.insert(
            "actions".to_owned(),
            json!({"generateKubeconfig": format!("{url}?action=generateKubeconfig")}),
        );

        let object = Value::Object(object);
        state
            .objects
            .insert((type_name.to_owned(), id), object.clone());
        Ok(object)
    }

    async fn raw_by_id(&self, type_name: &str, id: &str) -> Result<Value, ApiError> {
        let mut state = self.state.lock();
        state.by_id_calls += 1;
        let key = (type_name.to_owned(), id.to_owned());

        if let Some(queue) = state.scripted.get_mut(&key) {
            let next = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            if let Some(next) = next {
                return Ok(next);
            }
        }

        state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| not_found(format!("{BASE}/{type_name}s/{id}")))
    }

    async fn raw_update(
        &self,
        type_name: &str,
        target: &Resource,
        body: Value,
    ) -> Result<Value, ApiError> {
        let mut state = self.state.lock();
        let key = (type_name.to_owned(), target.id.clone());
        let Some(Value::Object(stored)) = state.objects.get_mut(&key) else {
            return Err(not_found(format!("{BASE}/{type_name}s/{}", target.id)));
        };

        let Value::Object(body) = body else {
            return Err(status_error(422, "Unprocessable Entity", target.label()));
        };
        // A body carrying the identity is a full representation.
        if body.contains_key("id") {
            *stored = body;
        } else {
            stored.extend(body);
        }
        Ok(Value::Object(stored.clone()))
    }

    async fn raw_delete(&self, target: &Resource) -> Result<(), ApiError> {
        let key = (target.type_name.clone(), target.id.clone());
        match self.state.lock().objects.remove(&key) {
            Some(_) => Ok(()),
            None => Err(not_found(target.label())),
        }
    }

    async fn raw_list(&self, type_name: &str, _opts: &ListOpts) -> Result<Value, ApiError> {
        let state = self.state.lock();
        if let Some(page) = state.first_pages.get(type_name) {
            return Ok(page.clone());
        }
        let data: Vec<Value> = state
            .objects
            .iter()
            .filter(|((t, _), _)| t == type_name)
            .map(|(_, object)| object.clone())
            .collect();
        Ok(json!({"data": data, "resourceType": type_name}))
    }

    async fn raw_fetch(&self, url: &str) -> Result<Value, ApiError> {
        let mut state = self.state.lock();
        state.fetch_calls += 1;
        if state.failing_cursors.contains(url) {
            return Err(status_error(500, "Internal Server Error", url.to_owned()));
        }
        state
            .cursor_pages
            .get(url)
            .cloned()
            .ok_or_else(|| not_found(url.to_owned()))
    }

    async fn raw_action(
        &self,
        _action: &ActionDescriptor,
        input: Option<Value>,
    ) -> Result<Option<Value>, ApiError> {
        self.state.lock().action_calls += 1;
        Ok(Some(json!({"echo": input.unwrap_or(Value::Null)})))
    }

    async fn raw_watch(
        &self,
        _type_name: &str,
        _opts: &WatchOptions,
    ) -> Result<RawEventStream, ApiError> {
        let events = std::mem::take(&mut self.state.lock().events);
        Ok(stream::iter(events.into_iter().map(Ok)).boxed())
    }
}
