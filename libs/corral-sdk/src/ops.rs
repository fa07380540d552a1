//! Typed resource operations.
//!
//! [`RawOps`] is the object-safe transport seam: every call moves untyped
//! JSON. [`Ops`] is implemented for every `RawOps` and adds the typed API
//! on top (decoding, action pre-checks, cursor following).

use crate::error::{ApiError, PartialListError};
use crate::models::{
    ActionDescriptor, ActionScope, Collection, HasResource, ListOpts, RawWatchEvent, Resource,
    WatchEvent, WatchOptions,
};
use crate::pager::CollectionPager;
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;

/// Raw event stream returned by a watch subscription
pub type RawEventStream = BoxStream<'static, Result<RawWatchEvent, ApiError>>;

/// Typed event stream returned by [`Ops::watch`]
pub type EventStream<T> = BoxStream<'static, Result<WatchEvent<T>, ApiError>>;

/// One page fetch issued by [`Ops::items`]
type PageFuture<'a, R> = BoxFuture<'a, Result<Collection<R>, ApiError>>;

/// Action input for actions that take no payload
pub const NO_INPUT: Option<&()> = None;

/// Untyped transport operations.
///
/// Implementations own URL construction and error mapping: a non-success
/// status becomes [`ApiError::Request`] (or [`ApiError::NotFound`] for 404),
/// a failure without a response becomes [`ApiError::Transport`].
#[async_trait]
pub trait RawOps: Send + Sync {
    /// `POST <collection>` with `body`; returns the created entity
    async fn raw_create(&self, type_name: &str, body: Value) -> Result<Value, ApiError>;

    /// `GET <collection>/<id>`
    async fn raw_by_id(&self, type_name: &str, id: &str) -> Result<Value, ApiError>;

    /// `PUT` to the existing entity with `body`
    async fn raw_update(
        &self,
        type_name: &str,
        target: &Resource,
        body: Value,
    ) -> Result<Value, ApiError>;

    /// `DELETE` the existing entity
    async fn raw_delete(&self, target: &Resource) -> Result<(), ApiError>;

    /// `GET <collection>?<filters>`; returns the first page
    async fn raw_list(&self, type_name: &str, opts: &ListOpts) -> Result<Value, ApiError>;

    /// `GET` an absolute URL (pagination cursor, entity link)
    async fn raw_fetch(&self, url: &str) -> Result<Value, ApiError>;

    /// `POST <action url>`; `None` when the server answered without a body
    async fn raw_action(
        &self,
        action: &ActionDescriptor,
        input: Option<Value>,
    ) -> Result<Option<Value>, ApiError>;

    /// Subscribe to change events of a type
    async fn raw_watch(
        &self,
        type_name: &str,
        opts: &WatchOptions,
    ) -> Result<RawEventStream, ApiError>;

    /// Describe a permitted action. Implementations with schema knowledge
    /// fill in the payload types.
    fn describe_action(
        &self,
        _type_name: &str,
        name: &str,
        url: &str,
        scope: ActionScope,
    ) -> ActionDescriptor {
        ActionDescriptor::new(name, url, scope)
    }
}

fn decode<R: DeserializeOwned>(what: &str, value: Value) -> Result<R, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::decode(what, e))
}

fn encode<P: Serialize + ?Sized>(what: &str, payload: &P) -> Result<Value, ApiError> {
    serde_json::to_value(payload).map_err(|e| ApiError::decode(what, e))
}

fn decode_output<O: DeserializeOwned>(
    action: &str,
    output: Option<Value>,
) -> Result<Option<O>, ApiError> {
    match output {
        None | Some(Value::Null) => Ok(None),
        Some(value) => decode(&format!("output of action '{action}'"), value).map(Some),
    }
}

/// Typed operations over any [`RawOps`].
#[async_trait]
pub trait Ops: RawOps {
    /// Create an entity and return it with its server-assigned identity.
    ///
    /// # Errors
    ///
    /// Request/transport errors, or [`ApiError::Decode`] if the response
    /// lacks an identity.
    async fn create<P, R>(&self, type_name: &str, payload: &P) -> Result<R, ApiError>
    where
        P: Serialize + Sync + ?Sized,
        R: DeserializeOwned + HasResource + Send,
    {
        tracing::debug!(type_name, "creating resource");
        let body = encode(type_name, payload)?;
        let created: R = decode(type_name, self.raw_create(type_name, body).await?)?;
        if created.id().is_empty() {
            return Err(ApiError::decode(
                type_name,
                "created resource carries no identity",
            ));
        }
        Ok(created)
    }

    /// Apply `delta` to an existing entity.
    ///
    /// # Errors
    ///
    /// Request/transport errors, or a decode failure.
    async fn update<E, P, R>(&self, type_name: &str, existing: &E, delta: &P) -> Result<R, ApiError>
    where
        E: HasResource + Sync + ?Sized,
        P: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send,
    {
        tracing::debug!(type_name, id = existing.id(), "updating resource");
        let body = encode(type_name, delta)?;
        let updated = self
            .raw_update(type_name, existing.resource(), body)
            .await?;
        decode(type_name, updated)
    }

    /// Overwrite an entity with its complete representation.
    ///
    /// # Errors
    ///
    /// Request/transport errors, or a decode failure.
    async fn replace<R>(&self, type_name: &str, full: &R) -> Result<R, ApiError>
    where
        R: Serialize + DeserializeOwned + HasResource + Send + Sync,
    {
        tracing::debug!(type_name, id = full.id(), "replacing resource");
        let body = encode(type_name, full)?;
        let replaced = self.raw_update(type_name, full.resource(), body).await?;
        decode(type_name, replaced)
    }

    /// Fetch an entity by identity.
    ///
    /// # Errors
    ///
    /// [`ApiError::NotFound`] when no such identity exists.
    async fn by_id<R>(&self, type_name: &str, id: &str) -> Result<R, ApiError>
    where
        R: DeserializeOwned + Send,
    {
        tracing::debug!(type_name, id, "fetching resource");
        decode(type_name, self.raw_by_id(type_name, id).await?)
    }

    /// Delete an existing entity.
    ///
    /// # Errors
    ///
    /// Request/transport errors; a repeated delete usually yields
    /// [`ApiError::NotFound`].
    async fn delete<E>(&self, existing: &E) -> Result<(), ApiError>
    where
        E: HasResource + Sync + ?Sized,
    {
        tracing::debug!(resource = %existing.resource().label(), "deleting resource");
        self.raw_delete(existing.resource()).await
    }

    /// Fetch the first page of a type.
    ///
    /// # Errors
    ///
    /// Request/transport errors, or a decode failure.
    async fn list<R>(&self, type_name: &str, opts: &ListOpts) -> Result<Collection<R>, ApiError>
    where
        R: DeserializeOwned + Send,
    {
        tracing::debug!(type_name, filters = opts.filters.len(), "listing resources");
        decode(type_name, self.raw_list(type_name, opts).await?)
    }

    /// Follow the cursor of `page`; `Ok(None)` when `page` was the last one.
    ///
    /// # Errors
    ///
    /// Request/transport errors, or a decode failure.
    async fn next<R>(&self, page: &Collection<R>) -> Result<Option<Collection<R>>, ApiError>
    where
        R: DeserializeOwned + Send + Sync,
    {
        let Some(cursor) = page.next_cursor() else {
            return Ok(None);
        };
        tracing::debug!(cursor, "fetching next page");
        let next = decode("collection page", self.raw_fetch(cursor).await?)?;
        Ok(Some(next))
    }

    /// Fetch every page of a type, concatenated in cursor order.
    ///
    /// # Errors
    ///
    /// On the first failing page, returns everything fetched so far together
    /// with the cause.
    async fn list_all<R>(
        &self,
        type_name: &str,
        opts: &ListOpts,
    ) -> Result<Collection<R>, PartialListError<R>>
    where
        R: DeserializeOwned + Send + Sync,
    {
        let mut all: Collection<R> = match self.list(type_name, opts).await {
            Ok(first) => first,
            Err(source) => {
                return Err(PartialListError {
                    partial: Collection::default(),
                    source,
                });
            }
        };

        let mut seen = HashSet::new();
        while let Some(cursor) = all.next_cursor().map(str::to_owned) {
            if !seen.insert(cursor.clone()) {
                let source =
                    ApiError::decode(type_name, format!("pagination cursor repeats: {cursor}"));
                return Err(PartialListError {
                    partial: all,
                    source,
                });
            }

            let page = match self.raw_fetch(&cursor).await {
                Ok(value) => decode::<Collection<R>>("collection page", value),
                Err(e) => Err(e),
            };
            match page {
                Ok(page) => all.append_page(page),
                Err(source) => {
                    tracing::debug!(
                        type_name,
                        fetched = all.data.len(),
                        error = %source,
                        "listing stopped early"
                    );
                    return Err(PartialListError {
                        partial: all,
                        source,
                    });
                }
            }
        }

        tracing::debug!(type_name, total = all.data.len(), "listed all pages");
        Ok(all)
    }

    /// Invoke a resource-scoped action.
    ///
    /// Fails locally with [`ApiError::ActionNotPermitted`], without any
    /// network call, when `target` does not expose `action`.
    ///
    /// # Errors
    ///
    /// [`ApiError::ActionNotPermitted`], request/transport errors, or a
    /// decode failure of the output.
    async fn do_action<E, I, O>(
        &self,
        type_name: &str,
        action: &str,
        target: &E,
        input: Option<&I>,
    ) -> Result<Option<O>, ApiError>
    where
        E: HasResource + Sync + ?Sized,
        I: Serialize + Sync + ?Sized,
        O: DeserializeOwned + Send,
    {
        let resource = target.resource();
        let Some(url) = resource.action_url(action) else {
            return Err(ApiError::ActionNotPermitted {
                action: action.to_owned(),
                target: resource.label(),
            });
        };

        let descriptor = self.describe_action(type_name, action, url, ActionScope::Resource);
        let input = input.map(|i| encode(action, i)).transpose()?;
        tracing::debug!(type_name, action, id = %resource.id, "invoking action");
        let output = self.raw_action(&descriptor, input).await?;
        decode_output(action, output)
    }

    /// Invoke a collection-scoped action.
    ///
    /// # Errors
    ///
    /// Same as [`Ops::do_action`].
    async fn do_collection_action<T, I, O>(
        &self,
        type_name: &str,
        action: &str,
        target: &Collection<T>,
        input: Option<&I>,
    ) -> Result<Option<O>, ApiError>
    where
        T: Sync,
        I: Serialize + Sync + ?Sized,
        O: DeserializeOwned + Send,
    {
        let Some(url) = target.action_url(action) else {
            return Err(ApiError::ActionNotPermitted {
                action: action.to_owned(),
                target: format!("{type_name} collection"),
            });
        };

        let descriptor = self.describe_action(type_name, action, url, ActionScope::Collection);
        let input = input.map(|i| encode(action, i)).transpose()?;
        tracing::debug!(type_name, action, "invoking collection action");
        let output = self.raw_action(&descriptor, input).await?;
        decode_output(action, output)
    }

    /// `GET` a named link of an entity.
    ///
    /// # Errors
    ///
    /// [`ApiError::Config`] when the entity has no such link, otherwise
    /// request/transport errors or a decode failure.
    async fn follow_link<E, R>(&self, target: &E, link: &str) -> Result<R, ApiError>
    where
        E: HasResource + Sync + ?Sized,
        R: DeserializeOwned + Send,
    {
        let resource = target.resource();
        let Some(url) = resource.link(link) else {
            return Err(ApiError::Config(format!(
                "{} has no link named '{link}'",
                resource.label()
            )));
        };
        decode(link, self.raw_fetch(url).await?)
    }

    /// Re-fetch an entity by its own type and identity.
    ///
    /// # Errors
    ///
    /// Same as [`Ops::by_id`].
    async fn reload<R>(&self, current: &R) -> Result<R, ApiError>
    where
        R: DeserializeOwned + HasResource + Send + Sync,
    {
        let resource = current.resource();
        self.by_id(&resource.type_name, &resource.id).await
    }

    /// Subscribe to typed change events of a type.
    ///
    /// # Errors
    ///
    /// Request/transport errors while opening the subscription.
    async fn watch<R>(
        &self,
        type_name: &str,
        opts: &WatchOptions,
    ) -> Result<EventStream<R>, ApiError>
    where
        R: DeserializeOwned + Send + 'static,
    {
        tracing::debug!(
            type_name,
            selector = ?opts.field_selector,
            timeout_seconds = opts.timeout_seconds,
            "opening watch"
        );
        let raw = self.raw_watch(type_name, opts).await?;
        Ok(raw
            .map(|event| event.and_then(WatchEvent::<R>::try_from))
            .boxed())
    }

    /// Stream every entity of a type, fetching pages lazily.
    fn items<'a, R>(
        &'a self,
        type_name: &'a str,
        opts: &'a ListOpts,
    ) -> BoxStream<'a, Result<R, ApiError>>
    where
        R: DeserializeOwned + Send + 'a,
    {
        let fetch = move |cursor: Option<String>| -> PageFuture<'a, R> {
            Box::pin(async move {
                match cursor {
                    None => decode(type_name, self.raw_list(type_name, opts).await?),
                    Some(url) => decode("collection page", self.raw_fetch(&url).await?),
                }
            })
        };
        CollectionPager::new(fetch).boxed()
    }
}

impl<O: RawOps + ?Sized> Ops for O {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::models::GenericObject;
    use crate::testing::FakeOps;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_then_get_keeps_identity() {
        let ops = FakeOps::new();
        let created: GenericObject = ops
            .create("cluster", &json!({"name": "e2e"}))
            .await
            .unwrap();
        assert!(!created.id().is_empty());

        let fetched: GenericObject = ops.by_id("cluster", created.id()).await.unwrap();
        assert_eq!(fetched.id(), created.id());
        assert_eq!(fetched.field("name"), Some(&json!("e2e")));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let ops = FakeOps::new();
        let err = ops
            .by_id::<GenericObject>("cluster", "c-missing")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let ops = FakeOps::new();
        let created: GenericObject = ops
            .create("cluster", &json!({"name": "e2e"}))
            .await
            .unwrap();

        let updated: GenericObject = ops
            .update("cluster", &created, &json!({"description": "patched"}))
            .await
            .unwrap();
        assert_eq!(updated.field("description"), Some(&json!("patched")));
        assert_eq!(updated.field("name"), Some(&json!("e2e")));

        ops.delete(&updated).await.unwrap();
        let err = ops.delete(&updated).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_replace_sends_full_representation() {
        let ops = FakeOps::new();
        let mut created: GenericObject = ops
            .create("cluster", &json!({"name": "e2e", "description": "old"}))
            .await
            .unwrap();
        created.fields.remove("description");
        created.fields.insert("name".to_owned(), json!("renamed"));

        let replaced = ops.replace("cluster", &created).await.unwrap();
        assert_eq!(replaced.field("name"), Some(&json!("renamed")));
        assert!(replaced.field("description").is_none());
    }

    #[tokio::test]
    async fn test_list_all_concatenates_pages_in_order() {
        let ops = FakeOps::new();
        ops.push_page("cluster", &["item1", "item2"], Some("p2"));
        ops.push_page("cluster", &["item3"], None);

        let all: Collection<GenericObject> =
            ops.list_all("cluster", &ListOpts::new()).await.unwrap();
        let ids: Vec<&str> = all.data.iter().map(|o| o.id()).collect();
        assert_eq!(ids, ["item1", "item2", "item3"]);
        assert!(!all.has_next());
    }

    #[tokio::test]
    async fn test_next_on_last_page_is_none() {
        let ops = FakeOps::new();
        ops.push_page("cluster", &["only"], None);

        let first: Collection<GenericObject> = ops.list("cluster", &ListOpts::new()).await.unwrap();
        assert!(ops.next(&first).await.unwrap().is_none());
        assert_eq!(ops.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_list_all_returns_partial_result_on_failure() {
        let ops = FakeOps::new();
        ops.push_page("cluster", &["item1", "item2"], Some("p2"));
        ops.fail_cursor("p2");

        let err = ops
            .list_all::<GenericObject>("cluster", &ListOpts::new())
            .await
            .unwrap_err();
        let ids: Vec<&str> = err.partial.data.iter().map(|o| o.id()).collect();
        assert_eq!(ids, ["item1", "item2"]);
        assert_eq!(err.source.status(), Some(500));
    }

    #[tokio::test]
    async fn test_list_all_detects_cursor_cycle() {
        let ops = FakeOps::new();
        ops.push_page("cluster", &["a"], Some("p2"));
        ops.push_page("cluster", &["b"], Some("p2"));

        let err = ops
            .list_all::<GenericObject>("cluster", &ListOpts::new())
            .await
            .unwrap_err();
        assert_eq!(err.partial.data.len(), 2);
        assert!(matches!(err.source, ApiError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_action_not_permitted_is_local() {
        let ops = FakeOps::new();
        let created: GenericObject = ops
            .create("cluster", &json!({"name": "e2e"}))
            .await
            .unwrap();

        let err = ops
            .do_action::<_, _, Value>("cluster", "rotateCertificates", &created, NO_INPUT)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::ActionNotPermitted { ref action, .. } if action == "rotateCertificates"
        ));
        assert_eq!(ops.action_calls(), 0);
    }

    #[tokio::test]
    async fn test_permitted_action_round_trip() {
        let ops = FakeOps::new();
        let created: GenericObject = ops
            .create("cluster", &json!({"name": "e2e"}))
            .await
            .unwrap();

        let output: Option<Value> = ops
            .do_action(
                "cluster",
                "generateKubeconfig",
                &created,
                Some(&json!({"ttl": 60})),
            )
            .await
            .unwrap();
        assert_eq!(output, Some(json!({"echo": {"ttl": 60}})));
        assert_eq!(ops.action_calls(), 1);
    }

    #[tokio::test]
    async fn test_collection_action_requires_permission() {
        let ops = FakeOps::new();
        ops.push_page("cluster", &["a"], None);
        let page: Collection<GenericObject> = ops.list("cluster", &ListOpts::new()).await.unwrap();

        let err = ops
            .do_collection_action::<_, _, Value>("cluster", "createFromTemplate", &page, NO_INPUT)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ActionNotPermitted { .. }));
        assert_eq!(ops.action_calls(), 0);
    }

    #[tokio::test]
    async fn test_follow_missing_link() {
        let ops = FakeOps::new();
        let created: GenericObject = ops
            .create("cluster", &json!({"name": "e2e"}))
            .await
            .unwrap();
        let err = ops
            .follow_link::<_, Value>(&created, "nodes")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[tokio::test]
    async fn test_items_stream_walks_every_page() {
        let ops = FakeOps::new();
        ops.push_page("cluster", &["a", "b"], Some("p2"));
        ops.push_page("cluster", &["c"], None);

        let query = ListOpts::new();
        let ids: Vec<String> = ops
            .items::<GenericObject>("cluster", &query)
            .map(|item| item.unwrap().resource.id)
            .collect()
            .await;
        assert_eq!(ids, ["a", "b", "c"]);
    }
}
