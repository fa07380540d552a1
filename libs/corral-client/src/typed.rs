//! Per-type façade over [`Ops`].

use corral_sdk::ApiError;
use corral_sdk::error::PartialListError;
use corral_sdk::models::{ApiType, Collection, ListOpts, WatchOptions};
use corral_sdk::ops::{EventStream, Ops};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Operations bound to `T::TYPE_NAME`.
///
/// ```rust,ignore
/// let clusters = client.typed::<Cluster>();
/// let cluster = clusters.create(&Cluster::named("e2e")).await?;
/// let all = clusters.list_all(&ListOpts::new().filter("name", "e2e")).await?;
/// ```
pub struct TypedClient<'a, T, O: ?Sized> {
    ops: &'a O,
    _type: PhantomData<fn() -> T>,
}

impl<T, O: ?Sized> Clone for TypedClient<'_, T, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, O: ?Sized> Copy for TypedClient<'_, T, O> {}

impl<'a, T, O: ?Sized> TypedClient<'a, T, O> {
    #[must_use]
    pub fn new(ops: &'a O) -> Self {
        Self {
            ops,
            _type: PhantomData,
        }
    }
}

impl<T, O> TypedClient<'_, T, O>
where
    T: ApiType + Serialize + DeserializeOwned + Send + Sync + 'static,
    O: Ops + ?Sized,
{
    /// # Errors
    ///
    /// Same as [`Ops::create`].
    pub async fn create<P: Serialize + Sync + ?Sized>(&self, payload: &P) -> Result<T, ApiError> {
        self.ops.create(T::TYPE_NAME, payload).await
    }

    /// # Errors
    ///
    /// Same as [`Ops::update`].
    pub async fn update<P>(&self, existing: &T, delta: &P) -> Result<T, ApiError>
    where
        P: Serialize + Sync + ?Sized,
    {
        self.ops.update(T::TYPE_NAME, existing, delta).await
    }

    /// # Errors
    ///
    /// Same as [`Ops::replace`].
    pub async fn replace(&self, full: &T) -> Result<T, ApiError> {
        self.ops.replace(T::TYPE_NAME, full).await
    }

    /// # Errors
    ///
    /// Same as [`Ops::by_id`].
    pub async fn by_id(&self, id: &str) -> Result<T, ApiError> {
        self.ops.by_id(T::TYPE_NAME, id).await
    }

    /// # Errors
    ///
    /// Same as [`Ops::delete`].
    pub async fn delete(&self, existing: &T) -> Result<(), ApiError> {
        self.ops.delete(existing).await
    }

    /// # Errors
    ///
    /// Same as [`Ops::list`].
    pub async fn list(&self, opts: &ListOpts) -> Result<Collection<T>, ApiError> {
        self.ops.list(T::TYPE_NAME, opts).await
    }

    /// # Errors
    ///
    /// Same as [`Ops::list_all`].
    pub async fn list_all(&self, opts: &ListOpts) -> Result<Collection<T>, PartialListError<T>> {
        self.ops.list_all(T::TYPE_NAME, opts).await
    }

    /// # Errors
    ///
    /// Same as [`Ops::reload`].
    pub async fn reload(&self, current: &T) -> Result<T, ApiError> {
        self.ops.reload(current).await
    }

    /// # Errors
    ///
    /// Same as [`Ops::do_action`].
    pub async fn action<I, R>(
        &self,
        name: &str,
        target: &T,
        input: Option<&I>,
    ) -> Result<Option<R>, ApiError>
    where
        I: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send,
    {
        self.ops.do_action(T::TYPE_NAME, name, target, input).await
    }

    /// # Errors
    ///
    /// Same as [`Ops::do_collection_action`].
    pub async fn collection_action<I, R>(
        &self,
        name: &str,
        target: &Collection<T>,
        input: Option<&I>,
    ) -> Result<Option<R>, ApiError>
    where
        I: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send,
    {
        self.ops
            .do_collection_action(T::TYPE_NAME, name, target, input)
            .await
    }

    /// # Errors
    ///
    /// Same as [`Ops::watch`].
    pub async fn watch(&self, opts: &WatchOptions) -> Result<EventStream<T>, ApiError> {
        self.ops.watch(T::TYPE_NAME, opts).await
    }
}
