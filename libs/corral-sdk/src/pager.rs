//! Lazy cursor pagination as a `Stream` of items.
//!
//! The pager hides cursor handling: it asks the fetcher for the first page
//! (`None`), then for each `pagination.next` URL until the cursor is empty.
//!
//! ```rust,ignore
//! use futures_util::StreamExt;
//!
//! let mut clusters = ops.items::<Cluster>("cluster", &ListOpts::new());
//! while let Some(cluster) = clusters.next().await {
//!     println!("{}", cluster?.name);
//! }
//! ```

use crate::error::ApiError;
use crate::models::Collection;
use futures_core::Stream;
use pin_project_lite::pin_project;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

/// What the next fetch asks for
enum Cursor {
    First,
    Url(String),
    Exhausted,
}

pin_project! {
    /// Stream over the items of every page of a collection.
    ///
    /// A fetch error is yielded once and ends the stream.
    pub struct CollectionPager<T, F, Fut> {
        cursor: Cursor,
        buffered: VecDeque<T>,
        fetch: F,
        #[pin]
        in_flight: Option<Fut>,
    }
}

impl<T, F, Fut> CollectionPager<T, F, Fut>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Collection<T>, ApiError>>,
{
    /// `fetch(None)` must return the first page and `fetch(Some(url))` the
    /// page behind a cursor.
    #[must_use]
    pub fn new(fetch: F) -> Self {
        Self {
            cursor: Cursor::First,
            buffered: VecDeque::new(),
            fetch,
            in_flight: None,
        }
    }
}

impl<T, F, Fut> Stream for CollectionPager<T, F, Fut>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Collection<T>, ApiError>>,
{
    type Item = Result<T, ApiError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(item) = this.buffered.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }

            if let Some(page) = this.in_flight.as_mut().as_pin_mut() {
                let page = ready!(page.poll(cx));
                this.in_flight.set(None);
                match page {
                    Ok(page) => {
                        *this.cursor = page
                            .next_cursor()
                            .map_or(Cursor::Exhausted, |url| Cursor::Url(url.to_owned()));
                        this.buffered.extend(page.data);
                    }
                    Err(err) => {
                        *this.cursor = Cursor::Exhausted;
                        return Poll::Ready(Some(Err(err)));
                    }
                }
                continue;
            }

            let request = match std::mem::replace(this.cursor, Cursor::Exhausted) {
                Cursor::First => None,
                Cursor::Url(url) => Some(url),
                Cursor::Exhausted => return Poll::Ready(None),
            };
            this.in_flight.set(Some((this.fetch)(request)));
        }
    }
}
