use futures::{Stream, TryStreamExt, stream};
use serde_json::Value;

use crate::Client;
use crate::path::{ResourcePath, ResourceType};
use crate::service::PageRequest;

/// A resource handle that can be built from a list response item.
pub trait ListItem: Sized + Send {
    const TYPE: ResourceType;

    fn from_partial(client: Client, value: Value) -> crate::Result<Self>;
}

/// One page of a list call. Items hold partial bodies and upgrade lazily.
#[derive(Debug)]
pub struct Page<T> {
    client: Client,
    parent: ResourcePath,
    max_results: Option<u32>,
    items: Vec<T>,
    token: Option<Box<str>>,
}

impl<T: ListItem> Page<T> {
    pub(crate) async fn fetch(
        client: &Client,
        parent: ResourcePath,
        page: PageRequest,
    ) -> crate::Result<Self> {
        debug!(message = "listing resources", %parent, collection = T::TYPE.collection());

        let max_results = page.max_results;
        let response = client
            .service()
            .list_resources(&parent, T::TYPE, page)
            .await?;

        let items = response
            .items
            .into_iter()
            .map(|value| T::from_partial(client.clone(), value))
            .collect::<crate::Result<Vec<_>>>()?;

        Ok(Self {
            client: client.clone(),
            parent,
            max_results,
            items,
            token: response.next_page_token,
        })
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut [T] {
        &mut self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn has_next(&self) -> bool {
        self.token.is_some()
    }

    pub async fn next(&self) -> crate::Result<Option<Page<T>>> {
        let Some(ref token) = self.token else {
            return Ok(None);
        };

        let request = PageRequest {
            page_token: Some(token.clone()),
            max_results: self.max_results,
        };

        Self::fetch(&self.client, self.parent.clone(), request)
            .await
            .map(Some)
    }

    /// Every item of this page and the ones after it, fetching pages as the
    /// stream is polled.
    pub fn all(self) -> impl Stream<Item = crate::Result<T>> + Send
    where
        T: Sync + 'static,
    {
        stream::try_unfold(Some(self), |page| async move {
            let Some(page) = page else {
                return Ok(None);
            };

            let next = page.next().await?;
            let items = stream::iter(page.items.into_iter().map(Ok));
            Ok::<_, crate::Error>(Some((items, next)))
        })
        .try_flatten()
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
