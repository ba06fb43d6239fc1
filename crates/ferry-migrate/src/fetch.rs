//! Paginated reads of source items.

use futures::stream::{self, Stream, TryStreamExt};
use std::sync::Arc;

use crate::credential::Credential;
use crate::error::{MigrationError, Result};
use crate::gateway::Gateway;
use crate::kind::ResourceKind;
use crate::types::{RemoteId, ResourceItem};

/// Upper bound on pages read from one group.
pub const MAX_PAGES: u32 = 10_000;

#[derive(Debug, Clone)]
struct Cursor {
    page: u32,
    fetched: u64,
    first_id: Option<RemoteId>,
    done: bool,
}

/// Streams the items of a source group page by page, in fetch order.
pub struct ItemFetcher {
    gateway: Arc<Gateway>,
    kind: ResourceKind,
    credential: Credential,
    page_size: u32,
}

impl ItemFetcher {
    /// Create a fetcher reading with `credential`.
    pub fn new(gateway: Arc<Gateway>, kind: ResourceKind, credential: Credential) -> Self {
        let page_size = gateway.config().page_size.max(1);
        Self {
            gateway,
            kind,
            credential,
            page_size,
        }
    }

    /// Override the page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Stream of pages for `group_id`.
    ///
    /// When the server reports a total, the stream ends once that many rows
    /// have been read (or on an empty page). Without a total it ends on an
    /// empty or short page. A page that starts with the same row as the
    /// previous one, or running past [`MAX_PAGES`], is an error.
    pub fn pages<'a>(
        &'a self,
        group_id: &'a RemoteId,
    ) -> impl Stream<Item = Result<Vec<ResourceItem>>> + 'a {
        let start = Cursor {
            page: 1,
            fetched: 0,
            first_id: None,
            done: false,
        };

        stream::try_unfold(start, move |cursor| async move {
            if cursor.done {
                return Ok(None);
            }

            let page = self
                .gateway
                .list_items(self.kind, &self.credential, group_id, cursor.page, self.page_size)
                .await?;

            let rows = page.list.len() as u64;
            if rows == 0 {
                return Ok(None);
            }

            let first_id = page
                .list
                .first()
                .and_then(|row| row.get("id"))
                .and_then(RemoteId::from_json);
            if first_id.is_some() && first_id == cursor.first_id {
                return Err(MigrationError::UnknownServer(format!(
                    "page {} of group {group_id} repeats the previous page",
                    cursor.page
                )));
            }

            let fetched = cursor.fetched + rows;
            let done = match page.total {
                Some(total) => fetched >= total,
                None => rows < u64::from(self.page_size),
            };
            if !done && cursor.page >= MAX_PAGES {
                return Err(MigrationError::UnknownServer(format!(
                    "group {group_id} still has items after {MAX_PAGES} pages"
                )));
            }

            let items = page
                .list
                .into_iter()
                .map(|row| ResourceItem::pending(group_id.clone(), row))
                .collect();

            Ok(Some((
                items,
                Cursor {
                    page: cursor.page + 1,
                    fetched,
                    first_id,
                    done,
                },
            )))
        })
    }

    /// Read every item of `group_id`.
    pub async fn fetch_all(&self, group_id: &RemoteId) -> Result<Vec<ResourceItem>> {
        let pages: Vec<Vec<ResourceItem>> = self.pages(group_id).try_collect().await?;
        Ok(pages.into_iter().flatten().collect())
    }
}
