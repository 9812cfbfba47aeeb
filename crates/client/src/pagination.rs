//! Cursor-following paginated reads.
//!
//! Responsibilities:
//! - Add `page`, `perPage` and optional `sortBy` to the starting URL.
//! - Fetch pages through `CapellaClient::execute_with_retry` until the cursor is exhausted.
//! - Concatenate every page's `data` in server order.
//!
//! Does NOT handle:
//! - Retrying individual pages (the executor does that).
//! - Deduplicating elements across pages.
//!
//! Invariants:
//! - A failed page aborts the whole read; partial results are never returned.
//! - The loop always terminates: a cursor that does not advance, or more pages than
//!   the cursor itself announced, is reported as an `Unmarshal` error.
//! - Next links never leave the origin of the starting URL, so the bearer token
//!   only goes to the host the caller chose.

use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use capella_config::constants::MAX_PAGES_PER_FETCH;

use crate::client::CapellaClient;
use crate::endpoint::EndpointConfig;
use crate::error::{ClientError, Result};

/// Sort key sent as `sortBy`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortBy {
    Id,
    Name,
    /// Any other key the endpoint understands.
    Custom(String),
}

impl SortBy {
    pub fn as_str(&self) -> &str {
        match self {
            SortBy::Id => "id",
            SortBy::Name => "name",
            SortBy::Custom(key) => key,
        }
    }
}

/// Page metadata of a paginated response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pages {
    /// Current page, starting from 1.
    pub page: u32,
    /// Next page number; `0` on the last page.
    pub next: u32,
    pub previous: u32,
    pub last: u32,
    pub per_page: u32,
    pub total_items: u64,
}

/// Navigation links of a paginated response. Empty when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hrefs {
    pub first: String,
    pub last: String,
    pub previous: String,
    pub next: String,
}

/// Pagination continuation state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cursor {
    pub pages: Pages,
    pub hrefs: Hrefs,
}

impl Cursor {
    pub fn has_next(&self) -> bool {
        self.pages.next != 0 || !self.hrefs.next.is_empty()
    }

    /// Pages this cursor says the read spans, or `None` when it does not say.
    pub fn announced_pages(&self) -> Option<u64> {
        let by_items = match (self.pages.total_items, self.pages.per_page) {
            (0, _) | (_, 0) => 0,
            (total, per_page) => total.div_ceil(u64::from(per_page)),
        };
        let pages = by_items.max(u64::from(self.pages.last));
        (pages > 0).then_some(pages)
    }
}

/// One decoded page.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub cursor: Cursor,
}

/// Elements of every page plus the raw body of the first page.
#[derive(Debug, Clone)]
pub struct PaginatedWithMeta<T> {
    pub data: Vec<T>,
    /// Lets callers read page-level fields such as `clusterStats`.
    pub raw_first_page: Vec<u8>,
}

/// Fetch every element across all pages of `endpoint`.
pub async fn get_paginated<T: DeserializeOwned>(
    client: &CapellaClient,
    token: &SecretString,
    endpoint: &EndpointConfig,
    sort: Option<SortBy>,
    cancel: &CancellationToken,
) -> Result<Vec<T>> {
    get_paginated_with_meta(client, token, endpoint, sort, cancel)
        .await
        .map(|result| result.data)
}

/// Like [`get_paginated`], also returning the first page's raw body.
pub async fn get_paginated_with_meta<T: DeserializeOwned>(
    client: &CapellaClient,
    token: &SecretString,
    endpoint: &EndpointConfig,
    sort: Option<SortBy>,
    cancel: &CancellationToken,
) -> Result<PaginatedWithMeta<T>> {
    let mut url = endpoint.parsed_url()?;
    set_query_param(&mut url, "page", "1");
    set_query_param(&mut url, "perPage", &client.page_size().to_string());
    if let Some(sort) = sort.as_ref().filter(|s| !s.as_str().is_empty()) {
        set_query_param(&mut url, "sortBy", sort.as_str());
    }

    let mut data = Vec::new();
    let mut raw_first_page = None;
    let mut budget = u64::from(MAX_PAGES_PER_FETCH);
    let mut fetched: u64 = 0;

    loop {
        let page_endpoint = endpoint.with_url(url.as_str());
        let response = client
            .execute_with_retry(&page_endpoint, None, token, cancel)
            .await?;
        fetched += 1;

        let page: Page<T> = response.json()?;
        debug!(
            url = %url,
            page = page.cursor.pages.page,
            next = page.cursor.pages.next,
            items = page.data.len(),
            "Fetched page"
        );

        if raw_first_page.is_none() {
            if let Some(announced) = page.cursor.announced_pages() {
                budget = announced.min(u64::from(MAX_PAGES_PER_FETCH));
            }
            raw_first_page = Some(response.into_body());
        }

        data.extend(page.data);

        if !page.cursor.has_next() {
            break;
        }

        if fetched >= budget {
            return Err(protocol_violation(
                &url,
                format!("cursor still advancing after {fetched} page(s), announced {budget}"),
            ));
        }

        url = next_page_url(&url, &page.cursor)?;
    }

    Ok(PaginatedWithMeta {
        data,
        raw_first_page: raw_first_page.unwrap_or_default(),
    })
}

/// URL of the page after `current`, rejecting a cursor that does not advance.
fn next_page_url(current: &Url, cursor: &Cursor) -> Result<Url> {
    let pages = &cursor.pages;
    if pages.next != 0 && pages.page != 0 && pages.next <= pages.page {
        return Err(protocol_violation(
            current,
            format!("next page {} does not follow page {}", pages.next, pages.page),
        ));
    }

    let next = if cursor.hrefs.next.is_empty() {
        let mut next = current.clone();
        set_query_param(&mut next, "page", &pages.next.to_string());
        next
    } else {
        current
            .join(&cursor.hrefs.next)
            .map_err(|e| protocol_violation(current, format!("invalid next link: {e}")))?
    };

    if next.origin() != current.origin() {
        return Err(protocol_violation(
            current,
            format!("next link leaves {}", current.origin().ascii_serialization()),
        ));
    }
    if next == *current {
        return Err(protocol_violation(current, "next link points at the current page"));
    }
    Ok(next)
}

fn protocol_violation(url: &Url, message: impl Into<String>) -> ClientError {
    ClientError::Unmarshal {
        url: url.to_string(),
        target: "cursor".to_string(),
        message: message.into(),
    }
}

/// Replace every `key` pair in the query with a single `key=value` at the end.
fn set_query_param(url: &mut Url, key: &str, value: &str) {
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut pairs = url.query_pairs_mut();
    pairs.clear();
    pairs.extend_pairs(retained);
    pairs.append_pair(key, value);
}
