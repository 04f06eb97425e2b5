//! Relay-style cursor pagination
//!
//! Lists are ordered by a composite sort key (timestamps + id). A cursor is
//! the URL-safe base64 encoding of the JSON sort key of an edge, so a cursor
//! stays valid when rows are appended at the tail.
//!
//! ```rust,ignore
//! let keyset = request.validate::<MessageSortKey>(25)?;
//! let rows = store.find_message_page(&query, &keyset).await?;
//! let connection = build_connection(rows, &keyset, MessageSortKey::of)?;
//! ```

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::shared::error::{ChatError, ChatResult};

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: i32 = 100;

// ============================================================================
// Cursor
// ============================================================================

/// Opaque cursor codec.
pub struct Cursor;

impl Cursor {
    /// Encode a sort key as a cursor string.
    pub fn encode<K: Serialize>(key: &K) -> ChatResult<String> {
        let bytes = serde_json::to_vec(key)?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Decode a cursor string back to its sort key.
    pub fn decode<K: DeserializeOwned>(cursor: &str) -> ChatResult<K> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor)
            .map_err(|_| ChatError::bad_input("Invalid cursor"))?;
        serde_json::from_slice(&bytes).map_err(|_| ChatError::bad_input("Invalid cursor"))
    }
}

// ============================================================================
// Page request
// ============================================================================

/// Direction of pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationDirection {
    /// `first` / `after`
    Forward,
    /// `last` / `before`
    Backward,
}

/// Input arguments for cursor-based pagination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub first: Option<i32>,
    pub after: Option<String>,
    pub last: Option<i32>,
    pub before: Option<String>,
    /// Compute `total_count` (an extra count query).
    #[serde(default)]
    pub include_total_count: bool,
}

impl PageRequest {
    pub fn forward(first: i32, after: Option<String>) -> Self {
        Self {
            first: Some(first),
            after,
            ..Self::default()
        }
    }

    pub fn backward(last: i32, before: Option<String>) -> Self {
        Self {
            last: Some(last),
            before,
            ..Self::default()
        }
    }

    pub fn with_total_count(mut self) -> Self {
        self.include_total_count = true;
        self
    }

    /// Validate the request and decode its cursor.
    ///
    /// Mixing forward and backward arguments is rejected. The page size
    /// defaults to `default_limit` and is clamped to `1..=100`.
    pub fn validate<K: DeserializeOwned>(&self, default_limit: i32) -> ChatResult<Keyset<K>> {
        if (self.first.is_some() || self.after.is_some())
            && (self.last.is_some() || self.before.is_some())
        {
            return Err(ChatError::bad_input("Cannot use first/after with last/before"));
        }

        let direction = if self.last.is_some() || self.before.is_some() {
            PaginationDirection::Backward
        } else {
            PaginationDirection::Forward
        };

        let limit = self
            .first
            .or(self.last)
            .unwrap_or(default_limit)
            .clamp(1, MAX_PAGE_SIZE);

        let raw = match direction {
            PaginationDirection::Forward => self.after.as_deref(),
            PaginationDirection::Backward => self.before.as_deref(),
        };
        let cursor = raw.map(Cursor::decode).transpose()?;

        Ok(Keyset {
            cursor,
            direction,
            limit,
        })
    }
}

/// A validated page request with its cursor decoded to a sort key.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyset<K> {
    pub cursor: Option<K>,
    pub direction: PaginationDirection,
    pub limit: i32,
}

impl<K> Keyset<K> {
    /// First page in list order.
    pub fn first(limit: i32) -> Self {
        Self {
            cursor: None,
            direction: PaginationDirection::Forward,
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Rows to fetch: one extra to detect whether more rows exist.
    pub fn fetch_limit(&self) -> i64 {
        (self.limit + 1) as i64
    }

    pub fn is_forward(&self) -> bool {
        self.direction == PaginationDirection::Forward
    }

    /// Whether the store should scan the sort key in ascending order.
    ///
    /// Stores return rows in scan order: list order when paging forward,
    /// reverse list order when paging backward. Rows strictly beyond the
    /// cursor in scan direction qualify.
    pub fn scans_ascending(&self, list_descending: bool) -> bool {
        self.is_forward() != list_descending
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Page information per the Relay connection model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge<T> {
    pub cursor: String,
    pub node: T,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<T> {
    pub edges: Vec<Edge<T>>,
    pub page_info: PageInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<i64>,
}

impl<T> Connection<T> {
    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.edges.iter().map(|e| &e.node)
    }

    pub fn into_nodes(self) -> Vec<T> {
        self.edges.into_iter().map(|e| e.node).collect()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Build page info from the direction, cursor presence and overflow flag.
pub fn build_page_info<K>(
    has_more: bool,
    keyset: &Keyset<K>,
    start_cursor: Option<String>,
    end_cursor: Option<String>,
) -> PageInfo {
    match keyset.direction {
        PaginationDirection::Forward => PageInfo {
            has_next_page: has_more,
            has_previous_page: keyset.cursor.is_some(),
            start_cursor,
            end_cursor,
        },
        PaginationDirection::Backward => PageInfo {
            has_next_page: keyset.cursor.is_some(),
            has_previous_page: has_more,
            start_cursor,
            end_cursor,
        },
    }
}

/// Trim `limit + 1` fetched rows to `limit`, reporting whether more exist.
pub fn trim_results<T>(mut rows: Vec<T>, limit: i32) -> (Vec<T>, bool) {
    let limit = limit.max(0) as usize;
    let has_more = rows.len() > limit;
    rows.truncate(limit);
    (rows, has_more)
}

/// Turn rows in scan order into a connection in list order.
pub fn build_connection<T, K, F>(rows: Vec<T>, keyset: &Keyset<K>, key_of: F) -> ChatResult<Connection<T>>
where
    K: Serialize,
    F: Fn(&T) -> K,
{
    let (mut rows, has_more) = trim_results(rows, keyset.limit);
    if !keyset.is_forward() {
        rows.reverse();
    }

    let edges = rows
        .into_iter()
        .map(|node| {
            Ok(Edge {
                cursor: Cursor::encode(&key_of(&node))?,
                node,
            })
        })
        .collect::<ChatResult<Vec<_>>>()?;

    let start = edges.first().map(|e| e.cursor.clone());
    let end = edges.last().map(|e| e.cursor.clone());

    Ok(Connection {
        page_info: build_page_info(has_more, keyset, start, end),
        edges,
        total_count: None,
    })
}
