//! Draining of token-paginated listings into a fully materialized snapshot.

use std::collections::HashSet;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SyncError, SyncResult};

/// Upper bound on the number of pages a single listing may span.
pub const MAX_PAGES: usize = 10_000;

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Continuation token; `None` (or empty) on the last page.
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    /// A terminal page.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }

    /// A page followed by another one.
    pub fn more(items: Vec<T>, next_token: impl Into<String>) -> Self {
        Self {
            items,
            next_token: Some(next_token.into()),
        }
    }
}

/// Fetch every page of a listing and return the concatenated items.
///
/// `fetch` is called with `None` first and then with each continuation token.
/// A token seen twice is a protocol error, as is exceeding [`MAX_PAGES`].
/// Any page error is returned as-is; partial results are discarded.
pub async fn collect_all<T, F, Fut>(operation: &str, mut fetch: F) -> SyncResult<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = SyncResult<Page<T>>>,
{
    let mut items = Vec::new();
    let mut seen_tokens = HashSet::new();
    let mut token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        if pages >= MAX_PAGES {
            return Err(SyncError::protocol(
                operation,
                format!("listing exceeded {MAX_PAGES} pages"),
            ));
        }

        let page = fetch(token.take()).await?;
        pages += 1;
        items.extend(page.items);

        match page.next_token.filter(|t| !t.is_empty()) {
            Some(next) => {
                if !seen_tokens.insert(next.clone()) {
                    return Err(SyncError::protocol(
                        operation,
                        format!("repeated page token '{next}'"),
                    ));
                }
                token = Some(next);
            }
            None => break,
        }
    }

    debug!(operation, pages, items = items.len(), "Listing drained");
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_collect_all_drains_pages_in_order() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let items = collect_all("list_users", move |token| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(match token.as_deref() {
                    None => Page::more(vec![1, 2], "p2"),
                    Some("p2") => Page::more(vec![3], "p3"),
                    Some("p3") => Page::last(vec![4, 5]),
                    Some(other) => panic!("unexpected token {other}"),
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4, 5]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_collect_all_treats_empty_token_as_end() {
        let items = collect_all("list_groups", |_| async {
            Ok(Page {
                items: vec!["a"],
                next_token: Some(String::new()),
            })
        })
        .await
        .unwrap();

        assert_eq!(items, vec!["a"]);
    }

    #[tokio::test]
    async fn test_collect_all_rejects_repeated_token() {
        let err = collect_all("list_users", |_| async { Ok(Page::more(vec![1], "loop")) })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::Protocol);
        assert!(err.to_string().contains("repeated page token"));
    }

    #[tokio::test]
    async fn test_collect_all_propagates_page_error() {
        let result: SyncResult<Vec<u8>> = collect_all("list_users", |token| async move {
            match token {
                None => Ok(Page::more(vec![1], "p2")),
                Some(_) => Err(SyncError::Transient {
                    operation: "list_users".into(),
                    message: "timeout".into(),
                }),
            }
        })
        .await;

        assert_eq!(
            result.unwrap_err().kind(),
            crate::error::ErrorKind::Transient
        );
    }

    #[tokio::test]
    async fn test_collect_all_is_reentrant() {
        let fetch = |token: Option<String>| async move {
            Ok(match token {
                None => Page::more(vec!["x"], "next"),
                Some(_) => Page::last(vec!["y"]),
            })
        };

        let first = collect_all("list", fetch).await.unwrap();
        let second = collect_all("list", fetch).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }
}
