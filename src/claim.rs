//! Claiming queue items
//!
//! An item is claimed by renaming it so its basename starts with
//! [`LOCK_SENTINEL`]; the directory part of the key is kept as is. Any key
//! containing the sentinel is out of the queue for good.
//!
//! ```text
//! /the_bucket/filename  ->  /the_bucket/---LOCKED---filename
//! ```
//!
//! ## Guarantees
//!
//! `RenameClaim` is only as strong as the backend's rename. On a store with
//! atomic, immediately visible renames two workers cannot both claim an item.
//! S3 renames are copy+delete and listings are eventually consistent, so two
//! workers can race; the loser usually sees `NotFound` and reports
//! [`ClaimOutcome::Lost`], but that is detection, not exclusion. Backends with
//! conditional writes should provide their own `ClaimStrategy`.

use crate::store::ObjectStore;
use std::future::Future;
use std::io::{ErrorKind, Result as IoResult};
use std::pin::Pin;

/// Marker prepended to the basename of a claimed key
pub const LOCK_SENTINEL: &str = "---LOCKED---";

/// True if the key has already been claimed
pub fn is_claimed(key: &str) -> bool {
    key.contains(LOCK_SENTINEL)
}

/// Key an item moves to when claimed
pub fn claimed_key(key: &str) -> String {
    match key.rsplit_once('/') {
        Some((dir, base)) => format!("{}/{}{}", dir, LOCK_SENTINEL, base),
        None => format!("{}{}", LOCK_SENTINEL, key),
    }
}

/// Result of a claim attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This worker owns the item, now stored under `key`
    Claimed { key: String },
    /// The key already carries the sentinel
    AlreadyClaimed,
    /// The item vanished before we could claim it
    Lost,
}

/// Exclusive-ownership step for a queue item
pub trait ClaimStrategy: Send + Sync + 'static {
    fn claim<'a>(
        &'a self,
        store: &'a dyn ObjectStore,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<ClaimOutcome>> + Send + 'a>>;
}

/// Claim by renaming to the sentinel key
#[derive(Debug, Clone, Copy, Default)]
pub struct RenameClaim;

impl ClaimStrategy for RenameClaim {
    fn claim<'a>(
        &'a self,
        store: &'a dyn ObjectStore,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<ClaimOutcome>> + Send + 'a>> {
        Box::pin(async move {
            if is_claimed(key) {
                return Ok(ClaimOutcome::AlreadyClaimed);
            }

            let target = claimed_key(key);
            match store.rename(key, &target).await {
                Ok(()) => Ok(ClaimOutcome::Claimed { key: target }),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(ClaimOutcome::Lost),
                Err(e) => Err(e),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryObjectStore, PutOptions};

    #[test]
    fn test_claimed_key_preserves_directory() {
        assert_eq!(
            claimed_key("/the_bucket/filename"),
            "/the_bucket/---LOCKED---filename"
        );
        assert_eq!(
            claimed_key("a/b/c/file.jpg"),
            "a/b/c/---LOCKED---file.jpg"
        );
        assert_eq!(claimed_key("filename"), "---LOCKED---filename");
    }

    #[test]
    fn test_is_claimed() {
        assert!(is_claimed("/path/to/---LOCKED---file"));
        assert!(is_claimed("---LOCKED---foobar"));
        assert!(!is_claimed("/path/to/file"));
        assert!(is_claimed(&claimed_key("/path/to/file")));
    }

    #[tokio::test]
    async fn test_rename_claim_moves_item() {
        let store = InMemoryObjectStore::new();
        store
            .put("/the_bucket/filename", b"val", PutOptions::default())
            .await
            .unwrap();

        let outcome = RenameClaim.claim(&store, "/the_bucket/filename").await.unwrap();

        assert_eq!(
            outcome,
            ClaimOutcome::Claimed {
                key: "/the_bucket/---LOCKED---filename".to_string()
            }
        );
        assert_eq!(store.keys(), vec!["/the_bucket/---LOCKED---filename"]);
    }

    #[tokio::test]
    async fn test_rename_claim_skips_claimed_key() {
        let store = InMemoryObjectStore::new();
        store
            .put("---LOCKED---foobar", b"val", PutOptions::default())
            .await
            .unwrap();

        let outcome = RenameClaim.claim(&store, "---LOCKED---foobar").await.unwrap();

        assert_eq!(outcome, ClaimOutcome::AlreadyClaimed);
        assert_eq!(store.keys(), vec!["---LOCKED---foobar"]);
    }

    #[tokio::test]
    async fn test_second_claim_loses() {
        let store = InMemoryObjectStore::new();
        store.put("q/item", b"val", PutOptions::default()).await.unwrap();

        let first = RenameClaim.claim(&store, "q/item").await.unwrap();
        let second = RenameClaim.claim(&store, "q/item").await.unwrap();

        assert!(matches!(first, ClaimOutcome::Claimed { .. }));
        assert_eq!(second, ClaimOutcome::Lost);
    }
}
