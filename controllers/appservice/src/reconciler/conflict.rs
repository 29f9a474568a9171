//! Optimistic-concurrency retry
//!
//! Updates are sent with the resourceVersion the object was read at. When
//! another writer got there first the store answers with a conflict; the
//! object is then read again, the mutation re-applied, and the write retried,
//! up to a fixed number of attempts.

use futures::future::BoxFuture;
use store_client::{ResourceKind, StoreError};
use tracing::warn;

pub const DEFAULT_CONFLICT_ATTEMPTS: u32 = 5;

/// Bound on write attempts for a single update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictRetry {
    pub max_attempts: u32,
}

impl Default for ConflictRetry {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_CONFLICT_ATTEMPTS,
        }
    }
}

impl ConflictRetry {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Apply `mutate` to `live` and write it back, retrying on conflict.
    ///
    /// `mutate` returns whether the object needs writing at all; when it
    /// returns false no write is issued and `Ok(None)` comes back. After a
    /// conflict the object is re-read with `fetch` and `mutate` runs again on
    /// the fresh copy.
    pub async fn update<'a, T, E, M, F, W>(
        &self,
        kind: ResourceKind,
        mut live: T,
        mut mutate: M,
        fetch: F,
        write: W,
    ) -> Result<Option<T>, E>
    where
        E: From<StoreError>,
        M: FnMut(&mut T) -> Result<bool, E>,
        F: Fn() -> BoxFuture<'a, Result<T, StoreError>>,
        W: Fn(T) -> BoxFuture<'a, Result<T, StoreError>>,
    {
        let mut attempt = 1;
        loop {
            if !mutate(&mut live)? {
                return Ok(None);
            }
            match write(live).await {
                Ok(written) => return Ok(Some(written)),
                Err(e) if e.is_conflict() && attempt < self.max_attempts => {
                    warn!(%kind, attempt, max_attempts = self.max_attempts, "update conflicted, re-reading");
                    attempt += 1;
                    live = fetch().await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn conflict() -> StoreError {
        StoreError::Conflict {
            kind: ResourceKind::Deployment,
            namespace: "default".to_string(),
            name: "web".to_string(),
        }
    }

    /// Fake store holding a counter; `conflicts` writes fail before one succeeds
    struct Fake {
        value: Arc<Mutex<u32>>,
        conflicts: Arc<Mutex<u32>>,
        writes: Arc<Mutex<u32>>,
    }

    impl Fake {
        fn new(conflicts: u32) -> Self {
            Self {
                value: Arc::new(Mutex::new(10)),
                conflicts: Arc::new(Mutex::new(conflicts)),
                writes: Arc::new(Mutex::new(0)),
            }
        }

        fn fetch(&self) -> BoxFuture<'static, Result<u32, StoreError>> {
            let value = self.value.clone();
            Box::pin(async move { Ok(*value.lock().unwrap()) })
        }

        fn write(&self, v: u32) -> BoxFuture<'static, Result<u32, StoreError>> {
            let (value, conflicts, writes) =
                (self.value.clone(), self.conflicts.clone(), self.writes.clone());
            Box::pin(async move {
                *writes.lock().unwrap() += 1;
                let mut remaining = conflicts.lock().unwrap();
                if *remaining > 0 {
                    *remaining -= 1;
                    // Another writer bumped the value meanwhile
                    *value.lock().unwrap() += 100;
                    return Err(conflict());
                }
                *value.lock().unwrap() = v;
                Ok(v)
            })
        }
    }

    #[tokio::test]
    async fn test_retries_after_conflict_with_fresh_copy() {
        let fake = Fake::new(2);
        let result: Option<u32> = ConflictRetry::default()
            .update::<_, StoreError, _, _, _>(
                ResourceKind::Deployment,
                10,
                |v| {
                    *v += 1;
                    Ok(true)
                },
                || fake.fetch(),
                |v| fake.write(v),
            )
            .await
            .unwrap();
        // 11 conflicts (store at 110), 111 conflicts (store at 210), 211 lands
        assert_eq!(result, Some(211));
        assert_eq!(*fake.value.lock().unwrap(), 211);
        assert_eq!(*fake.writes.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let fake = Fake::new(10);
        let err = ConflictRetry::new(3)
            .update::<_, StoreError, _, _, _>(
                ResourceKind::Deployment,
                10,
                |_| Ok(true),
                || fake.fetch(),
                |v| fake.write(v),
            )
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(*fake.writes.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_skips_write_when_nothing_to_change() {
        let fake = Fake::new(0);
        let result = ConflictRetry::default()
            .update::<_, StoreError, _, _, _>(
                ResourceKind::Service,
                10,
                |_| Ok(false),
                || fake.fetch(),
                |v| fake.write(v),
            )
            .await
            .unwrap();
        assert_eq!(result, None);
        assert_eq!(*fake.writes.lock().unwrap(), 0);
    }
}
