use std::future::Future;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::ChainResult;

/// Serializes "assign nonce, submit" for chains with account nonces.
///
/// Only this critical section is locked; confirmation waiting happens outside
/// of it. A nonce-class submission error drops the cached nonce so the next
/// submission resyncs from chain state.
#[derive(Debug, Default)]
pub struct NonceManager {
    next: Mutex<Option<u64>>,
}

impl NonceManager {
    /// A manager that fetches the nonce from chain on first use
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a nonce and submit while holding the lock.
    ///
    /// `fetch` is only called when no nonce is cached.
    pub async fn submit<T, F, FFut, S, SFut>(&self, fetch: F, submit: S) -> ChainResult<T>
    where
        F: FnOnce() -> FFut,
        FFut: Future<Output = ChainResult<u64>>,
        S: FnOnce(u64) -> SFut,
        SFut: Future<Output = ChainResult<T>>,
    {
        let mut next = self.next.lock().await;
        let nonce = match *next {
            Some(nonce) => nonce,
            None => {
                let nonce = fetch().await?;
                debug!(nonce, "Synced nonce from chain");
                nonce
            }
        };
        match submit(nonce).await {
            Ok(v) => {
                *next = Some(nonce + 1);
                Ok(v)
            }
            Err(err) => {
                if err.is_nonce_error() {
                    warn!(nonce, ?err, "Nonce out of sync, resyncing before next submission");
                    *next = None;
                } else {
                    *next = Some(nonce);
                }
                Err(err)
            }
        }
    }

    /// Nonce the next submission will use, if known
    pub async fn current(&self) -> Option<u64> {
        *self.next.lock().await
    }
}
