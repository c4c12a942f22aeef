//! Deduplicated record loading
//!
//! While a fetch is in flight every caller awaits the same future. The fetch
//! runs as its own task, so it completes even when every caller gave up, and
//! it clears the slot once settled so the next call fetches again.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::Mutex;

use super::fetcher::{Attempt, FetchError, RecordFetcher};
use super::models::Record;

pub type FetchResult = Result<Arc<Vec<Record>>, FetchError>;
type InFlight = Shared<BoxFuture<'static, FetchResult>>;

pub struct SharedRecordLoader {
    fetcher: Arc<RecordFetcher>,
    in_flight: Arc<Mutex<Option<InFlight>>>,
}

impl SharedRecordLoader {
    pub fn new(fetcher: Arc<RecordFetcher>) -> Self {
        Self {
            fetcher,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    pub fn fetcher(&self) -> &Arc<RecordFetcher> {
        &self.fetcher
    }

    pub async fn load(&self) -> FetchResult {
        let future = {
            let mut slot = self.in_flight.lock().await;
            match slot.as_ref() {
                Some(existing) => {
                    log::debug!("Joining in-flight record fetch");
                    existing.clone()
                }
                None => {
                    let future = self.start_fetch();
                    *slot = Some(future.clone());
                    future
                }
            }
        };
        future.await
    }

    /// Must be called with the slot locked: the task clears it on completion
    fn start_fetch(&self) -> InFlight {
        let fetcher = Arc::clone(&self.fetcher);
        let in_flight = Arc::clone(&self.in_flight);
        let task = tokio::spawn(async move {
            let result = fetcher.fetch_records().await.map(Arc::new);
            *in_flight.lock().await = None;
            result
        });

        async move {
            task.await.unwrap_or_else(|e| {
                log::warn!("Record fetch task failed: {}", e);
                Err(FetchError {
                    attempts: vec![Attempt {
                        layout: None,
                        script: None,
                        status: None,
                        message: e.to_string(),
                    }],
                })
            })
        }
        .boxed()
        .shared()
    }
}
