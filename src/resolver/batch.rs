//! Bounded concurrent resolution of many URLs

use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{error, info};

use crate::config::FETCH_STAGGER_DELAY_MS;
use crate::error::MonitorError;
use crate::resolver::decision::StoreDecision;
use crate::resolver::resolve::Resolver;
use crate::store::storer::ContentStorer;

/// Result of resolving one URL of a batch
#[derive(Debug)]
pub struct BatchOutcome {
    pub url: String,
    pub result: Result<StoreDecision, MonitorError>,
}

/// Resolve `urls` with at most `workers` resolutions in flight
///
/// Outcomes come back in input order. A failing URL does not stop the
/// others. Start times are staggered within each wave of workers to avoid
/// hammering a single host; the stagger is waited out before taking a
/// worker slot.
pub async fn check_batch<S: ContentStorer>(
    resolver: &Resolver<S>,
    urls: &[String],
    scope: Option<&str>,
    workers: usize,
) -> Vec<BatchOutcome> {
    let workers = workers.max(1);
    let semaphore = Semaphore::new(workers);

    let futures = urls.iter().enumerate().map(|(i, url)| {
        let delay = Duration::from_millis(FETCH_STAGGER_DELAY_MS * (i % workers) as u64);
        let semaphore = &semaphore;
        async move {
            sleep(delay).await;
            // The semaphore is never closed
            let permit = semaphore.acquire().await.ok();
            let result = resolver.resolve(url, scope).await;
            drop(permit);

            if let Err(e) = &result {
                error!("Failed to check {}: {}", url, e);
            }
            BatchOutcome {
                url: url.clone(),
                result,
            }
        }
    });

    let outcomes = join_all(futures).await;

    let changed = outcomes
        .iter()
        .filter(|outcome| matches!(&outcome.result, Ok(decision) if decision.is_new_version()))
        .count();
    info!("Checked {} URLs, {} changed", outcomes.len(), changed);

    outcomes
}
