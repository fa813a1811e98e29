mod common;

use std::{sync::Arc, time::Duration};

use clickscore_worker::{scheduler::PassDaemon, store::memory::MemoryJobStore};

use common::{Harness, articles};

#[tokio::test]
async fn daemon_runs_passes_until_shutdown() {
    let h = Harness::new(articles([1, 2]), Arc::new(MemoryJobStore::new()));
    let scoring = h.scoring.clone();
    let daemon = PassDaemon::new(Arc::new(h.manager), Duration::from_millis(10));

    let passes = daemon
        .run_until(tokio::time::sleep(Duration::from_millis(100)))
        .await;

    assert!(passes >= 2, "expected several passes, got {passes}");
    // Only the first pass submits; later ones find the batch in flight.
    assert_eq!(scoring.submissions().await.len(), 1);
}
