use crate::queue::EventTx;
use kube_network_manager_core::{Event, ResourceKind};
use tokio::time;

/// Periodically requests a resync of each of `kinds`.
///
/// Runs until the queue is closed.
pub async fn sync_ticker(queue: EventTx, kinds: Vec<ResourceKind>, period: time::Duration) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    // The first tick completes immediately; resyncs start one period in.
    interval.tick().await;

    loop {
        interval.tick().await;
        for kind in &kinds {
            tracing::trace!(%kind, "Requesting resync");
            if queue.send(Event::sync(*kind)).is_err() {
                tracing::debug!("Event queue closed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{channel, Dequeue};
    use kube_network_manager_core::ChangeType;

    #[tokio::test(start_paused = true)]
    async fn requests_a_resync_of_each_kind_per_period() {
        let (tx, mut rx) = channel();
        let period = time::Duration::from_secs(60);
        tokio::spawn(sync_ticker(
            tx,
            vec![ResourceKind::Pod, ResourceKind::Namespace],
            period,
        ));

        let start = time::Instant::now();
        let mut kinds = Vec::new();
        for _ in 0..4 {
            match rx.dequeue(None).await {
                Dequeue::Item(env) => {
                    assert_eq!(env.event.change, ChangeType::Sync);
                    kinds.push(env.event.kind);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(start.elapsed() >= period * 2);
        assert_eq!(kinds, vec!["Pod", "Namespace", "Pod", "Namespace"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_the_queue_closes() {
        let (tx, rx) = channel();
        drop(rx);
        let ticker = tokio::spawn(sync_ticker(
            tx,
            vec![ResourceKind::Pod],
            time::Duration::from_secs(1),
        ));
        ticker.await.expect("ticker must exit cleanly");
    }
}
