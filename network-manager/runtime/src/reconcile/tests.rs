use super::*;
use crate::{
    core::ResourceKind,
    events::{channel, Callback, EventTx},
    managers::ResourceManager,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

type Log = Arc<Mutex<Vec<String>>>;

/// Records what it handled. Objects named `fail-*` fail and objects named
/// `panic-*` panic.
#[derive(Clone, Default)]
struct Recorder {
    log: Log,
    failing_timer: bool,
}

#[async_trait::async_trait]
impl ResourceManager for Recorder {
    async fn process(&self, event: &Event) -> anyhow::Result<()> {
        self.log
            .lock()
            .push(format!("{} {} {}", event.change, event.kind, event.name));
        if event.name.starts_with("panic") {
            panic!("{} exploded", event.name);
        }
        if event.name.starts_with("fail") {
            anyhow::bail!("{} is broken", event.name);
        }
        Ok(())
    }

    async fn timer(&self) -> anyhow::Result<()> {
        self.log.lock().push("timer".to_string());
        if self.failing_timer {
            anyhow::bail!("timer failed");
        }
        Ok(())
    }
}

fn init_tracing() -> tracing::subscriber::DefaultGuard {
    tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .finish(),
    )
}

fn reconciler(recorder: Recorder) -> (EventTx, Reconciler, Metrics) {
    let (tx, rx) = channel();
    let mut managers = Managers::default();
    for kind in [ResourceKind::Pod, ResourceKind::Namespace] {
        managers.insert(kind, Arc::new(recorder.clone()) as Arc<dyn ResourceManager>);
    }
    let metrics = Metrics::default();
    (tx, Reconciler::new(rx, managers, metrics.clone()), metrics)
}

fn pod(name: &str) -> Event {
    Event::new(
        ResourceKind::Pod,
        ChangeType::Added,
        json!({ "metadata": { "namespace": "ns-0", "name": name, "uid": name } }),
    )
}

/// A callback that records the error it was notified of, if any.
fn ack(seen: &Arc<Mutex<Vec<Option<String>>>>) -> Callback {
    let seen = seen.clone();
    Callback::new("ack", move |_: &Event, error: Option<&(dyn Error + 'static)>| {
        seen.lock().push(error.map(|e| e.to_string()));
        Ok(())
    })
}

#[tokio::test]
async fn processes_events_in_enqueue_order() {
    let _trace = init_tracing();
    let recorder = Recorder::default();
    let (tx, reconciler, metrics) = reconciler(recorder.clone());

    for i in 0..5 {
        tx.send(pod(&format!("pod-{i}"))).unwrap();
    }
    tx.send(Event::sync(ResourceKind::Namespace)).unwrap();
    drop(tx);

    reconciler.run().await.expect("loop must end cleanly");
    assert_eq!(
        *recorder.log.lock(),
        vec![
            "ADDED Pod pod-0",
            "ADDED Pod pod-1",
            "ADDED Pod pod-2",
            "ADDED Pod pod-3",
            "ADDED Pod pod-4",
            "timer",
        ]
    );
    assert_eq!(metrics.events_of("Pod", ChangeType::Added), 5);
    assert_eq!(metrics.events_of("Namespace", ChangeType::Sync), 1);
}

#[tokio::test]
async fn unknown_kinds_do_not_stop_the_loop() {
    let _trace = init_tracing();
    let recorder = Recorder::default();
    let (tx, reconciler, metrics) = reconciler(recorder.clone());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let unsupported = Event::new(
        "Unsupported",
        ChangeType::Added,
        json!({ "metadata": { "name": "thing" } }),
    );
    tx.enqueue(unsupported, Some(ack(&seen))).unwrap();
    tx.enqueue(pod("pod-0"), Some(ack(&seen))).unwrap();
    // Known to the system, but without a registered manager.
    tx.send(Event::sync(ResourceKind::Ingress)).unwrap();
    tx.send(pod("pod-1")).unwrap();
    drop(tx);

    reconciler.run().await.expect("loop must end cleanly");
    assert_eq!(
        *recorder.log.lock(),
        vec!["ADDED Pod pod-0", "ADDED Pod pod-1"]
    );
    assert_eq!(
        *seen.lock(),
        vec![
            Some("unsupported resource kind: Unsupported".to_string()),
            None
        ]
    );
    assert_eq!(metrics.unknown_of("Unsupported"), 1);
    assert_eq!(metrics.unknown_of("Ingress"), 1);
}

#[tokio::test]
async fn handler_errors_are_passed_to_the_callback() {
    let _trace = init_tracing();
    let recorder = Recorder::default();
    let (tx, reconciler, metrics) = reconciler(recorder.clone());
    let seen = Arc::new(Mutex::new(Vec::new()));

    tx.enqueue(pod("fail-0"), Some(ack(&seen))).unwrap();
    tx.enqueue(pod("pod-0"), Some(ack(&seen))).unwrap();
    drop(tx);

    reconciler.run().await.expect("handler failures are not fatal");
    assert_eq!(
        *seen.lock(),
        vec![Some("fail-0 is broken".to_string()), None]
    );
    assert_eq!(metrics.errors_of("Pod", ChangeType::Added), 1);
}

#[tokio::test]
async fn handler_panics_are_caught() {
    let _trace = init_tracing();
    let recorder = Recorder::default();
    let (tx, reconciler, _) = reconciler(recorder.clone());
    let seen = Arc::new(Mutex::new(Vec::new()));

    tx.enqueue(pod("panic-0"), Some(ack(&seen))).unwrap();
    tx.send(pod("pod-0")).unwrap();
    drop(tx);

    reconciler.run().await.expect("handler panics are not fatal");
    assert_eq!(
        *seen.lock(),
        vec![Some("handler panicked: panic-0 exploded".to_string())]
    );
    assert_eq!(
        *recorder.log.lock(),
        vec!["ADDED Pod panic-0", "ADDED Pod pod-0"]
    );
}

#[tokio::test]
async fn callback_failures_are_fatal() {
    let _trace = init_tracing();
    let recorder = Recorder::default();
    let (tx, reconciler, _) = reconciler(recorder.clone());

    let nack = Callback::new("nack", |_: &Event, _: Option<&(dyn Error + 'static)>| {
        Err("acknowledgement lost".into())
    });
    tx.enqueue(pod("pod-0"), Some(nack)).unwrap();
    tx.send(pod("pod-1")).unwrap();

    let fatal = reconciler.run().await.expect_err("callback failure must be fatal");
    assert_eq!(fatal.callback, "nack");
    assert_eq!(fatal.event.name, "pod-0");
    assert_eq!(fatal.source.to_string(), "acknowledgement lost");
    assert!(
        fatal.handler_error.is_none(),
        "the handler succeeded; the failure belongs to the callback"
    );
    assert_eq!(
        *recorder.log.lock(),
        vec!["ADDED Pod pod-0"],
        "nothing is processed after a fatal failure"
    );
}

#[tokio::test]
async fn callback_failures_carry_the_handler_error() {
    let (tx, reconciler, _) = reconciler(Recorder::default());
    let nack = Callback::new("nack", |_: &Event, error: Option<&(dyn Error + 'static)>| {
        Err(format!("rejected: {}", error.map(|e| e.to_string()).unwrap_or_default()).into())
    });
    tx.enqueue(pod("fail-0"), Some(nack)).unwrap();

    let fatal = reconciler.run().await.expect_err("callback failure must be fatal");
    assert_eq!(fatal.source.to_string(), "rejected: fail-0 is broken");
    assert!(matches!(fatal.handler_error, Some(HandlerError::Failed(_))));
}

#[tokio::test]
async fn timer_failures_do_not_stop_the_loop() {
    let _trace = init_tracing();
    let recorder = Recorder {
        failing_timer: true,
        ..Default::default()
    };
    let (tx, reconciler, metrics) = reconciler(recorder.clone());

    tx.send(Event::sync(ResourceKind::Pod)).unwrap();
    tx.send(pod("pod-0")).unwrap();
    drop(tx);

    reconciler.run().await.expect("timer failures are not fatal");
    assert_eq!(*recorder.log.lock(), vec!["timer", "ADDED Pod pod-0"]);
    assert_eq!(metrics.errors_of("Pod", ChangeType::Sync), 1);
}

#[tokio::test(start_paused = true)]
async fn idles_until_events_arrive() {
    let recorder = Recorder::default();
    let (tx, reconciler, _) = reconciler(recorder.clone());
    let task = tokio::spawn(
        reconciler
            .with_idle_timeout(time::Duration::from_secs(1))
            .run(),
    );

    time::sleep(time::Duration::from_secs(10)).await;
    assert!(recorder.log.lock().is_empty());
    tx.send(pod("pod-0")).unwrap();
    drop(tx);

    task.await
        .expect("task must not panic")
        .expect("loop must end cleanly");
    assert_eq!(*recorder.log.lock(), vec!["ADDED Pod pod-0"]);
}
