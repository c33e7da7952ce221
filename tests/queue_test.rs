//! Queue integration tests over the in-memory backend

use crate::common::{capture_logger, init_tracing, memory_factory};
use opentelemetry::trace::TraceContextExt;
use otel_harness::logging::LogLevel;
use otel_harness::queue::jobs::start_workers;
use otel_harness::queue::{FooJob, JobRecord, QueueError, QueueName};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

mod common;

#[tokio::test]
async fn test_worker_observes_enqueued_payload() {
    let (logger, capture) = capture_logger("secondary", LogLevel::Info);
    let (factory, _backend, _calls) = memory_factory(logger);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let worker = factory.start_worker::<FooJob, _, _>(move |job| {
        let tx = tx.clone();
        async move {
            tx.send(job).unwrap();
            Ok::<_, anyhow::Error>(())
        }
    });

    let handle = factory.enqueue(&FooJob::default()).await.unwrap();
    let job = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("worker never received the job")
        .unwrap();

    assert_eq!(job.id, handle.id);
    assert_eq!(job.queue, QueueName::Foo);
    assert_eq!(job.name, "someJobName");
    assert_eq!(job.data, FooJob { bar: true });

    let enqueued = capture.find("Finished enqueueing job").unwrap();
    assert_eq!(enqueued.level, LogLevel::Info);
    assert_eq!(enqueued.attributes.get("job").unwrap()["id"], json!(handle.id));
    assert_eq!(enqueued.attributes.get("job").unwrap()["queue"], json!("foo"));

    worker.shutdown().await;
}

#[tokio::test]
async fn test_failed_job_is_logged_with_error() {
    let (logger, capture) = capture_logger("secondary", LogLevel::Info);
    let (factory, _backend, _calls) = memory_factory(logger);

    let worker = factory.start_worker::<FooJob, _, _>(|_job| async {
        Err::<(), _>(anyhow::anyhow!("downstream rejected the job"))
    });
    let handle = factory.enqueue(&FooJob::default()).await.unwrap();

    let record = capture.wait_for("Job failed").await;
    assert_eq!(record.level, LogLevel::Error);
    assert_eq!(record.attributes.get("job").unwrap()["id"], json!(handle.id));

    let err = record.error.unwrap();
    assert_eq!(err.kind, "Error");
    assert_eq!(err.message, "downstream rejected the job");

    worker.shutdown().await;
}

#[tokio::test]
async fn test_foo_worker_logs_processing() {
    let (logger, capture) = capture_logger("secondary", LogLevel::Info);
    let (factory, _backend, _calls) = memory_factory(logger);
    let workers = start_workers(&factory);

    factory
        .enqueue_value("foo", json!({"bar": true}))
        .await
        .unwrap();

    let record = capture.wait_for("Processing incoming job").await;
    assert_eq!(&*record.logger_name, "secondary/fooWorker");
    assert_eq!(record.attributes.get("job").unwrap()["data"], json!({"bar": true}));

    for worker in workers {
        worker.shutdown().await;
    }
}

#[tokio::test]
async fn test_job_continues_producer_trace() {
    let _tracing = init_tracing();
    let (logger, capture) = capture_logger("secondary", LogLevel::Info);
    let (factory, backend, _calls) = memory_factory(logger);

    let request = tracing::info_span!("request");
    let trace_id = request.context().span().span_context().trace_id().to_string();

    // Enqueue before any worker runs so the stored record can be inspected.
    factory
        .enqueue(&FooJob::default())
        .instrument(request.clone())
        .await
        .unwrap();
    assert_eq!(backend.len(QueueName::Foo), 1);

    let enqueued = capture.find("Finished enqueueing job").unwrap();
    assert_eq!(enqueued.tracing.trace_id(), Some(trace_id.clone()));
    let traceparent = enqueued.attributes.get("job").unwrap()["metadata"]["traceparent"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(traceparent.contains(&trace_id));

    let workers = start_workers(&factory);
    let processed = capture.wait_for("Processing incoming job").await;
    assert_eq!(processed.tracing.trace_id(), Some(trace_id));
    assert_ne!(processed.tracing.span_id(), enqueued.tracing.span_id());

    for worker in workers {
        worker.shutdown().await;
    }
}

#[tokio::test]
async fn test_rejections_never_connect() {
    let (logger, _capture) = capture_logger("secondary", LogLevel::Silent);
    let (factory, _backend, calls) = memory_factory(logger);

    let unknown = factory.enqueue_value("bar", json!({"bar": true})).await;
    assert!(matches!(unknown, Err(QueueError::UnknownQueue(name)) if name == "bar"));

    let invalid = factory.enqueue_value("foo", json!({"bar": false})).await;
    assert!(matches!(invalid, Err(QueueError::Schema { queue: QueueName::Foo, .. })));

    let sequence = factory.enqueue_value("foo", json!([true])).await;
    assert!(matches!(sequence, Err(QueueError::Schema { queue: QueueName::Foo, .. })));

    let typed = factory.enqueue(&FooJob { bar: false }).await;
    assert!(matches!(typed, Err(QueueError::Schema { .. })));

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!factory.registry().is_connected());
}

#[tokio::test]
async fn test_producer_and_worker_share_one_connection() {
    let (logger, capture) = capture_logger("secondary", LogLevel::Info);
    let (factory, _backend, calls) = memory_factory(logger);

    let workers = start_workers(&factory);
    let handles = factory.handles_for(QueueName::ALL).await.unwrap();
    handles[&QueueName::Foo]
        .enqueue(&FooJob::default())
        .await
        .unwrap();
    factory.enqueue(&FooJob::default()).await.unwrap();

    capture.wait_for("Processing incoming job").await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    for worker in workers {
        worker.shutdown().await;
    }
}

#[tokio::test]
async fn test_ids_are_sequential_per_queue() {
    let (logger, _capture) = capture_logger("secondary", LogLevel::Silent);
    let (factory, backend, _calls) = memory_factory(logger);

    let first = factory.enqueue(&FooJob::default()).await.unwrap();
    let second = factory.enqueue(&FooJob::default()).await.unwrap();
    assert_eq!(first.id, "1");
    assert_eq!(second.id, "2");

    use otel_harness::queue::QueueBackend;
    let raw = backend.pop(QueueName::Foo).await.unwrap().unwrap();
    let record = JobRecord::decode(&raw).unwrap();
    assert_eq!(record.id, "1");
    assert_eq!(record.payload, json!({"bar": true}));
}
