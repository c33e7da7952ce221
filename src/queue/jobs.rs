//! Workers of this system's queues

use super::factory::QueueHandleFactory;
use super::schema::FooJob;
use super::worker::Worker;
use serde_json::json;

/// Start one worker per queue
pub fn start_workers(factory: &QueueHandleFactory) -> Vec<Worker> {
    let foo_logger = factory.logger().child("fooWorker");

    let foo = factory.start_worker::<FooJob, _, _>(move |job| {
        let logger = foo_logger.clone();
        async move {
            logger.info(
                "Processing incoming job",
                json!({
                    "job": {
                        "id": job.id,
                        "name": job.name,
                        "data": job.data,
                    }
                }),
            );
            Ok::<_, anyhow::Error>(())
        }
    });

    vec![foo]
}
