//! Process entry point: runs the Worker Loop until killed (
//! a process-level stop, not a graceful in-process shutdown).

use replication_fabric::{BackendRegistry, Config, LoggingNotifier, Worker};
use std::process;
use std::sync::Arc;

fn main() {
    env_logger::init();

    let config = Config::from_env().unwrap_or_else(|err| {
        log::error!("configuration error: {err}");
        process::exit(1);
    });

    let registry = Arc::new(BackendRegistry::new(config));
    let notifier = Arc::new(LoggingNotifier);
    let worker = Worker::new(registry, notifier);

    worker.run_forever();
}
