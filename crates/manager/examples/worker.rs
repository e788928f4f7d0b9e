//! Minimal worker process against a local Redis.
//!
//! Starts a manager in worker mode, enqueues one job for itself, and waits
//! for the result:
//!
//! ```sh
//! cargo run -p jobq-manager --example worker
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use jobq_manager::{Config, Job, Manager};

#[derive(Debug, Serialize, Deserialize)]
struct SleepJob {
    millis: u64,
    #[serde(default)]
    slept: bool,
}

impl Job for SleepJob {
    fn execute(&mut self) -> anyhow::Result<()> {
        std::thread::sleep(Duration::from_millis(self.millis));
        self.slept = true;
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    jobq_observability::init();

    let config = Config {
        namespace: "jobq-demo".to_string(),
        timeout: Duration::from_secs(5),
        ..Config::default()
    };
    let manager = Manager::<SleepJob>::new(config)?;
    manager.start_worker(|| tracing::info!("manager stopped"));

    let mut job = SleepJob {
        millis: 250,
        slept: false,
    };
    manager.add_job_and_wait(&mut job)?;
    tracing::info!(slept = job.slept, "job finished");

    manager.stop();
    Ok(())
}
