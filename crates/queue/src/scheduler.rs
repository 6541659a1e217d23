// Background driver for queue and session processing
//
// Two timers:
// - Queue: drain the queue with process_entire_queue
// - Sessions: advance the oldest active enqueueing session by one page
//
// A tick runs to completion; shutdown is observed between ticks.

use reindex_core::SchedulerConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info};

use crate::manager::QueueManager;

pub struct Scheduler {
  config: SchedulerConfig,
  manager: Arc<QueueManager>,
  shutdown_rx: broadcast::Receiver<()>,
}

impl Scheduler {
  pub fn new(manager: Arc<QueueManager>, config: SchedulerConfig, shutdown_rx: broadcast::Receiver<()>) -> Self {
    Self {
      config,
      manager,
      shutdown_rx,
    }
  }

  /// Run until a shutdown signal arrives
  pub async fn run(mut self) {
    if !self.config.enabled {
      info!("Scheduler disabled by configuration");
      return;
    }

    let queue_interval = Duration::from_secs(self.config.queue_interval_secs.max(1));
    let session_interval = Duration::from_secs(self.config.session_interval_secs.max(1));
    let batch_size = self.manager.settings().batch_size;

    let mut queue_timer = interval(queue_interval);
    let mut session_timer = interval(session_interval);

    // Skip the immediate ticks
    queue_timer.tick().await;
    session_timer.tick().await;

    info!(
      queue_interval_secs = queue_interval.as_secs(),
      session_interval_secs = session_interval.as_secs(),
      batch_size = batch_size,
      "Scheduler started"
    );

    loop {
      tokio::select! {
        _ = queue_timer.tick() => {
          match self.manager.process_entire_queue(batch_size).await {
            Ok(0) => {}
            Ok(processed) => debug!(processed = processed, "Scheduled queue processing complete"),
            Err(e) => error!(err = %e, "Scheduled queue processing failed"),
          }
        }
        _ = session_timer.tick() => {
          match self.manager.process_next_enqueueing_session(batch_size).await {
            Ok(0) => {}
            Ok(enqueued) => debug!(enqueued = enqueued, "Scheduled session processing complete"),
            Err(e) => error!(err = %e, "Scheduled session processing failed"),
          }
        }
        _ = self.shutdown_rx.recv() => {
          debug!("Scheduler received shutdown signal");
          break;
        }
      }
    }
  }
}

/// Spawn the scheduler as a background task
pub fn spawn_scheduler(
  manager: Arc<QueueManager>,
  config: SchedulerConfig,
  shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
  let scheduler = Scheduler::new(manager, config, shutdown_rx);
  tokio::spawn(async move {
    scheduler.run().await;
  })
}
