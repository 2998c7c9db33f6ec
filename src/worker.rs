//! Worker process driver: the transport thread plus the scheduler loop.

use crate::bake::SampleKernel;
use crate::config::WorkerConfig;
use crate::error::{CookieBakerError, Result};
use crate::scheduler::{FinishedBake, Scheduler, TickOutcome};
use crate::transport;

/// Called on the scheduler thread for every finished bake.
pub type FinishedCallback = dyn FnMut(FinishedBake) + Send;

pub struct Worker {
    config: WorkerConfig,
    kernel: Option<Box<dyn SampleKernel>>,
    finished_callback: Option<Box<FinishedCallback>>,
}

impl Worker {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            kernel: None,
            finished_callback: None,
        }
    }

    /// Replaces the default CPU kernel.
    pub fn with_kernel(mut self, kernel: Box<dyn SampleKernel>) -> Self {
        self.kernel = Some(kernel);
        self
    }

    /// Sets the function that receives finished images.
    pub fn set_finished_callback<F>(&mut self, callback: F)
    where
        F: FnMut(FinishedBake) + Send + 'static,
    {
        self.finished_callback = Some(Box::new(callback));
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Runs until the host sends `ShutdownMessage`.
    pub fn run(&mut self) -> Result<()> {
        let (mut transport, inbound, outbound) = transport::spawn(&self.config)?;

        let mut scheduler = match self.kernel.take() {
            Some(kernel) => Scheduler::with_kernel(&self.config, inbound, outbound, kernel),
            None => Scheduler::new(&self.config, inbound, outbound),
        };

        loop {
            let outcome = scheduler.tick();

            for bake in scheduler.drain_finished() {
                match self.finished_callback.as_mut() {
                    Some(callback) => callback(bake),
                    None => log::debug!("No consumer for finished bake {}", bake.workload_id),
                }
            }

            match outcome {
                TickOutcome::ShuttingDown => break,
                TickOutcome::Idle => std::thread::sleep(self.config.idle_tick_interval),
                TickOutcome::Busy => {}
            }

            if transport.is_finished() {
                transport.stop()?;
                return Err(CookieBakerError::Transport(
                    "transport loop exited before shutdown".into(),
                ));
            }
        }

        // Dropping the scheduler closes both queues; the transport flushes what is left.
        drop(scheduler);
        transport.stop()?;
        log::info!("Worker shut down");
        Ok(())
    }
}
