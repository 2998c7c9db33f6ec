//! Cooperative job scheduler.
//!
//! The scheduler owns every job the worker knows about. It is driven by
//! [`Scheduler::tick`], which never blocks: inbound messages are taken with
//! `try_recv` and outbound bytes are handed over with `try_send`.
//!
//! Admission state lives in one map from workload id to [`Admission`]; the
//! pending queue and the active slot only hold the job objects.

use crate::bake::{BakeJob, CookieImage, CpuKernel, SampleKernel};
use crate::config::WorkerConfig;
use crate::protocol::{self, Message, ProgressUpdate, WorkloadId, WorkloadRequest};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Pending,
    Active,
    CancelRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    ShuttingDown,
}

/// What the last tick did, so the driver knows whether to sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No job is queued or running.
    Idle,
    Busy,
    ShuttingDown,
}

/// A completed bake waiting to be collected.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedBake {
    pub workload_id: WorkloadId,
    pub image: CookieImage,
}

pub struct Scheduler {
    inbound: Receiver<Message>,
    outbound: Sender<Vec<u8>>,
    kernel: Box<dyn SampleKernel>,
    admissions: HashMap<WorkloadId, Admission>,
    pending: VecDeque<BakeJob>,
    active: Option<BakeJob>,
    finished: Vec<FinishedBake>,
    state: SchedulerState,
    seed: u64,
    reclaim_interval: u32,
    ticks_since_reclaim: u32,
    reclaim_passes: u64,
}

impl Scheduler {
    pub fn new(
        config: &WorkerConfig,
        inbound: Receiver<Message>,
        outbound: Sender<Vec<u8>>,
    ) -> Self {
        Self::with_kernel(config, inbound, outbound, Box::new(CpuKernel))
    }

    pub fn with_kernel(
        config: &WorkerConfig,
        inbound: Receiver<Message>,
        outbound: Sender<Vec<u8>>,
        kernel: Box<dyn SampleKernel>,
    ) -> Self {
        Self {
            inbound,
            outbound,
            kernel,
            admissions: HashMap::new(),
            pending: VecDeque::new(),
            active: None,
            finished: Vec::new(),
            state: SchedulerState::Running,
            seed: config.seed,
            reclaim_interval: config.reclaim_interval.max(1),
            ticks_since_reclaim: 0,
            reclaim_passes: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn admission(&self, id: WorkloadId) -> Option<Admission> {
        self.admissions.get(&id).copied()
    }

    pub fn pending_ids(&self) -> Vec<WorkloadId> {
        self.pending.iter().map(BakeJob::id).collect()
    }

    pub fn active_id(&self) -> Option<WorkloadId> {
        self.active.as_ref().map(BakeJob::id)
    }

    /// Ids whose cancellation has been requested but not yet applied.
    pub fn cancel_requested(&self) -> Vec<WorkloadId> {
        self.admissions
            .iter()
            .filter(|(_, admission)| **admission == Admission::CancelRequested)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Number of reclamation passes run so far.
    pub fn reclaim_passes(&self) -> u64 {
        self.reclaim_passes
    }

    /// Takes every bake finished since the last call.
    pub fn drain_finished(&mut self) -> Vec<FinishedBake> {
        std::mem::take(&mut self.finished)
    }

    pub fn tick(&mut self) -> TickOutcome {
        if self.state == SchedulerState::ShuttingDown {
            return TickOutcome::ShuttingDown;
        }

        self.process_inbound();
        if self.state == SchedulerState::ShuttingDown {
            return TickOutcome::ShuttingDown;
        }

        self.remove_canceled_pending();
        self.cancel_active_if_requested();

        if self.active.is_none() && !self.pending.is_empty() {
            self.start_next();
        } else if self.active.is_some() {
            self.advance_active();
        }

        self.ticks_since_reclaim += 1;
        if self.ticks_since_reclaim >= self.reclaim_interval {
            self.reclaim();
            self.ticks_since_reclaim = 0;
        }

        if self.active.is_none() && self.pending.is_empty() {
            TickOutcome::Idle
        } else {
            TickOutcome::Busy
        }
    }

    fn process_inbound(&mut self) {
        while let Ok(message) = self.inbound.try_recv() {
            match message {
                Message::WorkloadRequest(request) => self.admit(request),
                Message::CancelWorkload { workload_id } => self.request_cancel(workload_id),
                Message::ShutdownMessage => {
                    self.shutdown();
                    return;
                }
                // Outbound-only kinds; the transport already filters these.
                Message::UpAndRunning
                | Message::WorkloadReceived { .. }
                | Message::ProgressUpdate(_)
                | Message::WorkloadComplete { .. } => {
                    log::trace!("Ignoring outbound-only {:?} from host", message.tag());
                }
            }
        }
    }

    fn admit(&mut self, request: WorkloadRequest) {
        let id = request.workload_id;
        self.send(&Message::WorkloadReceived { workload_id: id });

        if self.admissions.contains_key(&id) {
            log::debug!("Workload {} already admitted, ignoring duplicate", id);
            return;
        }

        match BakeJob::from_request(request, self.seed) {
            Ok(job) => {
                log::debug!("Queued workload {}", id);
                self.admissions.insert(id, Admission::Pending);
                self.pending.push_back(job);
            }
            Err(reason) => log::warn!("Rejected workload {}: {}", id, reason),
        }
    }

    fn request_cancel(&mut self, id: WorkloadId) {
        match self.admissions.get_mut(&id) {
            Some(admission) => {
                log::debug!("Cancel requested for workload {}", id);
                *admission = Admission::CancelRequested;
            }
            None => log::debug!("Cancel for unknown workload {} ignored", id),
        }
    }

    fn shutdown(&mut self) {
        log::info!("Shutdown requested");
        if let Some(mut job) = self.active.take() {
            job.cancel();
        }
        self.pending.clear();
        self.admissions.clear();
        while self.inbound.try_recv().is_ok() {}
        self.state = SchedulerState::ShuttingDown;
    }

    fn remove_canceled_pending(&mut self) {
        let admissions = &mut self.admissions;
        self.pending.retain_mut(|job| {
            if admissions.get(&job.id()) == Some(&Admission::CancelRequested) {
                admissions.remove(&job.id());
                job.cancel();
                false
            } else {
                true
            }
        });
    }

    fn cancel_active_if_requested(&mut self) {
        let Some(id) = self.active_id() else {
            return;
        };
        if self.admissions.get(&id) != Some(&Admission::CancelRequested) {
            return;
        }
        if let Some(mut job) = self.active.take() {
            job.cancel();
        }
        self.admissions.remove(&id);
    }

    fn start_next(&mut self) {
        let Some(mut job) = self.pending.pop_front() else {
            return;
        };
        let id = job.id();

        match job.start() {
            Ok(progress) => {
                self.admissions.insert(id, Admission::Active);
                self.send_progress(progress);
                self.active = Some(job);
            }
            Err(err) => {
                log::warn!("Could not start workload {}: {}", id, err);
                self.admissions.remove(&id);
            }
        }
    }

    fn advance_active(&mut self) {
        let Some(mut job) = self.active.take() else {
            return;
        };
        let id = job.id();

        match job.tick(self.kernel.as_ref()) {
            Ok(progress) => self.send_progress(progress),
            Err(err) => {
                log::warn!("Dropping workload {}: {}", id, err);
                self.admissions.remove(&id);
                return;
            }
        }

        if !job.is_finalizing() {
            self.active = Some(job);
            return;
        }

        match job.finalize() {
            Ok(image) => {
                log::info!(
                    "Finished bake {} (mean intensity {:.4})",
                    id,
                    image.mean_intensity()
                );
                self.send(&Message::WorkloadComplete { workload_id: id });
                self.finished.push(FinishedBake {
                    workload_id: id,
                    image,
                });
            }
            Err(err) => log::warn!("Could not finalize workload {}: {}", id, err),
        }
        self.admissions.remove(&id);
    }

    /// Hands back spare capacity held by the scheduler's collections.
    fn reclaim(&mut self) {
        self.pending.shrink_to_fit();
        self.admissions.shrink_to_fit();
        self.finished.shrink_to_fit();
        self.reclaim_passes += 1;
        log::trace!("Reclaimed scheduler buffers (pass {})", self.reclaim_passes);
    }

    fn send_progress(&self, progress: ProgressUpdate) {
        self.send(&Message::ProgressUpdate(progress));
    }

    fn send(&self, message: &Message) {
        match self.outbound.try_send(protocol::encode(message)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!("Outbound queue full, dropping {:?}", message.tag())
            }
            Err(TrySendError::Disconnected(_)) => {
                log::trace!("Transport gone, dropping {:?}", message.tag())
            }
        }
    }
}
