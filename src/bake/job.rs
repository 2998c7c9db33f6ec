//! Resumable bake job.
//!
//! ```text
//! Created -> Started -> Sampling -> Finalizing -> Complete
//!    \          \          \
//!     +----------+----------+--> Canceled
//! ```
//!
//! Each call to [`BakeJob::tick`] runs exactly one sample pass.

use super::geometry::{GeometrySnapshot, WorldGeometry};
use super::image::{Accumulator, CookieImage};
use super::kernel::{BakeSettings, SampleKernel};
use crate::error::{CookieBakerError, InvalidWorkload, Result};
use crate::math::Vec2;
use crate::protocol::{ProgressUpdate, WorkloadId, WorkloadRequest};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BakeState {
    Created,
    Started,
    Sampling,
    Finalizing,
    Complete,
    Canceled,
}

impl BakeState {
    pub(crate) fn is_cancelable(self) -> bool {
        matches!(self, Self::Created | Self::Started | Self::Sampling)
    }
}

pub struct BakeJob {
    id: WorkloadId,
    settings: BakeSettings,
    sample_count: u32,
    completed_samples: u32,
    state: BakeState,
    geometry: Option<GeometrySnapshot>,
    scene: Option<WorldGeometry>,
    accumulator: Option<Accumulator>,
    pixel_offset: Vec2,
    rng: StdRng,
}

impl std::fmt::Debug for BakeJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BakeJob")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("completed_samples", &self.completed_samples)
            .field("sample_count", &self.sample_count)
            .field("resolution", &self.settings.resolution)
            .finish()
    }
}

impl BakeJob {
    /// Validates `request` and builds a job from it. `seed` drives the jitter stream.
    pub fn from_request(request: WorkloadRequest, seed: u64) -> Result<Self> {
        if request.sample_count <= 0 {
            return Err(InvalidWorkload::SampleCount(request.sample_count).into());
        }
        if request.resolution <= 0 {
            return Err(InvalidWorkload::Resolution(request.resolution).into());
        }
        if request.bounce_count < 0 {
            return Err(InvalidWorkload::BounceCount(request.bounce_count).into());
        }

        let settings = BakeSettings::from_request(&request);
        let WorkloadRequest {
            workload_id,
            sample_count,
            vertices,
            indices,
            object_data,
            ..
        } = request;
        let geometry = GeometrySnapshot::new(vertices, indices, object_data)?;

        Ok(Self {
            id: workload_id,
            settings,
            sample_count: sample_count as u32,
            completed_samples: 0,
            state: BakeState::Created,
            geometry: Some(geometry),
            scene: None,
            accumulator: None,
            pixel_offset: Vec2::splat(0.5),
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn id(&self) -> WorkloadId {
        self.id
    }

    pub fn state(&self) -> BakeState {
        self.state
    }

    /// Whether the job still holds its geometry or image buffers.
    pub fn holds_resources(&self) -> bool {
        self.geometry.is_some() || self.scene.is_some() || self.accumulator.is_some()
    }

    pub fn progress(&self) -> ProgressUpdate {
        ProgressUpdate {
            workload_id: self.id,
            completed_samples: self.completed_samples as i32,
            total_samples: self.sample_count as i32,
            currently_running: matches!(
                self.state,
                BakeState::Started | BakeState::Sampling | BakeState::Finalizing
            ),
        }
    }

    /// Allocates the accumulator and flattens the scene into world space.
    pub fn start(&mut self) -> Result<ProgressUpdate> {
        self.expect_state(&[BakeState::Created], "start")?;

        let geometry = self
            .geometry
            .as_ref()
            .ok_or_else(|| CookieBakerError::Job(format!("job {} has no geometry", self.id)))?;

        self.scene = Some(geometry.to_world());
        self.accumulator = Some(Accumulator::new(self.settings.resolution));
        self.completed_samples = 0;
        self.state = BakeState::Started;

        log::info!(
            "Started bake {}: {} samples at {}x{}, {} objects, {} triangles",
            self.id,
            self.sample_count,
            self.settings.resolution,
            self.settings.resolution,
            geometry.object_count(),
            geometry.triangle_count()
        );

        Ok(self.progress())
    }

    /// Runs one sample pass and draws the jitter for the next one.
    pub fn tick(&mut self, kernel: &dyn SampleKernel) -> Result<ProgressUpdate> {
        self.expect_state(&[BakeState::Started, BakeState::Sampling], "tick")?;

        let (Some(scene), Some(accumulator)) = (self.scene.as_ref(), self.accumulator.as_mut())
        else {
            return Err(CookieBakerError::Job(format!(
                "job {} is sampling without buffers",
                self.id
            )));
        };

        kernel.run_pass(&self.settings, scene, self.pixel_offset, accumulator);

        self.pixel_offset = Vec2::new(unit_draw(&mut self.rng), unit_draw(&mut self.rng));
        self.completed_samples += 1;
        self.state = if self.completed_samples >= self.sample_count {
            BakeState::Finalizing
        } else {
            BakeState::Sampling
        };

        log::trace!(
            "Bake {} pass {}/{}",
            self.id,
            self.completed_samples,
            self.sample_count
        );

        Ok(self.progress())
    }

    pub fn is_finalizing(&self) -> bool {
        self.state == BakeState::Finalizing
    }

    /// Averages the accumulator into the final image and drops every buffer.
    pub fn finalize(&mut self) -> Result<CookieImage> {
        self.expect_state(&[BakeState::Finalizing], "finalize")?;

        let accumulator = self.accumulator.take().ok_or_else(|| {
            CookieBakerError::Job(format!("job {} has no accumulator", self.id))
        })?;
        self.release();
        self.state = BakeState::Complete;

        Ok(accumulator.finalize(self.sample_count))
    }

    /// Drops the job's buffers. No-op once the job is complete or already canceled.
    pub fn cancel(&mut self) {
        if !self.state.is_cancelable() {
            return;
        }
        self.release();
        self.state = BakeState::Canceled;
        log::info!(
            "Canceled bake {} after {}/{} samples",
            self.id,
            self.completed_samples,
            self.sample_count
        );
    }

    fn release(&mut self) {
        self.accumulator = None;
        self.scene = None;
        self.geometry = None;
    }

    fn expect_state(&self, allowed: &[BakeState], action: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(CookieBakerError::Job(format!(
                "cannot {} job {} in state {:?}",
                action, self.id, self.state
            )))
        }
    }
}

/// Uniform draw in `[0, 1)`; a draw of exactly 1.0 is redrawn.
fn unit_draw(rng: &mut impl Rng) -> f32 {
    loop {
        let value: f32 = rng.random();
        if value < 1.0 {
            return value;
        }
    }
}
