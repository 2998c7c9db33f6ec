use crate::math::{Mat4, Vec3};

/// Host-assigned job identifier. Opaque to the worker apart from equality.
pub type WorkloadId = i32;

/// Wire discriminator of every message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageTag {
    UpAndRunning = 1,
    WorkloadRequest = 2,
    WorkloadReceived = 3,
    ProgressUpdate = 4,
    CancelWorkload = 5,
    WorkloadComplete = 6,
    ShutdownMessage = 7,
}

impl MessageTag {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::UpAndRunning),
            2 => Some(Self::WorkloadRequest),
            3 => Some(Self::WorkloadReceived),
            4 => Some(Self::ProgressUpdate),
            5 => Some(Self::CancelWorkload),
            6 => Some(Self::WorkloadComplete),
            7 => Some(Self::ShutdownMessage),
            _ => None,
        }
    }

    /// Whether the worker accepts this kind from the host.
    pub fn is_inbound(self) -> bool {
        matches!(
            self,
            Self::WorkloadRequest | Self::CancelWorkload | Self::ShutdownMessage
        )
    }
}

/// Axis-aligned bounds as sent by the host: center plus half-extents.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub center: Vec3,
    pub extent: Vec3,
}

/// Per-object record into the shared vertex and index pools.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectDatum {
    pub local_to_world: Mat4,
    pub indices_offset: i32,
    pub indices_count: i32,
    pub vertices_offset: i32,
    pub bounds: Bounds,
}

impl Default for ObjectDatum {
    fn default() -> Self {
        Self {
            local_to_world: Mat4::IDENTITY,
            indices_offset: 0,
            indices_count: 0,
            vertices_offset: 0,
            bounds: Bounds::default(),
        }
    }
}

/// Everything needed to bake one cookie.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkloadRequest {
    pub workload_id: WorkloadId,
    pub sample_count: i32,
    pub min_range: f32,
    pub max_range: f32,
    pub shadow_focus_plane: f32,
    pub resolution: i32,
    pub bounce_count: i32,
    pub light_position: Vec3,
    pub light_forward: Vec3,
    pub light_upward: Vec3,
    pub light_theta_rad: f32,
    pub vertices: Vec<Vec3>,
    pub indices: Vec<i32>,
    pub object_data: Vec<ObjectDatum>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub workload_id: WorkloadId,
    pub completed_samples: i32,
    pub total_samples: i32,
    pub currently_running: bool,
}

/// One envelope on the wire; exactly one payload per message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    UpAndRunning,
    WorkloadRequest(WorkloadRequest),
    WorkloadReceived { workload_id: WorkloadId },
    ProgressUpdate(ProgressUpdate),
    CancelWorkload { workload_id: WorkloadId },
    WorkloadComplete { workload_id: WorkloadId },
    ShutdownMessage,
}

impl Message {
    pub fn tag(&self) -> MessageTag {
        match self {
            Self::UpAndRunning => MessageTag::UpAndRunning,
            Self::WorkloadRequest(_) => MessageTag::WorkloadRequest,
            Self::WorkloadReceived { .. } => MessageTag::WorkloadReceived,
            Self::ProgressUpdate(_) => MessageTag::ProgressUpdate,
            Self::CancelWorkload { .. } => MessageTag::CancelWorkload,
            Self::WorkloadComplete { .. } => MessageTag::WorkloadComplete,
            Self::ShutdownMessage => MessageTag::ShutdownMessage,
        }
    }

    pub fn workload_id(&self) -> Option<WorkloadId> {
        match self {
            Self::WorkloadRequest(request) => Some(request.workload_id),
            Self::ProgressUpdate(update) => Some(update.workload_id),
            Self::WorkloadReceived { workload_id }
            | Self::CancelWorkload { workload_id }
            | Self::WorkloadComplete { workload_id } => Some(*workload_id),
            Self::UpAndRunning | Self::ShutdownMessage => None,
        }
    }
}
