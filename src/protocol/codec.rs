//! Binary envelope codec.
//!
//! Layout: `tag: u8`, `payload_len: u32`, payload. Everything little-endian.
//! A `WorkloadRequest` payload is a fixed header, an offset table for its
//! three arrays, then the array region.

use super::message::{Bounds, Message, MessageTag, ObjectDatum, ProgressUpdate, WorkloadRequest};
use crate::math::{Mat4, Vec3};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::Cursor;
use thiserror::Error;

pub const ENVELOPE_HEADER_LEN: usize = 5;

const ID_PAYLOAD_LEN: usize = 4;
const PROGRESS_PAYLOAD_LEN: usize = 13;
const REQUEST_HEADER_LEN: usize = 68;
const OFFSET_TABLE_LEN: usize = 24;
const VEC3_LEN: usize = 12;
const INDEX_LEN: usize = 4;
const OBJECT_DATUM_LEN: usize = 100;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty datagram")]
    Empty,

    #[error("unknown message tag {0}")]
    UnknownTag(u8),

    #[error("datagram truncated")]
    Truncated,

    #[error("envelope declares {declared} payload bytes but carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("{field} region ({count} items at offset {offset}) exceeds payload")]
    RegionOutOfBounds {
        field: &'static str,
        offset: usize,
        count: usize,
    },
}

impl From<std::io::Error> for DecodeError {
    fn from(_: std::io::Error) -> Self {
        DecodeError::Truncated
    }
}

/// Exact encoded size of `message`, envelope included.
pub fn encoded_len(message: &Message) -> usize {
    ENVELOPE_HEADER_LEN + payload_len(message)
}

fn payload_len(message: &Message) -> usize {
    match message {
        Message::UpAndRunning | Message::ShutdownMessage => 0,
        Message::WorkloadReceived { .. }
        | Message::CancelWorkload { .. }
        | Message::WorkloadComplete { .. } => ID_PAYLOAD_LEN,
        Message::ProgressUpdate(_) => PROGRESS_PAYLOAD_LEN,
        Message::WorkloadRequest(request) => {
            REQUEST_HEADER_LEN
                + OFFSET_TABLE_LEN
                + request.vertices.len() * VEC3_LEN
                + request.indices.len() * INDEX_LEN
                + request.object_data.len() * OBJECT_DATUM_LEN
        }
    }
}

/// Fixed-size writer over a buffer sized by `encoded_len`.
struct Writer {
    buf: Vec<u8>,
    pos: usize,
}

impl Writer {
    fn with_len(len: usize) -> Self {
        Self {
            buf: vec![0; len],
            pos: 0,
        }
    }

    fn u8(&mut self, value: u8) {
        self.buf[self.pos] = value;
        self.pos += 1;
    }

    fn u32(&mut self, value: u32) {
        LittleEndian::write_u32(&mut self.buf[self.pos..self.pos + 4], value);
        self.pos += 4;
    }

    fn i32(&mut self, value: i32) {
        LittleEndian::write_i32(&mut self.buf[self.pos..self.pos + 4], value);
        self.pos += 4;
    }

    fn f32(&mut self, value: f32) {
        LittleEndian::write_f32(&mut self.buf[self.pos..self.pos + 4], value);
        self.pos += 4;
    }

    fn vec3(&mut self, value: Vec3) {
        self.f32(value.x);
        self.f32(value.y);
        self.f32(value.z);
    }

    /// Row-major, matching the host's matrix layout.
    fn mat4(&mut self, value: &Mat4) {
        for row in 0..4 {
            let row = value.row(row);
            self.f32(row.x);
            self.f32(row.y);
            self.f32(row.z);
            self.f32(row.w);
        }
    }
}

pub fn encode(message: &Message) -> Vec<u8> {
    let payload = payload_len(message);
    let mut w = Writer::with_len(ENVELOPE_HEADER_LEN + payload);

    w.u8(message.tag() as u8);
    w.u32(payload as u32);

    match message {
        Message::UpAndRunning | Message::ShutdownMessage => {}
        Message::WorkloadReceived { workload_id }
        | Message::CancelWorkload { workload_id }
        | Message::WorkloadComplete { workload_id } => w.i32(*workload_id),
        Message::ProgressUpdate(update) => {
            w.i32(update.workload_id);
            w.i32(update.completed_samples);
            w.i32(update.total_samples);
            w.u8(update.currently_running as u8);
        }
        Message::WorkloadRequest(request) => encode_request(&mut w, request),
    }

    debug_assert_eq!(w.pos, w.buf.len());
    w.buf
}

fn encode_request(w: &mut Writer, request: &WorkloadRequest) {
    w.i32(request.workload_id);
    w.i32(request.sample_count);
    w.f32(request.min_range);
    w.f32(request.max_range);
    w.f32(request.shadow_focus_plane);
    w.i32(request.resolution);
    w.i32(request.bounce_count);
    w.vec3(request.light_position);
    w.vec3(request.light_forward);
    w.vec3(request.light_upward);
    w.f32(request.light_theta_rad);

    let vertices_offset = REQUEST_HEADER_LEN + OFFSET_TABLE_LEN;
    let indices_offset = vertices_offset + request.vertices.len() * VEC3_LEN;
    let objects_offset = indices_offset + request.indices.len() * INDEX_LEN;

    w.u32(vertices_offset as u32);
    w.u32(request.vertices.len() as u32);
    w.u32(indices_offset as u32);
    w.u32(request.indices.len() as u32);
    w.u32(objects_offset as u32);
    w.u32(request.object_data.len() as u32);

    for vertex in &request.vertices {
        w.vec3(*vertex);
    }
    for index in &request.indices {
        w.i32(*index);
    }
    for datum in &request.object_data {
        w.mat4(&datum.local_to_world);
        w.i32(datum.indices_offset);
        w.i32(datum.indices_count);
        w.i32(datum.vertices_offset);
        w.vec3(datum.bounds.center);
        w.vec3(datum.bounds.extent);
    }
}

pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
    let (&tag, rest) = bytes.split_first().ok_or(DecodeError::Empty)?;
    let tag = MessageTag::from_u8(tag).ok_or(DecodeError::UnknownTag(tag))?;

    let mut header = Cursor::new(rest);
    let declared = header.read_u32::<LittleEndian>()? as usize;
    let payload = &rest[4..];
    if payload.len() != declared {
        return Err(DecodeError::LengthMismatch {
            declared,
            actual: payload.len(),
        });
    }

    let mut r = Cursor::new(payload);
    let message = match tag {
        MessageTag::UpAndRunning => Message::UpAndRunning,
        MessageTag::ShutdownMessage => Message::ShutdownMessage,
        MessageTag::WorkloadReceived => Message::WorkloadReceived {
            workload_id: r.read_i32::<LittleEndian>()?,
        },
        MessageTag::CancelWorkload => Message::CancelWorkload {
            workload_id: r.read_i32::<LittleEndian>()?,
        },
        MessageTag::WorkloadComplete => Message::WorkloadComplete {
            workload_id: r.read_i32::<LittleEndian>()?,
        },
        MessageTag::ProgressUpdate => Message::ProgressUpdate(ProgressUpdate {
            workload_id: r.read_i32::<LittleEndian>()?,
            completed_samples: r.read_i32::<LittleEndian>()?,
            total_samples: r.read_i32::<LittleEndian>()?,
            currently_running: r.read_u8()? != 0,
        }),
        MessageTag::WorkloadRequest => Message::WorkloadRequest(decode_request(payload)?),
    };

    Ok(message)
}

fn read_vec3(r: &mut Cursor<&[u8]>) -> Result<Vec3, DecodeError> {
    Ok(Vec3::new(
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
    ))
}

fn read_mat4(r: &mut Cursor<&[u8]>) -> Result<Mat4, DecodeError> {
    let mut rows = [0.0f32; 16];
    for value in rows.iter_mut() {
        *value = r.read_f32::<LittleEndian>()?;
    }
    Ok(Mat4::from_cols_array(&rows).transpose())
}

/// Positions `r` at an array region after checking it fits in the payload.
fn seek_region(
    r: &mut Cursor<&[u8]>,
    field: &'static str,
    offset: u32,
    count: u32,
    stride: usize,
) -> Result<usize, DecodeError> {
    let (offset, count) = (offset as usize, count as usize);
    let end = count
        .checked_mul(stride)
        .and_then(|len| len.checked_add(offset));
    match end {
        Some(end) if end <= r.get_ref().len() => {
            r.set_position(offset as u64);
            Ok(count)
        }
        _ => Err(DecodeError::RegionOutOfBounds {
            field,
            offset,
            count,
        }),
    }
}

fn decode_request(payload: &[u8]) -> Result<WorkloadRequest, DecodeError> {
    let mut r = Cursor::new(payload);

    let mut request = WorkloadRequest {
        workload_id: r.read_i32::<LittleEndian>()?,
        sample_count: r.read_i32::<LittleEndian>()?,
        min_range: r.read_f32::<LittleEndian>()?,
        max_range: r.read_f32::<LittleEndian>()?,
        shadow_focus_plane: r.read_f32::<LittleEndian>()?,
        resolution: r.read_i32::<LittleEndian>()?,
        bounce_count: r.read_i32::<LittleEndian>()?,
        light_position: read_vec3(&mut r)?,
        light_forward: read_vec3(&mut r)?,
        light_upward: read_vec3(&mut r)?,
        light_theta_rad: r.read_f32::<LittleEndian>()?,
        ..WorkloadRequest::default()
    };

    let mut table = [0u32; 6];
    for entry in table.iter_mut() {
        *entry = r.read_u32::<LittleEndian>()?;
    }
    let [vertices_at, vertices_len, indices_at, indices_len, objects_at, objects_len] = table;

    let count = seek_region(&mut r, "vertices", vertices_at, vertices_len, VEC3_LEN)?;
    request.vertices.reserve_exact(count);
    for _ in 0..count {
        request.vertices.push(read_vec3(&mut r)?);
    }

    let count = seek_region(&mut r, "indices", indices_at, indices_len, INDEX_LEN)?;
    request.indices.reserve_exact(count);
    for _ in 0..count {
        request.indices.push(r.read_i32::<LittleEndian>()?);
    }

    let count = seek_region(&mut r, "object_data", objects_at, objects_len, OBJECT_DATUM_LEN)?;
    request.object_data.reserve_exact(count);
    for _ in 0..count {
        request.object_data.push(ObjectDatum {
            local_to_world: read_mat4(&mut r)?,
            indices_offset: r.read_i32::<LittleEndian>()?,
            indices_count: r.read_i32::<LittleEndian>()?,
            vertices_offset: r.read_i32::<LittleEndian>()?,
            bounds: Bounds {
                center: read_vec3(&mut r)?,
                extent: read_vec3(&mut r)?,
            },
        });
    }

    Ok(request)
}
