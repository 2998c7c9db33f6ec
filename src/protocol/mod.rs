//! Wire protocol spoken between the host and the worker.

pub mod codec;
pub mod message;

pub use codec::{DecodeError, ENVELOPE_HEADER_LEN, decode, encode, encoded_len};
pub use message::{
    Bounds, Message, MessageTag, ObjectDatum, ProgressUpdate, WorkloadId, WorkloadRequest,
};
