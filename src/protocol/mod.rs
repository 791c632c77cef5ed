//! Wire protocol: length-prefixed frames carrying JSON envelopes.

pub mod envelope;
pub mod frame;
pub mod messages;

pub use envelope::{DecodeFailure, Envelope, EnvelopeType, ErrorBody};
pub use frame::{read_frame, write_frame, FrameError, MAX_FRAME_LEN};
pub use messages::*;
