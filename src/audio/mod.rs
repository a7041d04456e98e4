pub mod backend;
pub mod cpal_backend;
pub mod encoder;

pub use backend::{AudioBackend, AudioFrame};
pub use cpal_backend::CpalBackend;
pub use encoder::{EncodedSegment, SegmentEncoder};
