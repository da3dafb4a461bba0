//! Log processing for maxlog
//!
//! This crate provides frame decoding, line annotation, focus filtering, and
//! concurrent fan-in of many log sources onto one output.

pub mod annotate;
mod decoder;
mod error;
mod filter;
mod source;
mod stream;

pub use annotate::{AnnotationRule, Annotator, CapStyle, LabelKind, Pattern, RULES, Symbol, annotate};
pub use decoder::{
    FrameDecoder, HEADER_LEN, LineDecoder, MAX_FRAME_LEN, RawLine, Record, SourceDecoder, decode,
    split_timestamp,
};
pub use error::StreamError;
pub use filter::FocusFilter;
pub use source::{BoxedReader, LogSource};
pub use stream::{FailurePolicy, FanIn, SourceOutcome, SourceStatus};

// Re-export types used in our public API
pub use maxlog_types::{Framing, LogOptions, StreamKind, TailLines};
