#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
#![deny(unused_import_braces)]
#![deny(unused_qualifications)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

//! This crate implements streaming of sliced G-code to a dual-laser
//! galvanometer scan card over UDP broadcast.
//!
//! A job walks one pipeline: extract per-layer strokes from the G-code,
//! densify them to a fixed resolution, persist per-layer artifacts, map
//! the points into the card's 16-bit coordinate space, encode them into
//! fixed 19-byte frames and broadcast them layer by layer with paced
//! sends, optional operator confirmation and cooperative cancellation.

pub mod artifact;
pub mod config;
mod error;
pub mod galvo;
pub mod gcode;
mod geometry;
pub mod job;
pub mod resample;
mod sink;

pub use config::Config;
pub use error::JobError;
pub use geometry::{LayerId, LayerMap, Point2D};
pub use job::{Job, JobEvent, JobHandle, JobOutcome, JobState, StreamService};
pub use sink::FrameSink;

pub use scanproto::{
    discover_broadcast, BroadcastSender, CancelToken, Frame, FrameEncoder, GalvoPoint, SendOutcome,
};
