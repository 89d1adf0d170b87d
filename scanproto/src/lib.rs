#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
#![deny(unused_import_braces)]
#![deny(unused_qualifications)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

//! Wire protocol for a dual-laser galvanometer scan card: 19-byte position
//! frames, UDP broadcast transport with fixed pacing, and the cooperative
//! cancellation token polled between sends.

pub mod broadcast;
pub mod cancel;
pub mod frame;

pub use broadcast::{discover_broadcast, BroadcastSender, SendOutcome, DEFAULT_PACING, DEFAULT_PORT};
pub use cancel::CancelToken;
pub use frame::{Frame, FrameEncoder, GalvoPoint, FRAME_LEN, MAX_HEADER};
