//! Core library for receiving VMC motion-capture streams.
//!
//! A performer application broadcasts bone transforms and blend-shape
//! weights as many small OSC messages per frame. [`VmcReceiver`] listens for
//! them, assembles a working [`Frame`] on the listener thread and publishes
//! a complete copy whenever the sender marks the end of a frame. Consumers on
//! any schedule read the latest published frame with
//! [`VmcReceiver::copy_out`] or through a [`FrameHandle`].

pub mod assembler;
pub mod config;
pub mod error;
pub mod frame;
pub mod message;
pub mod osc;
pub mod receiver;
pub mod store;
pub mod transport;

pub use assembler::FrameAssembler;
pub use config::{debug_enabled, set_debug_enabled, ReceiverConfig, DEFAULT_VMC_PORT};
pub use error::{CaptureError, Result};
pub use frame::{BoneSample, CurveSample, Frame};
pub use message::{Payload, VmcAddress};
pub use osc::{OscCodecError, OscMessage};
pub use receiver::{FrameHandle, VmcReceiver};
pub use store::{Diagnostics, DiagnosticsDelta, FrameStore, PublishReport};
pub use transport::{MessageHandler, OscListener, OscTransport, UdpListener, UdpTransport};
