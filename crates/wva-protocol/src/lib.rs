//! # wva-protocol
//!
//! Wire formats spoken by a WVA device.
//!
//! - [`codec`] splits the raw event channel stream into JSON frames
//! - [`event`] turns frames into typed subscription and alarm events
//! - [`messages`] holds the bodies of web service requests and responses

pub mod codec;
pub mod event;
pub mod messages;

pub use codec::{Frame, FrameExtractor, ParseOutcome};
pub use event::{decode_event, decode_vehicle_response, try_decode_event, DecodeError};
pub use messages::*;
