//! Dispatch loop.
//!
//! Takes frames off the queue filled by the event channel, decodes them,
//! stores the value in the [`EndpointRegistry`] and hands it to the listener
//! registered for the event's short name. Frames are handled one at a time
//! in arrival order.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use wva_core::{EndpointRegistry, Event, VehicleResponse};
use wva_protocol::{try_decode_event, Frame};

use crate::listeners::ListenerRegistry;

/// What happened to one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Cached and handed to a listener.
    Delivered,
    /// Cached; nobody is listening on the short name.
    NoListener,
    /// The endpoint was never declared; dropped.
    UnknownEndpoint,
    /// The frame is not a well-formed event; dropped.
    Malformed,
}

/// Decode a frame and deliver the event it carries.
pub fn dispatch_frame(
    frame: &Frame,
    endpoints: &EndpointRegistry,
    listeners: &ListenerRegistry,
) -> Dispatched {
    match try_decode_event(frame) {
        Ok(event) => dispatch_event(&event, endpoints, listeners),
        Err(e) => {
            debug!("Dropping frame: {}", e);
            Dispatched::Malformed
        }
    }
}

/// Cache an event's value and notify its listener.
pub fn dispatch_event(
    event: &Event,
    endpoints: &EndpointRegistry,
    listeners: &ListenerRegistry,
) -> Dispatched {
    if !endpoints.update(&event.endpoint, event.response) {
        debug!("Dropping {} event for unknown endpoint {}", event.kind, event.endpoint);
        return Dispatched::UnknownEndpoint;
    }

    if notify(listeners, &event.short_name, &event.endpoint, &event.response) {
        Dispatched::Delivered
    } else {
        debug!("No listener for {}", event.short_name);
        Dispatched::NoListener
    }
}

/// Hand a value to the listener registered under `short_name`.
///
/// A panicking listener is logged and contained. Returns false when no
/// listener is registered.
pub(crate) fn notify(
    listeners: &ListenerRegistry,
    short_name: &str,
    endpoint: &str,
    response: &VehicleResponse,
) -> bool {
    let Some(listener) = listeners.get(short_name) else {
        return false;
    };

    let delivered = catch_unwind(AssertUnwindSafe(|| listener.on_update(endpoint, response)));
    if delivered.is_err() {
        error!("Listener for {} panicked", short_name);
    }
    true
}

/// Background task draining the frame queue.
#[derive(Debug)]
pub struct Dispatcher {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Start draining `frames`. Must be called inside a Tokio runtime.
    pub fn spawn(
        frames: mpsc::Receiver<Frame>,
        endpoints: Arc<EndpointRegistry>,
        listeners: Arc<ListenerRegistry>,
    ) -> Self {
        Self {
            task: Mutex::new(Some(tokio::spawn(run(frames, endpoints, listeners)))),
        }
    }

    /// Stop consuming. Frames still queued are abandoned.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.task.lock().as_ref().map_or(true, |t| t.is_finished())
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(
    mut frames: mpsc::Receiver<Frame>,
    endpoints: Arc<EndpointRegistry>,
    listeners: Arc<ListenerRegistry>,
) {
    while let Some(frame) = frames.recv().await {
        dispatch_frame(&frame, &endpoints, &listeners);
    }
    debug!("Frame queue closed, dispatcher exiting");
}
