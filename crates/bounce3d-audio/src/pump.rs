//! Platform event pump.
//!
//! Platform notifications can arrive on any thread. They are funnelled into
//! one channel and applied to the controller, one at a time, by this thread.

use crate::controller::AudioGraphController;
use crate::error::{EngineError, Result};
use bounce3d_comms::PlatformEvent;
use crossbeam_channel::{Receiver, Sender, select};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Background thread feeding platform events into the controller
pub struct EventPump {
    stop: Sender<()>,
    thread: Option<JoinHandle<Result<()>>>,
}

impl EventPump {
    /// Start draining `events` into `controller`.
    ///
    /// The pump exits when asked to, when every event sender is gone, or on
    /// the first fatal error.
    pub fn spawn(
        controller: Arc<AudioGraphController>,
        events: Receiver<PlatformEvent>,
    ) -> std::io::Result<Self> {
        let (stop, stop_rx) = crossbeam_channel::bounded(1);
        let thread = std::thread::Builder::new()
            .name("bounce3d-events".into())
            .spawn(move || run(&controller, &events, &stop_rx))?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// True once the pump thread has exited on its own
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the pump and return the fatal error that ended it, if any
    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let _ = self.stop.try_send(());
        match self.thread.take() {
            Some(thread) => thread.join().unwrap_or_else(|_| {
                Err(EngineError::DeviceUnavailable("event pump panicked".into()))
            }),
            None => Ok(()),
        }
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!("Event pump stopped with error: {}", e);
        }
    }
}

fn run(
    controller: &AudioGraphController,
    events: &Receiver<PlatformEvent>,
    stop: &Receiver<()>,
) -> Result<()> {
    tracing::debug!("Event pump started");
    loop {
        select! {
            recv(events) -> event => {
                let Ok(event) = event else {
                    tracing::debug!("Platform event channel closed");
                    return Ok(());
                };
                match controller.handle_event(event) {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => {
                        tracing::error!("Fatal error handling {:?}: {}", event, e);
                        return Err(e);
                    }
                    Err(e) => tracing::warn!("Error handling {:?}: {}", event, e),
                }
            }
            recv(stop) -> _ => {
                tracing::debug!("Event pump stopping");
                return Ok(());
            }
        }
    }
}
