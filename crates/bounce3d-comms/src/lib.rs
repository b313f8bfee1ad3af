//! Communication primitives between the game, the controller and the audio thread.
//!
//! - Platform events (route change, interruption, media reset) flow into the
//!   controller over a crossbeam channel.
//! - Observer events flow back out to the game/UI layer the same way.
//! - Render commands reach the audio thread over a lock-free `rtrb` queue.
//! - The listener pose is published to the audio thread through a triple buffer,
//!   so UI updates never wait on the controller.

pub use rtrb;
pub use triple_buffer;

use bounce3d_core::{ListenerOrientation, Point3};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

/// Signals delivered by the host platform's audio session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformEvent {
    /// Output device or route changed (hot-swap, headphones, ...)
    ConfigChanged,
    /// Another client took the audio session
    InterruptionBegan,
    /// The audio session is ours again
    InterruptionEnded,
    /// The media services were reset; every node must be rebuilt
    MediaReset,
}

/// Notifications sent from the controller to the game/UI layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// Rendering stopped because of an interruption (voices already stopped)
    Interrupted,
    /// Rendering resumed after an interruption
    Restarted,
    /// The graph was rebuilt against a new output configuration
    ConfigurationChanged,
}

/// Where the listener is and which way it faces
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ListenerPose {
    pub position: Point3,
    pub orientation: ListenerOrientation,
}

/// Listener pose writer (controller side)
pub type ListenerInput = triple_buffer::Input<ListenerPose>;
/// Listener pose reader (audio thread)
pub type ListenerOutput = triple_buffer::Output<ListenerPose>;

/// Create a listener pose triple buffer seeded with `initial`
pub fn listener_channel(initial: ListenerPose) -> (ListenerInput, ListenerOutput) {
    triple_buffer::triple_buffer(&initial)
}

/// Command producer (controller -> audio thread)
pub type CommandSender<T> = rtrb::Producer<T>;
/// Command consumer (audio thread)
pub type CommandReceiver<T> = rtrb::Consumer<T>;

/// Create a bounded lock-free command queue
pub fn command_queue<T>(capacity: usize) -> (CommandSender<T>, CommandReceiver<T>) {
    rtrb::RingBuffer::new(capacity)
}

/// Create the platform-event channel (platform -> controller)
pub fn platform_events() -> (Sender<PlatformEvent>, Receiver<PlatformEvent>) {
    crossbeam_channel::unbounded()
}

/// Create the observer channel (controller -> game/UI)
pub fn engine_events() -> (Sender<EngineEvent>, Receiver<EngineEvent>) {
    crossbeam_channel::unbounded()
}

/// Create a linked notifier/announcement pair for one scheduled buffer
pub fn scheduled_signal() -> (ScheduleNotifier, Announcement) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    (ScheduleNotifier { tx }, Announcement { rx })
}

/// Audio-thread half of a scheduled signal.
///
/// `notify` never blocks: the channel has exactly one slot and is used once.
#[derive(Debug)]
pub struct ScheduleNotifier {
    tx: Sender<()>,
}

impl ScheduleNotifier {
    /// Mark the buffer as handed to the renderer
    pub fn notify(self) {
        // The waiter may already have given up; nothing to do then.
        let _ = self.tx.try_send(());
    }
}

/// Waiter half of a scheduled signal.
///
/// Resolves once the render thread has taken the buffer, not when playback
/// finishes. If the renderer is torn down before that, the announcement
/// resolves as not scheduled.
#[derive(Debug)]
pub struct Announcement {
    rx: Receiver<()>,
}

impl Announcement {
    /// Block until scheduled; `false` if the renderer dropped the request
    pub fn wait(&self) -> bool {
        self.rx.recv().is_ok()
    }

    /// Block up to `timeout`; `false` on timeout or if the request was dropped
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Non-blocking check
    pub fn is_scheduled(&self) -> bool {
        match self.rx.try_recv() {
            Ok(()) => true,
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_queue_creation() {
        let (mut tx, mut rx) = command_queue::<u32>(4);
        assert!(tx.push(7).is_ok());
        assert_eq!(rx.pop().ok(), Some(7));
    }

    #[test]
    fn test_scheduled_signal_resolves_after_notify() {
        let (notifier, announcement) = scheduled_signal();
        assert!(!announcement.wait_timeout(Duration::from_millis(1)));
        notifier.notify();
        assert!(announcement.wait_timeout(Duration::from_millis(100)));
    }

    #[test]
    fn test_scheduled_signal_dropped_notifier() {
        let (notifier, announcement) = scheduled_signal();
        drop(notifier);
        assert!(!announcement.wait());
    }

    #[test]
    fn test_listener_channel_publishes_latest() {
        let (mut input, mut output) = listener_channel(ListenerPose::default());
        input.write(ListenerPose {
            position: Point3::new(0.0, -2.0, 2.5),
            orientation: ListenerOrientation::new(10.0, 0.0, 0.0),
        });
        input.write(ListenerPose {
            position: Point3::new(1.0, 1.0, 1.0),
            orientation: ListenerOrientation::new(20.0, 0.0, 0.0),
        });
        let pose = *output.read();
        assert_eq!(pose.position, Point3::new(1.0, 1.0, 1.0));
        assert_eq!(pose.orientation.yaw, 20.0);
    }

    #[test]
    fn test_platform_event_channel() {
        let (tx, rx) = platform_events();
        tx.send(PlatformEvent::ConfigChanged).unwrap();
        assert_eq!(rx.recv().unwrap(), PlatformEvent::ConfigChanged);
    }
}
