//! Ball spawner.
//!
//! A single worker thread: announce, wait until the launch sound has been
//! handed to the renderer, launch a ball with its own voice, then wait the
//! spawn interval. The stop channel doubles as the interval timer, so
//! stopping never waits out a full interval.

use crate::scene::Scene;
use bounce3d_audio::{AudioGraphController, EngineError};
use bounce3d_core::{EntityHandle, Point3};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct SpawnerSettings {
    pub interval: Duration,
    pub launch_position: Point3,
    pub max_balls: usize,
    /// How long to wait for the launch sound to be scheduled
    pub announce_timeout: Duration,
    pub seed: u64,
}

pub struct Spawner {
    stop: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl Spawner {
    pub fn spawn(
        controller: Arc<AudioGraphController>,
        scene: Arc<Mutex<Scene>>,
        settings: SpawnerSettings,
    ) -> std::io::Result<Self> {
        let (stop, stop_rx) = crossbeam_channel::bounded(1);
        let thread = std::thread::Builder::new()
            .name("bounce3d-spawner".into())
            .spawn(move || run(&controller, &scene, settings, &stop_rx))?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Spawner thread panicked");
            }
        }
    }
}

impl Drop for Spawner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    controller: &AudioGraphController,
    scene: &Mutex<Scene>,
    settings: SpawnerSettings,
    stop: &Receiver<()>,
) {
    let mut rng = StdRng::seed_from_u64(settings.seed);
    let mut next_ball = 0_u64;
    tracing::debug!("Spawner started ({:?} interval)", settings.interval);

    loop {
        if controller.is_running() {
            match launch_one(controller, scene, &settings, &mut rng, next_ball) {
                Ok(true) => next_ball += 1,
                Ok(false) => {}
                Err(e) if e.is_fatal() => {
                    tracing::error!("Spawner stopping: {}", e);
                    return;
                }
                Err(e) => tracing::warn!("Launch failed: {}", e),
            }
        }

        match stop.recv_timeout(settings.interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::debug!("Spawner stopped after {} balls", next_ball);
}

/// One announce-then-launch cycle; `Ok(false)` if nothing was launched
fn launch_one(
    controller: &AudioGraphController,
    scene: &Mutex<Scene>,
    settings: &SpawnerSettings,
    rng: &mut StdRng,
    ball_index: u64,
) -> Result<bool, EngineError> {
    let Some(announcement) = controller.announce(settings.launch_position)? else {
        return Ok(false);
    };
    if !announcement.wait_timeout(settings.announce_timeout) {
        tracing::warn!("Launch sound was not scheduled; skipping launch");
        return Ok(false);
    }

    let entity = EntityHandle(ball_index);
    controller.create_voice(entity)?;

    let evicted = {
        let mut scene = scene.lock();
        scene.launch(entity, settings.launch_position, rng);
        scene.evict_beyond(settings.max_balls)
    };
    for ball in evicted {
        controller.destroy_voice(ball.entity)?;
    }

    tracing::debug!("Launched {}", entity);
    Ok(true)
}
