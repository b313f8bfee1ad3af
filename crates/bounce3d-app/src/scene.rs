//! Toy bouncing-ball world.
//!
//! Stands in for a physics engine: balls fly around inside an axis-aligned
//! cube and every wall hit is reported as a collision with an impulse.
//! Ball-to-ball contacts are not simulated.

use bounce3d_core::{EntityHandle, Point3};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// World parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Distance from the cube's centre to each wall
    pub half_extent: f32,
    pub ball_radius: f32,
    /// Acceleration along Y (m/s²)
    pub gravity: f32,
    /// Fraction of normal velocity kept after a wall hit
    pub restitution: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            half_extent: 3.0,
            ball_radius: 0.2,
            gravity: -9.8,
            restitution: 0.9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ball {
    pub entity: EntityHandle,
    pub position: Point3,
    pub velocity: Point3,
}

/// A wall hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collision {
    pub entity: EntityHandle,
    /// Point on the wall where the ball touched
    pub point: Point3,
    /// Change in momentum (unit mass)
    pub impulse: f32,
}

#[derive(Debug)]
pub struct Scene {
    config: SceneConfig,
    /// Oldest first
    balls: VecDeque<Ball>,
}

impl Scene {
    pub fn new(config: SceneConfig) -> Self {
        Self {
            config,
            balls: VecDeque::new(),
        }
    }

    /// Add a ball with an explicit velocity
    pub fn spawn(&mut self, entity: EntityHandle, position: Point3, velocity: Point3) {
        self.balls.push_back(Ball {
            entity,
            position,
            velocity,
        });
    }

    /// Add a ball at `position` thrown towards the far wall, biased left or right
    pub fn launch<R: Rng>(&mut self, entity: EntityHandle, position: Point3, rng: &mut R) {
        let x: f32 = if rng.gen_bool(0.5) {
            rng.gen_range(3.0..8.0)
        } else {
            rng.gen_range(-8.0..-3.0)
        };
        let y: f32 = rng.gen_range(0.0..5.0);
        let z: f32 = rng.gen_range(5.0..15.0);
        let velocity = Point3::new(x, y, -z);
        self.spawn(entity, position, velocity);
    }

    /// Remove the oldest balls until at most `max` remain
    pub fn evict_beyond(&mut self, max: usize) -> Vec<Ball> {
        let excess = self.balls.len().saturating_sub(max);
        self.balls.drain(..excess).collect()
    }

    pub fn balls(&self) -> impl Iterator<Item = &Ball> {
        self.balls.iter()
    }

    pub fn len(&self) -> usize {
        self.balls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balls.is_empty()
    }

    /// Advance by `dt` seconds, appending wall hits to `collisions`
    pub fn step(&mut self, dt: f32, collisions: &mut Vec<Collision>) {
        let limit = self.config.half_extent - self.config.ball_radius;
        let wall = self.config.half_extent;
        let restitution = self.config.restitution;

        for ball in &mut self.balls {
            ball.velocity.y += self.config.gravity * dt;
            ball.position = ball.position + ball.velocity * dt;

            let axes = [
                (&mut ball.position.x, &mut ball.velocity.x, 0),
                (&mut ball.position.y, &mut ball.velocity.y, 1),
                (&mut ball.position.z, &mut ball.velocity.z, 2),
            ];
            let mut hits: [Option<(usize, f32, f32)>; 3] = [None; 3];
            for (slot, (position, velocity, axis)) in hits.iter_mut().zip(axes) {
                let side = if *position > limit && *velocity > 0.0 {
                    1.0
                } else if *position < -limit && *velocity < 0.0 {
                    -1.0
                } else {
                    continue;
                };
                *position = side * limit;
                let impulse = velocity.abs() * (1.0 + restitution);
                *velocity = -*velocity * restitution;
                *slot = Some((axis, side * wall, impulse));
            }

            for (axis, wall_coordinate, impulse) in hits.into_iter().flatten() {
                let mut point = ball.position;
                match axis {
                    0 => point.x = wall_coordinate,
                    1 => point.y = wall_coordinate,
                    _ => point.z = wall_coordinate,
                }
                collisions.push(Collision {
                    entity: ball.entity,
                    point,
                    impulse,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn weightless() -> Scene {
        Scene::new(SceneConfig {
            gravity: 0.0,
            ..SceneConfig::default()
        })
    }

    #[test]
    fn test_wall_hit_reports_impulse_and_reflects() {
        let mut scene = weightless();
        scene.spawn(EntityHandle(1), Point3::new(2.7, 0.0, 0.0), Point3::new(10.0, 0.0, 0.0));

        let mut collisions = Vec::new();
        scene.step(0.02, &mut collisions);

        assert_eq!(collisions.len(), 1);
        let hit = collisions[0];
        assert_eq!(hit.entity, EntityHandle(1));
        assert_eq!(hit.point.x, 3.0);
        assert!((hit.impulse - 19.0).abs() < 1e-4);

        let ball = scene.balls().next().unwrap();
        assert!((ball.velocity.x + 9.0).abs() < 1e-4);
        assert!(ball.position.x <= 2.8);
    }

    #[test]
    fn test_free_flight_has_no_collisions() {
        let mut scene = weightless();
        scene.spawn(EntityHandle(1), Point3::ORIGIN, Point3::new(1.0, 1.0, 1.0));
        let mut collisions = Vec::new();
        scene.step(0.1, &mut collisions);
        assert!(collisions.is_empty());
    }

    #[test]
    fn test_balls_stay_inside_cube() {
        let mut scene = Scene::new(SceneConfig::default());
        let mut rng = StdRng::seed_from_u64(7);
        for i in 0..5 {
            scene.launch(EntityHandle(i), Point3::new(0.0, -2.0, 2.5), &mut rng);
        }

        let mut collisions = Vec::new();
        for _ in 0..2000 {
            scene.step(1.0 / 120.0, &mut collisions);
        }
        assert!(!collisions.is_empty());
        for ball in scene.balls() {
            for coordinate in [ball.position.x, ball.position.y, ball.position.z] {
                assert!(coordinate.abs() <= 2.8 + 1e-4);
            }
        }
    }

    #[test]
    fn test_launch_direction() {
        let mut scene = Scene::new(SceneConfig::default());
        let mut rng = StdRng::seed_from_u64(1);
        for i in 0..50 {
            scene.launch(EntityHandle(i), Point3::ORIGIN, &mut rng);
        }
        for ball in scene.balls() {
            assert!((3.0..8.0).contains(&ball.velocity.x.abs()));
            assert!((0.0..5.0).contains(&ball.velocity.y));
            assert!((-15.0..=-5.0).contains(&ball.velocity.z));
        }
    }

    #[test]
    fn test_evict_oldest() {
        let mut scene = weightless();
        for i in 0..5 {
            scene.spawn(EntityHandle(i), Point3::ORIGIN, Point3::ORIGIN);
        }
        let evicted: Vec<u64> = scene.evict_beyond(3).iter().map(|b| b.entity.0).collect();
        assert_eq!(evicted, vec![0, 1]);
        assert_eq!(scene.len(), 3);
        assert!(scene.evict_beyond(3).is_empty());
    }
}
