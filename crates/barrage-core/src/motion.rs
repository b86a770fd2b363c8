//! Kinematic move model shared by projectiles, enemies, and items.

use glam::Vec2;

/// Per-frame motion parameters. Updated once per frame, before the owner's
/// logic rule runs:
///
/// ```text
/// if attraction != 0:
///     velocity += attraction * (attraction_point - position)
/// velocity = velocity * retention + acceleration
/// position += velocity
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveParams {
    pub velocity: Vec2,
    pub acceleration: Vec2,
    /// Per-frame velocity multiplier. 1.0 keeps the velocity as-is.
    pub retention: f32,
    /// Steering coefficient toward `attraction_point`. 0 disables.
    pub attraction: f32,
    pub attraction_point: Vec2,
}

impl Default for MoveParams {
    fn default() -> Self {
        Self {
            velocity: Vec2::ZERO,
            acceleration: Vec2::ZERO,
            retention: 1.0,
            attraction: 0.0,
            attraction_point: Vec2::ZERO,
        }
    }
}

impl MoveParams {
    /// Constant velocity.
    pub fn linear(velocity: Vec2) -> Self {
        Self { velocity, ..Default::default() }
    }

    /// Constant acceleration.
    pub fn accelerated(velocity: Vec2, acceleration: Vec2) -> Self {
        Self { velocity, acceleration, ..Default::default() }
    }

    /// Velocity decaying by `retention` each frame toward the steady state
    /// `acceleration / (1 - retention)`.
    pub fn asymptotic(velocity: Vec2, acceleration: Vec2, retention: f32) -> Self {
        Self { velocity, acceleration, retention, ..Default::default() }
    }

    /// Homing toward a point with the given steering strength.
    pub fn towards(point: Vec2, attraction: f32) -> Self {
        Self {
            attraction,
            attraction_point: point,
            ..Default::default()
        }
    }

    pub fn with_retention(self, retention: f32) -> Self {
        Self { retention, ..self }
    }

    /// Advance `pos` by one frame. Returns the displacement applied, which
    /// callers use for motion-derived animation (facing left/right).
    pub fn update(&mut self, pos: &mut Vec2) -> Vec2 {
        if self.attraction != 0.0 {
            self.velocity += self.attraction * (self.attraction_point - *pos);
        }
        self.velocity = self.velocity * self.retention + self.acceleration;
        *pos += self.velocity;
        self.velocity
    }
}
