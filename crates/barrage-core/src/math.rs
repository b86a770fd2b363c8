//! 2D math helpers on top of glam.
//!
//! Positions and velocities are `Vec2` treated as complex numbers: the x
//! axis is the real part, the y axis the imaginary part (y grows downward,
//! toward the bottom of the viewport). `Vec2::from_angle` is `e^{iθ}` and
//! `Vec2::rotate` is complex multiplication, so rotations compose the same
//! way they would with a dedicated complex type.

use glam::Vec2;

/// Unit vector pointing at `angle` radians. Complex `e^{iθ}`.
pub fn cdir(angle: f32) -> Vec2 {
    Vec2::from_angle(angle)
}

/// Argument (angle) of a vector, in radians. Complex `arg(z)`.
pub fn carg(v: Vec2) -> f32 {
    v.y.atan2(v.x)
}

/// Move `current` toward `target` by at most `step`, without overshooting.
pub fn approach(current: f32, target: f32, step: f32) -> f32 {
    if current < target {
        (current + step).min(target)
    } else {
        (current - step).max(target)
    }
}

/// Linear interpolation between `a` and `b`.
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Shortest distance from point `p` to the segment `a`..`b`.
pub fn segment_distance(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= f32::EPSILON {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cdir_carg_roundtrip() {
        let v = cdir(1.2);
        assert!((carg(v) - 1.2).abs() < 1e-6);
        assert!((v.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rotation_composes_as_multiplication() {
        let a = cdir(0.4);
        let b = cdir(0.9);
        let composed = a.rotate(b);
        assert!((carg(composed) - 1.3).abs() < 1e-5);
    }

    #[test]
    fn test_approach_does_not_overshoot() {
        assert_eq!(approach(0.0, 1.0, 0.4), 0.4);
        assert_eq!(approach(0.9, 1.0, 0.4), 1.0);
        assert_eq!(approach(1.0, 0.0, 0.3), 0.7);
        assert_eq!(approach(0.5, 0.5, 0.1), 0.5);
    }

    #[test]
    fn test_segment_distance() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, 0.0);
        assert!((segment_distance(Vec2::new(5.0, 3.0), a, b) - 3.0).abs() < 1e-6);
        // beyond the endpoint, distance is to the endpoint itself
        assert!((segment_distance(Vec2::new(14.0, 0.0), a, b) - 4.0).abs() < 1e-6);
    }
}
