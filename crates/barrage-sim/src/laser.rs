//! Curve lasers: a position rule over time, a width envelope, and swept
//! collision against the player hitbox. Lasers damage the player only.

use barrage_core::color::Color;
use barrage_core::math::segment_distance;
use barrage_core::Frame;
use glam::Vec2;

use crate::entity::{DamageInfo, DamageKind, DrawLayer, EntityRef};
use crate::player;
use crate::render::SpriteCmd;
use crate::stage::Stage;

/// Position along the curve as a function of time (in frames since birth).
pub type LaserPosRule = Box<dyn Fn(f32) -> Vec2>;

pub struct Laser {
    pub ent: EntityRef,
    pub birthtime: Frame,
    /// Frames during which the head keeps advancing.
    pub lifetime: Frame,
    /// Length of the lit part of the curve, in time units.
    pub timespan: f32,
    pub width: f32,
    pub color: Color,
    pub unclearable: bool,
    pub rule: LaserPosRule,
}

impl Laser {
    pub fn age(&self, frame: Frame) -> Frame {
        frame - self.birthtime
    }

    /// Width multiplier: ramps in over the first 15% of the lifetime and
    /// back out over the last 15%.
    pub fn width_envelope(&self, age: Frame) -> f32 {
        let life = self.lifetime as f32;
        let t = (age as f32 / life).clamp(0.0, 1.0);
        let ramp = 0.15;
        if t < ramp {
            t / ramp
        } else if t > 1.0 - ramp {
            (1.0 - t) / ramp
        } else {
            1.0
        }
    }

    /// The currently lit parameter range of the curve.
    pub fn lit_range(&self, age: Frame) -> (f32, f32) {
        let head = (age as f32).min(self.lifetime as f32 + self.timespan);
        let tail = (head - self.timespan).max(0.0);
        (tail, head)
    }
}

pub fn create_laser(
    stage: &Stage,
    timespan: f32,
    lifetime: Frame,
    width: f32,
    color: Color,
    rule: LaserPosRule,
) -> EntityRef {
    debug_assert!(!stage.in_draw(), "laser spawned from draw code");
    let laser = Laser {
        ent: EntityRef::NULL,
        birthtime: stage.frame(),
        lifetime,
        timespan,
        width,
        color,
        unclearable: false,
        rule,
    };
    stage.world_mut().spawn_laser(laser)
}

fn laser_hits_player(laser: &Laser, age: Frame, player_pos: Vec2, player_radius: f32) -> bool {
    let envelope = laser.width_envelope(age);
    if envelope <= 0.0 {
        return false;
    }
    let hit_radius = laser.width * 0.5 * envelope * 0.75 + player_radius;
    let (tail, head) = laser.lit_range(age);

    let mut t = tail;
    let mut prev = (laser.rule)(t);
    while t < head {
        let next_t = (t + 1.0).min(head);
        let next = (laser.rule)(next_t);
        if segment_distance(player_pos, prev, next) < hit_radius {
            return true;
        }
        prev = next;
        t = next_t;
    }
    false
}

pub fn process_lasers(stage: &Stage) {
    let frame = stage.frame();
    let refs = stage.world_ref().laser_refs();
    let player_state = {
        let world = stage.world_ref();
        world.player().map(|p| (p.pos, p.hitbox_radius))
    };
    let mut hit = false;

    for r in refs {
        let expired = {
            let world = stage.world_ref();
            let laser = match world.laser(r) {
                Some(laser) => laser,
                None => continue,
            };
            let age = laser.age(frame);
            if let Some((player_pos, radius)) = player_state {
                if !hit && laser_hits_player(laser, age, player_pos, radius) {
                    hit = true;
                }
            }
            age as f32 > laser.lifetime as f32 + laser.timespan
        };

        if expired {
            stage.world_mut().despawn(r);
        }
    }

    if hit {
        player::damage_player(
            stage,
            DamageInfo { amount: 1.0, kind: DamageKind::EnemyShot },
        );
    }
}

/// Remove every clearable laser (part of "clear all hazards").
pub fn clear_lasers(stage: &Stage) {
    let refs = stage.world_ref().laser_refs();
    for r in refs {
        let clearable = stage
            .world_ref()
            .laser(r)
            .map_or(false, |laser| !laser.unclearable);
        if clearable {
            stage.world_mut().despawn(r);
        }
    }
}

/// Emit sprite commands along the lit part of the curve.
pub(crate) fn draw_laser(laser: &Laser, frame: Frame, out: &mut Vec<SpriteCmd>) {
    let age = laser.age(frame);
    let envelope = laser.width_envelope(age);
    if envelope <= 0.0 {
        return;
    }
    let (tail, head) = laser.lit_range(age);
    let scale = laser.width / 10.0 * envelope;

    let mut t = tail;
    while t < head {
        let pos = (laser.rule)(t);
        out.push(
            SpriteCmd::new(DrawLayer::Laser, "part/lasercurve", pos)
                .with_scale(Vec2::splat(scale))
                .with_color(laser.color),
        );
        t += 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::{self, ShotMode, PLR_START_LIVES};

    fn test_stage() -> Stage {
        let stage = Stage::new(5);
        player::create_player(&stage, ShotMode::default());
        stage
    }

    #[test]
    fn test_width_envelope_ramps_in_and_out() {
        let laser = Laser {
            ent: EntityRef::NULL,
            birthtime: 0,
            lifetime: 100,
            timespan: 10.0,
            width: 12.0,
            color: Color::default(),
            unclearable: false,
            rule: Box::new(|_t| Vec2::ZERO),
        };
        assert_eq!(laser.width_envelope(0), 0.0);
        assert!(laser.width_envelope(7) < 1.0);
        assert_eq!(laser.width_envelope(50), 1.0);
        assert!(laser.width_envelope(95) < 0.5);
    }

    #[test]
    fn test_laser_sweeps_into_player() {
        let stage = test_stage();
        // vertical line straight down the middle of the viewport
        create_laser(
            &stage,
            20.0,
            100,
            12.0,
            Color::default(),
            Box::new(|t| Vec2::new(crate::stage::VIEWPORT_W / 2.0, t * 10.0)),
        );
        for _ in 0..80 {
            stage.tick();
        }
        let world = stage.world_ref();
        let plr = world.player().unwrap();
        assert!(plr.deathtime.is_some() || plr.lives < PLR_START_LIVES);
    }

    #[test]
    fn test_expired_laser_is_removed() {
        let stage = test_stage();
        let r = create_laser(
            &stage,
            5.0,
            10,
            6.0,
            Color::default(),
            Box::new(|t| Vec2::new(30.0, t)),
        );
        for _ in 0..20 {
            stage.tick();
        }
        assert!(stage.world_ref().laser(r).is_none());
    }

    #[test]
    fn test_clear_respects_unclearable() {
        let stage = test_stage();
        let a = create_laser(&stage, 5.0, 600, 6.0, Color::default(), Box::new(|t| Vec2::new(30.0, t)));
        let b = create_laser(&stage, 5.0, 600, 6.0, Color::default(), Box::new(|t| Vec2::new(60.0, t)));
        stage.world_mut().laser_mut(b).unwrap().unclearable = true;
        clear_lasers(&stage);
        assert!(stage.world_ref().laser(a).is_none());
        assert!(stage.world_ref().laser(b).is_some());
    }
}
