//! Pooled projectiles: enemy bullets, player shots, particles.

use barrage_core::color::Color;
use barrage_core::math::carg;
use barrage_core::motion::MoveParams;
use barrage_core::Frame;
use glam::Vec2;

use crate::entity::{Action, DamageInfo, DamageKind, DamageResult, DrawLayer, EntityRef};
use crate::item::{self, ItemKind};
use crate::player;
use crate::render::SpriteCmd;
use crate::stage::{Stage, VIEWPORT_H, VIEWPORT_W};
use crate::{boss, enemy};

/// At most this many dead-marked projectiles are swept per frame pass into
/// clear effects and destroyed. The rest stay inert (no collision) until a
/// later pass, spreading the cost of a mass clear over several frames.
const CLEAR_BUDGET: u32 = 5;

/// Default off-viewport margin for particles and player shots.
const DEFAULT_VIEWPORT_DIST: f32 = 300.0;

/// Sprite plus collision extents. The handful of stock prototypes lives in
/// [`protos`]; stages define their own the same way.
#[derive(Debug, Clone, Copy)]
pub struct ProjProto {
    pub sprite: &'static str,
    pub size: Vec2,
}

impl ProjProto {
    pub const fn new(sprite: &'static str, w: f32, h: f32) -> Self {
        Self { sprite, size: Vec2::new(w, h) }
    }
}

pub mod protos {
    use super::ProjProto;

    pub const BALL: ProjProto = ProjProto::new("proj/ball", 16.0, 16.0);
    pub const BIGBALL: ProjProto = ProjProto::new("proj/bigball", 32.0, 32.0);
    pub const BULLET: ProjProto = ProjProto::new("proj/bullet", 10.0, 14.0);
    pub const CARD: ProjProto = ProjProto::new("proj/card", 12.0, 16.0);
    pub const CRYSTAL: ProjProto = ProjProto::new("proj/crystal", 12.0, 18.0);
    pub const RICE: ProjProto = ProjProto::new("proj/rice", 6.0, 12.0);
    pub const WAVE: ProjProto = ProjProto::new("proj/wave", 20.0, 12.0);
    pub const FLARE: ProjProto = ProjProto::new("part/flare", 12.0, 12.0);
    pub const BLAST: ProjProto = ProjProto::new("part/blast", 64.0, 64.0);
    pub const SMOKE: ProjProto = ProjProto::new("part/smoke", 24.0, 24.0);
    pub const STAIN: ProjProto = ProjProto::new("part/stain", 20.0, 20.0);
}

/// Collision classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjKind {
    /// Fired by enemies; hurts and grazes the player, clearable.
    EnemyShot,
    /// Fired by the player; carries its damage.
    PlayerShot { damage: f32 },
    /// Visual only, never collides.
    Particle,
    /// Marked for clearing; swept into clear effects by the frame budget.
    Dead,
    /// Looks like a bullet, clearable, but never deals damage.
    Fake,
}

impl ProjKind {
    fn is_particle(&self) -> bool {
        matches!(self, ProjKind::Particle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProjFlags(pub u16);

impl ProjFlags {
    pub const NO_COLLISION: ProjFlags = ProjFlags(1 << 0);
    pub const NO_GRAZE: ProjFlags = ProjFlags(1 << 1);
    pub const NO_REFLECT: ProjFlags = ProjFlags(1 << 2);
    pub const NO_SPAWN_EFFECT: ProjFlags = ProjFlags(1 << 3);
    pub const NO_CLEAR_EFFECT: ProjFlags = ProjFlags(1 << 4);
    pub const NO_DEATH_EFFECT: ProjFlags = ProjFlags(1 << 5);
    pub const NO_CLEAR_BONUS: ProjFlags = ProjFlags(1 << 6);
    pub const NO_CLEAR: ProjFlags = ProjFlags(1 << 7);
    pub const REQUIRED_PARTICLE: ProjFlags = ProjFlags(1 << 8);
    pub const MANUAL_ANGLE: ProjFlags = ProjFlags(1 << 9);
    pub const GRAZE_SPAM: ProjFlags = ProjFlags(1 << 10);

    pub fn contains(self, other: ProjFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ProjFlags {
    type Output = ProjFlags;
    fn bitor(self, rhs: ProjFlags) -> ProjFlags {
        ProjFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ProjFlags {
    fn bitor_assign(&mut self, rhs: ProjFlags) {
        self.0 |= rhs.0;
    }
}

/// Per-frame behavior hook. Runs after the move model, with the projectile's
/// age; may mutate the projectile, spawn entities, and request destruction.
pub type ProjRule = Box<dyn FnMut(&mut Projectile, Frame, &Stage) -> Action>;

/// Custom draw hook. `None` means the stock sprite draw.
pub type ProjDrawRule = Box<dyn Fn(&Projectile, Frame) -> Option<SpriteCmd>>;

pub struct Projectile {
    pub ent: EntityRef,
    pub proto: ProjProto,
    pub pos: Vec2,
    /// Position at the start of this frame, for swept collision.
    pub prev_pos: Vec2,
    pub origin: Vec2,
    pub birthtime: Frame,
    pub angle: f32,
    pub color: Color,
    pub kind: ProjKind,
    pub flags: ProjFlags,
    pub movement: MoveParams,
    pub rule: Option<ProjRule>,
    pub draw_rule: Option<ProjDrawRule>,
    pub shader: Option<&'static str>,
    pub max_viewport_dist: f32,
    /// Destroyed when age reaches this, if positive.
    pub timeout: Frame,
    pub layer: DrawLayer,
    pub grazed: bool,
}

impl Projectile {
    pub fn age(&self, frame: Frame) -> Frame {
        frame - self.birthtime
    }
}

/// Spawn parameters, with the same defaults the stock bullet table uses.
pub struct ProjArgs {
    pub proto: ProjProto,
    pub pos: Vec2,
    pub color: Color,
    pub movement: MoveParams,
    pub kind: ProjKind,
    pub flags: ProjFlags,
    pub rule: Option<ProjRule>,
    pub draw_rule: Option<ProjDrawRule>,
    pub shader: Option<&'static str>,
    pub angle: f32,
    pub timeout: Frame,
    /// 0 means "use the default for this kind".
    pub max_viewport_dist: f32,
}

impl Default for ProjArgs {
    fn default() -> Self {
        Self {
            proto: protos::BALL,
            pos: Vec2::ZERO,
            color: Color::default(),
            movement: MoveParams::default(),
            kind: ProjKind::EnemyShot,
            flags: ProjFlags::default(),
            rule: None,
            draw_rule: None,
            shader: None,
            angle: 0.0,
            timeout: 0,
            max_viewport_dist: 0.0,
        }
    }
}

fn layer_for(kind: &ProjKind) -> DrawLayer {
    match kind {
        ProjKind::PlayerShot { .. } => DrawLayer::PlayerShot,
        ProjKind::Particle => DrawLayer::Particle,
        _ => DrawLayer::EnemyShot,
    }
}

pub fn create_projectile(stage: &Stage, mut args: ProjArgs) -> EntityRef {
    debug_assert!(!stage.in_draw(), "projectile spawned from draw code");

    if args.max_viewport_dist == 0.0
        && (args.kind.is_particle() || matches!(args.kind, ProjKind::PlayerShot { .. }))
    {
        args.max_viewport_dist = DEFAULT_VIEWPORT_DIST;
    }

    let spawn_effect = matches!(args.kind, ProjKind::EnemyShot)
        && !args.flags.contains(ProjFlags::NO_SPAWN_EFFECT);

    let grazed = args.flags.contains(ProjFlags::NO_GRAZE);
    let projectile = Projectile {
        ent: EntityRef::NULL,
        proto: args.proto,
        pos: args.pos,
        prev_pos: args.pos,
        origin: args.pos,
        birthtime: stage.frame(),
        angle: args.angle,
        color: args.color,
        layer: layer_for(&args.kind),
        kind: args.kind,
        flags: args.flags,
        movement: args.movement,
        rule: args.rule,
        draw_rule: args.draw_rule,
        shader: args.shader,
        max_viewport_dist: args.max_viewport_dist,
        timeout: args.timeout,
        grazed,
    };
    let r = stage.world_mut().spawn_projectile(projectile);

    if spawn_effect {
        create_particle(
            stage,
            ProjArgs {
                proto: protos::FLARE,
                pos: args.pos,
                color: args.color,
                timeout: 16,
                draw_rule: Some(draw_grow_fade(16, 2.0)),
                ..Default::default()
            },
        );
    }

    r
}

pub fn create_particle(stage: &Stage, args: ProjArgs) -> EntityRef {
    create_projectile(
        stage,
        ProjArgs {
            kind: ProjKind::Particle,
            flags: args.flags | ProjFlags::NO_SPAWN_EFFECT,
            ..args
        },
    )
}

/// Axis-aligned bounding-box test with the projectile's own margin.
pub fn projectile_in_viewport(p: &Projectile) -> bool {
    let half = p.proto.size * 0.5;
    let e = p.max_viewport_dist;
    !(p.pos.x + half.x + e < 0.0
        || p.pos.x - half.x - e > VIEWPORT_W
        || p.pos.y + half.y + e < 0.0
        || p.pos.y - half.y - e > VIEWPORT_H)
}

pub fn projectile_is_clearable(p: &Projectile) -> bool {
    match p.kind {
        ProjKind::Dead => true,
        ProjKind::EnemyShot | ProjKind::Fake => !p.flags.contains(ProjFlags::NO_CLEAR),
        _ => false,
    }
}

/// Mark every clearable projectile dead. The per-frame sweep turns them into
/// clear effects over the next few frames.
pub fn clear_projectiles(stage: &Stage) {
    let mut world = stage.world_mut();
    for p in world.projectiles_mut() {
        if projectile_is_clearable(p) {
            p.kind = ProjKind::Dead;
        }
    }
}

enum Collision {
    None,
    /// Fatal to the projectile because its rule or timeout said so.
    Ruled,
    Player,
    Graze(Vec2),
    Enemy(EntityRef, f32),
    Boss(f32),
    Void,
}

fn calc_collision(stage: &Stage, p: &Projectile) -> Collision {
    if p.flags.contains(ProjFlags::NO_COLLISION) {
        return Collision::None;
    }

    match p.kind {
        ProjKind::EnemyShot => {
            let (player_pos, player_alive) = {
                let world = stage.world_ref();
                match world.player() {
                    Some(plr) => (plr.pos, !plr.is_dying(stage.frame())),
                    None => return Collision::None,
                }
            };
            if !player_alive {
                return Collision::None;
            }

            let w = p.proto.size.x;
            let h = p.proto.size.y;
            let angle = carg(player_pos - p.pos) + p.angle;
            let proj_r = ((w / 2.0 * angle.cos()).powi(2) + (h / 2.0 * angle.sin()).powi(2))
                .sqrt()
                * 0.45;
            let s = w.max(h);
            let graze_r = (0.9 * s.sqrt() + 0.1 * s) * 6.0;
            let dist = player_pos.distance(p.pos);

            if dist < proj_r + 1.0 {
                return Collision::Player;
            }
            if !p.grazed && dist < graze_r && !player::is_invulnerable(stage) {
                let location = p.pos - graze_r * 0.3 * barrage_core::math::cdir(carg(p.pos - player_pos));
                return Collision::Graze(location);
            }
            Collision::None
        }
        ProjKind::PlayerShot { damage } => {
            let world = stage.world_ref();
            for en in world.enemies() {
                if enemy::enemy_is_targetable(en) && en.pos.distance(p.pos) < en.hit_radius {
                    return Collision::Enemy(en.ent, damage);
                }
            }
            if let Some(b) = world.boss() {
                if boss::boss_is_vulnerable(b) && b.pos.distance(p.pos) < 42.0 {
                    return Collision::Boss(damage);
                }
            }
            Collision::None
        }
        _ => Collision::None,
    }
}

fn spawn_death_effect(stage: &Stage, p: &Projectile) {
    create_particle(
        stage,
        ProjArgs {
            proto: p.proto,
            pos: p.pos,
            color: p.color,
            flags: p.flags | ProjFlags::NO_REFLECT,
            movement: MoveParams::linear(5.0 * barrage_core::math::cdir(p.angle)),
            timeout: 10,
            draw_rule: Some(draw_death_shrink(10)),
            ..Default::default()
        },
    );
}

fn spawn_collision_effect(stage: &Stage, p: &Projectile) {
    // particles never get death effects, or every timeout would cascade
    if p.kind.is_particle() || p.flags.contains(ProjFlags::NO_DEATH_EFFECT) {
        return;
    }
    spawn_death_effect(stage, p);
}

fn clear_now(stage: &Stage, p: &Projectile) {
    if !p.flags.contains(ProjFlags::NO_CLEAR_BONUS) {
        item::spawn_item(stage, p.pos, ItemKind::Piv);
    }
    if !p.flags.contains(ProjFlags::NO_CLEAR_EFFECT) {
        spawn_death_effect(stage, p);
    }
}

/// One pass over the projectile pool. `collision = true` processes bullets
/// and player shots; `collision = false` is the particle pass.
pub fn process_projectiles(stage: &Stage, collision: bool) {
    let frame = stage.frame();
    let refs = stage.world_ref().projectile_refs();
    let mut cleared = 0u32;

    for r in refs {
        let mut p = match stage.world_mut().take_projectile(r) {
            Some(p) => p,
            None => continue,
        };
        if p.kind.is_particle() == collision {
            stage.world_mut().put_back_projectile(r, p);
            continue;
        }

        let age = p.age(frame);

        p.prev_pos = p.pos;
        let displacement = p.movement.update(&mut p.pos);
        if !p.flags.contains(ProjFlags::MANUAL_ANGLE)
            && displacement.length_squared() > 1e-12
        {
            p.angle = carg(displacement);
        }

        let mut action = Action::Continue;
        if let Some(mut rule) = p.rule.take() {
            action = rule(&mut p, age, stage);
            p.rule = Some(rule);
        }
        if p.timeout > 0 && age >= p.timeout {
            action = Action::Destroy;
        }

        // dead-marked projectiles are swept a few at a time; the rest fall
        // through inert until a later pass gets to them
        if matches!(p.kind, ProjKind::Dead) && cleared < CLEAR_BUDGET {
            cleared += 1;
            clear_now(stage, &p);
            stage.world_mut().despawn(r);
            continue;
        }

        let col = if action == Action::Destroy {
            Collision::Ruled
        } else if collision {
            calc_collision(stage, &p)
        } else if !projectile_in_viewport(&p) {
            Collision::Void
        } else {
            Collision::None
        };

        // the culling check also applies to the collision pass
        let col = match col {
            Collision::None if !projectile_in_viewport(&p) => Collision::Void,
            other => other,
        };

        match col {
            Collision::None => {
                stage.world_mut().put_back_projectile(r, p);
            }
            Collision::Graze(location) => {
                p.grazed = true;
                if p.flags.contains(ProjFlags::GRAZE_SPAM) {
                    player::player_graze(stage, location, 10, 2);
                } else {
                    player::player_graze(stage, location, 50, 5);
                }
                stage.world_mut().put_back_projectile(r, p);
            }
            Collision::Ruled => {
                spawn_collision_effect(stage, &p);
                stage.world_mut().despawn(r);
            }
            Collision::Player => {
                spawn_collision_effect(stage, &p);
                stage.world_mut().despawn(r);
                player::damage_player(
                    stage,
                    DamageInfo { amount: 1.0, kind: DamageKind::EnemyShot },
                );
            }
            Collision::Enemy(target, damage) => {
                spawn_collision_effect(stage, &p);
                stage.world_mut().despawn(r);
                let result = enemy::damage_enemy(
                    stage,
                    target,
                    DamageInfo { amount: damage, kind: DamageKind::PlayerShot },
                );
                if result == DamageResult::Applied {
                    stage.add_points((damage * 0.5) as u64);
                }
            }
            Collision::Boss(damage) => {
                spawn_collision_effect(stage, &p);
                stage.world_mut().despawn(r);
                let result = boss::damage_boss(
                    stage,
                    DamageInfo { amount: damage, kind: DamageKind::PlayerShot },
                );
                if result == DamageResult::Applied {
                    stage.add_points((damage * 0.2) as u64);
                }
            }
            Collision::Void => {
                stage.world_mut().despawn(r);
            }
        }
    }
}

// --- stock draw rules ---

/// Default sprite draw with the spawn zoom-in on fresh enemy bullets.
pub(crate) fn default_sprite(p: &Projectile, age: Frame) -> SpriteCmd {
    let mut scale = 1.0;
    if age < 16 && matches!(p.kind, ProjKind::EnemyShot | ProjKind::Fake) {
        scale = 2.0 - age as f32 / 16.0;
    }
    let mut cmd = SpriteCmd::new(p.layer, p.proto.sprite, p.pos)
        .with_angle(p.angle)
        .with_scale(Vec2::splat(scale))
        .with_color(p.color);
    if let Some(shader) = p.shader {
        cmd = cmd.with_shader(shader);
    }
    cmd
}

/// Fade out over `lifetime` frames.
pub fn draw_fade(lifetime: Frame) -> ProjDrawRule {
    Box::new(move |p, age| {
        let t = (age as f32 / lifetime as f32).clamp(0.0, 1.0);
        Some(default_sprite(p, age).with_color(p.color.mul_alpha(1.0 - t)))
    })
}

/// Shrink to nothing over `lifetime` frames.
pub fn draw_shrink(lifetime: Frame) -> ProjDrawRule {
    Box::new(move |p, age| {
        let s = (2.0 - age as f32 / lifetime as f32 * 2.0).max(0.0);
        Some(default_sprite(p, age).with_scale(Vec2::splat(s)))
    })
}

/// Horizontal collapse used by bullet death effects.
pub fn draw_death_shrink(lifetime: Frame) -> ProjDrawRule {
    Box::new(move |p, age| {
        let s = (2.0 - age as f32 / lifetime as f32 * 2.0).max(0.0);
        Some(default_sprite(p, age).with_scale(Vec2::new(s, 1.0)))
    })
}

/// Grow while fading, used by spawn flares and explosions.
pub fn draw_grow_fade(lifetime: Frame, factor: f32) -> ProjDrawRule {
    Box::new(move |p, age| {
        let t = (age as f32 / lifetime as f32).clamp(0.0, 1.0);
        Some(
            default_sprite(p, age)
                .with_scale(Vec2::splat(t * (1.0 + factor)))
                .with_color(p.color.mul_alpha(1.0 - t)),
        )
    })
}
