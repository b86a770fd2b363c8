//! Enemies: HP, logic/visual rules, the `killed` event, and death effects.

use barrage_core::color::rgba;
use barrage_core::math::approach;
use barrage_core::motion::MoveParams;
use barrage_core::Frame;
use glam::Vec2;

use crate::coro::Event;
use crate::entity::{Action, DamageInfo, DamageKind, DamageResult, EntityRef};
use crate::item::{self, ItemKind};
use crate::player;
use crate::projectile::{self, protos, ProjArgs, ProjFlags, ProjKind};
use crate::stage::{Stage, VIEWPORT_H, VIEWPORT_W};

/// HP sentinel for enemies that can never be damaged.
pub const ENEMY_IMMUNE: f32 = -9000.0;

/// Margin outside the viewport before an enemy is auto-culled.
const VIEWPORT_MARGIN: f32 = 60.0;

/// Enemies spawned just off-screen get their visual spawn position pushed
/// at least this far out, so they don't pop into view.
const SPAWN_VISUAL_OFS: f32 = 21.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnemyFlags(pub u16);

impl EnemyFlags {
    pub const KILLED: EnemyFlags = EnemyFlags(1 << 0);
    pub const INVULNERABLE: EnemyFlags = EnemyFlags(1 << 1);
    pub const NO_HIT: EnemyFlags = EnemyFlags(1 << 2);
    pub const NO_HURT: EnemyFlags = EnemyFlags(1 << 3);
    pub const NO_AUTOKILL: EnemyFlags = EnemyFlags(1 << 4);
    pub const GHOST: EnemyFlags = EnemyFlags(1 << 5);
    pub const NO_VISUAL_CORRECTION: EnemyFlags = EnemyFlags(1 << 6);
    pub const NO_DEATH_EXPLOSION: EnemyFlags = EnemyFlags(1 << 7);

    pub fn contains(self, other: EnemyFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for EnemyFlags {
    type Output = EnemyFlags;
    fn bitor(self, rhs: EnemyFlags) -> EnemyFlags {
        EnemyFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for EnemyFlags {
    fn bitor_assign(&mut self, rhs: EnemyFlags) {
        self.0 |= rhs.0;
    }
}

/// Invoked once per frame with the enemy's age; returns whether the enemy
/// should keep living. Per-instance state lives in the closure's captures.
pub type EnemyLogicRule = Box<dyn FnMut(&mut Enemy, Frame, &Stage) -> Action>;

/// Invoked with `render = false` during the update pass (for particle
/// side effects) and `render = true` while the frame is being drawn.
pub type EnemyVisualRule = Box<dyn FnMut(&Enemy, Frame, bool, &Stage)>;

pub struct Enemy {
    pub ent: EntityRef,
    pub pos: Vec2,
    pub spawn_pos: Vec2,
    pub visual_spawn_pos: Vec2,
    pub birthtime: Frame,
    pub hp: f32,
    pub spawn_hp: f32,
    pub alpha: f32,
    pub movement: MoveParams,
    pub moving: bool,
    pub facing_left: bool,
    pub hurt_radius: f32,
    pub hit_radius: f32,
    pub flags: EnemyFlags,
    pub logic_rule: Option<EnemyLogicRule>,
    pub visual_rule: Option<EnemyVisualRule>,
    pub killed: Event,
}

impl Enemy {
    pub fn new(pos: Vec2, hp: f32) -> Self {
        let mut flags = EnemyFlags::default();
        if hp == ENEMY_IMMUNE {
            flags |= EnemyFlags::GHOST | EnemyFlags::NO_HIT;
        }
        Self {
            ent: EntityRef::NULL,
            pos,
            spawn_pos: pos,
            visual_spawn_pos: pos,
            birthtime: 0,
            hp,
            spawn_hp: hp,
            alpha: 0.0,
            movement: MoveParams::default(),
            moving: false,
            facing_left: false,
            hurt_radius: 7.0,
            hit_radius: 30.0,
            flags,
            logic_rule: None,
            visual_rule: None,
            killed: Event::new(),
        }
    }

    pub fn age(&self, frame: Frame) -> Frame {
        frame - self.birthtime
    }

    /// Drawn position: interpolates from the corrected spawn position to the
    /// logical one over the first 30 frames.
    pub fn visual_pos(&self, frame: Frame) -> Vec2 {
        if self.flags.contains(EnemyFlags::NO_VISUAL_CORRECTION) {
            return self.pos;
        }
        let t = self.age(frame) as f32 / 30.0;
        if t >= 1.0 {
            return self.pos;
        }
        self.pos - self.spawn_pos + self.spawn_pos.lerp(self.visual_spawn_pos, 1.0 - t)
    }
}

/// Push a barely-offscreen visual spawn position out to the margin.
fn fix_visual_spawn_pos(enemy: &mut Enemy) {
    if enemy.flags.contains(EnemyFlags::NO_VISUAL_CORRECTION) {
        return;
    }
    let mut p = enemy.visual_spawn_pos;
    if p.x <= 0.0 && p.x > -SPAWN_VISUAL_OFS {
        p.x = -SPAWN_VISUAL_OFS;
    } else if p.x >= VIEWPORT_W && p.x < VIEWPORT_W + SPAWN_VISUAL_OFS {
        p.x = VIEWPORT_W + SPAWN_VISUAL_OFS;
    }
    if p.y <= 0.0 && p.y > -SPAWN_VISUAL_OFS {
        p.y = -SPAWN_VISUAL_OFS;
    } else if p.y >= VIEWPORT_H && p.y < VIEWPORT_H + SPAWN_VISUAL_OFS {
        p.y = VIEWPORT_H + SPAWN_VISUAL_OFS;
    }
    enemy.visual_spawn_pos = p;
}

pub fn create_enemy(
    stage: &Stage,
    pos: Vec2,
    hp: f32,
    visual_rule: Option<EnemyVisualRule>,
    logic_rule: Option<EnemyLogicRule>,
) -> EntityRef {
    debug_assert!(!stage.in_draw(), "enemy spawned from draw code");

    let mut enemy = Enemy::new(pos, hp);
    enemy.birthtime = stage.frame();
    enemy.visual_rule = visual_rule;
    enemy.logic_rule = logic_rule;
    fix_visual_spawn_pos(&mut enemy);
    stage.world_mut().spawn_enemy(enemy)
}

pub fn enemy_is_vulnerable(enemy: &Enemy) -> bool {
    !enemy.flags.contains(EnemyFlags::INVULNERABLE) && enemy.hp != ENEMY_IMMUNE
}

pub fn enemy_is_targetable(enemy: &Enemy) -> bool {
    !enemy.flags.contains(EnemyFlags::NO_HIT) && enemy.hp != ENEMY_IMMUNE
}

pub fn enemy_in_viewport(pos: Vec2) -> bool {
    pos.x >= -VIEWPORT_MARGIN
        && pos.x <= VIEWPORT_W + VIEWPORT_MARGIN
        && pos.y >= -VIEWPORT_MARGIN
        && pos.y <= VIEWPORT_H + VIEWPORT_MARGIN
}

pub fn enemy_get_hurt_radius(enemy: &Enemy) -> f32 {
    if enemy.flags.contains(EnemyFlags::NO_HURT) || enemy.alpha < 1.0 {
        0.0
    } else {
        enemy.hurt_radius
    }
}

/// Flag an enemy as killed. The actual destruction (death effect, `killed`
/// event, despawn) happens in the next enemy pass.
pub fn enemy_kill(enemy: &mut Enemy) {
    enemy.flags |= EnemyFlags::KILLED
        | EnemyFlags::NO_HIT
        | EnemyFlags::NO_HURT
        | EnemyFlags::INVULNERABLE;
    enemy.hp = 0.0;
}

pub fn enemy_kill_all(stage: &Stage) {
    let mut world = stage.world_mut();
    for enemy in world.enemies_mut() {
        enemy_kill(enemy);
    }
}

/// The damage dispatcher for enemies. Enemy-originated damage and hits on
/// invulnerable or ghost enemies are rejected.
pub fn damage_enemy(stage: &Stage, target: EntityRef, damage: DamageInfo) -> DamageResult {
    let (killed_now, low_hp, pos, spawn_hp) = {
        let mut world = stage.world_mut();
        let enemy = match world.enemy_mut(target) {
            Some(enemy) => enemy,
            None => return DamageResult::Immune,
        };
        if !enemy_is_vulnerable(enemy) || damage.kind.is_enemy_source() {
            return DamageResult::Immune;
        }
        enemy.hp -= damage.amount;
        let killed_now = enemy.hp <= 0.0;
        if killed_now {
            enemy_kill(enemy);
        }
        (
            killed_now,
            enemy.hp < enemy.spawn_hp * 0.1,
            enemy.pos,
            enemy.spawn_hp,
        )
    };

    stage.play_sfx(if low_hp { "hit1" } else { "hit0" });

    if killed_now && damage.kind == DamageKind::PlayerDischarge {
        let count = ((spawn_hp / 100.0) as i32).max(1);
        for _ in 0..count {
            item::spawn_and_collect_item(stage, pos, ItemKind::Voltage, 1.0);
        }
    }

    DamageResult::Applied
}

fn enemy_death_effect(stage: &Stage, pos: Vec2) {
    for _ in 0..10 {
        let (speed, dir) = {
            let mut rng = stage.rng();
            (rng.range(3.0, 13.0), rng.dir())
        };
        projectile::create_particle(
            stage,
            ProjArgs {
                proto: protos::FLARE,
                pos,
                movement: MoveParams::linear(speed * dir),
                timeout: 10,
                draw_rule: Some(projectile::draw_fade(10)),
                ..Default::default()
            },
        );
    }

    for timeout in [20, 20, 15] {
        projectile::create_particle(
            stage,
            ProjArgs {
                proto: protos::BLAST,
                pos,
                color: rgba(0.3, 0.6, 1.0, 1.0),
                flags: ProjFlags::REQUIRED_PARTICLE,
                timeout,
                draw_rule: Some(projectile::draw_grow_fade(timeout, 1.0)),
                ..Default::default()
            },
        );
    }
}

/// Destroy one enemy. For a killed enemy the order is fixed: the `killed`
/// event fires exactly once, then the death effect spawns, then the event is
/// canceled for any remaining waiters, then the entity is despawned.
fn destroy_enemy(stage: &Stage, r: EntityRef, was_killed: bool) {
    let (pos, killed_event, explode) = {
        let world = stage.world_ref();
        match world.enemy(r) {
            Some(enemy) => (
                enemy.pos,
                enemy.killed.clone(),
                was_killed && !enemy.flags.contains(EnemyFlags::NO_DEATH_EXPLOSION),
            ),
            None => return,
        }
    };

    if was_killed {
        killed_event.signal_once(0);
    }

    if explode {
        stage.play_sfx("enemydeath");
        enemy_death_effect(stage, pos);

        // one PIV item per enemy bullet caught in the blast
        let nearby = {
            let world = stage.world_ref();
            world
                .projectiles()
                .filter(|p| {
                    matches!(p.kind, ProjKind::EnemyShot)
                        && !p.flags.contains(ProjFlags::NO_COLLISION)
                        && p.pos.distance(pos) < 64.0
                })
                .count()
        };
        for _ in 0..nearby {
            item::spawn_and_collect_item(stage, pos, ItemKind::Piv, 1.0);
        }
    }

    killed_event.cancel();
    stage.world_mut().despawn(r);
}

/// The per-frame enemy pass.
pub fn process_enemies(stage: &Stage) {
    let frame = stage.frame();
    let refs = stage.world_ref().enemy_refs();
    let mut deaths: Vec<(EntityRef, bool)> = Vec::new();
    let mut hurt_player = false;

    for r in refs {
        let mut enemy = match stage.world_mut().take_enemy(r) {
            Some(enemy) => enemy,
            None => continue,
        };

        if enemy.flags.contains(EnemyFlags::KILLED) {
            stage.world_mut().put_back_enemy(r, enemy);
            deaths.push((r, true));
            continue;
        }

        let age = enemy.age(frame);

        let displacement = enemy.movement.update(&mut enemy.pos);
        enemy.moving = displacement.x.abs() >= 1.0;
        if displacement.x.abs() > f32::EPSILON {
            enemy.facing_left = displacement.x < 0.0;
        }

        let mut action = Action::Continue;
        if let Some(mut rule) = enemy.logic_rule.take() {
            action = rule(&mut enemy, age, stage);
            enemy.logic_rule = Some(rule);
        }

        let hurt_radius = enemy_get_hurt_radius(&enemy);
        if hurt_radius > 0.0 {
            if let Some(player_pos) = stage.player_pos() {
                if player_pos.distance(enemy.pos) < hurt_radius {
                    hurt_player = true;
                }
            }
        }

        enemy.alpha = approach(enemy.alpha, 1.0, 1.0 / 60.0);

        if let Some(mut rule) = enemy.visual_rule.take() {
            rule(&enemy, age, false, stage);
            enemy.visual_rule = Some(rule);
        }

        let was_killed = enemy.hp <= 0.0 && enemy.hp != ENEMY_IMMUNE;
        let auto_kill = was_killed
            || (!enemy.flags.contains(EnemyFlags::NO_AUTOKILL)
                && !enemy_in_viewport(enemy.pos));

        stage.world_mut().put_back_enemy(r, enemy);
        if action == Action::Destroy || auto_kill {
            deaths.push((r, was_killed));
        }
    }

    if hurt_player {
        player::damage_player(
            stage,
            DamageInfo { amount: 1.0, kind: DamageKind::EnemyCollision },
        );
    }

    for (r, was_killed) in deaths {
        destroy_enemy(stage, r, was_killed);
    }
}
