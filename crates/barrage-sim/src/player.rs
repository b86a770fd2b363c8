//! The player: input-driven movement, shooting, bombs, death and respawn.

use barrage_core::color::rgba;
use barrage_core::motion::MoveParams;
use barrage_core::Frame;
use glam::Vec2;

use crate::coro::Event;
use crate::entity::{DamageInfo, DamageResult, EntityRef};
use crate::item;
use crate::projectile::{self, protos, ProjArgs};
use crate::stage::{InputFlags, Stage, VIEWPORT_H, VIEWPORT_W};
use crate::{boss, laser};

pub const PLR_START_LIVES: i32 = 2;
pub const PLR_START_BOMBS: i32 = 3;
pub const PLR_MAX_POWER: i32 = 400;

/// Frames between the fatal hit and the death being finalized; bombing
/// inside this window saves the player.
pub const DEATHBOMB_WINDOW: Frame = 12;

/// Invulnerability after a respawn.
pub const DEATH_INVULN: Frame = 240;

pub const DEATH_POWER_PENALTY: i32 = 100;

pub const BOMB_FRAGMENTS_PER_BOMB: i32 = 6;
pub const LIFE_FRAGMENTS_PER_LIFE: i32 = 8;

/// Distance the player keeps from the viewport edges.
const MOVE_MARGIN: f32 = 16.0;

pub struct PlayerEvents {
    /// Fired every frame the fire key is held and the mode permits firing.
    pub shoot: Event,
    pub inputflags_changed: Event,
    pub power_changed: Event,
}

impl PlayerEvents {
    fn new() -> Self {
        Self {
            shoot: Event::new(),
            inputflags_changed: Event::new(),
            power_changed: Event::new(),
        }
    }
}

/// Per-shot-mode parameters. The firing pattern itself is a task subscribed
/// to the `shoot` event; the bomb routine is a plain callback.
pub struct ShotMode {
    pub name: &'static str,
    pub base_speed: f32,
    pub focus_speed: f32,
    pub bomb_invuln: Frame,
    pub bomb: Option<Box<dyn Fn(&Stage)>>,
}

impl Default for ShotMode {
    fn default() -> Self {
        Self {
            name: "standard",
            base_speed: 4.8,
            focus_speed: 2.4,
            bomb_invuln: 300,
            bomb: None,
        }
    }
}

pub struct Player {
    pub ent: EntityRef,
    pub pos: Vec2,
    pub hitbox_radius: f32,
    /// Focus visual ramp, 0..=30.
    pub focus: i32,
    pub lives: i32,
    pub bombs: i32,
    pub power: i32,
    pub voltage: u32,
    pub bomb_fragments: i32,
    pub life_fragments: i32,
    pub invuln_until: Frame,
    pub bomb_until: Frame,
    /// Set while the deathbomb window is open; the frame at which the death
    /// becomes final.
    pub deathtime: Option<Frame>,
    pub moving: bool,
    pub facing_left: bool,
    pub mode: ShotMode,
    pub events: PlayerEvents,
}

impl Player {
    pub fn new(mode: ShotMode) -> Self {
        Self {
            ent: EntityRef::NULL,
            pos: Vec2::new(VIEWPORT_W / 2.0, VIEWPORT_H - 20.0),
            hitbox_radius: 2.0,
            focus: 0,
            lives: PLR_START_LIVES,
            bombs: PLR_START_BOMBS,
            power: 0,
            voltage: 0,
            bomb_fragments: 0,
            life_fragments: 0,
            invuln_until: 0,
            bomb_until: 0,
            deathtime: None,
            moving: false,
            facing_left: false,
            mode,
            events: PlayerEvents::new(),
        }
    }

    pub fn is_dying(&self, _frame: Frame) -> bool {
        self.deathtime.is_some()
    }

    pub fn is_bombing(&self, frame: Frame) -> bool {
        frame < self.bomb_until
    }

    pub fn is_invulnerable(&self, frame: Frame) -> bool {
        frame < self.invuln_until || self.is_bombing(frame) || self.deathtime.is_some()
    }
}

pub fn create_player(stage: &Stage, mode: ShotMode) -> EntityRef {
    let player = Player::new(mode);
    stage.world_mut().spawn_player(player)
}

pub fn is_invulnerable(stage: &Stage) -> bool {
    let frame = stage.frame();
    stage
        .world_ref()
        .player()
        .map_or(true, |p| p.is_invulnerable(frame))
}

pub fn is_focused(stage: &Stage) -> bool {
    stage.input().contains(InputFlags::FOCUS)
}

pub fn set_power(stage: &Stage, power: i32) {
    let clamped = power.clamp(0, PLR_MAX_POWER);
    let event = {
        let mut world = stage.world_mut();
        let player = match world.player_mut() {
            Some(player) => player,
            None => return,
        };
        if player.power == clamped {
            return;
        }
        player.power = clamped;
        player.events.power_changed.clone()
    };
    event.signal(clamped as u32);
}

pub fn add_power(stage: &Stage, amount: i32) {
    let current = stage.world_ref().player().map(|p| p.power);
    if let Some(current) = current {
        set_power(stage, current + amount);
    }
}

/// Score a graze: points, a counter bump, and a spark of particles.
pub fn player_graze(stage: &Stage, location: Vec2, points: u64, sparks: u32) {
    stage.add_points(points);
    stage.stats_mut().graze += 1;
    stage.play_sfx("graze");

    for _ in 0..sparks {
        let (speed, dir) = {
            let mut rng = stage.vrng();
            (rng.range(1.0, 4.0), rng.dir())
        };
        projectile::create_particle(
            stage,
            ProjArgs {
                proto: protos::FLARE,
                pos: location,
                color: rgba(0.6, 0.8, 1.0, 0.7),
                movement: MoveParams::linear(speed * dir),
                timeout: 8,
                draw_rule: Some(projectile::draw_fade(8)),
                ..Default::default()
            },
        );
    }
}

/// The player damage dispatcher. Rejected outright while invulnerable,
/// bombing, or already dying; otherwise opens the deathbomb window.
pub fn damage_player(stage: &Stage, _damage: DamageInfo) -> DamageResult {
    if is_invulnerable(stage) {
        return DamageResult::Immune;
    }
    player_death(stage);
    DamageResult::Applied
}

pub fn player_death(stage: &Stage) {
    let frame = stage.frame();
    let pos = {
        let mut world = stage.world_mut();
        let player = match world.player_mut() {
            Some(player) => player,
            None => return,
        };
        if player.is_invulnerable(frame) {
            return;
        }
        player.deathtime = Some(frame + DEATHBOMB_WINDOW);
        player.pos
    };

    stage.play_sfx("death");
    for _ in 0..20 {
        let (speed, dir) = {
            let mut rng = stage.vrng();
            (rng.range(3.0, 10.0), rng.dir())
        };
        projectile::create_particle(
            stage,
            ProjArgs {
                proto: protos::FLARE,
                pos,
                movement: MoveParams::linear(speed * dir),
                timeout: 40,
                draw_rule: Some(projectile::draw_shrink(40)),
                ..Default::default()
            },
        );
    }
    projectile::create_particle(
        stage,
        ProjArgs {
            proto: protos::BLAST,
            pos,
            color: rgba(1.0, 0.5, 0.3, 1.0),
            timeout: 35,
            draw_rule: Some(projectile::draw_grow_fade(35, 2.4)),
            ..Default::default()
        },
    );

    boss::mark_attack_failed(stage);
}

fn finalize_death(stage: &Stage) {
    let frame = stage.frame();
    let (pos, game_over) = {
        let mut world = stage.world_mut();
        let player = match world.player_mut() {
            Some(player) => player,
            None => return,
        };
        let pos = player.pos;
        player.deathtime = None;
        player.lives -= 1;
        let game_over = player.lives < 0;
        if !game_over {
            // respawn below the field; process_player floats the ship back in
            player.pos = Vec2::new(VIEWPORT_W / 2.0, VIEWPORT_H + 40.0);
            player.invuln_until = frame + DEATH_INVULN;
            player.bombs = player.bombs.max(PLR_START_BOMBS);
        }
        (pos, game_over)
    };

    // the lost power is partially recoverable
    item::create_item(stage, pos, Vec2::new(6.0, -15.0).normalize() * 3.0, item::ItemKind::Power);
    item::create_item(stage, pos, Vec2::new(-6.0, -15.0).normalize() * 3.0, item::ItemKind::Power);

    let power = stage.world_ref().player().map(|p| p.power);
    if let Some(power) = power {
        set_power(stage, power - DEATH_POWER_PENALTY);
    }

    if game_over {
        stage.finish(crate::stage::StageOutcome::GameOver);
    }
}

pub fn player_bomb(stage: &Stage) {
    let frame = stage.frame();
    let ok = {
        let mut world = stage.world_mut();
        let player = match world.player_mut() {
            Some(player) => player,
            None => return,
        };
        if player.bombs <= 0 || player.is_bombing(frame) {
            false
        } else {
            player.bombs -= 1;
            if player.deathtime.is_some() {
                // deathbomb: the save costs half the remaining stock
                player.deathtime = None;
                player.bombs /= 2;
            }
            player.bomb_until = frame + player.mode.bomb_invuln;
            player.invuln_until = player.invuln_until.max(player.bomb_until);
            true
        }
    };
    if !ok {
        return;
    }

    stage.play_sfx("bomb");
    projectile::clear_projectiles(stage);
    laser::clear_lasers(stage);
    item::collect_all_items(stage, 1.0);
    boss::mark_attack_failed(stage);

    // run the mode's bomb routine with the player in place
    let bomb_fn = stage
        .world_mut()
        .player_mut()
        .and_then(|player| player.mode.bomb.take());
    if let Some(bomb_fn) = bomb_fn {
        bomb_fn(stage);
        if let Some(player) = stage.world_mut().player_mut() {
            player.mode.bomb = Some(bomb_fn);
        }
    }
}

/// The per-frame player pass.
pub fn process_player(stage: &Stage) {
    let frame = stage.frame();
    let input = stage.input();

    let (shoot_event, do_shoot) = {
        let mut world = stage.world_mut();
        let player = match world.player_mut() {
            Some(player) => player,
            None => return,
        };

        if player.deathtime.is_none() && player.pos.y > VIEWPORT_H - MOVE_MARGIN {
            // floating back in from a respawn; no control until re-entry
            player.pos.y -= 0.7;
        } else if player.deathtime.is_none() {
            let mut dir = Vec2::ZERO;
            let left = input.contains(InputFlags::LEFT);
            let right = input.contains(InputFlags::RIGHT);
            if input.contains(InputFlags::UP) {
                dir.y -= 1.0;
            }
            if input.contains(InputFlags::DOWN) {
                dir.y += 1.0;
            }
            if left {
                dir.x -= 1.0;
            }
            if right {
                dir.x += 1.0;
            }

            player.moving = false;
            if left && !right {
                player.moving = true;
                player.facing_left = true;
            } else if right && !left {
                player.moving = true;
                player.facing_left = false;
            }

            if dir != Vec2::ZERO {
                let speed = if input.contains(InputFlags::FOCUS) {
                    player.mode.focus_speed
                } else {
                    player.mode.base_speed
                };
                player.pos += dir.normalize() * speed;
                player.pos = player.pos.clamp(
                    Vec2::splat(MOVE_MARGIN),
                    Vec2::new(VIEWPORT_W - MOVE_MARGIN, VIEWPORT_H - MOVE_MARGIN),
                );
            }
        }

        if input.contains(InputFlags::FOCUS) {
            player.focus = (player.focus + 1).min(30);
        } else {
            player.focus = (player.focus - 1).max(0);
        }

        let do_shoot = input.contains(InputFlags::SHOT) && player.deathtime.is_none();
        (player.events.shoot.clone(), do_shoot)
    };

    if do_shoot {
        shoot_event.signal(0);
    }

    if stage.input_pressed(InputFlags::BOMB) {
        player_bomb(stage);
    }

    let finalize_now = stage
        .world_ref()
        .player()
        .map_or(false, |p| p.deathtime == Some(frame));
    if finalize_now {
        finalize_death(stage);
    }
}
