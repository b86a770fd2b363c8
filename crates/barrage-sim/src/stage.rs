//! The stage: world + scheduler + frame driver.
//!
//! One `Stage` owns everything a play-through needs: the entity world, the
//! task scheduler, both RNG streams, score state, and the per-frame update
//! order. The handle is cheaply cloneable; stage scripts capture clones
//! inside their task bodies.
//!
//! The per-frame order is a contract scripts rely on: input → player →
//! enemies → projectiles (collision) → lasers → items → particles → boss →
//! scheduler step → frame counter.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::future::Future;
use std::rc::Rc;

use barrage_core::color::rgba;
use barrage_core::replay::GameKey;
use barrage_core::rng::GameRng;
use barrage_core::Frame;
use glam::Vec2;

use crate::coro::{Event, Sched, TaskCtx, TaskHandle};
use crate::entity::{DamageInfo, DamageResult, DrawLayer, EntityKind, EntityRef, World};
use crate::render::{RenderFrame, SpriteCmd};
use crate::{boss, enemy, item, laser, player, projectile};

pub const VIEWPORT_W: f32 = 480.0;
pub const VIEWPORT_H: f32 = 560.0;

/// Held game keys, packed the way the input layer delivers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputFlags(pub u8);

impl InputFlags {
    pub const UP: InputFlags = InputFlags(1 << 0);
    pub const DOWN: InputFlags = InputFlags(1 << 1);
    pub const LEFT: InputFlags = InputFlags(1 << 2);
    pub const RIGHT: InputFlags = InputFlags(1 << 3);
    pub const FOCUS: InputFlags = InputFlags(1 << 4);
    pub const SHOT: InputFlags = InputFlags(1 << 5);
    pub const BOMB: InputFlags = InputFlags(1 << 6);
    pub const SKIP: InputFlags = InputFlags(1 << 7);

    pub fn from_key(key: GameKey) -> InputFlags {
        match key {
            GameKey::Up => Self::UP,
            GameKey::Down => Self::DOWN,
            GameKey::Left => Self::LEFT,
            GameKey::Right => Self::RIGHT,
            GameKey::Focus => Self::FOCUS,
            GameKey::Shot => Self::SHOT,
            GameKey::Bomb => Self::BOMB,
            GameKey::Skip => Self::SKIP,
        }
    }

    pub fn contains(self, other: InputFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: InputFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: InputFlags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for InputFlags {
    type Output = InputFlags;
    fn bitor(self, rhs: InputFlags) -> InputFlags {
        InputFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub points: u64,
    pub graze: u32,
    /// Point-item value currency.
    pub piv: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Win,
    GameOver,
    Abort,
}

struct StageInner {
    world: Rc<RefCell<World>>,
    sched: Sched,
    frame: Cell<Frame>,
    rng: RefCell<GameRng>,
    vrng: RefCell<GameRng>,
    stats: RefCell<Stats>,
    input: Cell<InputFlags>,
    prev_input: Cell<InputFlags>,
    sprites: RefCell<Vec<SpriteCmd>>,
    audio: RefCell<Vec<&'static str>>,
    in_draw: Cell<bool>,
    outcome: Cell<Option<StageOutcome>>,
    finished: Event,
}

#[derive(Clone)]
pub struct Stage {
    inner: Rc<StageInner>,
}

impl Stage {
    /// A fresh stage. The seed drives the replay-critical RNG stream; the
    /// visual stream is derived from it but advances independently.
    pub fn new(seed: u64) -> Self {
        let world = Rc::new(RefCell::new(World::new()));
        let sched = Sched::new(world.clone());
        tracing::debug!("stage created, seed {:#x}", seed);
        Self {
            inner: Rc::new(StageInner {
                world,
                sched,
                frame: Cell::new(0),
                rng: RefCell::new(GameRng::new(seed)),
                vrng: RefCell::new(GameRng::new(!seed)),
                stats: RefCell::new(Stats::default()),
                input: Cell::new(InputFlags::default()),
                prev_input: Cell::new(InputFlags::default()),
                sprites: RefCell::new(Vec::new()),
                audio: RefCell::new(Vec::new()),
                in_draw: Cell::new(false),
                outcome: Cell::new(None),
                finished: Event::new(),
            }),
        }
    }

    pub fn frame(&self) -> Frame {
        self.inner.frame.get()
    }

    pub fn sched(&self) -> &Sched {
        &self.inner.sched
    }

    pub fn world_ref(&self) -> Ref<'_, World> {
        self.inner.world.borrow()
    }

    pub fn world_mut(&self) -> RefMut<'_, World> {
        self.inner.world.borrow_mut()
    }

    /// The replay-critical RNG stream.
    pub fn rng(&self) -> RefMut<'_, GameRng> {
        self.inner.rng.borrow_mut()
    }

    /// Presentation-only RNG stream; never affects gameplay state.
    pub fn vrng(&self) -> RefMut<'_, GameRng> {
        self.inner.vrng.borrow_mut()
    }

    pub fn stats(&self) -> Ref<'_, Stats> {
        self.inner.stats.borrow()
    }

    pub fn stats_mut(&self) -> RefMut<'_, Stats> {
        self.inner.stats.borrow_mut()
    }

    pub fn add_points(&self, points: u64) {
        self.inner.stats.borrow_mut().points += points;
    }

    pub fn player_pos(&self) -> Option<Vec2> {
        self.world_ref().player().map(|p| p.pos)
    }

    pub fn player_ref(&self) -> Option<EntityRef> {
        self.world_ref().player_ref()
    }

    pub fn boss_ref(&self) -> Option<EntityRef> {
        self.world_ref().boss_ref()
    }

    pub fn in_draw(&self) -> bool {
        self.inner.in_draw.get()
    }

    /// Queue a sound cue for this frame. Unknown keys are the resource
    /// layer's problem; a miss there is tolerated, not fatal.
    pub fn play_sfx(&self, name: &'static str) {
        self.inner.audio.borrow_mut().push(name);
    }

    pub fn push_sprite(&self, cmd: SpriteCmd) {
        self.inner.sprites.borrow_mut().push(cmd);
    }

    // --- input ---

    /// Feed the held-key state for the coming frame. Call exactly once per
    /// frame, before [`tick`](Self::tick); edge detection and the
    /// `inputflags_changed` event depend on it.
    pub fn set_input(&self, flags: InputFlags) {
        let prev = self.inner.input.replace(flags);
        self.inner.prev_input.set(prev);
        if prev != flags {
            let event = self
                .world_ref()
                .player()
                .map(|p| p.events.inputflags_changed.clone());
            if let Some(event) = event {
                event.signal(flags.0 as u32);
            }
        }
    }

    pub fn input(&self) -> InputFlags {
        self.inner.input.get()
    }

    /// True on the frame a key went down.
    pub fn input_pressed(&self, flags: InputFlags) -> bool {
        self.inner.input.get().contains(flags) && !self.inner.prev_input.get().contains(flags)
    }

    // --- task spawning (the stage is the invoke target) ---

    pub fn invoke<F, Fut>(&self, f: F) -> TaskHandle
    where
        F: FnOnce(TaskCtx) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        self.inner.sched.invoke(f)
    }

    pub fn invoke_delayed<F, Fut>(&self, delay: Frame, f: F) -> TaskHandle
    where
        F: FnOnce(TaskCtx) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.inner.sched.invoke_delayed(delay, f)
    }

    pub fn invoke_when<F, Fut>(&self, event: &Event, f: F) -> TaskHandle
    where
        F: FnOnce(TaskCtx) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.inner.sched.invoke_when(event, f)
    }

    // --- lifecycle ---

    /// End the stage. The first outcome wins; the stage-main task (and
    /// anything else waiting on [`finished_event`](Self::finished_event))
    /// is woken.
    pub fn finish(&self, outcome: StageOutcome) {
        if self.inner.outcome.get().is_some() {
            return;
        }
        tracing::info!("stage finished: {:?}", outcome);
        self.inner.outcome.set(Some(outcome));
        self.inner.finished.signal(0);
    }

    pub fn outcome(&self) -> Option<StageOutcome> {
        self.inner.outcome.get()
    }

    pub fn is_over(&self) -> bool {
        self.inner.outcome.get().is_some()
    }

    pub fn finished_event(&self) -> Event {
        self.inner.finished.clone()
    }

    /// Clear every hazard on screen: bullets become clear effects, lasers
    /// vanish, items fly to the player.
    pub fn clear_hazards(&self) {
        projectile::clear_projectiles(self);
        laser::clear_lasers(self);
        item::collect_all_items(self, 1.0);
    }

    /// Cancel all tasks and despawn everything. Handles into this stage
    /// stay dead forever.
    pub fn teardown(&self) {
        self.inner.sched.cancel_all();
        self.world_mut().clear();
        self.inner.sprites.borrow_mut().clear();
        self.inner.audio.borrow_mut().clear();
    }

    /// One simulation step, in the contract order. The stage keeps ticking
    /// after [`finish`](Self::finish); the outer loop decides when to stop
    /// and tear down.
    pub fn tick(&self) {
        debug_assert!(!self.in_draw(), "tick during draw");

        player::process_player(self);
        enemy::process_enemies(self);
        projectile::process_projectiles(self, true);
        laser::process_lasers(self);
        item::process_items(self);
        projectile::process_projectiles(self, false);
        boss::process_boss(self);
        self.inner.sched.step();

        self.inner.frame.set(self.frame() + 1);
    }

    /// Assemble the frame snapshot for the presentation layer: every
    /// entity's draw output in draw-layer order, plus this frame's sound
    /// cues.
    pub fn render(&self) -> RenderFrame {
        debug_assert!(!self.in_draw(), "render re-entered");
        self.inner.in_draw.set(true);
        let frame = self.frame();

        {
            let world = self.world_ref();

            for it in world.items() {
                self.push_sprite(SpriteCmd::new(DrawLayer::Item, it.kind.sprite(), it.pos));
            }

            if let Some(plr) = world.player() {
                if plr.deathtime.is_none() {
                    let mut cmd = SpriteCmd::new(DrawLayer::Player, "player/ship", plr.pos);
                    if plr.is_invulnerable(frame) && (frame / 8) % 2 == 1 {
                        cmd = cmd.with_color(rgba(0.4, 0.4, 1.0, 0.9));
                    }
                    self.push_sprite(cmd);
                    if plr.focus > 0 {
                        self.push_sprite(
                            SpriteCmd::new(DrawLayer::Player, "focus", plr.pos)
                                .with_angle(frame as f32 * 0.1)
                                .with_color(rgba(1.0, 1.0, 1.0, plr.focus as f32 / 30.0)),
                        );
                    }
                }
            }

            for p in world.projectiles() {
                let age = p.age(frame);
                let cmd = match &p.draw_rule {
                    Some(rule) => rule(p, age),
                    None => Some(projectile::default_sprite(p, age)),
                };
                if let Some(cmd) = cmd {
                    self.push_sprite(cmd);
                }
            }

            let mut laser_cmds = Vec::new();
            for l in world.lasers() {
                laser::draw_laser(l, frame, &mut laser_cmds);
            }
            for cmd in laser_cmds {
                self.push_sprite(cmd);
            }

            if let Some(b) = world.boss() {
                self.push_sprite(SpriteCmd::new(DrawLayer::Boss, b.sprite, b.pos));
            }
        }

        // enemy visual rules are FnMut; run them through the take pattern
        let enemy_refs = self.world_ref().enemy_refs();
        for r in enemy_refs {
            let rule = self
                .world_mut()
                .enemy_mut(r)
                .and_then(|e| e.visual_rule.take());
            if let Some(mut rule) = rule {
                {
                    let world = self.world_ref();
                    if let Some(en) = world.enemy(r) {
                        rule(en, en.age(frame), true, self);
                    }
                }
                if let Some(en) = self.world_mut().enemy_mut(r) {
                    en.visual_rule = Some(rule);
                }
            }
        }

        let mut sprites = std::mem::take(&mut *self.inner.sprites.borrow_mut());
        sprites.sort_by_key(|c| c.layer);
        let audio = std::mem::take(&mut *self.inner.audio.borrow_mut());

        self.inner.in_draw.set(false);
        RenderFrame { sprites, audio }
    }
}

/// Damage dispatch by entity class.
pub fn apply_damage(stage: &Stage, target: EntityRef, damage: DamageInfo) -> DamageResult {
    let kind = stage.world_ref().lookup(target);
    match kind {
        Some(EntityKind::Enemy(_)) => enemy::damage_enemy(stage, target, damage),
        Some(EntityKind::Boss) => boss::damage_boss(stage, damage),
        Some(EntityKind::Player) => player::damage_player(stage, damage),
        _ => DamageResult::Immune,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boss::{self, AttackKind};
    use crate::enemy;
    use crate::entity::DamageKind;
    use crate::player::{self, ShotMode, PLR_START_LIVES};
    use crate::projectile::{self, ProjArgs, ProjFlags, ProjKind};
    use std::cell::Cell;

    fn stage_with_player() -> Stage {
        let stage = Stage::new(1);
        player::create_player(&stage, ShotMode::default());
        stage
    }

    fn run(stage: &Stage, frames: i32) {
        for _ in 0..frames {
            stage.tick();
        }
    }

    fn particle_count(stage: &Stage) -> usize {
        stage
            .world_ref()
            .projectiles()
            .filter(|p| matches!(p.kind, ProjKind::Particle))
            .count()
    }

    #[test]
    fn test_tick_advances_frame() {
        let stage = Stage::new(0);
        run(&stage, 3);
        assert_eq!(stage.frame(), 3);
    }

    #[test]
    fn test_no_collision_flag_never_damages() {
        let stage = stage_with_player();
        let pos = stage.player_pos().unwrap();
        projectile::create_projectile(
            &stage,
            ProjArgs {
                pos,
                flags: ProjFlags::NO_COLLISION | ProjFlags::NO_SPAWN_EFFECT,
                ..Default::default()
            },
        );
        run(&stage, 10);
        let world = stage.world_ref();
        let plr = world.player().unwrap();
        assert_eq!(plr.lives, PLR_START_LIVES);
        assert!(plr.deathtime.is_none());
    }

    #[test]
    fn test_enemy_shot_on_hitbox_kills() {
        let stage = stage_with_player();
        let pos = stage.player_pos().unwrap();
        projectile::create_projectile(
            &stage,
            ProjArgs {
                pos,
                flags: ProjFlags::NO_SPAWN_EFFECT,
                ..Default::default()
            },
        );
        run(&stage, 1);
        assert!(stage.world_ref().player().unwrap().deathtime.is_some());
        // no bomb: the death finalizes and costs a life
        run(&stage, player::DEATHBOMB_WINDOW + 2);
        assert_eq!(stage.world_ref().player().unwrap().lives, PLR_START_LIVES - 1);
    }

    #[test]
    fn test_player_shot_damage_is_exact() {
        let stage = stage_with_player();
        let target = enemy::create_enemy(&stage, Vec2::new(100.0, 100.0), 100.0, None, None);
        projectile::create_projectile(
            &stage,
            ProjArgs {
                pos: Vec2::new(100.0, 100.0),
                kind: ProjKind::PlayerShot { damage: 12.0 },
                flags: ProjFlags::NO_SPAWN_EFFECT,
                ..Default::default()
            },
        );
        run(&stage, 1);
        assert_eq!(stage.world_ref().enemy(target).unwrap().hp, 88.0);
        assert_eq!(stage.stats().points, 6);
        // the shot itself was consumed by the hit
        assert!(stage
            .world_ref()
            .projectiles()
            .all(|p| !matches!(p.kind, ProjKind::PlayerShot { .. })));
    }

    #[test]
    fn test_mass_clear_sweeps_five_per_frame() {
        let stage = stage_with_player();
        for i in 0..100 {
            projectile::create_projectile(
                &stage,
                ProjArgs {
                    pos: Vec2::new(40.0 + i as f32, 60.0),
                    flags: ProjFlags::NO_SPAWN_EFFECT | ProjFlags::NO_CLEAR_BONUS,
                    ..Default::default()
                },
            );
        }
        assert_eq!(stage.world_ref().projectile_count(), 100);

        stage.clear_hazards();
        run(&stage, 1);

        // five dead projectiles are swept per pass, each with a clear
        // effect; the rest linger inert until their turn comes
        let dead = |stage: &Stage| {
            stage
                .world_ref()
                .projectiles()
                .filter(|p| matches!(p.kind, ProjKind::Dead))
                .count()
        };
        assert_eq!(dead(&stage), 95);
        assert_eq!(particle_count(&stage), 5);
        assert!(stage
            .world_ref()
            .projectiles()
            .all(|p| !matches!(p.kind, ProjKind::EnemyShot)));

        run(&stage, 19);
        assert_eq!(dead(&stage), 0);
        assert!(stage
            .world_ref()
            .projectiles()
            .all(|p| matches!(p.kind, ProjKind::Particle)));
    }

    #[test]
    fn test_graze_is_latched_per_projectile() {
        let stage = stage_with_player();
        let pos = stage.player_pos().unwrap() + Vec2::new(0.0, -25.0);
        projectile::create_projectile(
            &stage,
            ProjArgs {
                pos,
                flags: ProjFlags::NO_SPAWN_EFFECT,
                ..Default::default()
            },
        );
        run(&stage, 1);
        assert_eq!(stage.stats().graze, 1);
        assert_eq!(stage.stats().points, 50);
        run(&stage, 5);
        assert_eq!(stage.stats().graze, 1);
    }

    fn idle_attack() -> boss::AttackEntry {
        Box::new(|ctx| {
            Box::pin(async move {
                loop {
                    ctx.yield_frame().await;
                }
            })
        })
    }

    #[test]
    fn test_boss_attack_timeout_and_bonus_forfeit() {
        let stage = stage_with_player();
        boss::create_boss(&stage, "test boss", "boss/test", Vec2::new(240.0, 120.0));
        boss::boss_add_attack(&stage, AttackKind::Spell, "Test Sign", 600, 2000.0, 100_000, idle_attack());
        boss::boss_add_attack(&stage, AttackKind::Normal, "filler", 100_000, 10_000.0, 0, idle_attack());
        boss::boss_start_attack(&stage, 0);
        let finished = stage.world_ref().boss().unwrap().attacks[0].finished.clone();

        run(&stage, 100);
        boss::damage_boss(
            &stage,
            DamageInfo { amount: 500.0, kind: DamageKind::PlayerShot },
        );
        run(&stage, 400);
        // 2000 HP budget, only 500 dealt: still running
        assert_eq!(finished.num_signaled(), 0);

        run(&stage, 101);
        // forced finish at the 600-frame budget, exactly once, no bonus
        assert_eq!(finished.num_signaled(), 1);
        assert_eq!(stage.stats().points, 0);
        let world = stage.world_ref();
        let b = world.boss().unwrap();
        assert_eq!(b.current, Some(1));
        assert_eq!(b.hp, 11_500.0);

        drop(world);
        run(&stage, 50);
        assert_eq!(finished.num_signaled(), 1);
    }

    #[test]
    fn test_spell_cleared_within_budget_awards_bonus() {
        let stage = stage_with_player();
        boss::create_boss(&stage, "test boss", "boss/test", Vec2::new(240.0, 120.0));
        boss::boss_add_attack(&stage, AttackKind::Spell, "Quick Sign", 600, 100.0, 5000, idle_attack());
        boss::boss_start_attack(&stage, 0);
        run(&stage, 10);
        boss::damage_boss(
            &stage,
            DamageInfo { amount: 150.0, kind: DamageKind::PlayerShot },
        );
        run(&stage, 2);
        assert_eq!(stage.stats().points, 5000);
        // the attack list is exhausted, so the boss is defeated
        assert!(stage.world_ref().boss().is_none());
    }

    #[test]
    fn test_bomb_during_attack_forfeits_bonus() {
        let stage = stage_with_player();
        boss::create_boss(&stage, "test boss", "boss/test", Vec2::new(240.0, 120.0));
        boss::boss_add_attack(&stage, AttackKind::Spell, "Sign", 600, 100.0, 5000, idle_attack());
        boss::boss_start_attack(&stage, 0);
        run(&stage, 5);
        player::player_bomb(&stage);
        boss::damage_boss(
            &stage,
            DamageInfo { amount: 150.0, kind: DamageKind::PlayerShot },
        );
        run(&stage, 2);
        assert_eq!(stage.stats().points, 0);
    }

    #[test]
    fn test_shoot_event_fires_every_frame_held() {
        let stage = stage_with_player();
        let shoot = stage.world_ref().player().unwrap().events.shoot.clone();
        let count = Rc::new(Cell::new(0));

        let c = count.clone();
        stage.invoke(move |ctx| async move {
            loop {
                if shoot.wait(&ctx).await.is_canceled() {
                    return;
                }
                c.set(c.get() + 1);
            }
        });

        stage.set_input(InputFlags::SHOT);
        run(&stage, 3);
        assert_eq!(count.get(), 3);

        stage.set_input(InputFlags::default());
        run(&stage, 3);
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn test_inputflags_changed_fires_on_edges_only() {
        let stage = stage_with_player();
        let event = stage
            .world_ref()
            .player()
            .unwrap()
            .events
            .inputflags_changed
            .clone();
        assert_eq!(event.num_signaled(), 0);
        stage.set_input(InputFlags::LEFT);
        assert_eq!(event.num_signaled(), 1);
        stage.set_input(InputFlags::LEFT);
        assert_eq!(event.num_signaled(), 1);
        stage.set_input(InputFlags::LEFT | InputFlags::FOCUS);
        assert_eq!(event.num_signaled(), 2);
    }

    #[test]
    fn test_stage_finish_wakes_waiters() {
        let stage = stage_with_player();
        let woken = Rc::new(Cell::new(false));
        let finished = stage.finished_event();
        let w = woken.clone();
        stage.invoke(move |ctx| async move {
            finished.wait(&ctx).await;
            w.set(true);
        });

        run(&stage, 2);
        stage.finish(StageOutcome::Win);
        stage.finish(StageOutcome::GameOver); // first outcome wins
        run(&stage, 1);
        assert!(woken.get());
        assert_eq!(stage.outcome(), Some(StageOutcome::Win));
    }

    #[test]
    fn test_apply_damage_dispatches_by_class() {
        let stage = stage_with_player();
        let target = enemy::create_enemy(&stage, Vec2::new(50.0, 50.0), 40.0, None, None);
        let result = apply_damage(
            &stage,
            target,
            DamageInfo { amount: 15.0, kind: DamageKind::PlayerShot },
        );
        assert_eq!(result, DamageResult::Applied);
        assert_eq!(stage.world_ref().enemy(target).unwrap().hp, 25.0);

        stage.world_mut().despawn(target);
        let result = apply_damage(
            &stage,
            target,
            DamageInfo { amount: 15.0, kind: DamageKind::PlayerShot },
        );
        assert_eq!(result, DamageResult::Immune);
    }

    fn scripted_run(seed: u64) -> (Vec2, u64, usize, u32) {
        let stage = Stage::new(seed);
        player::create_player(&stage, ShotMode::default());
        let shooter = enemy::create_enemy(&stage, Vec2::new(240.0, 80.0), 5000.0, None, None);

        let s = stage.clone();
        stage.invoke(move |ctx| async move {
            ctx.bind(shooter);
            loop {
                let (origin, target) = {
                    let world = s.world_ref();
                    let e = world.enemy(shooter).unwrap();
                    (e.pos, world.player().map(|p| p.pos).unwrap_or(e.pos))
                };
                let volleys = s.rng().irange(2, 5);
                for i in 0..volleys {
                    let spread = (i as f32 - 1.0) * 0.2 + s.rng().sreal() * 0.05;
                    let aim = barrage_core::math::carg(target - origin) + spread;
                    projectile::create_projectile(
                        &s,
                        ProjArgs {
                            pos: origin,
                            movement: barrage_core::motion::MoveParams::linear(
                                2.0 * barrage_core::math::cdir(aim),
                            ),
                            flags: ProjFlags::NO_SPAWN_EFFECT,
                            ..Default::default()
                        },
                    );
                }
                ctx.wait(10).await;
            }
        });

        let script = [
            (0, InputFlags::SHOT | InputFlags::LEFT),
            (30, InputFlags::SHOT | InputFlags::RIGHT | InputFlags::FOCUS),
            (60, InputFlags::SHOT | InputFlags::UP),
            (90, InputFlags::default()),
        ];
        for frame in 0..120 {
            let mut input = InputFlags::default();
            for (at, flags) in script {
                if frame >= at {
                    input = flags;
                }
            }
            stage.set_input(input);
            stage.tick();
        }

        let pos = stage.player_pos().unwrap();
        let points = stage.stats().points;
        let live = stage.world_ref().projectile_count();
        let rng_probe = stage.rng().next_u32();
        (pos, points, live, rng_probe)
    }

    #[test]
    fn test_replay_determinism_same_seed_same_world() {
        let a = scripted_run(0xC0FFEE);
        let b = scripted_run(0xC0FFEE);
        assert_eq!(a, b);
    }
}
