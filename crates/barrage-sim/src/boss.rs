//! Bosses: a named entity with a list of attacks, each an independent
//! coroutine with lifecycle events, time and HP budgets, and spell bonuses.

use std::future::Future;
use std::pin::Pin;

use barrage_core::color::rgba;
use barrage_core::motion::MoveParams;
use barrage_core::Frame;
use glam::Vec2;

use crate::coro::{Event, TaskCtx};
use crate::entity::{DamageInfo, DamageResult, EntityRef};
use crate::item;
use crate::laser;
use crate::projectile::{self, protos, ProjArgs, ProjFlags};
use crate::stage::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackKind {
    /// Repositioning phase; the boss is invulnerable.
    Move,
    Normal,
    Spell,
    SurvivalSpell,
    ExtraSpell,
}

impl AttackKind {
    pub fn is_spell(self) -> bool {
        matches!(
            self,
            AttackKind::Spell | AttackKind::SurvivalSpell | AttackKind::ExtraSpell
        )
    }
}

/// Produces the attack's coroutine body when the attack starts.
pub type AttackEntry = Box<dyn FnOnce(TaskCtx) -> Pin<Box<dyn Future<Output = ()>>>>;

pub struct Attack {
    pub name: String,
    pub kind: AttackKind,
    pub timeout: Frame,
    /// How much boss HP this attack covers.
    pub hp_budget: f32,
    pub bonus: u32,
    pub started: Event,
    pub finished: Event,
    /// Set when the attack starts.
    pub start_frame: Frame,
    /// Boss HP at which the attack counts as cleared; set when it starts.
    pub hp_threshold: f32,
    /// The player died or bombed during this attack; forfeits the bonus.
    pub failed: bool,
    pub done: bool,
    entry: Option<AttackEntry>,
}

pub struct Boss {
    pub ent: EntityRef,
    pub name: String,
    pub sprite: &'static str,
    pub pos: Vec2,
    pub movement: MoveParams,
    /// Total HP; the sum of the attack budgets added so far.
    pub hp: f32,
    pub attacks: Vec<Attack>,
    pub current: Option<usize>,
    pub defeated: Event,
    /// Set when the attack list is exhausted. The entity lingers one more
    /// frame so tasks woken by the final `finished` signal still resolve
    /// their boss handle.
    pub defeated_at: Option<Frame>,
}

pub fn create_boss(stage: &Stage, name: &str, sprite: &'static str, pos: Vec2) -> EntityRef {
    debug_assert!(!stage.in_draw(), "boss spawned from draw code");
    let boss = Boss {
        ent: EntityRef::NULL,
        name: name.to_string(),
        sprite,
        pos,
        movement: MoveParams::default(),
        hp: 0.0,
        attacks: Vec::new(),
        current: None,
        defeated: Event::new(),
        defeated_at: None,
    };
    tracing::info!("boss '{}' enters", name);
    stage.world_mut().spawn_boss(boss)
}

/// Append an attack. Its HP budget is added to the boss's total.
pub fn boss_add_attack(
    stage: &Stage,
    kind: AttackKind,
    name: &str,
    timeout: Frame,
    hp_budget: f32,
    bonus: u32,
    entry: AttackEntry,
) -> usize {
    let mut world = stage.world_mut();
    let boss = world.boss_mut().expect("no boss to add an attack to");
    boss.hp += hp_budget;
    boss.attacks.push(Attack {
        name: name.to_string(),
        kind,
        timeout,
        hp_budget,
        bonus,
        started: Event::new(),
        finished: Event::new(),
        start_frame: 0,
        hp_threshold: 0.0,
        failed: false,
        done: false,
        entry: Some(entry),
    });
    boss.attacks.len() - 1
}

pub fn boss_start_attack(stage: &Stage, index: usize) {
    let frame = stage.frame();
    let (entry, started, boss_ref, name) = {
        let mut world = stage.world_mut();
        let boss = match world.boss_mut() {
            Some(boss) => boss,
            None => return,
        };
        let hp = boss.hp;
        let ent = boss.ent;
        let attack = &mut boss.attacks[index];
        attack.start_frame = frame;
        attack.hp_threshold = (hp - attack.hp_budget).max(0.0);
        attack.failed = false;
        attack.done = false;
        boss.current = Some(index);
        (
            attack.entry.take(),
            attack.started.clone(),
            ent,
            attack.name.clone(),
        )
    };

    tracing::debug!("boss attack '{}' starts at frame {}", name, frame);
    started.signal(0);

    if let Some(entry) = entry {
        stage.sched().invoke(move |ctx| async move {
            ctx.bind(boss_ref);
            entry(ctx.clone()).await;
        });
    }
}

pub fn boss_is_vulnerable(boss: &Boss) -> bool {
    if boss.defeated_at.is_some() {
        return false;
    }
    match boss.current {
        Some(i) => {
            let attack = &boss.attacks[i];
            attack.kind != AttackKind::Move && !attack.done
        }
        None => false,
    }
}

/// The damage dispatcher for the boss.
pub fn damage_boss(stage: &Stage, damage: DamageInfo) -> DamageResult {
    if damage.kind.is_enemy_source() {
        return DamageResult::Immune;
    }
    let applied = {
        let mut world = stage.world_mut();
        match world.boss_mut() {
            Some(boss) if boss_is_vulnerable(boss) => {
                boss.hp -= damage.amount;
                true
            }
            _ => false,
        }
    };
    if applied {
        stage.play_sfx("hit0");
        DamageResult::Applied
    } else {
        DamageResult::Immune
    }
}

/// Forfeit the current attack's bonus (player death or bomb).
pub fn mark_attack_failed(stage: &Stage) {
    let mut world = stage.world_mut();
    if let Some(boss) = world.boss_mut() {
        if let Some(i) = boss.current {
            if !boss.attacks[i].done {
                boss.attacks[i].failed = true;
            }
        }
    }
}

fn finish_attack(stage: &Stage, index: usize) {
    let (finished, award, bonus, name, next) = {
        let mut world = stage.world_mut();
        let boss = match world.boss_mut() {
            Some(boss) => boss,
            None => return,
        };
        let hp = boss.hp;
        let count = boss.attacks.len();
        let attack = &mut boss.attacks[index];
        debug_assert!(!attack.done, "attack finished twice");
        attack.done = true;
        let cleared = hp <= attack.hp_threshold;
        let award = attack.kind.is_spell() && cleared && !attack.failed;
        let next = if index + 1 < count { Some(index + 1) } else { None };
        (
            attack.finished.clone(),
            award,
            attack.bonus,
            attack.name.clone(),
            next,
        )
    };

    if award {
        tracing::debug!("spell '{}' captured, bonus {}", name, bonus);
        stage.add_points(bonus as u64);
        stage.play_sfx("bonus");
    }

    finished.signal(0);

    match next {
        Some(next) => boss_start_attack(stage, next),
        None => boss_defeat(stage),
    }
}

fn boss_defeat(stage: &Stage) {
    let (pos, defeated, name) = {
        let world = stage.world_ref();
        match world.boss() {
            Some(boss) => (boss.pos, boss.defeated.clone(), boss.name.clone()),
            None => return,
        }
    };

    tracing::info!("boss '{}' defeated", name);
    stage.play_sfx("bossdeath");

    for _ in 0..16 {
        let (speed, dir) = {
            let mut rng = stage.vrng();
            (rng.range(4.0, 12.0), rng.dir())
        };
        projectile::create_particle(
            stage,
            ProjArgs {
                proto: protos::BLAST,
                pos,
                color: rgba(1.0, 0.6, 0.2, 1.0),
                flags: ProjFlags::REQUIRED_PARTICLE,
                movement: MoveParams::linear(speed * dir),
                timeout: 30,
                draw_rule: Some(projectile::draw_grow_fade(30, 1.5)),
                ..Default::default()
            },
        );
    }

    projectile::clear_projectiles(stage);
    laser::clear_lasers(stage);
    item::collect_all_items(stage, 1.0);

    defeated.signal(0);
    if let Some(boss) = stage.world_mut().boss_mut() {
        boss.defeated_at = Some(stage.frame());
        boss.current = None;
    }
}

/// The per-frame boss pass: motion, then the current attack's time and HP
/// bounds. `finished` fires exactly once per attack.
pub fn process_boss(stage: &Stage) {
    let frame = stage.frame();
    let mut despawn = None;
    let mut finish = None;
    {
        let mut world = stage.world_mut();
        let boss = match world.boss_mut() {
            Some(boss) => boss,
            None => return,
        };
        if let Some(at) = boss.defeated_at {
            if frame > at {
                despawn = Some(boss.ent);
            }
        } else {
            boss.movement.update(&mut boss.pos);
            if let Some(i) = boss.current {
                let hp = boss.hp;
                let attack = &boss.attacks[i];
                // budget-less attacks (Move phases) end on the timer alone
                let depleted = attack.hp_budget > 0.0 && hp <= attack.hp_threshold;
                if !attack.done
                    && (depleted || frame - attack.start_frame >= attack.timeout)
                {
                    finish = Some(i);
                }
            }
        }
        if let Some(r) = despawn {
            world.despawn(r);
        }
    }
    if let Some(index) = finish {
        finish_attack(stage, index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::DamageKind;
    use crate::player::{self, ShotMode};
    use std::cell::Cell;
    use std::rc::Rc;

    fn stage_with_boss() -> Stage {
        let stage = Stage::new(13);
        player::create_player(&stage, ShotMode::default());
        create_boss(&stage, "test boss", "boss/test", Vec2::new(240.0, 120.0));
        stage
    }

    #[test]
    fn test_move_attack_is_invulnerable() {
        let stage = stage_with_boss();
        boss_add_attack(
            &stage,
            AttackKind::Move,
            "reposition",
            600,
            100.0,
            0,
            Box::new(|ctx| {
                Box::pin(async move {
                    loop {
                        ctx.yield_frame().await;
                    }
                })
            }),
        );
        boss_start_attack(&stage, 0);
        let result = damage_boss(
            &stage,
            DamageInfo { amount: 50.0, kind: DamageKind::PlayerShot },
        );
        assert_eq!(result, DamageResult::Immune);
        assert_eq!(stage.world_ref().boss().unwrap().hp, 100.0);
    }

    #[test]
    fn test_attack_body_waits_for_finished_and_subtasks_die() {
        let stage = stage_with_boss();
        let wrapped_up = Rc::new(Cell::new(false));
        let subtask_gone = Rc::new(Cell::new(false));

        // the canonical attack shape: spawn pattern subtasks, then wait for
        // the driver to signal `finished`
        let s = stage.clone();
        let w = wrapped_up.clone();
        let g = subtask_gone.clone();
        boss_add_attack(
            &stage,
            AttackKind::Normal,
            "short",
            10,
            1000.0,
            0,
            Box::new(move |ctx| {
                Box::pin(async move {
                    let g2 = g.clone();
                    ctx.invoke_subtask(move |ctx| async move {
                        ctx.set_finalizer(move || g2.set(true));
                        loop {
                            ctx.yield_frame().await;
                        }
                    });
                    let finished = s.world_ref().boss().unwrap().attacks[0].finished.clone();
                    finished.wait(&ctx).await;
                    w.set(true);
                })
            }),
        );
        boss_start_attack(&stage, 0);
        for _ in 0..12 {
            stage.tick();
        }
        assert!(wrapped_up.get());
        assert!(subtask_gone.get());
        // the attack list is exhausted, so the boss left with it
        assert!(stage.world_ref().boss().is_none());
    }

    #[test]
    fn test_enemy_fire_cannot_hurt_boss() {
        let stage = stage_with_boss();
        boss_add_attack(
            &stage,
            AttackKind::Normal,
            "n",
            600,
            100.0,
            0,
            Box::new(|ctx| Box::pin(async move { ctx.wait(Frame::MAX).await })),
        );
        boss_start_attack(&stage, 0);
        let result = damage_boss(
            &stage,
            DamageInfo { amount: 50.0, kind: DamageKind::EnemyShot },
        );
        assert_eq!(result, DamageResult::Immune);
    }
}
