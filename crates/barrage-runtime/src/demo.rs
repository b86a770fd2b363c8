//! The built-in demo stage: two fairy waves, a laser sweep, and a midboss
//! with a normal attack and a spellcard. Doubles as the reference for how
//! stage scripts drive the simulation.

use barrage_core::math::{carg, cdir};
use barrage_core::motion::MoveParams;
use barrage_core::color::rgba;
use glam::Vec2;

use barrage_sim::boss::{self, AttackKind};
use barrage_sim::enemy::{self, EnemyVisualRule};
use barrage_sim::entity::{DamageInfo, DamageKind, DrawLayer, EntityRef};
use barrage_sim::laser;
use barrage_sim::player::{self, ShotMode};
use barrage_sim::projectile::{self, protos, ProjArgs, ProjFlags, ProjKind};
use barrage_sim::render::SpriteCmd;
use barrage_sim::{Stage, StageOutcome, VIEWPORT_H, VIEWPORT_W};

pub const DEMO_STAGE_ID: u16 = 1;

/// Wire up the player, the shot task, and the stage-main task.
pub fn setup(stage: &Stage) {
    player::create_player(stage, standard_mode());
    spawn_shot_task(stage);
    stage_main(stage);
}

fn standard_mode() -> ShotMode {
    ShotMode {
        name: "standard",
        bomb: Some(Box::new(bomb_blast)),
        ..Default::default()
    }
}

/// The bomb: heavy damage to everything alive, plus a shockwave of
/// particles. Hazard clearing itself is handled by the player core.
fn bomb_blast(stage: &Stage) {
    let targets = stage.world_ref().enemy_refs();
    for r in targets {
        enemy::damage_enemy(
            stage,
            r,
            DamageInfo { amount: 500.0, kind: DamageKind::PlayerBomb },
        );
    }
    boss::damage_boss(
        stage,
        DamageInfo { amount: 500.0, kind: DamageKind::PlayerBomb },
    );

    let center = stage.player_pos().unwrap_or(Vec2::new(VIEWPORT_W / 2.0, VIEWPORT_H / 2.0));
    for i in 0..24 {
        let dir = cdir(i as f32 / 24.0 * std::f32::consts::TAU);
        projectile::create_particle(
            stage,
            ProjArgs {
                proto: protos::BLAST,
                pos: center,
                color: rgba(0.4, 0.6, 1.0, 1.0),
                movement: MoveParams::linear(8.0 * dir),
                timeout: 30,
                draw_rule: Some(projectile::draw_grow_fade(30, 1.0)),
                ..Default::default()
            },
        );
    }
}

/// Fires as long as the player holds the fire key. Side shots unlock with
/// power.
fn spawn_shot_task(stage: &Stage) {
    let s = stage.clone();
    stage.invoke(move |ctx| async move {
        let shoot = match s.world_ref().player() {
            Some(p) => p.events.shoot.clone(),
            None => return,
        };
        loop {
            if shoot.wait(&ctx).await.is_canceled() {
                return;
            }
            let (pos, power) = {
                let world = s.world_ref();
                match world.player() {
                    Some(p) => (p.pos, p.power),
                    None => return,
                }
            };

            let mut offsets = vec![-8.0f32, 8.0];
            if power >= 200 {
                offsets.push(-20.0);
                offsets.push(20.0);
            }
            for dx in offsets {
                projectile::create_projectile(
                    &s,
                    ProjArgs {
                        proto: protos::RICE,
                        pos: pos + Vec2::new(dx, -10.0),
                        color: rgba(0.9, 0.4, 0.4, 0.8),
                        kind: ProjKind::PlayerShot { damage: 30.0 },
                        movement: MoveParams::linear(Vec2::new(0.0, -14.0)),
                        flags: ProjFlags::NO_SPAWN_EFFECT,
                        ..Default::default()
                    },
                );
            }
            s.play_sfx("shot1");

            ctx.wait(4).await;
        }
    });
}

fn fairy_visual() -> EnemyVisualRule {
    Box::new(|enemy, age, render, stage| {
        if render {
            let pos = enemy.visual_pos(stage.frame());
            stage.push_sprite(
                SpriteCmd::new(DrawLayer::Enemy, "fairy_circle", pos)
                    .with_angle(stage.frame() as f32 * 0.17)
                    .with_color(rgba(1.0, 1.0, 1.0, enemy.alpha)),
            );
            let sprite = if !enemy.moving {
                "enemy/fairy"
            } else if enemy.facing_left {
                "enemy/fairy_left"
            } else {
                "enemy/fairy_right"
            };
            stage.push_sprite(
                SpriteCmd::new(DrawLayer::Enemy, sprite, pos)
                    .with_color(rgba(1.0, 1.0, 1.0, enemy.alpha)),
            );
        } else if age % 6 == 0 {
            let drift = stage.vrng().dir() * 0.6;
            projectile::create_particle(
                stage,
                ProjArgs {
                    proto: protos::SMOKE,
                    pos: enemy.pos,
                    color: rgba(0.2, 0.3, 0.5, 0.3),
                    movement: MoveParams::linear(drift),
                    timeout: 24,
                    draw_rule: Some(projectile::draw_fade(24)),
                    ..Default::default()
                },
            );
        }
    })
}

/// Aimed fan of bullets from `origin` toward the player.
fn fire_fan(stage: &Stage, origin: Vec2, count: i32, speed: f32) {
    let target = stage.player_pos().unwrap_or(origin + Vec2::Y);
    let aim = carg(target - origin);
    for i in 0..count {
        let spread = (i as f32 - (count - 1) as f32 / 2.0) * 0.12;
        projectile::create_projectile(
            stage,
            ProjArgs {
                proto: protos::BALL,
                pos: origin,
                color: rgba(0.3, 0.4, 1.0, 1.0),
                movement: MoveParams::linear(speed * cdir(aim + spread)),
                ..Default::default()
            },
        );
    }
    stage.play_sfx("shot2");
}

/// A fairy that swoops in, fires three aimed fans, then leaves upward.
/// Behavior is a task bound to the enemy; if the fairy dies mid-pattern the
/// task dies with it.
fn spawn_fairy(stage: &Stage, x: f32, hp: f32) -> EntityRef {
    let e = enemy::create_enemy(
        stage,
        Vec2::new(x, -20.0),
        hp,
        Some(fairy_visual()),
        None,
    );

    let s = stage.clone();
    stage.invoke(move |ctx| async move {
        ctx.bind(e);

        if let Some(enemy) = s.world_mut().enemy_mut(e) {
            enemy.movement =
                MoveParams::asymptotic(Vec2::new(0.0, 4.0), Vec2::ZERO, 0.96);
        }
        ctx.wait(60).await;

        for _ in 0..3 {
            let origin = match s.world_ref().enemy(e) {
                Some(enemy) => enemy.pos,
                None => return,
            };
            fire_fan(&s, origin, 5, 2.5);
            ctx.wait(30).await;
        }

        if let Some(enemy) = s.world_mut().enemy_mut(e) {
            enemy.movement =
                MoveParams::accelerated(Vec2::new(0.0, -0.5), Vec2::new(0.0, -0.15));
        }
    });

    e
}

/// A slow horizontal laser sweep across the upper half of the field.
fn laser_sweep(stage: &Stage, from_left: bool) {
    let x0 = if from_left { -40.0 } else { VIEWPORT_W + 40.0 };
    let dx = if from_left { 3.0 } else { -3.0 };
    laser::create_laser(
        stage,
        18.0,
        220,
        14.0,
        rgba(1.0, 0.3, 0.5, 1.0),
        Box::new(move |t| Vec2::new(x0 + dx * t, 120.0 + (t * 0.05).sin() * 60.0)),
    );
    stage.play_sfx("laser1");
}

fn midboss(stage: &Stage) -> EntityRef {
    let b = boss::create_boss(
        stage,
        "Cirno",
        "boss/cirno",
        Vec2::new(VIEWPORT_W / 2.0, -40.0),
    );

    // move-in phase
    let s = stage.clone();
    boss::boss_add_attack(
        stage,
        AttackKind::Move,
        "entrance",
        90,
        0.0,
        0,
        Box::new(move |ctx| {
            Box::pin(async move {
                if let Some(boss) = s.world_mut().boss_mut() {
                    boss.movement = MoveParams::towards(
                        Vec2::new(VIEWPORT_W / 2.0, 120.0),
                        0.02,
                    )
                    .with_retention(0.8);
                }
                let finished = match s.world_ref().boss() {
                    Some(boss) => boss.attacks[0].finished.clone(),
                    None => return,
                };
                finished.wait(&ctx).await;
                if let Some(boss) = s.world_mut().boss_mut() {
                    boss.movement = MoveParams::default();
                }
            })
        }),
    );

    // normal: rings of bullets
    let s = stage.clone();
    boss::boss_add_attack(
        stage,
        AttackKind::Normal,
        "icicle rings",
        900,
        1500.0,
        0,
        Box::new(move |ctx| {
            Box::pin(async move {
                let finished = match s.world_ref().boss() {
                    Some(boss) => boss.attacks[1].finished.clone(),
                    None => return,
                };

                let sp = s.clone();
                ctx.invoke_subtask(move |ctx| async move {
                    loop {
                        let origin = match sp.world_ref().boss() {
                            Some(boss) => boss.pos,
                            None => return,
                        };
                        let n = 16;
                        let phase = sp.rng().angle();
                        for i in 0..n {
                            let dir = cdir(phase + i as f32 / n as f32 * std::f32::consts::TAU);
                            projectile::create_projectile(
                                &sp,
                                ProjArgs {
                                    proto: protos::CRYSTAL,
                                    pos: origin,
                                    color: rgba(0.4, 0.7, 1.0, 1.0),
                                    movement: MoveParams::asymptotic(
                                        dir * 4.0,
                                        dir * 0.02,
                                        0.97,
                                    ),
                                    ..Default::default()
                                },
                            );
                        }
                        sp.play_sfx("shot_special1");
                        ctx.wait(40).await;
                    }
                });

                finished.wait(&ctx).await;
            })
        }),
    );

    // spellcard: converging spiral
    let s = stage.clone();
    boss::boss_add_attack(
        stage,
        AttackKind::Spell,
        "Freeze Sign \"Perfect Glacialist\"",
        1200,
        2500.0,
        500_000,
        Box::new(move |ctx| {
            Box::pin(async move {
                let finished = match s.world_ref().boss() {
                    Some(boss) => boss.attacks[2].finished.clone(),
                    None => return,
                };

                let sp = s.clone();
                ctx.invoke_subtask(move |ctx| async move {
                    let mut phase = 0.0f32;
                    loop {
                        let origin = match sp.world_ref().boss() {
                            Some(boss) => boss.pos,
                            None => return,
                        };
                        for arm in 0..4 {
                            let dir =
                                cdir(phase + arm as f32 / 4.0 * std::f32::consts::TAU);
                            projectile::create_projectile(
                                &sp,
                                ProjArgs {
                                    proto: protos::BULLET,
                                    pos: origin,
                                    color: rgba(0.7, 0.9, 1.0, 1.0),
                                    movement: MoveParams {
                                        velocity: dir * 3.0,
                                        attraction: 0.0004,
                                        attraction_point: Vec2::new(
                                            VIEWPORT_W / 2.0,
                                            VIEWPORT_H * 0.7,
                                        ),
                                        ..Default::default()
                                    },
                                    ..Default::default()
                                },
                            );
                        }
                        phase += 0.23;
                        ctx.wait(6).await;
                    }
                });

                finished.wait(&ctx).await;
            })
        }),
    );

    boss::boss_start_attack(stage, 0);
    b
}

/// The stage-main task.
fn stage_main(stage: &Stage) {
    let s = stage.clone();
    stage.invoke(move |ctx| async move {
        ctx.wait(60).await;

        // wave 1: four fairies marching in
        for i in 0..4 {
            spawn_fairy(&s, 90.0 + 100.0 * i as f32, 120.0);
            ctx.wait(30).await;
        }
        ctx.wait(180).await;

        // wave 2: crossing laser sweeps with escort fairies
        laser_sweep(&s, true);
        spawn_fairy(&s, 120.0, 160.0);
        ctx.wait(120).await;
        laser_sweep(&s, false);
        spawn_fairy(&s, VIEWPORT_W - 120.0, 160.0);
        ctx.wait(240).await;

        // midboss fight; the script resumes when she falls
        midboss(&s);
        let defeated = match s.world_ref().boss() {
            Some(boss) => boss.defeated.clone(),
            None => return,
        };
        if defeated.wait(&ctx).await.is_canceled() {
            return;
        }

        ctx.wait(120).await;
        s.finish(StageOutcome::Win);
    });
}
