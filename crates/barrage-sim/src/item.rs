//! Pickup items: spawn, drift, magnet, collection.

use barrage_core::motion::MoveParams;
use barrage_core::Frame;
use glam::Vec2;

use crate::entity::EntityRef;
use crate::player;
use crate::stage::{Stage, VIEWPORT_H};

/// Distance at which an item is picked up.
const COLLECT_RADIUS: f32 = 15.0;

/// Magnet radius while the player holds focus.
const FOCUS_MAGNET_RADIUS: f32 = 100.0;

/// Items anywhere on screen home to the player above this line.
const POC_LINE: f32 = VIEWPORT_H / 4.0;

/// Pickup value range; scales the score-bearing pickups.
pub const ITEM_MIN_VALUE: f32 = 0.1;
pub const ITEM_MAX_VALUE: f32 = 1.0;

/// From least to most important; also the draw order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ItemKind {
    Piv,
    Points,
    PowerMini,
    Power,
    Surge,
    Voltage,
    BombFragment,
    LifeFragment,
    Bomb,
    Life,
}

impl ItemKind {
    pub fn sprite(&self) -> &'static str {
        match self {
            ItemKind::Piv => "item/piv",
            ItemKind::Points => "item/point",
            ItemKind::PowerMini => "item/minipower",
            ItemKind::Power => "item/power",
            ItemKind::Surge => "item/surge",
            ItemKind::Voltage => "item/voltage",
            ItemKind::BombFragment => "item/bombfrag",
            ItemKind::LifeFragment => "item/lifefrag",
            ItemKind::Bomb => "item/bomb",
            ItemKind::Life => "item/life",
        }
    }
}

pub struct Item {
    pub ent: EntityRef,
    pub kind: ItemKind,
    pub value: f32,
    pub pos: Vec2,
    pub birthtime: Frame,
    pub movement: MoveParams,
    pub auto_collect: bool,
}

impl Item {
    pub fn new(pos: Vec2, kind: ItemKind) -> Self {
        Self {
            ent: EntityRef::NULL,
            kind,
            value: 1.0,
            pos,
            birthtime: 0,
            // brief upward pop, then a capped fall
            movement: MoveParams::asymptotic(
                Vec2::new(0.0, -2.5),
                Vec2::new(0.0, 0.05),
                0.98,
            ),
            auto_collect: false,
        }
    }
}

pub fn create_item(stage: &Stage, pos: Vec2, velocity: Vec2, kind: ItemKind) -> EntityRef {
    debug_assert!(!stage.in_draw(), "item spawned from draw code");
    let mut item = Item::new(pos, kind);
    item.birthtime = stage.frame();
    item.movement.velocity = velocity;
    stage.world_mut().spawn_item(item)
}

/// Drop an item with a small random sideways pop.
pub fn spawn_item(stage: &Stage, pos: Vec2, kind: ItemKind) -> EntityRef {
    let vx = stage.rng().sreal() * 1.0;
    create_item(stage, pos, Vec2::new(vx, -2.5), kind)
}

/// Spawn an item that immediately homes to the player.
pub fn spawn_and_collect_item(stage: &Stage, pos: Vec2, kind: ItemKind, value: f32) -> EntityRef {
    let r = spawn_item(stage, pos, kind);
    if let Some(item) = stage.world_mut().item_mut(r) {
        item.auto_collect = true;
        item.value = value;
    }
    r
}

/// Send every item on screen to the player (full collect, e.g. on a bomb).
pub fn collect_all_items(stage: &Stage, value: f32) {
    let mut world = stage.world_mut();
    for item in world.items_mut() {
        item.auto_collect = true;
        item.value = item.value.max(value);
    }
}

fn collect(stage: &Stage, item: &Item) {
    match item.kind {
        ItemKind::Piv => {
            let mut stats = stage.stats_mut();
            stats.piv += 1;
            stats.points += 10;
        }
        ItemKind::Points => {
            let piv = stage.stats().piv as u64;
            let value = item.value.clamp(ITEM_MIN_VALUE, ITEM_MAX_VALUE);
            stage.add_points(((100 + piv) as f32 * value) as u64);
        }
        ItemKind::Power => player::add_power(stage, 30),
        ItemKind::PowerMini => player::add_power(stage, 10),
        ItemKind::Surge => stage.add_points(500),
        ItemKind::Voltage => {
            let mut world = stage.world_mut();
            if let Some(player) = world.player_mut() {
                player.voltage += 1;
            }
        }
        ItemKind::Bomb => {
            let mut world = stage.world_mut();
            if let Some(player) = world.player_mut() {
                player.bombs += 1;
            }
        }
        ItemKind::BombFragment => {
            let mut world = stage.world_mut();
            if let Some(player) = world.player_mut() {
                player.bomb_fragments += 1;
                if player.bomb_fragments >= player::BOMB_FRAGMENTS_PER_BOMB {
                    player.bomb_fragments = 0;
                    player.bombs += 1;
                }
            }
        }
        ItemKind::Life => {
            let mut world = stage.world_mut();
            if let Some(player) = world.player_mut() {
                player.lives += 1;
            }
        }
        ItemKind::LifeFragment => {
            let mut world = stage.world_mut();
            if let Some(player) = world.player_mut() {
                player.life_fragments += 1;
                if player.life_fragments >= player::LIFE_FRAGMENTS_PER_LIFE {
                    player.life_fragments = 0;
                    player.lives += 1;
                }
            }
        }
    }
    stage.play_sfx("item");
}

pub fn process_items(stage: &Stage) {
    let refs = stage.world_ref().item_refs();
    let player_pos = stage.player_pos();
    let focused = player::is_focused(stage);

    for r in refs {
        let mut item = match stage.world_mut().take_item(r) {
            Some(item) => item,
            None => continue,
        };

        if let Some(player_pos) = player_pos {
            let magnet = item.auto_collect
                || player_pos.y < POC_LINE
                || (focused && player_pos.distance(item.pos) < FOCUS_MAGNET_RADIUS);
            if magnet {
                item.movement.attraction = 0.05;
                item.movement.attraction_point = player_pos;
                item.movement.retention = 0.8;
                item.movement.acceleration = Vec2::ZERO;
            }
        }

        item.movement.update(&mut item.pos);

        if let Some(player_pos) = player_pos {
            if player_pos.distance(item.pos) < COLLECT_RADIUS {
                collect(stage, &item);
                stage.world_mut().despawn(r);
                continue;
            }
        }

        if item.pos.y > VIEWPORT_H + 40.0 {
            stage.world_mut().despawn(r);
            continue;
        }

        stage.world_mut().put_back_item(r, item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::{self, ShotMode};
    use crate::stage::InputFlags;

    fn test_stage() -> Stage {
        let stage = Stage::new(11);
        player::create_player(&stage, ShotMode::default());
        stage
    }

    #[test]
    fn test_power_item_collected_on_contact() {
        let stage = test_stage();
        let pos = stage.player_pos().unwrap();
        create_item(&stage, pos, Vec2::ZERO, ItemKind::Power);
        stage.tick();
        assert_eq!(stage.world_ref().item_count(), 0);
        assert_eq!(stage.world_ref().player().unwrap().power, 30);
    }

    #[test]
    fn test_item_falls_off_the_bottom() {
        let stage = test_stage();
        let r = create_item(
            &stage,
            Vec2::new(60.0, VIEWPORT_H + 38.0),
            Vec2::new(0.0, 2.0),
            ItemKind::Points,
        );
        stage.tick();
        stage.tick();
        assert!(stage.world_ref().item(r).is_none());
    }

    #[test]
    fn test_focus_magnet_attracts_items() {
        let stage = test_stage();
        let pos = stage.player_pos().unwrap() + Vec2::new(0.0, -80.0);
        let r = create_item(&stage, pos, Vec2::ZERO, ItemKind::Points);
        let start_dist = stage
            .player_pos()
            .unwrap()
            .distance(stage.world_ref().item(r).unwrap().pos);

        for _ in 0..20 {
            stage.set_input(InputFlags::FOCUS);
            stage.tick();
        }
        // either collected by now, or measurably closer
        let world = stage.world_ref();
        if let Some(item) = world.item(r) {
            assert!(stage.player_pos().unwrap().distance(item.pos) < start_dist);
        }
    }

    #[test]
    fn test_auto_collect_reaches_player() {
        let stage = test_stage();
        let pos = stage.player_pos().unwrap() + Vec2::new(100.0, -200.0);
        spawn_and_collect_item(&stage, pos, ItemKind::Voltage, 1.0);
        for _ in 0..240 {
            stage.tick();
        }
        assert_eq!(stage.world_ref().item_count(), 0);
        assert_eq!(stage.world_ref().player().unwrap().voltage, 1);
    }

    #[test]
    fn test_fragments_roll_over() {
        let stage = test_stage();
        {
            let mut world = stage.world_mut();
            let plr = world.player_mut().unwrap();
            plr.bomb_fragments = player::BOMB_FRAGMENTS_PER_BOMB - 1;
        }
        let pos = stage.player_pos().unwrap();
        create_item(&stage, pos, Vec2::ZERO, ItemKind::BombFragment);
        stage.tick();
        let world = stage.world_ref();
        let plr = world.player().unwrap();
        assert_eq!(plr.bomb_fragments, 0);
        assert_eq!(plr.bombs, player::PLR_START_BOMBS + 1);
    }
}
