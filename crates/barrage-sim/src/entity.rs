//! Entity registry, boxed handles, and the simulation world.
//!
//! Every live entity occupies a registry slot identified by `(index,
//! generation)`. A [`EntityRef`] is the only reference a task may hold
//! across suspension points: resolving it yields the entity only while the
//! slot still carries the same generation. Generations increase on every
//! release, so a recycled slot can never satisfy a stale handle.

use crate::boss::Boss;
use crate::enemy::Enemy;
use crate::item::Item;
use crate::laser::Laser;
use crate::player::Player;
use crate::pool::Pool;
use crate::projectile::Projectile;

/// Generation-tagged weak reference to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityRef {
    index: u32,
    gen: u32,
}

impl EntityRef {
    pub const NULL: EntityRef = EntityRef { index: u32::MAX, gen: 0 };

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

/// What a registry slot currently holds: the entity class plus its index in
/// the class pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Projectile(u32),
    Enemy(u32),
    Item(u32),
    Laser(u32),
    Player,
    Boss,
}

struct RegSlot {
    gen: u32,
    kind: Option<EntityKind>,
}

/// Maps live entities to `(index, generation)` slots.
#[derive(Default)]
pub struct Registry {
    slots: Vec<RegSlot>,
    free: Vec<u32>,
}

impl Registry {
    pub fn register(&mut self, kind: EntityKind) -> EntityRef {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.kind = Some(kind);
            return EntityRef { index, gen: slot.gen };
        }
        let index = self.slots.len() as u32;
        self.slots.push(RegSlot { gen: 1, kind: Some(kind) });
        EntityRef { index, gen: 1 }
    }

    /// Release a slot. The generation is bumped here, which is what
    /// invalidates every outstanding handle to the entity.
    pub fn unregister(&mut self, r: EntityRef) -> Option<EntityKind> {
        let slot = self.slots.get_mut(r.index as usize)?;
        if slot.gen != r.gen {
            return None;
        }
        let kind = slot.kind.take()?;
        slot.gen = slot.gen.wrapping_add(1);
        self.free.push(r.index);
        Some(kind)
    }

    /// Resolve a handle. Returns `None` ("gone") for anything stale.
    pub fn lookup(&self, r: EntityRef) -> Option<EntityKind> {
        let slot = self.slots.get(r.index as usize)?;
        if slot.gen != r.gen {
            return None;
        }
        slot.kind
    }

    pub fn generation_of_slot(&self, index: u32) -> Option<u32> {
        self.slots.get(index as usize).map(|s| s.gen)
    }
}

/// Result of a logic rule: keep going, or destroy the entity this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    Destroy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageKind {
    PlayerShot,
    PlayerBomb,
    PlayerDischarge,
    EnemyShot,
    EnemyCollision,
}

impl DamageKind {
    /// Enemy-originated damage never hurts other enemies.
    pub fn is_enemy_source(self) -> bool {
        matches!(self, DamageKind::EnemyShot | DamageKind::EnemyCollision)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DamageInfo {
    pub amount: f32,
    pub kind: DamageKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageResult {
    Applied,
    Immune,
}

/// Render ordering, back to front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DrawLayer {
    Background,
    Item,
    PlayerShot,
    Player,
    Enemy,
    Boss,
    EnemyShot,
    Laser,
    Particle,
    Overlay,
}

/// All entity storage of one stage: the registry plus per-class pools.
/// Projectiles dominate the churn, hence the capacity split.
pub struct World {
    registry: Registry,
    projectiles: Pool<Projectile>,
    enemies: Pool<Enemy>,
    items: Pool<Item>,
    lasers: Pool<Laser>,
    player: Option<Player>,
    player_ref: Option<EntityRef>,
    boss: Option<Boss>,
    boss_ref: Option<EntityRef>,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self {
            registry: Registry::default(),
            projectiles: Pool::with_capacity(2048),
            enemies: Pool::with_capacity(64),
            items: Pool::with_capacity(256),
            lasers: Pool::with_capacity(64),
            player: None,
            player_ref: None,
            boss: None,
            boss_ref: None,
        }
    }

    pub fn contains(&self, r: EntityRef) -> bool {
        self.registry.lookup(r).is_some()
    }

    pub fn lookup(&self, r: EntityRef) -> Option<EntityKind> {
        self.registry.lookup(r)
    }

    pub fn despawn(&mut self, r: EntityRef) -> bool {
        match self.registry.unregister(r) {
            Some(EntityKind::Projectile(i)) => {
                self.projectiles.release(i);
                true
            }
            Some(EntityKind::Enemy(i)) => {
                self.enemies.release(i);
                true
            }
            Some(EntityKind::Item(i)) => {
                self.items.release(i);
                true
            }
            Some(EntityKind::Laser(i)) => {
                self.lasers.release(i);
                true
            }
            Some(EntityKind::Player) => {
                self.player = None;
                self.player_ref = None;
                true
            }
            Some(EntityKind::Boss) => {
                self.boss = None;
                self.boss_ref = None;
                true
            }
            None => false,
        }
    }

    // --- projectiles ---

    pub fn spawn_projectile(&mut self, projectile: Projectile) -> EntityRef {
        let index = self.projectiles.acquire(projectile);
        let r = self.registry.register(EntityKind::Projectile(index));
        self.projectiles.get_mut(index).unwrap().ent = r;
        r
    }

    pub fn projectile(&self, r: EntityRef) -> Option<&Projectile> {
        match self.registry.lookup(r)? {
            EntityKind::Projectile(i) => self.projectiles.get(i),
            _ => None,
        }
    }

    pub fn projectile_mut(&mut self, r: EntityRef) -> Option<&mut Projectile> {
        match self.registry.lookup(r)? {
            EntityKind::Projectile(i) => self.projectiles.get_mut(i),
            _ => None,
        }
    }

    pub fn take_projectile(&mut self, r: EntityRef) -> Option<Projectile> {
        match self.registry.lookup(r)? {
            EntityKind::Projectile(i) => self.projectiles.take(i),
            _ => None,
        }
    }

    pub fn put_back_projectile(&mut self, r: EntityRef, projectile: Projectile) {
        if let Some(EntityKind::Projectile(i)) = self.registry.lookup(r) {
            self.projectiles.put_back(i, projectile);
        }
    }

    pub fn projectile_refs(&self) -> Vec<EntityRef> {
        self.projectiles.iter().map(|(_, p)| p.ent).collect()
    }

    pub fn projectiles(&self) -> impl Iterator<Item = &Projectile> {
        self.projectiles.iter().map(|(_, p)| p)
    }

    pub fn projectiles_mut(&mut self) -> impl Iterator<Item = &mut Projectile> {
        self.projectiles.iter_mut().map(|(_, p)| p)
    }

    pub fn projectile_count(&self) -> usize {
        self.projectiles.len()
    }

    // --- enemies ---

    pub fn spawn_enemy(&mut self, enemy: Enemy) -> EntityRef {
        let index = self.enemies.acquire(enemy);
        let r = self.registry.register(EntityKind::Enemy(index));
        self.enemies.get_mut(index).unwrap().ent = r;
        r
    }

    pub fn enemy(&self, r: EntityRef) -> Option<&Enemy> {
        match self.registry.lookup(r)? {
            EntityKind::Enemy(i) => self.enemies.get(i),
            _ => None,
        }
    }

    pub fn enemy_mut(&mut self, r: EntityRef) -> Option<&mut Enemy> {
        match self.registry.lookup(r)? {
            EntityKind::Enemy(i) => self.enemies.get_mut(i),
            _ => None,
        }
    }

    pub fn take_enemy(&mut self, r: EntityRef) -> Option<Enemy> {
        match self.registry.lookup(r)? {
            EntityKind::Enemy(i) => self.enemies.take(i),
            _ => None,
        }
    }

    pub fn put_back_enemy(&mut self, r: EntityRef, enemy: Enemy) {
        if let Some(EntityKind::Enemy(i)) = self.registry.lookup(r) {
            self.enemies.put_back(i, enemy);
        }
    }

    pub fn enemy_refs(&self) -> Vec<EntityRef> {
        self.enemies.iter().map(|(_, e)| e.ent).collect()
    }

    pub fn enemies(&self) -> impl Iterator<Item = &Enemy> {
        self.enemies.iter().map(|(_, e)| e)
    }

    pub fn enemies_mut(&mut self) -> impl Iterator<Item = &mut Enemy> {
        self.enemies.iter_mut().map(|(_, e)| e)
    }

    pub fn enemy_count(&self) -> usize {
        self.enemies.len()
    }

    // --- items ---

    pub fn spawn_item(&mut self, item: Item) -> EntityRef {
        let index = self.items.acquire(item);
        let r = self.registry.register(EntityKind::Item(index));
        self.items.get_mut(index).unwrap().ent = r;
        r
    }

    pub fn item(&self, r: EntityRef) -> Option<&Item> {
        match self.registry.lookup(r)? {
            EntityKind::Item(i) => self.items.get(i),
            _ => None,
        }
    }

    pub fn item_mut(&mut self, r: EntityRef) -> Option<&mut Item> {
        match self.registry.lookup(r)? {
            EntityKind::Item(i) => self.items.get_mut(i),
            _ => None,
        }
    }

    pub fn take_item(&mut self, r: EntityRef) -> Option<Item> {
        match self.registry.lookup(r)? {
            EntityKind::Item(i) => self.items.take(i),
            _ => None,
        }
    }

    pub fn put_back_item(&mut self, r: EntityRef, item: Item) {
        if let Some(EntityKind::Item(i)) = self.registry.lookup(r) {
            self.items.put_back(i, item);
        }
    }

    pub fn item_refs(&self) -> Vec<EntityRef> {
        self.items.iter().map(|(_, it)| it.ent).collect()
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().map(|(_, it)| it)
    }

    pub fn items_mut(&mut self) -> impl Iterator<Item = &mut Item> {
        self.items.iter_mut().map(|(_, it)| it)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    // --- lasers ---

    pub fn spawn_laser(&mut self, laser: Laser) -> EntityRef {
        let index = self.lasers.acquire(laser);
        let r = self.registry.register(EntityKind::Laser(index));
        self.lasers.get_mut(index).unwrap().ent = r;
        r
    }

    pub fn laser(&self, r: EntityRef) -> Option<&Laser> {
        match self.registry.lookup(r)? {
            EntityKind::Laser(i) => self.lasers.get(i),
            _ => None,
        }
    }

    pub fn laser_mut(&mut self, r: EntityRef) -> Option<&mut Laser> {
        match self.registry.lookup(r)? {
            EntityKind::Laser(i) => self.lasers.get_mut(i),
            _ => None,
        }
    }

    pub fn laser_refs(&self) -> Vec<EntityRef> {
        self.lasers.iter().map(|(_, l)| l.ent).collect()
    }

    pub fn lasers(&self) -> impl Iterator<Item = &Laser> {
        self.lasers.iter().map(|(_, l)| l)
    }

    pub fn laser_count(&self) -> usize {
        self.lasers.len()
    }

    // --- player (singleton) ---

    pub fn spawn_player(&mut self, mut player: Player) -> EntityRef {
        debug_assert!(self.player.is_none(), "player already spawned");
        let r = self.registry.register(EntityKind::Player);
        player.ent = r;
        self.player = Some(player);
        self.player_ref = Some(r);
        r
    }

    pub fn player(&self) -> Option<&Player> {
        self.player.as_ref()
    }

    pub fn player_mut(&mut self) -> Option<&mut Player> {
        self.player.as_mut()
    }

    pub fn player_ref(&self) -> Option<EntityRef> {
        self.player_ref
    }

    // --- boss (singleton) ---

    pub fn spawn_boss(&mut self, mut boss: Boss) -> EntityRef {
        debug_assert!(self.boss.is_none(), "boss already spawned");
        let r = self.registry.register(EntityKind::Boss);
        boss.ent = r;
        self.boss = Some(boss);
        self.boss_ref = Some(r);
        r
    }

    pub fn boss(&self) -> Option<&Boss> {
        self.boss.as_ref()
    }

    pub fn boss_mut(&mut self) -> Option<&mut Boss> {
        self.boss.as_mut()
    }

    pub fn boss_ref(&self) -> Option<EntityRef> {
        self.boss_ref
    }

    /// Despawn everything. Registry generations survive, so handles into the
    /// previous stage stay dead.
    pub fn clear(&mut self) {
        for r in self.projectile_refs() {
            self.despawn(r);
        }
        for r in self.enemy_refs() {
            self.despawn(r);
        }
        for r in self.item_refs() {
            self.despawn(r);
        }
        for r in self.laser_refs() {
            self.despawn(r);
        }
        if let Some(r) = self.player_ref {
            self.despawn(r);
        }
        if let Some(r) = self.boss_ref {
            self.despawn(r);
        }
    }
}
