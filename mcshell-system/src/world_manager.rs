use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::world::World;

/// Owns the worlds of a simulation and hands out random ones to moves.
///
/// Worlds are addressed by index; the index doubles as the world id used by
/// per-world forcefield cutoff lists.
pub struct WorldManager {
    worlds: Vec<World>,
    rng: SmallRng,
}

impl WorldManager {
    pub fn new(seed: u64) -> WorldManager {
        WorldManager {
            worlds: Vec::new(),
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Adds a world; its id is set to its index in this manager.
    pub fn add_world(&mut self, mut world: World) {
        world.set_id(self.worlds.len());
        self.worlds.push(world);
    }

    pub fn world_count(&self) -> usize {
        self.worlds.len()
    }

    pub fn world(&self, i: usize) -> &World {
        &self.worlds[i]
    }

    pub fn world_mut(&mut self, i: usize) -> &mut World {
        &mut self.worlds[i]
    }

    pub fn worlds(&self) -> &[World] {
        &self.worlds
    }

    pub fn worlds_mut(&mut self) -> &mut [World] {
        &mut self.worlds
    }

    /// Index of a uniformly drawn world; `None` when no worlds are registered.
    pub fn random_world(&mut self) -> Option<usize> {
        if self.worlds.is_empty() {
            return None;
        }
        Some(self.rng.gen_range(0..self.worlds.len()))
    }

    /// Two distinct world indices; `None` when fewer than two worlds exist.
    pub fn random_world_pair(&mut self) -> Option<(usize, usize)> {
        if self.worlds.len() < 2 {
            return None;
        }
        let first = self.rng.gen_range(0..self.worlds.len());
        let mut second = self.rng.gen_range(0..self.worlds.len());
        while second == first {
            second = self.rng.gen_range(0..self.worlds.len());
        }
        Some((first, second))
    }

    /// Mutable access to two distinct worlds at once.
    pub fn pair_mut(&mut self, i: usize, j: usize) -> (&mut World, &mut World) {
        assert_ne!(i, j, "world pair indices must differ");
        if i < j {
            let (left, right) = self.worlds.split_at_mut(j);
            (&mut left[i], &mut right[0])
        } else {
            let (left, right) = self.worlds.split_at_mut(i);
            (&mut right[0], &mut left[j])
        }
    }
}
