use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Stable particle identifier with generation tracking to prevent stale references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ParticleHandle {
    index: u32,
    generation: u32,
}

impl ParticleHandle {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for ParticleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Generational arena that hands out stable handles while preventing use-after-free.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    items: Vec<Option<T>>,
    generations: Vec<u32>,
    free_list: VecDeque<usize>,
    live: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            generations: Vec::new(),
            free_list: VecDeque::new(),
            live: 0,
        }
    }

    pub fn insert(&mut self, item: T) -> ParticleHandle {
        self.live += 1;
        if let Some(index) = self.free_list.pop_front() {
            let generation = self.generations[index];
            self.items[index] = Some(item);
            return ParticleHandle::new(index as u32, generation);
        }

        let index = self.items.len();
        self.items.push(Some(item));
        self.generations.push(0);
        ParticleHandle::new(index as u32, 0)
    }

    pub fn get(&self, handle: ParticleHandle) -> Option<&T> {
        if self.is_valid(handle) {
            self.items.get(handle.index()).and_then(|slot| slot.as_ref())
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, handle: ParticleHandle) -> Option<&mut T> {
        if self.is_valid(handle) {
            self.items
                .get_mut(handle.index())
                .and_then(|slot| slot.as_mut())
        } else {
            None
        }
    }

    pub fn remove(&mut self, handle: ParticleHandle) -> Option<T> {
        if !self.is_valid(handle) {
            return None;
        }
        let index = handle.index();
        let taken = self.items[index].take();
        if taken.is_some() {
            self.generations[index] = self.generations[index].wrapping_add(1);
            self.free_list.push_back(index);
            self.live -= 1;
        }
        taken
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParticleHandle, &T)> + '_ {
        self.items.iter().enumerate().filter_map(move |(index, slot)| {
            slot.as_ref()
                .map(|item| (ParticleHandle::new(index as u32, self.generations[index]), item))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ParticleHandle, &mut T)> + '_ {
        let generations = &self.generations;
        self.items
            .iter_mut()
            .enumerate()
            .filter_map(move |(index, slot)| {
                slot.as_mut()
                    .map(|item| (ParticleHandle::new(index as u32, generations[index]), item))
            })
    }

    pub fn handles(&self) -> impl Iterator<Item = ParticleHandle> + '_ {
        self.iter().map(|(handle, _)| handle)
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn contains(&self, handle: ParticleHandle) -> bool {
        self.get(handle).is_some()
    }

    fn is_valid(&self, handle: ParticleHandle) -> bool {
        self.generations
            .get(handle.index())
            .copied()
            .map(|gen| gen == handle.generation())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_handles_go_stale() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        assert_eq!(arena.remove(a), Some(1));
        assert!(arena.get(a).is_none());

        let c = arena.insert(3);
        assert_eq!(c.index(), a.index());
        assert_ne!(c.generation(), a.generation());
        assert_eq!(arena.get(c), Some(&3));
        assert_eq!(arena.get(b), Some(&2));
        assert_eq!(arena.len(), 2);
    }
}
