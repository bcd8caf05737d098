use std::collections::VecDeque;

use rand::Rng;

use crate::state::Transition;

/// Fixed-capacity FIFO of past transitions.
#[derive(Clone, Debug)]
pub struct ReplayBuffer {
    capacity: usize,
    items: VecDeque<Transition>,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends `transition`, evicting the oldest entry once full.
    pub fn push(&mut self, transition: Transition) {
        if self.capacity == 0 {
            return;
        }
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(transition);
    }

    /// Draws `count` transitions uniformly with replacement. Empty when the
    /// buffer holds fewer than `count` entries.
    pub fn sample<R: Rng>(&self, count: usize, rng: &mut R) -> Vec<&Transition> {
        if count == 0 || self.items.len() < count {
            return Vec::new();
        }
        (0..count)
            .map(|_| &self.items[rng.gen_range(0..self.items.len())])
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.items.iter()
    }
}
