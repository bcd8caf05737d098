use serde::{Deserialize, Serialize};

use crate::action::Action;

/// Feature vector describing the arena from the controlled agent's perspective.
pub type Observation = Vec<f32>;

/// Position or velocity in arena units.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn distance(self, other: Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Result of a single environment tick.
#[derive(Clone, Debug, PartialEq)]
pub struct StepOutcome {
    pub reward: f32,
    pub done: bool,
    pub observation: Observation,
}

/// One recorded `(s, a, r, s', done)` tuple.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub observation: Observation,
    pub action: Action,
    pub reward: f32,
    pub next_observation: Observation,
    pub done: bool,
}

/// How an episode ended.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeOutcome {
    /// The controlled agent knocked out its opponent.
    Victory,
    /// The controlled agent ran out of health.
    Defeat,
    /// The controlled agent collided with a hazard.
    Hit,
    /// No terminal state was reached (step cap or stop request).
    Truncated,
}

/// Agent that fired a projectile.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Owner {
    Controlled,
    Opponent,
}

/// Moving projectile or hazard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    pub position: Point,
    pub velocity: Point,
    pub owner: Owner,
}

impl Projectile {
    #[inline]
    pub fn advance(&mut self) {
        self.position.x += self.velocity.x;
        self.position.y += self.velocity.y;
    }
}
