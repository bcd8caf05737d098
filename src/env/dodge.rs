use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::action::{Action, DodgeAction};
use crate::config::DodgeConfig;
use crate::state::{EpisodeOutcome, Observation, Owner, Point, Projectile, StepOutcome};

use super::Environment;

pub const DODGE_FEATURES: usize = 4;

const FULL_HEALTH: f32 = 100.0;

pub struct DodgeArenaBuilder {
    config: DodgeConfig,
    seed: Option<u64>,
    start: Option<Point>,
    hazards: Vec<Projectile>,
}

impl DodgeArenaBuilder {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_start(mut self, start: Point) -> Self {
        self.start = Some(start);
        self
    }

    /// Hazards placed in the arena on every reset, before any spawning.
    pub fn with_hazards(mut self, hazards: Vec<Projectile>) -> Self {
        self.hazards = hazards;
        self
    }

    pub fn build(self) -> DodgeArena {
        let DodgeArenaBuilder {
            config,
            seed,
            start,
            hazards,
        } = self;
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let start = start.unwrap_or(Point::new(config.width / 2.0, config.height / 2.0));
        let mut arena = DodgeArena {
            position: start,
            velocity: Point::default(),
            health: FULL_HEALTH,
            hazards: Vec::new(),
            frame: 0,
            done: false,
            outcome: EpisodeOutcome::Truncated,
            start,
            initial_hazards: hazards,
            config,
            rng,
        };
        arena.reset();
        arena
    }
}

/// Single agent dodging hazards that stream in from the arena edges.
pub struct DodgeArena {
    config: DodgeConfig,
    position: Point,
    velocity: Point,
    health: f32,
    hazards: Vec<Projectile>,
    frame: u64,
    done: bool,
    outcome: EpisodeOutcome,
    start: Point,
    initial_hazards: Vec<Projectile>,
    rng: StdRng,
}

impl DodgeArena {
    pub fn new(config: DodgeConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: DodgeConfig) -> DodgeArenaBuilder {
        DodgeArenaBuilder {
            config,
            seed: None,
            start: None,
            hazards: Vec::new(),
        }
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn hazards(&self) -> &[Projectile] {
        &self.hazards
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    fn nearest_hazard(&self) -> Option<(&Projectile, f32)> {
        self.hazards
            .iter()
            .map(|hazard| (hazard, hazard.position.distance(self.position)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    fn spawn_hazard(&mut self) {
        let config = &self.config;
        let rng = &mut self.rng;
        let inward = config.hazard_min_speed + rng.gen_range(0.0f32..1.0) * config.hazard_speed_jitter;
        let lateral = (rng.gen_range(0.0f32..1.0) - 0.5) * config.hazard_lateral_span;
        let (position, velocity) = match rng.gen_range(0..4) {
            0 => (
                Point::new(rng.gen_range(0.0f32..1.0) * config.width, 0.0),
                Point::new(lateral, inward),
            ),
            1 => (
                Point::new(rng.gen_range(0.0f32..1.0) * config.width, config.height),
                Point::new(lateral, -inward),
            ),
            2 => (
                Point::new(0.0, rng.gen_range(0.0f32..1.0) * config.height),
                Point::new(inward, lateral),
            ),
            _ => (
                Point::new(config.width, rng.gen_range(0.0f32..1.0) * config.height),
                Point::new(-inward, lateral),
            ),
        };
        self.hazards.push(Projectile {
            position,
            velocity,
            owner: Owner::Opponent,
        });
    }
}

impl Environment for DodgeArena {
    fn reset(&mut self) -> Observation {
        self.position = self.start;
        self.velocity = Point::default();
        self.health = FULL_HEALTH;
        self.hazards = self.initial_hazards.clone();
        self.frame = 0;
        self.done = false;
        self.outcome = EpisodeOutcome::Truncated;
        self.observation()
    }

    fn step(&mut self, action: Action) -> StepOutcome {
        if self.done {
            return StepOutcome {
                reward: 0.0,
                done: true,
                observation: self.observation(),
            };
        }

        let speed = self.config.agent_speed;
        self.velocity = match DodgeAction::from(action) {
            DodgeAction::Up => Point::new(0.0, -speed),
            DodgeAction::Down => Point::new(0.0, speed),
            DodgeAction::Left => Point::new(-speed, 0.0),
            DodgeAction::Right => Point::new(speed, 0.0),
        };
        let size = self.config.agent_size;
        self.position.x = (self.position.x + self.velocity.x).clamp(size, self.config.width - size);
        self.position.y = (self.position.y + self.velocity.y).clamp(size, self.config.height - size);

        let margin = self.config.cull_margin;
        let (width, height) = (self.config.width, self.config.height);
        self.hazards.retain_mut(|hazard| {
            hazard.advance();
            let Point { x, y } = hazard.position;
            x > -margin && x < width + margin && y > -margin && y < height + margin
        });
        if self.frame % self.config.spawn_interval.max(1) == 0
            && self.hazards.len() < self.config.max_hazards
        {
            self.spawn_hazard();
        }

        let reach = size + self.config.hazard_size;
        let cap = self.config.distance_cap;
        let nearest = self.nearest_hazard().map(|(_, distance)| distance);
        let reward = match nearest {
            Some(distance) if distance < reach => {
                self.health = 0.0;
                self.done = true;
                self.outcome = EpisodeOutcome::Hit;
                -self.config.hit_penalty
            }
            _ => self.config.survival_reward + nearest.map_or(cap, |d| d.min(cap)) / cap,
        };
        self.frame += 1;

        StepOutcome {
            reward,
            done: self.done,
            observation: self.observation(),
        }
    }

    fn observation(&self) -> Observation {
        let Some((hazard, _)) = self.nearest_hazard() else {
            return vec![0.0; DODGE_FEATURES];
        };
        let config = &self.config;
        vec![
            (hazard.position.x - self.position.x) / config.width,
            (hazard.position.y - self.position.y) / config.height,
            hazard.velocity.x / config.velocity_scale,
            hazard.velocity.y / config.velocity_scale,
        ]
    }

    fn observation_len(&self) -> usize {
        DODGE_FEATURES
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn controlled_health(&self) -> f32 {
        self.health
    }

    fn outcome(&self) -> EpisodeOutcome {
        self.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hazard_at(x: f32, y: f32, vx: f32, vy: f32) -> Projectile {
        Projectile {
            position: Point::new(x, y),
            velocity: Point::new(vx, vy),
            owner: Owner::Opponent,
        }
    }

    #[test]
    fn first_step_spawns_a_hazard() {
        let mut arena = DodgeArena::builder(DodgeConfig::default())
            .with_seed(11)
            .build();
        assert_eq!(arena.observation(), vec![0.0; DODGE_FEATURES]);
        let outcome = arena.step(DodgeAction::Up.into());
        assert_eq!(arena.hazards().len(), 1);
        assert_eq!(arena.frame(), 1);
        assert!(outcome.reward > 0.1);
        assert!(outcome.observation.iter().any(|value| *value != 0.0));
    }

    #[test]
    fn collision_ends_episode_with_penalty() {
        let mut arena = DodgeArena::builder(DodgeConfig::default())
            .with_seed(5)
            .with_hazards(vec![hazard_at(440.0, 300.0, -2.0, 0.0)])
            .build();
        let outcome = arena.step(DodgeAction::Right.into());
        assert!(outcome.done);
        assert_eq!(outcome.reward, -10.0);
        assert_eq!(arena.outcome(), EpisodeOutcome::Hit);
        assert_eq!(arena.controlled_health(), 0.0);
    }

    #[test]
    fn survival_reward_scales_with_distance() {
        let mut arena = DodgeArena::builder(DodgeConfig {
            max_hazards: 1,
            ..DodgeConfig::default()
        })
        .with_seed(5)
        .with_hazards(vec![hazard_at(20.0, 300.0, 0.0, 0.0)])
        .build();
        let outcome = arena.step(DodgeAction::Right.into());
        assert!(!outcome.done);
        let expected = 0.1 + (424.0 - 20.0) / 1000.0;
        assert!((outcome.reward - expected).abs() < 1e-5);
        assert!((outcome.observation[0] - (-404.0 / 840.0)).abs() < 1e-6);
    }

    #[test]
    fn agent_is_clamped_to_arena() {
        let mut arena = DodgeArena::builder(DodgeConfig {
            max_hazards: 0,
            ..DodgeConfig::default()
        })
        .with_seed(2)
        .build();
        for _ in 0..200 {
            arena.step(DodgeAction::Left.into());
        }
        assert_eq!(arena.position().x, 20.0);
        assert!(arena.hazards().is_empty());
    }
}
