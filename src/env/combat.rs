use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::action::{Action, CombatAction};
use crate::config::CombatConfig;
use crate::state::{EpisodeOutcome, Observation, Owner, Point, Projectile, StepOutcome};

use super::Environment;

pub const COMBAT_FEATURES: usize = 8;

/// Fighter in the combat arena.
#[derive(Clone, Debug, PartialEq)]
pub struct Agent {
    pub position: Point,
    pub health: f32,
    pub cooldown: u32,
}

impl Agent {
    fn spawn(position: Point, health: f32) -> Self {
        Self {
            position,
            health,
            cooldown: 0,
        }
    }

    fn cool_down(&mut self) {
        self.cooldown = self.cooldown.saturating_sub(1);
    }
}

/// Builder that allows deterministic layouts and random streams for tests.
pub struct CombatArenaBuilder {
    config: CombatConfig,
    seed: Option<u64>,
    controlled_start: Option<Point>,
    opponent_start: Option<Point>,
}

impl CombatArenaBuilder {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Overrides the starting positions restored by every `reset`.
    pub fn with_positions(mut self, controlled: Point, opponent: Point) -> Self {
        self.controlled_start = Some(controlled);
        self.opponent_start = Some(opponent);
        self
    }

    pub fn build(self) -> CombatArena {
        let CombatArenaBuilder {
            config,
            seed,
            controlled_start,
            opponent_start,
        } = self;
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let controlled_start =
            controlled_start.unwrap_or(Point::new(500.0, config.height / 2.0));
        let opponent_start = opponent_start.unwrap_or(Point::new(100.0, config.height / 2.0));
        let mut arena = CombatArena {
            controlled: Agent::spawn(controlled_start, config.max_health),
            opponent: Agent::spawn(opponent_start, config.max_health),
            projectiles: Vec::new(),
            done: false,
            outcome: EpisodeOutcome::Truncated,
            controlled_start,
            opponent_start,
            config,
            rng,
        };
        arena.reset();
        arena
    }
}

/// Two-agent arena: the learner steers one fighter, a stochastic heuristic
/// steers the other, and both trade projectiles.
pub struct CombatArena {
    config: CombatConfig,
    controlled: Agent,
    opponent: Agent,
    projectiles: Vec<Projectile>,
    done: bool,
    outcome: EpisodeOutcome,
    controlled_start: Point,
    opponent_start: Point,
    rng: StdRng,
}

impl CombatArena {
    pub fn new(config: CombatConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: CombatConfig) -> CombatArenaBuilder {
        CombatArenaBuilder {
            config,
            seed: None,
            controlled_start: None,
            opponent_start: None,
        }
    }

    pub fn config(&self) -> &CombatConfig {
        &self.config
    }

    pub fn controlled(&self) -> &Agent {
        &self.controlled
    }

    pub fn opponent(&self) -> &Agent {
        &self.opponent
    }

    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    fn act(&mut self, action: CombatAction) -> f32 {
        let config = &self.config;
        let me = &mut self.controlled;
        match action {
            CombatAction::MoveUp => {
                if me.position.y > config.edge_margin {
                    me.position.y -= config.speed;
                }
                0.0
            }
            CombatAction::MoveDown => {
                if me.position.y < config.height - config.edge_margin {
                    me.position.y += config.speed;
                }
                0.0
            }
            CombatAction::Approach => {
                let dx = self.opponent.position.x - me.position.x;
                if dx.abs() > config.approach_stop {
                    me.position.x += config.speed.copysign(dx);
                }
                config.approach_reward
            }
            CombatAction::Attack => {
                if me.cooldown > 0 {
                    return 0.0;
                }
                let origin = me.position;
                let target = self.opponent.position;
                if origin.distance(target) < config.attack_range {
                    let projectile =
                        aimed_projectile(origin, target, config.projectile_speed, Owner::Controlled);
                    self.projectiles.push(projectile);
                    me.cooldown = config.cooldown_ticks;
                    config.cast_reward
                } else {
                    -config.miss_penalty
                }
            }
        }
    }

    fn opponent_turn(&mut self) {
        let config = &self.config;
        if self.rng.gen_range(0.0f64..1.0) < config.drift_chance {
            let drift = (self.rng.gen_range(0.0f32..1.0) - 0.5) * config.drift_span;
            self.opponent.position.y += drift;
        }
        self.opponent.position.y = self
            .opponent
            .position
            .y
            .clamp(config.edge_margin, config.height - config.edge_margin);

        if self.opponent.cooldown == 0 && self.rng.gen_range(0.0f64..1.0) < config.attack_chance {
            let origin = self.opponent.position;
            let target = self.controlled.position;
            if origin.distance(target) < config.detection_range {
                self.projectiles.push(aimed_projectile(
                    origin,
                    target,
                    config.projectile_speed,
                    Owner::Opponent,
                ));
                self.opponent.cooldown = config.cooldown_ticks;
            }
        }
    }

    fn resolve_projectiles(&mut self) -> f32 {
        let config = &self.config;
        let mut reward = 0.0;
        let mut survivors = Vec::with_capacity(self.projectiles.len());
        for mut projectile in std::mem::take(&mut self.projectiles) {
            projectile.advance();
            let Point { x, y } = projectile.position;
            if !(x > 0.0 && x < config.width && y > 0.0 && y < config.height) {
                continue;
            }
            let (target, sign) = match projectile.owner {
                Owner::Controlled => (&mut self.opponent, 1.0),
                Owner::Opponent => (&mut self.controlled, -1.0),
            };
            if projectile.position.distance(target.position) < config.hit_radius {
                target.health -= config.damage;
                reward += sign * config.hit_reward;
                continue;
            }
            survivors.push(projectile);
        }
        self.projectiles = survivors;
        reward
    }
}

fn aimed_projectile(origin: Point, target: Point, speed: f32, owner: Owner) -> Projectile {
    let dx = target.x - origin.x;
    let dy = target.y - origin.y;
    let distance = match origin.distance(target) {
        d if d > 0.0 => d,
        _ => 1.0,
    };
    Projectile {
        position: origin,
        velocity: Point::new(dx / distance * speed, dy / distance * speed),
        owner,
    }
}

impl Environment for CombatArena {
    fn reset(&mut self) -> Observation {
        self.controlled = Agent::spawn(self.controlled_start, self.config.max_health);
        self.opponent = Agent::spawn(self.opponent_start, self.config.max_health);
        self.projectiles.clear();
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

        let mut reward = self.act(action.into());
        self.opponent_turn();
        reward += self.resolve_projectiles();
        self.controlled.cool_down();
        self.opponent.cool_down();

        if self.controlled.health <= 0.0 {
            reward -= self.config.terminal_reward;
            self.done = true;
            self.outcome = EpisodeOutcome::Defeat;
        } else if self.opponent.health <= 0.0 {
            reward += self.config.terminal_reward;
            self.done = true;
            self.outcome = EpisodeOutcome::Victory;
        }
        reward += self.config.tick_reward;

        StepOutcome {
            reward,
            done: self.done,
            observation: self.observation(),
        }
    }

    fn observation(&self) -> Observation {
        let config = &self.config;
        let me = &self.controlled;
        let other = &self.opponent;
        let dx = other.position.x - me.position.x;
        let dy = other.position.y - me.position.y;
        let distance = me.position.distance(other.position);
        let cooldown_scale = config.cooldown_ticks.max(1) as f32;
        vec![
            dx / config.width,
            dy / config.height,
            distance / config.distance_scale,
            me.health / config.max_health,
            other.health / config.max_health,
            me.cooldown as f32 / cooldown_scale,
            if other.position.y < me.position.y { 1.0 } else { 0.0 },
            if distance < config.attack_range { 1.0 } else { 0.0 },
        ]
    }

    fn observation_len(&self) -> usize {
        COMBAT_FEATURES
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn controlled_health(&self) -> f32 {
        self.controlled.health
    }

    fn outcome(&self) -> EpisodeOutcome {
        self.outcome
    }
}
