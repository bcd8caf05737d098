use serde::{Deserialize, Serialize};

/// Size of the discrete action set shared by every arena variant.
pub const ACTION_COUNT: usize = 4;

/// Index into the discrete action set. Always below [`ACTION_COUNT`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Action(usize);

impl Action {
    /// Returns the action for `index`, or `None` when it is out of range.
    pub fn new(index: usize) -> Option<Self> {
        (index < ACTION_COUNT).then_some(Self(index))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }

    pub fn all() -> impl Iterator<Item = Action> {
        (0..ACTION_COUNT).map(Action)
    }

    /// Index of the largest value, first one wins on ties.
    pub fn argmax(values: &[f32]) -> Action {
        let mut best = 0usize;
        let mut best_value = f32::NEG_INFINITY;
        for (index, value) in values.iter().enumerate().take(ACTION_COUNT) {
            if *value > best_value {
                best = index;
                best_value = *value;
            }
        }
        Action(best)
    }
}

/// Actions of the controlled agent in the combat arena.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CombatAction {
    /// Move toward the top edge.
    MoveUp,
    /// Move toward the bottom edge.
    MoveDown,
    /// Close the horizontal gap to the opponent.
    Approach,
    /// Fire a projectile at the opponent when in range and off cooldown.
    Attack,
}

impl From<Action> for CombatAction {
    fn from(action: Action) -> Self {
        match action.0 {
            0 => CombatAction::MoveUp,
            1 => CombatAction::MoveDown,
            2 => CombatAction::Approach,
            _ => CombatAction::Attack,
        }
    }
}

impl From<CombatAction> for Action {
    fn from(action: CombatAction) -> Self {
        Action(action as usize)
    }
}

/// Movement directions of the agent in the dodge arena.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum DodgeAction {
    Up,
    Down,
    Left,
    Right,
}

impl From<Action> for DodgeAction {
    fn from(action: Action) -> Self {
        match action.0 {
            0 => DodgeAction::Up,
            1 => DodgeAction::Down,
            2 => DodgeAction::Left,
            _ => DodgeAction::Right,
        }
    }
}

impl From<DodgeAction> for Action {
    fn from(action: DodgeAction) -> Self {
        Action(action as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_index() {
        assert!(Action::new(ACTION_COUNT).is_none());
        assert_eq!(Action::new(3).map(Action::index), Some(3));
    }

    #[test]
    fn argmax_prefers_first_maximum() {
        assert_eq!(Action::argmax(&[0.5, 2.0, 2.0, -1.0]).index(), 1);
        assert_eq!(Action::argmax(&[0.0; ACTION_COUNT]).index(), 0);
    }

    #[test]
    fn typed_actions_round_trip_through_index() {
        for action in Action::all() {
            assert_eq!(Action::from(CombatAction::from(action)), action);
            assert_eq!(Action::from(DodgeAction::from(action)), action);
        }
    }
}
