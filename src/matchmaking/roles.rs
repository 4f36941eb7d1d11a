//! Role configuration for newly created game sessions

use serde::{Deserialize, Serialize};

/// Role counts generated for a matched group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    pub mafia: usize,
    pub detective: usize,
    pub doctor: usize,
    pub villagers: usize,
}

impl RoleConfig {
    /// Derive role counts for a group of `n` players.
    ///
    /// Mafia get a third of the seats; up to two special villagers are dealt
    /// (detective first, then doctor); everyone else is a plain villager.
    pub fn for_players(n: usize) -> Self {
        let mafia = n / 3;
        let specials = (n / 4).min(2);
        let detective = usize::from(specials >= 1);
        let doctor = usize::from(specials >= 2);
        Self {
            mafia,
            detective,
            doctor,
            villagers: n - mafia - detective - doctor,
        }
    }

    pub fn total(&self) -> usize {
        self.mafia + self.detective + self.doctor + self.villagers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_sum_to_player_count() {
        for n in 4..=10 {
            let config = RoleConfig::for_players(n);
            assert_eq!(config.total(), n, "role counts must sum for n={}", n);
        }
    }

    #[test]
    fn test_four_player_configuration() {
        let config = RoleConfig::for_players(4);
        assert_eq!(
            config,
            RoleConfig {
                mafia: 1,
                detective: 1,
                doctor: 0,
                villagers: 2,
            }
        );
    }

    #[test]
    fn test_nine_player_configuration() {
        let config = RoleConfig::for_players(9);
        assert_eq!(
            config,
            RoleConfig {
                mafia: 3,
                detective: 1,
                doctor: 1,
                villagers: 4,
            }
        );
    }

    #[test]
    fn test_doctor_only_dealt_from_eight_players() {
        assert_eq!(RoleConfig::for_players(7).doctor, 0);
        assert_eq!(RoleConfig::for_players(8).doctor, 1);
    }
}
