//! Multiplayer configuration.
//!
//! An explicit struct handed to the session objects at startup; there is no
//! process-wide tuning state.

use serde::{Deserialize, Serialize};

use trundle_net::transport::{DEFAULT_PORT, MAX_PLAYERS};

/// Multiplayer settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MultiplayerConfig {
    /// Port the dedicated server binds.
    pub port: u16,
    /// Player capacity; clamped to [`MAX_PLAYERS`] at session start.
    pub max_players: u8,
    /// Simulation ticks between authoritative broadcasts. 0 = one packet
    /// per tick.
    pub send_rate: u32,
}

impl Default for MultiplayerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_players: MAX_PLAYERS as u8,
            send_rate: 5,
        }
    }
}

impl MultiplayerConfig {
    /// Capacity actually used for the slot arena.
    pub fn clamped_max_players(&self) -> usize {
        (self.max_players as usize).clamp(1, MAX_PLAYERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MultiplayerConfig::default();
        assert_eq!(config.port, 3011);
        assert_eq!(config.max_players, 32);
        assert_eq!(config.send_rate, 5);
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let config: MultiplayerConfig = serde_json::from_str(r#"{"send_rate": 2}"#).unwrap();
        assert_eq!(config.send_rate, 2);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.max_players, MAX_PLAYERS as u8);
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = MultiplayerConfig {
            port: 4100,
            max_players: 8,
            send_rate: 0,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: MultiplayerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_capacity_is_clamped() {
        let config = MultiplayerConfig {
            max_players: 200,
            ..Default::default()
        };
        assert_eq!(config.clamped_max_players(), MAX_PLAYERS);

        let config = MultiplayerConfig {
            max_players: 0,
            ..Default::default()
        };
        assert_eq!(config.clamped_max_players(), 1);
    }
}
