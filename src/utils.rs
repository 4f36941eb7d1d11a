//! Utility functions for the matchmaking service

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique room ID
pub fn generate_room_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new unique transport ID
pub fn generate_transport_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Calculate the absolute difference between two elo ratings
pub fn elo_difference(a: i32, b: i32) -> i32 {
    (a - b).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        let id1 = generate_room_id();
        let id2 = generate_room_id();
        assert_ne!(id1, id2);

        let t1 = generate_transport_id();
        let t2 = generate_transport_id();
        assert_ne!(t1, t2);
    }

    #[test]
    fn test_elo_difference() {
        assert_eq!(elo_difference(1500, 1400), 100);
        assert_eq!(elo_difference(1400, 1500), 100);
        assert_eq!(elo_difference(1500, 1500), 0);
    }
}
