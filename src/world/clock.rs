//! In-game time of day.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::npc::HOURS_PER_DAY;

pub const MINUTES_PER_HOUR: u32 = 60;
pub const MINUTES_PER_DAY: u32 = MINUTES_PER_HOUR * HOURS_PER_DAY as u32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameClock {
    day: u32,
    minute_of_day: u32,
}

impl GameClock {
    pub fn at(hour: u8, minute: u8) -> CoreResult<Self> {
        if hour >= HOURS_PER_DAY || u32::from(minute) >= MINUTES_PER_HOUR {
            return Err(CoreError::Config(format!("invalid time {:02}:{:02}", hour, minute)));
        }
        Ok(Self {
            day: 0,
            minute_of_day: u32::from(hour) * MINUTES_PER_HOUR + u32::from(minute),
        })
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    pub fn hour(&self) -> u8 {
        (self.minute_of_day / MINUTES_PER_HOUR) as u8
    }

    pub fn minute(&self) -> u8 {
        (self.minute_of_day % MINUTES_PER_HOUR) as u8
    }

    /// Move time forward. Returns the hour entered at each boundary crossed,
    /// in order.
    pub fn advance(&mut self, minutes: u32) -> Vec<u8> {
        let start = self.minute_of_day;
        let end = start + minutes;
        let crossed = (start / MINUTES_PER_HOUR + 1..=end / MINUTES_PER_HOUR)
            .map(|h| (h % u32::from(HOURS_PER_DAY)) as u8)
            .collect();
        self.day += end / MINUTES_PER_DAY;
        self.minute_of_day = end % MINUTES_PER_DAY;
        crossed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_within_hour() {
        let mut clock = GameClock::at(8, 10).unwrap();
        assert!(clock.advance(30).is_empty());
        assert_eq!((clock.hour(), clock.minute()), (8, 40));
    }

    #[test]
    fn test_advance_across_midnight() {
        let mut clock = GameClock::at(22, 30).unwrap();
        assert_eq!(clock.advance(150), vec![23, 0, 1]);
        assert_eq!(clock.day(), 1);
        assert_eq!((clock.hour(), clock.minute()), (1, 0));
    }

    #[test]
    fn test_invalid_time() {
        assert!(GameClock::at(24, 0).is_err());
        assert!(GameClock::at(3, 60).is_err());
    }
}
