//! Wall-clock rollover detection

use crate::persist::Settings;
use chrono::{NaiveDateTime, Timelike};

/// 时间翻转事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rollover {
    Minute,
    Hour,
    Day,
    MealPeriod(String),
}

/// Last observed wall-clock snapshot
#[derive(Debug, Default)]
pub struct WallClock {
    last: Option<NaiveDateTime>,
    meal_period: Option<String>,
}

impl WallClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `now` with the previous snapshot; the first call only
    /// records a baseline
    pub fn observe(&mut self, now: NaiveDateTime, settings: &Settings) -> Vec<Rollover> {
        let mut events = Vec::new();
        let period = settings.meal_period_at(now.time()).map(|p| p.name.clone());

        if let Some(last) = self.last {
            if now.date() != last.date() {
                events.push(Rollover::Day);
            }
            if now.date() != last.date() || now.hour() != last.hour() {
                events.push(Rollover::Hour);
            }
            if now.date() != last.date() || now.hour() != last.hour() || now.minute() != last.minute() {
                events.push(Rollover::Minute);
            }
            if period != self.meal_period
                && let Some(name) = &period
            {
                events.push(Rollover::MealPeriod(name.clone()));
            }
        }

        self.last = Some(now);
        self.meal_period = period;
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_rollovers() {
        let settings = Settings::default();
        let mut clock = WallClock::new();
        assert!(clock.observe(at(1, 10, 59), &settings).is_empty());
        assert!(clock.observe(at(1, 10, 59), &settings).is_empty());

        assert_eq!(
            clock.observe(at(1, 11, 0), &settings),
            vec![
                Rollover::Hour,
                Rollover::Minute,
                Rollover::MealPeriod("Lunch".into())
            ]
        );
        assert_eq!(clock.observe(at(1, 11, 1), &settings), vec![Rollover::Minute]);
        assert_eq!(
            clock.observe(at(2, 11, 1), &settings),
            vec![Rollover::Day, Rollover::Hour, Rollover::Minute]
        );
    }
}
