//! SM-2 style review intervals with a fixed ease factor.

use crate::constants::SECONDS_PER_DAY;

pub fn next_interval_days(
    previous_interval_days: u32,
    repetitions: u32,
    quality: u8,
    pass_quality: u8,
    ease_factor: f64,
) -> u32 {
    if quality < pass_quality {
        return 1;
    }
    match repetitions {
        0 => 1,
        1 => 6,
        _ => {
            let grown = (f64::from(previous_interval_days) * ease_factor).round();
            // A zero previous interval would otherwise stall the schedule.
            (grown as u32).max(1)
        }
    }
}

/// Due time in epoch seconds for the next review after `now`.
pub fn next_review_time(
    previous_interval_days: u32,
    repetitions: u32,
    quality: u8,
    pass_quality: u8,
    ease_factor: f64,
    now: i64,
) -> i64 {
    let days = next_interval_days(
        previous_interval_days,
        repetitions,
        quality,
        pass_quality,
        ease_factor,
    );
    now.saturating_add(i64::from(days) * SECONDS_PER_DAY)
}
