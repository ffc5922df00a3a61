//! Thin wrapper around the `cron` crate's 6-field (seconds-first) grammar, adapted to
//! the 5-field grammar used throughout this API (`minute hour day-of-month month
//! day-of-week`), matching `robfig/cron`'s default in the original implementation.

use cron::Schedule;
use std::str::FromStr;

/// Parse a 5-field cron expression, rejecting anything `cron::Schedule` can't express
/// once a leading `"0 "` seconds field is prepended.
pub fn parse(expr: &str) -> Result<Schedule, cron::error::Error> {
    let six_field = format!("0 {expr}");
    Schedule::from_str(&six_field)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_five_minutes_parses() {
        assert!(parse("*/5 * * * *").is_ok());
    }

    #[test]
    fn garbage_does_not_parse() {
        assert!(parse("not a cron").is_err());
    }
}
