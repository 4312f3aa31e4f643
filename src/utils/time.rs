/// Whole minutes in a second counter, rounded down. Negative input counts as zero.
pub fn whole_minutes(seconds: i64) -> i64 {
    seconds.max(0) / 60
}
