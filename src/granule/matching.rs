use chrono::{DateTime, Duration, Utc};

use crate::granule::GranuleSummary;

/// Anything with an acquisition time
pub trait Timestamped {
    fn timestamp(&self) -> Option<DateTime<Utc>>;
}

impl Timestamped for DateTime<Utc> {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        Some(*self)
    }
}

impl Timestamped for GranuleSummary {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }
}

fn within(t: DateTime<Utc>, other: DateTime<Utc>, window: Duration) -> bool {
    t > other - window && t < other + window
}

/// Keep the items of each list acquired strictly within `window` of at least one
/// item of the other list. Items without a timestamp never match.
pub fn concurrent_match<'a, A, B>(a: &'a [A], b: &'a [B], window: Duration) -> (Vec<&'a A>, Vec<&'a B>)
where
    A: Timestamped,
    B: Timestamped,
{
    let b_times: Vec<DateTime<Utc>> = b.iter().filter_map(Timestamped::timestamp).collect();
    let a_times: Vec<DateTime<Utc>> = a.iter().filter_map(Timestamped::timestamp).collect();

    let a_kept = a
        .iter()
        .filter(|item| {
            item.timestamp()
                .is_some_and(|t| b_times.iter().any(|&o| within(t, o, window)))
        })
        .collect();
    let b_kept = b
        .iter()
        .filter(|item| {
            item.timestamp()
                .is_some_and(|t| a_times.iter().any(|&o| within(t, o, window)))
        })
        .collect();
    (a_kept, b_kept)
}
