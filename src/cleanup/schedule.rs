//! Daily schedule maths

use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeZone};

/// Next occurrence of `at` strictly after `now`, in `now`'s time zone
///
/// A time of day that does not exist on a given date (DST gap) moves to the
/// following day.
pub fn next_daily_run<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut date = now.date_naive();

    loop {
        if let Some(run) = tz.from_local_datetime(&date.and_time(at)).earliest() {
            if run > *now {
                return run;
            }
        }
        match date.succ_opt() {
            Some(next) => date = next,
            None => return now.clone(),
        }
    }
}

/// Time to wait from `now` until the next run at `at`
pub fn until_next_run<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> Duration {
    (next_daily_run(now, at) - now.clone())
        .to_std()
        .unwrap_or(Duration::ZERO)
}
