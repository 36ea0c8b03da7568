//! Wall-clock helpers
//!
//! The scheduler works on local naive time; activity stamps are the same
//! instant expressed as millis so the two stay comparable in tests.

use chrono::{Local, NaiveDateTime};

pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

pub fn millis(at: NaiveDateTime) -> i64 {
    at.and_utc().timestamp_millis()
}

pub fn now_millis() -> i64 {
    millis(local_now())
}
