//! Clock port - Source of the current date and time.

use chrono::{DateTime, NaiveDate, Utc};

/// Every date decision (due dates, reminders, prolongation) reads time
/// through this trait.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current calendar date in UTC.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct Epoch;

    impl Clock for Epoch {
        fn now(&self) -> DateTime<Utc> {
            Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap()
        }
    }

    #[test]
    fn today_is_date_of_now() {
        assert_eq!(Epoch.today(), NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
    }

    #[test]
    fn clock_is_object_safe() {
        fn _accepts_dyn(_clock: &dyn Clock) {}
    }
}
