//! Reminder thresholds and the candidate query the scheduler runs.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::purchase::{Purchase, SubscriptionState, MAX_REMINDER_LEVEL};

/// Reminder levels, stored in `reminders_sent`.
///
/// Levels grow with urgency so that the stored value only ever increases
/// within a billing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderThreshold {
    /// The due date is close.
    BeforeDue,
    /// The due date has been reached.
    Due,
    /// The payment deadline has passed.
    Deadline,
}

impl ReminderThreshold {
    /// Most urgent first; the scheduler walks them in this order.
    pub const PROCESSING_ORDER: [ReminderThreshold; 3] = [
        ReminderThreshold::Deadline,
        ReminderThreshold::Due,
        ReminderThreshold::BeforeDue,
    ];

    pub fn level(&self) -> i16 {
        match self {
            ReminderThreshold::BeforeDue => 1,
            ReminderThreshold::Due => 2,
            ReminderThreshold::Deadline => MAX_REMINDER_LEVEL,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderThreshold::BeforeDue => "before_due",
            ReminderThreshold::Due => "due",
            ReminderThreshold::Deadline => "deadline",
        }
    }
}

/// Trial subscriptions and paying ones are reminded on separate schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderCohort {
    Trial,
    Regular,
}

impl ReminderCohort {
    pub const ALL: [ReminderCohort; 2] = [ReminderCohort::Trial, ReminderCohort::Regular];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderCohort::Trial => "trial",
            ReminderCohort::Regular => "regular",
        }
    }
}

/// Which subscriptions are due a reminder.
///
/// Matches subscriptions that are not blocked, gratis or canceled, are in
/// `cohort`, have `reminders_sent` below the threshold level and have their
/// date on or before `cutoff`. The date is the due date for `BeforeDue` and
/// `Due`, and the payment deadline for `Deadline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderQuery {
    pub threshold: ReminderThreshold,
    pub cohort: ReminderCohort,
    pub cutoff: NaiveDate,
}

impl ReminderQuery {
    /// Builds the query for `threshold` run on `today`.
    ///
    /// `days_before` only affects `BeforeDue`.
    pub fn new(
        threshold: ReminderThreshold,
        cohort: ReminderCohort,
        today: NaiveDate,
        days_before: u32,
    ) -> Self {
        let cutoff = match threshold {
            ReminderThreshold::BeforeDue => today
                .checked_add_signed(Duration::days(i64::from(days_before)))
                .unwrap_or(NaiveDate::MAX),
            ReminderThreshold::Due | ReminderThreshold::Deadline => today,
        };
        Self {
            threshold,
            cohort,
            cutoff,
        }
    }

    /// In-memory form of the query, used by the memory store and tests.
    pub fn matches(&self, purchase: &Purchase) -> bool {
        let Some(details) = purchase.subscription() else {
            return false;
        };
        if purchase.blocked || purchase.gratis || details.state == SubscriptionState::Canceled {
            return false;
        }
        if purchase.reminders_sent >= self.threshold.level() {
            return false;
        }
        let in_cohort = match self.cohort {
            ReminderCohort::Trial => details.is_trial(),
            ReminderCohort::Regular => !details.is_trial(),
        };
        if !in_cohort {
            return false;
        }
        let date = match self.threshold {
            ReminderThreshold::BeforeDue | ReminderThreshold::Due => Some(details.due_payment_date),
            ReminderThreshold::Deadline => details.payment_deadline,
        };
        date.map_or(false, |date| date <= self.cutoff)
    }
}
