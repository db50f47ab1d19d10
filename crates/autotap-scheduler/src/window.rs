//! Activation-window evaluation.
//!
//! Bounds are inclusive. Daily windows are evaluated in UTC and never wrap
//! past midnight (validation rejects `start >= end`).

use autotap_core::ActivationWindow;
use chrono::{DateTime, Days, Utc};

/// Where an instant falls relative to a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStatus {
    /// The window admits the instant.
    Open,
    /// The window opens later, at `opens_at`.
    Pending { opens_at: DateTime<Utc> },
    /// The window has closed for good.
    Expired,
}

/// Evaluate an optional window at `now`. No window means always open.
pub fn evaluate(window: Option<&ActivationWindow>, now: DateTime<Utc>) -> WindowStatus {
    let Some(window) = window else {
        return WindowStatus::Open;
    };
    match *window {
        ActivationWindow::Absolute { start, end } => {
            if now < start {
                WindowStatus::Pending { opens_at: start }
            } else if now <= end {
                WindowStatus::Open
            } else {
                WindowStatus::Expired
            }
        }
        ActivationWindow::Daily { start, end } => {
            let today = now.date_naive();
            let opens_today = today.and_time(start).and_utc();
            let closes_today = today.and_time(end).and_utc();
            if now < opens_today {
                WindowStatus::Pending {
                    opens_at: opens_today,
                }
            } else if now <= closes_today {
                WindowStatus::Open
            } else {
                match today.checked_add_days(Days::new(1)) {
                    Some(tomorrow) => WindowStatus::Pending {
                        opens_at: tomorrow.and_time(start).and_utc(),
                    },
                    None => WindowStatus::Expired,
                }
            }
        }
    }
}

/// Whether the window admits `now`.
pub fn admits(window: Option<&ActivationWindow>, now: DateTime<Utc>) -> bool {
    evaluate(window, now) == WindowStatus::Open
}

/// Whether the window can never admit anything at or after `now`.
pub fn is_expired(window: Option<&ActivationWindow>, now: DateTime<Utc>) -> bool {
    evaluate(window, now) == WindowStatus::Expired
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, h, m, s).unwrap()
    }

    #[test]
    fn test_no_window_always_open() {
        assert_eq!(evaluate(None, at(3, 0, 0)), WindowStatus::Open);
        assert!(admits(None, at(23, 59, 59)));
    }

    #[test]
    fn test_absolute_window() {
        let w = ActivationWindow::absolute(at(10, 0, 0), at(11, 0, 0));
        assert_eq!(
            evaluate(Some(&w), at(9, 59, 59)),
            WindowStatus::Pending {
                opens_at: at(10, 0, 0)
            }
        );
        // Inclusive on both ends.
        assert!(admits(Some(&w), at(10, 0, 0)));
        assert!(admits(Some(&w), at(11, 0, 0)));
        assert_eq!(evaluate(Some(&w), at(11, 0, 1)), WindowStatus::Expired);
        assert!(is_expired(Some(&w), at(12, 0, 0)));
    }

    #[test]
    fn test_daily_window_before_during_after() {
        let w = ActivationWindow::daily(
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        );
        assert_eq!(
            evaluate(Some(&w), at(7, 0, 0)),
            WindowStatus::Pending {
                opens_at: at(8, 0, 0)
            }
        );
        assert_eq!(evaluate(Some(&w), at(8, 30, 0)), WindowStatus::Open);

        let tomorrow_eight = Utc.with_ymd_and_hms(2026, 6, 16, 8, 0, 0).unwrap();
        assert_eq!(
            evaluate(Some(&w), at(9, 0, 1)),
            WindowStatus::Pending {
                opens_at: tomorrow_eight
            }
        );
        // Recurring windows never expire.
        assert!(!is_expired(Some(&w), at(23, 0, 0)));
    }
}
