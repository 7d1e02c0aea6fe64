use chrono::{DateTime, Days, Utc};

use crate::models::{CategoryCount, DailyViews, RoleTotals, UserOverview};

/// Analytics helpers kept pure so the bucketing rules are testable without a
/// database. The repository fetches the raw rows; everything date- or
/// role-arithmetic lives here.

/// Number of calendar days in the view-trend window, including today.
pub const TREND_WINDOW_DAYS: u64 = 7;

/// Lower bound of the trend window: UTC midnight of the sixth day before `now`.
/// Inclusive; there is no upper bound other than "now".
pub fn trend_window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let first_day = now
        .date_naive()
        .checked_sub_days(Days::new(TREND_WINDOW_DAYS - 1))
        .unwrap_or_else(|| now.date_naive());
    first_day
        .and_hms_opt(0, 0, 0)
        .unwrap_or_else(|| now.naive_utc())
        .and_utc()
}

/// Buckets view-event timestamps into the trailing 7 calendar days (UTC),
/// zero-filling days with no events so the chart always shows a full week.
/// Timestamps outside the window are ignored, so callers may pass an
/// over-fetched slice.
pub fn bucket_daily(timestamps: &[DateTime<Utc>], now: DateTime<Utc>) -> Vec<DailyViews> {
    let start = trend_window_start(now);

    let mut buckets: Vec<DailyViews> = (0..TREND_WINDOW_DAYS)
        .filter_map(|offset| start.date_naive().checked_add_days(Days::new(offset)))
        .map(|day| DailyViews { day, count: 0 })
        .collect();

    for ts in timestamps {
        if *ts < start || *ts > now {
            continue;
        }
        let day = ts.date_naive();
        if let Some(bucket) = buckets.iter_mut().find(|b| b.day == day) {
            bucket.count += 1;
        }
    }

    buckets
}

/// Labels grouped category rows for display. The NULL group (resources with
/// no category) becomes the "Uncategorized" bucket; a real category that
/// happens to carry that name stays a separate entry with its own count.
pub fn category_distribution(rows: Vec<(Option<String>, i64)>) -> Vec<CategoryCount> {
    rows.into_iter()
        .map(|(name, count)| CategoryCount {
            category: name.unwrap_or_else(|| "Uncategorized".to_string()),
            count,
        })
        .collect()
}

/// Computes per-role headcounts from the admin user listing. The buckets are
/// not mutually exclusive; a principal holding several roles is counted once
/// per bucket it belongs to.
pub fn role_totals(users: &[UserOverview]) -> RoleTotals {
    let mut totals = RoleTotals::default();
    for user in users {
        for role in &user.roles {
            match role.as_str() {
                "student" => totals.students += 1,
                "teacher" => totals.teachers += 1,
                "admin" => totals.admins += 1,
                _ => {}
            }
        }
    }
    totals
}
