//! Evaluation periods and the window-constraint algebra.
//!
//! A period is the granularity at which values are requested (a whole
//! year, or one month). Window constraints (`before`/`since`/`after` a
//! date) come from the program source and decide which time-windowed
//! alternative applies to a given period. All predicates reduce to
//! (year, month) comparisons against a date's first day.

use std::cmp::Ordering;
use std::fmt;

use fiscal_core::{MonthDate, Window};
use time::Month;

/// The twelve months in calendar order, for monthly-to-yearly roll-up.
pub const MONTHS: [Month; 12] = [
    Month::January,
    Month::February,
    Month::March,
    Month::April,
    Month::May,
    Month::June,
    Month::July,
    Month::August,
    Month::September,
    Month::October,
    Month::November,
    Month::December,
];

/// Coarseness of a period or value. Ordered finer-to-coarser, so
/// `min` over a list picks the finest granularity involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Granularity {
    Monthly,
    Yearly,
    /// Values that never change over time.
    Constant,
}

/// The period one evaluation run is asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Yearly { year: i32 },
    Monthly { month: Month, year: i32 },
}

impl Period {
    pub fn yearly(year: i32) -> Period {
        Period::Yearly { year }
    }

    pub fn monthly(month: Month, year: i32) -> Period {
        Period::Monthly { month, year }
    }

    pub fn year(&self) -> i32 {
        match *self {
            Period::Yearly { year } => year,
            Period::Monthly { year, .. } => year,
        }
    }

    pub fn is_yearly(&self) -> bool {
        matches!(self, Period::Yearly { .. })
    }

    pub fn granularity(&self) -> Granularity {
        match self {
            Period::Yearly { .. } => Granularity::Yearly,
            Period::Monthly { .. } => Granularity::Monthly,
        }
    }

    /// Whether this period (as a span of time) contains `other`:
    /// a year contains itself and its months, a month only itself.
    pub fn contains(&self, other: &Period) -> bool {
        match (self, other) {
            (Period::Yearly { year }, _) => other.year() == *year,
            (Period::Monthly { .. }, Period::Monthly { .. }) => self == other,
            (Period::Monthly { .. }, Period::Yearly { .. }) => false,
        }
    }

    /// (year, month) of the period's first month.
    fn start_key(&self) -> (i32, u8) {
        match *self {
            Period::Yearly { year } => (year, 1),
            Period::Monthly { month, year } => (year, u8::from(month)),
        }
    }

    /// (year, month) of the period's last month.
    fn end_key(&self) -> (i32, u8) {
        match *self {
            Period::Yearly { year } => (year, 12),
            Period::Monthly { month, year } => (year, u8::from(month)),
        }
    }

    fn ends_before(&self, date: &MonthDate) -> bool {
        self.end_key() < date.first_day()
    }

    fn starts_on_or_after(&self, date: &MonthDate) -> bool {
        self.start_key() >= date.first_day()
    }

    fn starts_after(&self, date: &MonthDate) -> bool {
        self.start_key() > date.first_day()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Period::Yearly { year } => write!(f, "{}", year),
            Period::Monthly { month, year } => write!(f, "{:?} {}", month, year),
        }
    }
}

// Total order so periods can key the memo store. Monthly periods sort
// within their year, after the year itself.
impl Ord for Period {
    fn cmp(&self, other: &Period) -> Ordering {
        let rank = |p: &Period| match p {
            Period::Yearly { .. } => 0u8,
            Period::Monthly { .. } => 1u8,
        };
        self.start_key()
            .cmp(&other.start_key())
            .then(rank(self).cmp(&rank(other)))
    }
}

impl PartialOrd for Period {
    fn partial_cmp(&self, other: &Period) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Whether a window constraint holds for the whole of `period`.
pub fn window_contains(window: &Window, period: &Period) -> bool {
    match window {
        Window::Before(date) => period.ends_before(date),
        Window::Since(date) => period.starts_on_or_after(date),
        Window::After(date) => period.starts_after(date),
    }
}

/// Dates carry month granularity (year-only dates are pinned to
/// January upstream).
pub fn window_granularity(_window: &Window) -> Granularity {
    Granularity::Monthly
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn july_2018() -> MonthDate {
        MonthDate::new(2018, Month::July)
    }

    #[test]
    fn yearly_contains_its_months() {
        let year = Period::yearly(2018);
        assert!(year.contains(&Period::yearly(2018)));
        assert!(year.contains(&Period::monthly(Month::March, 2018)));
        assert!(!year.contains(&Period::yearly(2017)));
        assert!(!year.contains(&Period::monthly(Month::March, 2017)));
    }

    #[test]
    fn monthly_contains_only_itself() {
        let march = Period::monthly(Month::March, 2018);
        assert!(march.contains(&march));
        assert!(!march.contains(&Period::monthly(Month::April, 2018)));
        assert!(!march.contains(&Period::yearly(2018)));
    }

    #[test]
    fn before_window_splits_the_year() {
        let before = Window::Before(july_2018());
        assert!(window_contains(&before, &Period::monthly(Month::June, 2018)));
        assert!(!window_contains(&before, &Period::monthly(Month::July, 2018)));
        assert!(window_contains(&before, &Period::yearly(2017)));
        // The year 2018 straddles the boundary: neither wholly before...
        assert!(!window_contains(&before, &Period::yearly(2018)));
    }

    #[test]
    fn since_window_splits_the_year() {
        let since = Window::Since(july_2018());
        assert!(window_contains(&since, &Period::monthly(Month::July, 2018)));
        assert!(window_contains(&since, &Period::monthly(Month::December, 2018)));
        assert!(!window_contains(&since, &Period::monthly(Month::June, 2018)));
        // ...nor wholly since the boundary.
        assert!(!window_contains(&since, &Period::yearly(2018)));
        assert!(window_contains(&since, &Period::yearly(2019)));
    }

    #[test]
    fn year_dates_contain_whole_years() {
        // "before 2017" / "since 2017" pin to January 2017.
        let jan_2017 = MonthDate::new(2017, Month::January);
        assert!(window_contains(&Window::Before(jan_2017), &Period::yearly(2016)));
        assert!(!window_contains(&Window::Before(jan_2017), &Period::yearly(2017)));
        assert!(window_contains(&Window::Since(jan_2017), &Period::yearly(2017)));
        assert!(window_contains(&Window::Since(jan_2017), &Period::yearly(2018)));
        assert!(!window_contains(&Window::Since(jan_2017), &Period::yearly(2016)));
    }

    #[test]
    fn after_window_is_strict() {
        let after = Window::After(july_2018());
        assert!(!window_contains(&after, &Period::monthly(Month::July, 2018)));
        assert!(window_contains(&after, &Period::monthly(Month::August, 2018)));
        assert!(window_contains(&after, &Period::yearly(2019)));
        assert!(!window_contains(&after, &Period::yearly(2018)));
    }

    #[test]
    fn granularity_orders_finer_first() {
        assert!(Granularity::Monthly < Granularity::Yearly);
        assert!(Granularity::Yearly < Granularity::Constant);
        assert_eq!(
            Granularity::Constant.min(Granularity::Monthly),
            Granularity::Monthly
        );
    }

    #[test]
    fn periods_order_deterministically() {
        let mut periods = vec![
            Period::monthly(Month::March, 2018),
            Period::yearly(2018),
            Period::monthly(Month::January, 2018),
            Period::yearly(2017),
        ];
        periods.sort();
        assert_eq!(
            periods,
            vec![
                Period::yearly(2017),
                Period::yearly(2018),
                Period::monthly(Month::January, 2018),
                Period::monthly(Month::March, 2018),
            ]
        );
    }
}
