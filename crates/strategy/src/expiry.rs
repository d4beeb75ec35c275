//! Expiration selection policies.

use chrono::{Datelike, NaiveDate, Weekday};

use optrade_core::config::ExpirationPolicy;

/// True for the monthly options cycle date (third Friday of its month).
#[must_use]
pub fn is_third_friday(date: NaiveDate) -> bool {
    date.weekday() == Weekday::Fri && (date.day() - 1) / 7 == 2
}

/// Picks an expiration from a sorted chain per the configured policy.
///
/// `monthly` and `weekly` fall back to the nearest upcoming expiration
/// when no date matches; `None` only when the chain has no upcoming
/// expirations at all.
#[must_use]
pub fn choose_expiration(
    expirations: &[NaiveDate],
    policy: ExpirationPolicy,
    today: NaiveDate,
) -> Option<NaiveDate> {
    let mut upcoming: Vec<NaiveDate> = expirations.iter().copied().filter(|d| *d >= today).collect();
    upcoming.sort_unstable();
    let nearest = *upcoming.first()?;

    match policy {
        ExpirationPolicy::Nearest => Some(nearest),
        ExpirationPolicy::Monthly => Some(
            upcoming
                .iter()
                .copied()
                .find(|d| is_third_friday(*d))
                .unwrap_or(nearest),
        ),
        ExpirationPolicy::Weekly => Some(
            upcoming
                .iter()
                .copied()
                .find(|d| (*d - today).num_days() <= 7)
                .unwrap_or(nearest),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn third_friday_detection() {
        // 2026-08-21 is the third Friday of August 2026.
        assert!(is_third_friday(d(2026, 8, 21)));
        assert!(!is_third_friday(d(2026, 8, 14)));
        assert!(!is_third_friday(d(2026, 8, 20)));
    }

    #[test]
    fn nearest_picks_first_upcoming() {
        let chain = [d(2026, 8, 7), d(2026, 8, 14), d(2026, 8, 21)];
        let picked = choose_expiration(&chain, ExpirationPolicy::Nearest, d(2026, 8, 10));
        assert_eq!(picked, Some(d(2026, 8, 14)));
    }

    #[test]
    fn monthly_skips_weeklies() {
        let chain = [d(2026, 8, 14), d(2026, 8, 21), d(2026, 8, 28)];
        let picked = choose_expiration(&chain, ExpirationPolicy::Monthly, d(2026, 8, 10));
        assert_eq!(picked, Some(d(2026, 8, 21)));
    }

    #[test]
    fn monthly_falls_back_to_nearest() {
        let chain = [d(2026, 8, 14), d(2026, 8, 28)];
        let picked = choose_expiration(&chain, ExpirationPolicy::Monthly, d(2026, 8, 10));
        assert_eq!(picked, Some(d(2026, 8, 14)));
    }

    #[test]
    fn weekly_requires_seven_days() {
        let chain = [d(2026, 8, 28), d(2026, 9, 18)];
        // Nothing within a week: fall back to nearest.
        let picked = choose_expiration(&chain, ExpirationPolicy::Weekly, d(2026, 8, 10));
        assert_eq!(picked, Some(d(2026, 8, 28)));

        let picked = choose_expiration(&chain, ExpirationPolicy::Weekly, d(2026, 8, 24));
        assert_eq!(picked, Some(d(2026, 8, 28)));
    }

    #[test]
    fn empty_or_expired_chain_yields_none() {
        assert_eq!(
            choose_expiration(&[], ExpirationPolicy::Nearest, d(2026, 8, 10)),
            None
        );
        let stale = [d(2026, 8, 7)];
        assert_eq!(
            choose_expiration(&stale, ExpirationPolicy::Nearest, d(2026, 8, 10)),
            None
        );
    }
}
