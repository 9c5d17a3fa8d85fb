//! Helpers turning free-text listing fields into record values.

use chrono::{Local, NaiveDate, NaiveDateTime};

const DATE_FORMATS: &[&str] = &["%d %b %Y", "%d %B %Y", "%Y-%m-%d", "%d/%m/%Y"];

/// Billing period of an advertised rent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RentPeriod {
    Weekly,
    Monthly,
}

impl RentPeriod {
    /// Anything that is not clearly weekly is taken as monthly.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        if label == "pw" || label.contains("week") {
            RentPeriod::Weekly
        } else {
            RentPeriod::Monthly
        }
    }
}

/// Current local time, the default availability.
pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Convert an advertised rent to a monthly figure. `None` when the
/// monthly figure does not fit a `u32`.
pub fn monthly_rent(amount: u32, period: RentPeriod) -> Option<u32> {
    match period {
        RentPeriod::Monthly => Some(amount),
        RentPeriod::Weekly => u32::try_from(u64::from(amount) * 52 / 12).ok(),
    }
}

/// Whole pounds of a money string ("£1,250.00 pcm" -> 1250).
pub fn parse_money(text: &str) -> Option<u32> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Availability date from a source label; "Now" or anything unparsable is `now`.
pub fn parse_available(label: &str, now: NaiveDateTime) -> NaiveDateTime {
    let label = label.trim();
    if label.is_empty() || label.eq_ignore_ascii_case("now") {
        return now;
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(label, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::at;

    #[test]
    fn test_weekly_rent_becomes_monthly() {
        assert_eq!(monthly_rent(150, RentPeriod::Weekly), Some(650));
        assert_eq!(monthly_rent(700, RentPeriod::Monthly), Some(700));
        assert_eq!(RentPeriod::from_label("pw"), RentPeriod::Weekly);
        assert_eq!(RentPeriod::from_label("per week"), RentPeriod::Weekly);
        assert_eq!(RentPeriod::from_label("pcm"), RentPeriod::Monthly);
    }

    #[test]
    fn test_huge_weekly_rent_is_dropped() {
        assert_eq!(monthly_rent(u32::MAX, RentPeriod::Weekly), None);
        assert_eq!(monthly_rent(u32::MAX, RentPeriod::Monthly), Some(u32::MAX));
        // Past the point where `amount * 52` overflows a u32
        assert_eq!(monthly_rent(99_999_999, RentPeriod::Weekly), Some(433_333_329));
    }

    #[test]
    fn test_parse_money() {
        assert_eq!(parse_money("650.00"), Some(650));
        assert_eq!(parse_money("£1,250 pcm"), Some(1250));
        assert_eq!(parse_money("POA"), None);
    }

    #[test]
    fn test_parse_available() {
        let now = at(2015, 1, 10);
        assert_eq!(parse_available("Now", now), now);
        assert_eq!(parse_available("", now), now);
        assert_eq!(parse_available("01 Mar 2015", now), at(2015, 3, 1));
        assert_eq!(parse_available("2015-04-02", now), at(2015, 4, 2));
        assert_eq!(parse_available("soon-ish", now), now);
    }
}
