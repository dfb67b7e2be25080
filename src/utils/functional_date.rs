use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use regex::Regex;
use std::sync::LazyLock;

// 按优先级匹配：DD.MM.YYYY > DD.MM.YY > DDMMYYYY
static DOTTED_FULL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})\.(\d{1,2})\.(\d{4})\b").expect("valid regex"));
static DOTTED_SHORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})\.(\d{1,2})\.(\d{2})\b").expect("valid regex"));
static COMPACT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{2})(\d{2})(\d{4})\b").expect("valid regex"));

/// 从批次描述中解析营业日（如 "Viernes 07.11.2025"）
pub fn parse_functional_date(description: &str) -> Option<NaiveDate> {
    for (re, short_year) in [(&*DOTTED_FULL, false), (&*DOTTED_SHORT, true), (&*COMPACT, false)] {
        for caps in re.captures_iter(description) {
            let day: u32 = caps[1].parse().ok()?;
            let month: u32 = caps[2].parse().ok()?;
            let mut year: i32 = caps[3].parse().ok()?;
            if short_year {
                year += 2000;
            }
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                return Some(date);
            }
        }
    }
    None
}

/// 推导批次营业日：优先解析描述，否则取创建时间在场地时区下的日历日期
pub fn derive_functional_date(
    description: Option<&str>,
    created_at: DateTime<Utc>,
    venue_offset: FixedOffset,
) -> NaiveDate {
    description
        .and_then(parse_functional_date)
        .unwrap_or_else(|| created_at.with_timezone(&venue_offset).date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_supported_formats() {
        assert_eq!(parse_functional_date("Fiesta 07.11.2025"), Some(ymd(2025, 11, 7)));
        assert_eq!(parse_functional_date("Fiesta 7.11.25 VIP"), Some(ymd(2025, 11, 7)));
        assert_eq!(parse_functional_date("lote 07112025"), Some(ymd(2025, 11, 7)));
    }

    #[test]
    fn test_parse_rejects_invalid_dates() {
        assert_eq!(parse_functional_date("31.02.2025"), None);
        assert_eq!(parse_functional_date("no date here"), None);
        assert_eq!(parse_functional_date("12345"), None);
    }

    #[test]
    fn test_skips_invalid_candidate_and_uses_next_match() {
        assert_eq!(
            parse_functional_date("31.02.2025 / 01.03.2025"),
            Some(ymd(2025, 3, 1))
        );
    }

    #[test]
    fn test_fallback_shifts_into_venue_offset() {
        // 2025-11-08 03:00 UTC 在 UTC-05:00 仍是 11-07
        let created = Utc.with_ymd_and_hms(2025, 11, 8, 3, 0, 0).unwrap();
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        assert_eq!(derive_functional_date(None, created, offset), ymd(2025, 11, 7));
        assert_eq!(
            derive_functional_date(Some("sin fecha"), created, offset),
            ymd(2025, 11, 7)
        );
        assert_eq!(
            derive_functional_date(Some("01.01.2026"), created, offset),
            ymd(2026, 1, 1)
        );
    }
}
