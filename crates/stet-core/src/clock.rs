use std::sync::OnceLock;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, UtcOffset};

static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

/// Captures the local UTC offset. Must run before any threads are spawned,
/// since the offset cannot be queried soundly from a multi-threaded process
/// on every platform. Falls back to UTC.
pub fn init_local_offset() -> UtcOffset {
    *LOCAL_OFFSET.get_or_init(|| UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC))
}

pub fn local_offset() -> UtcOffset {
    LOCAL_OFFSET.get().copied().unwrap_or(UtcOffset::UTC)
}

pub fn now_local() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(local_offset())
}

pub fn today() -> Date {
    now_local().date()
}

pub fn yesterday() -> Date {
    today() - Duration::days(1)
}

/// Start of the local day containing `at`.
pub fn start_of_day(at: OffsetDateTime) -> OffsetDateTime {
    at.replace_time(time::Time::MIDNIGHT)
}

pub fn format_date(date: Date) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

pub fn parse_date(value: &str) -> Option<Date> {
    let head = value.get(..10).unwrap_or(value);
    Date::parse(head, format_description!("[year]-[month]-[day]")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn date_text_uses_iso_day_format() {
        assert_eq!(format_date(date!(2024 - 01 - 05)), "2024-01-05");
        assert_eq!(parse_date("2024-01-05"), Some(date!(2024 - 01 - 05)));
    }

    #[test]
    fn parse_date_accepts_timestamps() {
        assert_eq!(
            parse_date("2025-12-19T00:00:00.000000000Z"),
            Some(date!(2025 - 12 - 19))
        );
        assert_eq!(parse_date("nope"), None);
    }

    #[test]
    fn start_of_day_keeps_offset() {
        let at = datetime!(2024-06-01 13:45:10 +02:00);
        assert_eq!(start_of_day(at), datetime!(2024-06-01 00:00:00 +02:00));
    }
}
