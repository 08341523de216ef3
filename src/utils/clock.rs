//! Wall-clock timestamps shared by telemetry records and chunk headers.

use chrono::{Local, SecondsFormat};

/// Current local time as an ISO-8601 / RFC 3339 string with microseconds
/// and UTC offset, e.g. `2025-03-14T09:26:53.589793+09:00`.
pub fn now_iso8601() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn test_now_iso8601_parses_back() {
        let stamp = now_iso8601();
        assert!(DateTime::parse_from_rfc3339(&stamp).is_ok(), "{}", stamp);
        assert!(stamp.contains('T'));
    }
}
