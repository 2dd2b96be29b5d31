use std::time::{Duration, SystemTime};

use httpdate::parse_http_date;

/// Parses a `Retry-After` header relative to `now`.
///
/// Accepts both a number of seconds and an HTTP date.
pub(crate) fn parse_retry_after(header: &str, now: SystemTime) -> Option<SystemTime> {
    let header = header.trim();
    if let Ok(value) = header.parse::<f64>() {
        if value.is_finite() && value >= 0.0 {
            return Some(now + Duration::from_secs(value.ceil() as u64));
        }
        return None;
    }
    parse_http_date(header).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds() {
        let now = SystemTime::now();
        assert_eq!(
            parse_retry_after("120", now),
            Some(now + Duration::from_secs(120))
        );
        assert_eq!(
            parse_retry_after(" 1.5 ", now),
            Some(now + Duration::from_secs(2))
        );
        assert_eq!(parse_retry_after("-3", now), None);
    }

    #[test]
    fn test_http_date() {
        let now = SystemTime::now();
        let until = parse_retry_after("Sun, 06 Nov 1994 08:49:37 GMT", now).unwrap();
        assert_eq!(
            until,
            SystemTime::UNIX_EPOCH + Duration::from_secs(784_111_777)
        );
        assert_eq!(parse_retry_after("soon", now), None);
    }
}
