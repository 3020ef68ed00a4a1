//! Named string formats for `.format`

use once_cell::sync::Lazy;
use regex::Regex;

use super::node::Format;
use crate::types::is_date;

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
        .expect("email pattern compiles")
});

static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("uuid pattern compiles")
});

static HOSTNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$")
        .expect("hostname pattern compiles")
});

static URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*:[^\s]*$").expect("uri pattern compiles")
});

impl Format {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "date-time" => Format::DateTime,
            "date" => Format::Date,
            "email" => Format::Email,
            "uuid" => Format::Uuid,
            "ipv4" => Format::Ipv4,
            "hostname" => Format::Hostname,
            "uri" => Format::Uri,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Format::DateTime => "date-time",
            Format::Date => "date",
            Format::Email => "email",
            Format::Uuid => "uuid",
            Format::Ipv4 => "ipv4",
            Format::Hostname => "hostname",
            Format::Uri => "uri",
        }
    }

    pub fn check(&self, s: &str) -> bool {
        match self {
            Format::DateTime => chrono::DateTime::parse_from_rfc3339(s).is_ok(),
            Format::Date => is_date(s) && s.len() == 10,
            Format::Email => EMAIL.is_match(s),
            Format::Uuid => UUID.is_match(s),
            Format::Ipv4 => s.parse::<std::net::Ipv4Addr>().is_ok(),
            Format::Hostname => s.len() <= 253 && HOSTNAME.is_match(s),
            Format::Uri => URI.is_match(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Format::DateTime, "2024-05-01T12:00:00+02:00", true)]
    #[case(Format::DateTime, "2024-05-01", false)]
    #[case(Format::Date, "2024-05-01", true)]
    #[case(Format::Date, "2024-13-01", false)]
    #[case(Format::Email, "alice@example.com", true)]
    #[case(Format::Email, "alice@", false)]
    #[case(Format::Uuid, "67e55044-10b1-426f-9247-bb680e5fe0c8", true)]
    #[case(Format::Uuid, "67e55044-10b1-426f", false)]
    #[case(Format::Ipv4, "10.0.0.1", true)]
    #[case(Format::Ipv4, "10.0.0.256", false)]
    #[case(Format::Hostname, "db.internal", true)]
    #[case(Format::Hostname, "-bad-.host", false)]
    #[case(Format::Uri, "https://example.com/a?b=c", true)]
    #[case(Format::Uri, "not a uri", false)]
    fn test_formats(#[case] format: Format, #[case] input: &str, #[case] expected: bool) {
        assert_eq!(format.check(input), expected);
    }

    #[test]
    fn test_parse_names_round_trip() {
        for name in ["date-time", "date", "email", "uuid", "ipv4", "hostname", "uri"] {
            assert_eq!(Format::parse(name).map(|f| f.name()), Some(name));
        }
        assert!(Format::parse("phone").is_none());
    }
}
