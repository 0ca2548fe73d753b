//! Period string parsing.
//!
//! Experience records carry free-form periods such as `"2019 – 2024"`,
//! `"2020-2022"`, `"2018 – Presente"` or just `"2020"`.

use std::sync::LazyLock;

use regex::Regex;

/// Open-ended period markers, matched case-insensitively.
const PRESENT_MARKERS: &str = "present|presente|actualidad|actual|now|current";

// Years may touch letters ("FY2019", "2020s") but not other digits.
static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\D)(\d{4})\s*[–—-]\s*(\d{4})(?:\D|$)").expect("valid regex")
});

static OPEN_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)(?:^|\D)(\d{{4}})\s*[–—-]\s*(?:{PRESENT_MARKERS})\b"))
        .expect("valid regex")
});

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\D)(\d{4})(?:\D|$)").expect("valid regex"));

/// A year range. `end == None` with a start means "still ongoing".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Period {
    pub start: Option<i32>,
    pub end: Option<i32>,
}

impl Period {
    pub const UNKNOWN: Self = Self {
        start: None,
        end: None,
    };

    /// Last year covered, treating an open end as the start year.
    pub fn end_or_start(&self) -> Option<i32> {
        self.end.or(self.start)
    }
}

/// Parse a raw period string.
///
/// Patterns are tried in priority order: closed range, range ending in a
/// present marker, bare year. The order matters: `"2018 – Present"` must be
/// read as open-ended, not as the single year 2018.
pub fn parse_period(raw: &str) -> Period {
    if let Some(caps) = RANGE_RE.captures(raw) {
        return Period {
            start: caps[1].parse().ok(),
            end: caps[2].parse().ok(),
        };
    }

    if let Some(caps) = OPEN_RANGE_RE.captures(raw) {
        return Period {
            start: caps[1].parse().ok(),
            end: None,
        };
    }

    if let Some(caps) = YEAR_RE.captures(raw) {
        let year = caps[1].parse().ok();
        return Period {
            start: year,
            end: year,
        };
    }

    Period::UNKNOWN
}

/// First four-digit year found in `raw`, if any.
pub fn first_year(raw: &str) -> Option<i32> {
    YEAR_RE.captures(raw).and_then(|caps| caps[1].parse().ok())
}
