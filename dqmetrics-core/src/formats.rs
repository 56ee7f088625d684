//! Date and number format detection.
//!
//! Detection returns a stable label for the first known layout a value
//! matches. Labels use strptime notation (`%Y-%m-%d %H:%M:%S.%f`) for dates
//! and the pattern text for numbers, so values of a column can be grouped by
//! the layout they were written in.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::Value;

/// Date layouts, in detection order.
const DATE_LAYOUTS: [&str; 18] = [
    "%Y-%m-%d", "%y-%m-%d", "%Y/%m/%d", "%y/%m/%d", "%Y.%m.%d", "%y.%m.%d", "%d-%m-%Y",
    "%d-%m-%y", "%d/%m/%Y", "%d/%m/%y", "%d.%m.%Y", "%d.%m.%y", "%m-%d-%Y", "%m-%d-%y",
    "%m/%d/%Y", "%m/%d/%y", "%m.%d.%Y", "%m.%d.%y",
];

/// Separators placed between a date layout and a time layout.
const DATETIME_SEPARATORS: [&str; 3] = ["T", " ", ", "];

/// Time layouts, in detection order.
const TIME_LAYOUTS: [&str; 4] = ["%H:%M:%S", "%H:%M:%S.%f", "%H:%M:%S.%fZ", "%H:%M:%S.%f%z"];

/// Numeric layouts tried after integer and float parsing.
const NUMERIC_PATTERNS: [&str; 8] = [
    r"^\d+$",
    r"^[+-]\d+$",
    r"^(\d{1,3},)+(\d{3})$",
    r"^(\d{1,3},)+(\d{3})\.\d+$",
    r"^[+-](\d{1,3},)(\d{3})+$",
    r"^[+-](\d{1,3},)+(\d{3})\.\d+$",
    r"^\d+\.\d+$",
    r"^[+-]\d+\.\d+$",
];

/// A compiled date layout.
struct DateLayout {
    label: String,
    shape: Regex,
    chrono_format: String,
    has_time: bool,
    has_offset: bool,
}

impl DateLayout {
    fn new(label: String) -> Option<Self> {
        let shape = Regex::new(&shape_pattern(&label)).ok()?;
        Some(Self {
            chrono_format: to_chrono_format(&label),
            has_time: label.contains("%H"),
            has_offset: label.contains("%z"),
            shape,
            label,
        })
    }

    fn parse(&self, value: &str) -> Option<NaiveDateTime> {
        if !self.shape.is_match(value) {
            return None;
        }
        if self.has_offset {
            DateTime::parse_from_str(value, &self.chrono_format)
                .ok()
                .map(|dt| dt.naive_utc())
        } else if self.has_time {
            NaiveDateTime::parse_from_str(value, &self.chrono_format).ok()
        } else {
            NaiveDate::parse_from_str(value, &self.chrono_format)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        }
    }
}

fn date_layouts() -> &'static [DateLayout] {
    static LAYOUTS: OnceLock<Vec<DateLayout>> = OnceLock::new();
    LAYOUTS.get_or_init(|| {
        let mut labels: Vec<String> = DATE_LAYOUTS.iter().map(|d| (*d).to_string()).collect();
        for date in DATE_LAYOUTS {
            for separator in DATETIME_SEPARATORS {
                for time in TIME_LAYOUTS {
                    labels.push(format!("{date}{separator}{time}"));
                }
            }
        }
        labels.into_iter().filter_map(DateLayout::new).collect()
    })
}

fn numeric_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        NUMERIC_PATTERNS
            .iter()
            .map(|p| (*p, Regex::new(p).expect("Invalid numeric pattern")))
            .collect()
    })
}

fn integer_pattern() -> &'static Regex {
    static INTEGER: OnceLock<Regex> = OnceLock::new();
    INTEGER.get_or_init(|| Regex::new(r"^[+-]?\d+(_\d+)*$").expect("Invalid integer pattern"))
}

/// Builds an anchored regex matching the textual shape of a strptime layout.
///
/// chrono accepts years of any width for `%Y`; the shape check keeps `%Y`
/// at four digits and `%y` at two.
fn shape_pattern(label: &str) -> String {
    let mut pattern = String::from("^");
    let mut chars = label.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            pattern.push_str(&regex::escape(&c.to_string()));
            continue;
        }
        match chars.next() {
            Some('Y') => pattern.push_str(r"\d{4}"),
            Some('y') => pattern.push_str(r"\d{2}"),
            Some('m' | 'd' | 'H' | 'M' | 'S') => pattern.push_str(r"\d{1,2}"),
            Some('f') => pattern.push_str(r"\d{1,6}"),
            Some('z') => pattern.push_str(r"(Z|[+-]\d{2}:?\d{2})"),
            Some(other) => pattern.push_str(&regex::escape(&format!("%{other}"))),
            None => pattern.push('%'),
        }
    }
    pattern.push('$');
    pattern
}

/// Converts strptime fraction notation to chrono's.
fn to_chrono_format(format: &str) -> String {
    format.replace(".%f", "%.f").replace("%f", "%6f")
}

/// Returns the label of the first date layout the value matches.
pub fn detect_date_format(value: &str) -> Option<&'static str> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    date_layouts()
        .iter()
        .find(|layout| layout.parse(value).is_some())
        .map(|layout| layout.label.as_str())
}

/// Returns the numeric format label of a value.
///
/// `int` for integers (booleans included), `float` for anything parsing as a
/// float, otherwise the first matching numeric pattern.
pub fn detect_numeric_format(value: &Value) -> Option<&'static str> {
    let text = match value {
        Value::Null => return None,
        Value::Bool(_) => return Some("int"),
        Value::Number(n) if n.is_i64() || n.is_u64() => return Some("int"),
        Value::Number(_) => return Some("float"),
        Value::String(s) => s.trim(),
        Value::Array(_) | Value::Object(_) => return None,
    };
    if integer_pattern().is_match(text) {
        return Some("int");
    }
    if text.parse::<f64>().is_ok() {
        return Some("float");
    }
    numeric_patterns()
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(label, _)| *label)
}

/// Parses a timestamp in RFC 3339 or any known date layout.
///
/// Offset-aware values are normalised to UTC.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    date_layouts().iter().find_map(|layout| layout.parse(value))
}

/// Parses a timestamp with an explicit strptime-style format.
pub fn parse_with_format(value: &str, format: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    let format = to_chrono_format(format);
    if format.contains("%z") {
        return DateTime::parse_from_str(value, &format)
            .ok()
            .map(|dt| dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(value, &format).ok().or_else(|| {
        NaiveDate::parse_from_str(value, &format)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })
}

/// Renders a duration in seconds as `[N day(s), ]H:MM:SS`.
pub fn format_duration(seconds: i64) -> String {
    let days = seconds.div_euclid(86_400);
    let rest = seconds.rem_euclid(86_400);
    let clock = format!("{}:{:02}:{:02}", rest / 3600, (rest % 3600) / 60, rest % 60);
    if days == 0 {
        clock
    } else {
        let plural = if days.abs() == 1 { "" } else { "s" };
        format!("{days} day{plural}, {clock}")
    }
}
