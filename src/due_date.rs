//! Due-date extraction from free text.
//!
//! Looks for a date phrase right after one of the markers `by`, `due`,
//! `deadline`, or `before` and resolves it relative to a reference date.
//! Supported phrases:
//!
//! | Phrase | Resolves to |
//! |--------|-------------|
//! | `today`, `tonight`, `eod`, `end of day` | the reference date |
//! | `tomorrow` | reference + 1 day |
//! | `end of week`, `eow` | the coming Friday (today if it is Friday) |
//! | `next week` | the coming Monday |
//! | `tuesday`, `next tue`, `this friday` | next occurrence after the reference date |
//! | `march 5`, `mar 5th, 2026`, `5 march` | that date, rolled to next year if already past |
//! | `2026-03-05` | that date |
//! | `3/5`, `3/5/2026` | US month/day, rolled forward when no year is given |
//!
//! The first marker followed by a parseable phrase wins; anything else is
//! the caller's cue to use a fallback offset.

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use regex::Regex;

const MAX_PHRASE_WORDS: usize = 4;
const FILLER_WORDS: &[&str] = &["by", "on", "the", "is", "of", "at"];

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:due|by|deadline|before)\b[:\s]+").expect("marker regex is valid")
    })
}

/// Extract a due date from `text`, resolved against `now`.
///
/// Returns midnight UTC of the resolved day.
pub fn extract_due_date(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let today = now.date_naive();

    for marker in marker_regex().find_iter(text) {
        let words = phrase_words(&text[marker.end()..]);
        for n in (1..=words.len().min(MAX_PHRASE_WORDS)).rev() {
            if let Some(date) = parse_phrase(&words[..n], today) {
                return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
            }
        }
    }

    None
}

fn phrase_words(rest: &str) -> Vec<String> {
    let mut words: Vec<String> = rest
        .split_whitespace()
        .take(MAX_PHRASE_WORDS + FILLER_WORDS.len())
        .map(|w| {
            w.trim_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | '(' | ')'))
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();

    let leading = words
        .iter()
        .take_while(|w| FILLER_WORDS.contains(&w.as_str()))
        .count();
    words.drain(..leading);
    words.truncate(MAX_PHRASE_WORDS);
    words
}

fn parse_phrase(words: &[String], today: NaiveDate) -> Option<NaiveDate> {
    let phrase = words.join(" ");
    match phrase.as_str() {
        "today" | "tonight" | "eod" | "end of day" | "end of today" => return Some(today),
        "tomorrow" => return today.checked_add_signed(Duration::days(1)),
        "end of week" | "end of the week" | "eow" => return Some(upcoming(today, Weekday::Fri, true)),
        "next week" => return Some(upcoming(today, Weekday::Mon, false)),
        _ => {}
    }

    match words {
        [w] => parse_weekday(w)
            .map(|wd| upcoming(today, wd, false))
            .or_else(|| NaiveDate::parse_from_str(w, "%Y-%m-%d").ok())
            .or_else(|| parse_slash_date(w, today)),
        [qualifier, w] if qualifier == "next" || qualifier == "this" => {
            parse_weekday(w).map(|wd| upcoming(today, wd, false))
        }
        [a, b] => parse_month_day(a, b, None, today).or_else(|| parse_month_day(b, a, None, today)),
        [a, b, year] => {
            let year = year.parse::<i32>().ok().filter(|y| (1970..=9999).contains(y))?;
            parse_month_day(a, b, Some(year), today)
                .or_else(|| parse_month_day(b, a, Some(year), today))
        }
        _ => None,
    }
}

/// Next date falling on `weekday`; `inclusive` allows `today` itself.
fn upcoming(today: NaiveDate, weekday: Weekday, inclusive: bool) -> NaiveDate {
    let delta = (weekday.num_days_from_monday() as i64
        - today.weekday().num_days_from_monday() as i64)
        .rem_euclid(7);
    let delta = if delta == 0 && !inclusive { 7 } else { delta };
    today + Duration::days(delta)
}

fn parse_weekday(word: &str) -> Option<Weekday> {
    let wd = match word {
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" | "tues" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" | "thur" | "thurs" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" | "sat" => Weekday::Sat,
        "sunday" | "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(wd)
}

fn parse_month(word: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    if word.len() < 3 {
        return None;
    }
    let word = word.strip_suffix('.').unwrap_or(word);
    MONTHS
        .iter()
        .position(|m| *m == word || (word.len() >= 3 && m.starts_with(word) && word.len() <= 4))
        .map(|i| i as u32 + 1)
}

fn parse_day(word: &str) -> Option<u32> {
    let digits = word
        .strip_suffix("st")
        .or_else(|| word.strip_suffix("nd"))
        .or_else(|| word.strip_suffix("rd"))
        .or_else(|| word.strip_suffix("th"))
        .unwrap_or(word);
    digits.parse::<u32>().ok().filter(|d| (1..=31).contains(d))
}

fn parse_month_day(
    month: &str,
    day: &str,
    year: Option<i32>,
    today: NaiveDate,
) -> Option<NaiveDate> {
    let month = parse_month(month)?;
    let day = parse_day(day)?;
    resolve(month, day, year, today)
}

fn parse_slash_date(word: &str, today: NaiveDate) -> Option<NaiveDate> {
    let parts: Vec<&str> = word.split('/').collect();
    match parts.as_slice() {
        [m, d] => resolve(m.parse().ok()?, d.parse().ok()?, None, today),
        [m, d, y] => {
            let year: i32 = y.parse().ok()?;
            let year = if year < 100 { 2000 + year } else { year };
            resolve(m.parse().ok()?, d.parse().ok()?, Some(year), today)
        }
        _ => None,
    }
}

fn resolve(month: u32, day: u32, year: Option<i32>, today: NaiveDate) -> Option<NaiveDate> {
    match year {
        Some(y) => NaiveDate::from_ymd_opt(y, month, day),
        None => {
            let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
            if this_year < today {
                NaiveDate::from_ymd_opt(today.year() + 1, month, day)
            } else {
                Some(this_year)
            }
        }
    }
}
