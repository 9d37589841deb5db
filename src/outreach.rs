use once_cell::sync::Lazy;
use regex::Regex;

static OUTREACH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:ot|outreach)\s*(\d+)").expect("valid outreach regex"));

/// Outreach count encoded in a task title, e.g. `"OT 5 calls"` -> 5.
///
/// Only the first match counts. Titles with no match, or with a digit run that
/// does not fit in a `u64`, count as 0.
pub fn extract_outreach_count(title: &str) -> u64 {
    OUTREACH_PATTERN
        .captures(title)
        .and_then(|caps| caps.get(1))
        .and_then(|digits| digits.as_str().parse::<u64>().ok())
        .unwrap_or(0)
}

pub fn sum_outreach<'a>(titles: impl IntoIterator<Item = &'a str>) -> u64 {
    titles
        .into_iter()
        .map(extract_outreach_count)
        .fold(0u64, u64::saturating_add)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_match_case_insensitively() {
        assert_eq!(extract_outreach_count("Completed OT 5 calls"), 5);
        assert_eq!(extract_outreach_count("outreach12 done"), 12);
        assert_eq!(extract_outreach_count("OUTREACH   40"), 40);
        assert_eq!(extract_outreach_count("OT 3 and OT 7"), 3);
    }

    #[test]
    fn returns_zero_without_a_match() {
        assert_eq!(extract_outreach_count("no match here"), 0);
        assert_eq!(extract_outreach_count("outreach calls"), 0);
        assert_eq!(extract_outreach_count(""), 0);
    }

    #[test]
    fn matches_inside_words_like_the_pattern_does() {
        assert_eq!(extract_outreach_count("pivot3"), 3);
        assert_eq!(extract_outreach_count("hotel 2 nights ot 9"), 9);
    }

    #[test]
    fn oversized_digit_runs_count_as_zero() {
        assert_eq!(extract_outreach_count("ot 999999999999999999999999"), 0);
    }

    #[test]
    fn sums_titles() {
        assert_eq!(sum_outreach(["ot 2", "outreach 3", "nothing"]), 5);
    }
}
