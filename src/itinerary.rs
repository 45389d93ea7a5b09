// Per-day itinerary bookkeeping shared by the package form and the package store

use thiserror::Error;

// Longest package the form accepts. Resizing is capped to it as well.
pub const MAX_DURATION_DAYS: u32 = 365;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItineraryError {
    #[error("Itinerary must have at least one day")]
    Empty,

    #[error("Please fill in the itinerary for day {day}")]
    IncompleteDay { day: usize },
}

// Returns a new list of exactly duration entries, clamped to 0..=MAX_DURATION_DAYS.
// Existing entries keep their position, missing days are blank, extra days are dropped from the end.
pub fn resize_days(days: &[String], duration: i64) -> Vec<String> {
    let target = duration.clamp(0, MAX_DURATION_DAYS as i64) as usize;

    let mut resized: Vec<String> = days.iter().take(target).cloned().collect();
    resized.resize(target, String::new());
    resized
}

// Day numbers in errors are 1-based, matching what the form shows
pub fn check_days(days: &[String]) -> Result<(), ItineraryError> {
    if days.is_empty() {
        return Err(ItineraryError::Empty);
    }

    match days.iter().position(|day| day.trim().is_empty()) {
        Some(index) => Err(ItineraryError::IncompleteDay { day: index + 1 }),
        None => Ok(()),
    }
}

pub fn trim_days(days: &[String]) -> Vec<String> {
    days.iter().map(|day| day.trim().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn days(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test_case(&[], 3, &["", "", ""]; "#1 Grow from empty")]
    #[test_case(&["a", "b"], 4, &["a", "b", "", ""]; "#2 Pad keeps existing entries")]
    #[test_case(&["a", "b", "c", "d", "e"], 2, &["a", "b"]; "#3 Truncate from the end")]
    #[test_case(&["a", "b"], 2, &["a", "b"]; "#4 Same length is unchanged")]
    #[test_case(&["a", "b"], 0, &[]; "#5 Zero clears")]
    #[test_case(&["a", "b"], -4, &[]; "#6 Negative clears")]
    fn test_resize_days(input: &[&str], duration: i64, expected: &[&str]) {
        let resized = resize_days(&days(input), duration);
        assert_eq!(resized, days(expected));
        assert_eq!(resized.len(), duration.max(0) as usize);
    }

    #[test_case(366; "#1 Just over the limit")]
    #[test_case(5_000_000_000; "#2 Billions of days")]
    #[test_case(i64::MAX; "#3 Largest value")]
    fn test_resize_days_is_capped(duration: i64) {
        let resized = resize_days(&days(&["Arrive"]), duration);
        assert_eq!(resized.len(), MAX_DURATION_DAYS as usize);
        assert_eq!(resized[0], "Arrive");
    }

    #[test]
    fn test_resize_is_pure() {
        let original = days(&["a", "b", "c"]);
        let _ = resize_days(&original, 1);
        assert_eq!(original.len(), 3);
    }

    #[test]
    fn test_resize_sequence_preserves_prefix() {
        // Shrinking then growing loses the dropped tail
        let start = days(&["Day1", "Day2", "Day3"]);
        let shrunk = resize_days(&start, 1);
        let grown = resize_days(&shrunk, 3);
        assert_eq!(grown, days(&["Day1", "", ""]));
    }

    #[test_case(&[], Err(ItineraryError::Empty); "#1 Empty list")]
    #[test_case(&["Day1", "  ", "Day3"], Err(ItineraryError::IncompleteDay { day: 2 }); "#2 Blank middle day")]
    #[test_case(&["", ""], Err(ItineraryError::IncompleteDay { day: 1 }); "#3 First blank day wins")]
    #[test_case(&["Day1", "Day2"], Ok(()); "#4 Complete")]
    fn test_check_days(input: &[&str], expected: Result<(), ItineraryError>) {
        assert_eq!(check_days(&days(input)), expected);
    }

    #[test]
    fn test_trim_days() {
        assert_eq!(
            trim_days(&days(&["  Beach  ", "Temple\n"])),
            days(&["Beach", "Temple"])
        );
    }
}
