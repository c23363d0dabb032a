//! Answer grading for the type and dialog modes.

use serde::{Deserialize, Serialize};

/// Minimum rate for an answer to count as partially correct.
pub const PARTIAL_THRESHOLD: f64 = 0.75;

/// Outcome of grading a typed answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Correct,
    /// Close enough that the learner decides whether it counts.
    Partial,
    Wrong,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeResult {
    pub grade: Grade,
    /// `(len(expected) - distance) / len(expected)`, floored at 0.
    pub rate: f64,
    pub distance: usize,
    pub typed_normalized: String,
    pub expected_normalized: String,
}

/// Lowercase and keep letters only.
pub fn normalize_answer(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split text into lowercase alphanumeric search terms.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Grade a typed answer against the expected one.
pub fn grade_answer(typed: &str, expected: &str) -> GradeResult {
    let typed_normalized = normalize_answer(typed);
    let expected_normalized = normalize_answer(expected);
    let distance = levenshtein_distance(&typed_normalized, &expected_normalized);
    let expected_len = expected_normalized.chars().count();

    let rate = if expected_len == 0 {
        if typed_normalized.is_empty() {
            1.0
        } else {
            0.0
        }
    } else {
        (expected_len.saturating_sub(distance)) as f64 / expected_len as f64
    };

    let grade = if distance == 0 {
        Grade::Correct
    } else if rate >= PARTIAL_THRESHOLD {
        Grade::Partial
    } else {
        Grade::Wrong
    };

    GradeResult {
        grade,
        rate,
        distance,
        typed_normalized,
        expected_normalized,
    }
}

/// Calculate Levenshtein distance between two strings.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Two rows are enough
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_on_punctuation() {
        assert_eq!(tokenize("Der Hund, die Katze!"), vec!["der", "hund", "die", "katze"]);
        assert!(tokenize(" -- ").is_empty());
    }

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
        assert_eq!(levenshtein_distance("abc", ""), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("straße", "strasse"), 2);
    }

    #[test]
    fn test_normalization_strips_non_letters() {
        assert_eq!(normalize_answer("  Wie geht's? "), "wiegehts");
        assert_eq!(normalize_answer("Über-Ich 2"), "überich");
    }

    #[test]
    fn test_exact_after_normalization_is_correct() {
        let result = grade_answer("der Hund!", "Der Hund");
        assert_eq!(result.grade, Grade::Correct);
        assert_eq!(result.rate, 1.0);
    }

    #[test]
    fn test_small_typo_is_partial() {
        // "katze" vs "kaze": distance 1, rate 0.8
        let result = grade_answer("Kaze", "Katze");
        assert_eq!(result.grade, Grade::Partial);
        assert!((result.rate - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_distant_answer_is_wrong() {
        let result = grade_answer("Maus", "Katze");
        assert_eq!(result.grade, Grade::Wrong);
        let result = grade_answer("completely different and long", "ja");
        assert_eq!(result.rate, 0.0);
    }

    #[test]
    fn test_empty_expected() {
        assert_eq!(grade_answer("", "?!").grade, Grade::Correct);
        assert_eq!(grade_answer("a", "").grade, Grade::Wrong);
    }
}
