//! Keyword emotion tagging for local replies

const POSITIVE: &[&str] = &[
    "happy",
    "excited",
    "love",
    "great",
    "wonderful",
    "amazing",
    "good",
];

const NEGATIVE: &[&str] = &[
    "sad",
    "angry",
    "hate",
    "terrible",
    "awful",
    "bad",
    "frustrated",
];

const CONFUSED: &[&str] = &["confused", "lost", "don't understand", "unclear", "what"];

/// Emotion used when nothing stands out
pub const NEUTRAL: &str = "neutral";

/// Emotion carried by degraded replies
pub const ERROR: &str = "error";

/// Tag the user's text with a coarse emotion
#[must_use]
pub fn analyze_text(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    let count = |words: &[&str]| words.iter().filter(|w| lower.contains(*w)).count();

    let positive = count(POSITIVE);
    let negative = count(NEGATIVE);

    if count(CONFUSED) > 0 {
        "confused"
    } else if positive > negative {
        "positive"
    } else if negative > positive {
        "frustrated"
    } else {
        NEUTRAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_wins() {
        assert_eq!(analyze_text("I love this but I'm confused"), "confused");
        assert_eq!(analyze_text("What is a resume?"), "confused");
    }

    #[test]
    fn test_polarity() {
        assert_eq!(analyze_text("This is great and amazing"), "positive");
        assert_eq!(analyze_text("I feel sad and frustrated"), "frustrated");
        assert_eq!(analyze_text("good day, bad day"), NEUTRAL);
        assert_eq!(analyze_text("tell me about internships"), NEUTRAL);
    }
}
