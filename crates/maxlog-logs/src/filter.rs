use regex::Regex;

/// Hides lines that do not mention a focus word (case-insensitive)
#[derive(Clone)]
pub struct FocusFilter {
    /// Compiled, escaped pattern
    regex: Regex,

    /// Original focus word
    word: String,
}

impl FocusFilter {
    /// Build a filter for a literal word; None when the word is blank
    pub fn new(word: &str) -> Result<Option<Self>, regex::Error> {
        let word = word.trim();
        if word.is_empty() {
            return Ok(None);
        }

        // The word is matched literally, never as a regex
        let regex = Regex::new(&format!("(?i){}", regex::escape(word)))?;

        Ok(Some(Self {
            regex,
            word: word.to_string(),
        }))
    }

    /// Check if a raw line should be shown
    pub fn matches(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }

    /// Get the focus word
    pub fn word(&self) -> &str {
        &self.word
    }
}

impl std::fmt::Debug for FocusFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusFilter")
            .field("word", &self.word)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_focus_is_case_insensitive() {
        let filter = FocusFilter::new("Invoice").unwrap().unwrap();
        assert!(filter.matches("processing INVOICE 42"));
        assert!(filter.matches("invoice done"));
        assert!(!filter.matches("order shipped"));
    }

    #[test]
    fn test_focus_is_literal() {
        let filter = FocusFilter::new("a.b[1]").unwrap().unwrap();
        assert!(filter.matches("value a.b[1] set"));
        assert!(!filter.matches("value axb1 set"));
    }

    #[test]
    fn test_blank_focus_is_none() {
        assert!(FocusFilter::new("").unwrap().is_none());
        assert!(FocusFilter::new("   ").unwrap().is_none());
    }

    #[test]
    fn test_focus_word_is_trimmed() {
        let filter = FocusFilter::new(" cron ").unwrap().unwrap();
        assert_eq!(filter.word(), "cron");
    }
}
