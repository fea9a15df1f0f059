//! Sufficiency classifier
//!
//! Decides whether a reflection says the evidence is enough. Markers and the
//! match mode come from configuration; matching is always case-insensitive.

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::config::{MatchMode, SufficiencyConfig};

#[derive(Debug, Error)]
pub enum SufficiencyError {
    #[error("Invalid sufficiency marker {marker:?}: {source}")]
    InvalidMarker {
        marker: String,
        #[source]
        source: regex::Error,
    },
}

/// Compiled set of sufficiency markers
#[derive(Debug, Clone)]
pub struct SufficiencyClassifier {
    patterns: Vec<Regex>,
}

impl SufficiencyClassifier {
    /// Compile the configured markers
    ///
    /// Blank markers are ignored; they would match every reflection.
    pub fn from_config(config: &SufficiencyConfig) -> Result<Self, SufficiencyError> {
        debug!(markers = config.markers.len(), mode = ?config.mode, "SufficiencyClassifier::from_config: called");
        let mut patterns = Vec::with_capacity(config.markers.len());
        for marker in config.markers.iter().map(|m| m.trim()).filter(|m| !m.is_empty()) {
            let pattern = match config.mode {
                MatchMode::Leading => format!(r"(?i)^\W*{}(?:\W|$)", regex::escape(marker)),
                MatchMode::Substring => format!("(?i){}", regex::escape(marker)),
                // Not `\b`: a marker may begin or end with punctuation
                MatchMode::WholeWord => format!(r"(?i)(?:^|\W){}(?:\W|$)", regex::escape(marker)),
                MatchMode::Regex => format!("(?i){}", marker),
            };
            let regex = Regex::new(&pattern).map_err(|source| SufficiencyError::InvalidMarker {
                marker: marker.to_string(),
                source,
            })?;
            patterns.push(regex);
        }
        Ok(Self { patterns })
    }

    /// True when any marker matches the reflection
    pub fn is_sufficient(&self, reflection: &str) -> bool {
        let matched = self.patterns.iter().any(|p| p.is_match(reflection));
        debug!(matched, "SufficiencyClassifier::is_sufficient: called");
        matched
    }
}

impl Default for SufficiencyClassifier {
    fn default() -> Self {
        Self::from_config(&SufficiencyConfig::default()).unwrap_or(Self { patterns: Vec::new() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier(markers: &[&str], mode: MatchMode) -> SufficiencyClassifier {
        SufficiencyClassifier::from_config(&SufficiencyConfig {
            markers: markers.iter().map(|m| m.to_string()).collect(),
            mode,
        })
        .unwrap()
    }

    #[test]
    fn test_default_reads_leading_verdict() {
        let c = SufficiencyClassifier::default();
        assert!(c.is_sufficient("SUFFICIENT - the results cover every point"));
        assert!(c.is_sufficient("  **Sufficient**: all figures are sourced"));
        assert!(c.is_sufficient("sufficient"));
        assert!(!c.is_sufficient("INSUFFICIENT - no data after 2022"));
        assert!(!c.is_sufficient(""));
    }

    #[test]
    fn test_default_ignores_marker_in_explanation() {
        let c = SufficiencyClassifier::default();
        assert!(!c.is_sufficient("INSUFFICIENT - the results are not sufficient to estimate regional growth"));
        assert!(!c.is_sufficient("INSUFFICIENT: sufficient for 2023 but nothing on 2024"));
        assert!(!c.is_sufficient("The evidence is sufficient."));
    }

    #[test]
    fn test_whole_word_mode_matches_anywhere() {
        let c = classifier(&["sufficient"], MatchMode::WholeWord);
        assert!(c.is_sufficient("The evidence is sufficient."));
        assert!(!c.is_sufficient("INSUFFICIENT - no data after 2022"));
    }

    #[test]
    fn test_whole_word_marker_with_punctuation() {
        let c = classifier(&["done."], MatchMode::WholeWord);
        assert!(c.is_sufficient("We are done."));
        assert!(c.is_sufficient("We are done. Next"));
        assert!(!c.is_sufficient("We are undone."));

        let c = classifier(&["[ok]"], MatchMode::WholeWord);
        assert!(c.is_sufficient("[OK] nothing missing"));
    }

    #[test]
    fn test_substring_mode_matches_inside_words() {
        let c = classifier(&["sufficient"], MatchMode::Substring);
        assert!(c.is_sufficient("INSUFFICIENT"));
    }

    #[test]
    fn test_whole_word_unicode() {
        let c = classifier(&["достаточно"], MatchMode::WholeWord);
        assert!(c.is_sufficient("Информации ДОСТАТОЧНО для ответа"));
        assert!(!c.is_sufficient("Информации недостаточно"));
    }

    #[test]
    fn test_multi_word_marker() {
        let c = classifier(&["enough evidence"], MatchMode::WholeWord);
        assert!(c.is_sufficient("There is Enough Evidence here"));
        assert!(!c.is_sufficient("not enough"));
    }

    #[test]
    fn test_regex_mode() {
        let c = classifier(&[r"^\s*sufficient\b"], MatchMode::Regex);
        assert!(c.is_sufficient("  Sufficient: yes"));
        assert!(!c.is_sufficient("It is not sufficient"));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let err = SufficiencyClassifier::from_config(&SufficiencyConfig {
            markers: vec!["(unclosed".to_string()],
            mode: MatchMode::Regex,
        })
        .unwrap_err();
        assert!(err.to_string().contains("(unclosed"));
    }

    #[test]
    fn test_blank_markers_ignored() {
        let c = classifier(&["", "   "], MatchMode::Substring);
        assert!(!c.is_sufficient("anything"));
    }

    #[test]
    fn test_special_characters_escaped_outside_regex_mode() {
        let c = classifier(&["done."], MatchMode::Substring);
        assert!(c.is_sufficient("We are done."));
        assert!(!c.is_sufficient("We are doneX"));
    }
}
