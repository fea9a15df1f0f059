//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Query generation prompt
pub const GENERATE_QUERIES: &str = include_str!("../../prompts/generate-queries.pmt");

/// Reflection prompt
pub const REFLECT: &str = include_str!("../../prompts/reflect.pmt");

/// Final answer prompt
pub const FINAL_ANSWER: &str = include_str!("../../prompts/final-answer.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "generate-queries" => Some(GENERATE_QUERIES),
        "reflect" => Some(REFLECT),
        "final-answer" => Some(FINAL_ANSWER),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_embedded_known() {
        assert!(get_embedded("generate-queries").unwrap().contains("\"queries\""));
        assert!(get_embedded("reflect").unwrap().contains("SUFFICIENT"));
        assert!(get_embedded("final-answer").unwrap().contains("\"sources\""));
    }

    #[test]
    fn test_get_embedded_unknown() {
        assert!(get_embedded("unknown-template").is_none());
    }
}
