//! Token counting for context budgeting

use crate::errors::{AppError, Result};
use tiktoken_rs::CoreBPE;

/// Counts model tokens in a piece of text
pub trait Tokenizer: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// BPE tokenizer matching OpenAI chat models (cl100k_base)
pub struct TiktokenTokenizer {
    bpe: CoreBPE,
}

impl TiktokenTokenizer {
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| AppError::Configuration {
            message: format!("Failed to load cl100k_base encoding: {}", e),
        })?;
        Ok(Self { bpe })
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

/// Character-based estimate, roughly 4 bytes per token (rounded up)
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxTokenizer;

impl Tokenizer for ApproxTokenizer {
    fn count(&self, text: &str) -> usize {
        text.len().div_ceil(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approx_counts() {
        let tokenizer = ApproxTokenizer;
        assert_eq!(tokenizer.count(""), 0);
        assert_eq!(tokenizer.count("abc"), 1);
        assert_eq!(tokenizer.count("abcd"), 1);
        assert_eq!(tokenizer.count("abcde"), 2);
    }

    #[test]
    fn test_cl100k_counts() {
        let tokenizer = TiktokenTokenizer::cl100k().unwrap();
        assert_eq!(tokenizer.count(""), 0);
        let short = tokenizer.count("Leonardo da Vinci");
        let long = tokenizer.count("Leonardo da Vinci painted the Mona Lisa in Florence.");
        assert!(short > 0);
        assert!(long > short);
    }
}
