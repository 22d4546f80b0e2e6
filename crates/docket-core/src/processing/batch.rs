//! Request planning for batch embedding.

use crate::embedding::estimate_tokens;
use std::ops::Range;

/// Splits `texts` into consecutive request ranges.
///
/// Each range holds at most `batch_size` texts and, unless a single text is
/// over budget on its own, at most `max_tokens_per_request` estimated tokens.
/// An oversized single text still gets its own range; the provider decides
/// whether to accept it.
pub fn plan_batches(
    texts: &[String],
    batch_size: usize,
    max_tokens_per_request: usize,
) -> Vec<Range<usize>> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::new();
    let mut start = 0;
    let mut tokens = 0;

    for (i, text) in texts.iter().enumerate() {
        let cost = estimate_tokens(text);
        let full = i - start >= batch_size;
        let over_budget = i > start && tokens + cost > max_tokens_per_request;
        if full || over_budget {
            batches.push(start..i);
            start = i;
            tokens = 0;
        }
        tokens += cost;
    }
    if start < texts.len() {
        batches.push(start..texts.len());
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(chars: &[usize]) -> Vec<String> {
        chars.iter().map(|n| "a".repeat(*n)).collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(plan_batches(&[], 8, 100).is_empty());
    }

    #[test]
    fn test_batch_size_limit() {
        let batches = plan_batches(&texts(&[4; 5]), 2, 1000);
        assert_eq!(batches, vec![0..2, 2..4, 4..5]);
    }

    #[test]
    fn test_token_budget_limit() {
        // 40 chars = 10 tokens each, budget 25 tokens
        let batches = plan_batches(&texts(&[40, 40, 40, 40]), 10, 25);
        assert_eq!(batches, vec![0..2, 2..4]);
    }

    #[test]
    fn test_oversized_text_gets_own_batch() {
        let batches = plan_batches(&texts(&[4, 400, 4]), 10, 20);
        assert_eq!(batches, vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn test_ranges_cover_input_in_order() {
        let input = texts(&[10, 3, 70, 12, 1, 1, 90, 5]);
        let batches = plan_batches(&input, 3, 30);
        let covered: Vec<usize> = batches.iter().flat_map(|r| r.clone()).collect();
        assert_eq!(covered, (0..input.len()).collect::<Vec<_>>());
    }
}
