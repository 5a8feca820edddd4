//! Loss-mask construction for supervised fine-tuning samples.
//!
//! Masking consumes the conversation's raw turn history, never just the
//! assembled string: the flat string carries no role boundaries, so it alone
//! cannot say where the supervised span starts.

use vlora_core::Result;

use crate::conversation::Conversation;
use crate::tokenizer::Tokenizer;

/// Label value ignored by the loss.
pub const IGNORE_INDEX: i64 = -100;

/// A tokenized training sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Input token IDs.
    pub input_ids: Vec<u32>,
    /// Attention mask.
    pub attention_mask: Vec<u32>,
    /// Labels; `IGNORE_INDEX` for tokens excluded from the loss.
    pub labels: Vec<i64>,
}

/// Builds SFT samples from conversations, masking everything outside the
/// final second-role response.
#[derive(Debug, Clone)]
pub struct SampleBuilder {
    max_length: usize,
}

impl SampleBuilder {
    /// Create a builder that truncates samples to `max_length` tokens.
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    /// Render the conversation and locate the supervised span.
    ///
    /// Returns the full prompt string together with the byte offset where
    /// the final response begins: the last content-bearing turn spoken by
    /// the conversation's second role. The offset is computed by re-rendering
    /// the history with that turn reduced to a prompt marker, which keeps it
    /// bit-consistent with the formatter no matter the separator style.
    ///
    /// When no turn qualifies, the offset equals the string length and the
    /// whole sample is masked.
    pub fn render_with_boundary(&self, conv: &Conversation) -> Result<(String, usize)> {
        let text = conv.prompt()?;
        let response_turn = conv
            .history
            .iter()
            .rposition(|t| t.role == conv.roles.1 && t.content.is_some());
        let Some(response_turn) = response_turn else {
            let boundary = text.len();
            return Ok((text, boundary));
        };

        let mut prefix = conv.clone();
        prefix.history.truncate(response_turn + 1);
        prefix.history[response_turn].content = None;
        let mut boundary = prefix.prompt()?.len().min(text.len());
        // The plain style trims trailing whitespace, so the prefix render can
        // be shorter than the corresponding span of the full text and its
        // length may land inside a multibyte character there. Walk back to a
        // char boundary so slicing stays safe.
        while !text.is_char_boundary(boundary) {
            boundary -= 1;
        }
        Ok((text, boundary))
    }

    /// Tokenize a conversation into a masked training sample.
    pub fn build(&self, conv: &Conversation, tokenizer: &Tokenizer) -> Result<Sample> {
        let (text, boundary) = self.render_with_boundary(conv)?;

        let mut input_ids = tokenizer.encode_with_special_tokens(&text)?;
        if input_ids.len() > self.max_length {
            input_ids.truncate(self.max_length);
        }

        // Tokenize the masked prefix alone to find the split point in token
        // space.
        let prompt_ids = tokenizer.encode_with_special_tokens(&text[..boundary])?;
        let prompt_len = prompt_ids.len().min(input_ids.len());

        let mut labels: Vec<i64> = input_ids.iter().map(|&id| i64::from(id)).collect();
        for label in labels.iter_mut().take(prompt_len) {
            *label = IGNORE_INDEX;
        }

        Ok(Sample {
            attention_mask: vec![1; input_ids.len()],
            input_ids,
            labels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::TemplateRegistry;

    #[test]
    fn boundary_covers_everything_before_final_response() {
        let registry = TemplateRegistry::with_defaults();
        let mut conv = registry.get("v1").unwrap();
        conv.append("USER", "<image>\nDescribe it.");
        conv.append("ASSISTANT", "It is red.");
        conv.append("USER", "What shape?");
        conv.append("ASSISTANT", "It is square.");

        let builder = SampleBuilder::new(2048);
        let (text, boundary) = builder.render_with_boundary(&conv).unwrap();
        assert!(text[..boundary].ends_with("ASSISTANT:"));
        assert_eq!(&text[boundary..], " It is square.</s>");
    }

    #[test]
    fn boundary_for_plain_caption_is_after_image_placeholder() {
        let registry = TemplateRegistry::with_defaults();
        let mut conv = registry.get("plain").unwrap();
        conv.append("", "<image>");
        conv.append("", "A red block.");

        let builder = SampleBuilder::new(2048);
        let (text, boundary) = builder.render_with_boundary(&conv).unwrap();
        assert_eq!(text, "<image>\nA red block.\n");
        assert_eq!(&text[..boundary], "<image>\n");
        assert_eq!(&text[boundary..], "A red block.\n");
    }

    #[test]
    fn history_without_response_masks_the_whole_string() {
        let registry = TemplateRegistry::with_defaults();
        let mut conv = registry.get("v1").unwrap();
        conv.append("USER", "Hello?");
        conv.append_marker("ASSISTANT");

        let builder = SampleBuilder::new(2048);
        let (text, boundary) = builder.render_with_boundary(&conv).unwrap();
        assert_eq!(boundary, text.len());
    }

    #[test]
    fn boundary_stays_on_char_boundaries_with_unicode_whitespace() {
        let registry = TemplateRegistry::with_defaults();
        let mut conv = registry.get("plain").unwrap();
        // Trailing U+00A0 gets trimmed from the prefix render, so the raw
        // prefix length would land inside the two-byte character.
        conv.append("", "a\u{00A0}");
        conv.append("", "resp");

        let builder = SampleBuilder::new(2048);
        let (text, boundary) = builder.render_with_boundary(&conv).unwrap();
        assert_eq!(text, "a\u{00A0}\nresp\n");
        assert!(text.is_char_boundary(boundary), "boundary {boundary} splits a char");
        let prompt = &text[..boundary];
        assert!(!prompt.contains("resp"));
    }

    #[test]
    fn boundary_is_stable_across_calls() {
        let registry = TemplateRegistry::with_defaults();
        let mut conv = registry.get("v1").unwrap();
        conv.append("USER", "Hi");
        conv.append("ASSISTANT", "Hello.");

        let builder = SampleBuilder::new(2048);
        let first = builder.render_with_boundary(&conv).unwrap();
        let second = builder.render_with_boundary(&conv).unwrap();
        assert_eq!(first, second);
    }
}
