//! Conversation dataset loading.
//!
//! Reads LLaVA-style JSONL corpora, maps speaker tags onto a template's role
//! pair, and tokenizes each record into a masked SFT sample.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;
use tracing::{debug, warn};
use vlora_core::{DataConfig, Dataset, Result, VloraError};

use crate::conversation::Conversation;
use crate::masking::{Sample, SampleBuilder};
use crate::templates::TemplateRegistry;
use crate::tokenizer::Tokenizer;

/// Placeholder standing in for image features in conversation text.
///
/// The conversation engine treats it as ordinary text; the vision tower
/// swaps it for image patch embeddings downstream.
pub const IMAGE_PLACEHOLDER: &str = "<image>";

/// One JSONL record: an optional image plus a speaker-tagged dialogue.
#[derive(Debug, Deserialize)]
struct ConversationRecord {
    #[serde(default)]
    image: Option<String>,
    conversations: Vec<SpeakerTurn>,
}

#[derive(Debug, Deserialize)]
struct SpeakerTurn {
    from: String,
    value: String,
}

/// An untokenized conversation built from one JSONL record.
#[derive(Debug, Clone)]
pub struct ConversationExample {
    /// Template clone populated with the record's turns.
    pub conversation: Conversation,
    /// Image file referenced by the record, if any.
    pub image: Option<String>,
}

/// Dataset of masked SFT samples built from a conversation corpus.
pub struct ConversationDataset {
    samples: Vec<Sample>,
}

impl ConversationDataset {
    /// Load a JSONL corpus and tokenize it into masked samples.
    pub fn from_jsonl_tokenized<P: AsRef<Path>>(
        path: P,
        registry: &TemplateRegistry,
        template: &str,
        tokenizer: &Tokenizer,
        max_length: usize,
    ) -> Result<Self> {
        let examples = Self::load_examples(path, registry, template)?;
        let builder = SampleBuilder::new(max_length);
        let mut samples = Vec::with_capacity(examples.len());
        for example in &examples {
            samples.push(builder.build(&example.conversation, tokenizer)?);
        }
        debug!(count = samples.len(), template, "tokenized conversation dataset");
        Ok(Self { samples })
    }

    /// Load and tokenize according to a [`DataConfig`], shuffling when the
    /// config asks for it.
    pub fn from_config(
        config: &DataConfig,
        registry: &TemplateRegistry,
        tokenizer: &Tokenizer,
    ) -> Result<Self> {
        let mut dataset = Self::from_jsonl_tokenized(
            &config.data_path,
            registry,
            &config.template,
            tokenizer,
            config.max_seq_len,
        )?;
        if config.shuffle {
            dataset.shuffle(config.seed);
        }
        Ok(dataset)
    }

    /// Parse a JSONL corpus into populated conversations without tokenizing.
    ///
    /// Speaker tags `human`/`user` map to the template's first role and
    /// `gpt`/`assistant` to its second; a `system` turn replaces the
    /// template's preamble; anything else is kept verbatim (the engine does
    /// not validate role names). Records carrying an image get the
    /// [`IMAGE_PLACEHOLDER`] prepended to their first first-role turn when
    /// the text does not already contain it.
    pub fn load_examples<P: AsRef<Path>>(
        path: P,
        registry: &TemplateRegistry,
        template: &str,
    ) -> Result<Vec<ConversationExample>> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);
        let mut examples = Vec::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }

            let record: ConversationRecord = serde_json::from_str(&line)
                .map_err(|e| VloraError::Parse(format!("line {}: {e}", line_num + 1)))?;

            let mut conv = registry.get(template)?;
            let mut placeholder_pending = record.image.is_some();

            for turn in &record.conversations {
                let role = match turn.from.as_str() {
                    "human" | "user" => conv.roles.0.clone(),
                    "gpt" | "assistant" => conv.roles.1.clone(),
                    "system" => {
                        conv.system = turn.value.clone();
                        continue;
                    }
                    other => {
                        warn!(line = line_num + 1, tag = other, "unrecognized speaker tag");
                        other.to_string()
                    }
                };

                let is_first_role = role == conv.roles.0;
                let value = if placeholder_pending && is_first_role {
                    placeholder_pending = false;
                    if turn.value.contains(IMAGE_PLACEHOLDER) {
                        turn.value.clone()
                    } else {
                        format!("{IMAGE_PLACEHOLDER}\n{}", turn.value)
                    }
                } else {
                    turn.value.clone()
                };
                conv.append(role, value);
            }

            examples.push(ConversationExample {
                conversation: conv,
                image: record.image,
            });
        }

        debug!(count = examples.len(), "loaded conversation examples");
        Ok(examples)
    }

    /// Create a dataset from pre-tokenized samples.
    pub fn from_samples(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    /// Shuffle the samples with a seeded RNG.
    pub fn shuffle(&mut self, seed: u64) {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        self.samples.shuffle(&mut rng);
    }

    /// All samples, in order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

impl Dataset for ConversationDataset {
    type Item = Sample;

    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Option<Sample> {
        self.samples.get(index).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_corpus(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    #[test]
    fn loads_and_maps_speaker_tags() {
        let file = write_corpus(&[
            r#"{"conversations": [{"from": "human", "value": "Hi"}, {"from": "gpt", "value": "Hello."}]}"#,
        ]);
        let registry = TemplateRegistry::with_defaults();
        let examples =
            ConversationDataset::load_examples(file.path(), &registry, "v1").unwrap();

        assert_eq!(examples.len(), 1);
        let conv = &examples[0].conversation;
        assert_eq!(conv.history.len(), 2);
        assert_eq!(conv.history[0].role, "USER");
        assert_eq!(conv.history[1].role, "ASSISTANT");
        assert!(conv.prompt().unwrap().contains("USER: Hi ASSISTANT: Hello.</s>"));
    }

    #[test]
    fn inserts_image_placeholder_once() {
        let file = write_corpus(&[
            r#"{"image": "000.jpg", "conversations": [{"from": "human", "value": "Describe it."}, {"from": "gpt", "value": "A red block."}]}"#,
            r#"{"image": "001.jpg", "conversations": [{"from": "human", "value": "<image>\nAnd this?"}, {"from": "gpt", "value": "A cat."}]}"#,
        ]);
        let registry = TemplateRegistry::with_defaults();
        let examples =
            ConversationDataset::load_examples(file.path(), &registry, "v1").unwrap();

        let first = examples[0].conversation.history[0].content.as_deref().unwrap();
        assert_eq!(first, "<image>\nDescribe it.");

        // Already-present placeholder is left alone.
        let second = examples[1].conversation.history[0].content.as_deref().unwrap();
        assert_eq!(second, "<image>\nAnd this?");
        assert_eq!(examples[1].image.as_deref(), Some("001.jpg"));
    }

    #[test]
    fn system_turn_replaces_template_preamble() {
        let file = write_corpus(&[
            r#"{"conversations": [{"from": "system", "value": "Be terse."}, {"from": "human", "value": "Hi"}]}"#,
        ]);
        let registry = TemplateRegistry::with_defaults();
        let examples =
            ConversationDataset::load_examples(file.path(), &registry, "v1").unwrap();

        let conv = &examples[0].conversation;
        assert_eq!(conv.system, "Be terse.");
        assert_eq!(conv.history.len(), 1);
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let file = write_corpus(&[r#"{"conversations": "#]);
        let registry = TemplateRegistry::with_defaults();
        let err =
            ConversationDataset::load_examples(file.path(), &registry, "v1").unwrap_err();
        match err {
            VloraError::Parse(msg) => assert!(msg.starts_with("line 1:"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_template_surfaces_catalog_error() {
        let file = write_corpus(&[
            r#"{"conversations": [{"from": "human", "value": "Hi"}]}"#,
        ]);
        let registry = TemplateRegistry::with_defaults();
        let err =
            ConversationDataset::load_examples(file.path(), &registry, "v9").unwrap_err();
        assert!(matches!(err, VloraError::UnknownTemplate { .. }), "{err}");
    }

    #[test]
    fn shuffle_is_seeded() {
        let samples: Vec<Sample> = (0..64)
            .map(|i| Sample {
                input_ids: vec![i as u32],
                attention_mask: vec![1],
                labels: vec![i as i64],
            })
            .collect();
        let mut a = ConversationDataset::from_samples(samples.clone());
        let mut b = ConversationDataset::from_samples(samples);
        a.shuffle(7);
        b.shuffle(7);
        assert_eq!(a.samples(), b.samples());
    }
}
