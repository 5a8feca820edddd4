//! Configuration types for vlora.

use serde::{Deserialize, Serialize};

/// Configuration for the conversation data-preparation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Path to the conversation JSONL file.
    pub data_path: String,

    /// Name of the registered conversation template to format with.
    #[serde(default = "default_template")]
    pub template: String,

    /// Folder containing images referenced by multimodal records.
    #[serde(default)]
    pub image_folder: Option<String>,

    /// Maximum sequence length after tokenization.
    #[serde(default = "default_max_seq_len")]
    pub max_seq_len: usize,

    /// Number of parallel data-preparation workers.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    /// Shuffle the dataset.
    #[serde(default = "default_true")]
    pub shuffle: bool,

    /// Random seed for shuffling.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_path: String::new(),
            template: default_template(),
            image_folder: None,
            max_seq_len: default_max_seq_len(),
            num_workers: default_num_workers(),
            shuffle: true,
            seed: default_seed(),
        }
    }
}

// Default value functions
fn default_template() -> String {
    "v1".into()
}
fn default_max_seq_len() -> usize {
    2048
}
fn default_num_workers() -> usize {
    16
}
fn default_true() -> bool {
    true
}
fn default_seed() -> u64 {
    42
}
