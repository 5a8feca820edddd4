//! Conversation state and separator-style prompt assembly.
//!
//! A [`Conversation`] holds a system preamble, a role pair, and an ordered
//! turn history, and renders the single flat string that gets tokenized for
//! training. Separator placement decides which token spans end up inside or
//! outside the loss, so every formatter here must be bit-exact: a one
//! character slip silently corrupts every example built from it.

use serde::{Deserialize, Serialize};
use vlora_core::{Result, VloraError};

/// Separator style controlling how turns, the system preamble, and
/// terminators are concatenated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeparatorStyle {
    /// Bare concatenation for caption-style pretraining records.
    Plain,
    /// Two alternating separators; the second one terminates assistant
    /// turns and usually carries the end-of-sequence marker.
    Two,
    /// Alias of [`SeparatorStyle::Two`] declared by Vicuna-family template
    /// configs. Formatting is identical.
    Vicuna,
    /// Markup-delimited role headers (ChatML-like).
    ChatMl,
    /// Declared for Llama-2 templates; formats via the default path for now.
    Llama2,
    /// Declared for Gemma templates; formats via the default path for now.
    Gemma,
    /// Declared for Mistral templates; formats via the default path for now.
    Mistral,
    /// Declared for Qwen templates; formats via the default path for now.
    Qwen,
}

impl SeparatorStyle {
    /// Stable name used in snapshots and template configs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Two => "two",
            Self::Vicuna => "vicuna",
            Self::ChatMl => "chatml",
            Self::Llama2 => "llama_2",
            Self::Gemma => "gemma",
            Self::Mistral => "mistral",
            Self::Qwen => "qwen",
        }
    }

    /// Look a style up by its stable name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "plain" => Some(Self::Plain),
            "two" => Some(Self::Two),
            "vicuna" => Some(Self::Vicuna),
            "chatml" => Some(Self::ChatMl),
            "llama_2" => Some(Self::Llama2),
            "gemma" => Some(Self::Gemma),
            "mistral" => Some(Self::Mistral),
            "qwen" => Some(Self::Qwen),
            _ => None,
        }
    }
}

impl std::fmt::Display for SeparatorStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry in a conversation's history.
///
/// `content: None` is a prompt marker: the rendered string ends with this
/// role's prefix, awaiting the model's completion. It is not an empty
/// message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// Speaker label, used only as a display prefix. Never validated.
    pub role: String,
    /// Message text, or `None` for a prompt marker.
    pub content: Option<String>,
}

impl Turn {
    /// Create a turn with content.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
        }
    }

    /// Create a prompt marker for the given role.
    pub fn marker(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: None,
        }
    }
}

/// Stop criteria advertised to downstream generation.
///
/// Advisory metadata only; prompt assembly never consults it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopCriteria {
    /// A single stop string.
    One(String),
    /// An ordered set of stop strings.
    Many(Vec<String>),
}

/// Mutable per-session conversation state.
///
/// Live conversations are clones of a registered prototype (see
/// [`crate::templates::TemplateRegistry`]), exclusively owned by the caller
/// that requested them. All fields are owned, so `Clone` yields a fully
/// independent object.
#[derive(Debug, Clone)]
pub struct Conversation {
    /// System preamble. Empty means no preamble is emitted.
    pub system: String,
    /// The (first speaker, second speaker) display labels.
    pub roles: (String, String),
    /// Ordered turn history, preserved exactly as appended.
    pub history: Vec<Turn>,
    /// Number of leading turns that are exemplar context rather than live
    /// dialogue. Carried for forward compatibility; assembly never reads it.
    pub offset: usize,
    /// Active separator style.
    pub style: SeparatorStyle,
    /// Primary separator.
    pub sep: String,
    /// Secondary separator. Required before assembly under
    /// [`SeparatorStyle::Two`] / [`SeparatorStyle::Vicuna`].
    pub sep2: Option<String>,
    /// Stop string(s) for downstream generation.
    pub stop: Option<StopCriteria>,
    /// Stop token ids for downstream generation.
    pub stop_token_ids: Option<Vec<u32>>,
}

impl Conversation {
    /// Append a `(role, content)` turn. `None` content marks "generate the
    /// next completion here".
    ///
    /// No validation is performed: role identity, alternation, and marker
    /// position are the caller's responsibility. A marker anywhere but the
    /// final turn renders whatever the formatter yields.
    pub fn append_turn(&mut self, role: impl Into<String>, content: Option<String>) {
        self.history.push(Turn {
            role: role.into(),
            content,
        });
    }

    /// Append a turn with content.
    pub fn append(&mut self, role: impl Into<String>, content: impl Into<String>) {
        self.append_turn(role, Some(content.into()));
    }

    /// Append a prompt marker for `role`.
    pub fn append_marker(&mut self, role: impl Into<String>) {
        self.append_turn(role, None);
    }

    /// Render the conversation into the flat prompt string.
    ///
    /// Pure with respect to `self`: repeated calls on unchanged state yield
    /// identical strings, and nothing is mutated.
    pub fn prompt(&self) -> Result<String> {
        match self.style {
            SeparatorStyle::Two | SeparatorStyle::Vicuna => self.format_two(),
            SeparatorStyle::Plain => Ok(self.format_plain()),
            SeparatorStyle::ChatMl => Ok(self.format_chatml()),
            // Declared styles without a specialized formatter. They share
            // the default path on purpose; listing them here keeps the
            // match exhaustive, so specializing one later is a local edit.
            SeparatorStyle::Llama2
            | SeparatorStyle::Gemma
            | SeparatorStyle::Mistral
            | SeparatorStyle::Qwen => Ok(self.format_default()),
        }
    }

    /// Two-separator formatting: even-indexed turns close with `sep`,
    /// odd-indexed turns close with `sep2`.
    fn format_two(&self) -> Result<String> {
        let Some(sep2) = self.sep2.as_deref() else {
            return Err(VloraError::MissingSeparator(self.style.name().to_string()));
        };
        let mut out = String::new();
        if !self.system.is_empty() {
            out.push_str(&self.system);
            out.push_str(&self.sep);
        }
        for (i, turn) in self.history.iter().enumerate() {
            out.push_str(&turn.role);
            out.push(':');
            match &turn.content {
                Some(content) => {
                    out.push(' ');
                    out.push_str(content);
                    out.push_str(if i % 2 == 0 { self.sep.as_str() } else { sep2 });
                }
                // Open prompt marker: role prefix only, no separator.
                None => {}
            }
        }
        Ok(out)
    }

    /// Caption-style formatting: role and content concatenated bare, with
    /// the tail normalized to exactly one trailing separator.
    fn format_plain(&self) -> String {
        let mut out = String::new();
        if !self.system.is_empty() {
            out.push_str(&self.system);
            out.push_str(&self.sep);
        }
        for turn in &self.history {
            out.push_str(&turn.role);
            if let Some(content) = &turn.content {
                out.push_str(content);
            }
            out.push_str(&self.sep);
        }
        let trimmed_len = out.trim_end().len();
        out.truncate(trimmed_len);
        if !out.ends_with(&self.sep) {
            out.push_str(&self.sep);
        }
        out
    }

    /// Markup-delimited formatting: the system block carries its own
    /// terminator; each turn is `role`, newline, content, `sep`.
    fn format_chatml(&self) -> String {
        let mut out = String::new();
        if !self.system.is_empty() {
            out.push_str(&self.system);
        }
        let last = self.history.len().saturating_sub(1);
        for (i, turn) in self.history.iter().enumerate() {
            out.push_str(&turn.role);
            out.push('\n');
            if let Some(content) = &turn.content {
                out.push_str(content);
                out.push_str(&self.sep);
                if i != last {
                    out.push('\n');
                }
            }
        }
        out
    }

    /// Shared default path for declared-but-unspecialized styles.
    fn format_default(&self) -> String {
        let mut out = String::new();
        if !self.system.is_empty() {
            out.push_str(&self.system);
            out.push_str(&self.sep);
        }
        for turn in &self.history {
            out.push_str(&turn.role);
            if let Some(content) = &turn.content {
                out.push_str(content);
                out.push_str(&self.sep);
            }
        }
        out
    }

    /// Project every field into a plain serializable snapshot for logging
    /// or checkpoint metadata.
    ///
    /// One-way and lossless: each source field appears verbatim (the style
    /// as its stable name), but nothing reconstructs a `Conversation` from
    /// a snapshot.
    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            system: self.system.clone(),
            roles: self.roles.clone(),
            history: self
                .history
                .iter()
                .map(|t| (t.role.clone(), t.content.clone()))
                .collect(),
            offset: self.offset,
            style: self.style.name().to_string(),
            sep: self.sep.clone(),
            sep2: self.sep2.clone(),
            stop: self.stop.clone(),
            stop_token_ids: self.stop_token_ids.clone(),
        }
    }
}

/// Plain, order-preserving projection of a [`Conversation`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationSnapshot {
    /// System preamble.
    pub system: String,
    /// Role pair.
    pub roles: (String, String),
    /// Turn history as `(role, content-or-absent)` pairs.
    pub history: Vec<(String, Option<String>)>,
    /// Exemplar-context offset.
    pub offset: usize,
    /// Separator style name.
    pub style: String,
    /// Primary separator.
    pub sep: String,
    /// Secondary separator, if configured.
    pub sep2: Option<String>,
    /// Stop string(s), if configured.
    pub stop: Option<StopCriteria>,
    /// Stop token ids, if configured.
    pub stop_token_ids: Option<Vec<u32>>,
}
