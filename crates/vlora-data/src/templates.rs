//! Registry of named conversation templates.
//!
//! Prototypes are registered once at startup and are read-only afterwards;
//! every lookup returns an independent clone, never the prototype itself, so
//! any number of data-preparation workers can call [`TemplateRegistry::get`]
//! concurrently through a shared reference without coordination.

use std::collections::BTreeMap;

use tracing::debug;
use vlora_core::{Result, VloraError};

use crate::conversation::{Conversation, SeparatorStyle, StopCriteria};

/// Process-wide table of conversation prototypes, keyed by template name.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, Conversation>,
}

impl TemplateRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            templates: BTreeMap::new(),
        }
    }

    /// Create a registry populated with the built-in templates.
    pub fn with_defaults() -> Self {
        let mut templates = BTreeMap::new();
        for (name, prototype) in builtin_templates() {
            templates.insert(name.to_string(), prototype);
        }
        debug!(count = templates.len(), "registered built-in conversation templates");
        Self { templates }
    }

    /// Register a prototype under `name`.
    ///
    /// Registering an already-taken name is a configuration error; the
    /// registry never silently overwrites a prototype.
    pub fn register(&mut self, name: impl Into<String>, prototype: Conversation) -> Result<()> {
        let name = name.into();
        if self.templates.contains_key(&name) {
            return Err(VloraError::Config(format!(
                "conversation template '{name}' is already registered"
            )));
        }
        self.templates.insert(name, prototype);
        Ok(())
    }

    /// Return an independent clone of the prototype registered under `name`.
    pub fn get(&self, name: &str) -> Result<Conversation> {
        self.templates.get(name).cloned().ok_or_else(|| {
            VloraError::UnknownTemplate {
                name: name.to_string(),
                known: self.names().map(str::to_string).collect(),
            }
        })
    }

    /// Iterate over the registered template names, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Check whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Number of registered templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

const VICUNA_SYSTEM: &str = "A chat between a curious user and an artificial intelligence \
                             assistant. The assistant gives helpful, detailed, and polite \
                             answers to the user's questions.";

fn conversation(
    system: &str,
    roles: (&str, &str),
    style: SeparatorStyle,
    sep: &str,
    sep2: Option<&str>,
    stop: Option<StopCriteria>,
    stop_token_ids: Option<Vec<u32>>,
) -> Conversation {
    Conversation {
        system: system.to_string(),
        roles: (roles.0.to_string(), roles.1.to_string()),
        history: Vec::new(),
        offset: 0,
        style,
        sep: sep.to_string(),
        sep2: sep2.map(str::to_string),
        stop,
        stop_token_ids,
    }
}

/// The built-in prototype set.
fn builtin_templates() -> Vec<(&'static str, Conversation)> {
    vec![
        (
            "plain",
            conversation(
                "",
                ("", ""),
                SeparatorStyle::Plain,
                "\n",
                None,
                Some(StopCriteria::One("\n".to_string())),
                None,
            ),
        ),
        (
            "v1",
            conversation(
                VICUNA_SYSTEM,
                ("USER", "ASSISTANT"),
                SeparatorStyle::Two,
                " ",
                Some("</s>"),
                Some(StopCriteria::One("</s>".to_string())),
                Some(vec![2]),
            ),
        ),
        (
            "vicuna_v1",
            conversation(
                VICUNA_SYSTEM,
                ("USER", "ASSISTANT"),
                SeparatorStyle::Vicuna,
                " ",
                Some("</s>"),
                Some(StopCriteria::One("</s>".to_string())),
                Some(vec![2]),
            ),
        ),
        (
            "chatml",
            conversation(
                "<|im_start|>system\nYou are a helpful assistant.<|im_end|>\n",
                ("<|im_start|>user", "<|im_start|>assistant"),
                SeparatorStyle::ChatMl,
                "<|im_end|>",
                None,
                Some(StopCriteria::One("<|im_end|>".to_string())),
                None,
            ),
        ),
        (
            "llama_2",
            conversation(
                "",
                ("[INST] ", " "),
                SeparatorStyle::Llama2,
                "</s>",
                None,
                Some(StopCriteria::One("</s>".to_string())),
                None,
            ),
        ),
        (
            "mistral",
            conversation(
                "",
                ("[INST] ", " [/INST] "),
                SeparatorStyle::Mistral,
                "</s>",
                None,
                Some(StopCriteria::One("</s>".to_string())),
                None,
            ),
        ),
        (
            "qwen",
            conversation(
                "",
                ("<|im_start|>user\n", "<|im_start|>assistant\n"),
                SeparatorStyle::Qwen,
                "<|im_end|>\n",
                None,
                Some(StopCriteria::One("<|im_end|>".to_string())),
                None,
            ),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_template_caption_scenario() {
        let registry = TemplateRegistry::with_defaults();
        let mut conv = registry.get("plain").unwrap();
        conv.append("", "<image>");
        conv.append("", "A red block.");
        assert_eq!(conv.prompt().unwrap(), "<image>\nA red block.\n");
    }

    #[test]
    fn v1_template_dialogue_scenario() {
        let registry = TemplateRegistry::with_defaults();
        let mut conv = registry.get("v1").unwrap();
        conv.append("USER", "<image>\nDescribe it.");
        conv.append("ASSISTANT", "It is red.");
        conv.append("USER", "What shape?");
        conv.append("ASSISTANT", "It is square.");
        conv.append_marker("ASSISTANT");
        let expected = format!(
            "{VICUNA_SYSTEM} USER: <image>\nDescribe it. ASSISTANT: It is red.</s>\
             USER: What shape? ASSISTANT: It is square.</s>ASSISTANT:"
        );
        assert_eq!(conv.prompt().unwrap(), expected);
    }

    #[test]
    fn get_returns_independent_clones() {
        let registry = TemplateRegistry::with_defaults();
        let mut first = registry.get("v1").unwrap();
        first.append("USER", "mutated");
        let second = registry.get("v1").unwrap();
        assert!(second.history.is_empty());
    }

    #[test]
    fn unknown_template_lists_registered_names() {
        let registry = TemplateRegistry::with_defaults();
        let err = registry.get("does-not-exist").unwrap_err();
        match err {
            VloraError::UnknownTemplate { name, known } => {
                assert_eq!(name, "does-not-exist");
                assert!(known.iter().any(|n| n == "plain"));
                assert!(known.iter().any(|n| n == "v1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_registration_fails_fast() {
        let mut registry = TemplateRegistry::with_defaults();
        let proto = registry.get("plain").unwrap();
        let err = registry.register("plain", proto).unwrap_err();
        assert!(matches!(err, VloraError::Config(_)), "{err}");
        // The original prototype is untouched.
        assert!(registry.get("plain").unwrap().history.is_empty());
    }

    #[test]
    fn registry_is_shareable_across_workers() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(TemplateRegistry::with_defaults());
        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                let mut conv = registry.get("v1").unwrap();
                conv.append("USER", format!("message {i}"));
                conv.append_marker("ASSISTANT");
                conv.prompt().unwrap()
            }));
        }
        for handle in handles {
            let prompt = handle.join().unwrap();
            assert!(prompt.ends_with("ASSISTANT:"));
        }
    }

    #[test]
    fn builtin_names_are_present() {
        let registry = TemplateRegistry::with_defaults();
        for name in ["plain", "v1", "vicuna_v1", "chatml", "llama_2", "mistral", "qwen"] {
            assert!(registry.contains(name), "missing template {name}");
        }
        assert_eq!(registry.len(), 7);
    }
}
