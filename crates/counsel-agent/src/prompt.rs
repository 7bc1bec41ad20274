use counsel_core::{HistoryEntry, MessageType};

use crate::inference::Prompt;

/// Build the prompt passed to any inference backend.
///
/// Composes the agent's role, labelled context sections, recent turns, the
/// user's request and the list of things the answer should cover. Every
/// agent goes through here so the prompt format stays consistent.
pub struct PromptBuilder {
    role: String,
    sections: Vec<(String, String)>,
    history: Vec<(MessageType, String)>,
    request: String,
    asks: Vec<String>,
    closing: Option<String>,
}

impl PromptBuilder {
    pub fn new(role: impl Into<String>, request: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            sections: Vec::new(),
            history: Vec::new(),
            request: request.into(),
            asks: Vec::new(),
            closing: None,
        }
    }

    pub fn section(mut self, title: &str, body: impl Into<String>) -> Self {
        let body = body.into();
        if !body.trim().is_empty() {
            self.sections.push((title.to_string(), body));
        }
        self
    }

    /// The last `n` turns of `history`.
    pub fn history(mut self, history: &[HistoryEntry], n: usize) -> Self {
        let start = history.len().saturating_sub(n);
        self.history = history[start..]
            .iter()
            .map(|h| (h.message_type, h.message.clone()))
            .collect();
        self
    }

    pub fn ask(mut self, items: &[&str]) -> Self {
        self.asks.extend(items.iter().map(|s| s.to_string()));
        self
    }

    pub fn closing(mut self, text: impl Into<String>) -> Self {
        self.closing = Some(text.into());
        self
    }

    pub fn build(self) -> Prompt {
        let mut s = String::new();

        for (title, body) in &self.sections {
            s.push_str(&format!("## {title}\n\n{}\n\n---\n\n", body.trim()));
        }

        if !self.history.is_empty() {
            s.push_str("## Previous conversation\n");
            for (kind, text) in &self.history {
                let who = match kind {
                    MessageType::User => "User",
                    MessageType::Ai => "Assistant",
                };
                s.push_str(&format!("\n{who}: {text}"));
            }
            s.push_str("\n\n---\n\n");
        }

        s.push_str(&format!("User request: \"{}\"", self.request));

        if !self.asks.is_empty() {
            s.push_str("\n\nPlease provide:");
            for (i, ask) in self.asks.iter().enumerate() {
                s.push_str(&format!("\n{}. {ask}", i + 1));
            }
        }

        if let Some(closing) = &self.closing {
            s.push_str("\n\n");
            s.push_str(closing);
        }

        Prompt {
            system: self.role,
            user: s,
        }
    }
}
