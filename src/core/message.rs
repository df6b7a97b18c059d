use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    User,
    Assistant,
}

impl TranscriptRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TranscriptRole::User => "user",
            TranscriptRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: TranscriptRole,
    pub content: String,
}

/// Displayed conversation history of one session. Entries are only ever
/// appended.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn push(&mut self, role: TranscriptRole, content: impl Into<String>) {
        self.entries.push(TranscriptEntry {
            role,
            content: content.into(),
        });
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_keep_insertion_order() {
        let mut transcript = Transcript::default();
        transcript.push(TranscriptRole::User, "list my repos");
        transcript.push(TranscriptRole::Assistant, "acme/widgets");

        let roles: Vec<&str> = transcript
            .entries()
            .iter()
            .map(|entry| entry.role.as_str())
            .collect();
        assert_eq!(roles, vec!["user", "assistant"]);
        assert_eq!(
            transcript.last().map(|entry| entry.content.as_str()),
            Some("acme/widgets")
        );
    }
}
