use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    #[serde(rename = "assistant")]
    Agent,
}

/// A text segment of a message. Annotations mark spans that reference
/// generated files (e.g. `sandbox:/mnt/data/chart.png`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub value: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Annotation {
    FilePath {
        text: String,
        file_path: FileRef,
    },
    FileCitation {
        text: String,
        file_citation: FileRef,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    pub file_id: String,
}

/// Content passed inside a finalized thread message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: TextContent },
    ImageFile { image_file: FileRef },
    #[serde(other)]
    Unknown,
}

/// A finalized message on a conversation thread. Never mutated once the
/// service has emitted its completed event; the in-progress form only exists
/// as a sequence of deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

impl ThreadMessage {
    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                MessageContent::Text { text } => Some(text.value.as_str()),
                _ => None,
            })
            .collect()
    }

    /// File ids of generated images attached to this message.
    pub fn image_file_ids(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|part| match part {
                MessageContent::ImageFile { image_file } => Some(image_file.file_id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// File-path annotations across all text parts, in order. Used to pick
    /// local names for downloaded files.
    pub fn file_path_annotations(&self) -> Vec<(&str, &str)> {
        self.content
            .iter()
            .filter_map(|part| match part {
                MessageContent::Text { text } => Some(&text.annotations),
                _ => None,
            })
            .flatten()
            .filter_map(|annotation| match annotation {
                Annotation::FilePath { text, file_path } => {
                    Some((text.as_str(), file_path.file_id.as_str()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn has_file_content(&self) -> bool {
        !self.image_file_ids().is_empty() || !self.file_path_annotations().is_empty()
    }
}
