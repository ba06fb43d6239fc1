//! Resource kinds handled by the engine.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::MigrationError;

/// Text fields that may carry a prefix to strip.
const TEXT_FIELDS: [&str; 3] = ["name", "question", "content"];

/// The family of resources a job migrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Tag groups and tags.
    Tag,
    /// FAQ groups and question/answer entries.
    Faq,
    /// Voice categories and voice profiles.
    Voice,
}

impl ResourceKind {
    /// All kinds, in a stable order.
    pub const ALL: [ResourceKind; 3] = [Self::Tag, Self::Faq, Self::Voice];

    /// Path segment used in REST endpoints.
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Faq => "faq",
            Self::Voice => "voice",
        }
    }

    /// Field holding the display name of an item.
    pub fn name_field(&self) -> &'static str {
        match self {
            Self::Faq => "question",
            Self::Tag | Self::Voice => "name",
        }
    }

    /// Fields that prefix stripping applies to.
    pub fn text_fields(&self) -> &'static [&'static str] {
        &TEXT_FIELDS
    }

    /// Default `system_id` discriminator for this kind.
    pub fn default_system_id(&self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Faq => "faq",
            Self::Voice => "voice",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tag => write!(f, "tag"),
            Self::Faq => write!(f, "faq"),
            Self::Voice => write!(f, "voice"),
        }
    }
}

impl FromStr for ResourceKind {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tag" | "tags" => Ok(Self::Tag),
            "faq" | "faqs" => Ok(Self::Faq),
            "voice" | "voices" => Ok(Self::Voice),
            other => Err(MigrationError::InvalidConfig(format!(
                "unknown resource kind '{other}', expected tag, faq or voice"
            ))),
        }
    }
}
