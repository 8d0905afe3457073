use serde::{Deserialize, Serialize};

/// A fully built reply message object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReplyPayload {
    /// Plain text
    Text {
        /// Message text
        text: String,
    },
    /// Image addressed by public URLs
    #[serde(rename_all = "camelCase")]
    Image {
        /// Full-size image URL
        original_content_url: String,
        /// Preview image URL
        preview_image_url: String,
    },
    /// Video addressed by public URLs
    #[serde(rename_all = "camelCase")]
    Video {
        /// Video file URL
        original_content_url: String,
        /// Still-frame preview URL
        preview_image_url: String,
    },
    /// Audio addressed by a public URL
    #[serde(rename_all = "camelCase")]
    Audio {
        /// Audio file URL
        original_content_url: String,
        /// Length in milliseconds
        duration: u64,
    },
    /// Map location
    Location {
        /// Title of the location
        title: String,
        /// Street address
        address: String,
        /// Latitude
        latitude: f64,
        /// Longitude
        longitude: f64,
    },
    /// Sticker from a sticker package
    #[serde(rename_all = "camelCase")]
    Sticker {
        /// Package identifier
        package_id: String,
        /// Sticker identifier
        sticker_id: String,
    },
}

impl ReplyPayload {
    /// Build a text reply
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}
