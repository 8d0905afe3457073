use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Webhook request body; `events` is validated as an array by the ingress.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookBody {
    /// Bot user ID the events were sent to
    #[serde(default)]
    pub destination: Option<String>,
    /// Raw event list
    #[serde(default)]
    pub events: Value,
}

/// An inbound webhook event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Single-use reply token; absent on unfollow and leave
    #[serde(rename = "replyToken", default)]
    pub reply_token: Option<String>,
    /// Where the event came from
    pub source: Source,
    /// Event-specific data
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Event variants, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventKind {
    /// A user sent a message
    Message {
        /// The message
        message: Message,
    },
    /// The bot was added as a friend
    Follow,
    /// The bot was blocked
    Unfollow,
    /// The bot joined a group or room
    Join,
    /// The bot left a group or room
    Leave,
    /// A postback action fired
    Postback {
        /// Postback data
        postback: Postback,
    },
    /// A beacon was entered
    Beacon {
        /// Beacon data
        beacon: Beacon,
    },
}

/// Event source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Source {
    /// One-on-one chat
    #[serde(rename_all = "camelCase")]
    User {
        /// Sender ID
        user_id: Option<String>,
    },
    /// Group chat
    #[serde(rename_all = "camelCase")]
    Group {
        /// Group ID
        group_id: String,
        /// Sender ID, when consented
        user_id: Option<String>,
    },
    /// Multi-person chat room
    #[serde(rename_all = "camelCase")]
    Room {
        /// Room ID
        room_id: String,
        /// Sender ID, when consented
        user_id: Option<String>,
    },
}

impl Source {
    /// The `type` tag of the source
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Group { .. } => "group",
            Self::Room { .. } => "room",
        }
    }
}

/// A message with its platform-assigned ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message ID
    pub id: String,
    /// Kind-specific content
    #[serde(flatten)]
    pub content: MessageContent,
}

/// Message variants, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    /// Text message
    Text {
        /// Message text
        text: String,
    },
    /// Image message
    #[serde(rename_all = "camelCase")]
    Image {
        /// Where the bytes live
        content_provider: ContentProvider,
    },
    /// Video message
    #[serde(rename_all = "camelCase")]
    Video {
        /// Where the bytes live
        content_provider: ContentProvider,
    },
    /// Audio message
    #[serde(rename_all = "camelCase")]
    Audio {
        /// Where the bytes live
        content_provider: ContentProvider,
        /// Length in milliseconds
        #[serde(default)]
        duration: u64,
    },
    /// Location message
    Location {
        /// Title
        #[serde(default)]
        title: String,
        /// Street address
        #[serde(default)]
        address: String,
        /// Latitude
        latitude: f64,
        /// Longitude
        longitude: f64,
    },
    /// Sticker message
    #[serde(rename_all = "camelCase")]
    Sticker {
        /// Package identifier
        package_id: String,
        /// Sticker identifier
        sticker_id: String,
    },
}

/// Where the bytes of a media message live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentProvider {
    /// Stored on the platform; must be fetched before it can be referenced
    #[serde(rename = "line")]
    Managed,
    /// Already hosted at public URLs
    #[serde(rename = "external", rename_all = "camelCase")]
    External {
        /// Content URL
        original_content_url: String,
        /// Preview URL
        #[serde(default)]
        preview_image_url: Option<String>,
    },
}

/// Postback payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Postback {
    /// Action data
    pub data: String,
    /// Date/time picker values
    #[serde(default)]
    pub params: Option<Value>,
}

/// Beacon payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beacon {
    /// Hardware ID of the beacon
    pub hwid: String,
    /// `enter`, `banner` or `stay`
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}
