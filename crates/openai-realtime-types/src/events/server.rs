mod error;

pub use error::ErrorDetails;

use crate::items::ItemResource;

/// `error` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorEvent {
    event_id: String,

    /// Details about the error
    error: ErrorDetails,
}

impl ErrorEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn error(&self) -> &ErrorDetails {
        &self.error
    }
}

/// `session.created` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionCreatedEvent {
    event_id: String,

    /// The session resource
    session: SessionResource,
}

impl SessionCreatedEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn session(&self) -> &SessionResource {
        &self.session
    }
}

/// The provider-side view of a session. Only the identifier is inspected;
/// remaining fields are ignored on deserialization.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionResource {
    id: String,
}

impl SessionResource {
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// `conversation.item.created` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConversationItemCreatedEvent {
    event_id: String,

    /// The ID of the preceding item
    previous_item_id: Option<String>,

    /// The item that was created
    item: ItemResource,
}

impl ConversationItemCreatedEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn previous_item_id(&self) -> Option<&str> {
        self.previous_item_id.as_deref()
    }

    pub fn item(&self) -> &ItemResource {
        &self.item
    }
}

/// `response.audio.delta` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseAudioDeltaEvent {
    event_id: String,

    /// The ID of the response
    response_id: String,
    /// The ID of the item
    item_id: String,
    /// The index of the output item in the response
    output_index: i32,
    /// The index of the content part in the item's content array
    content_index: i32,
    /// The delta in the audio content, base64 encoded
    delta: String,
}

impl ResponseAudioDeltaEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn output_index(&self) -> i32 {
        self.output_index
    }

    pub fn content_index(&self) -> i32 {
        self.content_index
    }

    pub fn delta(&self) -> &str {
        &self.delta
    }
}

/// `response.audio.done` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseAudioDoneEvent {
    event_id: String,

    /// The ID of the response
    response_id: String,
    /// The ID of the item
    item_id: String,
    /// The index of the output item in the response
    output_index: i32,
    /// The index of the content part in the item's content array
    content_index: i32,
}

impl ResponseAudioDoneEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }
}

/// `response.text.delta` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseTextDeltaEvent {
    event_id: String,

    /// The ID of the response
    response_id: String,
    /// The ID of the item
    item_id: String,
    /// The index of the output item in the response
    output_index: i32,
    /// The index of the content part in the item's content array
    content_index: i32,
    /// The delta in the text content
    delta: String,
}

impl ResponseTextDeltaEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn delta(&self) -> &str {
        &self.delta
    }
}

/// `response.function_call_arguments.done` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseFunctionCallArgumentsDoneEvent {
    event_id: String,

    /// The ID of the response
    response_id: String,
    /// The ID of the function call item
    item_id: String,
    /// The index of the output item in the response
    output_index: i32,
    /// The ID of the function call
    call_id: String,
    /// The name of the called function
    name: String,
    /// The completed function calling arguments, as a JSON string
    arguments: String,
}

impl ResponseFunctionCallArgumentsDoneEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &str {
        &self.arguments
    }
}
