//! Wire objects exchanged with the Graph API and with evsync consumers.

pub mod events;
pub mod graph;
pub mod webhook;

pub use events::{EventAction, NormalizedEvent};
pub use graph::{
    Cursors, ErrorEnvelope, GraphErrorBody, GraphEvent, GraphPage, Page, Paging, Place,
    TokenExchange,
};
pub use webhook::{WebhookChange, WebhookEntry, WebhookPayload};
