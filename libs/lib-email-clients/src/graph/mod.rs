//! Microsoft Graph mail API wire types.
//!
//! Only the subset of the `/me/messages` surface the server reads and writes.

pub mod folders;
pub mod types;

pub const GRAPH_API_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Fields requested on every message list call
pub const MESSAGE_SELECT_FIELDS: &str =
    "id,subject,from,receivedDateTime,bodyPreview,hasAttachments,internetMessageId";

pub const MESSAGE_ORDER_BY: &str = "receivedDateTime DESC";
