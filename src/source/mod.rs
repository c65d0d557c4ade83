//! Content sources: where a user's posts and comments come from and how they
//! are edited and deleted.

pub mod error;
pub mod models;
pub mod reddit;
pub mod traits;

pub use error::{PermanentKind, SourceError};
pub use models::{Cursor, EditReceipt, Item, ItemKind, ItemStatus, Page};
pub use reddit::RedditClient;
pub use traits::ContentSource;
