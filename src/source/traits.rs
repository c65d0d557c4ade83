use async_trait::async_trait;

use super::error::SourceError;
use super::models::{Cursor, EditReceipt, ItemKind, Page};

/// An authenticated session that can enumerate and mutate one user's history.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Short identifier for logs.
    fn source_id(&self) -> &'static str;

    /// List one page of the user's posts starting after `after`.
    ///
    /// # Errors
    ///
    /// Returns a classified [`SourceError`] if the listing fails.
    async fn list_posts(&self, after: Option<&str>) -> Result<Page, SourceError>;

    /// List one page of the user's comments starting after `after`.
    ///
    /// # Errors
    ///
    /// Returns a classified [`SourceError`] if the listing fails.
    async fn list_comments(&self, after: Option<&str>) -> Result<Page, SourceError>;

    /// Replace the body of an item.
    ///
    /// # Errors
    ///
    /// Returns a classified [`SourceError`]. `SourceError::Verification` means
    /// the edit was accepted but could not be confirmed.
    async fn edit_item(&self, id: &str, text: &str) -> Result<EditReceipt, SourceError>;

    /// Delete an item.
    ///
    /// # Errors
    ///
    /// Returns a classified [`SourceError`] if the delete fails.
    async fn delete_item(&self, id: &str) -> Result<(), SourceError>;

    /// List the page of `cursor.kind` that follows `cursor`.
    ///
    /// # Errors
    ///
    /// Returns a classified [`SourceError`] if the listing fails.
    async fn list(&self, cursor: &Cursor) -> Result<Page, SourceError> {
        let after = cursor.after.as_deref();
        match cursor.kind {
            ItemKind::Post => self.list_posts(after).await,
            ItemKind::Comment => self.list_comments(after).await,
        }
    }
}
