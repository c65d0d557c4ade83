//! Reddit history scrubber library.
//!
//! Walks an account's posts and comments, overwrites each eligible item with
//! random text, deletes it, and keeps resumable progress in SQLite.

// Allow raw string hashes for safety - they're harmless and prevent issues if content changes
#![allow(clippy::needless_raw_string_hashes)]

pub mod config;
pub mod constants;
pub mod db;
pub mod scrubber;
pub mod source;
