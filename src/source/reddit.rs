//! Reddit implementation of [`ContentSource`] over the OAuth JSON API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::error::{PermanentKind, SourceError};
use super::models::{EditReceipt, Item, ItemKind, ItemStatus, Page};
use super::traits::ContentSource;
use crate::config::{Config, RedditCredentials};
use crate::constants::HTTP_TIMEOUT_SECS;

/// Authenticated Reddit session for a single account.
pub struct RedditClient {
    client: Client,
    credentials: RedditCredentials,
    auth_url: String,
    api_url: String,
    username: String,
    page_size: u32,
    token: RwLock<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Identity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    after: Option<String>,
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    data: ThingData,
}

#[derive(Debug, Deserialize)]
struct ThingData {
    name: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    selftext: Option<String>,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    locked: bool,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    is_self: Option<bool>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    removed_by_category: Option<String>,
}

impl RedditClient {
    /// Authenticate with the password grant and confirm the identity.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Fatal` if the credentials are rejected.
    pub async fn login(config: &Config) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| SourceError::fatal(format!("failed to build HTTP client: {e}")))?;

        let auth_url = config.reddit_auth_url.trim_end_matches('/').to_string();
        let api_url = config.reddit_api_url.trim_end_matches('/').to_string();

        info!("Retrieving Reddit access token");
        let token = request_token(&client, &auth_url, &config.credentials).await?;

        let identity: Identity = client
            .get(format!("{api_url}/api/v1/me"))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| SourceError::fatal(format!("identity check failed: {e}")))?
            .error_for_status()
            .map_err(|e| SourceError::fatal(format!("identity check rejected: {e}")))?
            .json()
            .await
            .map_err(|e| SourceError::fatal(format!("invalid identity response: {e}")))?;

        if !identity.name.eq_ignore_ascii_case(&config.credentials.username) {
            warn!(
                expected = %config.credentials.username,
                actual = %identity.name,
                "Authenticated as a different user than configured"
            );
        }
        info!(username = %identity.name, "Successfully authenticated");

        Ok(Self {
            client,
            credentials: config.credentials.clone(),
            auth_url,
            api_url,
            username: identity.name,
            page_size: config.page_size,
            token: RwLock::new(token),
        })
    }

    /// The authenticated account name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Send an authorized request and classify failures.
    ///
    /// A 401 triggers a token refresh and is reported as transient so the
    /// caller's retry loop reissues the request with the new token.
    async fn send<F>(&self, build: F) -> Result<Response, SourceError>
    where
        F: Fn(&Client) -> RequestBuilder + Send,
    {
        let token = self.token.read().await.clone();
        let response = build(&self.client).bearer_auth(&token).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            self.refresh_token(&token).await?;
            return Err(SourceError::transient("access token expired; refreshed"));
        }
        Err(classify_status(status))
    }

    /// Replace `stale` with a fresh token unless another request already has.
    async fn refresh_token(&self, stale: &str) -> Result<(), SourceError> {
        let mut guard = self.token.write().await;
        if *guard != stale {
            debug!("Access token already refreshed");
            return Ok(());
        }
        let token = request_token(&self.client, &self.auth_url, &self.credentials).await?;
        *guard = token;
        debug!("Refreshed Reddit access token");
        Ok(())
    }

    async fn list_kind(&self, kind: ItemKind, after: Option<&str>) -> Result<Page, SourceError> {
        let section = match kind {
            ItemKind::Post => "submitted",
            ItemKind::Comment => "comments",
        };
        let url = format!("{}/user/{}/{section}", self.api_url, self.username);
        let limit = self.page_size.to_string();

        let response = self
            .send(|client| {
                let mut query = vec![
                    ("limit", limit.as_str()),
                    ("raw_json", "1"),
                    ("sort", "new"),
                ];
                if let Some(after) = after {
                    query.push(("after", after));
                }
                client.get(&url).query(&query)
            })
            .await?;

        let listing: Listing = response
            .json()
            .await
            .map_err(|e| SourceError::transient(format!("malformed listing: {e}")))?;

        Ok(page_from_listing(listing))
    }
}

#[async_trait]
impl ContentSource for RedditClient {
    fn source_id(&self) -> &'static str {
        "reddit"
    }

    async fn list_posts(&self, after: Option<&str>) -> Result<Page, SourceError> {
        self.list_kind(ItemKind::Post, after).await
    }

    async fn list_comments(&self, after: Option<&str>) -> Result<Page, SourceError> {
        self.list_kind(ItemKind::Comment, after).await
    }

    async fn edit_item(&self, id: &str, text: &str) -> Result<EditReceipt, SourceError> {
        let url = format!("{}/api/editusertext", self.api_url);
        let response = self
            .send(|client| {
                client
                    .post(&url)
                    .form(&[("api_type", "json"), ("thing_id", id), ("text", text)])
            })
            .await?;

        let json: Value = response
            .json()
            .await
            .map_err(|e| SourceError::Verification(format!("unreadable edit response: {e}")))?;

        if let Some(err) = api_error(&json) {
            return Err(err);
        }

        Ok(EditReceipt {
            body: edited_body(&json),
        })
    }

    async fn delete_item(&self, id: &str) -> Result<(), SourceError> {
        let url = format!("{}/api/del", self.api_url);
        self.send(|client| client.post(&url).form(&[("id", id)]))
            .await?;
        Ok(())
    }
}

async fn request_token(
    client: &Client,
    auth_url: &str,
    credentials: &RedditCredentials,
) -> Result<String, SourceError> {
    let password = credentials.login_password();
    let response = client
        .post(format!("{auth_url}/api/v1/access_token"))
        .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
        .form(&[
            ("grant_type", "password"),
            ("username", credentials.username.as_str()),
            ("password", password.as_str()),
        ])
        .send()
        .await
        .map_err(|e| SourceError::fatal(format!("token request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::fatal(format!(
            "token request rejected with status {status}"
        )));
    }

    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| SourceError::fatal(format!("invalid token response: {e}")))?;

    match (body.access_token, body.error) {
        (Some(token), _) if !token.is_empty() => Ok(token),
        (_, Some(error)) => Err(SourceError::fatal(format!(
            "authentication failed: {error}"
        ))),
        _ => Err(SourceError::fatal("authentication failed: no access token")),
    }
}

fn classify_status(status: StatusCode) -> SourceError {
    match status.as_u16() {
        400 | 403 => SourceError::permanent(PermanentKind::Forbidden, format!("HTTP {status}")),
        404 | 410 => SourceError::permanent(PermanentKind::NotFound, format!("HTTP {status}")),
        _ => SourceError::transient(format!("HTTP {status}")),
    }
}

/// Map the `json.errors` array of an `api_type=json` response.
fn api_error(json: &Value) -> Option<SourceError> {
    let errors = json.pointer("/json/errors")?.as_array()?;
    let first = errors.first()?;
    let code = first.get(0).and_then(Value::as_str).unwrap_or("UNKNOWN");
    let message = first
        .get(1)
        .and_then(Value::as_str)
        .unwrap_or(code)
        .to_string();

    Some(match code {
        "RATELIMIT" => SourceError::Transient(message),
        "THREAD_LOCKED" => SourceError::permanent(PermanentKind::Locked, message),
        "TOO_OLD" => SourceError::permanent(PermanentKind::Archived, message),
        "DELETED_COMMENT" | "DELETED_LINK" | "NO_THING_ID" => {
            SourceError::permanent(PermanentKind::NotFound, message)
        }
        "USER_REQUIRED" => SourceError::fatal(message),
        _ => SourceError::permanent(PermanentKind::Forbidden, format!("{code}: {message}")),
    })
}

fn edited_body(json: &Value) -> Option<String> {
    let data = json.pointer("/json/data/things/0/data")?;
    data.get("body")
        .or_else(|| data.get("selftext"))
        .and_then(Value::as_str)
        .map(String::from)
}

fn page_from_listing(listing: Listing) -> Page {
    let items = listing
        .data
        .children
        .into_iter()
        .filter_map(item_from_thing)
        .collect();
    let done = listing.data.after.is_none();
    Page {
        items,
        next: listing.data.after,
        done,
    }
}

fn item_from_thing(thing: Thing) -> Option<Item> {
    let kind = match thing.kind.as_str() {
        "t1" => ItemKind::Comment,
        "t3" => ItemKind::Post,
        other => {
            debug!(kind = %other, "Ignoring unexpected listing entry");
            return None;
        }
    };
    let data = thing.data;

    let body = match kind {
        ItemKind::Comment => data.body.unwrap_or_default(),
        ItemKind::Post => data.selftext.unwrap_or_default(),
    };
    let status = observed_status(&body, data.author.as_deref(), data.removed_by_category.as_deref());
    let editable = match kind {
        ItemKind::Comment => true,
        ItemKind::Post => data.is_self.unwrap_or(false),
    };

    Some(Item {
        id: data.name,
        kind,
        body,
        container: data.subreddit,
        created_at: timestamp(data.created_utc),
        editable,
        locked: data.locked || data.archived,
        status,
    })
}

fn observed_status(body: &str, author: Option<&str>, removed_by: Option<&str>) -> ItemStatus {
    if body == "[deleted]" || author == Some("[deleted]") {
        ItemStatus::Deleted
    } else if body == "[removed]" || removed_by.is_some() {
        ItemStatus::Removed
    } else {
        ItemStatus::Live
    }
}

#[allow(clippy::cast_possible_truncation)]
fn timestamp(created_utc: f64) -> DateTime<Utc> {
    Utc.timestamp_opt(created_utc as i64, 0)
        .single()
        .unwrap_or_default()
}
