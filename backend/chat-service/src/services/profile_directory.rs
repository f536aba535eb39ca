//! Identity lookup used to decorate listings with display names and avatars.

use crate::error::{AppError, AppResult};
use crate::models::ParticipantProfile;
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use uuid::Uuid;

#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// `NotFound("user")` when the identity does not exist.
    async fn profile(&self, user_id: Uuid) -> AppResult<ParticipantProfile>;
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    display_name: String,
    #[serde(default)]
    avatar_url: Option<String>,
}

/// Client for the identity service's profile endpoint
/// (`GET {base_url}/users/{user_id}/profile`).
#[derive(Clone)]
pub struct HttpProfileDirectory {
    client: Client,
    base_url: String,
}

impl HttpProfileDirectory {
    pub fn new(base_url: impl Into<String>) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| AppError::Config(format!("identity client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ProfileDirectory for HttpProfileDirectory {
    async fn profile(&self, user_id: Uuid) -> AppResult<ParticipantProfile> {
        let url = format!("{}/users/{}/profile", self.base_url, user_id);
        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(AppError::NotFound("user")),
            status if status.is_success() => {
                let body: ProfileResponse = response.json().await?;
                Ok(ParticipantProfile {
                    user_id,
                    display_name: body.display_name,
                    avatar_url: body.avatar_url,
                })
            }
            status => {
                error!(user_id = %user_id, status = %status, "identity service profile lookup failed");
                Err(AppError::ServiceUnavailable(format!(
                    "identity service returned {status}"
                )))
            }
        }
    }
}

/// In-process directory for local runs and tests.
///
/// In permissive mode unknown ids resolve to a generated profile instead of
/// `NotFound`.
#[derive(Clone, Default)]
pub struct StaticProfileDirectory {
    profiles: Arc<DashMap<Uuid, ParticipantProfile>>,
    permissive: bool,
}

impl StaticProfileDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn permissive() -> Self {
        Self {
            permissive: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, profile: ParticipantProfile) {
        self.profiles.insert(profile.user_id, profile);
    }

    /// Register a user with just a display name.
    pub fn register(&self, user_id: Uuid, display_name: &str) {
        self.insert(ParticipantProfile {
            user_id,
            display_name: display_name.to_string(),
            avatar_url: None,
        });
    }
}

#[async_trait]
impl ProfileDirectory for StaticProfileDirectory {
    async fn profile(&self, user_id: Uuid) -> AppResult<ParticipantProfile> {
        if let Some(profile) = self.profiles.get(&user_id) {
            return Ok(profile.clone());
        }
        if self.permissive {
            let short = user_id.simple().to_string();
            return Ok(ParticipantProfile {
                user_id,
                display_name: format!("user-{}", &short[..8]),
                avatar_url: None,
            });
        }
        Err(AppError::NotFound("user"))
    }
}
