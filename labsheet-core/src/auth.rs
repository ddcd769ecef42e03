use crate::error::AuthError;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Refresh a little before the provider's expiry.
pub const DEFAULT_REFRESH_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn is_stale(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        match (&self.access_token, self.expires_at) {
            (None, _) => true,
            (Some(_), Some(expires_at)) => expires_at <= now + skew,
            (Some(_), None) => false,
        }
    }
}

/// Exchanges a refresh token for a new credential with the provider.
#[allow(async_fn_in_trait)]
pub trait TokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<Credential>;
}

/// The session's credential, refreshed in line when it is found stale.
pub struct CredentialCache<R> {
    refresher: R,
    credential: Option<Credential>,
    skew: Duration,
}

impl<R: TokenRefresher> CredentialCache<R> {
    pub fn new(refresher: R) -> Self {
        Self {
            refresher,
            credential: None,
            skew: Duration::seconds(DEFAULT_REFRESH_SKEW_SECS),
        }
    }

    pub fn with_credential(refresher: R, credential: Credential) -> Self {
        let mut cache = Self::new(refresher);
        cache.credential = Some(credential);
        cache
    }

    /// Restores a session from a remembered refresh token; the first
    /// `bearer` call fetches the access token.
    pub fn from_refresh_token(refresher: R, refresh_token: &str) -> Self {
        Self::with_credential(
            refresher,
            Credential {
                access_token: None,
                refresh_token: Some(refresh_token.to_string()),
                expires_at: None,
            },
        )
    }

    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.credential.as_ref()?.refresh_token.as_deref()
    }

    pub async fn bearer(&mut self) -> Result<String, AuthError> {
        self.bearer_at(Utc::now()).await
    }

    pub async fn bearer_at(&mut self, now: DateTime<Utc>) -> Result<String, AuthError> {
        let current = self
            .credential
            .as_ref()
            .ok_or(AuthError::MissingCredential)?;
        if !current.is_stale(now, self.skew) {
            if let Some(token) = &current.access_token {
                return Ok(token.clone());
            }
        }

        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or(AuthError::NoRefreshToken)?;
        let mut fresh = self
            .refresher
            .refresh(&refresh_token)
            .await
            .map_err(|e| AuthError::Refresh(format!("{:#}", e)))?;
        if fresh.refresh_token.is_none() {
            fresh.refresh_token = Some(refresh_token);
        }
        let token = fresh
            .access_token
            .clone()
            .ok_or_else(|| AuthError::Refresh("provider returned no access token".to_string()))?;
        tracing::debug!(expires_at = ?fresh.expires_at, "refreshed credential");
        self.credential = Some(fresh);
        Ok(token)
    }

    /// Forgets the credential, returning it so the caller can clear any
    /// remembered refresh token.
    pub fn sign_out(&mut self) -> Option<Credential> {
        self.credential.take()
    }
}
