//! Credential state for a studio session.
//!
//! The credential and whether it is currently trusted travel together in a
//! [`SessionContext`] that is handed to every remote operation.

use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct SessionContext {
    api_key: Option<String>,
    authorized: bool,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("authorized", &self.authorized)
            .finish()
    }
}

impl SessionContext {
    /// A session is authorized as soon as it has a credential.
    pub fn new(api_key: Option<String>) -> Self {
        let authorized = api_key.is_some();
        Self {
            api_key,
            authorized,
        }
    }

    pub fn authorized(api_key: impl Into<String>) -> Self {
        Self::new(Some(api_key.into()))
    }

    pub fn authorize(&mut self, api_key: String) {
        self.api_key = Some(api_key);
        self.authorized = true;
    }

    /// Stop trusting the current credential until it is selected again.
    pub fn revoke(&mut self) {
        self.authorized = false;
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized && self.api_key.is_some()
    }

    pub fn api_key(&self) -> Result<&str> {
        match (&self.api_key, self.authorized) {
            (Some(key), true) => Ok(key.as_str()),
            (Some(_), false) => Err(Error::Authorization(
                "Credential was rejected; select a credential again".to_string(),
            )),
            (None, _) => Err(Error::Authorization(
                "No API credential has been selected".to_string(),
            )),
        }
    }
}

/// The interactive "select a credential" step.
#[async_trait]
pub trait CredentialSelector: Send + Sync {
    async fn select_credential(&self) -> Result<String>;
}

/// Re-reads the credential from `.env` and the process environment.
#[derive(Debug, Default)]
pub struct EnvCredentialSelector;

#[async_trait]
impl CredentialSelector for EnvCredentialSelector {
    async fn select_credential(&self) -> Result<String> {
        dotenvy::dotenv().ok();
        ["GEMINI_API_KEY", "API_KEY"]
            .iter()
            .find_map(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| {
                Error::Authorization("Set GEMINI_API_KEY (or API_KEY) to authorize".to_string())
            })
    }
}

/// Hands out a fixed credential and counts how often selection was requested.
#[derive(Clone)]
pub struct StaticCredentialSelector {
    api_key: Option<String>,
    call_count: Arc<Mutex<usize>>,
}

impl StaticCredentialSelector {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    /// A selector where the user never picks anything.
    pub fn declining() -> Self {
        Self {
            api_key: None,
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait]
impl CredentialSelector for StaticCredentialSelector {
    async fn select_credential(&self) -> Result<String> {
        *self.call_count.lock().unwrap() += 1;
        self.api_key
            .clone()
            .ok_or_else(|| Error::Authorization("No credential was selected".to_string()))
    }
}
