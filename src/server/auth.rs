//! API key authentication.

use std::collections::HashMap;
use std::path::Path;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tablesync_core::protocol::{ErrorBody, ErrorCode};

use super::routes::AppState;

/// API key entry in config
#[derive(Debug, Clone, Deserialize)]
struct ApiKeyEntry {
    key: String,
    user_id: String,
    group_id: String,
}

/// Config file structure
#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    api_keys: Vec<ApiKeyEntry>,
}

/// Authenticated user info, added to request extensions after auth
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
    pub group_id: String,
}

/// API key store - maps key -> AuthUser
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashMap<String, AuthUser>,
}

impl ApiKeyStore {
    /// Load API keys from the config file. Missing or invalid files yield no keys.
    pub fn load(config_path: &Path) -> Self {
        match std::fs::read_to_string(config_path) {
            Ok(contents) => match Self::from_yaml(&contents) {
                Ok(store) => {
                    tracing::info!(count = store.len(), "loaded API keys");
                    store
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}",
                    config_path.display(),
                    e
                );
                tracing::warn!("No API keys loaded - all authenticated requests will fail");
                Self::default()
            }
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        let config: ConfigFile = serde_yaml::from_str(contents)?;
        let keys = config
            .api_keys
            .into_iter()
            .map(|entry| {
                (
                    entry.key,
                    AuthUser {
                        user_id: entry.user_id,
                        group_id: entry.group_id,
                    },
                )
            })
            .collect();
        Ok(Self { keys })
    }

    #[cfg(test)]
    pub fn insert(&mut self, key: impl Into<String>, user: AuthUser) {
        self.keys.insert(key.into(), user);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Validate an API key and return the associated user
    pub fn validate(&self, key: &str) -> Option<AuthUser> {
        self.keys.get(key).cloned()
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody::new(ErrorCode::Unauthorized, message)),
    )
        .into_response()
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let api_key = match auth_header {
        Some(h) => match h.strip_prefix("Bearer ") {
            Some(key) => key,
            None => return unauthorized("Authorization header must use Bearer scheme"),
        },
        None => return unauthorized("Authorization header required"),
    };

    match state.api_keys.validate(api_key) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => unauthorized("Invalid API key"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml() {
        let store = ApiKeyStore::from_yaml(
            r#"
api_keys:
  - key: "secret"
    user_id: "erik"
    group_id: "family"
"#,
        )
        .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(
            store.validate("secret"),
            Some(AuthUser {
                user_id: "erik".to_string(),
                group_id: "family".to_string(),
            })
        );
        assert_eq!(store.validate("wrong"), None);
    }

    #[test]
    fn test_missing_file_loads_no_keys() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = ApiKeyStore::load(&temp.path().join("missing.yaml"));
        assert_eq!(store.len(), 0);
    }
}
