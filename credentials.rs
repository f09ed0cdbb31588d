use std::{env, fmt, fs, path::Path};

use serde::Deserialize;

use crate::{Error, Result};

/// A secret used to talk to a repository hosting service.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    UsernamePassword { username: String, password: String },
    Token(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UsernamePassword { username, .. } => f
                .debug_struct("UsernamePassword")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Token(_) => f.debug_tuple("Token").field(&"<redacted>").finish(),
        }
    }
}

pub trait CredentialResolver {
    /// Find the credential with `id` that applies to `scope`, a URI.
    fn lookup(&self, id: &str, scope: &str) -> Option<Credential>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct CredentialEntry {
    id: String,
    /// URI prefix the credential is restricted to.
    scope: Option<String>,
    username: Option<String>,
    password: Option<String>,
    token: Option<String>,
    /// Environment variable holding the password or token.
    secret_env: Option<String>,
}

impl CredentialEntry {
    fn applies_to(&self, scope: &str) -> bool {
        self.scope
            .as_deref()
            .map_or(true, |prefix| scope.starts_with(prefix))
    }

    fn credential(&self) -> Option<Credential> {
        let secret = || {
            self.secret_env
                .as_deref()
                .and_then(|name| env::var(name).ok())
        };
        match (&self.username, &self.password, &self.token) {
            (Some(username), password, _) => Some(Credential::UsernamePassword {
                username: username.clone(),
                password: password.clone().or_else(secret)?,
            }),
            (None, _, token) => token.clone().or_else(secret).map(Credential::Token),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    credentials: Vec<CredentialEntry>,
}

/// Credentials loaded once from a TOML file:
///
/// ```toml
/// [[credentials]]
/// id = "github"
/// scope = "https://api.github.com"
/// secret_env = "GITHUB_TOKEN"
/// ```
#[derive(Debug, Default)]
pub struct CredentialStore {
    entries: Vec<CredentialEntry>,
}

impl CredentialStore {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|error| Error::Config {
            path: path.to_owned(),
            message: error.to_string(),
        })?;
        Self::from_toml(&contents).map_err(|error| Error::Config {
            path: path.to_owned(),
            message: error.to_string(),
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        let file: CredentialsFile = toml::from_str(contents)?;
        Ok(Self {
            entries: file.credentials,
        })
    }
}

impl CredentialResolver for CredentialStore {
    fn lookup(&self, id: &str, scope: &str) -> Option<Credential> {
        tracing::debug!(id, scope, "Looking up credentials");
        let candidates = self
            .entries
            .iter()
            .filter(|entry| entry.applies_to(scope))
            .collect::<Vec<_>>();
        tracing::debug!(count = candidates.len(), "Found credentials for scope");

        let entry = candidates.into_iter().find(|entry| entry.id == id)?;
        let credential = entry.credential();
        if credential.is_none() {
            tracing::error!(id, "Credential has neither a password nor a token");
        }
        credential
    }
}
