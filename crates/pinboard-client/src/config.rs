use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Default delay before the fallback re-fetch that follows a confirmed pin
/// grant or invalidation.
pub const DEFAULT_FALLBACK_REFRESH: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Locale {
    #[default]
    En,
    PtBr,
}

impl FromStr for Locale {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" | "en-us" | "en-gb" => Ok(Self::En),
            "pt" | "pt-br" => Ok(Self::PtBr),
            _ => Err(()),
        }
    }
}

/// Which identities may sign in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccessMode {
    #[default]
    Open,
    InviteOnly,
}

impl FromStr for AccessMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "invite" | "invite-only" => Ok(Self::InviteOnly),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Email that is always elevated to the admin role.
    pub admin_email: Option<String>,
    /// `None` disables the fallback re-fetch.
    pub fallback_refresh: Option<Duration>,
    pub locale: Locale,
    pub access: AccessMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            admin_email: None,
            fallback_refresh: Some(DEFAULT_FALLBACK_REFRESH),
            locale: Locale::default(),
            access: AccessMode::default(),
        }
    }
}

impl StoreConfig {
    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_email
            .as_deref()
            .is_some_and(|admin| admin.eq_ignore_ascii_case(email.trim()))
    }
}

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub api_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    /// Host the sign-in is initiated from.
    pub origin: String,
    pub authorized_domains: Vec<String>,
}

/// Everything the client needs, read from the environment. Missing remote or
/// identity settings leave the corresponding part `None`; the store treats
/// that as a configuration error instead of refusing to start.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub store: StoreConfig,
    pub remote: Option<RemoteConfig>,
    pub identity: Option<IdentityConfig>,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env if present
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut store = StoreConfig {
            admin_email: get("PINBOARD_ADMIN_EMAIL"),
            ..StoreConfig::default()
        };

        if let Some(raw) = get("PINBOARD_LOCALE") {
            store.locale = raw.parse().map_err(|_| ConfigError::Invalid {
                key: "PINBOARD_LOCALE",
                value: raw.clone(),
            })?;
        }

        if let Some(raw) = get("PINBOARD_ACCESS_POLICY") {
            store.access = raw.parse().map_err(|_| ConfigError::Invalid {
                key: "PINBOARD_ACCESS_POLICY",
                value: raw.clone(),
            })?;
        }

        if let Some(raw) = get("PINBOARD_FALLBACK_REFRESH_MS") {
            let ms: u64 = raw.parse().map_err(|_| ConfigError::Invalid {
                key: "PINBOARD_FALLBACK_REFRESH_MS",
                value: raw.clone(),
            })?;
            store.fallback_refresh = (ms > 0).then(|| Duration::from_millis(ms));
        }

        let remote = match (get("PINBOARD_API_URL"), get("PINBOARD_API_KEY")) {
            (Some(api_url), Some(api_key)) => Some(RemoteConfig { api_url, api_key }),
            _ => None,
        };

        let identity = match (get("PINBOARD_IDENTITY_UID"), get("PINBOARD_IDENTITY_EMAIL")) {
            (Some(uid), Some(email)) => {
                let origin = get("PINBOARD_IDENTITY_ORIGIN").unwrap_or_else(|| "localhost".into());
                let authorized_domains = get("PINBOARD_AUTHORIZED_DOMAINS")
                    .map(|raw| {
                        raw.split(',')
                            .map(|d| d.trim().to_string())
                            .filter(|d| !d.is_empty())
                            .collect()
                    })
                    .unwrap_or_else(|| vec![origin.clone()]);
                Some(IdentityConfig {
                    uid,
                    email,
                    display_name: get("PINBOARD_IDENTITY_NAME"),
                    origin,
                    authorized_domains,
                })
            }
            _ => None,
        };

        Ok(Self {
            store,
            remote,
            identity,
        })
    }
}
