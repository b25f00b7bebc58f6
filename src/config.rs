//! CAS consumer settings, read from the `cas` table of the Rocket figment.

use crate::*;
use std::{collections::BTreeMap, time::Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidateMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CasConfig {
    /// Provider root, such as `https://cas.example.org/cas`
    pub base_url: String,
    pub login_path: String,
    pub validate_path: String,
    pub logout_path: String,
    pub ticket_param: String,
    pub service_param: String,
    /// Static parameters added to every login redirect
    pub extra_login_params: BTreeMap<String, String>,
    /// Static service URL. When unset the current request URL is used.
    pub service: Option<String>,
    pub login_redirect: String,
    pub logout_redirect: String,
    pub complete_logout: bool,
    pub validate_timeout_ms: u64,
    pub validate_method: ValidateMethod,
    /// Scheme assumed when no `X-Forwarded-Proto` header is present
    pub default_scheme: String,
    pub session_secret: String,
    pub session_max_age: usize,
    pub cookie_domain: Option<String>,
}

impl Default for CasConfig {
    fn default() -> Self {
        CasConfig {
            base_url: String::new(),
            login_path: String::from("/login"),
            validate_path: String::from("/validate"),
            logout_path: String::from("/logout"),
            ticket_param: String::from("ticket"),
            service_param: String::from("service"),
            extra_login_params: BTreeMap::new(),
            service: None,
            login_redirect: String::from("/"),
            logout_redirect: String::from("/"),
            complete_logout: true,
            validate_timeout_ms: 5000,
            validate_method: ValidateMethod::Get,
            default_scheme: String::from("https"),
            session_secret: String::new(),
            session_max_age: 8 * 60 * 60,
            cookie_domain: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cas.base_url is not set")]
    MissingBaseUrl,
    #[error("invalid {name} endpoint {url:?}: {source}")]
    InvalidEndpoint {
        name: &'static str,
        url: String,
        source: url::ParseError,
    },
    #[error("invalid static service URL {url:?}: {source}")]
    InvalidService { url: String, source: url::ParseError },
    #[error("cas.validate_timeout_ms must be greater than zero")]
    ZeroTimeout,
    #[error("cas.session_secret is not set")]
    MissingSessionSecret,
}

/// Provider endpoints, parsed once at ignite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub login: Url,
    pub validate: Url,
    pub logout: Url,
}

impl CasConfig {
    pub fn endpoints(&self) -> Result<Endpoints, ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::MissingBaseUrl);
        }
        let base = self.base_url.trim_end_matches('/');
        let endpoint = |name: &'static str, path: &str| {
            let url = format!("{base}{path}");
            Url::parse(&url).map_err(|source| ConfigError::InvalidEndpoint { name, url, source })
        };

        Ok(Endpoints {
            login: endpoint("login", &self.login_path)?,
            validate: endpoint("validate", &self.validate_path)?,
            logout: endpoint("logout", &self.logout_path)?,
        })
    }

    /// Checks everything that can be wrong before the first request arrives.
    pub fn check(&self) -> Result<Endpoints, ConfigError> {
        let endpoints = self.endpoints()?;
        if let Some(service) = &self.service {
            Url::parse(service).map_err(|source| ConfigError::InvalidService { url: service.clone(), source })?;
        }
        if self.validate_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.session_secret.is_empty() {
            return Err(ConfigError::MissingSessionSecret);
        }
        Ok(endpoints)
    }

    pub fn validate_timeout(&self) -> Duration {
        Duration::from_millis(self.validate_timeout_ms)
    }
}

/// Extracts and checks the `cas` config table, then manages the config, its
/// endpoints, the session keys and, unless one was already provided, the
/// network validator.
pub fn fairing() -> AdHoc {
    AdHoc::try_on_ignite("CAS configuration", |rocket| async move {
        let config = match rocket.figment().extract_inner::<CasConfig>("cas") {
            Ok(config) => config,
            Err(e) => {
                error!("Can't read CAS configuration: {e}");
                return Err(rocket);
            }
        };
        let endpoints = match config.check() {
            Ok(endpoints) => endpoints,
            Err(e) => {
                error!("Invalid CAS configuration: {e}");
                return Err(rocket);
            }
        };
        info!("CAS provider login endpoint: {}", endpoints.login);

        let keys = SessionKeys::new(config.session_secret.as_bytes(), config.session_max_age);
        let rocket = match rocket.state::<Box<dyn Validator>>() {
            Some(_) => rocket,
            None => {
                let validator: Box<dyn Validator> = Box::new(CasValidator::new(&config, endpoints.validate.clone()));
                rocket.manage(validator)
            }
        };
        Ok(rocket.manage(config).manage(endpoints).manage(keys))
    })
}
