//! Client side of the CAS protocol: login redirects, service ticket
//! validation and logout redirects. Nothing here touches a Rocket request or
//! a session; the routes at the crate root execute what this module decides.

mod client;
mod dispatch;
mod flow;
mod logout;
mod parse;
pub use client::*;
pub use dispatch::*;
pub use flow::*;
pub use logout::*;
pub use parse::*;
use crate::*;

use std::collections::BTreeMap;

/// Opaque single-use token issued by the provider for one service URL.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceTicket(String);

impl ServiceTicket {
    pub fn new(ticket: impl Into<String>) -> Self {
        ServiceTicket(ticket.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tickets are bearer credentials until consumed.
impl std::fmt::Debug for ServiceTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ServiceTicket(..)")
    }
}

/// The URL a ticket was requested for. Must be presented unchanged at
/// validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUrl(String);

impl ServiceUrl {
    /// Uses the static service URL when configured, else the current request
    /// URL without the ticket parameter.
    pub fn derive(config: &CasConfig, current: &Url) -> Self {
        if let Some(service) = &config.service {
            return ServiceUrl(service.clone());
        }

        let mut url = current.clone();
        let kept: Vec<(String, String)> = current
            .query_pairs()
            .filter(|(key, _)| key != config.ticket_param.as_str())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        url.set_fragment(None);
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
        ServiceUrl(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServiceUrl {
    fn from(url: &str) -> Self {
        ServiceUrl(url.to_string())
    }
}

impl std::fmt::Display for ServiceUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity vouched for by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user: String,
    /// CAS 2.0+ attributes. Every attribute may carry several values.
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl Principal {
    pub fn new(user: impl Into<String>) -> Self {
        Principal { user: user.into(), attributes: BTreeMap::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("malformed CAS response")]
    MalformedResponse,
    #[error("ticket not recognized{}", reason_suffix(.0))]
    TicketNotRecognized(Option<String>),
    #[error("ticket expired{}", reason_suffix(.0))]
    TicketExpired(Option<String>),
    #[error("service mismatch{}", reason_suffix(.0))]
    ServiceMismatch(Option<String>),
    #[error("CAS provider unreachable: {0}")]
    NetworkError(String),
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default()
}

impl ValidationFailure {
    /// Stable name of the failure class, safe to log.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationFailure::MalformedResponse => "malformed-response",
            ValidationFailure::TicketNotRecognized(_) => "ticket-not-recognized",
            ValidationFailure::TicketExpired(_) => "ticket-expired",
            ValidationFailure::ServiceMismatch(_) => "service-mismatch",
            ValidationFailure::NetworkError(_) => "network-error",
        }
    }

    /// Only an unreachable provider is worth a fresh login attempt without
    /// user intervention. The same ticket is never resent either way.
    pub fn is_transient(&self) -> bool {
        matches!(self, ValidationFailure::NetworkError(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Success(Principal),
    Failure(ValidationFailure),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CasConfig {
        CasConfig { base_url: String::from("https://cas.example.org/cas"), ..CasConfig::default() }
    }

    #[test]
    fn service_url_drops_ticket_and_keeps_other_params() {
        let current = Url::parse("https://app.example.org/login?next=%2Fdocs&ticket=ST-1-abc").unwrap();
        let service = ServiceUrl::derive(&config(), &current);
        assert_eq!(service.as_str(), "https://app.example.org/login?next=%2Fdocs");

        let current = Url::parse("https://app.example.org/login?ticket=ST-1-abc").unwrap();
        assert_eq!(ServiceUrl::derive(&config(), &current).as_str(), "https://app.example.org/login");
    }

    #[test]
    fn static_service_wins() {
        let config = CasConfig { service: Some(String::from("https://app.example.org/cas")), ..config() };
        let current = Url::parse("https://internal:8000/login?ticket=ST-1").unwrap();
        assert_eq!(ServiceUrl::derive(&config, &current).as_str(), "https://app.example.org/cas");
    }

    #[test]
    fn ticket_debug_is_redacted() {
        let ticket = ServiceTicket::new("ST-1-secret");
        assert!(!format!("{ticket:?}").contains("secret"));
    }

    #[test]
    fn failure_display_carries_reason() {
        let failure = ValidationFailure::TicketNotRecognized(Some(String::from("INVALID_TICKET: used")));
        assert_eq!(failure.to_string(), "ticket not recognized: INVALID_TICKET: used");
        assert_eq!(ValidationFailure::TicketNotRecognized(None).to_string(), "ticket not recognized");
        assert_eq!(failure.kind(), "ticket-not-recognized");
        assert!(!failure.is_transient());
    }
}
