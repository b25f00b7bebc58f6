//! One login attempt, from the first hit on the login route to a bound
//! session or a rejection, expressed as effects for the embedding
//! application to carry out.

use super::*;

pub const LOGIN_SUCCESS: &str = "Login successful.";
pub const LOGIN_FAILURE: &str = "Error authenticating with CAS.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    NoTicket,
    AwaitingProvider { login_url: String },
    Validating { ticket: ServiceTicket, service: ServiceUrl },
    Authenticated(Principal),
    Rejected(ValidationFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginEvent {
    Redirected { login_url: String },
    TicketReceived { ticket: ServiceTicket, service: ServiceUrl },
    Validated(ValidationResult),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("login attempt can't go from {from} on {event}")]
pub struct InvalidTransition {
    pub from: &'static str,
    pub event: &'static str,
}

impl LoginState {
    pub fn name(&self) -> &'static str {
        match self {
            LoginState::NoTicket => "no-ticket",
            LoginState::AwaitingProvider { .. } => "awaiting-provider",
            LoginState::Validating { .. } => "validating",
            LoginState::Authenticated(_) => "authenticated",
            LoginState::Rejected(_) => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoginState::Authenticated(_) | LoginState::Rejected(_))
    }

    /// A rejected attempt has no way forward; a new one starts at
    /// [`LoginState::NoTicket`] with a fresh ticket.
    pub fn advance(self, event: LoginEvent) -> Result<LoginState, InvalidTransition> {
        match (self, event) {
            (LoginState::NoTicket, LoginEvent::Redirected { login_url }) => Ok(LoginState::AwaitingProvider { login_url }),
            (LoginState::AwaitingProvider { .. }, LoginEvent::TicketReceived { ticket, service }) => {
                Ok(LoginState::Validating { ticket, service })
            }
            (LoginState::Validating { .. }, LoginEvent::Validated(ValidationResult::Success(principal))) => {
                Ok(LoginState::Authenticated(principal))
            }
            (LoginState::Validating { .. }, LoginEvent::Validated(ValidationResult::Failure(failure))) => {
                Ok(LoginState::Rejected(failure))
            }
            (state, event) => Err(InvalidTransition { from: state.name(), event: event.name() }),
        }
    }
}

impl LoginEvent {
    fn name(&self) -> &'static str {
        match self {
            LoginEvent::Redirected { .. } => "redirected",
            LoginEvent::TicketReceived { .. } => "ticket-received",
            LoginEvent::Validated(_) => "validated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    BindSession(Principal),
    ClearSession,
    Notify(Level, String),
}

/// Everything a route has to do once the protocol decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub effects: Vec<Effect>,
    pub redirect: String,
    pub state: LoginState,
}

pub const LOGIN_UNAVAILABLE: &str = "CAS is unreachable, please try again.";

const LOCAL_ORIGIN: &str = "https://local.invalid/";

/// Accepts `next` only when it is a path on this site.
pub fn local_target(next: Option<&str>, default: &str) -> String {
    match next {
        Some(next) if is_local_path(next) => next.to_string(),
        Some(next) => {
            warn!("Ignoring non-local redirect target {next:?}");
            default.to_string()
        }
        None => default.to_string(),
    }
}

// Browsers drop tabs and newlines and read `\` as `/` before resolving a
// `Location`, so those never pass. What is left must resolve against a fixed
// origin without leaving it.
fn is_local_path(next: &str) -> bool {
    if !next.starts_with('/') || next.starts_with("//") || next.contains('\\') {
        return false;
    }
    if next.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return false;
    }
    match Url::parse(LOCAL_ORIGIN).and_then(|base| base.join(next)) {
        Ok(url) => url.scheme() == "https" && url.host_str() == Some("local.invalid") && url.port().is_none(),
        Err(_) => false,
    }
}

pub async fn login_flow(
    config: &CasConfig,
    endpoints: &Endpoints,
    validator: &dyn Validator,
    current: &Url,
) -> Result<Outcome, InvalidTransition> {
    let query = query_params(current);
    let next = local_target(query.get("next").map(String::as_str), &config.login_redirect);
    let state = LoginState::NoTicket;

    let (ticket, service) = match Dispatcher::new(config, endpoints).handle_login(&query, current) {
        Action::RedirectTo(login_url) => {
            info!("Redirecting to CAS login at {}", endpoints.login);
            let state = state.advance(LoginEvent::Redirected { login_url: login_url.clone() })?;
            return Ok(Outcome { effects: Vec::new(), redirect: login_url, state });
        }
        Action::Proceed { ticket, service } => (ticket, service),
    };

    // Arriving with a ticket means the provider already sent the browser back.
    let state = LoginState::AwaitingProvider { login_url: endpoints.login.to_string() }
        .advance(LoginEvent::TicketReceived { ticket: ticket.clone(), service: service.clone() })?;
    let result = validator.validate(&ticket, &service, config.validate_timeout()).await;
    let state = state.advance(LoginEvent::Validated(result))?;
    if !state.is_terminal() {
        return Err(InvalidTransition { from: state.name(), event: "validated" });
    }

    let effects = match &state {
        LoginState::Authenticated(principal) => {
            info!("CAS authenticated {}", principal.user);
            vec![Effect::BindSession(principal.clone()), Effect::Notify(Level::Success, String::from(LOGIN_SUCCESS))]
        }
        LoginState::Rejected(failure) if failure.is_transient() => {
            warn!("CAS unreachable during login: {failure}");
            vec![Effect::Notify(Level::Error, String::from(LOGIN_UNAVAILABLE))]
        }
        LoginState::Rejected(failure) => {
            warn!("CAS login rejected: {}", failure.kind());
            vec![Effect::Notify(Level::Error, String::from(LOGIN_FAILURE))]
        }
        _ => Vec::new(),
    };

    Ok(Outcome { effects, redirect: next, state })
}

pub fn logout_flow(config: &CasConfig, endpoints: &Endpoints, next: Option<&str>) -> Outcome {
    let fallback = local_target(next, &config.logout_redirect);
    let redirect = match handle_logout(endpoints, config.complete_logout, &fallback) {
        Action::RedirectTo(url) => url,
        Action::Proceed { .. } => fallback,
    };
    Outcome { effects: vec![Effect::ClearSession], redirect, state: LoginState::NoTicket }
}
