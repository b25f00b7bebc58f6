//! `GET /login`: sends the browser to CAS, then validates the ticket it comes
//! back with.

use crate::*;
use rocket::request::{self, FromRequest, Request};

/// Absolute URL of the current request, as the browser sees it.
pub struct CurrentUrl(pub Url);

#[derive(Debug)]
pub enum CurrentUrlError {
    MissingHost,
    Invalid,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentUrl {
    type Error = CurrentUrlError;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let host = match req.host() {
            Some(host) => host.to_string(),
            None => return request::Outcome::Error((Status::BadRequest, CurrentUrlError::MissingHost)),
        };
        let scheme = match req.headers().get_one("X-Forwarded-Proto") {
            Some(proto @ ("http" | "https")) => proto,
            _ => req.rocket().state::<CasConfig>().map(|c| c.default_scheme.as_str()).unwrap_or("https"),
        };

        match Url::parse(&format!("{scheme}://{host}{}", req.uri())) {
            Ok(url) => request::Outcome::Success(CurrentUrl(url)),
            Err(e) => {
                debug!("Can't build the request URL: {e}");
                request::Outcome::Error((Status::BadRequest, CurrentUrlError::Invalid))
            }
        }
    }
}

#[derive(Debug)]
pub enum LoginError {
    InvalidTransition(InvalidTransition),
    CantGenerateToken(jsonwebtoken::errors::Error),
}

impl<'r, 'o: 'r> Responder<'r, 'o> for LoginError {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let body = match self {
            LoginError::InvalidTransition(e) => format!("Login failed: {e}"),
            LoginError::CantGenerateToken(e) => format!("Can't generate token: {e}"),
        };
        error!("{body}");
        Ok(Response::build()
            .status(Status::InternalServerError)
            .sized_body(body.len(), Cursor::new(body))
            .finalize())
    }
}

pub struct RedirectResponse {
    location: String,
    set_cookie: Option<String>,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for RedirectResponse {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let mut response = Response::build();
        let response = response.status(Status::SeeOther)
            .header(Header::new("Location", self.location));
        if let Some(cookie) = self.set_cookie {
            response.header(Header::new("Set-Cookie", cookie));
        }
        Ok(response.finalize())
    }
}

#[derive(rocket::Responder)]
pub enum FlowResponse {
    Plain(RedirectResponse),
    Flashed(Flash<RedirectResponse>),
}

/// Carries out the effects of a login or logout outcome.
pub fn execute(outcome: Outcome, keys: &SessionKeys, cookie_domain: Option<&str>) -> Result<FlowResponse, LoginError> {
    let mut response = RedirectResponse { location: outcome.redirect, set_cookie: None };
    let mut notice = None;

    for effect in outcome.effects {
        match effect {
            Effect::BindSession(principal) => {
                let token = keys.issue(&principal).map_err(LoginError::CantGenerateToken)?;
                response.set_cookie = Some(session_cookie(&token, keys.max_age(), cookie_domain));
            }
            Effect::ClearSession => response.set_cookie = Some(remove_session_cookie(cookie_domain)),
            Effect::Notify(level, text) => notice = Some((level, text)),
        }
    }

    Ok(match notice {
        Some((Level::Success, text)) => FlowResponse::Flashed(Flash::success(response, text)),
        Some((Level::Error, text)) => FlowResponse::Flashed(Flash::error(response, text)),
        None => FlowResponse::Plain(response),
    })
}

#[get("/login")]
pub async fn login(
    current: CurrentUrl,
    config: &State<CasConfig>,
    endpoints: &State<Endpoints>,
    validator: &State<Box<dyn Validator>>,
    keys: &State<SessionKeys>,
) -> Result<FlowResponse, LoginError> {
    let outcome = login_flow(config, endpoints, &**validator.inner(), &current.0)
        .await
        .map_err(LoginError::InvalidTransition)?;
    execute(outcome, keys, config.cookie_domain.as_deref())
}
