//! `GET /verify`, meant as a reverse proxy auth sub-request.

use crate::*;

#[derive(Debug)]
pub enum VerificationError {
    NotAuthenticated,
    InvalidToken(jsonwebtoken::errors::Error),
}

impl<'r, 'o: 'r> Responder<'r, 'o> for VerificationError {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let (status, body) = match self {
            VerificationError::NotAuthenticated => (Status::Unauthorized, String::from("Not authenticated")),
            VerificationError::InvalidToken(e) => (Status::Forbidden, format!("Invalid token: {e}")),
        };
        Ok(Response::build()
            .status(status)
            .sized_body(body.len(), Cursor::new(body))
            .finalize())
    }
}

pub struct SuccessfulVerification(Claims);

impl SuccessfulVerification {
    pub fn claims(&self) -> &Claims {
        &self.0
    }

    pub fn into_claims(self) -> Claims {
        self.0
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for SuccessfulVerification {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let attributes = serde_json::to_string(&self.0.attributes).unwrap_or_default();
        let response = Response::build()
            .status(Status::Ok)
            .header(Header::new("X-Cas-Principal", self.0.sub))
            .header(Header::new("X-Cas-Attributes", attributes))
            .finalize();
        Ok(response)
    }
}

#[get("/verify")]
pub fn verify(keys: &State<SessionKeys>, cookies: &CookieJar<'_>) -> Result<SuccessfulVerification, VerificationError> {
    let token_cookie = cookies.get("token").filter(|c| !c.value().is_empty()).ok_or(VerificationError::NotAuthenticated)?;
    let claims = keys.decode(token_cookie.value()).map_err(VerificationError::InvalidToken)?;

    Ok(SuccessfulVerification(claims))
}
