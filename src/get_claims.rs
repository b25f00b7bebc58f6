use crate::*;

pub struct GetClaimsResponse {
    claims: Claims
}

impl<'r, 'o: 'r> Responder<'r, 'o> for GetClaimsResponse {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let mut response = Response::build();
        let response = response.status(Status::Ok)
            .header(Header::new("Content-Type", "application/json"));
        let claims = serde_json::to_string(&self.claims).unwrap_or_default();
        let response = response.sized_body(claims.len(), Cursor::new(claims));
        Ok(response.finalize())
    }
}

#[get("/api/session")]
pub fn get_claims(keys: &State<SessionKeys>, cookies: &CookieJar<'_>) -> Result<GetClaimsResponse, VerificationError> {
    verify(keys, cookies).map(|session| GetClaimsResponse { claims: session.into_claims() })
}
