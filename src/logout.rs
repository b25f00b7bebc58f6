use crate::*;

#[get("/logout?<next>")]
pub fn logout(
    next: Option<String>,
    config: &State<CasConfig>,
    endpoints: &State<Endpoints>,
    keys: &State<SessionKeys>,
    cookies: &CookieJar<'_>,
) -> Result<FlowResponse, LoginError> {
    match verify(keys, cookies) {
        Ok(session) => info!("Logging out {}", session.claims().sub),
        Err(_) => debug!("Logout without a session"),
    }

    let outcome = logout_flow(config, endpoints, next.as_deref());
    execute(outcome, keys, config.cookie_domain.as_deref())
}
