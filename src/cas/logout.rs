use super::*;

/// Post-teardown redirect. The caller clears the local session either way.
pub fn handle_logout(endpoints: &Endpoints, complete_logout: bool, fallback: &str) -> Action {
    if !complete_logout {
        return Action::RedirectTo(fallback.to_string());
    }

    // Keep the target readable for the provider while escaping anything
    // that would split the query.
    let target = urlencoding::encode(fallback).replace("%2F", "/").replace("%3A", ":");
    let mut url = endpoints.logout.clone();
    url.set_query(Some(&format!("url={target}")));
    Action::RedirectTo(url.into())
}
