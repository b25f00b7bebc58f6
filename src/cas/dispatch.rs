//! Decides whether a login request starts or finishes the CAS round trip.

use super::*;

pub type QueryParams = BTreeMap<String, String>;

/// Collects the query of a URL. A repeated key keeps its last value.
pub fn query_params(url: &Url) -> QueryParams {
    url.query_pairs().map(|(key, value)| (key.into_owned(), value.into_owned())).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    RedirectTo(String),
    Proceed { ticket: ServiceTicket, service: ServiceUrl },
}

pub struct Dispatcher<'a> {
    config: &'a CasConfig,
    endpoints: &'a Endpoints,
}

impl<'a> Dispatcher<'a> {
    pub fn new(config: &'a CasConfig, endpoints: &'a Endpoints) -> Self {
        Dispatcher { config, endpoints }
    }

    pub fn handle_login(&self, query: &QueryParams, current: &Url) -> Action {
        let service = ServiceUrl::derive(self.config, current);
        match query.get(&self.config.ticket_param) {
            Some(ticket) => Action::Proceed { ticket: ServiceTicket::new(ticket.as_str()), service },
            None => Action::RedirectTo(self.login_url(&service)),
        }
    }

    /// Provider login URL with the extra parameters and the service, sorted
    /// by key.
    pub fn login_url(&self, service: &ServiceUrl) -> String {
        let mut params = self.config.extra_login_params.clone();
        params.insert(self.config.service_param.clone(), service.as_str().to_string());

        let mut url = self.endpoints.login.clone();
        url.query_pairs_mut().clear().extend_pairs(&params);
        url.into()
    }
}
