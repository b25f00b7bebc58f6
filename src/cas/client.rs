use super::*;
use futures_lite::AsyncReadExt;
use isahc::{config::RedirectPolicy, prelude::*, AsyncBody, Request};
use std::time::Duration;

/// Largest validation reply read from the provider.
pub const MAX_REPLY_BYTES: usize = 256 * 1024;

enum Reply {
    Body(u16, String),
    TooLarge(u16),
}

/// Checks a service ticket with the provider.
///
/// Implementations must not retry on their own: a ticket the provider has
/// already consumed will never validate again.
#[rocket::async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, ticket: &ServiceTicket, service: &ServiceUrl, timeout: Duration) -> ValidationResult;
}

/// Talks to the provider's validate endpoint over HTTP(S).
#[derive(Debug, Clone)]
pub struct CasValidator {
    endpoint: Url,
    ticket_param: String,
    service_param: String,
    method: ValidateMethod,
}

impl CasValidator {
    pub fn new(config: &CasConfig, endpoint: Url) -> Self {
        CasValidator {
            endpoint,
            ticket_param: config.ticket_param.clone(),
            service_param: config.service_param.clone(),
            method: config.validate_method,
        }
    }

    fn request(&self, ticket: &ServiceTicket, service: &ServiceUrl, timeout: Duration) -> Result<Request<AsyncBody>, isahc::http::Error> {
        let params = [
            (self.service_param.as_str(), service.as_str()),
            (self.ticket_param.as_str(), ticket.as_str()),
        ];

        match self.method {
            ValidateMethod::Get => {
                let mut url = self.endpoint.clone();
                url.query_pairs_mut().extend_pairs(params);
                Request::get(url.as_str())
                    .timeout(timeout)
                    .redirect_policy(RedirectPolicy::None)
                    .body(AsyncBody::empty())
            }
            ValidateMethod::Post => {
                let form = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(params)
                    .finish();
                Request::post(self.endpoint.as_str())
                    .timeout(timeout)
                    .redirect_policy(RedirectPolicy::None)
                    .header("Content-Type", "application/x-www-form-urlencoded")
                    .body(AsyncBody::from(form))
            }
        }
    }

    async fn exchange(&self, request: Request<AsyncBody>) -> Result<Reply, isahc::Error> {
        let response = isahc::send_async(request).await?;
        let status = response.status().as_u16();

        let mut body = Vec::new();
        response.into_body().take(MAX_REPLY_BYTES as u64 + 1).read_to_end(&mut body).await?;
        if body.len() > MAX_REPLY_BYTES {
            return Ok(Reply::TooLarge(status));
        }
        Ok(Reply::Body(status, String::from_utf8_lossy(&body).into_owned()))
    }
}

#[rocket::async_trait]
impl Validator for CasValidator {
    async fn validate(&self, ticket: &ServiceTicket, service: &ServiceUrl, timeout: Duration) -> ValidationResult {
        use ValidationFailure::*;

        let request = match self.request(ticket, service, timeout) {
            Ok(request) => request,
            Err(e) => return ValidationResult::Failure(NetworkError(format!("can't build request: {e}"))),
        };
        debug!("Validating service ticket for {service} at {}", self.endpoint);

        // The curl timeout covers the exchange, this one covers reading the body.
        let exchange = rocket::tokio::time::timeout(timeout, self.exchange(request)).await;
        let (status, body) = match exchange {
            Ok(Ok(Reply::Body(status, body))) => (status, body),
            Ok(Ok(Reply::TooLarge(status))) => {
                error!("CAS reply (status {status}) is larger than {MAX_REPLY_BYTES} bytes");
                return ValidationResult::Failure(MalformedResponse);
            }
            Ok(Err(e)) => return ValidationResult::Failure(NetworkError(e.to_string())),
            Err(_) => return ValidationResult::Failure(NetworkError(format!("no reply within {}ms", timeout.as_millis()))),
        };

        match parse_response(&body) {
            ValidationResult::Failure(MalformedResponse) if !(200..300).contains(&status) => {
                ValidationResult::Failure(NetworkError(format!("CAS unavailable (status {status})")))
            }
            ValidationResult::Failure(MalformedResponse) => {
                error!("CAS replied with a body that is neither a CAS 1.0 nor a CAS 2.0 response");
                ValidationResult::Failure(MalformedResponse)
            }
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::tokio::{
        self,
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        sync::oneshot,
    };
    use std::time::Instant;

    enum Stub {
        Reply(u16, &'static str),
        Oversized,
        Hang,
    }

    /// Serves one connection on a local port and hands back the request head.
    async fn stub_cas(stub: Stub) -> (Url, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (sender, receiver) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buffer = vec![0; 8192];
            let read = socket.read(&mut buffer).await.unwrap_or(0);
            let _ = sender.send(String::from_utf8_lossy(&buffer[..read]).into_owned());

            match stub {
                Stub::Reply(status, body) => {
                    let reply = format!(
                        "HTTP/1.1 {status} Stub\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(reply.as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
                Stub::Oversized => {
                    let body = format!("yes\nalice\n{}", "x".repeat(MAX_REPLY_BYTES));
                    let head = format!(
                        "HTTP/1.1 200 Stub\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(body.as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
                Stub::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
            }
        });

        let endpoint = Url::parse(&format!("http://127.0.0.1:{port}/cas/validate")).unwrap();
        (endpoint, receiver)
    }

    fn validator(endpoint: Url, method: ValidateMethod) -> CasValidator {
        let config = CasConfig { validate_method: method, ..CasConfig::default() };
        CasValidator::new(&config, endpoint)
    }

    async fn run(stub: Stub) -> ValidationResult {
        let (endpoint, _) = stub_cas(stub).await;
        validator(endpoint, ValidateMethod::Get)
            .validate(&ServiceTicket::new("ST-1"), &ServiceUrl::from("https://app.example.org/login"), Duration::from_secs(5))
            .await
    }

    #[rocket::async_test]
    async fn yes_reply_is_success() {
        assert_eq!(run(Stub::Reply(200, "yes\nalice\n")).await, ValidationResult::Success(Principal::new("alice")));
    }

    #[rocket::async_test]
    async fn no_reply_is_not_recognized() {
        assert_eq!(
            run(Stub::Reply(200, "no\n")).await,
            ValidationResult::Failure(ValidationFailure::TicketNotRecognized(None))
        );
    }

    #[rocket::async_test]
    async fn unparseable_reply_is_malformed() {
        assert_eq!(run(Stub::Reply(200, "")).await, ValidationResult::Failure(ValidationFailure::MalformedResponse));
        assert_eq!(
            run(Stub::Reply(200, "\u{1}\u{2}garbage")).await,
            ValidationResult::Failure(ValidationFailure::MalformedResponse)
        );
    }

    #[rocket::async_test]
    async fn oversized_reply_is_malformed() {
        assert_eq!(run(Stub::Oversized).await, ValidationResult::Failure(ValidationFailure::MalformedResponse));
    }

    #[rocket::async_test]
    async fn server_error_is_network_error() {
        assert!(matches!(
            run(Stub::Reply(503, "<html>down</html>")).await,
            ValidationResult::Failure(ValidationFailure::NetworkError(_))
        ));
    }

    #[rocket::async_test]
    async fn silent_provider_times_out() {
        let (endpoint, _) = stub_cas(Stub::Hang).await;
        let timeout = Duration::from_millis(300);
        let started = Instant::now();
        let result = validator(endpoint, ValidateMethod::Get)
            .validate(&ServiceTicket::new("ST-1"), &ServiceUrl::from("https://app.example.org/login"), timeout)
            .await;

        assert!(matches!(result, ValidationResult::Failure(ValidationFailure::NetworkError(_))));
        assert!(started.elapsed() < timeout + Duration::from_secs(2));
    }

    #[rocket::async_test]
    async fn unreachable_provider_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = Url::parse(&format!("http://127.0.0.1:{port}/cas/validate")).unwrap();
        let result = validator(endpoint, ValidateMethod::Get)
            .validate(&ServiceTicket::new("ST-1"), &ServiceUrl::from("https://app.example.org/"), Duration::from_secs(2))
            .await;
        assert!(matches!(result, ValidationResult::Failure(ValidationFailure::NetworkError(_))));
    }

    #[rocket::async_test]
    async fn get_sends_service_and_ticket_as_query() {
        let (endpoint, request) = stub_cas(Stub::Reply(200, "yes\nbob")).await;
        validator(endpoint, ValidateMethod::Get)
            .validate(&ServiceTicket::new("ST-42"), &ServiceUrl::from("https://app.example.org/login?next=%2F"), Duration::from_secs(5))
            .await;

        let request = request.await.unwrap();
        let request_line = request.lines().next().unwrap();
        assert_eq!(
            request_line,
            "GET /cas/validate?service=https%3A%2F%2Fapp.example.org%2Flogin%3Fnext%3D%252F&ticket=ST-42 HTTP/1.1"
        );
    }

    #[rocket::async_test]
    async fn post_sends_form_body() {
        let (endpoint, request) = stub_cas(Stub::Reply(200, "yes\nbob")).await;
        let result = validator(endpoint, ValidateMethod::Post)
            .validate(&ServiceTicket::new("ST-7"), &ServiceUrl::from("https://app.example.org/"), Duration::from_secs(5))
            .await;
        assert_eq!(result, ValidationResult::Success(Principal::new("bob")));

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /cas/validate HTTP/1.1"));
        assert!(request.contains("application/x-www-form-urlencoded"));
    }
}
