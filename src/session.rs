//! Session binding: a principal vouched for by CAS becomes a signed token
//! stored in the `token` cookie.

use crate::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub exp: usize, // Expiration time (as UTC timestamp)
    pub iat: usize, // Issued at (as UTC timestamp)

    pub sub: String, // CAS principal
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
}

pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    max_age: usize,
}

impl SessionKeys {
    pub fn new(secret: &[u8], max_age: usize) -> Self {
        SessionKeys {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            max_age,
        }
    }

    pub fn max_age(&self) -> usize {
        self.max_age
    }

    pub fn issue(&self, principal: &Principal) -> Result<String, jsonwebtoken::errors::Error> {
        let utc_now = chrono::Utc::now().timestamp() as usize;
        let claims = Claims {
            exp: utc_now + self.max_age,
            iat: utc_now,
            sub: principal.user.clone(),
            attributes: principal.attributes.clone(),
        };
        jsonwebtoken::encode(&jsonwebtoken::Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    pub fn decode(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256)).map(|data| data.claims)
    }
}

pub fn session_cookie(token: &str, max_age: usize, domain: Option<&str>) -> String {
    let mut value = format!("token={token}; Path=/; HttpOnly; Secure; SameSite=Lax; Max-Age={max_age}");
    if let Some(domain) = domain {
        value.push_str(&format!("; Domain=.{domain}"));
    }
    value
}

pub fn remove_session_cookie(domain: Option<&str>) -> String {
    session_cookie("", 0, domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_decodes_to_principal() {
        let keys = SessionKeys::new(b"secret", 3600);
        let mut principal = Principal::new("alice");
        principal.attributes.insert(String::from("mail"), vec![String::from("alice@example.org")]);

        let claims = keys.decode(&keys.issue(&principal).unwrap()).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.attributes, principal.attributes);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn foreign_token_is_rejected() {
        let ours = SessionKeys::new(b"secret", 3600);
        let theirs = SessionKeys::new(b"other", 3600);
        let token = theirs.issue(&Principal::new("mallory")).unwrap();
        assert!(ours.decode(&token).is_err());
    }

    #[test]
    fn cookie_attributes() {
        assert_eq!(
            session_cookie("abc", 60, Some("example.org")),
            "token=abc; Path=/; HttpOnly; Secure; SameSite=Lax; Max-Age=60; Domain=.example.org"
        );
        assert_eq!(remove_session_cookie(None), "token=; Path=/; HttpOnly; Secure; SameSite=Lax; Max-Age=0");
    }
}
