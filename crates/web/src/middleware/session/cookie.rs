use super::{Session, Store};
use crate::error::Error;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ring::hmac;
use ring::rand::SystemRandom;
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

const SEPARATOR: &str = "--";

/// Keeps the whole session in the cookie as signed JSON, `base64(json)--hex(hmac)`.
///
/// Nothing is stored server side, so purging a token has no effect beyond removing the
/// cookie. Sessions with a bad signature load as empty.
pub struct CookieStore {
    key: hmac::Key,
}

impl CookieStore {
    pub fn new(secret: &[u8]) -> Self {
        Self { key: hmac::Key::new(hmac::HMAC_SHA256, secret) }
    }

    /// A store with a random key; its cookies do not survive a restart.
    pub fn random() -> Result<Self, Error> {
        let key = hmac::Key::generate(hmac::HMAC_SHA256, &SystemRandom::new()).map_err(Error::other)?;
        Ok(Self { key })
    }

    fn sign(&self, payload: &str) -> String {
        hex::encode(hmac::sign(&self.key, payload.as_bytes()))
    }

    fn verify(&self, token: &str) -> Option<Map<String, Value>> {
        let (payload, signature) = token.rsplit_once(SEPARATOR)?;
        let signature = hex::decode(signature).ok()?;
        hmac::verify(&self.key, payload.as_bytes(), &signature).ok()?;
        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        serde_json::from_slice(&json).ok()
    }
}

impl fmt::Debug for CookieStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl Store for CookieStore {
    async fn load(&self, token: &str) -> Result<Session, Error> {
        match self.verify(token) {
            Some(data) => Ok(Session { token: Some(token.to_owned()), data }),
            None => {
                warn!("discarding session cookie with an invalid signature");
                Ok(Session::new())
            }
        }
    }

    async fn save(&self, session: &mut Session) -> Result<String, Error> {
        let json = serde_json::to_vec(&session.data).map_err(Error::other)?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let token = format!("{payload}{SEPARATOR}{}", self.sign(&payload));
        session.token = Some(token.clone());
        Ok(token)
    }
}
