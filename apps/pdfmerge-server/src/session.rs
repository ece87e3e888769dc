//! Cookie-based session identity
//!
//! Every request under the session layer carries a [`SessionId`] extension.
//! The `pdfmerge_session` cookie holds the id plus an HMAC-SHA256 tag over it,
//! so only ids this server issued are honored. Clients without a valid cookie
//! get a fresh id and a `Set-Cookie` header on the response.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use hmac::{digest::InvalidLength, Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::models::SessionId;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "pdfmerge_session";

/// Signs and verifies session cookie values
#[derive(Clone)]
pub struct SessionSigner {
    mac: HmacSha256,
}

impl SessionSigner {
    pub fn new(secret: &[u8]) -> Result<Self, InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret)?,
        })
    }

    /// Signer with a per-process key; cookies do not survive a restart
    pub fn random() -> Result<Self, InvalidLength> {
        let mut secret = Uuid::new_v4().into_bytes().to_vec();
        secret.extend_from_slice(Uuid::new_v4().as_bytes());
        Self::new(&secret)
    }

    /// Cookie value for `session`: `{id}.{hex tag}`
    pub fn sign(&self, session: SessionId) -> String {
        let id = session.to_string();
        let mut mac = self.mac.clone();
        mac.update(id.as_bytes());
        format!("{}.{}", id, hex::encode(mac.finalize().into_bytes()))
    }

    /// Session of a cookie value this signer produced
    pub fn verify(&self, value: &str) -> Option<SessionId> {
        let (id, tag) = value.split_once('.')?;
        let session = SessionId::parse(id)?;
        let tag = hex::decode(tag).ok()?;

        let mut mac = self.mac.clone();
        mac.update(id.as_bytes());
        mac.verify_slice(&tag).ok()?;
        Some(session)
    }
}

/// Session carried by the request cookies, if one bears a valid signature
pub fn session_from_headers(headers: &HeaderMap, signer: &SessionSigner) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .filter(|(name, _)| *name == SESSION_COOKIE)
        .find_map(|(_, value)| signer.verify(value))
}

pub fn session_cookie(session: SessionId, signer: &SessionSigner) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE,
        signer.sign(session)
    )
}

/// Resolve or mint the session before the handler runs
pub async fn resolve_session(
    State(signer): State<SessionSigner>,
    mut request: Request,
    next: Next,
) -> Response {
    let existing = session_from_headers(request.headers(), &signer);
    let session = existing.unwrap_or_default();
    request.extensions_mut().insert(session);

    let mut response = next.run(request).await;

    if existing.is_none() {
        tracing::debug!(session = %session, "Started session");
        if let Ok(value) = HeaderValue::from_str(&session_cookie(session, &signer)) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}
