use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::users::repo_types::{Role, User};

/// Value of the `type` claim. Checked on every verification so one kind of
/// token is never accepted where another is expected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    OauthState,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::OauthState => "oauth_state",
        }
    }
}

/// Payload types that can be signed. `KIND` ends up in the `type` claim.
pub trait TokenClaims: Serialize + DeserializeOwned {
    const KIND: TokenKind;
}

/// Identity snapshot carried by access tokens. Authorization never trusts
/// `is_active` from here; the stored flag is re-read per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    pub user_id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub is_active: bool,
}

impl TokenClaims for AccessClaims {
    const KIND: TokenKind = TokenKind::Access;
}

impl From<&User> for AccessClaims {
    fn from(u: &User) -> Self {
        Self {
            user_id: u.id,
            email: u.email.clone(),
            full_name: u.full_name.clone(),
            phone: u.phone.clone(),
            role: u.role,
            is_active: u.is_active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshClaims {
    pub user_id: Uuid,
    pub email: String,
}

impl TokenClaims for RefreshClaims {
    const KIND: TokenKind = TokenKind::Refresh;
}

impl From<&User> for RefreshClaims {
    fn from(u: &User) -> Self {
        Self {
            user_id: u.id,
            email: u.email.clone(),
        }
    }
}

/// CSRF `state` for the OAuth redirect round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthStateClaims {
    pub nonce: String,
}

impl TokenClaims for OAuthStateClaims {
    const KIND: TokenKind = TokenKind::OauthState;
}

/// Wire form: the typed payload plus registered claims.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignedClaims<C> {
    #[serde(flatten)]
    pub claims: C,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}
