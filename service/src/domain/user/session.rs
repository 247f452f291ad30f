//! [`Session`] definitions.

#[cfg(doc)]
use common::DateTime;
use common::{unit, DateTimeOf};
use secrecy::{ExposeSecret as _, SecretString};

use crate::domain::user;
#[cfg(doc)]
use crate::domain::Declaration;

/// Authorization of a user against the employment agency.
///
/// Issued by the surrounding application once the user completes the agency
/// login; this core only checks its expiration and forwards the
/// [`AccessToken`] to the agency API.
#[derive(Clone, Debug)]
pub struct Session {
    /// ID of the user this [`Session`] belongs to.
    pub user_id: user::Id,

    /// [`AccessToken`] of this [`Session`].
    pub access_token: AccessToken,

    /// [`DateTime`] when this [`Session`] expires.
    pub expires_at: ExpirationDateTime,
}

impl Session {
    /// Indicates whether this [`Session`] is still valid for remote calls.
    ///
    /// [`Declaration`] transmissions are rejected upfront on an expired
    /// [`Session`], before any agency call is made.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        DateTimeOf::now() < self.expires_at
    }
}

/// Access token authorizing agency API calls on behalf of a user.
#[derive(Clone, Debug)]
pub struct AccessToken(SecretString);

impl AccessToken {
    /// Creates a new [`AccessToken`] from the provided `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Exposes the underlying secret of this [`AccessToken`].
    ///
    /// Intended for the agency API boundary only.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

/// [`DateTime`] when a [`Session`] expires.
pub type ExpirationDateTime = DateTimeOf<(Session, unit::Expiration)>;
