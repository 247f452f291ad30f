//! Employment agency [`Gateway`]-related implementations.

pub mod agency;

use derive_more::{Display, Error as StdError, From};

use crate::domain::{user::session::AccessToken, Declaration};

pub use self::agency::Agency;

/// Employment agency gateway operation.
pub use common::Handler as Gateway;

/// Operation of submitting a [`Declaration`]'s facts and employers to the
/// employment agency.
#[derive(Clone, Debug)]
pub struct SendDeclaration {
    /// [`Declaration`] to submit.
    pub declaration: Declaration,

    /// [`AccessToken`] authorizing the submission.
    pub access_token: AccessToken,

    /// Indicates whether consistency warnings reported by the agency before
    /// should be overridden.
    ///
    /// User-in-the-loop override: set only after the user has seen the
    /// warnings and confirmed.
    pub ignore_errors: bool,
}

/// Operation of transmitting the supporting documents of a [`Declaration`]
/// to the employment agency.
///
/// Only file names are referenced: file bytes never pass through this
/// service.
#[derive(Clone, Debug)]
pub struct SendDocuments {
    /// [`Declaration`] whose documents are transmitted.
    pub declaration: Declaration,

    /// [`AccessToken`] authorizing the transmission.
    pub access_token: AccessToken,
}

/// Outcome of a [`SendDeclaration`] operation, as reported by the agency.
///
/// The agency answers HTTP 200 in all non-crash cases, so this is decoded
/// from the response body, not the HTTP status.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Submission {
    /// Agency accepted the [`Declaration`].
    Saved,

    /// Agency reported soft warnings (a suspicious hours/salary combination,
    /// for example).
    ///
    /// Overridable by re-submitting with [`SendDeclaration::ignore_errors`]
    /// set.
    ConsistencyWarning(Vec<String>),

    /// Agency reported hard field-level errors. Not overridable.
    ValidationFailure(Vec<String>),

    /// Agency reported an internal failure. Retryable later.
    TechnicalError,
}

/// [`Gateway`] error.
///
/// Transport and decoding failures only: domain outcomes reported by the
/// agency are a [`Submission`], never mixed in here.
#[derive(Debug, Display, From, StdError)]
pub enum Error {
    /// [`Agency`] error.
    Agency(agency::Error),
}
