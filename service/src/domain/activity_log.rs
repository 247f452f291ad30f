//! Activity log definitions.

#[cfg(doc)]
use common::DateTime;
use common::{define_kind, unit, DateTimeOf};
use derive_more::{Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{declaration, user};
#[cfg(doc)]
use crate::domain::Declaration;

/// Append-only audit record of a user action.
///
/// Written in the same transaction as the state flag it witnesses.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Entry {
    /// ID of this [`Entry`].
    pub id: Id,

    /// ID of the user who performed the action.
    pub user_id: user::Id,

    /// [`Action`] performed by the user.
    pub action: Action,

    /// [`Metadata`] of the performed action, if any.
    pub metadata: Option<Metadata>,

    /// [`DateTime`] when this [`Entry`] was appended.
    pub created_at: CreationDateTime,
}

impl Entry {
    /// Creates a new [`Entry`] of the provided user performing the provided
    /// [`Action`] upon the [`Declaration`] with the given ID.
    #[must_use]
    pub fn new(
        user_id: user::Id,
        action: Action,
        declaration_id: declaration::Id,
    ) -> Self {
        Self {
            id: Id::new(),
            user_id,
            action,
            metadata: Some(Metadata { declaration_id }),
            created_at: CreationDateTime::now(),
        }
    }
}

/// ID of an [`Entry`].
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    From,
    FromStr,
    Hash,
    Into,
    PartialEq,
    Serialize,
)]
#[cfg_attr(feature = "postgres", derive(ToSql, FromSql), postgres(transparent))]
pub struct Id(Uuid);

impl Id {
    /// Creates a new random [`Id`].
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

define_kind! {
    #[doc = "Audited user action."]
    enum Action {
        #[doc = "User validated their monthly situation."]
        ValidateDeclaration = 1,

        #[doc = "User validated their declared employers."]
        ValidateEmployers = 2,

        #[doc = "User validated their supporting files, finishing the \
                 declaration."]
        ValidateFiles = 3,
    }
}

/// Metadata of an audited [`Action`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Metadata {
    /// ID of the [`Declaration`] the [`Action`] was performed upon.
    pub declaration_id: declaration::Id,
}

/// [`DateTime`] when an [`Entry`] was appended.
pub type CreationDateTime = DateTimeOf<(Entry, unit::Creation)>;
