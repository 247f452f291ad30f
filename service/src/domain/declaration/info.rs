//! [`Info`] definitions.

#[cfg(doc)]
use common::DateTime;
use common::{define_kind, DateTimeOf};
use derive_more::{Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(doc)]
use crate::domain::Declaration;
use crate::domain::declaration::document::FileName;

/// Typed, dated supporting fact record of a [`Declaration`].
///
/// One per life event the user declares for the month (a sick leave period,
/// an internship, and so on), with an optional supporting file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Info {
    /// ID of this [`Info`].
    pub id: Id,

    /// [`Kind`] of this [`Info`].
    pub kind: Kind,

    /// [`DateTime`] when the declared fact started, if dated.
    pub start_date: Option<StartDateTime>,

    /// [`DateTime`] when the declared fact ended, if dated.
    pub end_date: Option<EndDateTime>,

    /// [`FileName`] of the uploaded blob supporting this [`Info`], if any.
    pub file: Option<FileName>,

    /// Indicates whether the supporting file of this [`Info`] has been
    /// transmitted to the employment agency already.
    pub is_transmitted: bool,
}

impl Info {
    /// Indicates whether this [`Info`] is supported by a provided document:
    /// either an uploaded file, or one transmitted to the agency already.
    #[must_use]
    pub fn is_provided(&self) -> bool {
        self.is_transmitted || self.file.is_some()
    }
}

/// ID of an [`Info`].
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
    #[doc = "Kind of an [`Info`]."]
    enum Kind {
        #[doc = "Internship period."]
        Internship = 1,

        #[doc = "Sick leave period."]
        SickLeave = 2,

        #[doc = "Maternity leave period."]
        MaternityLeave = 3,

        #[doc = "Retirement onset."]
        Retirement = 4,

        #[doc = "Invalidity onset."]
        Invalidity = 5,

        #[doc = "Job search stop record."]
        JobSearch = 6,
    }
}

impl Kind {
    /// Returns the human-readable label of this [`Kind`] for user-facing
    /// messages.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Internship => "internship",
            Self::SickLeave => "sick leave",
            Self::MaternityLeave => "maternity leave",
            Self::Retirement => "retirement",
            Self::Invalidity => "invalidity",
            Self::JobSearch => "job search",
        }
    }
}

/// Patch of an [`Info`] provided by the declaring user.
///
/// Applied wholesale: the [`Declaration`]'s collection of [`Info`]s is
/// replaced with the patched one, while upload state of the records with a
/// matching [`Id`] is preserved.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Patch {
    /// ID of the [`Info`] to update, if it exists already.
    pub id: Option<Id>,

    /// [`Kind`] of the [`Info`].
    pub kind: Kind,

    /// [`DateTime`] when the declared fact started, if dated.
    pub start_date: Option<StartDateTime>,

    /// [`DateTime`] when the declared fact ended, if dated.
    pub end_date: Option<EndDateTime>,
}

/// Marker type describing a start of a declared fact.
#[derive(Clone, Copy, Debug)]
pub struct Start;

/// Marker type describing an end of a declared fact.
#[derive(Clone, Copy, Debug)]
pub struct End;

/// [`DateTime`] when a declared fact started.
pub type StartDateTime = DateTimeOf<(Info, Start)>;

/// [`DateTime`] when a declared fact ended.
pub type EndDateTime = DateTimeOf<(Info, End)>;
