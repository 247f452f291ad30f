//! [`Document`] definitions.

use common::define_kind;
use derive_more::{AsRef, Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(doc)]
use crate::domain::declaration::Employer;

/// Supporting document of an [`Employer`].
///
/// Conceptually capped at one [`Kind::SalarySheet`] and one
/// [`Kind::EmployerCertificate`] per [`Employer`], though the model allows a
/// collection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Document {
    /// ID of this [`Document`].
    pub id: Id,

    /// [`Kind`] of this [`Document`].
    pub kind: Kind,

    /// [`FileName`] of the uploaded blob backing this [`Document`], if any.
    ///
    /// Set by a separate upload operation, never fabricated here.
    pub file: Option<FileName>,

    /// Indicates whether this [`Document`] has been transmitted to the
    /// employment agency already.
    pub is_transmitted: bool,

    /// Indicates whether the blob backing this [`Document`] was removed by
    /// the retention job.
    ///
    /// A cleaned up file no longer satisfies a document requirement.
    pub is_cleaned_up: bool,
}

impl Document {
    /// Indicates whether this [`Document`] is provided: either backed by a
    /// live (not cleaned up) file, or transmitted to the agency already.
    #[must_use]
    pub fn is_provided(&self) -> bool {
        self.is_transmitted || (self.file.is_some() && !self.is_cleaned_up)
    }
}

/// ID of a [`Document`].
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
    #[doc = "Kind of a [`Document`]."]
    enum Kind {
        #[doc = "Salary sheet for the declared month."]
        SalarySheet = 1,

        #[doc = "Employer certificate (work contract termination proof)."]
        EmployerCertificate = 2,
    }
}

/// Name of an uploaded blob in the file store.
///
/// Opaque to this service: file bytes are never read here.
#[derive(AsRef, Clone, Debug, Display, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
#[as_ref(forward)]
pub struct FileName(String);

impl FileName {
    /// Creates a new [`FileName`].
    ///
    /// # Safety
    ///
    /// The caller must ensure that the given `name` matches the format.
    #[expect(unsafe_code, reason = "bypass")]
    #[must_use]
    pub unsafe fn new_unchecked(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Creates a new [`FileName`] if the given `name` is valid.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        Self::check(&name).then_some(Self(name))
    }

    /// Checks whether the given `name` is a valid [`FileName`].
    fn check(name: impl AsRef<str>) -> bool {
        let name = name.as_ref();
        name.trim() == name && !name.is_empty() && name.len() <= 512
    }
}

impl FromStr for FileName {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `FileName`")
    }
}
