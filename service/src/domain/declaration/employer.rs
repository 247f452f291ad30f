//! [`Employer`] definitions.

use derive_more::{AsRef, Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(doc)]
use crate::domain::Declaration;
use crate::domain::declaration::document::{self, Document};

/// Work relationship the user reports for the declared month.
///
/// Drives the salary sheet and employer certificate requirements of its
/// [`Declaration`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Employer {
    /// ID of this [`Employer`].
    pub id: Id,

    /// [`Name`] of this [`Employer`].
    pub name: Name,

    /// Hours worked for this [`Employer`] during the declared month, if
    /// parseable from the user input.
    pub work_hours: Option<WorkHours>,

    /// Salary received from this [`Employer`] during the declared month, if
    /// parseable from the user input.
    pub salary: Option<Salary>,

    /// Indicates whether the work relationship with this [`Employer`] ended
    /// during the declared month.
    pub has_ended_this_month: bool,

    /// Supporting [`Document`]s of this [`Employer`].
    pub documents: Vec<Document>,
}

impl Employer {
    /// Looks up a provided [`Document`] of the given [`document::Kind`] in
    /// this [`Employer`], if any.
    #[must_use]
    pub fn provided_document(&self, kind: document::Kind) -> Option<&Document> {
        self.documents
            .iter()
            .find(|d| d.kind == kind && d.is_provided())
    }
}

/// ID of an [`Employer`].
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

/// Name of an [`Employer`].
#[derive(AsRef, Clone, Debug, Display, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
#[as_ref(forward)]
pub struct Name(String);

impl Name {
    /// Creates a new [`Name`].
    ///
    /// # Safety
    ///
    /// The caller must ensure that the given `name` matches the format.
    #[expect(unsafe_code, reason = "bypass")]
    #[must_use]
    pub unsafe fn new_unchecked(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Creates a new [`Name`] if the given `name` is valid.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        Self::check(&name).then_some(Self(name))
    }

    /// Checks whether the given `name` is a valid [`Name`].
    fn check(name: impl AsRef<str>) -> bool {
        let name = name.as_ref();
        name.trim() == name && !name.is_empty() && name.len() <= 128
    }
}

impl FromStr for Name {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `Name`")
    }
}

/// Hours worked for an [`Employer`] during a declared month.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    Eq,
    From,
    Hash,
    Into,
    PartialEq,
    Serialize,
)]
#[cfg_attr(feature = "postgres", derive(ToSql, FromSql), postgres(transparent))]
pub struct WorkHours(i32);

impl WorkHours {
    /// Parses the given free-form user `input` into [`WorkHours`] leniently,
    /// the way the declaration form does: leading digits count, trailing
    /// garbage is ignored, and fully unparseable input yields [`None`]
    /// rather than rejecting the whole record.
    #[must_use]
    pub fn parse(input: impl AsRef<str>) -> Option<Self> {
        parse_leading_int(input.as_ref()).map(Self)
    }
}

/// Salary received from an [`Employer`] during a declared month, in whole
/// euros.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    Eq,
    From,
    Hash,
    Into,
    PartialEq,
    Serialize,
)]
#[cfg_attr(feature = "postgres", derive(ToSql, FromSql), postgres(transparent))]
pub struct Salary(i32);

impl Salary {
    /// Parses the given free-form user `input` into a [`Salary`] leniently,
    /// preserving partial input: leading digits count, and fully unparseable
    /// input yields [`None`].
    #[must_use]
    pub fn parse(input: impl AsRef<str>) -> Option<Self> {
        parse_leading_int(input.as_ref()).map(Self)
    }
}

/// Parses the longest leading integer out of the given `input`, if any.
fn parse_leading_int(input: &str) -> Option<i32> {
    let input = input.trim_start();
    let unsigned = input.strip_prefix(['+', '-']).unwrap_or(input);
    let digits = unsigned
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit())
        .count();
    (digits > 0)
        .then(|| &input[..input.len() - unsigned.len() + digits])
        .and_then(|num| num.parse().ok())
}

/// Patch of an [`Employer`] provided by the declaring user.
///
/// Applied wholesale: the [`Declaration`]'s collection of [`Employer`]s is
/// replaced with the patched one, while [`Document`]s of the records with a
/// matching [`Id`] are preserved.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Patch {
    /// ID of the [`Employer`] to update, if it exists already.
    pub id: Option<Id>,

    /// [`Name`] of the [`Employer`].
    pub name: Name,

    /// Raw user input of the hours worked, if any.
    pub work_hours: Option<String>,

    /// Raw user input of the received salary, if any.
    pub salary: Option<String>,

    /// Indicates whether the work relationship ended during the declared
    /// month.
    pub has_ended_this_month: bool,
}

#[cfg(test)]
mod spec {
    use super::{Salary, WorkHours};

    #[test]
    fn parses_user_input_leniently() {
        assert_eq!(WorkHours::parse("151"), Some(WorkHours(151)));
        assert_eq!(WorkHours::parse("  35h"), Some(WorkHours(35)));
        assert_eq!(Salary::parse("1200,50"), Some(Salary(1200)));
        assert_eq!(Salary::parse("-3"), Some(Salary(-3)));
    }

    #[test]
    fn unparseable_input_yields_none() {
        assert_eq!(WorkHours::parse("full time"), None);
        assert_eq!(WorkHours::parse(""), None);
        assert_eq!(Salary::parse("€ 1200"), None);
        assert_eq!(Salary::parse("-"), None);
    }
}
