//! [`Query`] collection related to a single [`Declaration`].

use common::operations::By;

use crate::{
    domain::{declaration, Declaration},
    read,
};
#[cfg(doc)]
use crate::Query;

use super::DatabaseQuery;

/// Queries a [`Declaration`] by its [`declaration::Id`].
pub type ById = DatabaseQuery<By<Option<Declaration>, declaration::Id>>;

/// Queries the not-yet-finished [`Declaration`] matching the provided
/// [`declaration::Identity`].
pub type ActiveByIdentity =
    DatabaseQuery<By<Option<read::declaration::Active>, declaration::Identity>>;
