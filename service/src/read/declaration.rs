//! [`Declaration`] read model definition.

use crate::domain::Declaration;

/// Wrapper around a [`Declaration`] that is not finished yet, so still
/// accepts mutation.
#[derive(Clone, Debug)]
pub struct Active(pub Declaration);
