//! Read entities definitions.

pub mod declaration;
