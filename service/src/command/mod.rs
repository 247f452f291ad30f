//! [`Command`] definition.

pub mod attach_document;
pub mod declare_employers;
pub mod declare_situation;
pub mod finish_declaration;

/// [`Command`] of the [`Service`].
///
/// [`Service`]: crate::Service
pub use common::Handler as Command;

pub use self::{
    attach_document::AttachDocument, declare_employers::DeclareEmployers,
    declare_situation::DeclareSituation,
    finish_declaration::FinishDeclaration,
};
