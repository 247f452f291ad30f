//! [`Command`] for attaching a supporting document to a [`Declaration`].

use common::operations::{By, Select, Upsert};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{
        declaration::{self, document, employer, info, Document},
        user, Declaration,
    },
    infra::{database, Database},
    Service,
};

use super::Command;

/// [`Command`] for attaching a supporting document to a [`Declaration`].
///
/// Fills a single document slot, either with an uploaded file or by marking
/// it as transmitted to the agency out of band.
#[derive(Clone, Debug)]
pub struct AttachDocument {
    /// ID of the user attaching the document.
    ///
    /// The owning [`Declaration`] must belong to them.
    pub user_id: user::Id,

    /// [`Target`] slot the document is attached to.
    pub target: Target,

    /// [`Source`] the document slot is filled from.
    pub source: Source,
}

/// Slot of a [`Declaration`] an [`AttachDocument`] [`Command`] fills.
#[derive(Clone, Copy, Debug)]
pub enum Target {
    /// [`Document`] of the specified [`document::Kind`] of an [`Employer`].
    ///
    /// [`Employer`]: crate::domain::declaration::Employer
    Employer {
        /// ID of the [`Employer`] the [`Document`] belongs to.
        ///
        /// [`Employer`]: crate::domain::declaration::Employer
        employer_id: employer::Id,

        /// [`document::Kind`] of the [`Document`].
        kind: document::Kind,
    },

    /// Supporting document of an [`Info`].
    ///
    /// [`Info`]: crate::domain::declaration::Info
    Info {
        /// ID of the [`Info`] the document belongs to.
        ///
        /// [`Info`]: crate::domain::declaration::Info
        info_id: info::Id,
    },
}

/// Source an [`AttachDocument`] [`Command`] fills its [`Target`] from.
#[derive(Clone, Debug)]
pub enum Source {
    /// Uploaded file with the provided name.
    File(document::FileName),

    /// Document already handed to the agency out of band, so no file is
    /// expected.
    Transmitted,
}

impl<Db, Gw> Command<AttachDocument> for Service<Db, Gw>
where
    Db: Database<
            Select<By<Option<Declaration>, employer::Id>>,
            Ok = Option<Declaration>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Declaration>, info::Id>>,
            Ok = Option<Declaration>,
            Err = Traced<database::Error>,
        > + Database<Upsert<Declaration>, Ok = (), Err = Traced<database::Error>>,
{
    type Ok = Declaration;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: AttachDocument,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let AttachDocument {
            user_id,
            target,
            source,
        } = cmd;

        let mut declaration = match target {
            Target::Employer { employer_id, .. } => {
                self.database()
                    .execute(Select(By::<Option<Declaration>, _>::new(
                        employer_id,
                    )))
                    .await
            }
            Target::Info { info_id } => {
                self.database()
                    .execute(Select(By::<Option<Declaration>, _>::new(
                        info_id,
                    )))
                    .await
            }
        }
        .map_err(tracerr::map_from_and_wrap!(=> E))?
        .filter(|d| d.user_id == user_id)
        .ok_or(E::TargetNotFound)
        .map_err(tracerr::wrap!())?;
        if declaration.is_finished {
            return Err(tracerr::new!(E::AlreadyFinished(declaration.id)));
        }

        match target {
            Target::Employer { employer_id, kind } => {
                let employer = declaration
                    .employers
                    .iter_mut()
                    .find(|e| e.id == employer_id)
                    .ok_or(E::TargetNotFound)
                    .map_err(tracerr::wrap!())?;
                if !employer.documents.iter().any(|d| d.kind == kind) {
                    employer.documents.push(Document {
                        id: document::Id::new(),
                        kind,
                        file: None,
                        is_transmitted: false,
                        is_cleaned_up: false,
                    });
                }
                // Present by now, as it's pushed above otherwise.
                let doc = employer
                    .documents
                    .iter_mut()
                    .find(|d| d.kind == kind)
                    .ok_or(E::TargetNotFound)
                    .map_err(tracerr::wrap!())?;
                match source {
                    Source::File(name) => {
                        doc.file = Some(name);
                        doc.is_cleaned_up = false;
                    }
                    Source::Transmitted => {
                        doc.is_transmitted = true;
                    }
                }
            }
            Target::Info { info_id } => {
                let info = declaration
                    .infos
                    .iter_mut()
                    .find(|i| i.id == info_id)
                    .ok_or(E::TargetNotFound)
                    .map_err(tracerr::wrap!())?;
                match source {
                    Source::File(name) => {
                        info.file = Some(name);
                    }
                    Source::Transmitted => {
                        info.is_transmitted = true;
                    }
                }
            }
        }

        self.database()
            .execute(Upsert(declaration.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        Ok(declaration)
    }
}

/// Error of [`AttachDocument`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Target`] doesn't exist, or doesn't belong to the user.
    #[display("no such document slot")]
    TargetNotFound,

    /// Owning [`Declaration`] is finished already.
    #[display("`Declaration(id: {_0})` is finished already")]
    AlreadyFinished(#[error(not(source))] declaration::Id),
}
