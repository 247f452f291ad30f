//! [`Command`] for finishing a [`Declaration`].

use common::operations::{
    By, Commit, Insert, Lock, Select, Transact, Transacted, Upsert,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{
        activity_log,
        declaration::{self, Slot},
        user::Session,
        Declaration,
    },
    infra::{
        database,
        gateway::{self, SendDocuments},
        Database, Gateway,
    },
    Service,
};

use super::Command;

/// [`Command`] for finishing a [`Declaration`] by handing its supporting
/// documents over to the agency.
///
/// Only a complete [`Declaration`] may be finished. A finished
/// [`Declaration`] is immutable ever after.
#[derive(Clone, Debug)]
pub struct FinishDeclaration {
    /// [`Session`] of the finishing user.
    pub session: Session,

    /// ID of the [`Declaration`] to finish.
    pub declaration_id: declaration::Id,
}

impl<Db, Gw> Command<FinishDeclaration> for Service<Db, Gw>
where
    Db: Database<Transact, Err = Traced<database::Error>>
        + Database<
            Select<By<Option<Declaration>, declaration::Identity>>,
            Ok = Option<Declaration>,
            Err = Traced<database::Error>,
        >,
    Transacted<Db>: Database<
            Lock<By<Declaration, declaration::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Declaration>, declaration::Id>>,
            Ok = Option<Declaration>,
            Err = Traced<database::Error>,
        > + Database<
            Upsert<Declaration>,
            Err = Traced<database::Error>,
        > + Database<
            Insert<activity_log::Entry>,
            Err = Traced<database::Error>,
        > + Database<Commit, Err = Traced<database::Error>>,
    Gw: Gateway<SendDocuments, Ok = (), Err = Traced<gateway::Error>>,
{
    type Ok = Declaration;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: FinishDeclaration,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let FinishDeclaration {
            session,
            declaration_id,
        } = cmd;

        if !session.is_valid() {
            return Err(tracerr::new!(E::AuthExpired));
        }

        let declaration = self
            .database()
            .execute(Select(By::<Option<Declaration>, _>::new(
                declaration::Identity {
                    id: Some(declaration_id),
                    user_id: session.user_id,
                    month_id: None,
                },
            )))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::DeclarationNotFound(declaration_id))
            .map_err(tracerr::wrap!())?;
        if declaration.is_finished {
            return Err(tracerr::new!(E::AlreadyFinished(declaration.id)));
        }
        // A `Declaration` with employers still undeclared is incomplete no
        // matter its document slots.
        let missing = declaration.missing_slots(&self.config().policy);
        if !declaration.has_finished_declaring_employers || !missing.is_empty()
        {
            return Err(tracerr::new!(E::Incomplete(missing)));
        }

        // Avoid concurrent finishing of the same `Declaration` in this
        // process, so its documents are sent out at most once.
        let _permit = self
            .finishing()
            .acquire(declaration.id)
            .ok_or(E::Busy(declaration.id))
            .map_err(tracerr::wrap!())?;

        self.gateway()
            .execute(SendDocuments {
                declaration: declaration.clone(),
                access_token: session.access_token.clone(),
            })
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        // Avoid concurrent actions upon the same `Declaration`.
        tx.execute(Lock(By::new(declaration.id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let mut declaration = tx
            .execute(Select(By::<Option<Declaration>, _>::new(
                declaration.id,
            )))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::DeclarationNotFound(declaration_id))
            .map_err(tracerr::wrap!())?;
        if declaration.is_finished {
            return Err(tracerr::new!(E::AlreadyFinished(declaration.id)));
        }
        declaration.is_finished = true;

        tx.execute(Upsert(declaration.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;
        tx.execute(Insert(activity_log::Entry::new(
            declaration.user_id,
            activity_log::Action::ValidateFiles,
            declaration.id,
        )))
        .await
        .map_err(tracerr::map_from_and_wrap!(=> E))
        .map(drop)?;
        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        log::info!("`Declaration(id: {})` finished", declaration.id);
        Ok(declaration)
    }
}

/// Error of [`FinishDeclaration`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Gateway`] call failed, so the documents may have not reached the
    /// agency.
    #[display("`Gateway` operation failed: {_0}")]
    #[from]
    Gateway(gateway::Error),

    /// [`Declaration`] with the provided ID doesn't exist, or doesn't belong
    /// to the user.
    #[display("`Declaration(id: {_0})` does not exist")]
    DeclarationNotFound(#[error(not(source))] declaration::Id),

    /// [`Declaration`] is finished already.
    #[display("`Declaration(id: {_0})` is finished already")]
    AlreadyFinished(#[error(not(source))] declaration::Id),

    /// [`Declaration`] has its employers undeclared still, or misses some of
    /// its required documents.
    #[display(
        "declaration is missing documents: {}",
        _0.iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    )]
    Incomplete(#[error(not(source))] Vec<Slot>),

    /// [`Session`] of the user has expired.
    #[display("user authorization has expired")]
    AuthExpired,

    /// [`Declaration`] is being finished by another request already.
    #[display("`Declaration(id: {_0})` is being finished already")]
    Busy(#[error(not(source))] declaration::Id),
}
