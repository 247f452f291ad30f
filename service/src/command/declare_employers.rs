//! [`Command`] for declaring a user's employers.

use common::operations::{
    By, Commit, Insert, Select, Transact, Transacted, Upsert,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{
        activity_log,
        declaration::{self, employer, Identity, TransmissionDateTime},
        month,
        user::Session,
        Declaration,
    },
    infra::{
        database,
        gateway::{self, SendDeclaration, Submission},
        Database, Gateway,
    },
    Service,
};

use super::Command;

/// [`Command`] for declaring the [`Employer`]s of a user's active
/// [`Declaration`].
///
/// The declared list replaces the previous one wholesale. While
/// [`DeclareEmployers::is_finished`] is unset, the list is a draft and is
/// only persisted locally. Once set, the [`Declaration`] is submitted to the
/// agency.
///
/// [`Employer`]: crate::domain::declaration::Employer
#[derive(Clone, Debug)]
pub struct DeclareEmployers {
    /// [`Session`] of the declaring user.
    pub session: Session,

    /// ID of the month the [`Employer`]s are declared for.
    ///
    /// [`Employer`]: crate::domain::declaration::Employer
    pub month_id: month::Id,

    /// [`employer::Patch`]es replacing the declared [`Employer`]s.
    ///
    /// [`Employer`]: crate::domain::declaration::Employer
    pub employers: Vec<employer::Patch>,

    /// Indicates whether the user has finished declaring, triggering the
    /// agency submission.
    pub is_finished: bool,

    /// Indicates whether consistency warnings reported by the agency before
    /// should be overridden.
    pub ignore_errors: bool,
}

impl<Db, Gw> Command<DeclareEmployers> for Service<Db, Gw>
where
    Db: Database<Transact, Err = Traced<database::Error>>
        + Database<
            Select<By<Option<Declaration>, Identity>>,
            Ok = Option<Declaration>,
            Err = Traced<database::Error>,
        > + Database<Upsert<Declaration>, Ok = (), Err = Traced<database::Error>>,
    Transacted<Db>: Database<
            Upsert<Declaration>,
            Err = Traced<database::Error>,
        > + Database<
            Insert<activity_log::Entry>,
            Err = Traced<database::Error>,
        > + Database<Commit, Err = Traced<database::Error>>,
    Gw: Gateway<
        SendDeclaration,
        Ok = Submission,
        Err = Traced<gateway::Error>,
    >,
{
    type Ok = Declaration;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: DeclareEmployers,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let DeclareEmployers {
            session,
            month_id,
            employers,
            is_finished,
            ignore_errors,
        } = cmd;

        if employers.is_empty() {
            return Err(tracerr::new!(E::NoEmployers));
        }

        let mut declaration = self
            .database()
            .execute(Select(By::<Option<Declaration>, _>::new(Identity {
                id: None,
                user_id: session.user_id,
                month_id: Some(month_id),
            })))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::DeclarationNotStarted(month_id))
            .map_err(tracerr::wrap!())?;
        if declaration.is_finished {
            return Err(tracerr::new!(E::AlreadyFinished(declaration.id)));
        }

        declaration.replace_employers(employers);

        if !is_finished {
            // Draft save only, nothing goes out yet.
            self.database()
                .execute(Upsert(declaration.clone()))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?;
            return Ok(declaration);
        }

        let already_declared = declaration.has_finished_declaring_employers;
        let rollback = (already_declared, declaration.transmitted_at);
        declaration.has_finished_declaring_employers = true;
        declaration.transmitted_at = Some(TransmissionDateTime::now());

        if !session.is_valid() {
            (
                declaration.has_finished_declaring_employers,
                declaration.transmitted_at,
            ) = rollback;
            self.database()
                .execute(Upsert(declaration))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?;
            return Err(tracerr::new!(E::AuthExpired));
        }

        let outcome = self
            .gateway()
            .execute(SendDeclaration {
                declaration: declaration.clone(),
                access_token: session.access_token.clone(),
                ignore_errors,
            })
            .await;
        let error = match outcome {
            Ok(Submission::Saved) => None,
            Ok(Submission::ConsistencyWarning(errors)) => {
                Some(tracerr::new!(E::Consistency(errors)))
            }
            Ok(Submission::ValidationFailure(errors)) => {
                Some(tracerr::new!(E::RemoteValidation(errors)))
            }
            Ok(Submission::TechnicalError) => {
                Some(tracerr::new!(E::AgencyUnavailable))
            }
            Err(e) => Some(tracerr::map_from(e)),
        };
        if let Some(e) = error {
            log::warn!(
                "failed to submit `Declaration(id: {})`: {e}",
                declaration.id,
            );
            (
                declaration.has_finished_declaring_employers,
                declaration.transmitted_at,
            ) = rollback;
            self.database()
                .execute(Upsert(declaration))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?;
            return Err(e);
        }

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        tx.execute(Upsert(declaration.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;
        // Logged on the first successful submission only, repeats are not.
        if !already_declared {
            tx.execute(Insert(activity_log::Entry::new(
                declaration.user_id,
                activity_log::Action::ValidateEmployers,
                declaration.id,
            )))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;
        }
        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        log::info!(
            "employers of `Declaration(id: {})` transmitted to the agency",
            declaration.id,
        );
        Ok(declaration)
    }
}

/// Error of [`DeclareEmployers`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Gateway`] call failed before the agency reported any outcome.
    #[display("`Gateway` operation failed: {_0}")]
    #[from]
    Gateway(gateway::Error),

    /// Provided [`Employer`] list is empty.
    ///
    /// [`Employer`]: crate::domain::declaration::Employer
    #[display("no employers provided")]
    NoEmployers,

    /// No active [`Declaration`] exists for the provided month.
    #[display("no active declaration for `Month(id: {_0})`")]
    DeclarationNotStarted(#[error(not(source))] month::Id),

    /// [`Declaration`] is finished already.
    #[display("`Declaration(id: {_0})` is finished already")]
    AlreadyFinished(#[error(not(source))] declaration::Id),

    /// [`Session`] of the user has expired before the submission.
    #[display("user authorization has expired")]
    AuthExpired,

    /// Agency reported consistency warnings.
    ///
    /// Overridable by repeating with [`DeclareEmployers::ignore_errors`]
    /// set.
    #[display("agency reported consistency warnings: {}", _0.join("; "))]
    Consistency(#[error(not(source))] Vec<String>),

    /// Agency rejected the declaration with field-level errors.
    #[display("agency rejected the declaration: {}", _0.join("; "))]
    RemoteValidation(#[error(not(source))] Vec<String>),

    /// Agency reported an internal failure.
    #[display("agency is unavailable, try again later")]
    AgencyUnavailable,
}
