//! [`Command`] for declaring a user's monthly situation.

use common::operations::{
    By, Commit, Insert, Select, Transact, Transacted, Upsert,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{
        activity_log,
        declaration::{self, Identity, TransmissionDateTime},
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

/// [`Command`] for declaring the [`Facts`] of a user's monthly situation.
///
/// Creates the month's [`Declaration`] on first save, or merges into the
/// existing not-yet-finished one. When the user did not work, there are no
/// employers to declare, so the [`Declaration`] is submitted to the agency
/// right away.
///
/// [`Facts`]: declaration::Facts
#[derive(Clone, Debug)]
pub struct DeclareSituation {
    /// [`Session`] of the declaring user.
    pub session: Session,

    /// ID of the month the situation is declared for.
    pub month_id: month::Id,

    /// [`declaration::Patch`] with the declared facts.
    pub patch: declaration::Patch,

    /// Indicates whether consistency warnings reported by the agency before
    /// should be overridden.
    pub ignore_errors: bool,
}

impl<Db, Gw> Command<DeclareSituation> for Service<Db, Gw>
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
        cmd: DeclareSituation,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let DeclareSituation {
            session,
            month_id,
            patch,
            ignore_errors,
        } = cmd;

        patch.validate().map_err(tracerr::from_and_wrap!(=> E))?;

        let existing = self
            .database()
            .execute(Select(By::<Option<Declaration>, _>::new(Identity {
                id: patch.id,
                user_id: session.user_id,
                month_id: Some(month_id),
            })))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        if let Some(d) = &existing {
            if d.is_finished {
                return Err(tracerr::new!(E::AlreadyFinished(d.id)));
            }
        }

        let is_new = existing.is_none();
        let mut declaration = match existing {
            Some(mut d) => {
                d.apply(patch);
                d
            }
            None => Declaration::new(session.user_id, month_id, patch),
        };

        let mut submitted = false;
        if !declaration.facts.has_worked {
            // No employers to declare, so this save is also the submission.
            let rollback = (
                declaration.has_finished_declaring_employers,
                declaration.is_finished,
                declaration.transmitted_at,
            );
            declaration.has_finished_declaring_employers = true;
            declaration.transmitted_at = Some(TransmissionDateTime::now());

            if !session.is_valid() {
                (
                    declaration.has_finished_declaring_employers,
                    declaration.is_finished,
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
                    declaration.is_finished,
                    declaration.transmitted_at,
                ) = rollback;
                self.database()
                    .execute(Upsert(declaration))
                    .await
                    .map_err(tracerr::map_from_and_wrap!(=> E))?;
                return Err(e);
            }

            declaration.is_finished =
                declaration.is_complete(&self.config().policy);
            submitted = true;
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
        if is_new {
            tx.execute(Insert(activity_log::Entry::new(
                declaration.user_id,
                activity_log::Action::ValidateDeclaration,
                declaration.id,
            )))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;
        }
        if submitted {
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

        if submitted {
            log::info!(
                "`Declaration(id: {})` transmitted to the agency",
                declaration.id,
            );
        }
        Ok(declaration)
    }
}

/// Error of [`DeclareSituation`] [`Command`] execution.
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

    /// Provided [`declaration::Patch`] is invalid.
    #[display("invalid declaration: {_0}")]
    #[from]
    Validation(declaration::ValidationError),

    /// [`Declaration`] with the provided ID is finished already.
    #[display("`Declaration(id: {_0})` is finished already")]
    AlreadyFinished(#[error(not(source))] declaration::Id),

    /// [`Session`] of the user has expired before the submission.
    #[display("user authorization has expired")]
    AuthExpired,

    /// Agency reported consistency warnings.
    ///
    /// Overridable by repeating with [`DeclareSituation::ignore_errors`]
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
