//! Specs of [`Command`]s running over in-memory infrastructure.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use common::{
    operations::{By, Commit, Insert, Lock, Select, Transact, Upsert},
    DateTimeOf, Handler,
};
use service::{
    command::{
        attach_document, declare_employers, declare_situation,
        finish_declaration, AttachDocument, DeclareEmployers,
        DeclareSituation, FinishDeclaration,
    },
    domain::{
        activity_log,
        declaration::{self, document, employer, info, Policy},
        month,
        user::{self, session::AccessToken, Session},
        Declaration,
    },
    infra::{
        database,
        gateway::{self, SendDeclaration, SendDocuments, Submission},
    },
    query, read, Config, Service,
};
use tokio::sync::Notify;
use tracerr::Traced;

/// In-memory [`Database`] of [`Declaration`]s and [`activity_log::Entry`]s.
///
/// [`Database`]: service::infra::Database
#[derive(Clone, Debug, Default)]
struct MemoryDb {
    declarations: Arc<Mutex<HashMap<declaration::Id, Declaration>>>,
    logs: Arc<Mutex<Vec<activity_log::Entry>>>,
}

impl MemoryDb {
    fn stored(&self, id: declaration::Id) -> Option<Declaration> {
        self.declarations.lock().unwrap().get(&id).cloned()
    }

    fn logged_actions(&self) -> Vec<activity_log::Action> {
        self.logs.lock().unwrap().iter().map(|e| e.action).collect()
    }
}

impl Handler<Select<By<Option<Declaration>, declaration::Id>>> for MemoryDb {
    type Ok = Option<Declaration>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Declaration>, declaration::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self.stored(by.into_inner()))
    }
}

impl Handler<Select<By<Option<Declaration>, declaration::Identity>>>
    for MemoryDb
{
    type Ok = Option<Declaration>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Declaration>, declaration::Identity>>,
    ) -> Result<Self::Ok, Self::Err> {
        let declaration::Identity {
            id,
            user_id,
            month_id,
        } = by.into_inner();
        if let Some(id) = id {
            return Ok(self.stored(id).filter(|d| d.user_id == user_id));
        }
        let Some(month_id) = month_id else {
            return Ok(None);
        };
        Ok(self
            .declarations
            .lock()
            .unwrap()
            .values()
            .find(|d| {
                d.user_id == user_id
                    && d.month_id == month_id
                    && !d.is_finished
            })
            .cloned())
    }
}

impl Handler<Select<By<Option<read::declaration::Active>, declaration::Identity>>>
    for MemoryDb
{
    type Ok = Option<read::declaration::Active>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<
            By<Option<read::declaration::Active>, declaration::Identity>,
        >,
    ) -> Result<Self::Ok, Self::Err> {
        let what = By::<Option<Declaration>, _>::new(by.into_inner());
        Ok(self
            .execute(Select(what))
            .await?
            .filter(|d: &Declaration| !d.is_finished)
            .map(read::declaration::Active))
    }
}

impl Handler<Select<By<Option<Declaration>, employer::Id>>> for MemoryDb {
    type Ok = Option<Declaration>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Declaration>, employer::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        Ok(self
            .declarations
            .lock()
            .unwrap()
            .values()
            .find(|d| d.employers.iter().any(|e| e.id == id))
            .cloned())
    }
}

impl Handler<Select<By<Option<Declaration>, info::Id>>> for MemoryDb {
    type Ok = Option<Declaration>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Declaration>, info::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        Ok(self
            .declarations
            .lock()
            .unwrap()
            .values()
            .find(|d| d.infos.iter().any(|i| i.id == id))
            .cloned())
    }
}

impl Handler<Upsert<Declaration>> for MemoryDb {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Upsert(declaration): Upsert<Declaration>,
    ) -> Result<Self::Ok, Self::Err> {
        drop(
            self.declarations
                .lock()
                .unwrap()
                .insert(declaration.id, declaration),
        );
        Ok(())
    }
}

impl Handler<Lock<By<Declaration, declaration::Id>>> for MemoryDb {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        _: Lock<By<Declaration, declaration::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(())
    }
}

impl Handler<Insert<activity_log::Entry>> for MemoryDb {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(entry): Insert<activity_log::Entry>,
    ) -> Result<Self::Ok, Self::Err> {
        self.logs.lock().unwrap().push(entry);
        Ok(())
    }
}

impl Handler<Transact> for MemoryDb {
    type Ok = Self;
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Transact) -> Result<Self::Ok, Self::Err> {
        Ok(self.clone())
    }
}

impl Handler<Commit> for MemoryDb {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Commit) -> Result<Self::Ok, Self::Err> {
        Ok(())
    }
}

/// Scripted agency [`Gateway`] recording everything sent through it.
///
/// [`Gateway`]: service::infra::Gateway
#[derive(Clone, Debug, Default)]
struct AgencyStub {
    /// Outcomes to report for [`SendDeclaration`]s, in order.
    ///
    /// [`Submission::Saved`] once exhausted.
    outcomes: Arc<Mutex<VecDeque<Submission>>>,

    /// Snapshots sent via [`SendDeclaration`], with their `ignore_errors`.
    declarations_sent: Arc<Mutex<Vec<(Declaration, bool)>>>,

    /// IDs of [`Declaration`]s whose documents were sent.
    documents_sent: Arc<Mutex<Vec<declaration::Id>>>,

    /// Gate blocking [`SendDocuments`] until notified, if set.
    documents_gate: Arc<Mutex<Option<Arc<Notify>>>>,
}

impl AgencyStub {
    fn script(&self, outcome: Submission) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    fn gated(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.documents_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }
}

impl Handler<SendDeclaration> for AgencyStub {
    type Ok = Submission;
    type Err = Traced<gateway::Error>;

    async fn execute(
        &self,
        op: SendDeclaration,
    ) -> Result<Self::Ok, Self::Err> {
        self.declarations_sent
            .lock()
            .unwrap()
            .push((op.declaration, op.ignore_errors));
        Ok(self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Submission::Saved))
    }
}

impl Handler<SendDocuments> for AgencyStub {
    type Ok = ();
    type Err = Traced<gateway::Error>;

    async fn execute(&self, op: SendDocuments) -> Result<Self::Ok, Self::Err> {
        let gate = self.documents_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.documents_sent.lock().unwrap().push(op.declaration.id);
        Ok(())
    }
}

fn service() -> Service<MemoryDb, AgencyStub> {
    Service::new(Config::default(), MemoryDb::default(), AgencyStub::default())
}

fn session(user_id: user::Id) -> Session {
    Session {
        user_id,
        access_token: AccessToken::new("token"),
        expires_at: DateTimeOf::from_rfc3339("2100-01-01T00:00:00Z").unwrap(),
    }
}

fn expired_session(user_id: user::Id) -> Session {
    Session {
        expires_at: DateTimeOf::UNIX_EPOCH,
        ..session(user_id)
    }
}

fn no_work_patch() -> declaration::Patch {
    declaration::Patch {
        id: None,
        facts: declaration::Facts::default(),
        infos: vec![],
    }
}

fn worked_patch() -> declaration::Patch {
    declaration::Patch {
        facts: declaration::Facts {
            has_worked: true,
            ..declaration::Facts::default()
        },
        ..no_work_patch()
    }
}

fn employer_patch(name: &str, has_ended: bool) -> employer::Patch {
    employer::Patch {
        id: None,
        name: employer::Name::new(name).unwrap(),
        work_hours: Some("151".into()),
        salary: Some("1200,50 €".into()),
        has_ended_this_month: has_ended,
    }
}

#[tokio::test]
async fn no_work_declaration_is_submitted_and_finished() {
    let svc = service();
    let user_id = user::Id::new();

    let declaration = svc
        .execute(DeclareSituation {
            session: session(user_id),
            month_id: month::Id::new(),
            patch: no_work_patch(),
            ignore_errors: false,
        })
        .await
        .unwrap();

    assert!(declaration.has_finished_declaring_employers);
    assert!(declaration.is_finished);
    assert!(declaration.transmitted_at.is_some());
    assert_eq!(
        svc.database().stored(declaration.id),
        Some(declaration.clone()),
    );
    assert_eq!(
        svc.database().logged_actions(),
        vec![
            activity_log::Action::ValidateDeclaration,
            activity_log::Action::ValidateEmployers,
        ],
    );
    assert_eq!(svc.gateway().declarations_sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn consistency_warning_blocks_until_ignored() {
    let svc = service();
    let user_id = user::Id::new();
    let month_id = month::Id::new();
    svc.gateway()
        .script(Submission::ConsistencyWarning(vec!["dates overlap".into()]));

    let err = svc
        .execute(DeclareSituation {
            session: session(user_id),
            month_id,
            patch: no_work_patch(),
            ignore_errors: false,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_ref(),
        declare_situation::ExecutionError::Consistency(warnings)
            if warnings == &["dates overlap".to_owned()]
    ));

    // The draft is kept, but nothing is marked as transmitted.
    let stored = svc
        .database()
        .declarations
        .lock()
        .unwrap()
        .values()
        .next()
        .cloned()
        .unwrap();
    assert!(!stored.has_finished_declaring_employers);
    assert!(!stored.is_finished);
    assert!(stored.transmitted_at.is_none());

    let declaration = svc
        .execute(DeclareSituation {
            session: session(user_id),
            month_id,
            patch: declaration::Patch {
                id: Some(stored.id),
                ..no_work_patch()
            },
            ignore_errors: true,
        })
        .await
        .unwrap();
    assert!(declaration.is_finished);

    let sent = svc.gateway().declarations_sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    assert!(!sent[0].1);
    assert!(sent[1].1);
}

#[tokio::test]
async fn validation_requires_dates_of_declared_facts() {
    let svc = service();

    let err = svc
        .execute(DeclareSituation {
            session: session(user::Id::new()),
            month_id: month::Id::new(),
            patch: declaration::Patch {
                facts: declaration::Facts {
                    has_sick_leave: true,
                    ..declaration::Facts::default()
                },
                ..no_work_patch()
            },
            ignore_errors: false,
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err.as_ref(),
        declare_situation::ExecutionError::Validation(e)
            if e.to_string() == "no sick leave dates given"
    ));
    assert!(svc.database().declarations.lock().unwrap().is_empty());
    assert!(svc.gateway().declarations_sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn employers_flow_collects_documents_before_finishing() {
    let svc = service();
    let user_id = user::Id::new();
    let month_id = month::Id::new();

    let declaration = svc
        .execute(DeclareSituation {
            session: session(user_id),
            month_id,
            patch: worked_patch(),
            ignore_errors: false,
        })
        .await
        .unwrap();
    assert!(!declaration.has_finished_declaring_employers);
    // Working months are not submitted until employers are declared.
    assert!(svc.gateway().declarations_sent.lock().unwrap().is_empty());

    // A draft of employers is persisted without going out either.
    let draft = svc
        .execute(DeclareEmployers {
            session: session(user_id),
            month_id,
            employers: vec![employer_patch("ACME", true)],
            is_finished: false,
            ignore_errors: false,
        })
        .await
        .unwrap();
    assert_eq!(draft.employers.len(), 1);
    assert!(svc.gateway().declarations_sent.lock().unwrap().is_empty());

    let declared = svc
        .execute(DeclareEmployers {
            session: session(user_id),
            month_id,
            employers: vec![employer_patch("ACME", true)],
            is_finished: true,
            ignore_errors: false,
        })
        .await
        .unwrap();
    assert!(declared.has_finished_declaring_employers);
    assert!(!declared.is_finished);
    assert_eq!(svc.gateway().declarations_sent.lock().unwrap().len(), 1);

    // An ended employer requires both its certificate and salary sheet.
    let err = svc
        .execute(FinishDeclaration {
            session: session(user_id),
            declaration_id: declared.id,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_ref(),
        finish_declaration::ExecutionError::Incomplete(missing)
            if missing.len() == 2
    ));

    // A transmitted certificate waives the salary sheet by default.
    let employer_id = declared.employers[0].id;
    let patched = svc
        .execute(AttachDocument {
            user_id,
            target: attach_document::Target::Employer {
                employer_id,
                kind: document::Kind::EmployerCertificate,
            },
            source: attach_document::Source::Transmitted,
        })
        .await
        .unwrap();
    assert!(patched.is_complete(&Policy::default()));

    let finished = svc
        .execute(FinishDeclaration {
            session: session(user_id),
            declaration_id: declared.id,
        })
        .await
        .unwrap();
    assert!(finished.is_finished);
    assert_eq!(
        svc.gateway().documents_sent.lock().unwrap().clone(),
        vec![declared.id],
    );
    assert_eq!(
        svc.database().logged_actions(),
        vec![
            activity_log::Action::ValidateDeclaration,
            activity_log::Action::ValidateEmployers,
            activity_log::Action::ValidateFiles,
        ],
    );
}

#[tokio::test]
async fn empty_employer_list_is_rejected_upfront() {
    let svc = service();
    let user_id = user::Id::new();
    let month_id = month::Id::new();

    drop(
        svc.execute(DeclareSituation {
            session: session(user_id),
            month_id,
            patch: worked_patch(),
            ignore_errors: false,
        })
        .await
        .unwrap(),
    );

    let err = svc
        .execute(DeclareEmployers {
            session: session(user_id),
            month_id,
            employers: vec![],
            is_finished: true,
            ignore_errors: false,
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err.as_ref(),
        declare_employers::ExecutionError::NoEmployers,
    ));
    assert!(svc.gateway().declarations_sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn repeated_employers_submission_is_logged_once() {
    let svc = service();
    let user_id = user::Id::new();
    let month_id = month::Id::new();

    drop(
        svc.execute(DeclareSituation {
            session: session(user_id),
            month_id,
            patch: worked_patch(),
            ignore_errors: false,
        })
        .await
        .unwrap(),
    );
    for _ in 0..2 {
        drop(
            svc.execute(DeclareEmployers {
                session: session(user_id),
                month_id,
                employers: vec![employer_patch("ACME", false)],
                is_finished: true,
                ignore_errors: false,
            })
            .await
            .unwrap(),
        );
    }

    assert_eq!(svc.gateway().declarations_sent.lock().unwrap().len(), 2);
    assert_eq!(
        svc.database().logged_actions(),
        vec![
            activity_log::Action::ValidateDeclaration,
            activity_log::Action::ValidateEmployers,
        ],
    );
}

#[tokio::test]
async fn salary_sheet_waiver_is_subject_to_policy() {
    let strict = Service::new(
        Config {
            policy: Policy {
                certificate_waives_salary_sheet: false,
            },
        },
        MemoryDb::default(),
        AgencyStub::default(),
    );
    let user_id = user::Id::new();
    let month_id = month::Id::new();

    drop(
        strict
            .execute(DeclareSituation {
                session: session(user_id),
                month_id,
                patch: worked_patch(),
                ignore_errors: false,
            })
            .await
            .unwrap(),
    );
    let declared = strict
        .execute(DeclareEmployers {
            session: session(user_id),
            month_id,
            employers: vec![employer_patch("ACME", true)],
            is_finished: true,
            ignore_errors: false,
        })
        .await
        .unwrap();
    drop(
        strict
            .execute(AttachDocument {
                user_id,
                target: attach_document::Target::Employer {
                    employer_id: declared.employers[0].id,
                    kind: document::Kind::EmployerCertificate,
                },
                source: attach_document::Source::Transmitted,
            })
            .await
            .unwrap(),
    );

    let err = strict
        .execute(FinishDeclaration {
            session: session(user_id),
            declaration_id: declared.id,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_ref(),
        finish_declaration::ExecutionError::Incomplete(missing)
            if missing.len() == 1
    ));
}

#[tokio::test]
async fn finishing_before_employers_changes_nothing() {
    let svc = service();
    let user_id = user::Id::new();

    let declaration = svc
        .execute(DeclareSituation {
            session: session(user_id),
            month_id: month::Id::new(),
            patch: worked_patch(),
            ignore_errors: false,
        })
        .await
        .unwrap();

    let err = svc
        .execute(FinishDeclaration {
            session: session(user_id),
            declaration_id: declaration.id,
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err.as_ref(),
        finish_declaration::ExecutionError::Incomplete(_),
    ));
    assert_eq!(svc.database().stored(declaration.id), Some(declaration));
    assert!(svc.gateway().documents_sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_finishing_admits_a_single_caller() {
    let svc = service();
    let user_id = user::Id::new();
    let month_id = month::Id::new();

    drop(
        svc.execute(DeclareSituation {
            session: session(user_id),
            month_id,
            patch: worked_patch(),
            ignore_errors: false,
        })
        .await
        .unwrap(),
    );
    let declared = svc
        .execute(DeclareEmployers {
            session: session(user_id),
            month_id,
            employers: vec![employer_patch("ACME", false)],
            is_finished: true,
            ignore_errors: false,
        })
        .await
        .unwrap();
    drop(
        svc.execute(AttachDocument {
            user_id,
            target: attach_document::Target::Employer {
                employer_id: declared.employers[0].id,
                kind: document::Kind::SalarySheet,
            },
            source: attach_document::Source::Transmitted,
        })
        .await
        .unwrap(),
    );

    let gate = svc.gateway().gated();
    let first = tokio::spawn({
        let svc = svc.clone();
        let session = session(user_id);
        async move {
            svc.execute(FinishDeclaration {
                session,
                declaration_id: declared.id,
            })
            .await
        }
    });
    while !svc.finishing().contains(declared.id) {
        tokio::task::yield_now().await;
    }

    let err = svc
        .execute(FinishDeclaration {
            session: session(user_id),
            declaration_id: declared.id,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_ref(),
        finish_declaration::ExecutionError::Busy(id) if *id == declared.id
    ));

    gate.notify_one();
    let finished = first.await.unwrap().unwrap();
    assert!(finished.is_finished);
    assert_eq!(
        svc.gateway().documents_sent.lock().unwrap().clone(),
        vec![declared.id],
    );
    assert!(!svc.finishing().contains(declared.id));
}

#[tokio::test]
async fn expired_session_is_rejected_before_submission() {
    let svc = service();
    let user_id = user::Id::new();

    let err = svc
        .execute(DeclareSituation {
            session: expired_session(user_id),
            month_id: month::Id::new(),
            patch: no_work_patch(),
            ignore_errors: false,
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err.as_ref(),
        declare_situation::ExecutionError::AuthExpired,
    ));
    assert!(svc.gateway().declarations_sent.lock().unwrap().is_empty());
    // The situation itself is kept as an untransmitted draft.
    let stored = svc
        .database()
        .declarations
        .lock()
        .unwrap()
        .values()
        .next()
        .cloned()
        .unwrap();
    assert!(!stored.has_finished_declaring_employers);
    assert!(stored.transmitted_at.is_none());
}

#[tokio::test]
async fn queries_round_trip_the_stored_declaration() {
    let svc = service();
    let user_id = user::Id::new();
    let month_id = month::Id::new();

    let declaration = svc
        .execute(DeclareSituation {
            session: session(user_id),
            month_id,
            patch: declaration::Patch {
                facts: declaration::Facts {
                    has_worked: true,
                    has_sick_leave: true,
                    ..declaration::Facts::default()
                },
                infos: vec![info::Patch {
                    id: None,
                    kind: info::Kind::SickLeave,
                    start_date: Some(
                        DateTimeOf::from_rfc3339("2026-08-03T00:00:00Z")
                            .unwrap(),
                    ),
                    end_date: Some(
                        DateTimeOf::from_rfc3339("2026-08-07T00:00:00Z")
                            .unwrap(),
                    ),
                }],
                ..no_work_patch()
            },
            ignore_errors: false,
        })
        .await
        .unwrap();

    let by_id = svc
        .execute(query::declaration::ById::by(declaration.id))
        .await
        .unwrap();
    assert_eq!(by_id, Some(declaration.clone()));

    let active = svc
        .execute(query::declaration::ActiveByIdentity::by(
            declaration::Identity {
                id: None,
                user_id,
                month_id: Some(month_id),
            },
        ))
        .await
        .unwrap();
    assert_eq!(active.map(|a| a.0), Some(declaration));
}
