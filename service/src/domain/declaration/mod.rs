//! [`Declaration`] definitions and its lifecycle rules.

pub mod document;
pub mod employer;
pub mod info;
pub mod requirement;

use std::mem;

#[cfg(doc)]
use common::DateTime;
use common::{unit, DateTimeOf};
use derive_more::{
    AsRef, Display, Error, From, FromStr, Into,
};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use uuid::Uuid;

use crate::domain::{month, user};

pub use self::{
    document::Document,
    employer::Employer,
    info::Info,
    requirement::{Policy, Slot},
};

/// Monthly statement of work and life-event facts a user files with the
/// employment agency.
///
/// One per (user, month). Created on the first save action for a month,
/// mutated through partial upserts as the user progresses through the steps,
/// and finished exactly once.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Declaration {
    /// ID of this [`Declaration`].
    pub id: Id,

    /// ID of the user this [`Declaration`] belongs to.
    pub user_id: user::Id,

    /// ID of the month this [`Declaration`] is filed for.
    pub month_id: month::Id,

    /// [`Facts`] the user declared for the month.
    pub facts: Facts,

    /// Indicates whether the user has finished declaring employers.
    pub has_finished_declaring_employers: bool,

    /// Indicates whether this [`Declaration`] is finished.
    ///
    /// Monotonic: once set, every further mutation is rejected.
    pub is_finished: bool,

    /// [`DateTime`] when this [`Declaration`] was transmitted to the agency,
    /// if it was.
    pub transmitted_at: Option<TransmissionDateTime>,

    /// [`DateTime`] when this [`Declaration`] was created.
    pub created_at: CreationDateTime,

    /// [`Employer`]s the user reported for the month.
    pub employers: Vec<Employer>,

    /// [`Info`] records supporting the declared [`Facts`].
    pub infos: Vec<Info>,
}

impl Declaration {
    /// Creates a new [`Declaration`] of the provided user for the provided
    /// month out of the given [`Patch`].
    ///
    /// [`Patch::id`] only addresses an existing [`Declaration`], so it's
    /// ignored here: a fresh ID is always generated.
    #[must_use]
    pub fn new(user_id: user::Id, month_id: month::Id, patch: Patch) -> Self {
        let mut declaration = Self {
            id: Id::new(),
            user_id,
            month_id,
            facts: Facts::default(),
            has_finished_declaring_employers: false,
            is_finished: false,
            transmitted_at: None,
            created_at: CreationDateTime::now(),
            employers: Vec::new(),
            infos: Vec::new(),
        };
        declaration.apply(patch);
        declaration
    }

    /// Applies the given [`Patch`] to this [`Declaration`].
    ///
    /// [`Facts`] are replaced, and the [`Info`] collection is replaced
    /// wholesale: records with a matching ID keep their upload state, the
    /// rest are inserted fresh, and absent ones are dropped.
    ///
    /// A patch ID not belonging to this [`Declaration`] is discarded in
    /// favor of a fresh one, so a caller cannot address another
    /// [`Declaration`]'s rows.
    pub fn apply(&mut self, patch: Patch) {
        self.facts = patch.facts;

        let previous = mem::take(&mut self.infos);
        self.infos = patch
            .infos
            .into_iter()
            .map(|p| {
                let kept =
                    p.id.and_then(|id| previous.iter().find(|i| i.id == id));
                Info {
                    id: kept.map_or_else(info::Id::new, |i| i.id),
                    kind: p.kind,
                    start_date: p.start_date,
                    end_date: p.end_date,
                    file: kept.and_then(|i| i.file.clone()),
                    is_transmitted: kept.is_some_and(|i| i.is_transmitted),
                }
            })
            .collect();
    }

    /// Replaces the [`Employer`] collection of this [`Declaration`] wholesale
    /// with the given patches.
    ///
    /// [`Employer`]s with a matching ID keep their [`Document`]s, the rest
    /// are inserted fresh, and absent ones are dropped. Unparseable hours and
    /// salary inputs are stored as [`None`], preserving the partial record.
    ///
    /// As with [`Declaration::apply`], a patch ID not belonging to this
    /// [`Declaration`] is discarded in favor of a fresh one.
    pub fn replace_employers(&mut self, patches: Vec<employer::Patch>) {
        let previous = mem::take(&mut self.employers);
        self.employers = patches
            .into_iter()
            .map(|p| {
                let kept =
                    p.id.and_then(|id| previous.iter().find(|e| e.id == id));
                Employer {
                    id: kept.map_or_else(employer::Id::new, |e| e.id),
                    name: p.name,
                    work_hours: p
                        .work_hours
                        .as_deref()
                        .and_then(employer::WorkHours::parse),
                    salary: p.salary.as_deref().and_then(employer::Salary::parse),
                    has_ended_this_month: p.has_ended_this_month,
                    documents: kept
                        .map(|e| e.documents.clone())
                        .unwrap_or_default(),
                }
            })
            .collect();
    }

    /// Returns the [`Slot`]s of this [`Declaration`] still unmet under the
    /// given [`Policy`].
    ///
    /// Pure read: re-evaluation on an unchanged [`Declaration`] yields the
    /// same result.
    #[must_use]
    pub fn missing_slots(&self, policy: &Policy) -> Vec<Slot> {
        requirement::required_slots(self, policy)
            .into_iter()
            .filter(|slot| !self.is_satisfied(*slot))
            .collect()
    }

    /// Counts the [`Slot`]s of this [`Declaration`] still unmet under the
    /// given [`Policy`].
    #[must_use]
    pub fn missing_count(&self, policy: &Policy) -> usize {
        self.missing_slots(policy).len()
    }

    /// Indicates whether this [`Declaration`] is file-complete under the
    /// given [`Policy`].
    #[must_use]
    pub fn is_complete(&self, policy: &Policy) -> bool {
        self.missing_slots(policy).is_empty()
    }

    /// Returns the lifecycle [`Status`] of this [`Declaration`] under the
    /// given [`Policy`].
    #[must_use]
    pub fn status(&self, policy: &Policy) -> Status {
        if self.is_finished {
            Status::Finished
        } else if !self.has_finished_declaring_employers {
            Status::Draft
        } else if self.is_complete(policy) {
            Status::EmployersDeclared
        } else {
            Status::DocumentsPending
        }
    }

    /// Indicates whether the given [`Slot`] is satisfied by this
    /// [`Declaration`].
    fn is_satisfied(&self, slot: Slot) -> bool {
        match slot {
            Slot::EmployerDocument { employer_id, kind } => self
                .employers
                .iter()
                .filter(|e| e.id == employer_id)
                .any(|e| e.provided_document(kind).is_some()),
            Slot::InfoDocument { kind } => {
                self.infos.iter().any(|i| i.kind == kind && i.is_provided())
            }
        }
    }
}

/// ID of a [`Declaration`].
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

/// Boolean facts a user declares for a month, with the optional job search
/// stop motive.
#[derive(Clone, Debug, Eq, PartialEq, SmartDefault)]
pub struct Facts {
    /// Indicates whether the user worked during the month.
    pub has_worked: bool,

    /// Indicates whether the user attended a training.
    pub has_trained: bool,

    /// Indicates whether the user had an internship.
    pub has_internship: bool,

    /// Indicates whether the user was on a sick leave.
    pub has_sick_leave: bool,

    /// Indicates whether the user was on a maternity leave.
    pub has_maternity_leave: bool,

    /// Indicates whether the user retired.
    pub has_retirement: bool,

    /// Indicates whether the user has been declared invalid.
    pub has_invalidity: bool,

    /// Indicates whether the user is still looking for a job.
    #[default = true]
    pub is_looking_for_job: bool,

    /// Motive of stopping the job search, if the user is not looking
    /// anymore.
    pub job_search_stop_motive: Option<JobSearchStopMotive>,
}

impl Facts {
    /// Declared facts requiring at least one [`Info`] record of the matching
    /// [`info::Kind`].
    ///
    /// Declarative on purpose: adding a new fact here adds both its
    /// validation cross-check and (except [`info::Kind::JobSearch`]) its
    /// document requirement, with no new control flow.
    pub const REQUIRED_INFOS: [(fn(&Self) -> bool, info::Kind); 6] = [
        (|f| f.has_internship, info::Kind::Internship),
        (|f| f.has_sick_leave, info::Kind::SickLeave),
        (|f| f.has_maternity_leave, info::Kind::MaternityLeave),
        (|f| f.has_retirement, info::Kind::Retirement),
        (|f| f.has_invalidity, info::Kind::Invalidity),
        (|f| !f.is_looking_for_job, info::Kind::JobSearch),
    ];
}

/// Motive of a user stopping their job search.
#[derive(AsRef, Clone, Debug, Display, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
#[as_ref(forward)]
pub struct JobSearchStopMotive(String);

impl JobSearchStopMotive {
    /// Creates a new [`JobSearchStopMotive`].
    ///
    /// # Safety
    ///
    /// The caller must ensure that the given `motive` matches the format.
    #[expect(unsafe_code, reason = "bypass")]
    #[must_use]
    pub unsafe fn new_unchecked(motive: impl Into<String>) -> Self {
        Self(motive.into())
    }

    /// Creates a new [`JobSearchStopMotive`] if the given `motive` is valid.
    #[must_use]
    pub fn new(motive: impl Into<String>) -> Option<Self> {
        let motive = motive.into();
        Self::check(&motive).then_some(Self(motive))
    }

    /// Checks whether the given `motive` is a valid [`JobSearchStopMotive`].
    fn check(motive: impl AsRef<str>) -> bool {
        let motive = motive.as_ref();
        motive.trim() == motive && !motive.is_empty() && motive.len() <= 512
    }
}

impl FromStr for JobSearchStopMotive {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `JobSearchStopMotive`")
    }
}

/// Lifecycle status of a [`Declaration`], derived from its flags and
/// completeness.
///
/// [`Status::DocumentsPending`] is skipped straight to finishing when the
/// [`Declaration`] is already file-complete at the moment employers are
/// declared (a user who did not work needs no documents).
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum Status {
    /// The user is still filling the [`Declaration`] in.
    Draft,

    /// Employers are declared and no supporting document is missing.
    EmployersDeclared,

    /// Employers are declared, but supporting documents are still missing.
    DocumentsPending,

    /// The [`Declaration`] is finished. Terminal.
    Finished,
}

/// Patch of a [`Declaration`] provided by the declaring user.
///
/// Explicitly typed: unknown fields of the request body never pass through
/// to the stored [`Declaration`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Patch {
    /// ID of the [`Declaration`] to update, if known to the caller.
    pub id: Option<Id>,

    /// Declared [`Facts`].
    pub facts: Facts,

    /// Patches of the supporting [`Info`] records.
    pub infos: Vec<info::Patch>,
}

impl Patch {
    /// Validates this [`Patch`] without applying it.
    ///
    /// Every declared fact must come with at least one [`Info`] of the
    /// matching [`info::Kind`], including a job search stop record when the
    /// user declares not looking for a job anymore.
    ///
    /// # Errors
    ///
    /// With a [`ValidationError`] describing the first unmet cross-check.
    /// The [`Patch`] is never partially applied.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (applies, kind) in Facts::REQUIRED_INFOS {
            if applies(&self.facts)
                && !self.infos.iter().any(|i| i.kind == kind)
            {
                return Err(ValidationError::NoInfoDates(kind));
            }
        }
        Ok(())
    }
}

/// Validation error of a [`Declaration`]'s [`Patch`].
#[derive(Clone, Copy, Debug, Display, Error, Eq, PartialEq)]
pub enum ValidationError {
    /// Declared fact has no [`Info`] record with its dates.
    #[display("no {} dates given", _0.label())]
    NoInfoDates(#[error(not(source))] info::Kind),
}

/// Identity a [`Declaration`] is looked up by: its ID when known to the
/// caller, otherwise the (user, month) pair.
#[derive(Clone, Copy, Debug)]
pub struct Identity {
    /// ID of the [`Declaration`], if known.
    pub id: Option<Id>,

    /// ID of the user the [`Declaration`] belongs to.
    pub user_id: user::Id,

    /// ID of the month the [`Declaration`] is filed for, if known.
    pub month_id: Option<month::Id>,
}

/// [`DateTime`] when a [`Declaration`] was created.
pub type CreationDateTime = DateTimeOf<(Declaration, unit::Creation)>;

/// [`DateTime`] when a [`Declaration`] was transmitted to the employment
/// agency.
pub type TransmissionDateTime = DateTimeOf<(Declaration, unit::Transmission)>;

#[cfg(test)]
mod spec {
    use crate::domain::{
        declaration::{document::FileName, info, Policy, Slot},
        month, user,
    };

    use super::{Declaration, Facts, Patch, Status};

    fn sick_leave_patch() -> Patch {
        Patch {
            id: None,
            facts: Facts {
                has_sick_leave: true,
                ..Facts::default()
            },
            infos: vec![info::Patch {
                id: None,
                kind: info::Kind::SickLeave,
                start_date: None,
                end_date: None,
            }],
        }
    }

    fn declaration(patch: Patch) -> Declaration {
        Declaration::new(user::Id::new(), month::Id::new(), patch)
    }

    #[test]
    fn validation_requires_matching_infos() {
        let mut patch = sick_leave_patch();
        assert_eq!(patch.validate(), Ok(()));

        patch.infos.clear();
        assert_eq!(
            patch.validate().unwrap_err().to_string(),
            "no sick leave dates given",
        );
    }

    #[test]
    fn not_looking_for_job_requires_stop_record() {
        let patch = Patch {
            id: None,
            facts: Facts {
                is_looking_for_job: false,
                ..Facts::default()
            },
            infos: vec![],
        };

        assert_eq!(
            patch.validate().unwrap_err().to_string(),
            "no job search dates given",
        );
    }

    #[test]
    fn completeness_without_work_depends_on_infos_only() {
        let mut declaration = declaration(sick_leave_patch());
        let policy = Policy::default();

        assert_eq!(
            declaration.missing_slots(&policy),
            vec![Slot::InfoDocument {
                kind: info::Kind::SickLeave,
            }],
        );

        declaration.infos[0].file = FileName::new("sick-leave.pdf");
        assert!(declaration.is_complete(&policy));
    }

    #[test]
    fn applying_patch_keeps_upload_state_of_matching_infos() {
        let mut declaration = declaration(sick_leave_patch());
        declaration.infos[0].file = FileName::new("sick-leave.pdf");
        let kept_id = declaration.infos[0].id;

        let mut patch = sick_leave_patch();
        patch.infos[0].id = Some(kept_id);
        patch.infos.push(info::Patch {
            id: None,
            kind: info::Kind::Internship,
            start_date: None,
            end_date: None,
        });
        declaration.apply(patch);

        assert_eq!(declaration.infos.len(), 2);
        assert!(declaration.infos[0].file.is_some());
        assert!(declaration.infos[1].file.is_none());
    }

    #[test]
    fn unknown_patched_info_id_is_replaced_with_a_fresh_one() {
        let mut declaration = declaration(sick_leave_patch());

        let foreign_id = info::Id::new();
        let mut patch = sick_leave_patch();
        patch.infos[0].id = Some(foreign_id);
        declaration.apply(patch);

        assert_ne!(declaration.infos[0].id, foreign_id);
        assert!(declaration.infos[0].file.is_none());
    }

    #[test]
    fn unknown_patched_employer_id_is_replaced_with_a_fresh_one() {
        use crate::domain::declaration::employer;

        let mut declaration = declaration(sick_leave_patch());

        let foreign_id = employer::Id::new();
        declaration.replace_employers(vec![employer::Patch {
            id: Some(foreign_id),
            name: employer::Name::new("ACME").unwrap(),
            work_hours: None,
            salary: None,
            has_ended_this_month: false,
        }]);

        assert_ne!(declaration.employers[0].id, foreign_id);
        assert!(declaration.employers[0].documents.is_empty());
    }

    #[test]
    fn status_follows_flags_and_completeness() {
        let mut declaration = declaration(sick_leave_patch());
        let policy = Policy::default();
        assert_eq!(declaration.status(&policy), Status::Draft);

        declaration.has_finished_declaring_employers = true;
        assert_eq!(declaration.status(&policy), Status::DocumentsPending);

        declaration.infos[0].is_transmitted = true;
        assert_eq!(declaration.status(&policy), Status::EmployersDeclared);

        declaration.is_finished = true;
        assert_eq!(declaration.status(&policy), Status::Finished);
    }
}
