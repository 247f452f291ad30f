//! Derivation of supporting documents required by a [`Declaration`].

use derive_more::Display;
use smart_default::SmartDefault;

use crate::domain::declaration::{
    document, employer, info, Declaration, Facts,
};

/// Policy of deriving required supporting documents.
#[derive(Clone, Copy, Debug, Eq, PartialEq, SmartDefault)]
pub struct Policy {
    /// Indicates whether a transmitted [`document::Kind::EmployerCertificate`]
    /// waives the [`document::Kind::SalarySheet`] requirement of the same
    /// employer.
    ///
    /// The agency accepts a certificate alone, so the waiver is on unless
    /// product requirements say otherwise.
    #[default = true]
    pub certificate_waives_salary_sheet: bool,
}

/// One required-document obligation of a [`Declaration`].
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum Slot {
    /// [`document::Kind`] document required for an employer.
    #[display("{kind} document of employer {employer_id}")]
    EmployerDocument {
        /// ID of the employer the document is required for.
        employer_id: employer::Id,

        /// [`document::Kind`] of the required document.
        kind: document::Kind,
    },

    /// Supporting document required for a declared fact.
    #[display("{kind} supporting document")]
    InfoDocument {
        /// [`info::Kind`] of the declared fact.
        kind: info::Kind,
    },
}

/// Derives the [`Slot`]s that must be filled before the given [`Declaration`]
/// is file-complete.
///
/// The rules are evaluated independently and unioned:
/// - an employer still employing the user requires a salary sheet, waived
///   under [`Policy::certificate_waives_salary_sheet`] when a transmitted
///   certificate exists for that employer;
/// - an employer whose relationship ended this month additionally requires
///   an employer certificate;
/// - each declared fact requires one supporting document of the matching
///   [`info::Kind`], except [`info::Kind::JobSearch`], which is a date
///   record only and never a file.
///
/// A fully satisfied [`Declaration`] still yields its [`Slot`]s here; see
/// [`Declaration::missing_slots`] for the unmet ones.
#[must_use]
pub fn required_slots(
    declaration: &Declaration,
    policy: &Policy,
) -> Vec<Slot> {
    let mut slots = Vec::new();

    for employer in &declaration.employers {
        let certificate_transmitted = employer.documents.iter().any(|d| {
            d.kind == document::Kind::EmployerCertificate && d.is_transmitted
        });

        if employer.has_ended_this_month {
            slots.push(Slot::EmployerDocument {
                employer_id: employer.id,
                kind: document::Kind::EmployerCertificate,
            });
        }
        if !(policy.certificate_waives_salary_sheet && certificate_transmitted)
        {
            slots.push(Slot::EmployerDocument {
                employer_id: employer.id,
                kind: document::Kind::SalarySheet,
            });
        }
    }

    slots.extend(
        Facts::REQUIRED_INFOS
            .iter()
            .filter(|(_, kind)| *kind != info::Kind::JobSearch)
            .filter(|(applies, _)| applies(&declaration.facts))
            .map(|(_, kind)| Slot::InfoDocument { kind: *kind }),
    );

    slots
}

#[cfg(test)]
mod spec {
    use crate::domain::{
        declaration::{
            document::{self, Document},
            employer::{self, Employer, Name},
            Declaration, Facts, Patch,
        },
        month, user,
    };

    use super::{required_slots, Policy, Slot};

    fn declaration_with(employer: Employer) -> Declaration {
        let mut declaration = Declaration::new(
            user::Id::new(),
            month::Id::new(),
            Patch {
                id: None,
                facts: Facts {
                    has_worked: true,
                    ..Facts::default()
                },
                infos: vec![],
            },
        );
        declaration.employers = vec![employer];
        declaration
    }

    fn employer(documents: Vec<Document>) -> Employer {
        Employer {
            id: employer::Id::new(),
            name: Name::new("ACME").unwrap(),
            work_hours: None,
            salary: None,
            has_ended_this_month: true,
            documents,
        }
    }

    #[test]
    fn ended_employer_without_documents_misses_two() {
        let declaration = declaration_with(employer(vec![]));

        assert_eq!(declaration.missing_count(&Policy::default()), 2);
        assert_eq!(
            declaration.missing_count(&Policy::default()),
            2,
            "re-evaluation of an unchanged declaration must be idempotent",
        );
    }

    #[test]
    fn transmitted_certificate_waives_salary_sheet() {
        let declaration = declaration_with(employer(vec![Document {
            id: document::Id::new(),
            kind: document::Kind::EmployerCertificate,
            file: None,
            is_transmitted: true,
            is_cleaned_up: false,
        }]));

        assert_eq!(declaration.missing_count(&Policy::default()), 0);
    }

    #[test]
    fn waiver_is_subject_to_policy() {
        let declaration = declaration_with(employer(vec![Document {
            id: document::Id::new(),
            kind: document::Kind::EmployerCertificate,
            file: None,
            is_transmitted: true,
            is_cleaned_up: false,
        }]));
        let policy = Policy {
            certificate_waives_salary_sheet: false,
        };

        assert_eq!(
            declaration.missing_slots(&policy),
            vec![Slot::EmployerDocument {
                employer_id: declaration.employers[0].id,
                kind: document::Kind::SalarySheet,
            }],
        );
    }

    #[test]
    fn still_employed_requires_salary_sheet_only() {
        let mut still_employed = employer(vec![]);
        still_employed.has_ended_this_month = false;
        let id = still_employed.id;
        let declaration = declaration_with(still_employed);

        assert_eq!(
            required_slots(&declaration, &Policy::default()),
            vec![Slot::EmployerDocument {
                employer_id: id,
                kind: document::Kind::SalarySheet,
            }],
        );
    }
}
