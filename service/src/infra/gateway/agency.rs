//! HTTP implementation of the employment agency [`Gateway`].

use std::time::Duration;

use derive_more::{Display, Error as StdError, From};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracerr::Traced;

use crate::{
    domain::{
        declaration::{document, info},
        Declaration,
    },
    infra::gateway::{
        self, Gateway, SendDeclaration, SendDocuments, Submission,
    },
};

/// Configuration of an [`Agency`] client.
#[derive(Clone, Debug)]
pub struct Config {
    /// URL of the declaration submission endpoint.
    pub declaration_url: String,

    /// URL of the document transmission endpoint.
    pub documents_url: String,

    /// Timeout of a single agency call.
    ///
    /// A timed out call surfaces as a transport [`gateway::Error`], so
    /// triggers the same rollback as any other integration failure.
    pub timeout: Duration,
}

/// HTTP client to the employment agency API.
#[derive(Clone, Debug)]
pub struct Agency {
    /// Underlying HTTP client.
    http: reqwest::Client,

    /// [`Config`] of this [`Agency`] client.
    config: Config,
}

impl Agency {
    /// Creates a new [`Agency`] client with the provided [`Config`].
    ///
    /// # Errors
    ///
    /// If failed to create the underlying HTTP client.
    pub fn new(config: Config) -> Result<Self, Traced<gateway::Error>> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(tracerr::from_and_wrap!(=> Error))
            .map_err(tracerr::map_from)?;
        Ok(Self { http, config })
    }
}

impl Gateway<SendDeclaration> for Agency {
    type Ok = Submission;
    type Err = Traced<gateway::Error>;

    async fn execute(
        &self,
        op: SendDeclaration,
    ) -> Result<Self::Ok, Self::Err> {
        let SendDeclaration {
            declaration,
            access_token,
            ignore_errors,
        } = op;

        let response = self
            .http
            .post(&self.config.declaration_url)
            .bearer_auth(access_token.expose())
            .json(&RawDeclaration::new(&declaration, ignore_errors))
            .send()
            .await
            .map_err(tracerr::from_and_wrap!(=> Error))
            .map_err(tracerr::map_from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(tracerr::new!(Error::UnexpectedStatus(status)))
                .map_err(tracerr::map_from);
        }

        let raw = response
            .json::<RawResponse>()
            .await
            .map_err(tracerr::from_and_wrap!(=> Error))
            .map_err(tracerr::map_from)?;

        map_response(raw)
            .map_err(tracerr::from_and_wrap!(=> Error))
            .map_err(tracerr::map_from)
    }
}

impl Gateway<SendDocuments> for Agency {
    type Ok = ();
    type Err = Traced<gateway::Error>;

    async fn execute(&self, op: SendDocuments) -> Result<Self::Ok, Self::Err> {
        let SendDocuments {
            declaration,
            access_token,
        } = op;

        let response = self
            .http
            .post(&self.config.documents_url)
            .bearer_auth(access_token.expose())
            .json(&RawDocuments::new(&declaration))
            .send()
            .await
            .map_err(tracerr::from_and_wrap!(=> Error))
            .map_err(tracerr::map_from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(tracerr::new!(Error::UnexpectedStatus(status)))
                .map_err(tracerr::map_from);
        }

        Ok(())
    }
}

/// [`Agency`] error.
#[derive(Debug, Display, From, StdError)]
pub enum Error {
    /// HTTP call to the agency failed outright.
    #[display("HTTP request to the agency failed: {_0}")]
    Http(reqwest::Error),

    /// Agency crashed instead of reporting an outcome in the body.
    #[display("Agency answered with an unexpected HTTP status: {_0}")]
    UnexpectedStatus(#[error(not(source))] StatusCode),

    /// Agency reported a `statut` this client doesn't know.
    #[display("Agency reported an unknown `statut`: {_0}")]
    UnknownStatut(#[error(not(source))] String),
}

/// `statut` reported by the agency when a declaration is accepted.
const STATUT_SAVED: &str = "saved";

/// `statut` reported by the agency on soft consistency warnings.
const STATUT_CONSISTENCY: &str = "consistencyError";

/// `statut` reported by the agency on hard field-level errors.
const STATUT_VALIDATION: &str = "validationError";

/// `statut` reported by the agency on its internal failures.
const STATUT_TECHNICAL: &str = "techError";

/// Maps a [`RawResponse`] body into the typed [`Submission`] outcome.
///
/// The single place inspecting raw `statut` strings: nothing past this
/// boundary does.
fn map_response(raw: RawResponse) -> Result<Submission, Error> {
    let RawResponse {
        statut,
        consistency_errors,
        validation_errors,
    } = raw;

    match statut.as_str() {
        STATUT_SAVED => Ok(Submission::Saved),
        STATUT_CONSISTENCY => {
            Ok(Submission::ConsistencyWarning(consistency_errors))
        }
        STATUT_VALIDATION => Ok(Submission::ValidationFailure(
            flatten_errors(validation_errors),
        )),
        STATUT_TECHNICAL => Ok(Submission::TechnicalError),
        _ => Err(Error::UnknownStatut(statut)),
    }
}

/// Flattens the `erreursValidation` object into its human-readable messages.
fn flatten_errors(value: Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s],
        Value::Array(values) => {
            values.into_iter().flat_map(flatten_errors).collect()
        }
        Value::Object(fields) => {
            fields.into_values().flat_map(flatten_errors).collect()
        }
        Value::Null => vec![],
        other @ (Value::Bool(_) | Value::Number(_)) => vec![other.to_string()],
    }
}

/// Request body of a [`SendDeclaration`] operation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RawDeclaration<'d> {
    has_worked: bool,
    has_trained: bool,
    has_internship: bool,
    has_sick_leave: bool,
    has_maternity_leave: bool,
    has_retirement: bool,
    has_invalidity: bool,
    is_looking_for_job: bool,
    job_search_stop_motive: Option<&'d str>,
    employers: Vec<RawEmployer<'d>>,
    infos: Vec<RawInfo>,
    ignore_errors: bool,
}

impl<'d> RawDeclaration<'d> {
    /// Builds a new [`RawDeclaration`] body out of the given [`Declaration`].
    fn new(declaration: &'d Declaration, ignore_errors: bool) -> Self {
        let facts = &declaration.facts;
        Self {
            has_worked: facts.has_worked,
            has_trained: facts.has_trained,
            has_internship: facts.has_internship,
            has_sick_leave: facts.has_sick_leave,
            has_maternity_leave: facts.has_maternity_leave,
            has_retirement: facts.has_retirement,
            has_invalidity: facts.has_invalidity,
            is_looking_for_job: facts.is_looking_for_job,
            job_search_stop_motive: facts
                .job_search_stop_motive
                .as_ref()
                .map(AsRef::as_ref),
            employers: declaration
                .employers
                .iter()
                .map(|e| RawEmployer {
                    employer_name: e.name.as_ref(),
                    work_hours: e.work_hours.map(Into::into),
                    salary: e.salary.map(Into::into),
                    has_ended_this_month: e.has_ended_this_month,
                })
                .collect(),
            infos: declaration
                .infos
                .iter()
                .map(|i| RawInfo {
                    r#type: kind_code(i.kind),
                    start_date: i.start_date.map(|d| d.to_rfc3339()),
                    end_date: i.end_date.map(|d| d.to_rfc3339()),
                })
                .collect(),
            ignore_errors,
        }
    }
}

/// [`RawDeclaration`] part describing a single employer.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RawEmployer<'d> {
    employer_name: &'d str,
    work_hours: Option<i32>,
    salary: Option<i32>,
    has_ended_this_month: bool,
}

/// [`RawDeclaration`] part describing a single dated fact record.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RawInfo {
    r#type: &'static str,
    start_date: Option<String>,
    end_date: Option<String>,
}

/// Request body of a [`SendDocuments`] operation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RawDocuments<'d> {
    declaration_id: String,
    files: Vec<RawFile<'d>>,
}

impl<'d> RawDocuments<'d> {
    /// Builds a new [`RawDocuments`] body referencing every provided file of
    /// the given [`Declaration`].
    fn new(declaration: &'d Declaration) -> Self {
        let employer_files = declaration.employers.iter().flat_map(|e| {
            e.documents.iter().filter_map(|d| {
                d.file.as_ref().map(|f| RawFile {
                    name: f.as_ref(),
                    r#type: match d.kind {
                        document::Kind::SalarySheet => "salarySheet",
                        document::Kind::EmployerCertificate => {
                            "employerCertificate"
                        }
                    },
                })
            })
        });
        let info_files = declaration.infos.iter().filter_map(|i| {
            i.file.as_ref().map(|f| RawFile {
                name: f.as_ref(),
                r#type: kind_code(i.kind),
            })
        });

        Self {
            declaration_id: declaration.id.to_string(),
            files: employer_files.chain(info_files).collect(),
        }
    }
}

/// [`RawDocuments`] part referencing a single file by name.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RawFile<'d> {
    name: &'d str,
    r#type: &'static str,
}

/// Returns the wire code of the given [`info::Kind`], as the agency API
/// spells it.
fn kind_code(kind: info::Kind) -> &'static str {
    match kind {
        info::Kind::Internship => "internship",
        info::Kind::SickLeave => "sickLeave",
        info::Kind::MaternityLeave => "maternityLeave",
        info::Kind::Retirement => "retirement",
        info::Kind::Invalidity => "invalidity",
        info::Kind::JobSearch => "jobSearch",
    }
}

/// Response body of a [`SendDeclaration`] operation.
#[derive(Debug, Deserialize)]
struct RawResponse {
    /// Outcome reported by the agency.
    statut: String,

    /// Soft consistency warnings, if any.
    #[serde(default, rename = "erreursIncoherence")]
    consistency_errors: Vec<String>,

    /// Hard field-level errors keyed by field, if any.
    #[serde(default, rename = "erreursValidation")]
    validation_errors: Value,
}

#[cfg(test)]
mod spec {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use crate::{
        domain::{
            declaration::{Facts, Patch},
            month,
            user::{self, session::AccessToken},
            Declaration,
        },
        infra::gateway::{Gateway as _, SendDeclaration, Submission},
    };

    use super::{map_response, Agency, Config, RawResponse};

    fn declaration() -> Declaration {
        Declaration::new(
            user::Id::new(),
            month::Id::new(),
            Patch {
                id: None,
                facts: Facts::default(),
                infos: vec![],
            },
        )
    }

    async fn agency(server: &MockServer) -> Agency {
        Agency::new(Config {
            declaration_url: format!("{}/declarations", server.uri()),
            documents_url: format!("{}/documents", server.uri()),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn maps_every_statut() {
        let response = |statut: &str| RawResponse {
            statut: statut.into(),
            consistency_errors: vec!["odd hours".into()],
            validation_errors: json!({"salary": ["salary is required"]}),
        };

        assert_eq!(
            map_response(response("saved")).unwrap(),
            Submission::Saved,
        );
        assert_eq!(
            map_response(response("consistencyError")).unwrap(),
            Submission::ConsistencyWarning(vec!["odd hours".into()]),
        );
        assert_eq!(
            map_response(response("validationError")).unwrap(),
            Submission::ValidationFailure(vec!["salary is required".into()]),
        );
        assert_eq!(
            map_response(response("techError")).unwrap(),
            Submission::TechnicalError,
        );
        assert!(map_response(response("jeNeSaisPas")).is_err());
    }

    #[tokio::test]
    async fn decodes_outcome_out_of_http_200() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/declarations"))
            .and(body_partial_json(json!({"ignoreErrors": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "statut": "consistencyError",
                "erreursIncoherence": ["suspicious hours"],
            })))
            .mount(&server)
            .await;

        let outcome = agency(&server)
            .await
            .execute(SendDeclaration {
                declaration: declaration(),
                access_token: AccessToken::new("token"),
                ignore_errors: false,
            })
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Submission::ConsistencyWarning(vec!["suspicious hours".into()]),
        );
    }

    #[tokio::test]
    async fn crash_is_a_transport_error_not_an_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/declarations"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = agency(&server)
            .await
            .execute(SendDeclaration {
                declaration: declaration(),
                access_token: AccessToken::new("token"),
                ignore_errors: false,
            })
            .await;

        assert!(result.is_err());
    }
}
