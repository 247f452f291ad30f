//! [`Declaration`]-related [`Database`] implementations.

use std::collections::HashMap;

use common::operations::{By, Lock, Select, Upsert};
use tracerr::Traced;

use crate::{
    domain::{
        declaration::{
            self, employer, info, Document, Employer, Facts, Identity, Info,
        },
        Declaration,
    },
    infra::{
        database::{self, postgres::Connection, Postgres},
        Database,
    },
    read,
};

/// Loads the whole [`Declaration`] aggregate with the provided ID: its row,
/// its [`Employer`]s with their [`Document`]s, and its [`Info`] records.
async fn load<C: Connection>(
    db: &Postgres<C>,
    id: declaration::Id,
) -> Result<Option<Declaration>, Traced<database::Error>> {
    const SQL: &str = "\
        SELECT id, user_id, month_id, \
               has_worked, has_trained, \
               has_internship, has_sick_leave, has_maternity_leave, \
               has_retirement, has_invalidity, \
               is_looking_for_job, job_search_stop_motive, \
               has_finished_declaring_employers, is_finished, \
               transmitted_at, created_at \
        FROM declarations \
        WHERE id = $1::UUID \
        LIMIT 1";
    let Some(row) =
        db.query_opt(SQL, &[&id]).await.map_err(tracerr::wrap!())?
    else {
        return Ok(None);
    };

    const EMPLOYERS_SQL: &str = "\
        SELECT id, name, work_hours, salary, has_ended_this_month \
        FROM employers \
        WHERE declaration_id = $1::UUID";
    let employer_rows = db
        .query(EMPLOYERS_SQL, &[&id])
        .await
        .map_err(tracerr::wrap!())?;

    const DOCUMENTS_SQL: &str = "\
        SELECT id, employer_id, kind, file, is_transmitted, is_cleaned_up \
        FROM employer_documents \
        WHERE employer_id IN (SELECT id \
                              FROM employers \
                              WHERE declaration_id = $1::UUID)";
    let mut documents: HashMap<employer::Id, Vec<Document>> = HashMap::new();
    for doc in db
        .query(DOCUMENTS_SQL, &[&id])
        .await
        .map_err(tracerr::wrap!())?
    {
        documents
            .entry(doc.get("employer_id"))
            .or_default()
            .push(Document {
                id: doc.get("id"),
                kind: doc.get("kind"),
                file: doc.get("file"),
                is_transmitted: doc.get("is_transmitted"),
                is_cleaned_up: doc.get("is_cleaned_up"),
            });
    }

    const INFOS_SQL: &str = "\
        SELECT id, kind, start_date, end_date, file, is_transmitted \
        FROM declaration_infos \
        WHERE declaration_id = $1::UUID";
    let infos = db
        .query(INFOS_SQL, &[&id])
        .await
        .map_err(tracerr::wrap!())?
        .into_iter()
        .map(|i| Info {
            id: i.get("id"),
            kind: i.get("kind"),
            start_date: i.get("start_date"),
            end_date: i.get("end_date"),
            file: i.get("file"),
            is_transmitted: i.get("is_transmitted"),
        })
        .collect();

    Ok(Some(Declaration {
        id,
        user_id: row.get("user_id"),
        month_id: row.get("month_id"),
        facts: Facts {
            has_worked: row.get("has_worked"),
            has_trained: row.get("has_trained"),
            has_internship: row.get("has_internship"),
            has_sick_leave: row.get("has_sick_leave"),
            has_maternity_leave: row.get("has_maternity_leave"),
            has_retirement: row.get("has_retirement"),
            has_invalidity: row.get("has_invalidity"),
            is_looking_for_job: row.get("is_looking_for_job"),
            job_search_stop_motive: row.get("job_search_stop_motive"),
        },
        has_finished_declaring_employers: row
            .get("has_finished_declaring_employers"),
        is_finished: row.get("is_finished"),
        transmitted_at: row.get("transmitted_at"),
        created_at: row.get("created_at"),
        employers: employer_rows
            .into_iter()
            .map(|e| {
                let employer_id = e.get("id");
                Employer {
                    id: employer_id,
                    name: e.get("name"),
                    work_hours: e.get("work_hours"),
                    salary: e.get("salary"),
                    has_ended_this_month: e.get("has_ended_this_month"),
                    documents: documents
                        .remove(&employer_id)
                        .unwrap_or_default(),
                }
            })
            .collect(),
        infos,
    }))
}

impl<C> Database<Select<By<Option<Declaration>, declaration::Id>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Declaration>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Declaration>, declaration::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        load(self, by.into_inner()).await.map_err(tracerr::wrap!())
    }
}

impl<C> Database<Select<By<Option<Declaration>, Identity>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Declaration>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Declaration>, Identity>>,
    ) -> Result<Self::Ok, Self::Err> {
        let Identity {
            id,
            user_id,
            month_id,
        } = by.into_inner();

        let id = if let Some(id) = id {
            Some(id)
        } else {
            let Some(month_id) = month_id else {
                return Ok(None);
            };

            const SQL: &str = "\
                SELECT id \
                FROM declarations \
                WHERE user_id = $1::UUID \
                  AND month_id = $2::UUID \
                  AND NOT is_finished \
                LIMIT 1";
            self.query_opt(SQL, &[&user_id, &month_id])
                .await
                .map_err(tracerr::wrap!())?
                .map(|row| row.get("id"))
        };
        let Some(id) = id else {
            return Ok(None);
        };

        Ok(load(self, id)
            .await
            .map_err(tracerr::wrap!())?
            .filter(|declaration| declaration.user_id == user_id))
    }
}

impl<C> Database<Select<By<Option<Declaration>, employer::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Declaration>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Declaration>, employer::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        const SQL: &str = "\
            SELECT declaration_id \
            FROM employers \
            WHERE id = $1::UUID \
            LIMIT 1";
        let Some(row) = self
            .query_opt(SQL, &[&by.into_inner()])
            .await
            .map_err(tracerr::wrap!())?
        else {
            return Ok(None);
        };

        load(self, row.get("declaration_id"))
            .await
            .map_err(tracerr::wrap!())
    }
}

impl<C> Database<Select<By<Option<Declaration>, info::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Declaration>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Declaration>, info::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        const SQL: &str = "\
            SELECT declaration_id \
            FROM declaration_infos \
            WHERE id = $1::UUID \
            LIMIT 1";
        let Some(row) = self
            .query_opt(SQL, &[&by.into_inner()])
            .await
            .map_err(tracerr::wrap!())?
        else {
            return Ok(None);
        };

        load(self, row.get("declaration_id"))
            .await
            .map_err(tracerr::wrap!())
    }
}

impl<C> Database<Select<By<Option<read::declaration::Active>, Identity>>>
    for Postgres<C>
where
    C: Connection,
    Self: Database<
        Select<By<Option<Declaration>, Identity>>,
        Ok = Option<Declaration>,
        Err = Traced<database::Error>,
    >,
{
    type Ok = Option<read::declaration::Active>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<read::declaration::Active>, Identity>>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self
            .execute(Select(By::<Option<Declaration>, _>::new(
                by.into_inner(),
            )))
            .await
            .map_err(tracerr::wrap!())?
            .filter(|declaration| !declaration.is_finished)
            .map(read::declaration::Active))
    }
}

impl<C> Database<Upsert<Declaration>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Upsert(declaration): Upsert<Declaration>,
    ) -> Result<Self::Ok, Self::Err> {
        let Declaration {
            id,
            user_id,
            month_id,
            facts:
                Facts {
                    has_worked,
                    has_trained,
                    has_internship,
                    has_sick_leave,
                    has_maternity_leave,
                    has_retirement,
                    has_invalidity,
                    is_looking_for_job,
                    job_search_stop_motive,
                },
            has_finished_declaring_employers,
            is_finished,
            transmitted_at,
            created_at,
            employers,
            infos,
        } = declaration;

        const SQL: &str = "\
            INSERT INTO declarations (\
                id, user_id, month_id, \
                has_worked, has_trained, \
                has_internship, has_sick_leave, has_maternity_leave, \
                has_retirement, has_invalidity, \
                is_looking_for_job, job_search_stop_motive, \
                has_finished_declaring_employers, is_finished, \
                transmitted_at, created_at\
            ) \
            VALUES (\
                $1::UUID, $2::UUID, $3::UUID, \
                $4::BOOL, $5::BOOL, \
                $6::BOOL, $7::BOOL, $8::BOOL, \
                $9::BOOL, $10::BOOL, \
                $11::BOOL, $12::VARCHAR, \
                $13::BOOL, $14::BOOL, \
                $15::TIMESTAMPTZ, $16::TIMESTAMPTZ\
            ) \
            ON CONFLICT (id) DO UPDATE \
            SET has_worked = EXCLUDED.has_worked, \
                has_trained = EXCLUDED.has_trained, \
                has_internship = EXCLUDED.has_internship, \
                has_sick_leave = EXCLUDED.has_sick_leave, \
                has_maternity_leave = EXCLUDED.has_maternity_leave, \
                has_retirement = EXCLUDED.has_retirement, \
                has_invalidity = EXCLUDED.has_invalidity, \
                is_looking_for_job = EXCLUDED.is_looking_for_job, \
                job_search_stop_motive = EXCLUDED.job_search_stop_motive, \
                has_finished_declaring_employers = \
                    EXCLUDED.has_finished_declaring_employers, \
                is_finished = EXCLUDED.is_finished, \
                transmitted_at = EXCLUDED.transmitted_at";
        self.exec(
            SQL,
            &[
                &id,
                &user_id,
                &month_id,
                &has_worked,
                &has_trained,
                &has_internship,
                &has_sick_leave,
                &has_maternity_leave,
                &has_retirement,
                &has_invalidity,
                &is_looking_for_job,
                &job_search_stop_motive,
                &has_finished_declaring_employers,
                &is_finished,
                &transmitted_at,
                &created_at,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
        .map(drop)?;

        // Collections are replaced wholesale: absent rows are dropped along
        // with the documents they own.
        let employer_ids =
            employers.iter().map(|e| e.id).collect::<Vec<_>>();
        const DROP_EMPLOYERS_SQL: &str = "\
            DELETE FROM employers \
            WHERE declaration_id = $1::UUID \
              AND id != ALL($2::UUID[])";
        self.exec(DROP_EMPLOYERS_SQL, &[&id, &employer_ids])
            .await
            .map_err(tracerr::wrap!())
            .map(drop)?;

        const EMPLOYER_SQL: &str = "\
            INSERT INTO employers (\
                id, declaration_id, name, \
                work_hours, salary, has_ended_this_month\
            ) \
            VALUES (\
                $1::UUID, $2::UUID, $3::VARCHAR, \
                $4::INT4, $5::INT4, $6::BOOL\
            ) \
            ON CONFLICT (id) DO UPDATE \
            SET name = EXCLUDED.name, \
                work_hours = EXCLUDED.work_hours, \
                salary = EXCLUDED.salary, \
                has_ended_this_month = EXCLUDED.has_ended_this_month";
        const DROP_DOCUMENTS_SQL: &str = "\
            DELETE FROM employer_documents \
            WHERE employer_id = $1::UUID \
              AND id != ALL($2::UUID[])";
        const DOCUMENT_SQL: &str = "\
            INSERT INTO employer_documents (\
                id, employer_id, kind, \
                file, is_transmitted, is_cleaned_up\
            ) \
            VALUES (\
                $1::UUID, $2::UUID, $3::INT2, \
                $4::VARCHAR, $5::BOOL, $6::BOOL\
            ) \
            ON CONFLICT (id) DO UPDATE \
            SET file = EXCLUDED.file, \
                is_transmitted = EXCLUDED.is_transmitted, \
                is_cleaned_up = EXCLUDED.is_cleaned_up";
        for employer in employers {
            let Employer {
                id: employer_id,
                name,
                work_hours,
                salary,
                has_ended_this_month,
                documents,
            } = employer;

            self.exec(
                EMPLOYER_SQL,
                &[
                    &employer_id,
                    &id,
                    &name,
                    &work_hours,
                    &salary,
                    &has_ended_this_month,
                ],
            )
            .await
            .map_err(tracerr::wrap!())
            .map(drop)?;

            let document_ids =
                documents.iter().map(|d| d.id).collect::<Vec<_>>();
            self.exec(DROP_DOCUMENTS_SQL, &[&employer_id, &document_ids])
                .await
                .map_err(tracerr::wrap!())
                .map(drop)?;

            for document in documents {
                let Document {
                    id: document_id,
                    kind,
                    file,
                    is_transmitted,
                    is_cleaned_up,
                } = document;

                self.exec(
                    DOCUMENT_SQL,
                    &[
                        &document_id,
                        &employer_id,
                        &kind,
                        &file,
                        &is_transmitted,
                        &is_cleaned_up,
                    ],
                )
                .await
                .map_err(tracerr::wrap!())
                .map(drop)?;
            }
        }

        let info_ids = infos.iter().map(|i| i.id).collect::<Vec<_>>();
        const DROP_INFOS_SQL: &str = "\
            DELETE FROM declaration_infos \
            WHERE declaration_id = $1::UUID \
              AND id != ALL($2::UUID[])";
        self.exec(DROP_INFOS_SQL, &[&id, &info_ids])
            .await
            .map_err(tracerr::wrap!())
            .map(drop)?;

        const INFO_SQL: &str = "\
            INSERT INTO declaration_infos (\
                id, declaration_id, kind, \
                start_date, end_date, \
                file, is_transmitted\
            ) \
            VALUES (\
                $1::UUID, $2::UUID, $3::INT2, \
                $4::TIMESTAMPTZ, $5::TIMESTAMPTZ, \
                $6::VARCHAR, $7::BOOL\
            ) \
            ON CONFLICT (id) DO UPDATE \
            SET kind = EXCLUDED.kind, \
                start_date = EXCLUDED.start_date, \
                end_date = EXCLUDED.end_date, \
                file = EXCLUDED.file, \
                is_transmitted = EXCLUDED.is_transmitted";
        for info in infos {
            let Info {
                id: info_id,
                kind,
                start_date,
                end_date,
                file,
                is_transmitted,
            } = info;

            self.exec(
                INFO_SQL,
                &[
                    &info_id,
                    &id,
                    &kind,
                    &start_date,
                    &end_date,
                    &file,
                    &is_transmitted,
                ],
            )
            .await
            .map_err(tracerr::wrap!())
            .map(drop)?;
        }

        Ok(())
    }
}

impl<C> Database<Lock<By<Declaration, declaration::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Lock(by): Lock<By<Declaration, declaration::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let id: declaration::Id = by.into_inner();

        const SQL: &str = "\
            INSERT INTO declarations_lock \
            VALUES ($1::UUID) \
            ON CONFLICT (id) DO NOTHING";
        self.query(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())
            .map(drop)
    }
}
