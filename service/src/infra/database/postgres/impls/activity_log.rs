//! Activity log [`Database`] implementations.

use common::operations::Insert;
use tracerr::Traced;

use crate::{
    domain::activity_log,
    infra::{
        database::{self, postgres::Connection, Postgres},
        Database,
    },
};

impl<C> Database<Insert<activity_log::Entry>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(entry): Insert<activity_log::Entry>,
    ) -> Result<Self::Ok, Self::Err> {
        let activity_log::Entry {
            id,
            user_id,
            action,
            metadata,
            created_at,
        } = entry;

        let metadata = metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(tracerr::from_and_wrap!(=> database::postgres::Error))
            .map_err(tracerr::map_from)?;

        const SQL: &str = "\
            INSERT INTO activity_logs (\
                id, user_id, action, metadata, created_at\
            ) \
            VALUES (\
                $1::UUID, $2::UUID, $3::INT2, \
                $4::VARCHAR, $5::TIMESTAMPTZ\
            )";
        self.exec(SQL, &[&id, &user_id, &action, &metadata, &created_at])
            .await
            .map_err(tracerr::wrap!())
            .map(drop)
    }
}
