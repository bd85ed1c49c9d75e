use chrono::{NaiveDateTime, TimeDelta, Utc};
use diesel::prelude::*;
use diesel::result::Error;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use std::time::Duration;

use crate::schema::secrets;

#[derive(Debug, Clone, Insertable, Queryable, Selectable)]
#[diesel(table_name = secrets)]
pub struct Secret {
    id: String,
    payload: Vec<u8>,
    expires_at: NaiveDateTime,
    created_at: NaiveDateTime,
}

impl Secret {
    pub fn new(id: &str, payload: Vec<u8>, ttl: Duration) -> Self {
        let created_at = Utc::now().naive_utc();
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);

        Self {
            id: id.to_string(),
            payload,
            expires_at: created_at.checked_add_signed(ttl).unwrap_or(NaiveDateTime::MAX),
            created_at,
        }
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Inserts the row unless the id is already taken. Returns whether a row
    /// was written.
    pub async fn insert(self, conn: &mut AsyncPgConnection) -> Result<bool, Error> {
        use crate::schema::secrets::dsl::secrets;

        let inserted = diesel::insert_into(secrets)
            .values(self)
            .on_conflict_do_nothing()
            .execute(conn)
            .await?;

        Ok(inserted == 1)
    }

    /// Deletes the row and hands it back in a single statement, so two
    /// readers can never both see it.
    pub async fn take(
        secret_id: &str,
        conn: &mut AsyncPgConnection,
    ) -> Result<Option<Self>, Error> {
        use crate::schema::secrets::dsl::{expires_at, id, secrets};

        diesel::delete(
            secrets
                .filter(id.eq(secret_id))
                .filter(expires_at.gt(Utc::now().naive_utc())),
        )
        .returning(Self::as_returning())
        .get_result(conn)
        .await
        .optional()
    }

    pub async fn clear_expired(conn: &mut AsyncPgConnection) -> Result<usize, Error> {
        use crate::schema::secrets::dsl::{expires_at, secrets};

        diesel::delete(secrets.filter(expires_at.le(Utc::now().naive_utc())))
            .execute(conn)
            .await
    }

    pub async fn ping(conn: &mut AsyncPgConnection) -> Result<usize, Error> {
        diesel::sql_query("SELECT 1").execute(conn).await
    }
}
