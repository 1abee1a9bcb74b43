//! Single writer for the database.
//!
//! SQLite allows one writer at a time, so every write is queued to one
//! dedicated thread that owns a pooled connection and runs each job in its
//! own transaction. Reads keep using the pool directly.

use diesel::{Connection, SqliteConnection};
use log::{error, warn};
use tokio::sync::{mpsc, oneshot};

use super::{DbConnection, DbPool};
use formsync_core::errors::{DatabaseError, Error, Result};

type Job = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::UnboundedSender<Job>,
}

/// Error inside a writer transaction: either the job's own error, or a
/// diesel error raised while beginning or committing.
enum TxError {
    Job(Error),
    Diesel(diesel::result::Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        Self::Diesel(err)
    }
}

fn writer_stopped() -> Error {
    Error::Database(DatabaseError::Internal(
        "Database writer is not running".to_string(),
    ))
}

pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
    let spawned = std::thread::Builder::new()
        .name("formsync-db-writer".to_string())
        .spawn(move || {
            let mut conn: Option<DbConnection> = None;
            while let Some(job) = rx.blocking_recv() {
                if conn.is_none() {
                    match pool.get() {
                        Ok(c) => conn = Some(c),
                        Err(e) => {
                            error!("[db] writer could not acquire a connection: {}", e);
                            // Dropping the job drops its reply sender.
                            continue;
                        }
                    }
                }
                if let Some(c) = conn.as_mut() {
                    job(&mut **c);
                }
            }
        });
    if let Err(e) = spawned {
        error!("[db] failed to start writer thread: {}", e);
    }
    WriteHandle { tx }
}

impl WriteHandle {
    /// Runs `f` on the writer thread inside one transaction. An error from
    /// `f` rolls the transaction back.
    pub async fn exec<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel::<Result<T>>();
        let job: Job = Box::new(move |conn: &mut SqliteConnection| {
            let result = conn
                .transaction::<T, TxError, _>(|tx_conn| f(tx_conn).map_err(TxError::Job))
                .map_err(|err| match err {
                    TxError::Job(e) => e,
                    TxError::Diesel(e) => {
                        Error::Database(DatabaseError::QueryFailed(e.to_string()))
                    }
                });
            if reply_tx.send(result).is_err() {
                warn!("[db] write finished after its caller went away");
            }
        });
        self.tx.send(job).map_err(|_| writer_stopped())?;
        reply_rx.await.map_err(|_| writer_stopped())?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, get_connection, init};
    use diesel::RunQueryDsl;
    use tempfile::tempdir;

    #[derive(diesel::QueryableByName)]
    struct CountRow {
        #[diesel(sql_type = diesel::sql_types::BigInt)]
        value: i64,
    }

    fn count(pool: &DbPool) -> i64 {
        let mut conn = get_connection(pool).expect("connection");
        diesel::sql_query("SELECT COUNT(*) AS value FROM t")
            .get_result::<CountRow>(&mut conn)
            .expect("count")
            .value
    }

    #[tokio::test]
    async fn failed_job_rolls_back_its_transaction() {
        let app_data = tempdir().expect("tempdir").keep().to_string_lossy().to_string();
        let db_path = init(&app_data).expect("init db");
        let pool = create_pool(&db_path).expect("create pool");
        let writer = spawn_writer(pool.as_ref().clone());

        writer
            .exec(|conn: &mut SqliteConnection| -> Result<()> {
                diesel::sql_query("CREATE TABLE t (v INTEGER)")
                    .execute(conn)
                    .map_err(crate::errors::StorageError::from)?;
                Ok(())
            })
            .await
            .expect("create");

        let err = writer
            .exec(|conn: &mut SqliteConnection| -> Result<()> {
                diesel::sql_query("INSERT INTO t (v) VALUES (1)")
                    .execute(conn)
                    .map_err(crate::errors::StorageError::from)?;
                Err(Error::schema("abort"))
            })
            .await
            .expect_err("job error is returned");
        assert!(matches!(err, Error::Schema(_)));
        assert_eq!(count(&pool), 0);

        let inserted = writer
            .exec(|conn: &mut SqliteConnection| -> Result<usize> {
                Ok(diesel::sql_query("INSERT INTO t (v) VALUES (1), (2)")
                    .execute(conn)
                    .map_err(crate::errors::StorageError::from)?)
            })
            .await
            .expect("insert");
        assert_eq!(inserted, 2);
        assert_eq!(count(&pool), 2);
    }
}
