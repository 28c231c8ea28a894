//! Per-test Postgres databases inside one shared container.

use once_cell::sync::Lazy;
use sqlx::{Connection, PgConnection, PgPool, query};
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::{OnceCell, mpsc};
use uuid::Uuid;

const ROLE: &str = "vouchers";

struct Server {
    _container: ContainerAsync<Postgres>,
    host: String,
    port: u16,
}

impl Server {
    async fn start() -> Self {
        let container = Postgres::default()
            .with_user(ROLE)
            .with_password(ROLE)
            .with_db_name(ROLE)
            .start()
            .await
            .expect("postgres container should start");

        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("postgres port should be mapped");

        let host = std::env::var("TESTCONTAINERS_HOST_OVERRIDE")
            .unwrap_or_else(|_| "localhost".to_string());

        Self {
            _container: container,
            host,
            port,
        }
    }

    fn url(&self, database: &str) -> String {
        format!(
            "postgresql://{ROLE}:{ROLE}@{}:{}/{database}",
            self.host, self.port
        )
    }
}

static SERVER: Lazy<OnceCell<Server>> = Lazy::new(OnceCell::new);

/// Names of databases whose `TestDb` has been dropped.
static DROPPED: Lazy<OnceCell<mpsc::UnboundedSender<String>>> = Lazy::new(OnceCell::new);

async fn spawn_dropper() -> mpsc::UnboundedSender<String> {
    let (sender, mut receiver) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        while let Some(name) = receiver.recv().await {
            let Some(server) = SERVER.get() else {
                continue;
            };

            if let Ok(mut conn) = PgConnection::connect(&server.url(ROLE)).await {
                let _ = query(&format!(r#"DROP DATABASE IF EXISTS "{name}""#))
                    .execute(&mut conn)
                    .await;
                let _ = conn.close().await;
            }
        }
    });

    sender
}

/// A freshly migrated database, dropped in the background once the test releases it.
#[derive(Debug)]
pub struct TestDb {
    pool: PgPool,
    name: String,
}

impl TestDb {
    pub async fn new() -> Self {
        DROPPED.get_or_init(spawn_dropper).await;

        let server = SERVER.get_or_init(Server::start).await;
        let name = format!("vouchers_{}", Uuid::new_v4().simple());

        let mut admin = PgConnection::connect(&server.url(ROLE))
            .await
            .expect("admin connection should open");

        query(&format!(r#"CREATE DATABASE "{name}""#))
            .execute(&mut admin)
            .await
            .expect("test database should be created");

        let _ = admin.close().await;

        let pool = PgPool::connect(&server.url(&name))
            .await
            .expect("test database pool should open");

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .expect("migrations should apply");

        Self { pool, name }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        if let Some(sender) = DROPPED.get() {
            let _ = sender.send(self.name.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use sqlx::query_scalar;
    use testresult::TestResult;

    use super::*;

    #[tokio::test]
    async fn migrations_create_empty_voucher_tables() -> TestResult {
        let db = TestDb::new().await;

        for table in [
            "vouchers",
            "voucher_usages",
            "voucher_collections",
            "customer_profiles",
            "store_owners",
        ] {
            let rows: i64 = query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(db.pool())
                .await?;

            assert_eq!(rows, 0, "{table} should start empty");
        }

        Ok(())
    }

    #[tokio::test]
    async fn each_test_db_is_isolated() -> TestResult {
        let first = TestDb::new().await;
        let second = TestDb::new().await;

        query("INSERT INTO store_owners (store_uuid, user_uuid) VALUES ($1, $2)")
            .bind(Uuid::now_v7())
            .bind(Uuid::now_v7())
            .execute(first.pool())
            .await?;

        let rows: i64 = query_scalar("SELECT COUNT(*) FROM store_owners")
            .fetch_one(second.pool())
            .await?;

        assert_eq!(first.name.len(), second.name.len());
        assert_ne!(first.name, second.name);
        assert_eq!(rows, 0);

        Ok(())
    }
}
