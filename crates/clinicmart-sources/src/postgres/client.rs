use clinicmart_types::SourceError;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, Config as PgConfig, NoTls};

use crate::config::PostgresSource;

/// Connect to `PostgreSQL`. The connection task ends when the returned
/// client is dropped.
pub(crate) async fn connect(config: &PostgresSource) -> Result<Client, SourceError> {
    let mut pg = PgConfig::new();
    pg.host(&config.host);
    pg.port(config.port);
    pg.user(&config.user);
    if !config.password.is_empty() {
        pg.password(&config.password);
    }
    pg.dbname(&config.database);

    let (client, connection) = pg.connect(NoTls).await.map_err(|e| classify(&e, "connect"))?;

    let host = config.host.clone();
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!(host = %host, error = %e, "postgres source connection closed with error");
        }
    });

    Ok(client)
}

/// Map a driver error onto the source error categories.
pub(crate) fn classify(err: &tokio_postgres::Error, action: &str) -> SourceError {
    let message = format!("{action} failed: {err}");
    match err.code() {
        Some(code)
            if *code == SqlState::INVALID_PASSWORD
                || *code == SqlState::INVALID_AUTHORIZATION_SPECIFICATION =>
        {
            SourceError::auth(message)
        }
        Some(_) => SourceError::query(message),
        None if action == "connect" => SourceError::connection(message),
        None if err.is_closed() => SourceError::connection(message),
        None => SourceError::decode(message),
    }
}
