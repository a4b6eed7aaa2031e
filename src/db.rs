//! Database connection management.
//!
//! Opens a SeaORM connection to the Hitobito Postgres database, optionally
//! through an SSH tunnel spawned as a child `ssh` process. The tools are
//! single-flight, so the pool is kept small.

use std::process::Stdio;
use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use tokio::process::{Child, Command};
use tokio::time::sleep;

use crate::config::AppConfig;

/// Errors that can occur while establishing the database connection.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {source}")]
    ConnectionFailed {
        #[from]
        source: sea_orm::DbErr,
    },
    #[error("Failed to spawn ssh tunnel: {0}")]
    TunnelSpawn(std::io::Error),
    #[error("Invalid database configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl From<DatabaseError> for crate::error::Error {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::ConnectionFailed { source } => crate::error::Error::Db(source),
            DatabaseError::TunnelSpawn(source) => crate::error::Error::Io(source),
            DatabaseError::InvalidConfiguration { message } => {
                crate::error::Error::Config(crate::error::ConfigError::InvalidValue {
                    key: "db_host".to_string(),
                    reason: message,
                })
            }
        }
    }
}

/// A running `ssh -N -L` port forward. The child is killed on drop.
pub struct SshTunnel {
    child: Child,
    pub local_port: u16,
}

impl SshTunnel {
    /// Forward a local port to `db_host:db_port` through the configured
    /// jump host.
    pub async fn open(cfg: &AppConfig) -> Result<Self, DatabaseError> {
        let local_port = pick_local_port();
        let forward = format!("{}:{}:{}", local_port, cfg.db_host, cfg.db_port);
        let destination = format!(
            "{}@{}",
            cfg.ssh_username.as_deref().unwrap_or_default(),
            cfg.ssh_host.as_deref().unwrap_or_default()
        );

        let mut command = Command::new("ssh");
        command
            .arg("-N")
            .arg("-L")
            .arg(&forward)
            .arg("-p")
            .arg(cfg.ssh_port.to_string())
            .arg("-o")
            .arg("ExitOnForwardFailure=yes")
            .arg("-o")
            .arg("BatchMode=yes");
        if let Some(key) = &cfg.ssh_private_key {
            command.arg("-i").arg(key);
        }
        command
            .arg(&destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        tracing::info!(%forward, %destination, "Opening ssh tunnel");
        let child = command.spawn().map_err(DatabaseError::TunnelSpawn)?;
        // Give ssh a moment to establish the forward before we connect.
        sleep(Duration::from_millis(1500)).await;
        Ok(SshTunnel { child, local_port })
    }

    pub async fn close(mut self) {
        let _ = self.child.kill().await;
    }
}

fn pick_local_port() -> u16 {
    // Binding to port 0 and reading back the assigned port avoids races
    // well enough for a single-flight CLI tool.
    std::net::TcpListener::bind(("127.0.0.1", 0))
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .unwrap_or(15432)
}

/// Open the database connection described by `cfg`, retrying transient
/// failures with exponential backoff.
pub async fn connect(
    cfg: &AppConfig,
    tunnel: Option<&SshTunnel>,
) -> Result<DatabaseConnection, DatabaseError> {
    let url = cfg.database_url(tunnel.map(|t| ("127.0.0.1", t.local_port)));
    if cfg.db_host.is_empty() {
        return Err(DatabaseError::InvalidConfiguration {
            message: "db_host cannot be empty".to_string(),
        });
    }

    let mut opt = ConnectOptions::new(url);
    opt.max_connections(4)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let max_retries = 5;
    let mut retry_delay = Duration::from_millis(100);

    for attempt in 1..=max_retries {
        match Database::connect(opt.clone()).await {
            Ok(conn) => {
                tracing::info!(attempt, "Connected to database");
                return Ok(conn);
            }
            Err(e) if attempt < max_retries => {
                tracing::warn!(attempt, error = %e, ?retry_delay, "Database connection failed, retrying");
                sleep(retry_delay).await;
                retry_delay *= 2;
            }
            Err(e) => {
                tracing::error!(attempts = max_retries, error = %e, "Giving up on database connection");
                return Err(DatabaseError::ConnectionFailed { source: e });
            }
        }
    }
    unreachable!("retry loop returns on the last attempt")
}

/// Verify the connection with a trivial round trip.
pub async fn health_check(conn: &DatabaseConnection) -> Result<(), sea_orm::DbErr> {
    conn.execute_unprepared("SELECT 1").await.map(|_| ())
}
