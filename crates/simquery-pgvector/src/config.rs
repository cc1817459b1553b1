use std::fmt;

use simquery_core::schema::validate_identifier;
use simquery_core::SimQueryError;
use sqlx::postgres::PgConnectOptions;

/// Connection settings for a [`PgConnector`](crate::PgConnector).
///
/// The password is injected explicitly. Reading it from the environment is
/// the caller's job.
#[derive(Clone)]
pub struct PgConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    password: Option<String>,
    /// Schema holding the tables, views and routines. Defaults to
    /// `"vector_db"`.
    pub schema: String,
}

impl PgConfig {
    pub const DEFAULT_HOST: &'static str = "localhost";
    pub const DEFAULT_PORT: u16 = 5432;
    pub const DEFAULT_DATABASE: &'static str = "erp_tngroup";
    pub const DEFAULT_USER: &'static str = "erp_admin";
    pub const DEFAULT_SCHEMA: &'static str = "vector_db";

    pub fn new() -> Self {
        Self {
            host: Self::DEFAULT_HOST.to_string(),
            port: Self::DEFAULT_PORT,
            database: Self::DEFAULT_DATABASE.to_string(),
            user: Self::DEFAULT_USER.to_string(),
            password: None,
            schema: Self::DEFAULT_SCHEMA.to_string(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Reject settings that cannot produce a usable connection.
    pub fn validate(&self) -> Result<(), SimQueryError> {
        if self.host.is_empty() {
            return Err(SimQueryError::Config("host must not be empty".to_string()));
        }
        if self.database.is_empty() {
            return Err(SimQueryError::Config(
                "database must not be empty".to_string(),
            ));
        }
        if self.user.is_empty() {
            return Err(SimQueryError::Config("user must not be empty".to_string()));
        }
        validate_identifier(&self.schema)
    }

    /// sqlx connect options for these settings.
    pub fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user);
        match &self.password {
            Some(password) => options.password(password),
            None => options,
        }
    }

    /// `host:port/database`, for log lines.
    pub fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

impl Default for PgConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PgConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("schema", &self.schema)
            .finish()
    }
}
