//! InfluxDB sink using the 1.x HTTP write API.
//!
//! Points are encoded as line protocol and posted to `/write` with second
//! precision. A batch is one request, so InfluxDB accepts or rejects it as a
//! whole.
//!
//! ## Example
//!
//! ```rust,no_run
//! use muninflux_adapters::influxdb::InfluxDbSink;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sink = InfluxDbSink::builder()
//!         .endpoint("http://influx.local:8086")
//!         .credentials("munin", "secret")
//!         .database("munin")
//!         .build()?;
//!
//!     sink.ensure_database().await?;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::debug;

use muninflux_types::WritePoint;

use crate::{line_protocol, AdapterError, PointSink};

/// Writes batches to an InfluxDB database.
#[derive(Debug, Clone)]
pub struct InfluxDbSink {
    client: Client,
    endpoint: String,
    username: String,
    password: String,
    database: String,
    description: String,
}

impl InfluxDbSink {
    /// Create a new builder for configuring the sink.
    pub fn builder() -> InfluxDbSinkBuilder {
        InfluxDbSinkBuilder::default()
    }

    /// Name of the target database.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Create the target database if it doesn't exist yet.
    ///
    /// `CREATE DATABASE` is a no-op on an existing database.
    pub async fn ensure_database(&self) -> Result<(), AdapterError> {
        let response = self.create_database_request().send().await?;
        check_status(response).await
    }

    fn create_database_request(&self) -> RequestBuilder {
        let statement = format!("CREATE DATABASE {}", quote_identifier(&self.database));
        self.client
            .post(format!("{}/query", self.endpoint))
            .basic_auth(&self.username, Some(&self.password))
            .query(&[("q", statement.as_str())])
    }

    fn write_request(&self, body: String) -> RequestBuilder {
        self.client
            .post(format!("{}/write", self.endpoint))
            .basic_auth(&self.username, Some(&self.password))
            .query(&[("db", self.database.as_str()), ("precision", "s")])
            .body(body)
    }
}

#[async_trait]
impl PointSink for InfluxDbSink {
    async fn submit(&self, batch: &[WritePoint]) -> Result<(), AdapterError> {
        let body = line_protocol::encode(batch);
        if body.is_empty() {
            debug!("Skipping batch without any known value");
            return Ok(());
        }

        let response = self.write_request(body).send().await?;

        check_status(response).await
    }

    fn description(&self) -> &str {
        &self.description
    }
}

async fn check_status(response: reqwest::Response) -> Result<(), AdapterError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(AdapterError::Auth("Invalid credentials".to_string()));
    }

    if status == StatusCode::BAD_REQUEST {
        let detail = response.text().await.unwrap_or_default();
        return Err(AdapterError::Rejected(detail));
    }

    if !status.is_success() {
        return Err(AdapterError::Http(format!("API returned status {}", status)));
    }

    Ok(())
}

/// Builder for InfluxDbSink.
#[derive(Debug, Default)]
pub struct InfluxDbSinkBuilder {
    endpoint: Option<String>,
    username: Option<String>,
    password: Option<String>,
    database: Option<String>,
    timeout: Option<Duration>,
}

impl InfluxDbSinkBuilder {
    /// Set the HTTP endpoint (e.g., "http://localhost:8086").
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the username and password for authentication.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the database to write to (default: "munin").
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the request timeout (default: 30 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the sink.
    pub fn build(self) -> Result<InfluxDbSink, AdapterError> {
        let timeout = self.timeout.unwrap_or(Duration::from_secs(30));
        let client = Client::builder().timeout(timeout).build()?;

        let endpoint = self
            .endpoint
            .unwrap_or_else(|| "http://localhost:8086".to_string())
            .trim_end_matches('/')
            .to_string();
        let database = self.database.unwrap_or_else(|| "munin".to_string());
        let description = format!("influxdb: {}/db/{}", endpoint, database);

        Ok(InfluxDbSink {
            client,
            endpoint,
            username: self.username.unwrap_or_else(|| "root".to_string()),
            password: self.password.unwrap_or_else(|| "root".to_string()),
            database,
            description,
        })
    }
}

/// Double-quoted InfluxQL identifier with embedded quotes and backslashes escaped.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let sink = InfluxDbSink::builder().build().unwrap();
        assert_eq!(sink.endpoint, "http://localhost:8086");
        assert_eq!(sink.username, "root");
        assert_eq!(sink.password, "root");
        assert_eq!(sink.database(), "munin");
    }

    #[test]
    fn test_builder_custom() {
        let sink = InfluxDbSink::builder()
            .endpoint("http://influx.local:8086/")
            .credentials("admin", "secret")
            .database("munin history")
            .build()
            .unwrap();

        assert_eq!(sink.endpoint, "http://influx.local:8086");
        assert_eq!(sink.username, "admin");
        let request = sink.write_request(String::new()).build().unwrap();
        assert_eq!(request.url().path(), "/write");
        let query: Vec<(String, String)> = request.url().query_pairs().into_owned().collect();
        assert_eq!(
            query,
            vec![
                ("db".to_string(), "munin history".to_string()),
                ("precision".to_string(), "s".to_string()),
            ]
        );
        assert_eq!(
            sink.description(),
            "influxdb: http://influx.local:8086/db/munin history"
        );
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("munin"), r#""munin""#);
        assert_eq!(quote_identifier(r#"a"b"#), r#""a\"b""#);
        assert_eq!(quote_identifier(r"a\b"), r#""a\\b""#);
    }

    #[test]
    fn create_database_escapes_name() {
        let sink = InfluxDbSink::builder()
            .database(r#"munin"; DROP DATABASE "prod"#)
            .build()
            .unwrap();

        let request = sink.create_database_request().build().unwrap();
        assert_eq!(request.url().path(), "/query");
        let (key, statement) = request.url().query_pairs().next().unwrap();
        assert_eq!(key, "q");
        assert_eq!(
            statement,
            r#"CREATE DATABASE "munin\"; DROP DATABASE \"prod""#
        );
    }

    #[tokio::test]
    async fn unreachable_server_is_a_connection_error() {
        let sink = InfluxDbSink::builder()
            .endpoint("http://127.0.0.1:9")
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let point = WritePoint::builder("cpu").time(1).field("user", Some(1.0)).build();

        let err = sink.submit(&[point]).await.unwrap_err();
        assert!(matches!(
            err,
            AdapterError::Connection(_) | AdapterError::Timeout | AdapterError::Http(_)
        ));
    }
}
