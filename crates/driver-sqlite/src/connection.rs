use std::{io, time::Duration};

use nestql_core::{
    Connection as EngineConnection, ConnectionConfig, ConnectionError, EngineResult, OpenOptions,
    Result, Version,
};
use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use crate::queries;

pub const SERVER_VERSION_OVERRIDE_KEY: &str = "sqlite.server_version";
pub const PRAGMA_KEY_PREFIX: &str = "sqlite.pragma.";

/// First release with `SAVEPOINT`/`RELEASE`.
pub const MINIMUM_SQLITE_VERSION: Version = Version {
    major: 3,
    minor: 6,
    patch: 8,
};

pub(crate) struct SqliteConnection {
    connection: Connection,
    server_version: Version,
}

pub(crate) fn connect(config: &ConnectionConfig) -> Result<Box<dyn EngineConnection>> {
    let version_override = config
        .extra
        .get(SERVER_VERSION_OVERRIDE_KEY)
        .map(|raw_version| checked_server_version(config, raw_version))
        .transpose()?;
    let pragmas = configured_pragmas(config)?;

    let connection =
        Connection::open_with_flags(config.location.as_str(), open_flags(&config.options))
            .map_err(|source| open_error(config, source))?;

    if let Some(timeout_ms) = config.options.busy_timeout_ms {
        connection
            .busy_timeout(Duration::from_millis(u64::from(timeout_ms)))
            .map_err(|source| open_error(config, source))?;
    }

    connection
        .query_row(queries::SCHEMA_PROBE_QUERY, [], |row| row.get::<_, i64>(0))
        .map_err(|source| open_error(config, source))?;

    let server_version = match version_override {
        Some(version) => version,
        None => {
            let raw_version = query_server_version(&connection, config)?;
            checked_server_version(config, &raw_version)?
        }
    };

    apply_pragmas(&connection, config, &pragmas)?;

    debug!(
        location = %config.location,
        server_version = %server_version,
        busy_timeout_ms = ?config.options.busy_timeout_ms,
        "sqlite connection established"
    );

    Ok(Box::new(SqliteConnection {
        connection,
        server_version,
    }))
}

impl EngineConnection for SqliteConnection {
    fn execute(&self, sql: &str) -> EngineResult<()> {
        self.connection.execute_batch(sql).map_err(Into::into)
    }

    fn ping(&self) -> bool {
        self.connection
            .query_row(queries::PING_QUERY, [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    fn in_transaction(&self) -> bool {
        !self.connection.is_autocommit()
    }

    fn server_version(&self) -> Version {
        self.server_version.clone()
    }

    fn close(self: Box<Self>) -> EngineResult<()> {
        let Self { connection, .. } = *self;
        connection.close().map_err(|(connection, source)| {
            // Dropping the handle finalizes it even though the explicit close failed.
            drop(connection);
            source.into()
        })
    }
}

fn open_flags(options: &OpenOptions) -> OpenFlags {
    let base = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;

    if options.read_only {
        return base | OpenFlags::SQLITE_OPEN_READ_ONLY;
    }
    if options.create_if_missing {
        return base | OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    }

    base | OpenFlags::SQLITE_OPEN_READ_WRITE
}

/// Pragma names are spliced into SQL, so only plain identifiers are accepted.
fn configured_pragmas(config: &ConnectionConfig) -> Result<Vec<(&str, &str)>> {
    config
        .extra
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(PRAGMA_KEY_PREFIX)
                .map(|pragma| (pragma, value.as_str()))
        })
        .map(|(pragma, value)| {
            if is_identifier(pragma) {
                Ok((pragma, value))
            } else {
                Err(open_error(
                    config,
                    io::Error::other(format!("invalid sqlite pragma name: `{pragma}`")),
                ))
            }
        })
        .collect()
}

fn is_identifier(raw: &str) -> bool {
    let mut chars = raw.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

fn apply_pragmas(
    connection: &Connection,
    config: &ConnectionConfig,
    pragmas: &[(&str, &str)],
) -> Result<()> {
    for &(pragma, value) in pragmas {
        debug!(pragma, value, "applying sqlite pragma");
        connection
            .execute_batch(&format!("PRAGMA {pragma} = {value}"))
            .map_err(|source| open_error(config, source))?;
    }

    Ok(())
}

pub fn parse_server_version(raw: &str) -> Option<Version> {
    let mut parts = raw.split_whitespace().next()?.split('.');
    let major = parse_version_component(parts.next()?)?;
    let minor = parts.next().and_then(parse_version_component).unwrap_or(0);
    let patch = parts.next().and_then(parse_version_component).unwrap_or(0);

    Some(Version {
        major,
        minor,
        patch,
    })
}

fn query_server_version(connection: &Connection, config: &ConnectionConfig) -> Result<String> {
    connection
        .query_row(queries::SHOW_SERVER_VERSION_QUERY, [], |row| row.get(0))
        .map_err(|source| open_error(config, source))
}

fn parse_version_component(raw: &str) -> Option<u16> {
    let digits = raw
        .chars()
        .take_while(|ch| ch.is_ascii_digit())
        .collect::<String>();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<u16>().ok()
}

fn checked_server_version(config: &ConnectionConfig, raw_version: &str) -> Result<Version> {
    let version = parse_server_version(raw_version).ok_or_else(|| {
        open_error(
            config,
            io::Error::other(format!(
                "failed to parse sqlite server version string: `{raw_version}`"
            )),
        )
    })?;

    if version < MINIMUM_SQLITE_VERSION {
        return Err(ConnectionError::UnsupportedVersion {
            version: raw_version.to_string(),
            minimum: MINIMUM_SQLITE_VERSION.to_string(),
        }
        .into());
    }

    Ok(version)
}

fn open_error<E>(config: &ConnectionConfig, source: E) -> nestql_core::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    ConnectionError::open_failed(config.location.as_str(), source).into()
}
