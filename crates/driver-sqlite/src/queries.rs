pub(crate) const SHOW_SERVER_VERSION_QUERY: &str = "SELECT sqlite_version()";

// Touches the first page of the file, so a file that is not a database is
// rejected at open time instead of at the first statement.
pub(crate) const SCHEMA_PROBE_QUERY: &str = "SELECT count(*) FROM sqlite_master";

pub(crate) const PING_QUERY: &str = "SELECT 1";
