use crate::FakeCatalog;
use dashview_core::{ConnectionStatus, SourceInfo};

pub fn source(name: &str, source_type: &str) -> SourceInfo {
    SourceInfo::new(name, source_type).with_status(ConnectionStatus::Connected)
}

pub fn failed_source(name: &str, source_type: &str, error: &str) -> SourceInfo {
    SourceInfo::new(name, source_type)
        .with_status(ConnectionStatus::ConnectionFailed)
        .with_error(error)
}

/// Postgres-style source `pg` with database `prod` and schema `public`.
pub fn postgres_catalog() -> FakeCatalog {
    FakeCatalog::new()
        .with_sources(vec![source("pg", "postgresql")])
        .with_databases("pg", &["prod"])
        .with_schemas("pg", "prod", &["public"])
        .with_tables("pg", "prod", Some("public"), &["users", "orders"])
        .with_columns(
            "pg",
            "prod",
            Some("public"),
            "users",
            &[("id", "integer"), ("email", "text")],
        )
}

/// DuckDB-style source `duck` whose database `main` has no schema level.
pub fn duckdb_catalog() -> FakeCatalog {
    FakeCatalog::new()
        .with_sources(vec![source("duck", "duckdb")])
        .with_databases("duck", &["main"])
        .without_schemas("duck", "main")
        .with_tables("duck", "main", None, &["events"])
        .with_columns("duck", "main", None, "events", &[("ts", "timestamp")])
}

/// One unreachable source next to a healthy one.
pub fn mixed_health_catalog() -> FakeCatalog {
    FakeCatalog::new()
        .with_sources(vec![
            failed_source("broken", "mysql", "connection refused"),
            source("ok", "postgresql"),
        ])
        .with_databases("ok", &["app"])
}
