use once_cell::sync::Lazy;
use regex::Regex;

use super::adapter::AdapterType;
use super::error::GraphError;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Labels and relationship types are string-interpolated (the query
/// languages don't parameterise them), so every one is checked against this
/// before it ever reaches a query string (§4.3 injection-safety invariant).
pub fn validate_identifier(candidate: &str) -> Result<(), GraphError> {
    if IDENTIFIER.is_match(candidate) {
        Ok(())
    } else {
        Err(GraphError::Validation(format!(
            "'{candidate}' is not a valid label/relationship-type identifier"
        )))
    }
}

pub fn validate_identifiers<'a>(candidates: impl IntoIterator<Item = &'a str>) -> Result<(), GraphError> {
    for candidate in candidates {
        validate_identifier(candidate)?;
    }
    Ok(())
}

/// Catalog of constraints/indexes shared by both dialects; `statements_for`
/// renders the dialect-specific DDL. Every statement is written to be
/// idempotent (`IF NOT EXISTS`) so schema init can run on every startup.
pub fn schema_statements(adapter: AdapterType) -> Vec<String> {
    match adapter {
        AdapterType::Neo4j => vec![
            "CREATE CONSTRAINT repository_name IF NOT EXISTS FOR (r:Repository) REQUIRE r.name IS UNIQUE".into(),
            "CREATE CONSTRAINT file_identity IF NOT EXISTS FOR (f:File) REQUIRE (f.repository, f.path) IS NODE KEY".into(),
            "CREATE CONSTRAINT module_name IF NOT EXISTS FOR (m:Module) REQUIRE m.name IS UNIQUE".into(),
            "CREATE CONSTRAINT concept_name IF NOT EXISTS FOR (c:Concept) REQUIRE c.name IS UNIQUE".into(),
            "CREATE FULLTEXT INDEX function_names IF NOT EXISTS FOR (f:Function) ON EACH [f.name]".into(),
        ],
        // The legacy `CREATE INDEX ON :Label(prop)` form errors if the index
        // already exists; the Cypher-style `FOR (n:Label) ON (n.prop)` form
        // is a no-op on a repeat call, which is what makes `ensure_schema`
        // safe to run on every startup.
        AdapterType::FalkorDb => vec![
            "CREATE INDEX FOR (r:Repository) ON (r.name)".into(),
            "CREATE INDEX FOR (f:File) ON (f.file_id)".into(),
            "CREATE INDEX FOR (m:Module) ON (m.name)".into(),
            "CREATE INDEX FOR (c:Concept) ON (c.name)".into(),
        ],
    }
}

/// FalkorDB has no composite-key constraint; callers synthesize this as the
/// node's unique identity property instead (§4.3 dialect table).
pub fn falkordb_file_id(repository: &str, path: &str) -> String {
    format!("{repository}::{path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_cypher_injection_attempts() {
        assert!(validate_identifier("Evil}]->(m) DETACH DELETE m//").is_err());
        assert!(validate_identifier("has space").is_err());
        assert!(validate_identifier("1LeadingDigit").is_err());
    }

    #[test]
    fn accepts_well_formed_identifiers() {
        assert!(validate_identifier("Function").is_ok());
        assert!(validate_identifier("BELONGS_TO").is_ok());
        assert!(validate_identifier("_private").is_ok());
    }

    #[test]
    fn falkordb_file_id_is_a_stable_composite() {
        assert_eq!(falkordb_file_id("widgets", "src/lib.rs"), "widgets::src/lib.rs");
    }
}
