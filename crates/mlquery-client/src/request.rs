//! Evaluation request construction.
//!
//! The user's query is never spliced into the evaluated source. It travels as
//! an external variable and is run by a fixed wrapper that selects the target
//! databases from further variables.

use mlquery_core::{ConnectionSettings, Dialect};
use serde_json::{Map, Value};

/// Variable holding the user's query text.
pub const QUERY_VARIABLE: &str = "actualQuery";
/// Variable holding the content database name.
pub const DOCUMENTS_DB_VARIABLE: &str = "documentsDb";
/// Variable holding the modules database name.
pub const MODULES_DB_VARIABLE: &str = "modulesDb";
/// Variable holding the database name to resolve.
pub const DATABASE_NAME_VARIABLE: &str = "databaseName";

/// XQuery wrapper. Evaluates `$actualQuery` against the named content and
/// modules databases.
const XQUERY_WRAPPER: &str = r#"xquery version "1.0-ml";
declare variable $actualQuery as xs:string external;
declare variable $documentsDb as xs:string external;
declare variable $modulesDb as xs:string external;
let $options :=
  <options xmlns="xdmp:eval">
    <database>{xdmp:database($documentsDb)}</database>
    <modules>{xdmp:database($modulesDb)}</modules>
  </options>
return xdmp:eval($actualQuery, (), $options)"#;

/// JavaScript wrapper. Evaluates `actualQuery` as server-side JavaScript
/// against the named content database.
const JAVASCRIPT_WRAPPER: &str = r"var actualQuery;
var documentsDb;
xdmp.javascriptEval(actualQuery, null, { database: xdmp.database(documentsDb) });";

/// Resolves a database name to its numeric id.
const DATABASE_LOOKUP: &str = r#"xquery version "1.0-ml";
declare variable $databaseName as xs:string external;
xdmp:database($databaseName)"#;

/// A request to the remote evaluation endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalRequest {
    /// Language of `source`.
    pub dialect: Dialect,
    /// Program evaluated by the server.
    pub source: String,
    /// External variables bound for the evaluation.
    pub variables: Map<String, Value>,
}

impl EvalRequest {
    /// Create a request with no bound variables.
    pub fn new(dialect: Dialect, source: impl Into<String>) -> Self {
        Self {
            dialect,
            source: source.into(),
            variables: Map::new(),
        }
    }

    /// Bind an external variable.
    pub fn bind(mut self, name: &str, value: impl Into<String>) -> Self {
        self.variables
            .insert(name.to_string(), Value::String(value.into()));
        self
    }

    /// Wrap a user query so it runs against the databases named in
    /// `settings`.
    ///
    /// XQuery binds the content and the modules database, JavaScript only the
    /// content database.
    pub fn for_query(dialect: Dialect, query: &str, settings: &ConnectionSettings) -> Self {
        match dialect {
            Dialect::XQuery => Self::new(dialect, XQUERY_WRAPPER)
                .bind(QUERY_VARIABLE, query)
                .bind(DOCUMENTS_DB_VARIABLE, settings.documents_db.as_str())
                .bind(MODULES_DB_VARIABLE, settings.modules_db.as_str()),
            Dialect::JavaScript => Self::new(dialect, JAVASCRIPT_WRAPPER)
                .bind(QUERY_VARIABLE, query)
                .bind(DOCUMENTS_DB_VARIABLE, settings.documents_db.as_str()),
        }
    }

    /// Request resolving a database name to its id.
    pub fn database_lookup(name: &str) -> Self {
        Self::new(Dialect::XQuery, DATABASE_LOOKUP).bind(DATABASE_NAME_VARIABLE, name)
    }

    /// Variables as the JSON object sent in the `vars` form field.
    pub fn variables_json(&self) -> String {
        Value::Object(self.variables.clone()).to_string()
    }

    /// Form fields of the request body.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![(self.dialect.field_name(), self.source.clone())];
        if !self.variables.is_empty() {
            fields.push(("vars", self.variables_json()));
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xquery_binds_both_databases() {
        let settings = ConnectionSettings::default();
        let request = EvalRequest::for_query(Dialect::XQuery, "1+1", &settings);

        assert_eq!(request.variables[QUERY_VARIABLE], "1+1");
        assert_eq!(request.variables[DOCUMENTS_DB_VARIABLE], "Documents");
        assert_eq!(request.variables[MODULES_DB_VARIABLE], "Modules");
    }

    #[test]
    fn test_javascript_binds_content_database_only() {
        let settings = ConnectionSettings::default();
        let request = EvalRequest::for_query(Dialect::JavaScript, "1 + 1", &settings);

        assert_eq!(request.variables[DOCUMENTS_DB_VARIABLE], "Documents");
        assert!(!request.variables.contains_key(MODULES_DB_VARIABLE));
        assert_eq!(request.form_fields()[0].0, "javascript");
    }

    #[test]
    fn test_javascript_runs_as_javascript() {
        let settings = ConnectionSettings::default();
        let request =
            EvalRequest::for_query(Dialect::JavaScript, "cts.doc('/a.json')", &settings);

        assert!(request.source.contains("xdmp.javascriptEval(actualQuery"));
        assert!(!request.source.contains("xdmp.eval("));
        assert_eq!(request.variables[QUERY_VARIABLE], "cts.doc('/a.json')");
    }

    #[test]
    fn test_query_is_not_interpolated() {
        let settings = ConnectionSettings::default();
        let hostile = r#"")) xdmp:document-delete("/x.xml") (("#;
        let request = EvalRequest::for_query(Dialect::XQuery, hostile, &settings);

        assert!(!request.source.contains(hostile));
        assert_eq!(request.variables[QUERY_VARIABLE], hostile);
    }

    #[test]
    fn test_database_lookup_fields() {
        let request = EvalRequest::database_lookup("Documents");
        let fields = request.form_fields();

        assert_eq!(fields[0].0, "xquery");
        assert_eq!(fields[1], ("vars", r#"{"databaseName":"Documents"}"#.to_string()));
    }
}
