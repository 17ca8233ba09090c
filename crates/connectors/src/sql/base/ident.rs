use crate::sql::base::error::DbError;

/// Quotes a possibly schema-qualified identifier, e.g. `public.users`
/// becomes `"public"."users"`.
pub fn quote_ident(name: &str) -> Result<String, DbError> {
    let parts: Vec<&str> = name.split('.').map(str::trim).collect();
    if parts.is_empty() || parts.len() > 2 || parts.iter().any(|p| p.is_empty()) {
        return Err(DbError::QueryBuildError(format!(
            "invalid identifier: '{name}'"
        )));
    }

    Ok(parts
        .iter()
        .map(|p| format!("\"{}\"", p.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join("."))
}
