use crate::errors::{ClickHouseError, Result};

const SELECT_FORMAT: &str = "FORMAT TabSeparatedWithNamesAndTypes";

pub struct QueryBuilder;

impl QueryBuilder {
    /// Replace `$db` with the quoted database name and `$table` with the
    /// quoted, database-qualified table name. `${name}` is accepted too and
    /// `$$` stands for a literal `$`. Any other placeholder is rejected.
    pub fn substitute(query: &str, db_name: &str, table: Option<&str>) -> Result<String> {
        if !query.contains('$') {
            return Ok(query.to_string());
        }
        let mut out = String::with_capacity(query.len());
        let mut rest = query;
        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];

            if let Some(tail) = after.strip_prefix('$') {
                out.push('$');
                rest = tail;
                continue;
            }

            let (name, tail) = match after.strip_prefix('{') {
                Some(braced) => {
                    let end = braced.find('}').ok_or_else(|| {
                        ClickHouseError::ValidationError(format!("unclosed placeholder in: {}", query))
                    })?;
                    (&braced[..end], &braced[end + 1..])
                }
                None => {
                    let end = after
                        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                        .unwrap_or(after.len());
                    (&after[..end], &after[end..])
                }
            };

            match name {
                "db" => out.push_str(&format!("`{}`", db_name)),
                "table" => {
                    let table = table.ok_or_else(|| {
                        ClickHouseError::ValidationError(format!(
                            "query uses $table but no table is known: {}",
                            query
                        ))
                    })?;
                    out.push_str(&Self::qualified(db_name, table));
                }
                "" => {
                    return Err(ClickHouseError::ValidationError(format!(
                        "invalid placeholder in: {}",
                        query
                    )))
                }
                other => {
                    return Err(ClickHouseError::ValidationError(format!(
                        "unknown placeholder ${} in: {}",
                        other, query
                    )))
                }
            }
            rest = tail;
        }
        out.push_str(rest);
        Ok(out)
    }

    pub fn qualified(db_name: &str, table: &str) -> String {
        format!("`{}`.`{}`", db_name, table)
    }

    /// Batched insert: the statement line followed by one TSV line per row.
    pub fn build_insert_query(db_name: &str, table: &str, lines: &[String]) -> String {
        let mut query = format!(
            "INSERT INTO {} FORMAT TabSeparated",
            Self::qualified(db_name, table)
        );
        for line in lines {
            query.push('\n');
            query.push_str(line);
        }
        query
    }

    /// Append the result format that carries column names and types.
    pub fn build_select_query(query: &str) -> String {
        format!("{} {}", query.trim_end().trim_end_matches(';'), SELECT_FORMAT)
    }

    pub fn build_count_query(conditions: Option<&str>) -> String {
        match conditions {
            Some(cond) if !cond.trim().is_empty() => {
                format!("SELECT count() FROM $table WHERE {}", cond)
            }
            _ => "SELECT count() FROM $table".to_string(),
        }
    }

    pub fn build_create_database(db_name: &str) -> String {
        format!("CREATE DATABASE IF NOT EXISTS `{}`", db_name)
    }

    pub fn build_drop_database(db_name: &str) -> String {
        format!("DROP DATABASE `{}`", db_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_placeholders() {
        assert_eq!(
            QueryBuilder::substitute("SELECT * FROM $table WHERE x = 1", "db", Some("events")).unwrap(),
            "SELECT * FROM `db`.`events` WHERE x = 1"
        );
        assert_eq!(
            QueryBuilder::substitute("SELECT * FROM $db.events", "db", None).unwrap(),
            "SELECT * FROM `db`.events"
        );
        assert_eq!(
            QueryBuilder::substitute("SELECT 1", "db", None).unwrap(),
            "SELECT 1"
        );
        assert!(QueryBuilder::substitute("SELECT * FROM $table", "db", None).is_err());
    }

    #[test]
    fn test_substitute_respects_identifier_boundaries() {
        assert!(matches!(
            QueryBuilder::substitute("SELECT * FROM $dbname.t", "db", None),
            Err(ClickHouseError::ValidationError(_))
        ));
        assert!(QueryBuilder::substitute("SELECT $tables", "db", Some("t")).is_err());
        assert!(QueryBuilder::substitute("SELECT $", "db", None).is_err());
        assert!(QueryBuilder::substitute("SELECT ${db", "db", None).is_err());

        assert_eq!(
            QueryBuilder::substitute("SELECT '$$1' FROM ${db}.t_1, $table", "db", Some("t")).unwrap(),
            "SELECT '$1' FROM `db`.t_1, `db`.`t`"
        );
        assert_eq!(
            QueryBuilder::substitute("SELECT * FROM $db.$table", "db", Some("t")).unwrap(),
            "SELECT * FROM `db`.`db`.`t`"
        );
    }

    #[test]
    fn test_build_insert_query() {
        let lines = vec!["1\ta".to_string(), "2\tb".to_string()];
        assert_eq!(
            QueryBuilder::build_insert_query("db", "t", &lines),
            "INSERT INTO `db`.`t` FORMAT TabSeparated\n1\ta\n2\tb"
        );
    }

    #[test]
    fn test_build_select_and_count() {
        assert_eq!(
            QueryBuilder::build_select_query("SELECT * FROM $table ORDER BY d;"),
            "SELECT * FROM $table ORDER BY d FORMAT TabSeparatedWithNamesAndTypes"
        );
        assert_eq!(
            QueryBuilder::build_count_query(Some("user_id > 3")),
            "SELECT count() FROM $table WHERE user_id > 3"
        );
        assert_eq!(QueryBuilder::build_count_query(None), "SELECT count() FROM $table");
    }

    #[test]
    fn test_database_statements() {
        assert_eq!(
            QueryBuilder::build_create_database("test-db"),
            "CREATE DATABASE IF NOT EXISTS `test-db`"
        );
        assert_eq!(QueryBuilder::build_drop_database("test-db"), "DROP DATABASE `test-db`");
    }
}
