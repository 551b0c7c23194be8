// chkit/src/schema/engine.rs
//
// MergeTree-family table engines, rendered in the classic
// `MergeTree(date, (keys), granularity)` parameter form.
//

const DEFAULT_INDEX_GRANULARITY: u32 = 8192;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineKind {
    MergeTree,
    CollapsingMergeTree { sign_col: String },
    SummingMergeTree { summing_cols: Vec<String> },
    ReplacingMergeTree { version_col: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replication {
    pub table_path: String,
    pub replica_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Engine {
    pub kind: EngineKind,
    pub date_col: String,
    pub key_cols: Vec<String>,
    pub sampling_expr: Option<String>,
    pub index_granularity: u32,
    pub replication: Option<Replication>,
}

impl Engine {
    fn with_kind<S: AsRef<str>>(kind: EngineKind, date_col: &str, key_cols: &[S]) -> Self {
        Self {
            kind,
            date_col: date_col.to_string(),
            key_cols: key_cols.iter().map(|k| k.as_ref().to_string()).collect(),
            sampling_expr: None,
            index_granularity: DEFAULT_INDEX_GRANULARITY,
            replication: None,
        }
    }

    pub fn merge_tree<S: AsRef<str>>(date_col: &str, key_cols: &[S]) -> Self {
        Self::with_kind(EngineKind::MergeTree, date_col, key_cols)
    }

    pub fn collapsing_merge_tree<S: AsRef<str>>(date_col: &str, key_cols: &[S], sign_col: &str) -> Self {
        Self::with_kind(
            EngineKind::CollapsingMergeTree {
                sign_col: sign_col.to_string(),
            },
            date_col,
            key_cols,
        )
    }

    pub fn summing_merge_tree<S: AsRef<str>>(date_col: &str, key_cols: &[S], summing_cols: &[S]) -> Self {
        Self::with_kind(
            EngineKind::SummingMergeTree {
                summing_cols: summing_cols.iter().map(|c| c.as_ref().to_string()).collect(),
            },
            date_col,
            key_cols,
        )
    }

    pub fn replacing_merge_tree<S: AsRef<str>>(
        date_col: &str,
        key_cols: &[S],
        version_col: Option<&str>,
    ) -> Self {
        Self::with_kind(
            EngineKind::ReplacingMergeTree {
                version_col: version_col.map(str::to_string),
            },
            date_col,
            key_cols,
        )
    }

    pub fn sampling(mut self, expr: &str) -> Self {
        self.sampling_expr = Some(expr.to_string());
        self
    }

    pub fn index_granularity(mut self, granularity: u32) -> Self {
        self.index_granularity = granularity;
        self
    }

    pub fn replicated(mut self, table_path: &str, replica_name: &str) -> Self {
        self.replication = Some(Replication {
            table_path: table_path.to_string(),
            replica_name: replica_name.to_string(),
        });
        self
    }

    fn name(&self) -> String {
        let base = match &self.kind {
            EngineKind::MergeTree => "MergeTree",
            EngineKind::CollapsingMergeTree { .. } => "CollapsingMergeTree",
            EngineKind::SummingMergeTree { .. } => "SummingMergeTree",
            EngineKind::ReplacingMergeTree { .. } => "ReplacingMergeTree",
        };
        match self.replication {
            Some(_) => format!("Replicated{}", base),
            None => base.to_string(),
        }
    }

    fn params(&self) -> Vec<String> {
        let mut params = Vec::new();
        if let Some(replication) = &self.replication {
            params.push(format!("'{}'", replication.table_path));
            params.push(format!("'{}'", replication.replica_name));
        }
        params.push(self.date_col.clone());
        if let Some(expr) = &self.sampling_expr {
            params.push(expr.clone());
        }
        params.push(format!("({})", self.key_cols.join(", ")));
        params.push(self.index_granularity.to_string());

        match &self.kind {
            EngineKind::MergeTree => {}
            EngineKind::CollapsingMergeTree { sign_col } => params.push(sign_col.clone()),
            EngineKind::SummingMergeTree { summing_cols } => {
                if !summing_cols.is_empty() {
                    params.push(format!("({})", summing_cols.join(", ")));
                }
            }
            EngineKind::ReplacingMergeTree { version_col } => {
                if let Some(col) = version_col {
                    params.push(col.clone());
                }
            }
        }
        params
    }

    /// The engine clause of a `CREATE TABLE` statement.
    pub fn create_table_sql(&self) -> String {
        format!("{}({})", self.name(), self.params().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_tree() {
        let engine = Engine::merge_tree("date_field", &["int_field", "date_field"]);
        assert_eq!(
            engine.create_table_sql(),
            "MergeTree(date_field, (int_field, date_field), 8192)"
        );
    }

    #[test]
    fn test_sampling_and_granularity() {
        let engine = Engine::merge_tree("d", &["k"])
            .sampling("intHash32(k)")
            .index_granularity(4096);
        assert_eq!(engine.create_table_sql(), "MergeTree(d, intHash32(k), (k), 4096)");
    }

    #[test]
    fn test_replicated_collapsing() {
        let engine = Engine::collapsing_merge_tree("d", &["k"], "sign")
            .replicated("/clickhouse/tables/{shard}/events", "{replica}");
        assert_eq!(
            engine.create_table_sql(),
            "ReplicatedCollapsingMergeTree('/clickhouse/tables/{shard}/events', '{replica}', d, (k), 8192, sign)"
        );
    }

    #[test]
    fn test_summing_and_replacing() {
        assert_eq!(
            Engine::summing_merge_tree("d", &["k"], &["hits", "bytes"]).create_table_sql(),
            "SummingMergeTree(d, (k), 8192, (hits, bytes))"
        );
        assert_eq!(
            Engine::summing_merge_tree::<&str>("d", &["k"], &[]).create_table_sql(),
            "SummingMergeTree(d, (k), 8192)"
        );
        assert_eq!(
            Engine::replacing_merge_tree("d", &["k"], Some("ver")).create_table_sql(),
            "ReplacingMergeTree(d, (k), 8192, ver)"
        );
        assert_eq!(
            Engine::replacing_merge_tree("d", &["k"], None).create_table_sql(),
            "ReplacingMergeTree(d, (k), 8192)"
        );
    }
}
