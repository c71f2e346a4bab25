use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use tabula_store::{BatchAction, ContinuationToken, Entity, EntityPage, StoreError, TableStore};

/// One call made against the wrapped store.
#[derive(Debug, Clone, PartialEq)]
#[allow(dead_code)]
pub enum Call {
    EnsureTable(String),
    DeleteTable(String),
    Get(String),
    Submit {
        table: String,
        partition_key: String,
        actions: Vec<BatchAction>,
    },
    QueryPage(String),
}

impl Call {
    pub fn table(&self) -> &str {
        match self {
            Call::EnsureTable(t) | Call::DeleteTable(t) | Call::Get(t) | Call::QueryPage(t) => t,
            Call::Submit { table, .. } => table,
        }
    }
}

/// Store wrapper that records every call before forwarding it.
pub struct Recording<S> {
    pub inner: S,
    calls: Mutex<Vec<Call>>,
}

#[allow(dead_code)]
impl<S: TableStore> Recording<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Calls that touched any table other than `history_table`.
    pub fn data_calls(&self, history_table: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.table() != history_table)
            .collect()
    }

    /// Submitted batches as `(table, partition_key, actions)`.
    pub fn batches(&self) -> Vec<(String, String, Vec<BatchAction>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Submit {
                    table,
                    partition_key,
                    actions,
                } => Some((table, partition_key, actions)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl<S: TableStore> TableStore for Recording<S> {
    async fn ensure_table(&self, table: &str) -> Result<(), StoreError> {
        self.record(Call::EnsureTable(table.to_string()));
        self.inner.ensure_table(table).await
    }

    async fn delete_table(&self, table: &str) -> Result<(), StoreError> {
        self.record(Call::DeleteTable(table.to_string()));
        self.inner.delete_table(table).await
    }

    async fn get_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Entity>, StoreError> {
        self.record(Call::Get(table.to_string()));
        self.inner.get_entity(table, partition_key, row_key).await
    }

    async fn submit_batch(
        &self,
        table: &str,
        partition_key: &str,
        actions: &[BatchAction],
    ) -> Result<(), StoreError> {
        self.record(Call::Submit {
            table: table.to_string(),
            partition_key: partition_key.to_string(),
            actions: actions.to_vec(),
        });
        self.inner.submit_batch(table, partition_key, actions).await
    }

    async fn query_page(
        &self,
        table: &str,
        page_size: usize,
        continuation: Option<&ContinuationToken>,
    ) -> Result<EntityPage, StoreError> {
        self.record(Call::QueryPage(table.to_string()));
        self.inner.query_page(table, page_size, continuation).await
    }
}

/// Write `files` as `(name, content)` into `dir`.
#[allow(dead_code)]
pub fn write_migrations(dir: &Path, files: &[(&str, &str)]) {
    for (name, content) in files {
        std::fs::write(dir.join(name), content).unwrap();
    }
}
