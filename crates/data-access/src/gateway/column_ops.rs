//! Column-store operations.

use std::time::Instant;

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::column::{
    BatchItem, ColumnOperation, Compiled, Criteria, Projection, compile, split_id,
};
use crate::core::RowSet;
use crate::error::{
    DataAccessResult, OperationContext, ValidationError, classify, timed_out,
};
use crate::normalize::normalize_rows;
use crate::types::{
    CompositeKey, Filter, FilterValue, ID_COLUMN, OperationResponse, Record, RecordKey, Ttl,
    TtlProjection,
};

use super::DataAccess;

fn field_list(fields: Option<&[&str]>) -> Option<Vec<String>> {
    fields.map(|fields| fields.iter().map(|f| f.to_string()).collect())
}

fn id_values(ids: &[&str]) -> Vec<Value> {
    ids.iter().map(|id| Value::String(id.to_string())).collect()
}

impl DataAccess {
    /// Compiles, executes and normalizes one column-store operation.
    pub(crate) async fn run_column(
        &self,
        operation: &'static str,
        keyspace: &str,
        table: &str,
        request: &ColumnOperation,
    ) -> DataAccessResult<OperationResponse> {
        let context = OperationContext::new(operation, keyspace, table);
        let compiled = compile(keyspace, table, request).map_err(|err| {
            warn!(operation, namespace = keyspace, table, error = %err, "Rejected column operation");
            err
        })?;

        let session = self.inner.sessions.get(keyspace).await?;
        let timeout = self.inner.config.column_store.request_timeout();
        let start = Instant::now();
        let outcome = tokio::time::timeout(timeout, async {
            match &compiled {
                Compiled::Single(statement) => session.execute(statement).await,
                Compiled::Batch(statements) => {
                    session.execute_batch(statements).await.map(|_| RowSet::default())
                }
            }
        })
        .await;
        let elapsed = start.elapsed();

        debug!(
            operation,
            namespace = keyspace,
            table,
            cql = %compiled,
            elapsed_ms = elapsed.as_millis() as u64,
            "{} completed in {}",
            operation,
            humantime::format_duration(elapsed)
        );

        let rows = match outcome {
            Ok(Ok(rows)) => rows,
            Ok(Err(driver)) => {
                let err = classify(&context, elapsed, driver);
                error!(operation, namespace = keyspace, table, cql = %compiled, error = %err, "Column operation failed");
                return Err(err);
            }
            Err(_) => {
                let err = timed_out(&context, timeout);
                error!(operation, namespace = keyspace, table, cql = %compiled, error = %err, "Column operation timed out");
                return Err(err);
            }
        };

        let is_read = compiled.statements().iter().any(|s| s.is_read());
        if is_read {
            Ok(normalize_rows(rows, &self.inner.mapping))
        } else {
            Ok(OperationResponse::empty())
        }
    }

    async fn select(
        &self,
        operation: &'static str,
        keyspace: &str,
        table: &str,
        criteria: Criteria,
        projection: Projection,
    ) -> DataAccessResult<OperationResponse> {
        let request = ColumnOperation::Select {
            criteria,
            projection,
        };
        self.run_column(operation, keyspace, table, &request).await
    }

    // Writes

    /// Inserts a record; an existing row with the same key is overwritten.
    pub async fn insert_record(
        &self,
        keyspace: &str,
        table: &str,
        record: &Record,
    ) -> DataAccessResult<OperationResponse> {
        let request = ColumnOperation::Insert {
            record: record.clone(),
            ttl: Ttl::NONE,
        };
        self.run_column("insert_record", keyspace, table, &request).await
    }

    /// Inserts or replaces a record.
    pub async fn upsert_record(
        &self,
        keyspace: &str,
        table: &str,
        record: &Record,
    ) -> DataAccessResult<OperationResponse> {
        let request = ColumnOperation::Insert {
            record: record.clone(),
            ttl: Ttl::NONE,
        };
        self.run_column("upsert_record", keyspace, table, &request).await
    }

    /// Inserts a record whose columns expire after `ttl_seconds`.
    /// A non-positive TTL writes without expiry.
    pub async fn insert_record_with_ttl(
        &self,
        keyspace: &str,
        table: &str,
        record: &Record,
        ttl_seconds: i64,
    ) -> DataAccessResult<OperationResponse> {
        let request = ColumnOperation::Insert {
            record: record.clone(),
            ttl: Ttl(ttl_seconds),
        };
        self.run_column("insert_record_with_ttl", keyspace, table, &request).await
    }

    /// Updates the row identified by the record's `id`; every other column
    /// is set.
    pub async fn update_record(
        &self,
        keyspace: &str,
        table: &str,
        record: &Record,
    ) -> DataAccessResult<OperationResponse> {
        let (key, values) = split_id(record)?;
        let request = ColumnOperation::Update {
            key,
            values,
            ttl: Ttl::NONE,
        };
        self.run_column("update_record", keyspace, table, &request).await
    }

    /// Sets `values` on the row identified by a composite key.
    pub async fn update_record_by_key(
        &self,
        keyspace: &str,
        table: &str,
        values: &Record,
        key: &CompositeKey,
    ) -> DataAccessResult<OperationResponse> {
        let request = ColumnOperation::Update {
            key: RecordKey::Composite(key.clone()),
            values: values.clone(),
            ttl: Ttl::NONE,
        };
        self.run_column("update_record_by_key", keyspace, table, &request).await
    }

    /// Sets `values` with an expiry on the row identified by a composite key.
    pub async fn update_record_with_ttl(
        &self,
        keyspace: &str,
        table: &str,
        values: &Record,
        key: &CompositeKey,
        ttl_seconds: i64,
    ) -> DataAccessResult<OperationResponse> {
        let request = ColumnOperation::Update {
            key: RecordKey::Composite(key.clone()),
            values: values.clone(),
            ttl: Ttl(ttl_seconds),
        };
        self.run_column("update_record_with_ttl", keyspace, table, &request).await
    }

    // Deletes

    /// Deletes the row with the given id.
    pub async fn delete_record(
        &self,
        keyspace: &str,
        table: &str,
        id: &str,
    ) -> DataAccessResult<OperationResponse> {
        let request = ColumnOperation::Delete {
            criteria: Criteria::Key(RecordKey::id(id)),
        };
        self.run_column("delete_record", keyspace, table, &request).await
    }

    /// Deletes the row identified by a composite key.
    pub async fn delete_record_by_key(
        &self,
        keyspace: &str,
        table: &str,
        key: &CompositeKey,
    ) -> DataAccessResult<OperationResponse> {
        let request = ColumnOperation::Delete {
            criteria: Criteria::Key(RecordKey::Composite(key.clone())),
        };
        self.run_column("delete_record_by_key", keyspace, table, &request).await
    }

    /// Deletes every row whose id is listed. Returns true once applied.
    pub async fn delete_records(
        &self,
        keyspace: &str,
        table: &str,
        ids: &[&str],
    ) -> DataAccessResult<bool> {
        let request = ColumnOperation::Delete {
            criteria: Criteria::In {
                column: ID_COLUMN.to_string(),
                values: id_values(ids),
            },
        };
        self.run_column("delete_records", keyspace, table, &request).await?;
        Ok(true)
    }

    // Reads

    /// Reads the row with the given key.
    pub async fn get_record_by_id(
        &self,
        keyspace: &str,
        table: &str,
        key: impl Into<RecordKey>,
        fields: Option<&[&str]>,
    ) -> DataAccessResult<OperationResponse> {
        self.select(
            "get_record_by_id",
            keyspace,
            table,
            Criteria::Key(key.into()),
            Projection::fields(field_list(fields)),
        )
        .await
    }

    /// Reads every row whose id is listed.
    pub async fn get_records_by_ids(
        &self,
        keyspace: &str,
        table: &str,
        ids: &[&str],
        fields: Option<&[&str]>,
    ) -> DataAccessResult<OperationResponse> {
        self.select(
            "get_records_by_ids",
            keyspace,
            table,
            Criteria::In {
                column: ID_COLUMN.to_string(),
                values: id_values(ids),
            },
            Projection::fields(field_list(fields)),
        )
        .await
    }

    /// Reads every row whose `key_column` is one of `keys`.
    pub async fn get_records_by_primary_keys(
        &self,
        keyspace: &str,
        table: &str,
        key_column: &str,
        keys: &[&str],
        fields: Option<&[&str]>,
    ) -> DataAccessResult<OperationResponse> {
        self.select(
            "get_records_by_primary_keys",
            keyspace,
            table,
            Criteria::In {
                column: key_column.to_string(),
                values: id_values(keys),
            },
            Projection::fields(field_list(fields)),
        )
        .await
    }

    /// Reads one row with the remaining TTL of the projected columns.
    pub async fn get_record_with_ttl_by_id(
        &self,
        keyspace: &str,
        table: &str,
        key: impl Into<RecordKey>,
        ttl: &TtlProjection,
        fields: Option<&[&str]>,
    ) -> DataAccessResult<OperationResponse> {
        self.select(
            "get_record_with_ttl_by_id",
            keyspace,
            table,
            Criteria::Key(key.into()),
            Projection::fields(field_list(fields)).with_ttl(ttl.clone()),
        )
        .await
    }

    /// Reads several rows with the remaining TTL of the projected columns.
    pub async fn get_records_by_ids_with_ttl(
        &self,
        keyspace: &str,
        table: &str,
        ids: &[&str],
        fields: Option<&[&str]>,
        ttl: &TtlProjection,
    ) -> DataAccessResult<OperationResponse> {
        self.select(
            "get_records_by_ids_with_ttl",
            keyspace,
            table,
            Criteria::In {
                column: ID_COLUMN.to_string(),
                values: id_values(ids),
            },
            Projection::fields(field_list(fields)).with_ttl(ttl.clone()),
        )
        .await
    }

    /// Reads rows where `property` equals `value`, or is one of `value`
    /// when it is a list.
    pub async fn get_records_by_property(
        &self,
        keyspace: &str,
        table: &str,
        property: &str,
        value: &Value,
    ) -> DataAccessResult<OperationResponse> {
        let mut filter = Filter::new();
        filter.push(property, FilterValue::from_json(property, value)?)?;
        self.select(
            "get_records_by_property",
            keyspace,
            table,
            Criteria::Properties(filter),
            Projection::all(),
        )
        .await
    }

    /// Reads rows matching every entry of `filter` by equality or IN.
    pub async fn get_records_by_properties(
        &self,
        keyspace: &str,
        table: &str,
        filter: &Filter,
        fields: Option<&[&str]>,
    ) -> DataAccessResult<OperationResponse> {
        self.select(
            "get_records_by_properties",
            keyspace,
            table,
            Criteria::Properties(filter.clone()),
            Projection::fields(field_list(fields)),
        )
        .await
    }

    /// Reads rows by key columns; values may be scalars, lists or range
    /// bounds on clustering columns.
    pub async fn get_records(
        &self,
        keyspace: &str,
        table: &str,
        key_filter: &Filter,
        fields: Option<&[&str]>,
    ) -> DataAccessResult<OperationResponse> {
        self.select(
            "get_records",
            keyspace,
            table,
            Criteria::KeyRange(key_filter.clone()),
            Projection::fields(field_list(fields)),
        )
        .await
    }

    /// Reads rows matching a composite key.
    pub async fn get_records_by_composite_key(
        &self,
        keyspace: &str,
        table: &str,
        key: &CompositeKey,
        fields: Option<&[&str]>,
    ) -> DataAccessResult<OperationResponse> {
        self.select(
            "get_records_by_composite_key",
            keyspace,
            table,
            Criteria::Key(RecordKey::Composite(key.clone())),
            Projection::fields(field_list(fields)),
        )
        .await
    }

    /// Reads every row of a partition. String values match by equality,
    /// lists by IN.
    pub async fn get_records_by_composite_partition_key(
        &self,
        keyspace: &str,
        table: &str,
        partition_key: &Record,
    ) -> DataAccessResult<OperationResponse> {
        if partition_key.is_empty() {
            return Err(ValidationError::EmptyCompositeKey.into());
        }
        self.select(
            "get_records_by_composite_partition_key",
            keyspace,
            table,
            Criteria::Properties(Filter::from_map(partition_key)?),
            Projection::all(),
        )
        .await
    }

    /// Reads only `properties` (plus `id`) of the listed rows.
    pub async fn get_properties_value_by_id(
        &self,
        keyspace: &str,
        table: &str,
        ids: &[&str],
        properties: &[&str],
    ) -> DataAccessResult<OperationResponse> {
        if properties.is_empty() {
            return Err(ValidationError::EmptyList { what: "properties" }.into());
        }
        let mut fields: Vec<String> = vec![ID_COLUMN.to_string()];
        fields.extend(
            properties
                .iter()
                .filter(|p| **p != ID_COLUMN)
                .map(|p| p.to_string()),
        );
        self.select(
            "get_properties_value_by_id",
            keyspace,
            table,
            Criteria::In {
                column: ID_COLUMN.to_string(),
                values: id_values(ids),
            },
            Projection::fields(Some(fields)),
        )
        .await
    }

    /// Reads every row of a table.
    pub async fn get_all_records(
        &self,
        keyspace: &str,
        table: &str,
        fields: Option<&[&str]>,
    ) -> DataAccessResult<OperationResponse> {
        self.select(
            "get_all_records",
            keyspace,
            table,
            Criteria::All,
            Projection::fields(field_list(fields)),
        )
        .await
    }

    /// Reads rows whose collection `column` contains `value`.
    pub async fn search_value_in_list(
        &self,
        keyspace: &str,
        table: &str,
        column: &str,
        value: &Value,
    ) -> DataAccessResult<OperationResponse> {
        self.search_value_in_list_filtered(keyspace, table, column, value, &Filter::new())
            .await
    }

    /// Reads rows whose collection `column` contains `value` and which
    /// match every equality entry of `filter`.
    pub async fn search_value_in_list_filtered(
        &self,
        keyspace: &str,
        table: &str,
        column: &str,
        value: &Value,
        filter: &Filter,
    ) -> DataAccessResult<OperationResponse> {
        self.select(
            "search_value_in_list",
            keyspace,
            table,
            Criteria::Contains {
                column: column.to_string(),
                value: value.clone(),
                filter: filter.clone(),
            },
            Projection::all(),
        )
        .await
    }

    // Batches

    /// Inserts every record in one native batch.
    pub async fn batch_insert(
        &self,
        keyspace: &str,
        table: &str,
        records: &[Record],
    ) -> DataAccessResult<OperationResponse> {
        let items = records
            .iter()
            .map(|record| BatchItem::Insert {
                record: record.clone(),
                ttl: Ttl::NONE,
            })
            .collect();
        self.run_column("batch_insert", keyspace, table, &ColumnOperation::Batch { items })
            .await
    }

    /// Inserts every record with its own TTL in one native batch.
    pub async fn batch_insert_with_ttl(
        &self,
        keyspace: &str,
        table: &str,
        records: &[Record],
        ttls: &[i64],
    ) -> DataAccessResult<OperationResponse> {
        if records.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }
        if records.len() != ttls.len() {
            return Err(ValidationError::BatchSizeMismatch {
                records: records.len(),
                ttls: ttls.len(),
            }
            .into());
        }
        let items = records
            .iter()
            .zip(ttls)
            .map(|(record, ttl)| BatchItem::Insert {
                record: record.clone(),
                ttl: Ttl(*ttl),
            })
            .collect();
        self.run_column(
            "batch_insert_with_ttl",
            keyspace,
            table,
            &ColumnOperation::Batch { items },
        )
        .await
    }

    /// Applies `(key, values)` updates in one native batch.
    pub async fn batch_update(
        &self,
        keyspace: &str,
        table: &str,
        entries: &[(CompositeKey, Record)],
    ) -> DataAccessResult<OperationResponse> {
        let items = entries
            .iter()
            .map(|(key, values)| BatchItem::Update {
                key: RecordKey::Composite(key.clone()),
                values: values.clone(),
            })
            .collect();
        self.run_column("batch_update", keyspace, table, &ColumnOperation::Batch { items })
            .await
    }

    /// Updates full records in one native batch, splitting each into key
    /// and values by the table's declared key.
    pub async fn batch_update_by_id(
        &self,
        keyspace: &str,
        table: &str,
        records: &[Record],
    ) -> DataAccessResult<OperationResponse> {
        let schema = self.inner.registry.get(keyspace, table);
        let items = records
            .iter()
            .map(|record| {
                let (key, values) = schema.split(record)?;
                Ok(BatchItem::Update {
                    key: RecordKey::Composite(key),
                    values,
                })
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;
        self.run_column(
            "batch_update_by_id",
            keyspace,
            table,
            &ColumnOperation::Batch { items },
        )
        .await
    }

    /// Applies mixed inserts and updates in one native batch.
    pub async fn perform_batch_action(
        &self,
        keyspace: &str,
        table: &str,
        items: Vec<BatchItem>,
    ) -> DataAccessResult<OperationResponse> {
        self.run_column(
            "perform_batch_action",
            keyspace,
            table,
            &ColumnOperation::Batch { items },
        )
        .await
    }

    // Map columns

    /// Adds or replaces one entry of a map column.
    pub async fn update_add_map_record(
        &self,
        keyspace: &str,
        table: &str,
        key: impl Into<RecordKey>,
        column: &str,
        map_key: &str,
        value: Value,
    ) -> DataAccessResult<OperationResponse> {
        let request = ColumnOperation::PutMapEntry {
            key: key.into(),
            column: column.to_string(),
            map_key: map_key.to_string(),
            value,
        };
        self.run_column("update_add_map_record", keyspace, table, &request).await
    }

    /// Removes one entry of a map column.
    pub async fn update_remove_map_record(
        &self,
        keyspace: &str,
        table: &str,
        key: impl Into<RecordKey>,
        column: &str,
        map_key: &str,
    ) -> DataAccessResult<OperationResponse> {
        let request = ColumnOperation::RemoveMapEntry {
            key: key.into(),
            column: column.to_string(),
            map_key: map_key.to_string(),
        };
        self.run_column("update_remove_map_record", keyspace, table, &request)
            .await
    }

    // Async read

    /// Reads rows matching `filter` on the callback pool and hands the
    /// outcome to `callback`.
    ///
    /// Returns immediately. The callback runs exactly once, on a callback
    /// pool thread, with either the rows or the error, including
    /// validation errors.
    pub fn apply_operation_on_records_async<F>(
        &self,
        keyspace: &str,
        table: &str,
        filter: Filter,
        fields: Option<&[&str]>,
        callback: F,
    ) where
        F: FnOnce(DataAccessResult<OperationResponse>) + Send + 'static,
    {
        let this = self.clone();
        let keyspace = keyspace.to_string();
        let table = table.to_string();
        let fields = field_list(fields);
        self.inner.callbacks.spawn(async move {
            let outcome = this
                .select(
                    "apply_operation_on_records_async",
                    &keyspace,
                    &table,
                    Criteria::Properties(filter),
                    Projection::fields(fields),
                )
                .await;
            callback(outcome);
        });
    }
}
