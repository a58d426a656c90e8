use std::collections::HashSet;
use std::path::PathBuf;

use arrow::array::RecordBatch;
use cellx_protocol::Axis;

use crate::export::ExportFile;
use crate::fsutil::{read_optional, save_bytes_atomic};
use crate::{AnnotationStore, StoreError, UserScope, LABELS_FILE, OUTPUT_DIR};

/// Identity column appended by the schema; users cannot define it.
pub const RESERVED_LABEL: &str = "name_0";

/// Checks an incoming label table. Empty tables (no rows or no columns) are
/// accepted as-is.
pub fn validate_labels(table: &RecordBatch, n_obs: usize) -> Result<(), StoreError> {
    if table.num_rows() == 0 || table.num_columns() == 0 {
        return Ok(());
    }
    if table.num_rows() != n_obs {
        return Err(StoreError::InvalidLabels(format!(
            "expected {n_obs} rows, got {}",
            table.num_rows()
        )));
    }
    let schema = table.schema();
    let mut seen = HashSet::new();
    for field in schema.fields() {
        let name = field.name();
        if name.trim().is_empty() {
            return Err(StoreError::InvalidLabels("empty column name".into()));
        }
        if name == RESERVED_LABEL {
            return Err(StoreError::InvalidLabels(format!(
                "'{RESERVED_LABEL}' is reserved"
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(StoreError::InvalidLabels(format!("duplicate column '{name}'")));
        }
        if !cellx_codec::is_supported(field.data_type()) {
            return Err(StoreError::InvalidLabels(format!(
                "column '{name}' has unsupported type {}",
                field.data_type()
            )));
        }
    }
    Ok(())
}

impl AnnotationStore {
    fn labels_path(&self, scope: &UserScope) -> PathBuf {
        self.scope_dir(scope).join(LABELS_FILE)
    }

    /// The stored obs labels, or `None` when the user never wrote any.
    pub async fn read_labels(&self, scope: &UserScope) -> Result<Option<RecordBatch>, StoreError> {
        let Some(bytes) = read_optional(&self.labels_path(scope)).await? else {
            return Ok(None);
        };
        Ok(Some(cellx_codec::decode(&bytes)?.table))
    }

    /// Replace the stored obs labels after validating them against the
    /// dataset's observation count.
    pub async fn write_labels(
        &self,
        scope: &UserScope,
        table: &RecordBatch,
        n_obs: usize,
    ) -> Result<(), StoreError> {
        validate_labels(table, n_obs)?;
        let bytes = cellx_codec::encode(table, Axis::Obs)?;
        let _guard = self.locks().lock(scope).await;
        save_bytes_atomic(&self.labels_path(scope), &bytes).await?;
        tracing::debug!(
            user = %scope,
            columns = table.num_columns(),
            rows = table.num_rows(),
            "labels stored"
        );
        Ok(())
    }

    /// Write `table` as CSV with a leading `index` column into the scope's
    /// output area. The file is removed when the returned handle drops.
    pub async fn export_labels_csv(
        &self,
        scope: &UserScope,
        index: Vec<String>,
        table: RecordBatch,
    ) -> Result<ExportFile, StoreError> {
        let dir = self.scope_dir(scope).join(OUTPUT_DIR);
        let download = format!("{scope}_obs.csv");
        tokio::task::spawn_blocking(move || {
            ExportFile::create(&dir, &download, |file| {
                crate::export::write_table_csv(file, &index, &table)
            })
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }
}
