use std::fs::File;
use std::io::Write;
use std::path::Path;

use arrow::array::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use tempfile::TempPath;

use crate::StoreError;

/// A transient download. The backing file lives in the scope's output area
/// and is removed when the handle is closed or dropped, on every exit path.
#[derive(Debug)]
pub struct ExportFile {
    path: TempPath,
    file_name: String,
}

impl ExportFile {
    pub(crate) fn create<F>(dir: &Path, file_name: &str, write: F) -> Result<Self, StoreError>
    where
        F: FnOnce(&mut File) -> Result<(), StoreError>,
    {
        std::fs::create_dir_all(dir)?;
        let stem = file_name.strip_suffix(".csv").unwrap_or(file_name);
        let mut named = tempfile::Builder::new()
            .prefix(&format!("{stem}."))
            .suffix(".csv")
            .tempfile_in(dir)?;
        write(named.as_file_mut())?;
        named.as_file_mut().flush()?;
        Ok(Self {
            path: named.into_temp_path(),
            file_name: file_name.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name offered to the client in `Content-Disposition`.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub async fn read(&self) -> Result<Vec<u8>, StoreError> {
        Ok(tokio::fs::read(&*self.path).await?)
    }

    /// Remove now, logging instead of failing.
    pub fn close(self) {
        let shown = self.path.display().to_string();
        if let Err(err) = self.path.close() {
            tracing::warn!(path = %shown, error = %err, "failed to remove export file");
        }
    }
}

pub(crate) fn write_table_csv(
    file: &mut File,
    index: &[String],
    table: &RecordBatch,
) -> Result<(), StoreError> {
    let mut writer = csv::Writer::from_writer(file);
    let schema = table.schema();
    let mut header = vec!["index".to_string()];
    header.extend(schema.fields().iter().map(|f| f.name().clone()));
    writer.write_record(&header)?;

    let options = FormatOptions::default().with_null("");
    let formatters = table
        .columns()
        .iter()
        .map(|c| ArrayFormatter::try_new(c.as_ref(), &options))
        .collect::<Result<Vec<_>, _>>()
        .map_err(cellx_codec::CodecError::from)?;
    for row in 0..table.num_rows() {
        let mut record = Vec::with_capacity(formatters.len() + 1);
        record.push(index.get(row).cloned().unwrap_or_else(|| row.to_string()));
        record.extend(formatters.iter().map(|f| f.value(row).to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}
