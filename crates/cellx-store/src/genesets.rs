use std::collections::HashSet;
use std::path::PathBuf;

use cellx_protocol::{GeneSet, GeneSetsDocument};

use crate::export::ExportFile;
use crate::fsutil::{read_optional, save_bytes_atomic};
use crate::names::collection_stem;
use crate::{AnnotationStore, CollectionName, StoreError, UserScope, GENESETS_DIR, OUTPUT_DIR};

const CSV_HEADER: [&str; 4] = [
    "gene_set_name",
    "gene_set_description",
    "gene_symbol",
    "gene_description",
];

/// Validate names, deduplicate genes, and drop genes the dataset does not
/// know (when `known` is given).
fn normalize(
    genesets: Vec<GeneSet>,
    collection: Option<&CollectionName>,
    known: Option<&HashSet<String>>,
) -> Result<Vec<GeneSet>, StoreError> {
    let mut names = HashSet::new();
    let mut out = Vec::with_capacity(genesets.len());
    for mut set in genesets {
        if set.name.trim().is_empty() || set.name.trim() != set.name {
            return Err(StoreError::InvalidGeneSets(format!(
                "gene set name '{}' must be non-empty without surrounding whitespace",
                set.name
            )));
        }
        if !names.insert(set.name.clone()) {
            return Err(StoreError::InvalidGeneSets(format!(
                "duplicate gene set name '{}'",
                set.name
            )));
        }
        let mut seen = HashSet::new();
        let mut dropped = Vec::new();
        set.genes.retain(|gene| {
            if !seen.insert(gene.clone()) {
                return false;
            }
            if known.is_some_and(|k| !k.contains(gene)) {
                dropped.push(gene.clone());
                return false;
            }
            true
        });
        if !dropped.is_empty() {
            tracing::warn!(
                gene_set = %set.name,
                dropped = ?dropped,
                "genes not present in the dataset were removed"
            );
        }
        if set.collection.is_none() {
            set.collection = collection.map(|c| c.to_string());
        }
        out.push(set);
    }
    Ok(out)
}

/// CSV rendering; a set with no genes still produces one row.
pub fn gene_sets_csv(genesets: &[GeneSet]) -> Result<String, StoreError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for set in genesets {
        if set.genes.is_empty() {
            writer.write_record([set.name.as_str(), set.description.as_str(), "", ""])?;
        }
        for gene in &set.genes {
            writer.write_record([set.name.as_str(), set.description.as_str(), gene.as_str(), ""])?;
        }
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| StoreError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| StoreError::Io(std::io::Error::other(e)))
}

impl AnnotationStore {
    fn genesets_path(&self, scope: &UserScope, collection: Option<&CollectionName>) -> PathBuf {
        self.scope_dir(scope)
            .join(GENESETS_DIR)
            .join(format!("{}.json", collection_stem(collection)))
    }

    /// Stored gene sets with their tid; empty with tid 0 when never written.
    pub async fn read_gene_sets(
        &self,
        scope: &UserScope,
        collection: Option<&CollectionName>,
    ) -> Result<GeneSetsDocument, StoreError> {
        match read_optional(&self.genesets_path(scope, collection)).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(GeneSetsDocument::default()),
        }
    }

    /// Replace the gene sets if `tid` is newer than the stored one.
    pub async fn write_gene_sets(
        &self,
        scope: &UserScope,
        collection: Option<&CollectionName>,
        genesets: Vec<GeneSet>,
        tid: u64,
        known_genes: Option<&HashSet<String>>,
    ) -> Result<GeneSetsDocument, StoreError> {
        let genesets = normalize(genesets, collection, known_genes)?;
        let _guard = self.locks().lock(scope).await;
        let current = self.read_gene_sets(scope, collection).await?;
        if tid <= current.tid {
            return Err(StoreError::Obsolete {
                tid,
                current: current.tid,
            });
        }
        let document = GeneSetsDocument { genesets, tid };
        let bytes = serde_json::to_vec_pretty(&document)?;
        save_bytes_atomic(&self.genesets_path(scope, collection), &bytes).await?;
        tracing::debug!(
            user = %scope,
            collection = collection_stem(collection),
            tid,
            sets = document.genesets.len(),
            "gene sets stored"
        );
        Ok(document)
    }

    /// The scope's gene sets as a removable CSV download.
    pub async fn export_gene_sets_csv(
        &self,
        scope: &UserScope,
        collection: Option<&CollectionName>,
    ) -> Result<ExportFile, StoreError> {
        let document = self.read_gene_sets(scope, collection).await?;
        let csv = gene_sets_csv(&document.genesets)?;
        let dir = self.scope_dir(scope).join(OUTPUT_DIR);
        tokio::task::spawn_blocking(move || {
            ExportFile::create(&dir, "gene-sets.csv", |file| {
                use std::io::Write;
                file.write_all(csv.as_bytes())?;
                Ok(())
            })
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }
}
