//! Vector index regeneration.
//!
//! Stored vectors carry the model name and dimensionality they were
//! produced with. A reindex first drops every vector that does not match
//! the configured model, then embeds only the rows with no vector. The
//! pass is resumable: an interrupted run leaves finished vectors in place
//! and the next run picks up the remainder.

use tracing::{info, warn};

use crate::embedding::{vec_to_blob, Embedder};
use crate::error::Result;
use crate::store::Store;

const BATCH_SIZE: usize = 32;

#[derive(Debug, Default, Clone)]
pub struct ReindexStats {
    /// Vectors dropped for model or dimension mismatch.
    pub deleted: u64,
    pub embedded: u64,
    pub failed: u64,
}

pub async fn reindex(store: &Store, embedder: &dyn Embedder) -> Result<ReindexStats> {
    let mut stats = ReindexStats::default();

    stats.deleted = store
        .delete_stale_vectors(embedder.model_name(), embedder.dims())
        .await?;
    if stats.deleted > 0 {
        info!("dropped {} vector(s) from a different model", stats.deleted);
    }

    let missing = store.content_missing_vectors().await?;
    if missing.is_empty() {
        return Ok(stats);
    }
    info!("embedding {} content item(s)", missing.len());

    for chunk in missing.chunks(BATCH_SIZE) {
        let texts: Vec<String> = chunk.iter().map(|(_, body)| body.clone()).collect();

        match embedder.embed_batch(&texts).await {
            Ok(vectors) => {
                for ((id, _), vector) in chunk.iter().zip(vectors.iter()) {
                    store
                        .upsert_vector(
                            id,
                            &vec_to_blob(vector),
                            embedder.model_name(),
                            embedder.dims(),
                        )
                        .await?;
                    stats.embedded += 1;
                }
            }
            Err(err) => {
                warn!("batch embedding failed, skipping {} item(s): {}", chunk.len(), err);
                stats.failed += chunk.len() as u64;
            }
        }
    }

    Ok(stats)
}
