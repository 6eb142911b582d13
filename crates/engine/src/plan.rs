use std::path::Path;

use porter_core::EngineConfig;

use crate::EngineError;

/// How a source should travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStrategy {
    /// Stream the source as-is.
    Direct,
    /// Bundle the folder into one STORE-mode archive first.
    ZipFirst,
}

/// Outcome of inspecting a source.
#[derive(Debug, Clone, Copy)]
pub struct TransferPlan {
    pub strategy: TransferStrategy,
    pub file_count: u64,
    pub total_bytes: u64,
}

impl TransferPlan {
    pub fn avg_file_bytes(&self) -> Option<u64> {
        if self.file_count == 0 {
            None
        } else {
            Some(self.total_bytes / self.file_count)
        }
    }
}

/// Decides between DIRECT and ZIP_FIRST for a source.
///
/// Single files always go direct. A folder is packaged only when it has
/// more than `zip_threshold_files` files averaging under
/// `zip_threshold_avg_bytes` each: many small files pay per-file overhead
/// on every open and metadata round-trip, which bundling amortizes, while
/// large files gain nothing from a container.
pub fn plan(source: &Path, config: &EngineConfig) -> Result<TransferPlan, EngineError> {
    if source.is_file() {
        let size = std::fs::metadata(source)
            .map_err(porter_transfer::TransferError::from)?
            .len();
        return Ok(TransferPlan {
            strategy: TransferStrategy::Direct,
            file_count: 1,
            total_bytes: size,
        });
    }

    let stats = porter_archive::scan_visible(source)?;
    let file_count = stats.file_count();
    let total_bytes = stats.total_bytes;

    let strategy = match stats.avg_file_bytes() {
        Some(avg)
            if file_count > config.zip_threshold_files
                && avg < config.zip_threshold_avg_bytes =>
        {
            TransferStrategy::ZipFirst
        }
        _ => TransferStrategy::Direct,
    };

    tracing::debug!(
        source = %source.display(),
        ?strategy,
        file_count,
        total_bytes,
        "transfer planned"
    );

    Ok(TransferPlan {
        strategy,
        file_count,
        total_bytes,
    })
}
