//! Expected-code extraction from a paginated guide document.
//!
//! Pages are rendered one at a time to a luminance raster and handed to a
//! barcode decoder; decoded payloads are normalized and deduplicated into
//! the session's expected-code list. Rendering and symbol decoding are
//! collaborator traits so the document format and decoder library stay
//! outside the core.

use anyhow::Result;
use image::GrayImage;
use log::{debug, warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::normalize::normalize;

#[cfg(feature = "pdfium")]
mod pdfium;

#[cfg(feature = "pdfium")]
pub use pdfium::PdfiumRenderer;

/// Renders document pages to luminance rasters. One raster is alive at a
/// time; implementations must not require holding all pages in memory.
pub trait PageRenderer {
    fn page_count(&self) -> Result<usize>;

    /// Renders the page at `index` at `scale`× its native resolution.
    fn render_page(&self, index: usize, scale: u32) -> Result<GrayImage>;
}

/// External symbol decoder: luminance buffer in, text or not-found out.
pub trait BarcodeDecoder {
    fn decode(&self, raster: &GrayImage) -> Result<DecodeOutcome>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Text(String),
    /// No symbol on the page. Expected and non-fatal; not every page
    /// carries a code.
    NotFound,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    /// The document itself could not be opened or paged. Nothing partial is
    /// returned; the user retries with another file.
    #[error("document unreadable: {0}")]
    DocumentUnreadable(String),

    /// The caller abandoned extraction. No partial result is exposed.
    #[error("extraction cancelled")]
    Cancelled,
}

/// Extracts the deduplicated expected-code list from `renderer`'s document,
/// running render and decode on the blocking pool.
pub async fn extract_codes<R, D>(
    renderer: R,
    decoder: D,
    scale: u32,
    cancel: CancellationToken,
) -> Result<Vec<String>, ExtractError>
where
    R: PageRenderer + Send + 'static,
    D: BarcodeDecoder + Send + 'static,
{
    tokio::task::spawn_blocking(move || extract_codes_blocking(&renderer, &decoder, scale, &cancel))
        .await
        .map_err(|err| ExtractError::DocumentUnreadable(format!("extraction worker failed: {err}")))?
}

/// Synchronous extraction core. Pages are processed in ascending index
/// order; a failing page is skipped, a failing document aborts the run.
pub fn extract_codes_blocking(
    renderer: &impl PageRenderer,
    decoder: &impl BarcodeDecoder,
    scale: u32,
    cancel: &CancellationToken,
) -> Result<Vec<String>, ExtractError> {
    let scale = scale.max(1);
    let page_count = renderer
        .page_count()
        .map_err(|err| ExtractError::DocumentUnreadable(err.to_string()))?;
    if page_count == 0 {
        return Err(ExtractError::DocumentUnreadable(
            "document has no pages".to_string(),
        ));
    }

    let mut codes: Vec<String> = Vec::new();
    for page_index in 0..page_count {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }

        // The raster drops at the end of this iteration, before the next
        // page renders.
        let raster = match renderer.render_page(page_index, scale) {
            Ok(raster) => raster,
            Err(err) => {
                warn!("failed to render page {page_index}: {err:#}");
                continue;
            }
        };

        match decoder.decode(&raster) {
            Ok(DecodeOutcome::Text(raw)) => {
                let code = normalize(&raw);
                if !code.is_empty() && !codes.contains(&code) {
                    codes.push(code);
                }
            }
            Ok(DecodeOutcome::NotFound) => {
                debug!("no code on page {page_index}");
            }
            Err(err) => {
                warn!("failed to decode page {page_index}: {err:#}");
            }
        }
    }

    debug!("extracted {} unique codes from {page_count} pages", codes.len());
    Ok(codes)
}
