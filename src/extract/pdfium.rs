//! Pdfium-backed [`PageRenderer`]. The pdfium library is bound dynamically
//! at runtime; the document is reloaded per call so no page resources
//! outlive a single render.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::GrayImage;
use pdfium_render::prelude::{PdfBitmapFormat, PdfRenderConfig, Pdfium};

use super::PageRenderer;

pub struct PdfiumRenderer {
    pdfium: Pdfium,
    path: PathBuf,
}

impl PdfiumRenderer {
    /// Binds pdfium and verifies the document opens. A file that cannot be
    /// opened here will surface as an unreadable document to the extractor.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let pdfium = bind_pdfium()?;
        pdfium
            .load_pdf_from_file(&path, None)
            .map_err(|err| anyhow!("failed to open {}: {err}", path.display()))?;
        Ok(Self { pdfium, path })
    }
}

impl PageRenderer for PdfiumRenderer {
    fn page_count(&self) -> Result<usize> {
        let document = self
            .pdfium
            .load_pdf_from_file(&self.path, None)
            .map_err(|err| anyhow!("failed to open {}: {err}", self.path.display()))?;
        Ok(document.pages().len() as usize)
    }

    fn render_page(&self, index: usize, scale: u32) -> Result<GrayImage> {
        let document = self
            .pdfium
            .load_pdf_from_file(&self.path, None)
            .map_err(|err| anyhow!("failed to open {}: {err}", self.path.display()))?;

        let page_index = u16::try_from(index).map_err(|_| anyhow!("page index out of range"))?;
        let page = document
            .pages()
            .get(page_index)
            .map_err(|err| anyhow!("failed to open page {index}: {err}"))?;

        let width = (page.width().value * scale as f32).round() as i32;
        let height = (page.height().value * scale as f32).round() as i32;

        let render_config = PdfRenderConfig::new()
            .set_target_width(width.max(1))
            .set_maximum_width(width.max(1))
            .set_maximum_height(height.max(1))
            .render_form_data(false)
            .render_annotations(false)
            .set_format(PdfBitmapFormat::BGRA);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|err| anyhow!("failed to render page {index}: {err}"))?;

        let width = bitmap.width().max(0) as usize;
        let height = bitmap.height().max(0) as usize;
        let bytes = bitmap.as_raw_bytes();

        bgra_to_luma(&bytes, width, height)
            .with_context(|| format!("unexpected bitmap layout on page {index}"))
    }
}

/// Collapses a BGRA buffer to 8-bit luminance using BT.601 weights.
fn bgra_to_luma(bytes: &[u8], width: usize, height: usize) -> Result<GrayImage> {
    let stride = if height == 0 { 0 } else { bytes.len() / height };
    let mut luma = Vec::with_capacity(width.saturating_mul(height));
    for y in 0..height {
        let base = y.saturating_mul(stride);
        for x in 0..width {
            let idx = base.saturating_add(x.saturating_mul(4));
            let b = bytes.get(idx).copied().unwrap_or(255) as u32;
            let g = bytes.get(idx + 1).copied().unwrap_or(255) as u32;
            let r = bytes.get(idx + 2).copied().unwrap_or(255) as u32;
            luma.push(((299 * r + 587 * g + 114 * b) / 1000) as u8);
        }
    }

    GrayImage::from_raw(width as u32, height as u32, luma)
        .ok_or_else(|| anyhow!("luminance buffer size mismatch"))
}

fn bind_pdfium() -> Result<Pdfium> {
    let mut candidates = Vec::new();

    if let Ok(dir) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        candidates.push(Pdfium::pdfium_platform_library_name_at_path(Path::new(&dir)));
    }
    candidates.push(Pdfium::pdfium_platform_library_name_at_path(Path::new(".")));

    for candidate in &candidates {
        if let Ok(bindings) = Pdfium::bind_to_library(candidate) {
            return Ok(Pdfium::new(bindings));
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|err| anyhow!("failed to bind pdfium library: {err}"))
}
