use crate::core::io::Storage;
use crate::core::state::{Page, SessionSnapshot};
use crate::utils::pdf;
use anyhow::{bail, Context, Result};
use image::RgbImage;
use log::{info, warn};
use std::path::Path;

pub const EXPORT_FILE_NAME: &str = "The-OOMF-Origin.pdf";

fn decode_page(page: &Page) -> Result<RgbImage> {
    let image = page
        .image
        .as_ref()
        .with_context(|| format!("Page {} has no image", page.page_index))?;
    let bytes = image.decode()?;
    let decoded = image::load_from_memory(&bytes)
        .with_context(|| format!("Page {} image could not be decoded", page.page_index))?;
    Ok(decoded.to_rgb8())
}

/// Decoded images of every displayable page, in page order. Failed or
/// unfinished pages are left out.
pub fn collect_pages(snapshot: &SessionSnapshot) -> Vec<RgbImage> {
    let mut pages: Vec<&Page> = snapshot.pages.iter().filter(|p| p.is_displayable()).collect();
    pages.sort_by_key(|p| p.page_index);

    pages
        .into_iter()
        .filter_map(|page| match decode_page(page) {
            Ok(img) => Some(img),
            Err(e) => {
                warn!("Skipping page {} in export: {:#}", page.page_index, e);
                None
            }
        })
        .collect()
}

/// Writes the book to `<output_folder>/The-OOMF-Origin.pdf` and returns the path.
pub async fn export_book(
    storage: &dyn Storage,
    snapshot: &SessionSnapshot,
    output_folder: &str,
) -> Result<String> {
    let pages = collect_pages(snapshot);
    if pages.is_empty() {
        bail!("No finished pages to export yet");
    }
    let bytes = pdf::write_pdf(&pages)?;

    let path = Path::new(output_folder).join(EXPORT_FILE_NAME);
    let path = path.to_string_lossy().to_string();
    storage.write(&path, &bytes).await?;
    info!("Exported {} pages to {}", pages.len(), path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::NativeStorage;
    use crate::core::state::{ImagePayload, PageStatus};
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use std::io::Cursor;

    fn png_payload() -> ImagePayload {
        let img = RgbImage::from_pixel(4, 6, image::Rgb([30, 60, 90]));
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        ImagePayload {
            mime_type: "image/png".to_string(),
            data: BASE64.encode(bytes.into_inner()),
        }
    }

    fn page(index: u32, status: PageStatus) -> Page {
        let mut page = Page::placeholder(index, 11, false);
        page.status = status;
        if status == PageStatus::Ready {
            page.image = Some(png_payload());
        }
        page
    }

    #[tokio::test]
    async fn test_export_includes_covers_and_skips_failed_pages() -> Result<()> {
        let snapshot = SessionSnapshot {
            pages: vec![
                page(0, PageStatus::Ready),
                page(1, PageStatus::Ready),
                page(2, PageStatus::Failed),
                page(3, PageStatus::Ready),
                page(4, PageStatus::GeneratingImage),
                page(11, PageStatus::Ready),
            ],
            ..Default::default()
        };

        let dir = tempfile::tempdir()?;
        let folder = dir.path().to_string_lossy().to_string();
        let path = export_book(&NativeStorage::new(), &snapshot, &folder).await?;

        assert!(path.ends_with(EXPORT_FILE_NAME));
        let bytes = std::fs::read(&path)?;
        assert_eq!(pdf::page_count(&bytes), 4);
        Ok(())
    }

    #[test]
    fn test_undecodable_page_is_skipped() {
        let mut broken = page(1, PageStatus::Ready);
        broken.image = Some(ImagePayload {
            mime_type: "image/png".to_string(),
            data: BASE64.encode(b"not a png"),
        });
        let snapshot = SessionSnapshot {
            pages: vec![page(0, PageStatus::Ready), broken],
            ..Default::default()
        };
        assert_eq!(collect_pages(&snapshot).len(), 1);
    }

    #[tokio::test]
    async fn test_export_with_nothing_ready_fails() {
        let snapshot = SessionSnapshot {
            pages: vec![page(1, PageStatus::Failed)],
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().to_string_lossy().to_string();
        assert!(export_book(&NativeStorage::new(), &snapshot, &folder).await.is_err());
    }
}
