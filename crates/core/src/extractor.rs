use crate::error::{DocumentError, IngestError};
use crate::ocr::OcrEngine;
use crate::pdf_images::image_data;
use crate::text::{normalize_whitespace, push_line};
use lopdf::{Document, Object, ObjectId};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct PageContent {
    pub number: u32,
    pub text: String,
    pub images: Vec<EmbeddedImage>,
}

#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    pub page: u32,
    pub object_id: ObjectId,
    pub data: ImageData,
}

/// Image payload as it can be handed to an OCR engine.
#[derive(Debug, Clone)]
pub enum ImageData {
    Jpeg(Vec<u8>),
    Jpeg2000(Vec<u8>),
    /// CCITT fax data in a TIFF container.
    Tiff(Vec<u8>),
    /// Decoded 8-bit samples, `channels` per pixel, row-major.
    Pixels {
        width: u32,
        height: u32,
        channels: u8,
        samples: Vec<u8>,
    },
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrFailure {
    pub page: u32,
    pub object_id: ObjectId,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub path: PathBuf,
    pub text: String,
    pub page_count: usize,
    pub images_seen: usize,
    pub ocr_failures: Vec<OcrFailure>,
}

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageContent>, IngestError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageContent>, IngestError> {
        let document = Document::load(path)?;

        let mut pages = Vec::new();
        for (page_no, page_id) in document.get_pages() {
            let text = document.extract_text(&[page_no])?;

            let images = match document.get_page_images(page_id) {
                Ok(images) => images
                    .iter()
                    .map(|image| EmbeddedImage {
                        page: page_no,
                        object_id: image.id,
                        data: match document
                            .get_object(image.id)
                            .and_then(Object::as_stream)
                        {
                            Ok(stream) => image_data(&document, stream),
                            Err(error) => {
                                ImageData::Unsupported(format!("image stream: {error}"))
                            }
                        },
                    })
                    .collect(),
                Err(error) => {
                    warn!(
                        path = %path.display(),
                        page = page_no,
                        %error,
                        "could not list page images"
                    );
                    Vec::new()
                }
            };

            pages.push(PageContent {
                number: page_no,
                text,
                images,
            });
        }

        Ok(pages)
    }
}

/// Reads page text in page order and appends OCR'd text of every embedded image.
///
/// A failing image is recorded in [`ExtractedDocument::ocr_failures`] and does not
/// stop extraction. With `ocr` set to `None`, images are counted but not read.
pub fn extract_document(
    path: &Path,
    extractor: &dyn PdfExtractor,
    ocr: Option<&dyn OcrEngine>,
) -> Result<ExtractedDocument, DocumentError> {
    if !path.is_file() {
        return Err(DocumentError::NotFound(path.to_path_buf()));
    }

    let pages = extractor.extract_pages(path)?;

    let mut text = String::new();
    let mut images_seen = 0;
    let mut ocr_failures = Vec::new();

    for page in &pages {
        push_line(&mut text, &page.text);

        for image in &page.images {
            images_seen += 1;
            let Some(engine) = ocr else {
                continue;
            };

            match engine.recognize(image) {
                Ok(recognized) => push_line(&mut text, &normalize_whitespace(&recognized)),
                Err(error) => {
                    warn!(
                        path = %path.display(),
                        page = image.page,
                        object = ?image.object_id,
                        %error,
                        "could not OCR image"
                    );
                    ocr_failures.push(OcrFailure {
                        page: image.page,
                        object_id: image.object_id,
                        reason: error.to_string(),
                    });
                }
            }
        }
    }

    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(DocumentError::EmptyContent(path.to_path_buf()));
    }

    debug!(
        path = %path.display(),
        pages = pages.len(),
        images = images_seen,
        chars = text.len(),
        "document extracted"
    );

    Ok(ExtractedDocument {
        path: path.to_path_buf(),
        text,
        page_count: pages.len(),
        images_seen,
        ocr_failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    struct FixedPages(Vec<PageContent>);

    impl PdfExtractor for FixedPages {
        fn extract_pages(&self, _path: &Path) -> Result<Vec<PageContent>, IngestError> {
            Ok(self.0.clone())
        }
    }

    struct JpegOnlyOcr;

    impl OcrEngine for JpegOnlyOcr {
        fn name(&self) -> &str {
            "jpeg-only"
        }

        fn recognize(&self, image: &EmbeddedImage) -> Result<String, IngestError> {
            match &image.data {
                ImageData::Jpeg(bytes) => Ok(String::from_utf8_lossy(bytes).to_string()),
                _ => Err(IngestError::OcrFailed("cannot read".to_string())),
            }
        }
    }

    fn image(page: u32, generation: u32, data: ImageData) -> EmbeddedImage {
        EmbeddedImage {
            page,
            object_id: (generation, 0),
            data,
        }
    }

    #[test]
    fn missing_file_is_reported_as_not_found() {
        let extractor = FixedPages(Vec::new());
        let result = extract_document(Path::new("/definitely/not/here.pdf"), &extractor, None);
        assert!(matches!(result, Err(DocumentError::NotFound(_))));
    }

    #[test]
    fn page_text_and_ocr_text_are_concatenated_in_order() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("circular.pdf");
        fs::write(&path, b"%PDF-1.4")?;

        let extractor = FixedPages(vec![
            PageContent {
                number: 1,
                text: "  Page one  \n".to_string(),
                images: vec![
                    image(1, 10, ImageData::Jpeg(b"stamped   \n seal".to_vec())),
                    image(1, 11, ImageData::Unsupported("color space None".to_string())),
                ],
            },
            PageContent {
                number: 2,
                text: "Page two".to_string(),
                images: Vec::new(),
            },
        ]);

        let extracted = extract_document(&path, &extractor, Some(&JpegOnlyOcr))?;

        assert_eq!(extracted.text, "Page one\nstamped seal\nPage two");
        assert_eq!(extracted.images_seen, 2);
        assert_eq!(extracted.ocr_failures.len(), 1);
        assert_eq!(extracted.ocr_failures[0].object_id, (11, 0));
        Ok(())
    }

    #[test]
    fn document_without_text_is_empty_content() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("blank.pdf");
        fs::write(&path, b"%PDF-1.4")?;

        let extractor = FixedPages(vec![PageContent {
            number: 1,
            text: "   \n".to_string(),
            images: vec![image(1, 4, ImageData::Jpeg(b"   ".to_vec()))],
        }]);

        let result = extract_document(&path, &extractor, Some(&JpegOnlyOcr));
        assert!(matches!(result, Err(DocumentError::EmptyContent(_))));
        Ok(())
    }

    #[test]
    fn images_are_skipped_when_ocr_is_off() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("scan.pdf");
        fs::write(&path, b"%PDF-1.4")?;

        let extractor = FixedPages(vec![PageContent {
            number: 1,
            text: "Body".to_string(),
            images: vec![image(1, 4, ImageData::Jpeg(b"hidden".to_vec()))],
        }]);

        let extracted = extract_document(&path, &extractor, None)?;
        assert_eq!(extracted.text, "Body");
        assert_eq!(extracted.images_seen, 1);
        assert!(extracted.ocr_failures.is_empty());
        Ok(())
    }

    #[test]
    fn unreadable_pdf_is_an_extraction_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = extract_document(&path, &LopdfExtractor, None);
        assert!(matches!(result, Err(DocumentError::Extraction(_))));
        Ok(())
    }
}
