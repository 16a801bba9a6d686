use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::tree::MarkupTree;
use super::types::DocumentFormat;
use super::MarkupError;

/// Main part of a WordprocessingML package.
pub const MAIN_PART: &str = "word/document.xml";

/// Inputs larger than this are refused before unpacking.
const MAX_PACKAGE_BYTES: usize = 100 * 1024 * 1024; // 100MB

/// Detect the container format from magic bytes (never from a file name).
pub fn detect_format(bytes: &[u8]) -> DocumentFormat {
    match bytes {
        [0x50, 0x4B, 0x03, 0x04, ..] => DocumentFormat::Docx,
        [0x25, 0x50, 0x44, 0x46, ..] => DocumentFormat::Pdf,
        _ => DocumentFormat::Unknown,
    }
}

struct PackageEntry {
    name: String,
    compression: CompressionMethod,
    data: Vec<u8>,
}

/// Unpacked `.docx`: every entry is kept so the package can be rebuilt
/// with only the main part replaced.
pub struct DocxPackage {
    entries: Vec<PackageEntry>,
    main_index: usize,
}

impl DocxPackage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MarkupError> {
        if bytes.len() > MAX_PACKAGE_BYTES {
            return Err(MarkupError::TooLarge(bytes.len()));
        }
        match detect_format(bytes) {
            DocumentFormat::Docx => {}
            other => return Err(MarkupError::UnsupportedFormat(other.as_str().to_string())),
        }

        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            entries.push(PackageEntry {
                name: file.name().to_string(),
                compression: file.compression(),
                data,
            });
        }

        let main_index = entries
            .iter()
            .position(|e| e.name == MAIN_PART)
            .ok_or_else(|| MarkupError::MissingPart(MAIN_PART.to_string()))?;

        Ok(Self { entries, main_index })
    }

    pub fn tree(&self) -> Result<MarkupTree, MarkupError> {
        let xml = String::from_utf8(self.entries[self.main_index].data.clone())
            .map_err(|_| MarkupError::Malformed(format!("{MAIN_PART} is not valid UTF-8")))?;
        Ok(MarkupTree::new(xml))
    }

    /// Rebuild the archive with `tree` as the main part; other entries are copied as-is.
    pub fn to_bytes_with(&self, tree: &MarkupTree) -> Result<Vec<u8>, MarkupError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for (i, entry) in self.entries.iter().enumerate() {
            let method = match entry.compression {
                CompressionMethod::Stored => CompressionMethod::Stored,
                _ => CompressionMethod::Deflated,
            };
            let options = SimpleFileOptions::default().compression_method(method);
            writer.start_file(entry.name.clone(), options)?;
            if i == self.main_index {
                writer.write_all(tree.xml().as_bytes())?;
            } else {
                writer.write_all(&entry.data)?;
            }
        }

        Ok(writer.finish()?.into_inner())
    }
}

/// Document collaborator: turns a raw buffer into a markup tree and back.
pub trait DocumentCodec: Send + Sync {
    fn open(&self, bytes: &[u8]) -> Result<MarkupTree, MarkupError>;

    /// Re-serialise `tree` using `original` as the package template.
    fn save(&self, original: &[u8], tree: &MarkupTree) -> Result<Vec<u8>, MarkupError>;
}

/// Codec for `.docx` packages.
pub struct DocxCodec;

impl DocumentCodec for DocxCodec {
    fn open(&self, bytes: &[u8]) -> Result<MarkupTree, MarkupError> {
        DocxPackage::from_bytes(bytes)?.tree()
    }

    fn save(&self, original: &[u8], tree: &MarkupTree) -> Result<Vec<u8>, MarkupError> {
        DocxPackage::from_bytes(original)?.to_bytes_with(tree)
    }
}

/// Codec over a bare main-part XML buffer (no zip container).
pub struct RawXmlCodec;

impl DocumentCodec for RawXmlCodec {
    fn open(&self, bytes: &[u8]) -> Result<MarkupTree, MarkupError> {
        let xml = std::str::from_utf8(bytes)
            .map_err(|_| MarkupError::Malformed("document is not valid UTF-8".into()))?;
        if !xml.contains("<w:body") {
            return Err(MarkupError::Malformed("no w:body element".into()));
        }
        Ok(MarkupTree::new(xml))
    }

    fn save(&self, _original: &[u8], tree: &MarkupTree) -> Result<Vec<u8>, MarkupError> {
        Ok(tree.xml().as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::fixtures::{body, docx_bytes, para};

    #[test]
    fn detects_formats_from_magic_bytes() {
        assert_eq!(detect_format(b"PK\x03\x04rest"), DocumentFormat::Docx);
        assert_eq!(detect_format(b"%PDF-1.7"), DocumentFormat::Pdf);
        assert_eq!(detect_format(b"hello"), DocumentFormat::Unknown);
        assert_eq!(detect_format(b""), DocumentFormat::Unknown);
    }

    #[test]
    fn opens_main_part_from_package() {
        let xml = body(&[para("Bonjour")]);
        let package = DocxPackage::from_bytes(&docx_bytes(&xml)).unwrap();
        assert_eq!(package.tree().unwrap().xml(), xml);
    }

    #[test]
    fn rebuild_replaces_only_main_part() {
        let xml = body(&[para("Avant")]);
        let original = docx_bytes(&xml);
        let package = DocxPackage::from_bytes(&original).unwrap();

        let updated = MarkupTree::new(body(&[para("Après")]));
        let rebuilt = package.to_bytes_with(&updated).unwrap();

        let reopened = DocxPackage::from_bytes(&rebuilt).unwrap();
        assert_eq!(reopened.tree().unwrap(), updated);
        assert_eq!(reopened.entries.len(), 3);
        assert_eq!(reopened.entries[1].name, "word/styles.xml");
        assert_eq!(reopened.entries[1].data, package.entries[1].data);
    }

    #[test]
    fn pdf_is_rejected_as_unsupported() {
        let result = DocxPackage::from_bytes(b"%PDF-1.4 ...");
        assert!(matches!(result, Err(MarkupError::UnsupportedFormat(f)) if f == "pdf"));
    }

    #[test]
    fn package_without_main_part_is_an_error() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("other.xml", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"<x/>").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        assert!(matches!(
            DocxPackage::from_bytes(&bytes),
            Err(MarkupError::MissingPart(_))
        ));
    }

    #[test]
    fn raw_codec_requires_a_body() {
        assert!(RawXmlCodec.open(b"<w:document/>").is_err());
        let xml = body(&[para("x")]);
        let tree = RawXmlCodec.open(xml.as_bytes()).unwrap();
        assert_eq!(RawXmlCodec.save(&[], &tree).unwrap(), xml.as_bytes());
    }
}
