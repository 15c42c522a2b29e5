//! Reading and writing ODT packages.
//!
//! An ODT file is a ZIP archive. The output package keeps only the files
//! needed for the document to stay valid (`mimetype`, `content.xml`,
//! `styles.xml`, the manifest and `Pictures/`), plus the images added while
//! filling; the manifest is regenerated to list exactly the written files.

use std::io::{Cursor, Read, Write};

use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::eval::Evaluator;
use crate::tree::{Document, NodeId};
use crate::value::Image;
use crate::{fill, xml, Error, Result, Value};

pub(crate) const ODT_MIMETYPE: &str = "application/vnd.oasis.opendocument.text";

fn keep_file(name: &str) -> bool {
    matches!(
        name,
        "content.xml" | "styles.xml" | "mimetype" | "META-INF/manifest.xml"
    ) || name.starts_with("Pictures/")
}

/// A file listed by `META-INF/manifest.xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ManifestEntry {
    pub full_path: String,
    pub media_type: String,
    pub version: Option<String>,
}

/// The parsed package manifest.
///
/// The `/` entry carrying the package media type and version is kept apart
/// from the file entries and regenerated on serialization.
#[derive(Debug, Clone)]
pub(crate) struct Manifest {
    pub media_type: String,
    pub version: String,
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn parse(xml_text: &str) -> Result<Self> {
        let doc = xml::parse(xml_text)?;
        let root = doc.root();

        let manifest_el = doc
            .elements_by_name(root, "manifest:manifest")
            .first()
            .copied()
            .ok_or_else(|| Error::manifest("missing manifest:manifest element"))?;
        let version = attr(&doc, manifest_el, "manifest:version").ok_or_else(|| {
            Error::manifest("missing version attribute in manifest:manifest element")
        })?;

        let mut media_type = None;
        let mut entries = Vec::new();

        for entry_el in doc.elements_by_name(manifest_el, "manifest:file-entry") {
            let full_path = attr(&doc, entry_el, "manifest:full-path").ok_or_else(|| {
                Error::manifest("missing manifest:full-path attribute in manifest entry")
            })?;
            let entry_media_type =
                attr(&doc, entry_el, "manifest:media-type").ok_or_else(|| {
                    Error::manifest(format!(
                        "missing manifest:media-type attribute in manifest entry for '{full_path}'"
                    ))
                })?;

            if full_path == "/" {
                media_type = Some(entry_media_type);
            } else {
                entries.push(ManifestEntry {
                    full_path,
                    media_type: entry_media_type,
                    version: attr(&doc, entry_el, "manifest:version"),
                });
            }
        }

        Ok(Self {
            media_type: media_type
                .ok_or_else(|| Error::manifest("manifest has no '/' root entry"))?,
            version,
            entries,
        })
    }

    /// Adds an entry, replacing any existing entry with the same path.
    pub fn push(&mut self, entry: ManifestEntry) {
        self.entries.retain(|e| e.full_path != entry.full_path);
        self.entries.push(entry);
    }

    /// Drops the entries whose path does not satisfy `keep`.
    pub fn retain_entries(&mut self, keep: impl Fn(&str) -> bool) {
        self.entries.retain(|e| keep(&e.full_path));
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str(&format!(
            "<manifest:manifest xmlns:manifest=\"urn:oasis:names:tc:opendocument:xmlns:manifest:1.0\" manifest:version=\"{}\">\n",
            self.version
        ));
        out.push_str(&format!(
            "   <manifest:file-entry manifest:full-path=\"/\" manifest:version=\"{}\" manifest:media-type=\"{}\"/>\n",
            self.version, self.media_type
        ));
        for entry in &self.entries {
            out.push_str(&format!(
                "   <manifest:file-entry manifest:full-path=\"{}\" manifest:media-type=\"{}\"/>\n",
                entry.full_path, entry.media_type
            ));
        }
        out.push_str("</manifest:manifest>");
        out
    }
}

fn attr(doc: &Document, node: NodeId, name: &str) -> Option<String> {
    doc.element(node)?
        .attrs
        .iter()
        .find(|a| a.name == name)
        .map(|a| a.value.clone())
}

/// An image written into the output package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NewImage {
    pub full_path: String,
    pub media_type: String,
    pub content: Vec<u8>,
}

/// Collects the images referenced while filling, for inclusion in the
/// output package and its manifest.
#[derive(Debug, Default)]
pub(crate) struct Attachments {
    images: Vec<NewImage>,
}

impl Attachments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an image and returns the path it will have inside the
    /// package. The same image added twice is stored once; distinct images
    /// with the same name get disambiguated paths.
    pub fn add(&mut self, image: &Image) -> String {
        let full_path = format!("Pictures/{}", image.name);
        if let Some(existing) = self
            .images
            .iter()
            .find(|i| i.full_path == full_path && i.content == image.content)
        {
            return existing.full_path.clone();
        }
        let full_path = if self.images.iter().any(|i| i.full_path == full_path) {
            format!("Pictures/{}-{}", self.images.len(), image.name)
        } else {
            full_path
        };
        self.images.push(NewImage {
            full_path: full_path.clone(),
            media_type: image.media_type.clone(),
            content: image.content.clone(),
        });
        full_path
    }

    pub fn images(&self) -> &[NewImage] {
        &self.images
    }
}

/// Fills an ODT template with the given data and returns the new ODT file.
pub(crate) fn fill_template<E: Evaluator>(
    template: &[u8],
    data: &Value,
    evaluator: &E,
) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(template))?;

    let content_xml = read_entry(&mut archive, "content.xml")
        .map_err(|_| Error::archive("no content.xml found in the ODT file"))?;
    let manifest_xml = read_entry(&mut archive, "META-INF/manifest.xml")
        .map_err(|_| Error::manifest("'META-INF/manifest.xml' zip entry missing"))?;
    let mut manifest = Manifest::parse(&manifest_xml)?;

    let mut doc = xml::parse(&content_xml)?;
    let mut attachments = Attachments::new();
    fill::fill_document(&mut doc, data, evaluator, &mut attachments)?;
    let new_content = xml::serialize(&doc)?;

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    // the mimetype entry must come first and be stored uncompressed so
    // that consumers can sniff the package type
    writer.start_file("mimetype", stored)?;
    writer.write_all(ODT_MIMETYPE.as_bytes())?;

    writer.start_file("content.xml", deflated)?;
    writer.write_all(&new_content)?;

    let mut written = vec![String::from("mimetype"), String::from("content.xml")];

    for i in 0..archive.len() {
        let name = {
            let entry = archive.by_index(i)?;
            entry.name().to_owned()
        };
        if !keep_file(&name)
            || matches!(name.as_str(), "mimetype" | "content.xml" | "META-INF/manifest.xml")
        {
            continue;
        }
        let mut content = Vec::new();
        archive.by_index(i)?.read_to_end(&mut content)?;
        writer.start_file(name.as_str(), deflated)?;
        writer.write_all(&content)?;
        written.push(name);
    }

    for image in attachments.images() {
        writer.start_file(image.full_path.as_str(), deflated)?;
        writer.write_all(&image.content)?;
        manifest.push(ManifestEntry {
            full_path: image.full_path.clone(),
            media_type: image.media_type.clone(),
            version: None,
        });
        written.push(image.full_path.clone());
    }

    manifest.retain_entries(|path| written.iter().any(|w| w == path));

    writer.start_file("META-INF/manifest.xml", deflated)?;
    writer.write_all(manifest.to_xml().as_bytes())?;

    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}

fn read_entry(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<String> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => {
            return Err(Error::archive(format!("'{name}' zip entry missing")));
        }
        Err(err) => return Err(err.into()),
    };
    let mut text = String::new();
    entry.read_to_string(&mut text)?;
    Ok(text)
}

/// Extracts the plain text of an ODT file, one line per paragraph or
/// heading, list items prefixed with `- `.
pub(crate) fn text_content(odt: &[u8]) -> Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(odt))?;
    let content_xml = read_entry(&mut archive, "content.xml")
        .map_err(|_| Error::archive("no content.xml found in the ODT file"))?;
    let doc = xml::parse(&content_xml)?;
    let root = doc.root();

    let body = doc
        .elements_by_name(root, "office:body")
        .first()
        .copied()
        .ok_or_else(|| Error::manifest("missing office:body element in content.xml"))?;
    let text_el = doc
        .elements_by_name(body, "office:text")
        .first()
        .copied()
        .ok_or_else(|| Error::manifest("missing office:text element in content.xml"))?;

    Ok(element_text(&doc, text_el))
}

fn element_text(doc: &Document, node: NodeId) -> String {
    let name = match doc.element(node) {
        Some(el) => el.name.as_str(),
        None => return String::new(),
    };
    if name == "text:p" || name == "text:h" {
        let mut out = doc.text_content(node);
        out.push('\n');
        return out;
    }

    let inner: String = doc
        .children(node)
        .into_iter()
        .filter(|&child| doc.element(child).is_some())
        .map(|child| element_text(doc, child))
        .collect();

    if name == "text:list-item" {
        format!("- {inner}")
    } else {
        inner
    }
}
