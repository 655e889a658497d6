//! Lifecycle of one output part.
//!
//! A part is written to `<finalName>.tmp`, and becomes visible under its
//! final name only through a rename after the closing envelope tag has been
//! written, flushed and synced. A crash at any point before that leaves an
//! orphaned temp file and never a truncated file at the final path.

use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use serde::Serialize;

use crate::error::Result;
use crate::metadata::EnvelopeMetadata;
use crate::routing::publish;
use crate::xml::raw_attribute;

/// Write adapter that counts the bytes accepted by the inner writer.
///
/// After a flush, the count equals the size of the file on disk.
#[derive(Debug)]
pub struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// The bytes written before and after the products of every part.
///
/// Rendered once per source file; the header is a normalized, independently
/// serialized copy that is replayed into each part unchanged.
#[derive(Debug, Clone)]
pub struct PartProlog {
    head: Vec<u8>,
    footer: Vec<u8>,
}

impl PartProlog {
    /// Render declaration, envelope open tag and header.
    pub fn new(metadata: &EnvelopeMetadata, header: &[u8]) -> Result<Self> {
        let tag = metadata.envelope_tag.as_str();

        let mut envelope = BytesStart::new(tag);
        envelope.push_attribute(raw_attribute(b"xmlns", metadata.xml_namespace.as_bytes()));
        envelope.push_attribute(raw_attribute(b"release", metadata.release_version.as_bytes()));

        let mut writer = Writer::new(Vec::new());
        writer.get_mut().extend_from_slice(metadata.declaration().as_bytes());
        writer.get_mut().push(b'\n');
        writer.write_event(Event::Start(envelope))?;
        writer.get_mut().push(b'\n');
        writer.get_mut().extend_from_slice(header);
        writer.get_mut().push(b'\n');
        let head = writer.into_inner();

        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::End(BytesEnd::new(Cow::Borrowed(tag))))?;
        writer.get_mut().push(b'\n');
        let footer = writer.into_inner();

        Ok(Self { head, footer })
    }

    /// Size of a part holding no products, footer included.
    #[must_use]
    pub fn empty_part_size(&self) -> u64 {
        (self.head.len() + self.footer.len()) as u64
    }

    #[must_use]
    pub fn head(&self) -> &[u8] {
        &self.head
    }

    #[must_use]
    pub fn footer(&self) -> &[u8] {
        &self.footer
    }
}

/// A part published under its final name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedPart {
    pub ordinal: usize,
    pub path: PathBuf,
    pub bytes: u64,
    pub products: usize,
}

/// An open part file accepting product events.
pub struct PartWriter {
    writer: Writer<CountingWriter<BufWriter<File>>>,
    ordinal: usize,
    temp_path: PathBuf,
    final_path: PathBuf,
    head_len: u64,
    footer: Vec<u8>,
    products: usize,
}

impl PartWriter {
    /// Create the temp file and write the prolog (declaration, envelope, header).
    ///
    /// The envelope is left open.
    pub fn open(
        ordinal: usize,
        temp_path: impl Into<PathBuf>,
        final_path: impl Into<PathBuf>,
        prolog: &PartProlog,
    ) -> Result<Self> {
        let temp_path = temp_path.into();
        let file = File::create(&temp_path)?;
        let mut writer = Writer::new(CountingWriter::new(BufWriter::new(file)));
        writer.get_mut().write_all(prolog.head())?;

        Ok(Self {
            writer,
            ordinal,
            temp_path,
            final_path: final_path.into(),
            head_len: prolog.head().len() as u64,
            footer: prolog.footer().to_vec(),
            products: 0,
        })
    }

    /// Append one event of the current product.
    pub fn append_event(&mut self, event: Event<'_>) -> Result<()> {
        self.writer.write_event(event)?;
        Ok(())
    }

    /// Mark the end of a product element.
    pub fn finish_product(&mut self) -> Result<()> {
        self.writer.get_mut().write_all(b"\n")?;
        self.products += 1;
        Ok(())
    }

    /// Current size of the part in bytes (footer not yet written).
    #[must_use]
    pub fn size(&self) -> u64 {
        self.writer.get_ref().bytes_written()
    }

    /// Bytes written after the prolog.
    #[must_use]
    pub fn payload_bytes(&self) -> u64 {
        self.size().saturating_sub(self.head_len)
    }

    #[must_use]
    pub fn product_count(&self) -> usize {
        self.products
    }

    #[must_use]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    #[must_use]
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    #[must_use]
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Close the envelope, flush, sync and atomically publish the part.
    pub fn close(mut self) -> Result<PublishedPart> {
        self.writer.get_mut().write_all(&self.footer)?;
        let counting = self.writer.into_inner();
        let bytes = counting.bytes_written();
        let file = counting.into_inner().into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        publish(&self.temp_path, &self.final_path)?;

        Ok(PublishedPart {
            ordinal: self.ordinal,
            path: self.final_path,
            bytes,
            products: self.products,
        })
    }

    /// Drop the part without publishing it.
    pub fn discard(self) -> Result<()> {
        let temp_path = self.temp_path;
        drop(self.writer);
        fs::remove_file(&temp_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quick_xml::events::BytesText;
    use tempfile::tempdir;

    fn metadata() -> EnvelopeMetadata {
        EnvelopeMetadata {
            xml_declaration: Some(r#"<?xml version="1.0" encoding="UTF-8"?>"#.to_string()),
            xml_namespace: "http://ns.editeur.org/onix/3.0/reference".to_string(),
            release_version: "3.0".to_string(),
            envelope_tag: "ONIXMessage".to_string(),
        }
    }

    fn write_product(part: &mut PartWriter, reference: &str) {
        part.append_event(Event::Start(BytesStart::new("Product"))).unwrap();
        part.append_event(Event::Start(BytesStart::new("RecordReference"))).unwrap();
        part.append_event(Event::Text(BytesText::new(reference))).unwrap();
        part.append_event(Event::End(BytesEnd::new("RecordReference"))).unwrap();
        part.append_event(Event::End(BytesEnd::new("Product"))).unwrap();
        part.finish_product().unwrap();
    }

    #[test]
    fn test_prolog_rendering() {
        let prolog = PartProlog::new(&metadata(), b"<Header><Sender/></Header>").unwrap();

        assert_eq!(
            String::from_utf8(prolog.head().to_vec()).unwrap(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <ONIXMessage xmlns=\"http://ns.editeur.org/onix/3.0/reference\" release=\"3.0\">\n\
             <Header><Sender/></Header>\n"
        );
        assert_eq!(prolog.footer(), b"</ONIXMessage>\n");
        assert_eq!(
            prolog.empty_part_size(),
            (prolog.head().len() + prolog.footer().len()) as u64
        );
    }

    #[test]
    fn test_part_lifecycle_publishes_atomically() {
        let tmp = tempdir().unwrap();
        let final_path = tmp.path().join("Orig_3_0_feed_1.xml");
        let temp_path = tmp.path().join("Orig_3_0_feed_1.xml.tmp");
        let prolog = PartProlog::new(&metadata(), b"<Header/>").unwrap();

        let mut part = PartWriter::open(1, &temp_path, &final_path, &prolog).unwrap();
        assert!(temp_path.exists());
        assert!(!final_path.exists());
        assert_eq!(part.size(), prolog.head().len() as u64);
        assert_eq!(part.payload_bytes(), 0);

        write_product(&mut part, "ref-1");
        write_product(&mut part, "ref-2");
        assert_eq!(part.product_count(), 2);
        assert!(part.payload_bytes() > 0);
        assert!(!final_path.exists(), "nothing is visible before close");

        let published = part.close().unwrap();
        assert!(!temp_path.exists());
        assert_eq!(published.path, final_path);
        assert_eq!(published.products, 2);
        assert_eq!(published.ordinal, 1);

        let content = fs::read_to_string(&final_path).unwrap();
        assert_eq!(published.bytes, content.len() as u64);
        assert!(content.ends_with("</ONIXMessage>\n"));
        assert!(content.contains("<Product><RecordReference>ref-2</RecordReference></Product>\n"));

        let doc = roxmltree::Document::parse(&content).unwrap();
        assert_eq!(doc.root_element().attribute("release"), Some("3.0"));
    }

    #[test]
    fn test_size_matches_disk_after_close() {
        let tmp = tempdir().unwrap();
        let final_path = tmp.path().join("part.xml");
        let prolog = PartProlog::new(&metadata(), b"<Header/>").unwrap();

        let mut part =
            PartWriter::open(3, tmp.path().join("part.xml.tmp"), &final_path, &prolog).unwrap();
        write_product(&mut part, "x");
        let size_before_footer = part.size();
        let published = part.close().unwrap();

        assert_eq!(
            published.bytes,
            size_before_footer + prolog.footer().len() as u64
        );
        assert_eq!(fs::metadata(&final_path).unwrap().len(), published.bytes);
    }

    #[test]
    fn test_discard_removes_temp_file() {
        let tmp = tempdir().unwrap();
        let temp_path = tmp.path().join("part.xml.tmp");
        let final_path = tmp.path().join("part.xml");
        let prolog = PartProlog::new(&metadata(), b"<Header/>").unwrap();

        let part = PartWriter::open(2, &temp_path, &final_path, &prolog).unwrap();
        part.discard().unwrap();

        assert!(!temp_path.exists());
        assert!(!final_path.exists());
    }

    #[test]
    fn test_counting_writer() {
        let mut counting = CountingWriter::new(Vec::new());
        counting.write_all(b"hello").unwrap();
        counting.write_all(b", world").unwrap();
        assert_eq!(counting.bytes_written(), 12);
        assert_eq!(counting.into_inner(), b"hello, world".to_vec());
    }
}
