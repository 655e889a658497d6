//! Single-pass split engine.
//!
//! The source is read with a pull parser and one reusable event buffer.
//! Depth 0 is outside the envelope, depth 1 is directly inside it; every
//! element opened at depth 1 is a top-level child and is classified once,
//! when its start tag arrives:
//!
//! - the first top-level child is the header and is buffered in memory;
//! - the first later child with a different local name fixes the product tag;
//! - children matching neither are skipped.
//!
//! Product events are normalized and written directly to the open part, so
//! memory use is bounded by the header plus one parser buffer.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use std::time::Instant;

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use tracing::Span;

use super::part::{PartProlog, PartWriter, PublishedPart};
use super::types::SplitReport;
use crate::config::SplitOptions;
use crate::error::{Result, SplitterError};
use crate::metadata::EnvelopeMetadata;
use crate::routing::{output_file_name, temp_path_for};
use crate::xml::{local_name, local_name_bytes, normalize_end, normalize_start};

/// Streams ONIX messages into size-bounded parts.
///
/// The engine keeps no per-file state, so one instance can split any
/// number of files. All log lines of a split are emitted inside the span
/// given at construction.
#[derive(Debug, Clone)]
pub struct SplitEngine {
    options: SplitOptions,
    span: Span,
}

impl SplitEngine {
    #[must_use]
    pub fn new(options: SplitOptions, span: Span) -> Self {
        Self { options, span }
    }

    #[must_use]
    pub fn options(&self) -> SplitOptions {
        self.options
    }

    /// Split `source` into parts written to `output_dir`.
    ///
    /// Parts are named `Orig_<release>_<stem>_<n>.xml` with `n` counting
    /// from 1. When the source turns out to be malformed, every part written
    /// for it is removed again. On an I/O error, parts published so far
    /// remain and the part being written is left behind as a `.tmp` file.
    pub fn split(
        &self,
        source: &Path,
        output_dir: &Path,
        metadata: &EnvelopeMetadata,
    ) -> Result<SplitReport> {
        let _entered = self.span.enter();
        let started = Instant::now();
        tracing::info!(
            source = %source.display(),
            split_file_size = self.options.split_file_size,
            "starting streaming split"
        );

        let mut run = SplitRun::new(self.options, source, output_dir, metadata);
        let report = match run.stream().and_then(|()| run.finish()) {
            Ok(report) => report,
            Err(e) => {
                if e.is_routable_failure() {
                    run.abandon();
                }
                return Err(e);
            }
        };

        tracing::info!(
            source = %source.display(),
            parts = report.part_count(),
            products = report.product_count,
            skipped = report.skipped_count,
            bytes = report.bytes_written,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "finished streaming split"
        );
        Ok(report)
    }
}

/// Role of the top-level child currently being streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Header,
    Product,
    Skipped,
}

/// State of one `split` call.
struct SplitRun<'a> {
    options: SplitOptions,
    source: &'a Path,
    output_dir: &'a Path,
    metadata: &'a EnvelopeMetadata,
    depth: usize,
    root_seen: bool,
    header_tag: Option<String>,
    product_tag: Option<String>,
    slot: Option<Slot>,
    header: Option<Writer<Vec<u8>>>,
    prolog: Option<PartProlog>,
    part: Option<PartWriter>,
    published: Vec<PublishedPart>,
    skipped: usize,
    discarded_products: usize,
}

impl<'a> SplitRun<'a> {
    fn new(
        options: SplitOptions,
        source: &'a Path,
        output_dir: &'a Path,
        metadata: &'a EnvelopeMetadata,
    ) -> Self {
        Self {
            options,
            source,
            output_dir,
            metadata,
            depth: 0,
            root_seen: false,
            header_tag: None,
            product_tag: None,
            slot: None,
            header: None,
            prolog: None,
            part: None,
            published: Vec::new(),
            skipped: 0,
            discarded_products: 0,
        }
    }

    fn stream(&mut self) -> Result<()> {
        let mut reader = Reader::from_reader(BufReader::new(File::open(self.source)?));
        let mut buf = Vec::new();

        loop {
            let event = match reader.read_event_into(&mut buf) {
                Ok(Event::Eof) => return Ok(()),
                Ok(event) => event,
                Err(e) => {
                    tracing::error!(
                        source = %self.source.display(),
                        position = reader.buffer_position(),
                        error = %e,
                        "xml parsing failed"
                    );
                    return Err(e.into());
                }
            };
            self.handle(event)?;
            buf.clear();
        }
    }

    fn handle(&mut self, event: Event<'_>) -> Result<()> {
        match event {
            Event::Start(start) => {
                match self.depth {
                    0 => self.open_root(&start)?,
                    1 => self.begin_child(&start, false)?,
                    _ => self.copy(Event::Start(normalize_start(&start)?))?,
                }
                self.depth += 1;
            }
            Event::Empty(start) => match self.depth {
                0 => self.open_root(&start)?,
                1 => {
                    self.begin_child(&start, true)?;
                    self.end_child()?;
                }
                _ => self.copy(Event::Empty(normalize_start(&start)?))?,
            },
            Event::End(end) => {
                self.depth = self.depth.saturating_sub(1);
                if self.depth >= 1 {
                    self.copy(Event::End(normalize_end(&end)))?;
                }
                if self.depth == 1 {
                    self.end_child()?;
                }
            }
            Event::Text(_) | Event::CData(_) | Event::Comment(_) | Event::PI(_)
                if self.depth > 1 =>
            {
                self.copy(event)?;
            }
            // Prolog, doctype, and whitespace or comments between top-level children
            _ => {}
        }
        Ok(())
    }

    fn open_root(&mut self, start: &BytesStart<'_>) -> Result<()> {
        if self.root_seen {
            return Err(self.malformed("more than one root element"));
        }

        let metadata = self.metadata;
        let expected = local_name(&metadata.envelope_tag);
        let name = local_name_bytes(start.name().into_inner());
        if !name.eq_ignore_ascii_case(expected.as_bytes()) {
            return Err(self.malformed(format!(
                "root element '{}' does not match envelope '{expected}'",
                String::from_utf8_lossy(name)
            )));
        }

        self.root_seen = true;
        Ok(())
    }

    fn begin_child(&mut self, start: &BytesStart<'_>, empty: bool) -> Result<()> {
        let name = String::from_utf8_lossy(local_name_bytes(start.name().into_inner())).into_owned();
        let slot = self.classify(&name);
        self.slot = Some(slot);

        let normalized = normalize_start(start)?;
        let event = if empty {
            Event::Empty(normalized)
        } else {
            Event::Start(normalized)
        };

        match slot {
            Slot::Header => {
                tracing::debug!(tag = %name, "buffering header");
                self.header = Some(Writer::new(Vec::new()));
                self.copy(event)
            }
            Slot::Product => {
                if self.part.is_none() {
                    self.open_next_part()?;
                }
                self.copy(event)
            }
            Slot::Skipped => {
                self.skipped += 1;
                tracing::debug!(tag = %name, "skipping top-level element");
                Ok(())
            }
        }
    }

    fn classify(&mut self, name: &str) -> Slot {
        let Some(header_tag) = self.header_tag.as_deref() else {
            self.header_tag = Some(name.to_string());
            return Slot::Header;
        };

        match self.product_tag.as_deref() {
            Some(product_tag) if product_tag == name => Slot::Product,
            Some(_) => Slot::Skipped,
            None if header_tag == name => Slot::Skipped,
            None => {
                tracing::info!(product_tag = %name, "detected product element");
                self.product_tag = Some(name.to_string());
                Slot::Product
            }
        }
    }

    fn copy(&mut self, event: Event<'_>) -> Result<()> {
        match self.slot {
            Some(Slot::Header) => {
                if let Some(header) = self.header.as_mut() {
                    header.write_event(event)?;
                }
            }
            Some(Slot::Product) => {
                if let Some(part) = self.part.as_mut() {
                    part.append_event(event)?;
                }
            }
            Some(Slot::Skipped) | None => {}
        }
        Ok(())
    }

    fn end_child(&mut self) -> Result<()> {
        match self.slot.take() {
            Some(Slot::Header) => {
                let header = self
                    .header
                    .take()
                    .map(Writer::into_inner)
                    .unwrap_or_default();
                tracing::debug!(header_bytes = header.len(), "header buffered");
                let prolog = PartProlog::new(self.metadata, &header)?;
                if prolog.empty_part_size() >= self.options.split_file_size {
                    tracing::warn!(
                        empty_part_size = prolog.empty_part_size(),
                        split_file_size = self.options.split_file_size,
                        "header alone reaches the split size, every part holds one product"
                    );
                }
                self.prolog = Some(prolog);
                self.open_next_part()?;
            }
            Some(Slot::Product) => {
                let Some(part) = self.part.as_mut() else {
                    return Ok(());
                };
                part.finish_product()?;
                if part.size() >= self.options.split_file_size {
                    self.roll_over()?;
                }
            }
            Some(Slot::Skipped) | None => {}
        }
        Ok(())
    }

    /// Open the part following the last published one.
    fn open_next_part(&mut self) -> Result<()> {
        let Some(prolog) = self.prolog.as_ref() else {
            return Err(self.malformed("product element before the header was complete"));
        };

        let ordinal = self.published.len() + 1;
        let file_name = output_file_name(&self.metadata.release_version, self.source, Some(ordinal));
        let final_path = self.output_dir.join(file_name);
        let temp_path = temp_path_for(&final_path);

        let part = PartWriter::open(ordinal, temp_path, final_path, prolog)?;
        tracing::debug!(
            part = ordinal,
            temp_path = %part.temp_path().display(),
            path = %part.final_path().display(),
            "opened part"
        );
        self.part = Some(part);
        Ok(())
    }

    fn roll_over(&mut self) -> Result<()> {
        if let Some(part) = self.part.take() {
            self.publish(part)?;
        }
        self.open_next_part()
    }

    fn publish(&mut self, part: PartWriter) -> Result<()> {
        let published = part.close()?;
        tracing::info!(
            part = published.ordinal,
            products = published.products,
            bytes = published.bytes,
            path = %published.path.display(),
            "published part"
        );
        self.published.push(published);
        Ok(())
    }

    fn finish(&mut self) -> Result<SplitReport> {
        if !self.root_seen {
            return Err(self.malformed("document has no root element"));
        }
        if self.depth > 0 {
            return Err(self.malformed("document ended before the envelope was closed"));
        }

        if let Some(part) = self.part.take() {
            let products = part.product_count();
            if products > 0 && part.payload_bytes() >= self.options.min_part_bytes {
                self.publish(part)?;
            } else {
                if products > 0 {
                    tracing::warn!(
                        part = part.ordinal(),
                        products,
                        payload_bytes = part.payload_bytes(),
                        min_part_bytes = self.options.min_part_bytes,
                        "trailing part below minimum size, discarded"
                    );
                    self.discarded_products += products;
                } else {
                    tracing::debug!(part = part.ordinal(), "discarding empty trailing part");
                }
                part.discard()?;
            }
        }

        if self.published.is_empty() {
            tracing::warn!(source = %self.source.display(), "no products found, no parts written");
        }

        let published = std::mem::take(&mut self.published);
        Ok(SplitReport {
            product_count: published.iter().map(|p| p.products).sum(),
            bytes_written: published.iter().map(|p| p.bytes).sum(),
            parts: published.into_iter().map(|p| p.path).collect(),
            skipped_count: self.skipped,
            discarded_product_count: self.discarded_products,
        })
    }

    /// Remove every part written for a source that cannot be split.
    ///
    /// Cleanup failures are logged; the structural error is what the
    /// caller acts on.
    fn abandon(&mut self) {
        if let Some(part) = self.part.take() {
            let temp_path = part.temp_path().to_path_buf();
            if let Err(e) = part.discard() {
                tracing::warn!(path = %temp_path.display(), error = %e, "failed to remove part in progress");
            }
        }

        let removed = self.published.len();
        for part in self.published.drain(..) {
            if let Err(e) = fs::remove_file(&part.path) {
                tracing::warn!(path = %part.path.display(), error = %e, "failed to remove published part");
            }
        }
        if removed > 0 {
            tracing::warn!(
                source = %self.source.display(),
                removed,
                "removed parts of a source that could not be split"
            );
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> SplitterError {
        SplitterError::MalformedDocument {
            path: self.source.to_path_buf(),
            reason: reason.into(),
        }
    }
}
