//! Streaming HTML link rewriting.
//!
//! # Responsibilities
//! - Visit tag-open events in document order as the tokenizer produces them
//! - Replace at most one link-bearing attribute per tag before re-emission
//! - Route recognized absolute URLs back through the proxy and prefix
//!   root-relative URLs with the page's region context
//!
//! # Design Decisions
//! - The tokenizer is `quick-xml`'s event reader driven over incoming body
//!   chunks; the document is never materialized, only the current event and
//!   a bounded output buffer are held in memory
//! - Fail safe, never corrupt the page: a malformed attribute leaves that
//!   tag untouched, and a tokenizer error replays the consumed-but-unparsed
//!   bytes verbatim and passes the rest of the stream through
//! - Each response gets its own rewriter bound to its own page context;
//!   nothing here is shared across requests

use std::borrow::Cow;
use std::io::{self, BufRead, Read, Write};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use quick_xml::escape::{escape, unescape};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use tokio::sync::mpsc;
use url::Url;

use crate::mapping::{ProxyContext, ProxyResolver};
use crate::observability::metrics;

/// Output chunk size shipped to the response body.
const FLUSH_THRESHOLD: usize = 8 * 1024;

/// Which attribute carries the link for a watched tag.
fn target_attr(tag: &[u8]) -> Option<&'static [u8]> {
    if tag.eq_ignore_ascii_case(b"a") || tag.eq_ignore_ascii_case(b"link") {
        Some(b"href")
    } else if tag.eq_ignore_ascii_case(b"img") || tag.eq_ignore_ascii_case(b"script") {
        Some(b"src")
    } else {
        None
    }
}

/// Scheme comparison is case-insensitive per URL syntax.
fn has_http_scheme(value: &str) -> bool {
    value.get(..7).is_some_and(|p| p.eq_ignore_ascii_case("http://"))
        || value.get(..8).is_some_and(|p| p.eq_ignore_ascii_case("https://"))
}

/// Rewrites link-bearing attributes in an HTML stream so navigation stays
/// on the front domain.
pub struct HtmlRewriter {
    resolver: Arc<ProxyResolver>,
    context: ProxyContext,
    rewrite_absolute: bool,
}

impl HtmlRewriter {
    pub fn new(resolver: Arc<ProxyResolver>, context: ProxyContext, rewrite_absolute: bool) -> Self {
        Self {
            resolver,
            context,
            rewrite_absolute,
        }
    }

    /// Rewrite a response body arriving as a byte stream. The tokenizer runs
    /// on a blocking thread fed chunk by chunk; rewritten output flows back
    /// as chunks for the response body, so neither side ever holds the whole
    /// document.
    pub fn rewrite_stream<S, E>(self, input: S) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let (in_tx, in_rx) = mpsc::channel::<Bytes>(8);
        let (out_tx, mut out_rx) = mpsc::channel::<io::Result<Bytes>>(8);

        tokio::spawn(async move {
            futures_util::pin_mut!(input);
            while let Some(item) = input.next().await {
                match item {
                    Ok(chunk) => {
                        if in_tx.send(chunk).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "upstream body stream ended early");
                        break;
                    }
                }
            }
        });

        tokio::task::spawn_blocking(move || {
            self.drive(ChunkReader::new(in_rx), ChunkWriter::new(out_tx));
        });

        futures_util::stream::poll_fn(move |cx| out_rx.poll_recv(cx))
    }

    /// Rewrite a document already held in memory. Infallible by design: any
    /// tokenizer or write failure degrades to emitting the affected bytes
    /// unmodified.
    pub fn rewrite(&self, html: &[u8]) -> Vec<u8> {
        self.rewrite_inner(html).unwrap_or_else(|_| html.to_vec())
    }

    /// Event loop over chunked input. Consumed bytes that were not emitted
    /// as a parsed event are replayed verbatim when the tokenizer fails, so
    /// a broken document degrades to pass-through mid-stream.
    fn drive(&self, source: ChunkReader, sink: ChunkWriter) {
        let mut reader = Reader::from_reader(source);
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        let mut writer = Writer::new(sink);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let event = match reader.read_event_into(&mut buf) {
                Ok(Event::Eof) => break,
                Ok(event) => event,
                Err(err) => {
                    tracing::debug!(error = %err, "tokenizer error, passing remainder through");
                    let mut source = reader.into_inner();
                    let mut sink = writer.into_inner();
                    let trail = source.take_trail();
                    if sink.write_all(&trail).is_ok() {
                        let _ = io::copy(&mut source, &mut sink);
                    }
                    let _ = sink.flush();
                    return;
                }
            };
            let written = match event {
                Event::Start(e) => match self.rewritten_tag(&e) {
                    Some(rewritten) => writer.write_event(Event::Start(rewritten)),
                    None => writer.write_event(Event::Start(e)),
                },
                Event::Empty(e) => match self.rewritten_tag(&e) {
                    Some(rewritten) => writer.write_event(Event::Empty(rewritten)),
                    None => writer.write_event(Event::Empty(e)),
                },
                other => writer.write_event(other),
            };
            if written.is_err() {
                // Response consumer went away; nothing left to emit to.
                return;
            }
            reader.get_mut().discard_trail();
        }
        let _ = writer.into_inner().flush();
    }

    fn rewrite_inner(&self, html: &[u8]) -> io::Result<Vec<u8>> {
        let mut reader = Reader::from_reader(html);
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        let mut writer = Writer::new(Vec::with_capacity(html.len() + html.len() / 8));
        let mut buf = Vec::new();
        loop {
            let checkpoint = (reader.buffer_position() as usize).min(html.len());
            match reader.read_event_into(&mut buf) {
                Ok(Event::Eof) => break,
                Ok(Event::Start(e)) => match self.rewritten_tag(&e) {
                    Some(rewritten) => writer.write_event(Event::Start(rewritten))?,
                    None => writer.write_event(Event::Start(e))?,
                },
                Ok(Event::Empty(e)) => match self.rewritten_tag(&e) {
                    Some(rewritten) => writer.write_event(Event::Empty(rewritten))?,
                    None => writer.write_event(Event::Empty(e))?,
                },
                Ok(event) => writer.write_event(event)?,
                Err(err) => {
                    // Tokenizer gave up; emit the remainder untouched rather
                    // than risk corrupting the page.
                    tracing::debug!(error = %err, offset = checkpoint, "tokenizer error, passing remainder through");
                    let mut out = writer.into_inner();
                    out.extend_from_slice(&html[checkpoint..]);
                    return Ok(out);
                }
            }
            buf.clear();
        }
        Ok(writer.into_inner())
    }

    /// Rebuilt tag-open event with the link attribute replaced, or `None`
    /// when nothing changes (the original bytes are re-emitted instead).
    fn rewritten_tag(&self, elem: &BytesStart<'_>) -> Option<BytesStart<'static>> {
        let target = target_attr(elem.name().as_ref())?;

        let mut attrs: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        let mut changed = false;
        for attr in elem.attributes().with_checks(false) {
            let attr = attr.ok()?;
            let key = attr.key.as_ref().to_vec();
            if !changed && attr.key.as_ref().eq_ignore_ascii_case(target) {
                if let Some(new_value) = self.rewritten_value(&attr) {
                    attrs.push((key, escape(new_value.as_str()).into_owned().into_bytes()));
                    changed = true;
                    continue;
                }
            }
            attrs.push((key, attr.value.into_owned()));
        }
        if !changed {
            return None;
        }

        metrics::record_rewrite();
        let name = String::from_utf8_lossy(elem.name().as_ref()).into_owned();
        let mut rebuilt = BytesStart::new(name);
        for (key, value) in &attrs {
            rebuilt.push_attribute(Attribute {
                key: QName(key.as_slice()),
                value: Cow::Borrowed(value.as_slice()),
            });
        }
        Some(rebuilt)
    }

    /// Replacement for one attribute value, or `None` to leave it alone.
    fn rewritten_value(&self, attr: &Attribute<'_>) -> Option<String> {
        let raw = std::str::from_utf8(attr.value.as_ref()).ok()?;
        let value = match unescape(raw) {
            Ok(decoded) => decoded,
            Err(_) => Cow::Borrowed(raw),
        };
        let rewritten = self.rewrite_value(value.trim())?;
        tracing::debug!(from = %value, to = %rewritten, "attribute rewritten");
        Some(rewritten)
    }

    fn rewrite_value(&self, value: &str) -> Option<String> {
        if value.is_empty() {
            return None;
        }

        // Rule (a): absolute or protocol-relative URL on a recognized host.
        let absolute = if let Some(rest) = value.strip_prefix("//") {
            Some(format!("{}://{}", self.context.scheme(), rest))
        } else if has_http_scheme(value) {
            Some(value.to_string())
        } else {
            None
        };
        if let Some(absolute) = absolute {
            if !self.rewrite_absolute {
                return None;
            }
            let url = Url::parse(&absolute).ok()?;
            let location = self.resolver.resolve(&url)?;
            return Some(location.url.to_string());
        }

        // Rule (b): root-relative path on a page with regional context.
        if value.starts_with('/') {
            let region = self.context.region()?;
            return Some(format!("{}{}", region.path_prefix(), value));
        }

        // Rule (c): fragments, relative paths, other schemes.
        None
    }
}

/// Blocking reader over body chunks from a channel. Records consumed bytes
/// until the current event is known good, for verbatim replay on error.
struct ChunkReader {
    rx: mpsc::Receiver<Bytes>,
    chunk: Bytes,
    pos: usize,
    trail: Vec<u8>,
    record: bool,
}

impl ChunkReader {
    fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        Self {
            rx,
            chunk: Bytes::new(),
            pos: 0,
            trail: Vec::new(),
            record: true,
        }
    }

    /// Forget recorded bytes once their event was emitted.
    fn discard_trail(&mut self) {
        self.trail.clear();
    }

    /// Bytes consumed since the last emitted event; stops recording so the
    /// pass-through copy that follows is not re-buffered.
    fn take_trail(&mut self) -> Vec<u8> {
        self.record = false;
        std::mem::take(&mut self.trail)
    }
}

impl Read for ChunkReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let n = {
            let available = self.fill_buf()?;
            let n = available.len().min(out.len());
            out[..n].copy_from_slice(&available[..n]);
            n
        };
        self.consume(n);
        Ok(n)
    }
}

impl BufRead for ChunkReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        while self.pos >= self.chunk.len() {
            match self.rx.blocking_recv() {
                Some(chunk) => {
                    self.chunk = chunk;
                    self.pos = 0;
                }
                None => return Ok(&[]),
            }
        }
        Ok(&self.chunk[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        let end = (self.pos + amt).min(self.chunk.len());
        if self.record {
            self.trail.extend_from_slice(&self.chunk[self.pos..end]);
        }
        self.pos = end;
    }
}

/// Buffering writer that ships rewritten output through a channel.
struct ChunkWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
    buf: Vec<u8>,
}

impl ChunkWriter {
    fn new(tx: mpsc::Sender<io::Result<Bytes>>) -> Self {
        Self {
            tx,
            buf: Vec::with_capacity(FLUSH_THRESHOLD),
        }
    }

    fn ship(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = Bytes::from(std::mem::take(&mut self.buf));
        self.tx
            .blocking_send(Ok(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response consumer dropped"))
    }
}

impl Write for ChunkWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= FLUSH_THRESHOLD {
            self.ship()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.ship()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{MappedLocation, UpstreamResolver};

    fn context_for(proxied: &str) -> ProxyContext {
        let resolver = UpstreamResolver::new("example.com", "https");
        let url = Url::parse(proxied).unwrap();
        ProxyContext::new(resolver.resolve(&url).unwrap())
    }

    fn context_without_region() -> ProxyContext {
        ProxyContext::new(MappedLocation::passthrough(
            Url::parse("https://www.wikipedia.org/").unwrap(),
        ))
    }

    fn rewriter(context: &ProxyContext, absolute: bool) -> HtmlRewriter {
        HtmlRewriter::new(
            Arc::new(ProxyResolver::new("example.com")),
            context.clone(),
            absolute,
        )
    }

    fn rewrite(context: &ProxyContext, absolute: bool, html: &str) -> String {
        let out = rewriter(context, absolute).rewrite(html.as_bytes());
        String::from_utf8(out).unwrap()
    }

    async fn rewrite_streamed(context: &ProxyContext, html: &str, chunk_size: usize) -> String {
        let chunks: Vec<Result<Bytes, io::Error>> = html
            .as_bytes()
            .chunks(chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let out = rewriter(context, true).rewrite_stream(futures_util::stream::iter(chunks));
        futures_util::pin_mut!(out);
        let mut collected = Vec::new();
        while let Some(chunk) = out.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        String::from_utf8(collected).unwrap()
    }

    #[test]
    fn absolute_link_routes_through_proxy() {
        let ctx = context_for("https://wikipedia.example.com/en/wiki/Foo");
        let out = rewrite(
            &ctx,
            true,
            r#"<a href="https://en.wikipedia.org/wiki/Bar">Bar</a>"#,
        );
        assert_eq!(out, r#"<a href="https://wikipedia.example.com/en/wiki/Bar">Bar</a>"#);
    }

    #[test]
    fn uppercase_scheme_and_host_still_recognized() {
        let ctx = context_for("https://wikipedia.example.com/en/wiki/Foo");
        let out = rewrite(
            &ctx,
            true,
            r#"<a href="HTTP://EN.WIKIPEDIA.ORG/wiki/Bar">Bar</a>"#,
        );
        assert_eq!(out, r#"<a href="http://wikipedia.example.com/en/wiki/Bar">Bar</a>"#);
    }

    #[test]
    fn protocol_relative_link_completed_with_page_scheme() {
        let ctx = context_for("https://wikipedia.example.com/en/wiki/Foo");
        let out = rewrite(
            &ctx,
            true,
            r#"<img src="//upload.wikimedia.org/wikipedia/commons/x.png">"#,
        );
        assert_eq!(
            out,
            r#"<img src="https://upload.wikimedia.example.com/wikipedia/commons/x.png">"#
        );
    }

    #[test]
    fn root_relative_link_gains_region_prefix() {
        let ctx = context_for("https://wikipedia.example.com/fr/wiki/Foo");
        let out = rewrite(&ctx, true, r#"<a href="/wiki/Baz">Baz</a>"#);
        assert_eq!(out, r#"<a href="/fr/wiki/Baz">Baz</a>"#);
    }

    #[test]
    fn root_relative_link_gains_mobile_marker() {
        let ctx = context_for("https://wikipedia.example.com/zh/m/wiki/Foo");
        let out = rewrite(&ctx, true, r#"<a href="/wiki/Baz">Baz</a>"#);
        assert_eq!(out, r#"<a href="/zh/m/wiki/Baz">Baz</a>"#);
    }

    #[test]
    fn root_relative_link_unchanged_without_region() {
        let ctx = context_without_region();
        let out = rewrite(&ctx, true, r#"<a href="/wiki/Baz">Baz</a>"#);
        assert_eq!(out, r#"<a href="/wiki/Baz">Baz</a>"#);
    }

    #[test]
    fn unrelated_values_pass_through() {
        let ctx = context_for("https://wikipedia.example.com/en/wiki/Foo");
        for html in [
            r##"<a href="#section">jump</a>"##,
            r#"<a href="mailto:user@example.net">mail</a>"#,
            r#"<a href="wiki/Relative">rel</a>"#,
            r#"<img src="data:image/png;base64,AAAA">"#,
            r#"<a href="https://third-party.net/page">off-site</a>"#,
            r#"<a href="javascript:void(0)">noop</a>"#,
        ] {
            assert_eq!(rewrite(&ctx, true, html), html, "{html}");
        }
    }

    #[test]
    fn malformed_url_left_unmodified() {
        let ctx = context_for("https://wikipedia.example.com/en/wiki/Foo");
        let html = r#"<a href="http://exa mple.org/broken path">x</a>"#;
        assert_eq!(rewrite(&ctx, true, html), html);
    }

    #[test]
    fn absolute_rewriting_can_be_disabled() {
        let ctx = context_for("https://wikipedia.example.com/en/wiki/Foo");
        let out = rewrite(
            &ctx,
            false,
            r#"<a href="https://en.wikipedia.org/wiki/Bar">Bar</a><a href="/wiki/Baz">Baz</a>"#,
        );
        // Rule (a) is off, rule (b) stays active.
        assert_eq!(
            out,
            r#"<a href="https://en.wikipedia.org/wiki/Bar">Bar</a><a href="/en/wiki/Baz">Baz</a>"#
        );
    }

    #[test]
    fn unwatched_tags_and_attributes_untouched() {
        let ctx = context_for("https://wikipedia.example.com/en/wiki/Foo");
        let html = r#"<div data-href="/wiki/Baz"><span>/wiki/Inline</span></div>"#;
        assert_eq!(rewrite(&ctx, true, html), html);
    }

    #[test]
    fn surrounding_markup_preserved() {
        let ctx = context_for("https://wikipedia.example.com/en/wiki/Foo");
        let html = concat!(
            "<!DOCTYPE html>",
            "<html><head><link rel=\"stylesheet\" href=\"/w/load.php?modules=site\"></head>",
            "<body><!-- nav --><p>text</p></body></html>",
        );
        let out = rewrite(&ctx, true, html);
        assert!(out.starts_with("<!DOCTYPE html>"));
        assert!(out.contains(r#"href="/en/w/load.php?modules=site""#));
        assert!(out.contains("<!-- nav -->"));
        assert!(out.contains("<p>text</p>"));
    }

    #[test]
    fn stylesheet_and_script_attributes_rewritten() {
        let ctx = context_for("https://wikipedia.example.com/zh/wiki/Foo");
        let out = rewrite(
            &ctx,
            true,
            r#"<script src="/w/load.php?modules=startup"></script>"#,
        );
        assert_eq!(out, r#"<script src="/zh/w/load.php?modules=startup"></script>"#);
    }

    #[tokio::test]
    async fn streamed_chunks_rewrite_across_boundaries() {
        let ctx = context_for("https://wikipedia.example.com/en/wiki/Foo");
        let html = concat!(
            r#"<p>intro</p>"#,
            r#"<a href="https://en.wikipedia.org/wiki/Bar">Bar</a>"#,
            r#"<a href="/wiki/Baz">Baz</a>"#,
        );
        // Tiny chunks force every tag to span a chunk boundary.
        let out = rewrite_streamed(&ctx, html, 5).await;
        assert!(out.contains(r#"href="https://wikipedia.example.com/en/wiki/Bar""#));
        assert!(out.contains(r#"href="/en/wiki/Baz""#));
    }

    #[tokio::test]
    async fn streamed_output_matches_in_memory_rewrite() {
        let ctx = context_for("https://wikipedia.example.com/fr/wiki/Foo");
        let html = concat!(
            "<!DOCTYPE html><html><head>",
            r#"<link rel="stylesheet" href="/w/load.php?modules=site">"#,
            "</head><body>",
            r#"<a href="https://fr.wikipedia.org/wiki/Bar">Bar</a>"#,
            r#"<img src="//upload.wikimedia.org/x.png">"#,
            "<!-- nav --><p>text</p></body></html>",
        );
        let streamed = rewrite_streamed(&ctx, html, 11).await;
        assert_eq!(streamed, rewrite(&ctx, true, html));
    }
}
