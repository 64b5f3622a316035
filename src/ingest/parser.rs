// src/ingest/parser.rs
use metrics::histogram;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::ingest::types::{Channel, FeedDocument, IngestError, RawItem};

/// Read raw feed bytes into a [`FeedDocument`].
///
/// Elements are matched by local name, so `<atom:link>` lands on the same
/// field as `<link>` and the first non-empty value wins. Unknown elements are
/// skipped, `<item>`s are collected wherever they sit under `<channel>`, and
/// markup nested inside a field contributes its text.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedDocument, IngestError> {
    let t0 = std::time::Instant::now();
    let doc =
        read_document(bytes).map_err(|e| IngestError::ParseFailed(format!("rss xml: {e}")))?;

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("ingest_parse_ms").record(ms);
    Ok(doc)
}

fn read_document(bytes: &[u8]) -> Result<FeedDocument, String> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut builder = DocumentBuilder::default();

    loop {
        match reader.read_event_into(&mut buf).map_err(|e| e.to_string())? {
            Event::Start(e) => builder.start(e.local_name().as_ref()),
            Event::Empty(e) => {
                builder.start(e.local_name().as_ref());
                builder.end();
            }
            Event::End(_) => builder.end(),
            Event::Text(e) => {
                if builder.capturing() {
                    let text = e.unescape().map_err(|e| e.to_string())?;
                    builder.text(&text);
                }
            }
            Event::CData(e) => builder.text(&String::from_utf8_lossy(&e)),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    builder.finish()
}

#[derive(Debug, Clone, Copy)]
enum Scope {
    Channel,
    Item,
}

/// Text collected for one field element.
struct Capture {
    scope: Scope,
    field: Vec<u8>,
    depth: usize,
    text: String,
}

#[derive(Default)]
struct DocumentBuilder {
    // local names of the open elements, root first
    open: Vec<Vec<u8>>,
    channel: Option<Channel>,
    item: Option<RawItem>,
    capture: Option<Capture>,
}

impl DocumentBuilder {
    fn start(&mut self, name: &[u8]) {
        self.open.push(name.to_vec());
        let depth = self.open.len();
        if self.open.get(1).map(Vec::as_slice) != Some(b"channel".as_slice()) {
            return;
        }
        match depth {
            2 => {
                self.channel.get_or_insert_with(Channel::default);
            }
            3 if name == b"item" => self.item = Some(RawItem::default()),
            3 => self.begin_capture(Scope::Channel, name, depth),
            4 if self.item.is_some() => self.begin_capture(Scope::Item, name, depth),
            _ => {}
        }
    }

    fn begin_capture(&mut self, scope: Scope, name: &[u8], depth: usize) {
        self.capture = Some(Capture {
            scope,
            field: name.to_vec(),
            depth,
            text: String::new(),
        });
    }

    fn capturing(&self) -> bool {
        self.capture.is_some()
    }

    fn text(&mut self, text: &str) {
        if let Some(capture) = self.capture.as_mut() {
            capture.text.push_str(text);
        }
    }

    fn end(&mut self) {
        let depth = self.open.len();
        if self.capture.as_ref().is_some_and(|c| c.depth == depth) {
            if let Some(capture) = self.capture.take() {
                self.store(capture);
            }
        } else if depth == 3 {
            if let (Some(item), Some(channel)) = (self.item.take(), self.channel.as_mut()) {
                channel.items.push(item);
            }
        }
        self.open.pop();
    }

    fn store(&mut self, capture: Capture) {
        let slot = match capture.scope {
            Scope::Channel => self
                .channel
                .as_mut()
                .and_then(|c| channel_field(c, &capture.field)),
            Scope::Item => self
                .item
                .as_mut()
                .and_then(|i| item_field(i, &capture.field)),
        };
        if let Some(slot) = slot.filter(|s| s.is_empty()) {
            *slot = capture.text.trim().to_string();
        }
    }

    fn finish(self) -> Result<FeedDocument, String> {
        if let Some(name) = self.open.last() {
            return Err(format!(
                "document ends inside <{}>",
                String::from_utf8_lossy(name)
            ));
        }
        let channel = self.channel.ok_or_else(|| "missing <channel> element".to_string())?;
        Ok(FeedDocument { channel })
    }
}

fn channel_field<'a>(channel: &'a mut Channel, name: &[u8]) -> Option<&'a mut String> {
    match name {
        b"title" => Some(&mut channel.title),
        b"link" => Some(&mut channel.link),
        b"description" => Some(&mut channel.description),
        _ => None,
    }
}

fn item_field<'a>(item: &'a mut RawItem, name: &[u8]) -> Option<&'a mut String> {
    match name {
        b"title" => Some(&mut item.title),
        b"link" => Some(&mut item.link),
        b"description" => Some(&mut item.description),
        b"pubDate" => Some(&mut item.pub_date),
        _ => None,
    }
}
