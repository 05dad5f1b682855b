//! RSS 2.0, RSS 1.0 (RDF) and Atom parsing into [`RawArticle`]s.
//!
//! Only the fields the pipeline needs are read: title, description or
//! summary (falling back to full content), publication date, link and the
//! first image. Whitespace is left as found; normalization happens later.

use crate::error::FetchError;
use crate::models::RawArticle;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// Item field currently receiving text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Summary,
    Content,
    Published,
    Updated,
    Link,
}

fn field_for(tag: &[u8]) -> Option<Field> {
    match tag {
        b"title" => Some(Field::Title),
        b"description" | b"summary" => Some(Field::Summary),
        b"content:encoded" | b"content" => Some(Field::Content),
        b"pubDate" | b"dc:date" | b"published" | b"issued" => Some(Field::Published),
        b"updated" | b"modified" => Some(Field::Updated),
        b"link" => Some(Field::Link),
        _ => None,
    }
}

fn is_item(tag: &[u8]) -> bool {
    matches!(tag, b"item" | b"entry")
}

#[derive(Debug, Default)]
struct ItemBuilder {
    title: String,
    summary: String,
    content: String,
    published: String,
    updated: String,
    link: String,
    image: Option<String>,
}

impl ItemBuilder {
    fn buffer(&mut self, field: Field) -> &mut String {
        match field {
            Field::Title => &mut self.title,
            Field::Summary => &mut self.summary,
            Field::Content => &mut self.content,
            Field::Published => &mut self.published,
            Field::Updated => &mut self.updated,
            Field::Link => &mut self.link,
        }
    }

    fn finish(self, region: &str) -> RawArticle {
        let body = if self.summary.trim().is_empty() {
            self.content
        } else {
            self.summary
        };
        let published = [self.published, self.updated]
            .into_iter()
            .map(|s| s.trim().to_string())
            .find(|s| !s.is_empty());
        RawArticle {
            title: self.title,
            body,
            published,
            link: self.link.trim().to_string(),
            region: region.to_string(),
            image: self.image,
        }
    }
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes().flatten().find(|a| a.key.as_ref() == name).map(|a| {
        let raw = String::from_utf8_lossy(&a.value);
        match quick_xml::escape::unescape(&raw) {
            Ok(s) => s.into_owned(),
            Err(_) => raw.to_string(),
        }
    })
}

/// Resolve an entity or character reference body such as `amp` or `#x27`.
fn resolve_reference(name: &str) -> Option<String> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    if let Some(s) = quick_xml::escape::resolve_predefined_entity(name) {
        return Some(s.to_string());
    }
    match name {
        "nbsp" => Some(" ".to_string()),
        "mdash" => Some("—".to_string()),
        "ndash" => Some("–".to_string()),
        "hellip" => Some("…".to_string()),
        "rsquo" => Some("’".to_string()),
        "lsquo" => Some("‘".to_string()),
        "rdquo" => Some("”".to_string()),
        "ldquo" => Some("“".to_string()),
        _ => None,
    }
}

/// Handle attributes of elements that carry data in attributes: Atom links
/// and image enclosures.
fn read_attributes(item: &mut ItemBuilder, e: &BytesStart<'_>) {
    match e.name().as_ref() {
        b"link" => {
            let rel = attr(e, b"rel");
            if item.link.trim().is_empty() && matches!(rel.as_deref(), None | Some("alternate")) {
                if let Some(href) = attr(e, b"href") {
                    item.link = href;
                }
            }
        }
        b"enclosure" => {
            let is_image = attr(e, b"type").is_none_or(|t| t.starts_with("image/"));
            if item.image.is_none() && is_image {
                item.image = attr(e, b"url");
            }
        }
        b"media:content" | b"media:thumbnail" => {
            if item.image.is_none() {
                item.image = attr(e, b"url");
            }
        }
        _ => {}
    }
}

/// Parse a feed document. Every item is tagged with `region`.
///
/// # Errors
///
/// Returns [`FetchError::Xml`] if the document is malformed before the end
/// of input.
pub fn parse_feed(xml: &str, region: &str) -> Result<Vec<RawArticle>, FetchError> {
    let mut reader = Reader::from_str(xml);
    let mut items = Vec::new();
    let mut current: Option<ItemBuilder> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                if is_item(name.as_ref()) {
                    current = Some(ItemBuilder::default());
                    field = None;
                } else if let Some(item) = current.as_mut() {
                    read_attributes(item, &e);
                    if field.is_none() {
                        field = field_for(name.as_ref());
                    }
                }
            }
            Event::Empty(e) => {
                if let Some(item) = current.as_mut() {
                    read_attributes(item, &e);
                }
            }
            Event::End(e) => {
                let name = e.name();
                if is_item(name.as_ref()) {
                    if let Some(item) = current.take() {
                        items.push(item.finish(region));
                    }
                    field = None;
                } else if field.is_some() && field == field_for(name.as_ref()) {
                    field = None;
                }
            }
            Event::Text(t) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    let raw = String::from_utf8_lossy(&t);
                    let text = match quick_xml::escape::unescape(&raw) {
                        Ok(s) => s.into_owned(),
                        Err(_) => raw.to_string(),
                    };
                    item.buffer(f).push_str(&text);
                }
            }
            Event::CData(t) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    item.buffer(f).push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::GeneralRef(r) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    let name = String::from_utf8_lossy(&r).into_owned();
                    match resolve_reference(&name) {
                        Some(s) => item.buffer(f).push_str(&s),
                        None => item.buffer(f).push_str(&format!("&{name};")),
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(items)
}
