//! XML to nested JSON-like structure.
//!
//! Shape rules:
//! - the root element itself is dropped; its content becomes the document
//! - attributes go under `@`
//! - an element with only text becomes a string (empty elements become `""`)
//! - text next to attributes or children goes under `#`
//! - repeated child names collapse into an array

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

/// Key holding an element's attributes.
pub const ATTRIBUTE_KEY: &str = "@";

/// Key holding an element's text when it also has attributes or children.
pub const TEXT_KEY: &str = "#";

#[derive(Debug, Default)]
struct Element {
    attributes: Map<String, Value>,
    children: Map<String, Value>,
    text: String,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, String> {
        let mut element = Element::default();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| format!("invalid attribute: {}", e))?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute
                .unescape_value()
                .map_err(|e| format!("invalid attribute value: {}", e))?;
            element.attributes.insert(key, Value::String(value.into_owned()));
        }
        Ok(element)
    }

    fn add_child(&mut self, name: String, value: Value) {
        match self.children.get_mut(&name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                self.children.insert(name, value);
            }
        }
    }

    fn into_value(self) -> Value {
        if self.attributes.is_empty() && self.children.is_empty() {
            return Value::String(self.text);
        }

        let mut object = Map::new();
        if !self.attributes.is_empty() {
            object.insert(ATTRIBUTE_KEY.to_string(), Value::Object(self.attributes));
        }
        for (name, value) in self.children {
            object.insert(name, value);
        }
        if !self.text.is_empty() {
            object.insert(TEXT_KEY.to_string(), Value::String(self.text));
        }
        Value::Object(object)
    }
}

/// Parse an XML document into a nested value.
pub fn parse(xml: &str) -> Result<Value, String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<(String, Element)> = Vec::new();
    let mut root: Option<Value> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| format!("XML parsing error at {}: {}", reader.buffer_position(), e))?;

        match event {
            Event::Start(ref e) => {
                let name = element_name(e);
                stack.push((name, Element::from_start(e)?));
            }
            Event::Empty(ref e) => {
                let name = element_name(e);
                let value = Element::from_start(e)?.into_value();
                attach(&mut stack, &mut root, name, value)?;
            }
            Event::End(_) => {
                let (name, element) = stack
                    .pop()
                    .ok_or_else(|| "unexpected closing tag".to_string())?;
                attach(&mut stack, &mut root, name, element.into_value())?;
            }
            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map_err(|e| format!("invalid text: {}", e))?;
                append_text(&mut stack, text);
            }
            Event::CData(e) => {
                let raw = e.into_inner();
                append_text(&mut stack, String::from_utf8_lossy(&raw));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err("unexpected end of document".to_string());
    }
    root.ok_or_else(|| "document has no root element".to_string())
}

fn element_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

fn attach(
    stack: &mut [(String, Element)],
    root: &mut Option<Value>,
    name: String,
    value: Value,
) -> Result<(), String> {
    match stack.last_mut() {
        Some((_, parent)) => {
            parent.add_child(name, value);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(value);
            Ok(())
        }
        None => Err(format!("second root element <{}>", name)),
    }
}

fn append_text(stack: &mut [(String, Element)], text: Cow<'_, str>) {
    // Text outside the root element is ignored.
    if let Some((_, element)) = stack.last_mut() {
        element.text.push_str(&text);
    }
}
