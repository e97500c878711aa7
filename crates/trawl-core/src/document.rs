use std::borrow::Cow;
use std::collections::BTreeMap;

use encoding_rs::{Encoding, UTF_8};
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use serde_json::Value;

use crate::error::JobError;
use crate::script::ScriptError;

/// Parsed response body that scraper scripts query with CSS selectors.
pub struct Document {
    html: Html,
}

impl Document {
    /// Parse a response body, decoding it per [`decode_body`].
    ///
    /// The HTML parser itself recovers from malformed markup; a body that is not
    /// text at all is reported as a parse fault.
    pub fn parse(body: &[u8], content_type: Option<&str>) -> Result<Self, JobError> {
        let text = decode_body(body, content_type)?;

        let html = Html::parse_document(&text);
        if !html.errors.is_empty() {
            tracing::debug!(errors = html.errors.len(), "Recovered from malformed markup");
        }
        Ok(Self { html })
    }

    /// Underlying `scraper` tree for queries the helpers below don't cover.
    pub fn html(&self) -> &Html {
        &self.html
    }

    /// All elements matching `css`, in document order.
    pub fn select(&self, css: &str) -> Result<Vec<ElementRef<'_>>, ScriptError> {
        let selector = parse_selector(css)?;
        Ok(self.html.select(&selector).collect())
    }

    /// Retrieve one value per element matched by `iterator`.
    pub fn scrape(&self, iterator: &str, retriever: &Retriever) -> Result<Value, ScriptError> {
        let selector = parse_selector(iterator)?;
        let items = self
            .html
            .select(&selector)
            .map(|el| retriever.retrieve(el))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Array(items))
    }

    /// Like [`scrape`](Self::scrape) but only for the first match (`null` if none).
    pub fn scrape_one(&self, iterator: &str, retriever: &Retriever) -> Result<Value, ScriptError> {
        let selector = parse_selector(iterator)?;
        match self.html.select(&selector).next() {
            Some(el) => retriever.retrieve(el),
            None => Ok(Value::Null),
        }
    }
}

fn parse_selector(css: &str) -> Result<Selector, ScriptError> {
    Selector::parse(css).map_err(|e| ScriptError::new(format!("invalid selector '{css}': {e}")))
}

/// What to pull out of each matched element.
///
/// A bare string is a method (`"text"`, `"html"`) or an attribute name; an
/// object builds one record per element.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Retriever {
    Method(String),
    Fields(BTreeMap<String, Field>),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Field {
    Method(String),
    Spec(FieldSpec),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FieldSpec {
    /// Sub-selector evaluated inside the iterated element.
    pub sel: Option<String>,
    pub attr: Option<String>,
    pub method: Option<String>,
    /// Used when the target is missing or yields an empty value.
    pub default_value: Option<Value>,
}

impl Retriever {
    pub fn attr(name: impl Into<String>) -> Self {
        Retriever::Method(name.into())
    }

    pub fn text() -> Self {
        Retriever::Method("text".into())
    }

    fn retrieve(&self, el: ElementRef<'_>) -> Result<Value, ScriptError> {
        match self {
            Retriever::Method(method) => Ok(apply_method(el, method)),
            Retriever::Fields(fields) => {
                let mut record = serde_json::Map::new();
                for (name, field) in fields {
                    record.insert(name.clone(), field.retrieve(el)?);
                }
                Ok(Value::Object(record))
            }
        }
    }
}

impl Field {
    fn retrieve(&self, el: ElementRef<'_>) -> Result<Value, ScriptError> {
        match self {
            Field::Method(method) => Ok(apply_method(el, method)),
            Field::Spec(spec) => spec.retrieve(el),
        }
    }
}

impl FieldSpec {
    fn retrieve(&self, el: ElementRef<'_>) -> Result<Value, ScriptError> {
        let target = match &self.sel {
            Some(css) => el.select(&parse_selector(css)?).next(),
            None => Some(el),
        };

        let value = match target {
            Some(target) => match (&self.attr, &self.method) {
                (Some(attr), _) => attr_value(target, attr),
                (None, Some(method)) => apply_method(target, method),
                (None, None) => text_value(target),
            },
            None => Value::Null,
        };

        let empty = match &value {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        };
        match (&self.default_value, empty) {
            (Some(default), true) => Ok(default.clone()),
            _ => Ok(value),
        }
    }
}

/// Decode a response body to text.
///
/// A byte order mark wins, then the `charset` of `content_type`, then UTF-8.
/// Malformed sequences become U+FFFD. Only a body that decodes to text with
/// NUL characters in it (binary content) is a parse fault.
pub fn decode_body<'a>(
    body: &'a [u8],
    content_type: Option<&str>,
) -> Result<Cow<'a, str>, JobError> {
    let declared = content_type.and_then(charset).unwrap_or(UTF_8);
    let (text, encoding, had_errors) = declared.decode(body);
    if had_errors {
        tracing::debug!(encoding = encoding.name(), "Replaced malformed sequences in body");
    }
    if text.contains('\0') {
        return Err(JobError::Parse(format!(
            "response body is binary, not {} text",
            encoding.name()
        )));
    }
    Ok(text)
}

fn charset(content_type: &str) -> Option<&'static Encoding> {
    let parsed: mime::Mime = content_type.parse().ok()?;
    let label = parsed.get_param(mime::CHARSET)?;
    Encoding::for_label(label.as_str().as_bytes())
}

fn apply_method(el: ElementRef<'_>, method: &str) -> Value {
    match method {
        "text" => text_value(el),
        "html" => Value::String(el.inner_html()),
        attr => attr_value(el, attr),
    }
}

fn text_value(el: ElementRef<'_>) -> Value {
    Value::String(el.text().collect::<String>().trim().to_string())
}

fn attr_value(el: ElementRef<'_>, attr: &str) -> Value {
    el.value()
        .attr(attr)
        .map_or(Value::Null, |v| Value::String(v.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAGE: &str = r#"
        <html><body>
          <ul class="url-list">
            <li><a href="http://nicesite.com">Nice</a></li>
            <li><a href="http://awesomesite.com">Awesome</a></li>
            <li><a>Missing</a></li>
          </ul>
          <div class="card"><h3> First </h3><span class="date">2014</span></div>
          <div class="card"><h3>Second</h3></div>
        </body></html>
    "#;

    fn doc() -> Document {
        Document::parse(PAGE.as_bytes(), None).unwrap()
    }

    #[test]
    fn test_scrape_attribute() {
        let data = doc().scrape(".url-list a", &Retriever::attr("href")).unwrap();
        assert_eq!(
            data,
            json!(["http://nicesite.com", "http://awesomesite.com", null])
        );
    }

    #[test]
    fn test_scrape_text_is_trimmed() {
        let data = doc().scrape(".card h3", &Retriever::text()).unwrap();
        assert_eq!(data, json!(["First", "Second"]));
    }

    #[test]
    fn test_scrape_records_with_defaults() {
        let retriever: Retriever = serde_json::from_value(json!({
            "title": {"sel": "h3"},
            "date": {"sel": ".date", "defaultValue": "n/a"},
            "markup": {"sel": "h3", "method": "html"}
        }))
        .unwrap();

        let data = doc().scrape(".card", &retriever).unwrap();
        assert_eq!(
            data,
            json!([
                {"title": "First", "date": "2014", "markup": " First "},
                {"title": "Second", "date": "n/a", "markup": "Second"}
            ])
        );
    }

    #[test]
    fn test_scrape_one() {
        let d = doc();
        assert_eq!(
            d.scrape_one(".url-list a", &Retriever::attr("href")).unwrap(),
            json!("http://nicesite.com")
        );
        assert_eq!(d.scrape_one(".nothing", &Retriever::text()).unwrap(), Value::Null);
    }

    #[test]
    fn test_invalid_selector_is_script_error() {
        let err = doc().scrape("a[", &Retriever::text()).unwrap_err();
        assert!(err.to_string().contains("invalid selector"));
        assert!(doc().select(":::").is_err());
    }

    #[test]
    fn test_malformed_markup_still_parses() {
        let d = Document::parse(b"<div><p>unclosed <b>bold</div>", None).unwrap();
        assert_eq!(d.select("b").unwrap().len(), 1);
    }

    #[test]
    fn test_bom_is_stripped() {
        let body = [b"\xEF\xBB\xBF".as_slice(), b"<p class='x'>hi</p>".as_slice()].concat();
        let d = Document::parse(&body, None).unwrap();
        assert_eq!(d.scrape(".x", &Retriever::text()).unwrap(), json!(["hi"]));
    }

    #[test]
    fn test_declared_charset_is_decoded() {
        let body = b"<ul class='url-list'><li><a href='http://nicesite.com'>Caf\xe9</a></li></ul>";
        let d = Document::parse(body, Some("text/html; charset=iso-8859-1")).unwrap();
        assert_eq!(
            d.scrape("a", &Retriever::attr("href")).unwrap(),
            json!(["http://nicesite.com"])
        );
        assert_eq!(d.scrape("a", &Retriever::text()).unwrap(), json!(["Caf\u{e9}"]));
    }

    #[test]
    fn test_undeclared_latin1_is_decoded_lossily() {
        let d = Document::parse(b"<p class='x'>Caf\xe9</p>", Some("text/html")).unwrap();
        assert_eq!(d.scrape(".x", &Retriever::text()).unwrap(), json!(["Caf\u{fffd}"]));
    }

    #[test]
    fn test_bom_overrides_declared_charset() {
        let mut body = vec![0xFF, 0xFE];
        body.extend("<p>hi</p>".encode_utf16().flat_map(u16::to_le_bytes));
        let text = decode_body(&body, Some("text/html; charset=utf-8")).unwrap();
        assert_eq!(text, "<p>hi</p>");
    }

    #[test]
    fn test_charset_lookup() {
        assert_eq!(charset("text/html; charset=Shift_JIS"), Some(encoding_rs::SHIFT_JIS));
        assert_eq!(charset("text/html;charset=latin1"), Some(encoding_rs::WINDOWS_1252));
        assert_eq!(charset("text/html"), None);
        assert_eq!(charset("text/html; charset=no-such-thing"), None);
        assert_eq!(charset("not a mime type"), None);
    }

    #[test]
    fn test_binary_body_is_parse_fault() {
        let err = Document::parse(&[0x00, 0x01, 0xff, 0x00], None).err().unwrap();
        assert!(matches!(err, JobError::Parse(_)));
        assert!(err.to_string().starts_with("parse-error: "));
    }
}
