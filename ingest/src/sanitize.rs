use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use ammonia::Builder;

/// Tags preserved in sanitized message bodies. Everything else is stripped,
/// keeping inner text (script/style contents are dropped entirely).
pub const ALLOWED_TAGS: &[&str] = &[
    "b", "i", "u", "em", "strong", "a", "br", "p", "ul", "ol", "li", "span", "div", "pre",
    "code", "blockquote",
];

/// CSS properties preserved inside `style` attributes.
pub const ALLOWED_CSS_PROPERTIES: &[&str] = &[
    "color",
    "background-color",
    "font-family",
    "font-size",
    "font-weight",
    "font-style",
    "text-decoration",
    "text-align",
    "margin",
    "margin-left",
    "margin-right",
    "margin-top",
    "margin-bottom",
    "padding",
    "padding-left",
    "padding-right",
    "padding-top",
    "padding-bottom",
    "border",
    "border-radius",
    "width",
    "height",
    "line-height",
];

/// Sanitize untrusted message HTML down to the allow-list. Pure and
/// idempotent: cleaning already-clean output yields the same string.
pub fn sanitize_html(input: &str) -> String {
    builder().clean(input).to_string()
}

fn builder() -> Builder<'static> {
    let mut tag_attributes: HashMap<&str, HashSet<&str>> = HashMap::new();
    tag_attributes.insert("a", ["href", "title", "target"].into_iter().collect());
    for tag in ["span", "div", "p", "pre"] {
        tag_attributes.insert(tag, ["style", "class"].into_iter().collect());
    }

    let mut b = Builder::default();
    b.tags(ALLOWED_TAGS.iter().copied().collect())
        .generic_attributes(HashSet::new())
        .tag_attributes(tag_attributes)
        .url_schemes(["http", "https", "mailto"].into_iter().collect())
        .link_rel(None)
        .attribute_filter(|_tag, attr, value| {
            if attr != "style" {
                return Some(Cow::Borrowed(value));
            }
            let filtered = filter_css(value);
            if filtered.is_empty() {
                None
            } else {
                Some(Cow::Owned(filtered))
            }
        });
    b
}

/// Keep only allow-listed properties from an inline style declaration.
/// Output is normalized ("prop: value; ...") so re-filtering is a no-op.
fn filter_css(style: &str) -> String {
    style
        .split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let prop = prop.trim().to_ascii_lowercase();
            let value = value.trim();
            if value.is_empty() || !ALLOWED_CSS_PROPERTIES.contains(&prop.as_str()) {
                return None;
            }
            Some(format!("{}: {}", prop, value))
        })
        .collect::<Vec<_>>()
        .join("; ")
}
