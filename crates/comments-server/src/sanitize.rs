//! Text sanitization for untrusted comment input.
//!
//! Rich text goes through two stages: `ammonia` drops script-bearing and unsafe
//! markup, then [`AllowList::filter`] walks the remaining tag stream and keeps
//! only the tags and attributes comments may carry. Plain-text fields lose all
//! markup.

use std::collections::HashMap;

/// Tags that are removed together with everything inside them.
const DROP_WITH_CONTENT: &[&str] = &["script", "style"];

const LINK_ATTRS: &[&str] = &["href", "title"];
const NO_ATTRS: &[&str] = &[];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr<'a> {
    /// Lowercased attribute name.
    pub name: String,
    /// Raw value with quotes removed, `None` for bare attributes.
    pub value: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    Text(&'a str),
    Open {
        name: String,
        attrs: Vec<Attr<'a>>,
        self_closing: bool,
    },
    Close {
        name: String,
    },
    /// `<!-- ... -->`, `<!DOCTYPE ...>`, `<?...>` and friends.
    Comment,
    /// A `<` that does not start a well-formed tag.
    StrayLt,
}

/// Splits markup into a flat token stream. Never fails: anything that is not a
/// complete tag becomes text or [`Token::StrayLt`].
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let Some(offset) = input[pos..].find('<') else {
            tokens.push(Token::Text(&input[pos..]));
            break;
        };
        let lt = pos + offset;
        if lt > pos {
            tokens.push(Token::Text(&input[pos..lt]));
        }

        match parse_markup(input, lt) {
            Some((token, end)) => {
                tokens.push(token);
                pos = end;
            }
            None => {
                tokens.push(Token::StrayLt);
                pos = lt + 1;
            }
        }
    }

    tokens
}

/// Parses the construct starting at `input[lt] == '<'`, returning the token
/// and the index just past it.
fn parse_markup(input: &str, lt: usize) -> Option<(Token<'_>, usize)> {
    let bytes = input.as_bytes();
    match bytes.get(lt + 1)? {
        b'!' | b'?' => {
            let end = if input[lt..].starts_with("<!--") {
                input[lt + 4..].find("-->").map(|i| lt + 4 + i + 3)
            } else {
                input[lt..].find('>').map(|i| lt + i + 1)
            };
            // An unterminated comment swallows the rest of the input.
            Some((Token::Comment, end.unwrap_or(input.len())))
        }
        b'/' => {
            let (name, after_name) = read_name(input, lt + 2)?;
            let gt = input[after_name..].find('>')? + after_name;
            Some((Token::Close { name }, gt + 1))
        }
        _ => {
            let (name, mut i) = read_name(input, lt + 1)?;
            let mut attrs = Vec::new();
            let mut self_closing = false;

            loop {
                i = skip_whitespace(bytes, i);
                match bytes.get(i)? {
                    b'>' => return Some((Token::Open { name, attrs, self_closing }, i + 1)),
                    b'/' => {
                        self_closing = bytes.get(i + 1) == Some(&b'>');
                        i += 1;
                    }
                    _ => {
                        let (attr, next) = read_attr(input, i)?;
                        attrs.push(attr);
                        i = next;
                    }
                }
            }
        }
    }
}

fn read_name(input: &str, start: usize) -> Option<(String, usize)> {
    let bytes = input.as_bytes();
    if !bytes.get(start)?.is_ascii_alphabetic() {
        return None;
    }
    let end = bytes[start..]
        .iter()
        .position(|b| !(b.is_ascii_alphanumeric() || *b == b'-'))
        .map_or(bytes.len(), |i| start + i);
    Some((input[start..end].to_ascii_lowercase(), end))
}

fn read_attr(input: &str, start: usize) -> Option<(Attr<'_>, usize)> {
    let bytes = input.as_bytes();
    let name_end = bytes[start..]
        .iter()
        .position(|b| b.is_ascii_whitespace() || matches!(b, b'=' | b'>' | b'/'))
        .map_or(bytes.len(), |i| start + i);
    // `<a =x>`: an attribute cannot start with '='.
    let name_end = if name_end == start { start + 1 } else { name_end };
    let name = input[start..name_end].to_ascii_lowercase();

    let mut i = skip_whitespace(bytes, name_end);
    if bytes.get(i) != Some(&b'=') {
        return Some((Attr { name, value: None }, name_end));
    }
    i = skip_whitespace(bytes, i + 1);

    match *bytes.get(i)? {
        quote @ (b'"' | b'\'') => {
            let close = input[i + 1..].find(quote as char)? + i + 1;
            let value = Some(&input[i + 1..close]);
            Some((Attr { name, value }, close + 1))
        }
        _ => {
            let end = bytes[i..]
                .iter()
                .position(|b| b.is_ascii_whitespace() || *b == b'>')
                .map_or(bytes.len(), |j| i + j);
            Some((Attr { name, value: Some(&input[i..end]) }, end))
        }
    }
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
        i += 1;
    }
    i
}

/// Tags and per-tag attributes that survive the second sanitization stage.
#[derive(Debug, Clone)]
pub struct AllowList {
    tags: HashMap<&'static str, &'static [&'static str]>,
    url_schemes: &'static [&'static str],
}

impl Default for AllowList {
    fn default() -> Self {
        Self {
            tags: HashMap::from([
                ("a", LINK_ATTRS),
                ("code", NO_ATTRS),
                ("i", NO_ATTRS),
                ("strong", NO_ATTRS),
            ]),
            url_schemes: &["http://", "https://", "mailto:"],
        }
    }
}

impl AllowList {
    pub fn allows_tag(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    #[cfg(test)]
    pub(crate) fn allows_attr(&self, tag: &str, attr: &str) -> bool {
        self.tags
            .get(tag)
            .is_some_and(|attrs| attrs.contains(&attr))
    }

    /// Absolute URLs must use a listed scheme. Relative URLs may not hide a
    /// scheme behind entity escapes.
    pub fn is_safe_url(&self, url: &str) -> bool {
        let url = url.trim();
        let lower = url.to_ascii_lowercase();
        if self.url_schemes.iter().any(|scheme| lower.starts_with(scheme)) {
            return true;
        }
        let without_amp = lower.replace("&amp;", "");
        !without_amp.contains(':')
            && !without_amp.contains('&')
            && !url.chars().any(char::is_control)
    }

    /// Rebuilds `input` keeping only allowed tags with their allowed
    /// attributes. Output is always balanced: stray closers are dropped and
    /// open tags are closed at the end.
    pub fn filter(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut open: Vec<String> = Vec::new();
        let mut skipping: Option<String> = None;

        for token in tokenize(input) {
            if let Some(until) = &skipping {
                if matches!(&token, Token::Close { name } if name == until) {
                    skipping = None;
                }
                continue;
            }

            match token {
                Token::Text(text) => out.push_str(text),
                Token::StrayLt => out.push_str("&lt;"),
                Token::Comment => {}
                Token::Open { name, .. } if DROP_WITH_CONTENT.contains(&name.as_str()) => {
                    skipping = Some(name);
                }
                Token::Open {
                    name,
                    attrs,
                    self_closing,
                } => {
                    if !self.allows_tag(&name) {
                        continue;
                    }
                    // Links do not nest: a new one closes the current one.
                    if name == "a" && open.iter().any(|t| t == "a") {
                        close_through(&mut out, &mut open, "a");
                    }
                    self.write_open(&mut out, &name, &attrs);
                    if self_closing {
                        write_close(&mut out, &name);
                    } else {
                        open.push(name);
                    }
                }
                Token::Close { name } => {
                    if open.iter().any(|t| *t == name) {
                        close_through(&mut out, &mut open, &name);
                    }
                }
            }
        }

        while let Some(name) = open.pop() {
            write_close(&mut out, &name);
        }
        out
    }

    fn write_open(&self, out: &mut String, name: &str, attrs: &[Attr<'_>]) {
        out.push('<');
        out.push_str(name);
        let Some(allowed) = self.tags.get(name) else {
            out.push('>');
            return;
        };
        // Allowed attributes in a fixed order, first occurrence wins.
        for allowed_name in allowed.iter() {
            let value = attrs
                .iter()
                .find(|attr| attr.name == *allowed_name)
                .and_then(|attr| attr.value);
            let Some(value) = value else { continue };
            if *allowed_name == "href" && !self.is_safe_url(value) {
                continue;
            }
            out.push(' ');
            out.push_str(allowed_name);
            out.push_str("=\"");
            push_attr_value(out, value);
            out.push('"');
        }
        out.push('>');
    }
}

fn close_through(out: &mut String, open: &mut Vec<String>, name: &str) {
    while let Some(top) = open.pop() {
        write_close(out, &top);
        if top == name {
            break;
        }
    }
}

fn write_close(out: &mut String, name: &str) {
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

/// Escapes the characters that could end the attribute or open a tag. `&` is
/// left alone so already-escaped values are not escaped twice.
fn push_attr_value(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

/// Both sanitization stages plus the plain-text cleaner, built once and shared.
pub struct Sanitizer {
    general: ammonia::Builder<'static>,
    plain: ammonia::Builder<'static>,
    allow_list: AllowList,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(AllowList::default())
    }
}

impl Sanitizer {
    pub fn new(allow_list: AllowList) -> Self {
        let mut general = ammonia::Builder::default();
        general.link_rel(None);

        let mut plain = ammonia::Builder::empty();
        plain.add_clean_content_tags(DROP_WITH_CONTENT);

        Self {
            general,
            plain,
            allow_list,
        }
    }

    #[cfg(test)]
    pub(crate) fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    /// Comment body: general cleanup, then the tag allow-list.
    pub fn rich_text(&self, input: &str) -> String {
        let cleaned = self.general.clean(input).to_string();
        self.allow_list.filter(&cleaned)
    }

    /// Author fields: no markup at all, remaining text HTML-escaped.
    pub fn plain_text(&self, input: &str) -> String {
        self.plain.clean(input).to_string().trim().to_string()
    }
}
