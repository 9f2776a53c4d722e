//! Output path templating and filename sanitization.
//!
//! Templates use `%(field)s` placeholders. Supported fields are `title`, `id`
//! and `ext`. Substituted values are sanitized; the literal template text is
//! kept as-is, so a template may contain directory separators.

use std::path::{Path, PathBuf};

use vidfetch_extractor::{Format, MediaInfo};

/// Longest file name component produced, in bytes.
pub const MAX_NAME_BYTES: usize = 200;

/// What a character turns into inside a file name.
enum Replacement {
    Keep(char),
    Space,
    Underscore,
}

fn classify(c: char) -> Replacement {
    match c {
        '"' => Replacement::Keep('\''),
        '<' | '>' | ':' | '/' | '\\' | '|' | '?' | '*' => Replacement::Underscore,
        c if c.is_control() || c.is_whitespace() => Replacement::Space,
        c => Replacement::Keep(c),
    }
}

/// `CON`, `PRN`, `AUX`, `NUL`, `COM1`-`COM9` and `LPT1`-`LPT9`, in any case.
fn is_reserved_device_name(stem: &str) -> bool {
    let upper = stem.to_ascii_uppercase();
    match upper.as_bytes() {
        b"CON" | b"PRN" | b"AUX" | b"NUL" => true,
        [b'C', b'O', b'M', digit] | [b'L', b'P', b'T', digit] => (b'1'..=b'9').contains(digit),
        _ => false,
    }
}

/// Cut `name` to at most `max` bytes without splitting a character.
fn truncate_on_char_boundary(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Make a metadata value safe as a file name component on every platform.
///
/// Path separators and the other characters Windows rejects become `_`.
/// Double quotes become single quotes. Whitespace and control characters
/// fold into single spaces. The result is capped at [`MAX_NAME_BYTES`],
/// stripped of surrounding spaces and dots, and a reserved device name gets
/// a `_` prefix. An empty result becomes `unnamed`.
///
/// # Examples
///
/// ```
/// use vidfetch_engine::output::sanitize_filename;
///
/// assert_eq!(sanitize_filename("hello?world"), "hello_world");
/// assert_eq!(sanitize_filename(""), "unnamed");
/// assert_eq!(sanitize_filename("CON"), "_CON");
/// ```
pub fn sanitize_filename(input: &str) -> String {
    let mut name = String::with_capacity(input.len());
    for c in input.chars() {
        match classify(c) {
            Replacement::Keep(c) => name.push(c),
            Replacement::Space if name.ends_with(' ') => {}
            Replacement::Space => name.push(' '),
            Replacement::Underscore if name.ends_with('_') => {}
            Replacement::Underscore => name.push('_'),
        }
    }

    let name = truncate_on_char_boundary(&name, MAX_NAME_BYTES)
        .trim_matches(|c| c == ' ' || c == '.');
    if name.is_empty() {
        return "unnamed".to_string();
    }

    let stem = name.split('.').next().unwrap_or(name);
    if is_reserved_device_name(stem) {
        format!("_{name}")
    } else {
        name.to_string()
    }
}

fn field<'a>(name: &str, info: &'a MediaInfo, format: &'a Format) -> Option<&'a str> {
    match name {
        "title" => Some(info.title.as_str()),
        "id" => Some(info.id.as_str()),
        "ext" => Some(format.ext()),
        _ => None,
    }
}

/// Substitute the placeholders of `template` in one pass.
///
/// Substituted text is never scanned again, so a title containing `%(id)s`
/// stays literal. Unknown placeholders are kept as written.
pub fn render_template(template: &str, info: &MediaInfo, format: &Format) -> String {
    let mut rendered = String::with_capacity(template.len() + info.title.len());
    let mut rest = template;

    while let Some(open) = rest.find("%(") {
        rendered.push_str(&rest[..open]);
        let tail = &rest[open + 2..];
        let Some(close) = tail.find(")s") else {
            rest = &rest[open..];
            break;
        };

        match field(&tail[..close], info, format) {
            Some(value) => rendered.push_str(&sanitize_filename(value)),
            None => rendered.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &tail[close + 2..];
    }

    rendered.push_str(rest);
    rendered
}

/// Final output path: the rendered template, relative to `output_dir` unless
/// it is absolute.
pub fn output_path(template: &str, output_dir: &Path, info: &MediaInfo, format: &Format) -> PathBuf {
    let rendered = PathBuf::from(render_template(template, info, format));
    if rendered.is_absolute() {
        rendered
    } else {
        output_dir.join(rendered)
    }
}
