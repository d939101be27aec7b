//! Filename templates
//!
//! A template is plain text with `{name}` or `{name:spec}` placeholders. The
//! spec follows the familiar format mini-language
//! `[[fill]align][sign][#][0][width][,|_][.precision][type]`, so
//! `{position:03d}` renders position 7 as `007`. `{{` and `}}` are literal
//! braces.
//!
//! Rendering is total. A placeholder naming an absent keyword renders as the
//! empty string, and a directive that does not fit the value (or does not
//! parse) falls back to the value's plain text.

use bdl_engine::{MetaValue, Metadata};

/// Template used when a repository does not name one.
pub const DEFAULT_TEMPLATE: &str = "{position}.{extension}";

/// Widths and precisions beyond this are treated as malformed.
const MAX_WIDTH: usize = 255;

/// Render `template` with the given keywords.
pub fn render(template: &str, keywords: &Metadata) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(i) = rest.find(['{', '}']) {
        out.push_str(&rest[..i]);
        let tail = &rest[i..];

        if let Some(after) = tail.strip_prefix("{{") {
            out.push('{');
            rest = after;
        } else if let Some(after) = tail.strip_prefix("}}") {
            out.push('}');
            rest = after;
        } else if let Some(after) = tail.strip_prefix('}') {
            out.push('}');
            rest = after;
        } else {
            match tail[1..].find('}') {
                Some(end) => {
                    out.push_str(&render_field(&tail[1..1 + end], keywords));
                    rest = &tail[end + 2..];
                }
                // Unterminated placeholder stays literal
                None => {
                    out.push_str(tail);
                    rest = "";
                }
            }
        }
    }

    out.push_str(rest);
    out
}

fn field_name(field: &str) -> &str {
    let name = field.split_once(':').map_or(field, |(name, _)| name);
    name.split_once('!').map_or(name, |(name, _)| name).trim()
}

fn render_field(field: &str, keywords: &Metadata) -> String {
    let spec = field.split_once(':').map_or("", |(_, spec)| spec);
    let Some(value) = keywords.get(field_name(field)) else {
        return String::new();
    };
    match FormatSpec::parse(spec) {
        Some(spec) => spec.apply(value),
        None => value.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
    Center,
    /// Padding goes between the sign and the digits
    AfterSign,
}

impl Align {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '<' => Some(Self::Left),
            '>' => Some(Self::Right),
            '^' => Some(Self::Center),
            '=' => Some(Self::AfterSign),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Sign {
    #[default]
    Minus,
    Plus,
    Space,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct FormatSpec {
    fill: Option<char>,
    align: Option<Align>,
    sign: Sign,
    alternate: bool,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

impl FormatSpec {
    /// Parse a spec; `None` when it is malformed.
    fn parse(spec: &str) -> Option<Self> {
        let chars: Vec<char> = spec.chars().collect();
        let mut out = Self::default();
        let mut i = 0;

        if let Some(align) = chars.get(1).copied().and_then(Align::from_char) {
            out.fill = Some(chars[0]);
            out.align = Some(align);
            i = 2;
        } else if let Some(align) = chars.first().copied().and_then(Align::from_char) {
            out.align = Some(align);
            i = 1;
        }

        match chars.get(i) {
            Some('+') => {
                out.sign = Sign::Plus;
                i += 1;
            }
            Some(' ') => {
                out.sign = Sign::Space;
                i += 1;
            }
            Some('-') => i += 1,
            _ => {}
        }
        if chars.get(i) == Some(&'#') {
            out.alternate = true;
            i += 1;
        }
        if chars.get(i) == Some(&'0') {
            out.zero = true;
            i += 1;
        }

        let (width, next) = digits(&chars, i)?;
        out.width = width.unwrap_or(0);
        i = next;

        if let Some(&sep @ (',' | '_')) = chars.get(i) {
            out.grouping = Some(sep);
            i += 1;
        }
        if chars.get(i) == Some(&'.') {
            let (precision, next) = digits(&chars, i + 1)?;
            out.precision = Some(precision?);
            i = next;
        }
        if let Some(&kind) = chars.get(i)
            && "bdeEfFgGnosxX%".contains(kind)
        {
            out.kind = Some(kind);
            i += 1;
        }

        (i == chars.len()).then_some(out)
    }

    fn apply(&self, value: &MetaValue) -> String {
        match self.kind {
            Some('d' | 'n' | 'b' | 'o' | 'x' | 'X') => match integer_of(value) {
                Some(n) => self.format_integer(n),
                None => self.format_text(&value.to_string()),
            },
            Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%') => match float_of(value) {
                Some(x) => self.format_float(x),
                None => self.format_text(&value.to_string()),
            },
            _ => match value {
                MetaValue::Integer(n) if self.kind.is_none() => self.format_integer(*n),
                MetaValue::Float(x) if self.kind.is_none() => self.format_float(*x),
                other => self.format_text(&other.to_string()),
            },
        }
    }

    fn format_integer(&self, n: i64) -> String {
        let magnitude = n.unsigned_abs();
        let (digits, prefix) = match self.kind {
            Some('b') => (format!("{magnitude:b}"), "0b"),
            Some('o') => (format!("{magnitude:o}"), "0o"),
            Some('x') => (format!("{magnitude:x}"), "0x"),
            Some('X') => (format!("{magnitude:X}"), "0X"),
            _ => (magnitude.to_string(), ""),
        };
        let digits = match self.grouping {
            Some(sep) => group(&digits, sep, if prefix.is_empty() { 3 } else { 4 }),
            None => digits,
        };
        let prefix = if self.alternate { prefix } else { "" };
        self.pad_number(n < 0, prefix, &digits)
    }

    fn format_float(&self, x: f64) -> String {
        let magnitude = x.abs();
        let precision = self.precision.map(|p| p.min(MAX_WIDTH));
        let body = match self.kind {
            Some('f' | 'F') => format!("{:.*}", precision.unwrap_or(6), magnitude),
            Some('e') => exponent(magnitude, precision.unwrap_or(6), false),
            Some('E') => exponent(magnitude, precision.unwrap_or(6), true),
            Some('%') => format!("{:.*}%", precision.unwrap_or(6), magnitude * 100.0),
            _ => match precision {
                Some(p) => format!("{magnitude:.p$}"),
                None => magnitude.to_string(),
            },
        };
        let body = match self.grouping {
            Some(sep) => {
                let split = body.find(|c: char| !c.is_ascii_digit()).unwrap_or(body.len());
                let (int, frac) = body.split_at(split);
                format!("{}{}", group(int, sep, 3), frac)
            }
            None => body,
        };
        self.pad_number(x.is_sign_negative() && !x.is_nan(), "", &body)
    }

    fn pad_number(&self, negative: bool, prefix: &str, digits: &str) -> String {
        let sign = match (negative, self.sign) {
            (true, _) => "-",
            (false, Sign::Plus) => "+",
            (false, Sign::Space) => " ",
            (false, Sign::Minus) => "",
        };
        let fill = self.fill.or(self.zero.then_some('0')).unwrap_or(' ');
        let align = self
            .align
            .unwrap_or(if self.zero { Align::AfterSign } else { Align::Right });

        if align == Align::AfterSign {
            let used = sign.len() + prefix.len() + digits.chars().count();
            let padding: String =
                std::iter::repeat_n(fill, self.width.saturating_sub(used)).collect();
            return format!("{sign}{prefix}{padding}{digits}");
        }
        pad(&format!("{sign}{prefix}{digits}"), fill, align, self.width)
    }

    fn format_text(&self, text: &str) -> String {
        let text: String = match self.precision {
            Some(p) => text.chars().take(p).collect(),
            None => text.to_string(),
        };
        let fill = self.fill.or(self.zero.then_some('0')).unwrap_or(' ');
        let align = match self.align {
            None | Some(Align::AfterSign) => Align::Left,
            Some(align) => align,
        };
        pad(&text, fill, align, self.width)
    }
}

/// Parse a run of ASCII digits at `start`.
///
/// Returns `None` for out-of-range numbers, `Some((None, start))` when there
/// are no digits.
fn digits(chars: &[char], start: usize) -> Option<(Option<usize>, usize)> {
    let end = chars[start.min(chars.len())..]
        .iter()
        .position(|c| !c.is_ascii_digit())
        .map_or(chars.len(), |offset| start + offset);
    if end <= start {
        return Some((None, start));
    }
    let number: String = chars[start..end].iter().collect();
    let value = number.parse::<usize>().ok().filter(|v| *v <= MAX_WIDTH)?;
    Some((Some(value), end))
}

fn integer_of(value: &MetaValue) -> Option<i64> {
    match value {
        MetaValue::Text(s) => s.trim().parse().ok(),
        other => other.as_i64(),
    }
}

fn float_of(value: &MetaValue) -> Option<f64> {
    match value {
        MetaValue::Text(s) => s.trim().parse().ok(),
        other => other.as_f64(),
    }
}

fn exponent(x: f64, precision: usize, upper: bool) -> String {
    let raw = format!("{x:.precision$e}");
    let Some((mantissa, exp)) = raw.split_once('e') else {
        return raw;
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    let sign = if exp < 0 { '-' } else { '+' };
    let e = if upper { 'E' } else { 'e' };
    format!("{mantissa}{e}{sign}{:02}", exp.unsigned_abs())
}

fn group(digits: &str, sep: char, every: usize) -> String {
    let chars: Vec<char> = digits.chars().collect();
    let mut out = String::with_capacity(chars.len() + chars.len() / every);
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % every == 0 {
            out.push(sep);
        }
        out.push(*c);
    }
    out
}

fn pad(text: &str, fill: char, align: Align, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    let total = width - len;
    let (left, right) = match align {
        Align::Left => (0, total),
        Align::Right | Align::AfterSign => (total, 0),
        Align::Center => (total / 2, total - total / 2),
    };
    let mut out = String::with_capacity(width);
    out.extend(std::iter::repeat_n(fill, left));
    out.push_str(text);
    out.extend(std::iter::repeat_n(fill, right));
    out
}
