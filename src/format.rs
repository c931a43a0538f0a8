//! printf-style event message formatting
//!
//! Event records carry their arguments as packed big-endian bytes. Each
//! conversion in the template consumes the next argument: `hh` one byte, `h`
//! two, no modifier or `l` four, `ll` eight. Floating conversions always
//! consume an eight-byte double, and `%s` consumes a NUL-terminated string
//! including its terminator.
//!
//! Floating conversions follow C printf: `%e` pads the exponent to two
//! digits and `%g` defaults to six significant digits, so 123.438743 renders
//! as `1.234387e+02` and `123.439`. Some JavaScript sprintf ports print
//! `1.23438743e+2` and `123.438743` for the same input; messages rendered by
//! such tools will not match byte for byte.
//!
//! ```rust
//! use downlink::format::format_event_message;
//!
//! let message = format_event_message(Some("%s rebooted %hhu times"), "reboot", b"EPS\0\x03");
//! assert_eq!(message, "EPS rebooted 3 times");
//! ```

/// Format an event message, or return `fallback` when there is no template
/// or no argument data.
pub fn format_event_message(template: Option<&str>, fallback: &str, args: &[u8]) -> String {
    match template {
        Some(template) if !args.is_empty() => EventMessageFormatter::new(args).format(template),
        _ => fallback.to_string(),
    }
}

/// Walks a template, consuming argument bytes left to right.
#[derive(Debug)]
pub struct EventMessageFormatter<'a> {
    args: &'a [u8],
    cursor: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct Flags {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    alternate: bool,
}

#[derive(Debug, Clone, Copy)]
struct Spec {
    flags: Flags,
    width: usize,
    precision: Option<usize>,
    size: usize,
    conversion: char,
}

impl<'a> EventMessageFormatter<'a> {
    pub fn new(args: &'a [u8]) -> Self {
        Self { args, cursor: 0 }
    }

    /// Bytes consumed so far.
    pub fn consumed(&self) -> usize {
        self.cursor
    }

    /// Substitute every conversion in `template`.
    ///
    /// A conversion whose argument would run past the end of the argument
    /// bytes is left in the output verbatim.
    pub fn format(&mut self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(pos) = rest.find('%') {
            out.push_str(&rest[..pos]);
            rest = &rest[pos..];

            if let Some(tail) = rest.strip_prefix("%%") {
                out.push('%');
                rest = tail;
                continue;
            }

            match parse_spec(rest) {
                Some((spec, len)) => {
                    match self.render(&spec) {
                        Some(text) => out.push_str(&text),
                        None => out.push_str(&rest[..len]),
                    }
                    rest = &rest[len..];
                }
                None => {
                    out.push('%');
                    rest = &rest[1..];
                }
            }
        }

        out.push_str(rest);
        out
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let bytes = self.args.get(self.cursor..self.cursor.checked_add(n)?)?;
        self.cursor += n;
        Some(bytes)
    }

    fn take_unsigned(&mut self, n: usize) -> Option<u64> {
        Some(self.take(n)?.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    fn take_signed(&mut self, n: usize) -> Option<i64> {
        let raw = self.take_unsigned(n)?;
        let shift = 64 - (n as u32) * 8;
        Some(((raw << shift) as i64) >> shift)
    }

    fn take_string(&mut self) -> Option<String> {
        let remaining = self.args.get(self.cursor..)?;
        let end = remaining.iter().position(|b| *b == 0);
        let text = String::from_utf8_lossy(&remaining[..end.unwrap_or(remaining.len())]).into_owned();
        self.cursor += end.map_or(remaining.len(), |e| e + 1);
        Some(text)
    }

    fn render(&mut self, spec: &Spec) -> Option<String> {
        let body = match spec.conversion {
            'd' | 'i' => {
                let v = self.take_signed(spec.size)?;
                signed_body(v.unsigned_abs().to_string(), v < 0, spec)
            }
            'u' => signed_body(self.take_unsigned(spec.size)?.to_string(), false, spec),
            'x' | 'X' => {
                let v = self.take_unsigned(spec.size)?;
                let digits =
                    if spec.conversion == 'x' { format!("{v:x}") } else { format!("{v:X}") };
                let digits = pad_precision(digits, spec.precision);
                let prefix = match (spec.flags.alternate && v != 0, spec.conversion) {
                    (true, 'x') => "0x",
                    (true, _) => "0X",
                    _ => "",
                };
                (prefix.to_string(), digits)
            }
            'c' => {
                let v = self.take_unsigned(spec.size)?;
                let c = u32::try_from(v).ok().and_then(char::from_u32).unwrap_or('\u{FFFD}');
                (String::new(), c.to_string())
            }
            's' => {
                let mut text = self.take_string()?;
                if let Some(p) = spec.precision {
                    text = text.chars().take(p).collect();
                }
                (String::new(), text)
            }
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
                let bytes = self.take(8)?;
                let mut b = [0u8; 8];
                b.copy_from_slice(bytes);
                let v = f64::from_be_bytes(b);
                let digits = format_float(v.abs(), spec);
                let sign = sign_prefix(v.is_sign_negative() && !v.is_nan(), spec.flags);
                (sign.to_string(), digits)
            }
            _ => return None,
        };
        Some(pad(body, spec))
    }
}

/// Parse `%[flags][width][.precision][length]conv` at the start of `s`.
fn parse_spec(s: &str) -> Option<(Spec, usize)> {
    let bytes = s.as_bytes();
    let mut i = 1;
    let mut flags = Flags::default();
    while let Some(b) = bytes.get(i) {
        match *b {
            b'-' => flags.left = true,
            b'0' => flags.zero = true,
            b'+' => flags.plus = true,
            b' ' => flags.space = true,
            b'#' => flags.alternate = true,
            _ => break,
        }
        i += 1;
    }

    let digits = |i: &mut usize| {
        let start = *i;
        while bytes.get(*i).is_some_and(u8::is_ascii_digit) {
            *i += 1;
        }
        s[start..*i].parse::<usize>().ok()
    };
    let width = digits(&mut i).unwrap_or(0);
    let precision = if bytes.get(i) == Some(&b'.') {
        i += 1;
        Some(digits(&mut i).unwrap_or(0))
    } else {
        None
    };

    let size = if s[i..].starts_with("hh") {
        i += 2;
        1
    } else if s[i..].starts_with("ll") {
        i += 2;
        8
    } else if s[i..].starts_with('h') {
        i += 1;
        2
    } else if s[i..].starts_with('l') {
        i += 1;
        4
    } else {
        4
    };

    let conversion = char::from(*bytes.get(i)?);
    if !"cdiuxXfFeEgGs".contains(conversion) {
        return None;
    }
    Some((Spec { flags, width, precision, size, conversion }, i + 1))
}

fn sign_prefix(negative: bool, flags: Flags) -> &'static str {
    if negative {
        "-"
    } else if flags.plus {
        "+"
    } else if flags.space {
        " "
    } else {
        ""
    }
}

fn signed_body(digits: String, negative: bool, spec: &Spec) -> (String, String) {
    (sign_prefix(negative, spec.flags).to_string(), pad_precision(digits, spec.precision))
}

fn pad_precision(digits: String, precision: Option<usize>) -> String {
    match precision {
        Some(p) if digits.len() < p => format!("{}{digits}", "0".repeat(p - digits.len())),
        _ => digits,
    }
}

/// Apply width, placing zero padding between the prefix and the digits.
fn pad((prefix, digits): (String, String), spec: &Spec) -> String {
    let len = prefix.chars().count() + digits.chars().count();
    if len >= spec.width {
        return prefix + &digits;
    }
    let fill = spec.width - len;
    let integer = matches!(spec.conversion, 'd' | 'i' | 'u' | 'x' | 'X');
    let zero_allowed = !matches!(spec.conversion, 'c' | 's') && !(integer && spec.precision.is_some());

    if spec.flags.left {
        format!("{prefix}{digits}{}", " ".repeat(fill))
    } else if spec.flags.zero && zero_allowed {
        format!("{prefix}{}{digits}", "0".repeat(fill))
    } else {
        format!("{}{prefix}{digits}", " ".repeat(fill))
    }
}

/// Format a non-negative magnitude per `%f`, `%e` or `%g`.
fn format_float(v: f64, spec: &Spec) -> String {
    let upper = spec.conversion.is_ascii_uppercase();
    if !v.is_finite() {
        let text = if v.is_nan() { "nan" } else { "inf" };
        return if upper { text.to_uppercase() } else { text.to_string() };
    }

    let precision = spec.precision.unwrap_or(6);
    let text = match spec.conversion.to_ascii_lowercase() {
        'f' => format!("{v:.precision$}"),
        'e' => exponential(v, precision),
        _ => general(v, precision, spec.flags.alternate),
    };
    if upper { text.to_uppercase() } else { text }
}

/// `d.ddde±XX` with at least two exponent digits.
fn exponential(v: f64, precision: usize) -> String {
    let text = format!("{v:.precision$e}");
    match text.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.unsigned_abs())
        }
        None => text,
    }
}

fn general(v: f64, precision: usize, alternate: bool) -> String {
    let p = precision.max(1);
    // Exponent after rounding to `p` significant digits
    let rounded = format!("{v:.prec$e}", prec = p - 1);
    let exp: i32 = rounded.split_once('e').and_then(|(_, e)| e.parse().ok()).unwrap_or(0);

    let text = if exp < -4 || exp >= p as i32 {
        exponential(v, p - 1)
    } else {
        let decimals = (p as i32 - 1 - exp).max(0) as usize;
        format!("{v:.decimals$}")
    };
    if alternate { text } else { strip_trailing_zeros(&text) }
}

fn strip_trailing_zeros(text: &str) -> String {
    let (mantissa, exponent) = match text.find('e') {
        Some(pos) => text.split_at(pos),
        None => (text, ""),
    };
    let mantissa = if mantissa.contains('.') {
        mantissa.trim_end_matches('0').trim_end_matches('.')
    } else {
        mantissa
    };
    format!("{mantissa}{exponent}")
}
