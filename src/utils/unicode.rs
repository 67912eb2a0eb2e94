//! LaTeX accent and text-symbol commands mapped onto Unicode.
//!
//! Shared by the LaTeX lexer (text-mode accents) and the BibTeX field
//! clean-up.

use phf::phf_map;

/// Precomposed forms for the common accent + letter pairs.
static PRECOMPOSED: phf::Map<&'static str, &'static str> = phf_map! {
    "'a" => "á", "'e" => "é", "'i" => "í", "'o" => "ó", "'u" => "ú", "'y" => "ý",
    "'A" => "Á", "'E" => "É", "'I" => "Í", "'O" => "Ó", "'U" => "Ú", "'Y" => "Ý",
    "'c" => "ć", "'n" => "ń", "'s" => "ś", "'z" => "ź",
    "`a" => "à", "`e" => "è", "`i" => "ì", "`o" => "ò", "`u" => "ù",
    "`A" => "À", "`E" => "È", "`I" => "Ì", "`O" => "Ò", "`U" => "Ù",
    "^a" => "â", "^e" => "ê", "^i" => "î", "^o" => "ô", "^u" => "û",
    "^A" => "Â", "^E" => "Ê", "^I" => "Î", "^O" => "Ô", "^U" => "Û",
    "\"a" => "ä", "\"e" => "ë", "\"i" => "ï", "\"o" => "ö", "\"u" => "ü", "\"y" => "ÿ",
    "\"A" => "Ä", "\"E" => "Ë", "\"I" => "Ï", "\"O" => "Ö", "\"U" => "Ü",
    "~a" => "ã", "~o" => "õ", "~n" => "ñ", "~A" => "Ã", "~O" => "Õ", "~N" => "Ñ",
    "cc" => "ç", "cC" => "Ç",
    "vc" => "č", "vs" => "š", "vz" => "ž", "vr" => "ř", "ve" => "ě",
    "vC" => "Č", "vS" => "Š", "vZ" => "Ž", "vR" => "Ř",
};

/// Combining marks used when no precomposed form is known.
static COMBINING: phf::Map<char, char> = phf_map! {
    '\'' => '\u{0301}',
    '`' => '\u{0300}',
    '^' => '\u{0302}',
    '"' => '\u{0308}',
    '~' => '\u{0303}',
    '=' => '\u{0304}',
    '.' => '\u{0307}',
    'c' => '\u{0327}',
    'v' => '\u{030C}',
    'u' => '\u{0306}',
    'H' => '\u{030B}',
    'k' => '\u{0328}',
};

/// Zero-argument text commands that stand for a single symbol.
pub static TEXT_SYMBOLS: phf::Map<&'static str, &'static str> = phf_map! {
    "ss" => "ß",
    "o" => "ø",
    "O" => "Ø",
    "ae" => "æ",
    "AE" => "Æ",
    "oe" => "œ",
    "OE" => "Œ",
    "aa" => "å",
    "AA" => "Å",
    "l" => "ł",
    "L" => "Ł",
    "i" => "ı",
    "ldots" => "…",
    "dots" => "…",
    "textendash" => "–",
    "textemdash" => "—",
    "textbackslash" => "\\",
    "textasciitilde" => "~",
    "textbar" => "|",
    "textless" => "<",
    "textgreater" => ">",
    "textdegree" => "°",
    "S" => "§",
    "P" => "¶",
    "copyright" => "©",
    "textregistered" => "®",
    "texttrademark" => "™",
    "pounds" => "£",
    "euro" => "€",
    "LaTeX" => "LaTeX",
    "TeX" => "TeX",
    "quad" => " ",
    "qquad" => " ",
    "enspace" => " ",
    "space" => " ",
};

/// Characters that introduce a single-letter accent command (`\'e`, `\"o`).
pub fn is_accent_symbol(c: char) -> bool {
    matches!(c, '\'' | '`' | '^' | '"' | '~' | '=' | '.')
}

/// Letter accent commands (`\c{c}`, `\v{s}`); they need a brace group or a space.
pub fn is_accent_letter(name: &str) -> bool {
    matches!(name, "c" | "v" | "u" | "H" | "k")
}

/// Apply an accent to a base string (usually one letter).
pub fn accent(mark: char, base: &str) -> String {
    let mut key = String::with_capacity(base.len() + 1);
    key.push(mark);
    key.push_str(base);
    if let Some(composed) = PRECOMPOSED.get(key.as_str()) {
        return (*composed).to_string();
    }
    // Dotless i/j under an accent.
    let base = match base {
        "\\i" => "i",
        "\\j" => "j",
        other => other,
    };
    match COMBINING.get(&mark) {
        Some(combining) if !base.is_empty() => {
            let mut out = base.to_string();
            out.push(*combining);
            out
        }
        _ => base.to_string(),
    }
}

/// Flatten LaTeX text markup into plain Unicode: accents and symbol
/// commands are resolved, escapes unescaped, braces dropped, `--`/`---`
/// become dashes and `~` a space. Other commands vanish, keeping their
/// argument text.
pub fn latex_to_unicode(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0usize;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let Some(&next) = chars.get(i + 1) else {
                    break;
                };
                if is_accent_symbol(next) {
                    let (base, used) = accent_base(&chars, i + 2);
                    out.push_str(&accent(next, &base));
                    i += 2 + used;
                    continue;
                }
                if next.is_ascii_alphabetic() {
                    let mut end = i + 1;
                    while end < chars.len() && chars[end].is_ascii_alphabetic() {
                        end += 1;
                    }
                    let name: String = chars[i + 1..end].iter().collect();
                    if name.len() == 1 && is_accent_letter(&name) {
                        let (base, used) = accent_base(&chars, skip_spaces(&chars, end));
                        if used > 0 {
                            out.push_str(&accent(next, &base));
                            i = skip_spaces(&chars, end) + used;
                            continue;
                        }
                    }
                    if let Some(symbol) = TEXT_SYMBOLS.get(name.as_str()) {
                        out.push_str(symbol);
                        i = end;
                        if chars.get(i) == Some(&'{') && chars.get(i + 1) == Some(&'}') {
                            i += 2;
                        } else if chars.get(i) == Some(&' ') {
                            i += 1;
                        }
                        continue;
                    }
                    i = skip_spaces(&chars, end);
                    continue;
                }
                out.push(next);
                i += 2;
            }
            '{' | '}' => i += 1,
            '~' => {
                out.push(' ');
                i += 1;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                if chars.get(i + 2) == Some(&'-') {
                    out.push('—');
                    i += 3;
                } else {
                    out.push('–');
                    i += 2;
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Base of an accent: `{x}`, `\i` or a single character. Returns the base
/// and the number of characters consumed.
fn accent_base(chars: &[char], at: usize) -> (String, usize) {
    match chars.get(at) {
        Some('{') => {
            let mut end = at + 1;
            while end < chars.len() && chars[end] != '}' {
                end += 1;
            }
            let inner: String = chars[at + 1..end.min(chars.len())].iter().collect();
            let used = (end + 1).min(chars.len()) - at;
            (inner.trim().to_string(), used)
        }
        Some('\\') if matches!(chars.get(at + 1), Some('i' | 'j')) => {
            (format!("\\{}", chars[at + 1]), 2)
        }
        Some(c) if !c.is_whitespace() => (c.to_string(), 1),
        _ => (String::new(), 0),
    }
}

fn skip_spaces(chars: &[char], mut at: usize) -> usize {
    while chars.get(at) == Some(&' ') {
        at += 1;
    }
    at
}
