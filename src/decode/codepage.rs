//! # Code Page Decoding
//!
//! TopSpeed string fields carry single-byte encoded text. Legacy Clarion
//! deployments overwhelmingly used the OEM code page CP437; Cyrillic
//! corpora use CP1251. Both are decoded from static 128-entry tables for
//! the high half; the low half passes through as ASCII. Bytes a code page
//! leaves undefined decode to U+FFFD.

use std::str::FromStr;

/// String decoding code page. Default is CP437.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodePage {
    #[default]
    Cp437,
    Cp1251,
    Latin1,
}

impl CodePage {
    /// Decodes `bytes` into a `String`, replacing undecodable bytes.
    pub fn decode(&self, bytes: &[u8]) -> String {
        let mut out = String::with_capacity(bytes.len());
        for &b in bytes {
            out.push(self.decode_byte(b));
        }
        out
    }

    fn decode_byte(&self, b: u8) -> char {
        if b < 0x80 {
            return b as char;
        }
        match self {
            CodePage::Cp437 => CP437_HIGH[(b - 0x80) as usize],
            CodePage::Cp1251 => CP1251_HIGH[(b - 0x80) as usize],
            CodePage::Latin1 => b as char,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CodePage::Cp437 => "cp437",
            CodePage::Cp1251 => "cp1251",
            CodePage::Latin1 => "latin1",
        }
    }
}

impl FromStr for CodePage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cp437" | "437" | "ibm437" => Ok(CodePage::Cp437),
            "cp1251" | "1251" | "windows-1251" => Ok(CodePage::Cp1251),
            "latin1" | "latin-1" | "iso-8859-1" => Ok(CodePage::Latin1),
            other => Err(format!("unsupported code page: {}", other)),
        }
    }
}

/// CP437 high half (0x80..=0xFF).
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', //
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ', //
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»', //
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐', //
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧', //
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀', //
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩', //
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{00A0}',
];

/// CP1251 high half (0x80..=0xFF). 0x98 is undefined.
const CP1251_HIGH: [char; 128] = [
    'Ђ', 'Ѓ', '‚', 'ѓ', '„', '…', '†', '‡', '€', '‰', 'Љ', '‹', 'Њ', 'Ќ', 'Ћ', 'Џ', //
    'ђ', '‘', '’', '“', '”', '•', '–', '—', '\u{FFFD}', '™', 'љ', '›', 'њ', 'ќ', 'ћ', 'џ', //
    '\u{00A0}', 'Ў', 'ў', 'Ј', '¤', 'Ґ', '¦', '§', 'Ё', '©', 'Є', '«', '¬', '\u{00AD}', '®',
    'Ї', //
    '°', '±', 'І', 'і', 'ґ', 'µ', '¶', '·', 'ё', '№', 'є', '»', 'ј', 'Ѕ', 'ѕ', 'ї', //
    'А', 'Б', 'В', 'Г', 'Д', 'Е', 'Ж', 'З', 'И', 'Й', 'К', 'Л', 'М', 'Н', 'О', 'П', //
    'Р', 'С', 'Т', 'У', 'Ф', 'Х', 'Ц', 'Ч', 'Ш', 'Щ', 'Ъ', 'Ы', 'Ь', 'Э', 'Ю', 'Я', //
    'а', 'б', 'в', 'г', 'д', 'е', 'ж', 'з', 'и', 'й', 'к', 'л', 'м', 'н', 'о', 'п', //
    'р', 'с', 'т', 'у', 'ф', 'х', 'ц', 'ч', 'ш', 'щ', 'ъ', 'ы', 'ь', 'э', 'ю', 'я',
];
