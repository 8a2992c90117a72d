//! External identifier rendering.
//!
//! Exported documents address elements by an id that combines the source system, the
//! element's resolved prefix and its local id, percent-escaping characters that
//! downstream stores reject.

/// Characters escaped in external ids, with their replacement.
const ESCAPES: [(char, &str); 7] = [
    (' ', "%20"),
    ('#', "%23"),
    ('&', "%26"),
    ('*', "%2A"),
    ('.', "%2E"),
    ('/', "%2F"),
    ('>', "%3E"),
];

/// Greek capitals that commonly leak into Latin identifiers.
const LOOKALIKES: [(char, char); 2] = [('Β', 'B'), ('Μ', 'M')];

#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
    system: String,
    transliterate: bool,
}

impl Sanitizer {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            transliterate: false,
        }
    }

    pub fn with_transliteration(mut self, enabled: bool) -> Self {
        self.transliterate = enabled;
        self
    }

    /// `{system}_{prefix}_{id}` with empty parts omitted, then escaped.
    pub fn external_id(&self, prefix: &str, id: &str) -> String {
        let mut raw = String::new();
        for part in [self.system.as_str(), prefix] {
            if !part.is_empty() {
                raw.push_str(part);
                raw.push('_');
            }
        }
        raw.push_str(id);
        self.sanitize(&raw)
    }

    pub fn sanitize(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        for ch in value.chars() {
            let ch = if self.transliterate {
                LOOKALIKES
                    .iter()
                    .find(|(from, _)| *from == ch)
                    .map(|(_, to)| *to)
                    .unwrap_or(ch)
            } else {
                ch
            };
            match ESCAPES.iter().find(|(from, _)| *from == ch) {
                Some((_, escaped)) => out.push_str(escaped),
                None => out.push(ch),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_id() {
        let sanitizer = Sanitizer::new("sys");
        assert_eq!(sanitizer.external_id("", "B1"), "sys_B1");
        assert_eq!(sanitizer.external_id("F1", "B1"), "sys_F1_B1");
        assert_eq!(Sanitizer::new("").external_id("", "B1"), "B1");
    }

    #[test]
    fn test_escapes() {
        let sanitizer = Sanitizer::new("");
        assert_eq!(sanitizer.sanitize("a b#c&d*e.f/g>h"), "a%20b%23c%26d%2Ae%2Ef%2Fg%3Eh");
    }

    #[test]
    fn test_transliteration() {
        let plain = Sanitizer::new("");
        let greek = Sanitizer::new("").with_transliteration(true);
        assert_eq!(plain.sanitize("ΒΜ1"), "ΒΜ1");
        assert_eq!(greek.sanitize("ΒΜ1"), "BM1");
    }
}
