//! Canonicalization of informal Indonesian numeric and unit shorthand.
//!
//! Merchants write "15rb", "2,5jt", "12.000", "25kg". Providers classify far
//! more reliably when those are rewritten to "15000", "2500000", "12000",
//! "25 kg" first. Normalization is pure and idempotent: running it over
//! already-normal text changes nothing, and malformed input passes through
//! untouched.

use std::sync::OnceLock;

use regex::{Captures, Regex};

const UNIT_TOKENS: &str = "kg|gram|liter|ml|porsi|pcs|butir|biji|buah|pack|dus|karton|box";

fn thousands_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:[.,]\d+)?)\s*(?:rb|ribu)").expect("valid regex"))
}

fn millions_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:[.,]\d+)?)\s*(?:jt|juta)").expect("valid regex"))
}

fn separator_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,3})\.(\d{3})").expect("valid regex"))
}

fn unit_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(\d+)\s*({UNIT_TOKENS})\b")).expect("valid regex")
    })
}

/// Rewrite Indonesian shorthand into canonical numerals and spaced units.
pub fn normalize(text: &str) -> String {
    let text = text.trim();
    let text = normalize_numbers(text);
    normalize_units(&text)
}

/// Price-specific variant: additionally drops the `@` per-unit marker
/// ("telur @2500" means 2500 apiece).
pub fn normalize_price(text: &str) -> String {
    let text = text.replace('@', " ");
    normalize_numbers(text.trim())
}

fn normalize_numbers(text: &str) -> String {
    // Magnitude suffixes first, so "2.5jt" is scaled before the
    // thousands-separator pass could misread its decimal point.
    let text = expand_magnitude(thousands_pattern(), text, 1_000.0);
    let mut text = expand_magnitude(millions_pattern(), &text, 1_000_000.0);

    // "1.250.000" needs two passes; repeat until stable.
    loop {
        let stripped = separator_pattern().replace_all(&text, "${1}${2}").into_owned();
        if stripped == text {
            break;
        }
        text = stripped;
    }

    text
}

fn expand_magnitude(pattern: &Regex, text: &str, multiplier: f64) -> String {
    pattern
        .replace_all(text, |captures: &Captures<'_>| {
            let digits = captures[1].replace(',', ".");
            match digits.parse::<f64>() {
                Ok(value) => format!("{:.0}", value * multiplier),
                // Unparseable numerals pass through unchanged.
                Err(_) => captures[0].to_string(),
            }
        })
        .into_owned()
}

fn normalize_units(text: &str) -> String {
    unit_pattern().replace_all(text, "$1 $2").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_thousands_shorthand() {
        assert_eq!(normalize("15rb"), "15000");
        assert_eq!(normalize("15ribu"), "15000");
        assert_eq!(normalize("maksimal 12 ribu"), "maksimal 12000");
    }

    #[test]
    fn expands_millions_shorthand_with_decimal_comma() {
        assert_eq!(normalize("2jt"), "2000000");
        assert_eq!(normalize("2,5jt"), "2500000");
        assert_eq!(normalize("1.5juta"), "1500000");
    }

    #[test]
    fn strips_thousands_separators_until_stable() {
        assert_eq!(normalize("12.000"), "12000");
        assert_eq!(normalize("1.250.000"), "1250000");
    }

    #[test]
    fn separates_digit_runs_from_unit_tokens() {
        assert_eq!(normalize("25kg"), "25 kg");
        assert_eq!(normalize("2liter"), "2 liter");
        assert_eq!(normalize("10porsi"), "10 porsi");
        assert_eq!(normalize("3 pcs"), "3 pcs");
    }

    #[test]
    fn normalizes_a_full_restock_message() {
        assert_eq!(
            normalize("cari beras 25kg maksimal 12rb"),
            "cari beras 25 kg maksimal 12000"
        );
    }

    #[test]
    fn price_variant_drops_per_unit_marker() {
        assert_eq!(normalize_price("telur @2500"), "telur  2500");
        assert_eq!(normalize_price("ayam @15rb"), "ayam  15000");
    }

    #[test]
    fn passes_malformed_input_through() {
        assert_eq!(normalize("???"), "???");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("rb tanpa angka"), "rb tanpa angka");
    }

    #[test]
    fn is_idempotent_over_representative_inputs() {
        let samples = [
            "15rb",
            "2,5jt porsi",
            "12.000",
            "1.250.000",
            "25kg",
            "cari beras 25 kg maksimal 12 ribu",
            "tadi laku nasi 10 porsi 150rb",
            "plain text without numbers",
        ];

        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {sample:?}");
        }
    }
}
