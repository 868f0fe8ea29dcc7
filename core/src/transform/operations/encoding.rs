//! Binary-to-text codecs, URL coding, hashing and text distances.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use data_encoding::BASE32;
use md5::Md5;
use serde_json::Value;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use super::columns::parse_flag;
use super::{column_text, invalid, map_text};
use crate::error::{DirectiveError, DirectiveResult, EvalResult};
use crate::grammar::ParsedDirective;
use crate::models::{number_value, Record};
use crate::transform::context::ExecutionContext;
use crate::transform::directive::{
    column_arg, factory, raw_arg, text_arg, Directive, DirectiveRegistry, Outcome,
};

pub fn register(registry: &mut DirectiveRegistry) {
    registry
        .register("encode", factory::<Codec>)
        .register("decode", factory::<Codec>)
        .register("url-encode", factory::<UrlCodec>)
        .register("url-decode", factory::<UrlCodec>)
        .register("hash", factory::<Hash>)
        .register("text-distance", factory::<TextDistance>)
        .register("text-metric", factory::<TextDistance>);
}

// =============================================================================
// encode / decode
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Scheme {
    #[default]
    Base64,
    Base32,
    Hex,
}

impl Scheme {
    fn parse(text: &str) -> Option<Self> {
        match text.to_ascii_lowercase().as_str() {
            "base64" => Some(Scheme::Base64),
            "base32" => Some(Scheme::Base32),
            "hex" => Some(Scheme::Hex),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Scheme::Base64 => "base64",
            Scheme::Base32 => "base32",
            Scheme::Hex => "hex",
        }
    }

    fn encode(self, bytes: &[u8]) -> String {
        match self {
            Scheme::Base64 => STANDARD.encode(bytes),
            Scheme::Base32 => BASE32.encode(bytes),
            Scheme::Hex => hex::encode(bytes),
        }
    }

    fn decode(self, text: &str) -> Result<Vec<u8>, String> {
        match self {
            Scheme::Base64 => STANDARD.decode(text).map_err(|e| e.to_string()),
            Scheme::Base32 => BASE32
                .decode(text.trim().to_ascii_uppercase().as_bytes())
                .map_err(|e| e.to_string()),
            Scheme::Hex => hex::decode(text).map_err(|e| e.to_string()),
        }
    }
}

/// `encode <scheme> :col` writes `<col>_encode_<scheme>`; `decode` writes
/// `<col>_decode_<scheme>`. Null values produce null.
#[derive(Default)]
pub struct Codec {
    scheme: Scheme,
    column: String,
    decoding: bool,
}

impl Codec {
    fn destination(&self) -> String {
        let action = if self.decoding { "decode" } else { "encode" };
        format!("{}_{action}_{}", self.column, self.scheme.name())
    }
}

impl Directive for Codec {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        let scheme = raw_arg(directive, 0)?;
        self.scheme = Scheme::parse(&scheme).ok_or_else(|| {
            DirectiveError::invalid(
                &directive.canonical,
                format!("unknown encoding '{scheme}', expected base64, base32 or hex"),
            )
        })?;
        self.column = column_arg(directive, 1)?;
        self.decoding = directive.canonical == "decode";
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let value = record.require(&self.column)?;
        let result = match value {
            Value::Null => Value::Null,
            _ if self.decoding => {
                let text = column_text(record, &self.column)?;
                let bytes = self.scheme.decode(text.trim()).map_err(|e| invalid(&self.column, e))?;
                let decoded = String::from_utf8(bytes).map_err(|e| invalid(&self.column, e.to_string()))?;
                Value::String(decoded)
            }
            _ => Value::String(self.scheme.encode(column_text(record, &self.column)?.as_bytes())),
        };
        let mut out = record.clone();
        out.set(self.destination(), result);
        Ok(Outcome::one(out))
    }
}

/// `url-encode` / `url-decode`, in place.
#[derive(Default)]
pub struct UrlCodec {
    column: String,
    decoding: bool,
}

impl Directive for UrlCodec {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        self.decoding = directive.canonical == "url-decode";
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let out = map_text(record, &self.column, |value| {
            let coded = if self.decoding {
                urlencoding::decode(value)
                    .map_err(|e| invalid(&self.column, e.to_string()))?
                    .into_owned()
            } else {
                urlencoding::encode(value).into_owned()
            };
            Ok(Value::String(coded))
        })?;
        Ok(Outcome::one(out))
    }
}

// =============================================================================
// Hashing
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Algorithm {
    Md5,
    Sha1,
    Sha224,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl Algorithm {
    /// Accepts `SHA-256`, `sha256`, `SHA1`, `SHA` (SHA-1), `MD5` and the like.
    fn parse(text: &str) -> Option<Self> {
        match text.to_ascii_uppercase().replace('-', "").as_str() {
            "MD5" => Some(Algorithm::Md5),
            "SHA" | "SHA1" => Some(Algorithm::Sha1),
            "SHA224" => Some(Algorithm::Sha224),
            "SHA256" => Some(Algorithm::Sha256),
            "SHA384" => Some(Algorithm::Sha384),
            "SHA512" => Some(Algorithm::Sha512),
            _ => None,
        }
    }

    fn digest(self, bytes: &[u8]) -> Vec<u8> {
        match self {
            Algorithm::Md5 => Md5::digest(bytes).to_vec(),
            Algorithm::Sha1 => Sha1::digest(bytes).to_vec(),
            Algorithm::Sha224 => Sha224::digest(bytes).to_vec(),
            Algorithm::Sha256 => Sha256::digest(bytes).to_vec(),
            Algorithm::Sha384 => Sha384::digest(bytes).to_vec(),
            Algorithm::Sha512 => Sha512::digest(bytes).to_vec(),
        }
    }
}

/// `hash :col 'SHA-256' [encode]`: hex digest in place, or the raw digest
/// bytes as an array when `encode` is false.
#[derive(Default)]
pub struct Hash {
    column: String,
    algorithm: Algorithm,
    encode: bool,
}

impl Directive for Hash {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        let algorithm = text_arg(directive, 1)?;
        self.algorithm = Algorithm::parse(&algorithm).ok_or_else(|| {
            DirectiveError::invalid(&directive.canonical, format!("unsupported hash algorithm '{algorithm}'"))
        })?;
        self.encode = match directive.raw(2) {
            None => true,
            Some(flag) => parse_flag(directive, flag)?,
        };
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let out = map_text(record, &self.column, |value| {
            let digest = self.algorithm.digest(value.as_bytes());
            Ok(if self.encode {
                Value::String(hex::encode(digest))
            } else {
                Value::Array(digest.into_iter().map(Value::from).collect())
            })
        })?;
        Ok(Outcome::one(out))
    }
}

// =============================================================================
// Text distances
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Metric {
    #[default]
    Levenshtein,
    DamerauLevenshtein,
    Osa,
    Hamming,
    NormalizedLevenshtein,
    NormalizedDamerauLevenshtein,
    Jaro,
    JaroWinkler,
    SorensenDice,
}

impl Metric {
    fn parse(text: &str) -> Option<Self> {
        Some(match text.to_ascii_lowercase().replace('_', "-").as_str() {
            "levenshtein" => Metric::Levenshtein,
            "damerau-levenshtein" => Metric::DamerauLevenshtein,
            "osa" | "optimal-string-alignment" => Metric::Osa,
            "hamming" => Metric::Hamming,
            "normalized-levenshtein" => Metric::NormalizedLevenshtein,
            "normalized-damerau-levenshtein" => Metric::NormalizedDamerauLevenshtein,
            "jaro" => Metric::Jaro,
            "jaro-winkler" => Metric::JaroWinkler,
            "dice" | "sorensen-dice" => Metric::SorensenDice,
            _ => return None,
        })
    }

    fn measure(self, a: &str, b: &str) -> Result<f64, String> {
        Ok(match self {
            Metric::Levenshtein => strsim::levenshtein(a, b) as f64,
            Metric::DamerauLevenshtein => strsim::damerau_levenshtein(a, b) as f64,
            Metric::Osa => strsim::osa_distance(a, b) as f64,
            Metric::Hamming => strsim::hamming(a, b).map_err(|e| e.to_string())? as f64,
            Metric::NormalizedLevenshtein => strsim::normalized_levenshtein(a, b),
            Metric::NormalizedDamerauLevenshtein => strsim::normalized_damerau_levenshtein(a, b),
            Metric::Jaro => strsim::jaro(a, b),
            Metric::JaroWinkler => strsim::jaro_winkler(a, b),
            Metric::SorensenDice => strsim::sorensen_dice(a, b),
        })
    }
}

/// `text-distance <method> :a :b :destination` (and `text-metric`).
#[derive(Default)]
pub struct TextDistance {
    metric: Metric,
    first: String,
    second: String,
    destination: String,
}

impl Directive for TextDistance {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        let method = raw_arg(directive, 0)?;
        self.metric = Metric::parse(&method).ok_or_else(|| {
            DirectiveError::invalid(&directive.canonical, format!("unknown method '{method}'"))
        })?;
        self.first = column_arg(directive, 1)?;
        self.second = column_arg(directive, 2)?;
        self.destination = column_arg(directive, 3)?;
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let a = column_text(record, &self.first)?;
        let b = column_text(record, &self.second)?;
        let score = self.metric.measure(&a, &b).map_err(|e| invalid(&self.destination, e))?;
        let mut out = record.clone();
        out.set(self.destination.clone(), number_value(score));
        Ok(Outcome::one(out))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{apply_one, build};
    use super::*;
    use crate::error::EvaluationError;
    use serde_json::json;

    #[test]
    fn test_base32_round_trip_with_padding() {
        assert_eq!(Scheme::Base32.encode(b"Base32 Encoding"), "IJQXGZJTGIQEK3TDN5SGS3TH");
        assert_eq!(Scheme::Base32.encode(b"f"), "MY======");
        assert_eq!(Scheme::Base32.encode(b"foobar"), "MZXW6YTBOI======");
        assert_eq!(Scheme::Base32.decode("MZXW6YTBOI======").unwrap(), b"foobar");
        assert_eq!(Scheme::Base32.decode("mzxw6ytboi======").unwrap(), b"foobar");
        assert!(Scheme::Base32.decode("MZ1=").is_err());
    }

    #[test]
    fn test_encode_writes_new_column() {
        let r = Record::from_pairs([("col1", json!("Testing Base 64 Encoding")), ("col2", json!("Hex Encoding"))]);
        let out = apply_one("encode base64 col1", &r).unwrap();
        assert_eq!(out.get("col1_encode_base64"), Some(&json!("VGVzdGluZyBCYXNlIDY0IEVuY29kaW5n")));
        assert_eq!(out.get("col1"), Some(&json!("Testing Base 64 Encoding")));

        let out = apply_one("encode hex col2", &r).unwrap();
        assert_eq!(out.get("col2_encode_hex"), Some(&json!("48657820456e636f64696e67")));
    }

    #[test]
    fn test_decode_and_invalid_input() {
        let r = Record::from_pairs([("col1", json!("IJQXGZJTGIQEK3TDN5SGS3TH")), ("bad", json!("zz"))]);
        let out = apply_one("decode base32 col1", &r).unwrap();
        assert_eq!(out.get("col1_decode_base32"), Some(&json!("Base32 Encoding")));

        let err = apply_one("decode hex bad", &r).unwrap_err();
        assert!(matches!(err, EvaluationError::InvalidValue { .. }));
        assert!(build("encode rot13 :col1;").is_err());
    }

    #[test]
    fn test_url_coding() {
        let r = Record::from_pairs([("q", json!("a b&c"))]);
        let encoded = apply_one("url-encode q", &r).unwrap();
        assert_eq!(encoded.get("q"), Some(&json!("a%20b%26c")));
        let decoded = apply_one("url-decode q", &encoded).unwrap();
        assert_eq!(decoded.get("q"), Some(&json!("a b&c")));
    }

    #[test]
    fn test_hash() {
        let r = Record::from_pairs([("pw", json!("abc"))]);
        let out = apply_one("hash pw SHA-256", &r).unwrap();
        assert_eq!(
            out.get("pw"),
            Some(&json!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"))
        );
        let out = apply_one("hash :pw 'sha256' false;", &r).unwrap();
        assert_eq!(out.get("pw").and_then(Value::as_array).map(Vec::len), Some(32));
        assert!(build("hash :pw 'WHIRLPOOL';").is_err());
    }

    #[test]
    fn test_hash_sha1_and_md5() {
        let r = Record::from_pairs([("pw", json!("abc"))]);
        let out = apply_one("hash :pw 'SHA1' true;", &r).unwrap();
        assert_eq!(out.get("pw"), Some(&json!("a9993e364706816aba3e25717850c26c9cd0d89d")));
        let out = apply_one("hash :pw 'SHA';", &r).unwrap();
        assert_eq!(out.get("pw"), Some(&json!("a9993e364706816aba3e25717850c26c9cd0d89d")));
        let out = apply_one("hash pw MD5", &r).unwrap();
        assert_eq!(out.get("pw"), Some(&json!("900150983cd24fb0d6963f7d28e17f72")));
    }

    #[test]
    fn test_text_distance() {
        let r = Record::from_pairs([("a", json!("kitten")), ("b", json!("sitting"))]);
        let out = apply_one("text-distance levenshtein a b d", &r).unwrap();
        assert_eq!(out.get("d"), Some(&json!(3)));
        let out = apply_one("text-metric jaro-winkler a a d", &r).unwrap();
        assert_eq!(out.get("d"), Some(&json!(1)));
        assert!(matches!(
            apply_one("text-distance hamming a b d", &r),
            Err(EvaluationError::InvalidValue { .. })
        ));
        assert!(build("text-distance soundex :a :b :d;").is_err());
    }
}
