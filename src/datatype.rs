//! Datatype codec: lexical ↔ canonical values and their bit layout.
//!
//! Unterstützt die Repräsentationen, die die Grammatiken referenzieren:
//! String, Boolean, Decimal, Integer, Unsigned Integer, Float und
//! Enumeration. Strings laufen im Scanner über die Value-Partitionen der
//! String Table und werden hier nur als Literal-Fallback geschrieben.

use std::fmt;
use std::sync::Arc;

use crate::bit_width;
use crate::channel::{ChannelReader, ChannelWriter};
use crate::{Error, Result};

/// Exponent, der bei Float die Sonderwerte INF, -INF und NaN markiert.
const FLOAT_SPECIAL_EXPONENT: i128 = -(1 << 14);
/// Größter Betrag eines regulären Float-Exponenten.
const FLOAT_MAX_EXPONENT: i64 = (1 << 14) - 1;
/// Nachkommastellen, die als umgekehrter unsigned integer in 64 Bit passen.
const MAX_FRACTION_DIGITS: usize = 19;

/// Datatype handle bound to an event type.
#[derive(Debug, Clone, PartialEq)]
pub enum Datatype {
    /// Character strings (also the fallback for datatypes without a
    /// dedicated layout such as dates or binary data).
    String,
    /// xsd:boolean
    Boolean,
    /// xsd:decimal
    Decimal,
    /// xsd:integer and signed derivations.
    Integer,
    /// xsd:nonNegativeInteger and unsigned derivations.
    UnsignedInteger,
    /// xsd:float and xsd:double.
    Float,
    /// Enumeration facet over a base datatype.
    Enumeration(Arc<EnumerationFacet>),
}

impl Datatype {
    /// Kurzname für Fehlermeldungen.
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Decimal => "decimal",
            Self::Integer => "integer",
            Self::UnsignedInteger => "nonNegativeInteger",
            Self::Float => "float",
            Self::Enumeration(_) => "enumeration",
        }
    }

    /// Ob Werte dieses Typs über die Value-Partitionen laufen.
    pub fn is_string(&self) -> bool {
        matches!(self, Self::String)
    }
}

/// Allowed values of an enumeration, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumerationFacet {
    base: Datatype,
    values: Vec<Value>,
}

impl EnumerationFacet {
    /// Canonicalizes `lexical_values` against `base`.
    pub fn new(base: Datatype, lexical_values: &[&str]) -> Result<Self> {
        let codec = XsdCodec;
        let values = lexical_values
            .iter()
            .map(|v| codec.canonicalize(v, &base))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { base, values })
    }

    /// Base datatype.
    pub fn base(&self) -> &Datatype {
        &self.base
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Ob die Aufzählung leer ist.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Canonical decimal: Vorzeichen, ganzzahliger Teil, Nachkommastellen ohne
/// abschließende Nullen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecimalValue {
    /// Negatives Vorzeichen (nie bei Null).
    pub negative: bool,
    /// Ganzzahliger Teil.
    pub integral: u64,
    /// Nachkommaziffern, ohne abschließende Nullen.
    pub fraction: String,
}

/// Canonical float: `mantissa × 10^exponent` or a special value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatValue {
    /// Endlicher Wert.
    Finite {
        /// Mantisse ohne abschließende Nullen.
        mantissa: i64,
        /// Zehnerexponent.
        exponent: i64,
    },
    /// INF
    PositiveInfinity,
    /// -INF
    NegativeInfinity,
    /// NaN
    NaN,
}

/// A canonical value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// String
    String(Arc<str>),
    /// Boolean
    Boolean(bool),
    /// Decimal
    Decimal(DecimalValue),
    /// Integer (Betrag bis `u64::MAX`)
    Integer(i128),
    /// Unsigned integer
    UnsignedInteger(u64),
    /// Float
    Float(FloatValue),
    /// Index into an enumeration facet.
    Enumeration(usize),
}

/// The datatype collaborator of the scanner.
pub trait DatatypeCodec: fmt::Debug + Send + Sync {
    /// Parses and canonicalizes a lexical value.
    fn canonicalize(&self, lexical: &str, datatype: &Datatype) -> Result<Value>;
    /// Canonical lexical form of a value.
    fn to_lexical(&self, value: &Value, datatype: &Datatype) -> String;
    /// Writes a canonical value.
    fn write(&self, value: &Value, datatype: &Datatype, out: &mut ChannelWriter) -> Result<()>;
    /// Reads a canonical value.
    fn read(&self, datatype: &Datatype, input: &mut ChannelReader<'_>) -> Result<Value>;
}

/// Built-in codec for the XML Schema datatypes listed in [`Datatype`].
#[derive(Debug, Clone, Copy, Default)]
pub struct XsdCodec;

fn invalid(datatype: &Datatype, lexical: &str) -> Error {
    Error::invalid_datatype_value(datatype.name(), lexical)
}

/// Zerlegt optionales Vorzeichen. Liefert (negativ, Rest).
fn split_sign(s: &str) -> (bool, &str) {
    if let Some(rest) = s.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        (false, rest)
    } else {
        (false, s)
    }
}

fn all_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

fn parse_magnitude(digits: &str) -> Option<u64> {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        return Some(0);
    }
    trimmed.parse().ok()
}

fn parse_decimal(lexical: &str) -> Option<DecimalValue> {
    let (negative, rest) = split_sign(lexical);
    let (int_part, frac_part) = match rest.split_once('.') {
        Some((i, f)) => (i, f),
        None => (rest, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !all_digits(int_part) || !all_digits(frac_part) {
        return None;
    }
    let integral = parse_magnitude(int_part)?;
    let fraction = frac_part.trim_end_matches('0');
    if fraction.len() > MAX_FRACTION_DIGITS {
        return None;
    }
    let zero = integral == 0 && fraction.is_empty();
    Some(DecimalValue { negative: negative && !zero, integral, fraction: fraction.to_string() })
}

fn parse_integer(lexical: &str) -> Option<i128> {
    let (negative, digits) = split_sign(lexical);
    if digits.is_empty() || !all_digits(digits) {
        return None;
    }
    let magnitude = i128::from(parse_magnitude(digits)?);
    Some(if negative { -magnitude } else { magnitude })
}

fn parse_float(lexical: &str) -> Option<FloatValue> {
    match lexical {
        "INF" | "+INF" => return Some(FloatValue::PositiveInfinity),
        "-INF" => return Some(FloatValue::NegativeInfinity),
        "NaN" => return Some(FloatValue::NaN),
        _ => {}
    }
    let (mantissa_part, exponent_part) = match lexical.find(['e', 'E']) {
        Some(pos) => (&lexical[..pos], Some(&lexical[pos + 1..])),
        None => (lexical, None),
    };
    let mut exponent: i64 = match exponent_part {
        Some(e) => {
            let (neg, digits) = split_sign(e);
            if digits.is_empty() || !all_digits(digits) {
                return None;
            }
            let v: i64 = digits.parse().ok()?;
            if neg { -v } else { v }
        }
        None => 0,
    };
    let (negative, rest) = split_sign(mantissa_part);
    let (int_part, frac_part) = rest.split_once('.').unwrap_or((rest, ""));
    if (int_part.is_empty() && frac_part.is_empty()) || !all_digits(int_part) || !all_digits(frac_part) {
        return None;
    }
    let mut digits = format!("{int_part}{frac_part}");
    exponent = exponent.checked_sub(frac_part.len() as i64)?;
    let significant = digits.trim_start_matches('0').len();
    digits.drain(..digits.len() - significant);
    if digits.is_empty() {
        return Some(FloatValue::Finite { mantissa: 0, exponent: 0 });
    }
    while digits.ends_with('0') {
        digits.pop();
        exponent += 1;
    }
    let magnitude: i64 = digits.parse().ok()?;
    if exponent.abs() > FLOAT_MAX_EXPONENT {
        return None;
    }
    Some(FloatValue::Finite { mantissa: if negative { -magnitude } else { magnitude }, exponent })
}

fn write_integer(value: i128, out: &mut ChannelWriter) -> Result<()> {
    let negative = value < 0;
    // Negative Werte tragen |v|-1, damit -0 nicht codierbar ist.
    let magnitude = if negative { -value - 1 } else { value };
    let magnitude = u64::try_from(magnitude).map_err(|_| Error::IntegerOverflow)?;
    out.write_bool(negative);
    out.write_uint(magnitude);
    Ok(())
}

fn read_integer(input: &mut ChannelReader<'_>) -> Result<i128> {
    let negative = input.read_bool()?;
    let magnitude = i128::from(input.read_uint()?);
    Ok(if negative { -magnitude - 1 } else { magnitude })
}

fn reversed_digits(s: &str) -> String {
    s.chars().rev().collect()
}

impl DatatypeCodec for XsdCodec {
    fn canonicalize(&self, lexical: &str, datatype: &Datatype) -> Result<Value> {
        // Alle Typen außer String kollabieren Whitespace.
        let trimmed = lexical.trim_matches([' ', '\t', '\r', '\n']);
        let value = match datatype {
            Datatype::String => Some(Value::String(lexical.into())),
            Datatype::Boolean => match trimmed {
                "true" | "1" => Some(Value::Boolean(true)),
                "false" | "0" => Some(Value::Boolean(false)),
                _ => None,
            },
            Datatype::Decimal => parse_decimal(trimmed).map(Value::Decimal),
            Datatype::Integer => parse_integer(trimmed).map(Value::Integer),
            Datatype::UnsignedInteger => match parse_integer(trimmed) {
                Some(v) if v >= 0 => u64::try_from(v).ok().map(Value::UnsignedInteger),
                _ => None,
            },
            Datatype::Float => parse_float(trimmed).map(Value::Float),
            Datatype::Enumeration(facet) => {
                let base = self.canonicalize(lexical, &facet.base).map_err(|_| invalid(datatype, lexical))?;
                facet.values.iter().position(|v| *v == base).map(Value::Enumeration)
            }
        };
        value.ok_or_else(|| invalid(datatype, lexical))
    }

    fn to_lexical(&self, value: &Value, datatype: &Datatype) -> String {
        match value {
            Value::String(s) => s.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Decimal(d) => {
                let sign = if d.negative { "-" } else { "" };
                let fraction = if d.fraction.is_empty() { "0" } else { &d.fraction };
                format!("{sign}{}.{fraction}", d.integral)
            }
            Value::Integer(i) => i.to_string(),
            Value::UnsignedInteger(u) => u.to_string(),
            Value::Float(FloatValue::Finite { mantissa, exponent }) => format!("{mantissa}E{exponent}"),
            Value::Float(FloatValue::PositiveInfinity) => "INF".to_string(),
            Value::Float(FloatValue::NegativeInfinity) => "-INF".to_string(),
            Value::Float(FloatValue::NaN) => "NaN".to_string(),
            Value::Enumeration(index) => match datatype {
                Datatype::Enumeration(facet) => facet
                    .values
                    .get(*index)
                    .map(|v| self.to_lexical(v, &facet.base))
                    .unwrap_or_default(),
                _ => index.to_string(),
            },
        }
    }

    fn write(&self, value: &Value, datatype: &Datatype, out: &mut ChannelWriter) -> Result<()> {
        match (value, datatype) {
            (Value::String(s), _) => out.write_string(s),
            (Value::Boolean(b), _) => out.write_bool(*b),
            (Value::Decimal(d), _) => {
                out.write_bool(d.negative);
                out.write_uint(d.integral);
                let reversed = reversed_digits(&d.fraction);
                out.write_uint(parse_magnitude(&reversed).ok_or(Error::IntegerOverflow)?);
            }
            (Value::Integer(i), _) => write_integer(*i, out)?,
            (Value::UnsignedInteger(u), _) => out.write_uint(*u),
            (Value::Float(f), _) => {
                let (mantissa, exponent) = match *f {
                    FloatValue::Finite { mantissa, exponent } => (i128::from(mantissa), i128::from(exponent)),
                    FloatValue::PositiveInfinity => (1, FLOAT_SPECIAL_EXPONENT),
                    FloatValue::NegativeInfinity => (-1, FLOAT_SPECIAL_EXPONENT),
                    FloatValue::NaN => (0, FLOAT_SPECIAL_EXPONENT),
                };
                write_integer(mantissa, out)?;
                write_integer(exponent, out)?;
            }
            (Value::Enumeration(index), Datatype::Enumeration(facet)) => {
                if *index >= facet.len() {
                    return Err(Error::InvalidValue(format!("enumeration index {index} out of range")));
                }
                out.write_nbit(*index as u64, bit_width::for_count(facet.len()));
            }
            (Value::Enumeration(_), other) => {
                return Err(Error::InvalidValue(format!("enumeration value for datatype {}", other.name())));
            }
        }
        Ok(())
    }

    fn read(&self, datatype: &Datatype, input: &mut ChannelReader<'_>) -> Result<Value> {
        Ok(match datatype {
            Datatype::String => Value::String(input.read_string()?.into()),
            Datatype::Boolean => Value::Boolean(input.read_bool()?),
            Datatype::Decimal => {
                let negative = input.read_bool()?;
                let integral = input.read_uint()?;
                let reversed = input.read_uint()?;
                let fraction = if reversed == 0 { String::new() } else { reversed_digits(&reversed.to_string()) };
                Value::Decimal(DecimalValue { negative, integral, fraction })
            }
            Datatype::Integer => Value::Integer(read_integer(input)?),
            Datatype::UnsignedInteger => Value::UnsignedInteger(input.read_uint()?),
            Datatype::Float => {
                let mantissa = read_integer(input)?;
                let exponent = read_integer(input)?;
                if exponent == FLOAT_SPECIAL_EXPONENT {
                    Value::Float(match mantissa {
                        1 => FloatValue::PositiveInfinity,
                        -1 => FloatValue::NegativeInfinity,
                        _ => FloatValue::NaN,
                    })
                } else {
                    let mantissa = i64::try_from(mantissa).map_err(|_| Error::IntegerOverflow)?;
                    let exponent = i64::try_from(exponent)
                        .ok()
                        .filter(|e| e.abs() <= FLOAT_MAX_EXPONENT)
                        .ok_or_else(|| Error::InvalidValue(format!("float exponent {exponent} out of range")))?;
                    Value::Float(FloatValue::Finite { mantissa, exponent })
                }
            }
            Datatype::Enumeration(facet) => {
                let index = input.read_nbit(bit_width::for_count(facet.len()))? as usize;
                if index >= facet.len() {
                    return Err(Error::InvalidValue(format!("enumeration index {index} out of range")));
                }
                Value::Enumeration(index)
            }
        })
    }
}
