//! PDF object values as they appear inside content streams and page
//! dictionaries.
//!
//! The cleanup engine operates on an already-dereferenced page view, so
//! there is no indirect-reference variant: arrays, dictionaries, and streams
//! hold their values directly. Dictionaries are insertion-ordered so
//! re-serialized output stays deterministic.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::error::{CleanupError, Result};
use crate::utils::{Matrix, Rect};

/// Dictionary type used throughout the engine.
pub type PdfDict = IndexMap<SmolStr, PdfObject>;

/// PDF object types - the fundamental value type in content and resources.
#[derive(Debug, Clone, PartialEq)]
pub enum PdfObject {
    /// Null object
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Real (floating point) value
    Real(f64),
    /// Name object (e.g., /Type, /Font)
    Name(SmolStr),
    /// String (byte array)
    String(Vec<u8>),
    /// Array of objects
    Array(Vec<Self>),
    /// Dictionary (name -> object mapping)
    Dict(PdfDict),
    /// Stream (dictionary + binary data)
    Stream(Box<PdfStream>),
}

impl PdfObject {
    pub fn name(s: &str) -> Self {
        Self::Name(SmolStr::new(s))
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            _ => Err(CleanupError::TypeError {
                expected: "bool",
                got: self.type_name(),
            }),
        }
    }

    pub const fn as_i64(&self) -> Result<i64> {
        match self {
            Self::Int(n) => Ok(*n),
            _ => Err(CleanupError::TypeError {
                expected: "int",
                got: self.type_name(),
            }),
        }
    }

    /// Numeric value with int coerced to f64.
    pub const fn as_f64(&self) -> Result<f64> {
        match self {
            Self::Int(n) => Ok(*n as f64),
            Self::Real(n) => Ok(*n),
            _ => Err(CleanupError::TypeError {
                expected: "number",
                got: self.type_name(),
            }),
        }
    }

    pub fn as_name(&self) -> Result<&str> {
        match self {
            Self::Name(s) => Ok(s),
            _ => Err(CleanupError::TypeError {
                expected: "name",
                got: self.type_name(),
            }),
        }
    }

    pub fn as_str_bytes(&self) -> Result<&[u8]> {
        match self {
            Self::String(s) => Ok(s),
            _ => Err(CleanupError::TypeError {
                expected: "string",
                got: self.type_name(),
            }),
        }
    }

    pub const fn as_array(&self) -> Result<&Vec<Self>> {
        match self {
            Self::Array(arr) => Ok(arr),
            _ => Err(CleanupError::TypeError {
                expected: "array",
                got: self.type_name(),
            }),
        }
    }

    pub const fn as_dict(&self) -> Result<&PdfDict> {
        match self {
            Self::Dict(d) => Ok(d),
            _ => Err(CleanupError::TypeError {
                expected: "dict",
                got: self.type_name(),
            }),
        }
    }

    pub fn as_stream(&self) -> Result<&PdfStream> {
        match self {
            Self::Stream(s) => Ok(s),
            _ => Err(CleanupError::TypeError {
                expected: "stream",
                got: self.type_name(),
            }),
        }
    }

    /// Type name for error messages.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Real(_) => "real",
            Self::Name(_) => "name",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Dict(_) => "dict",
            Self::Stream(_) => "stream",
        }
    }
}

static NEXT_STREAM_UID: AtomicU64 = AtomicU64::new(1);

/// PDF stream - dictionary attributes plus binary data.
///
/// Each freshly constructed stream receives a process-unique `uid`. Clones
/// keep the uid of the original, so every copy of one underlying resource
/// shares identity while distinct resources never collide; the image cache
/// keys on this.
#[derive(Debug, Clone)]
pub struct PdfStream {
    /// Stream dictionary attributes
    pub attrs: PdfDict,
    /// Raw (possibly filter-encoded) data
    rawdata: Bytes,
    uid: u64,
}

impl PdfStream {
    pub fn new(attrs: PdfDict, rawdata: impl Into<Bytes>) -> Self {
        Self {
            attrs,
            rawdata: rawdata.into(),
            uid: NEXT_STREAM_UID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Raw (undecoded) data.
    pub fn rawdata(&self) -> &[u8] {
        self.rawdata.as_ref()
    }

    /// Raw data as shared bytes.
    pub fn rawdata_bytes(&self) -> Bytes {
        self.rawdata.clone()
    }

    pub const fn uid(&self) -> u64 {
        self.uid
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&PdfObject> {
        self.attrs.get(name)
    }

    /// Get attribute, trying multiple names (inline images abbreviate keys).
    pub fn get_any(&self, names: &[&str]) -> Option<&PdfObject> {
        names.iter().find_map(|name| self.attrs.get(*name))
    }
}

impl PartialEq for PdfStream {
    fn eq(&self, other: &Self) -> bool {
        // uid is identity, not value; two rebuilt streams with equal
        // contents compare equal.
        self.attrs == other.attrs && self.rawdata == other.rawdata
    }
}

// === Type conversion helper functions ===

/// Get numeric value from an object.
pub fn num_value(obj: &PdfObject) -> Result<f64> {
    obj.as_f64()
}

/// Get dictionary value from an object, looking through streams.
pub fn dict_value(obj: &PdfObject) -> Result<&PdfDict> {
    match obj {
        PdfObject::Dict(d) => Ok(d),
        PdfObject::Stream(s) => Ok(&s.attrs),
        _ => Err(CleanupError::TypeError {
            expected: "dict",
            got: obj.type_name(),
        }),
    }
}

/// Parse a 4-number array into a normalized rectangle.
pub fn rect_value(obj: &PdfObject) -> Result<Rect> {
    let arr = obj.as_array()?;
    if arr.len() < 4 {
        return Err(CleanupError::TypeError {
            expected: "rect array of 4 numbers",
            got: "short array",
        });
    }
    let x0 = arr[0].as_f64()?;
    let y0 = arr[1].as_f64()?;
    let x1 = arr[2].as_f64()?;
    let y1 = arr[3].as_f64()?;
    Ok((x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)))
}

/// Parse a 6-number array into a transformation matrix.
pub fn matrix_value(obj: &PdfObject) -> Result<Matrix> {
    let arr = obj.as_array()?;
    if arr.len() < 6 {
        return Err(CleanupError::TypeError {
            expected: "matrix array of 6 numbers",
            got: "short array",
        });
    }
    Ok((
        arr[0].as_f64()?,
        arr[1].as_f64()?,
        arr[2].as_f64()?,
        arr[3].as_f64()?,
        arr[4].as_f64()?,
        arr[5].as_f64()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors() {
        let obj = PdfObject::Int(42);
        assert_eq!(obj.as_i64().unwrap(), 42);
        assert_eq!(obj.as_f64().unwrap(), 42.0);
        assert!(obj.as_name().is_err());
    }

    #[test]
    fn test_stream_uid_identity() {
        let a = PdfStream::new(PdfDict::new(), vec![1, 2, 3]);
        let b = PdfStream::new(PdfDict::new(), vec![1, 2, 3]);
        assert_ne!(a.uid(), b.uid(), "distinct streams get distinct uids");
        assert_eq!(a.clone().uid(), a.uid(), "clones share identity");
        assert_eq!(a, b, "equality ignores uid");
    }

    #[test]
    fn test_rect_value_normalizes() {
        let obj = PdfObject::Array(vec![
            PdfObject::Int(10),
            PdfObject::Real(20.0),
            PdfObject::Int(5),
            PdfObject::Int(2),
        ]);
        assert_eq!(rect_value(&obj).unwrap(), (5.0, 2.0, 10.0, 20.0));
    }
}
