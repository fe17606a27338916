//! Error taxonomy shared by every backend.

use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RadError>;

#[derive(Error, Debug)]
pub enum RadError {
    /// Invalid position/offset/length combination. Never retried.
    #[error("Index out of bounds: {0}")]
    OutOfBounds(Bounds),

    /// The declared size promised more bytes than the backend yielded.
    #[error("Unexpected end of data at {position}, expected {expected} bytes")]
    UnexpectedEof { position: u64, expected: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A 64-bit size or position does not fit the narrower type a backend needs.
    #[error("Overflow: {value} does not fit into {target}")]
    Overflow { value: u64, target: &'static str },

    #[error("Attempt to use an already released resource")]
    Released,

    #[error("Read was cancelled, the underlying channel is closed")]
    Cancelled,

    /// Several sub-resources failed to release; the first failure is primary.
    #[error("{primary} (+{} suppressed)", suppressed.len())]
    Multiple {
        primary: Box<RadError>,
        suppressed: Vec<RadError>,
    },
}

/// Description of a failed bounds check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bounds {
    /// `offset..offset + length` does not fit into `data_len`.
    Region {
        data_len: u64,
        offset: u64,
        length: u64,
    },
    /// Read request against a source of `src_len` bytes into a buffer of `dest_len` bytes.
    Read {
        src_pos: u64,
        src_len: u64,
        dest_pos: usize,
        dest_len: usize,
    },
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bounds::Region {
                data_len,
                offset,
                length,
            } => write!(
                f,
                "dataLength={data_len}; regionStart={offset}; regionLength={length}"
            ),
            Bounds::Read {
                src_pos,
                src_len,
                dest_pos,
                dest_len,
            } => write!(
                f,
                "srcPos={src_pos}, srcLen={src_len}, destPos={dest_pos}, destLen={dest_len}"
            ),
        }
    }
}

impl RadError {
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self, RadError::OutOfBounds(_))
    }

    pub fn is_unexpected_eof(&self) -> bool {
        matches!(self, RadError::UnexpectedEof { .. })
    }

    /// Chain `other` onto `self` as a suppressed error.
    pub fn suppress(self, other: RadError) -> RadError {
        match self {
            RadError::Multiple {
                primary,
                mut suppressed,
            } => {
                suppressed.push(other);
                RadError::Multiple {
                    primary,
                    suppressed,
                }
            }
            primary => RadError::Multiple {
                primary: Box::new(primary),
                suppressed: vec![other],
            },
        }
    }

    /// Errors suppressed onto this one, if any.
    pub fn suppressed(&self) -> &[RadError] {
        match self {
            RadError::Multiple { suppressed, .. } => suppressed,
            _ => &[],
        }
    }
}

/// Fold a list of failures into one error, the first being primary.
pub(crate) fn aggregate(errors: Vec<RadError>) -> Result<()> {
    let mut iter = errors.into_iter();
    match iter.next() {
        None => Ok(()),
        Some(first) => Err(iter.fold(first, RadError::suppress)),
    }
}

/// Check that `offset..offset + length` fits into `data_len`.
pub(crate) fn check_region(data_len: u64, offset: u64, length: u64) -> Result<()> {
    match offset.checked_add(length) {
        Some(end) if end <= data_len => Ok(()),
        _ => Err(RadError::OutOfBounds(Bounds::Region {
            data_len,
            offset,
            length,
        })),
    }
}

pub(crate) fn to_usize(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| RadError::Overflow {
        value,
        target: "usize",
    })
}

impl From<RadError> for std::io::Error {
    fn from(e: RadError) -> Self {
        use std::io::ErrorKind;
        match e {
            RadError::Io(e) => e,
            RadError::UnexpectedEof { .. } => std::io::Error::new(ErrorKind::UnexpectedEof, e),
            RadError::OutOfBounds(_) => std::io::Error::new(ErrorKind::InvalidInput, e),
            RadError::Cancelled => std::io::Error::new(ErrorKind::Interrupted, e),
            other => std::io::Error::other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_checks() {
        assert!(check_region(10, 0, 10).is_ok());
        assert!(check_region(10, 10, 0).is_ok());
        assert!(check_region(10, 11, 0).unwrap_err().is_out_of_bounds());
        assert!(check_region(10, 5, 6).unwrap_err().is_out_of_bounds());
        assert!(check_region(10, u64::MAX, 2).unwrap_err().is_out_of_bounds());
    }

    #[test]
    fn aggregate_keeps_first_as_primary() {
        assert!(aggregate(Vec::new()).is_ok());

        let err = aggregate(vec![
            RadError::Released,
            RadError::Cancelled,
            RadError::UnexpectedEof {
                position: 1,
                expected: 2,
            },
        ])
        .unwrap_err();
        match &err {
            RadError::Multiple { primary, .. } => {
                assert!(matches!(**primary, RadError::Released))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(err.suppressed().len(), 2);
    }
}
