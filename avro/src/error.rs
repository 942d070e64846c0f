// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Errors raised while reading or writing object container files.

use std::{error::Error as _, fmt};

/// Errors encountered by the container reader and writer.
///
/// To inspect the details of the error use [`details`](Self::details) or [`into_details`](Self::into_details)
/// to get a [`Details`] which contains more precise error information.
///
/// Every error is fatal to the [`Reader`](crate::Reader) or [`Writer`](crate::Writer) that
/// produced it. Open a new instance to retry.
#[derive(thiserror::Error, Debug)]
#[repr(transparent)]
#[error(transparent)]
pub struct Error {
    details: Box<Details>,
}

impl Error {
    pub fn new(details: Details) -> Self {
        Self {
            details: Box::new(details),
        }
    }

    pub fn details(&self) -> &Details {
        &self.details
    }

    pub fn into_details(self) -> Details {
        *self.details
    }

    /// The broad category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        self.details.kind()
    }
}

/// Functions for constructing a specific error type.
#[allow(non_snake_case, reason = "Want to mimic the `Details` variants")]
impl Error {
    /// Construct a new [`Error`] with a [`Details::SnappyCrc32`].
    #[cfg(feature = "snappy")]
    pub(crate) fn SnappyCrc32(expected: u32, actual: u32) -> Self {
        Self {
            details: Box::new(Details::SnappyCrc32 { expected, actual }),
        }
    }

    /// Construct a new [`Error`] with a [`Details::CodecNotSupported`].
    pub(crate) fn CodecNotSupported(value: String) -> Self {
        Self {
            details: Box::new(Details::CodecNotSupported(value)),
        }
    }

    /// Construct a new [`Error`] with a [`Details::CodecUnavailable`].
    #[cfg_attr(feature = "snappy", allow(dead_code))]
    pub(crate) fn CodecUnavailable(value: &'static str) -> Self {
        Self {
            details: Box::new(Details::CodecUnavailable(value)),
        }
    }
}

impl From<Details> for Error {
    fn from(details: Details) -> Self {
        Self::new(details)
    }
}

/// Coarse classification of [`Details`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Truncated or mismatched magic, malformed header or block framing.
    Format,
    /// The codec named in the metadata is not a registered codec.
    UnsupportedCodec,
    /// The codec is registered but its backend was not compiled in.
    CodecUnavailable,
    /// A snappy block failed its CRC-32 check.
    ChecksumMismatch,
    /// The underlying source or sink failed.
    Io,
    /// Compression, schema or datum level failures.
    Other,
}

#[derive(thiserror::Error)]
pub enum Details {
    #[error("Bad Snappy CRC32; expected {expected:x} but got {actual:x}")]
    SnappyCrc32 { expected: u32, actual: u32 },

    #[error("Invalid utf-8 string")]
    ConvertToUtf8(#[source] std::string::FromUtf8Error),

    #[error("Unable to allocate {desired} bytes (maximum allowed: {maximum})")]
    MemoryAllocation { desired: usize, maximum: usize },

    #[error("Failed to read bytes: {0}")]
    ReadBytes(#[source] std::io::Error),

    #[error("Cannot convert i64 to usize: {1}")]
    ConvertI64ToUsize(#[source] std::num::TryFromIntError, i64),

    #[error("Cannot convert usize to i64: {1}")]
    ConvertUsizeToI64(#[source] std::num::TryFromIntError, usize),

    #[error("Failed to parse schema from JSON")]
    ParseSchemaJson(#[source] serde_json::Error),

    #[error("Failed to convert JSON to string: {0}")]
    ConvertJsonToString(#[source] serde_json::Error),

    #[error("Failed to decompress with flate: {0}")]
    DeflateDecompress(#[source] std::io::Error),

    #[cfg(feature = "snappy")]
    #[error("Failed to compress with snappy: {0}")]
    SnappyCompress(#[source] snap::Error),

    #[cfg(feature = "snappy")]
    #[error("Failed to get snappy decompression length: {0}")]
    GetSnappyDecompressLen(#[source] snap::Error),

    #[cfg(feature = "snappy")]
    #[error("Failed to decompress with snappy: {0}")]
    SnappyDecompress(#[source] snap::Error),

    #[error("Snappy block of {0} bytes is too short to carry a CRC32 checksum")]
    SnappyPayloadTooShort(usize),

    #[error("Failed to read header: {0}")]
    ReadHeader(#[source] std::io::Error),

    #[error("wrong magic in header")]
    HeaderMagic,

    #[error("Failed to get JSON from avro.schema key in map")]
    GetAvroSchemaFromMap,

    #[error("malformed metadata in header: {0}")]
    GetHeaderMetadata(String),

    #[error("Failed to read marker bytes: {0}")]
    ReadMarker(#[source] std::io::Error),

    #[error("Read into buffer failed: {0}")]
    ReadIntoBuf(#[source] std::io::Error),

    #[error("Invalid block header: {name} must not be negative, got {value}")]
    BlockHeader { name: &'static str, value: i64 },

    #[error("Overflow when decoding integer value")]
    IntegerOverflow,

    #[error("Failed to read bytes for decoding variable length integer: {0}")]
    ReadVariableIntegerBytes(#[source] std::io::Error),

    #[error("unable to read block")]
    ReadBlock,

    #[error("Failed to serialize value into Avro value: {0}")]
    SerializeValue(String),

    #[error("Failed to deserialize Avro value into value: {0}")]
    DeserializeValue(String),

    #[error("Failed to write buffer bytes during flush: {0}")]
    WriteBytes(#[source] std::io::Error),

    #[error("Failed to flush inner writer during flush: {0}")]
    FlushWriter(#[source] std::io::Error),

    #[error("Failed to write marker: {0}")]
    WriteMarker(#[source] std::io::Error),

    #[error("Failed to seek in the underlying stream: {0}")]
    Seek(#[source] std::io::Error),

    #[error("Failed to open '{}': {source}", path.display())]
    OpenFile {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Writer is unusable after a previous write error")]
    WriterPoisoned,

    #[error("A schema is required to create a new container file")]
    MissingSchema,

    #[error("Metadata keys starting with 'avro.' are reserved for internal usage: {0}.")]
    InvalidMetadataKey(String),

    #[error("Codec '{0}' is not supported/enabled")]
    CodecNotSupported(String),

    #[error("Codec '{0}' is registered but its backend is not compiled in")]
    CodecUnavailable(&'static str),
}

impl Details {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Details::SnappyCrc32 { .. } => ErrorKind::ChecksumMismatch,
            Details::CodecNotSupported(_) => ErrorKind::UnsupportedCodec,
            Details::CodecUnavailable(_) => ErrorKind::CodecUnavailable,
            Details::ReadHeader(_)
            | Details::HeaderMagic
            | Details::GetAvroSchemaFromMap
            | Details::GetHeaderMetadata(_)
            | Details::ReadMarker(_)
            | Details::BlockHeader { .. }
            | Details::ReadBlock
            | Details::IntegerOverflow
            | Details::MemoryAllocation { .. }
            | Details::ConvertToUtf8(_) => ErrorKind::Format,
            Details::ReadIntoBuf(_)
            | Details::ReadBytes(_)
            | Details::ReadVariableIntegerBytes(_)
            | Details::WriteBytes(_)
            | Details::FlushWriter(_)
            | Details::WriteMarker(_)
            | Details::Seek(_)
            | Details::OpenFile { .. } => ErrorKind::Io,
            _ => ErrorKind::Other,
        }
    }
}

impl fmt::Debug for Details {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut msg = self.to_string();
        if let Some(e) = self.source() {
            msg.extend([": ", &e.to_string()]);
        }
        write!(f, "{msg}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn debug_includes_source() {
        let err = Error::new(Details::ReadHeader(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "eof",
        )));
        assert_eq!(format!("{:?}", err.details()), "Failed to read header: eof: eof");
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn open_file_names_the_path() {
        let err = Error::new(Details::OpenFile {
            path: std::path::PathBuf::from("/data/readings.avro"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
        assert!(
            err.to_string()
                .starts_with("Failed to open '/data/readings.avro': ")
        );
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn kind_classification() {
        assert_eq!(
            Error::CodecNotSupported("lz4".to_string()).kind(),
            ErrorKind::UnsupportedCodec
        );
        assert_eq!(
            Error::new(Details::SnappyCrc32 {
                expected: 1,
                actual: 2
            })
            .kind(),
            ErrorKind::ChecksumMismatch
        );
        assert_eq!(
            Error::CodecUnavailable("snappy").kind(),
            ErrorKind::CodecUnavailable
        );
    }
}
