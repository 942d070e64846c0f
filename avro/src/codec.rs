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

//! Block compression codecs supported by object container files.

use crate::{AvroResult, error::Details, error::Error};
use strum::IntoEnumIterator;
use strum_macros::{EnumIter, EnumString, IntoStaticStr};

/// Settings for the `Deflate` codec.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct DeflateSettings {
    compression_level: miniz_oxide::deflate::CompressionLevel,
}

impl DeflateSettings {
    pub fn new(compression_level: miniz_oxide::deflate::CompressionLevel) -> Self {
        DeflateSettings { compression_level }
    }

    fn compression_level(&self) -> u8 {
        self.compression_level as u8
    }
}

impl Default for DeflateSettings {
    /// Default compression level is `miniz_oxide::deflate::CompressionLevel::DefaultCompression`.
    fn default() -> Self {
        Self::new(miniz_oxide::deflate::CompressionLevel::DefaultCompression)
    }
}

/// The compression codec used to compress blocks.
///
/// The set of codec names is closed: `null`, `deflate` and `snappy`. A name outside of it is
/// rejected when a file is opened, see [`Codec::from_name`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumIter, EnumString, IntoStaticStr)]
#[strum(serialize_all = "kebab_case")]
pub enum Codec {
    /// The `Null` codec simply passes through data uncompressed.
    Null,
    /// The `Deflate` codec writes the data block using the deflate algorithm
    /// as specified in RFC 1951, and typically implemented using the zlib library.
    /// Note that this format (unlike the "zlib format" in RFC 1950) does not have a checksum.
    Deflate(DeflateSettings),
    /// The `Snappy` codec uses Google's [Snappy](http://google.github.io/snappy/)
    /// compression library. Each compressed block is followed by the 4-byte, big-endian
    /// CRC32 checksum of the uncompressed data in the block.
    ///
    /// The backend is only available with the `snappy` feature. Without it the name is still
    /// recognized, but compressing or decompressing a block fails with
    /// [`Details::CodecUnavailable`].
    Snappy,
}

impl Codec {
    /// Look up a codec by the name stored under `avro.codec`.
    pub fn from_name(name: &str) -> AvroResult<Self> {
        name.parse()
            .map_err(|_| Error::CodecNotSupported(name.to_owned()))
    }

    /// The name stored under `avro.codec`.
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// All registered codec names.
    pub fn names() -> impl Iterator<Item = &'static str> {
        Codec::iter().map(Codec::name)
    }

    /// Compress a stream of bytes in-place.
    pub fn compress(self, stream: &mut Vec<u8>) -> AvroResult<()> {
        match self {
            Codec::Null => (),
            Codec::Deflate(settings) => {
                let compressed =
                    miniz_oxide::deflate::compress_to_vec(stream, settings.compression_level());
                *stream = compressed;
            }
            #[cfg(feature = "snappy")]
            Codec::Snappy => {
                let mut encoded: Vec<u8> = vec![0; snap::raw::max_compress_len(stream.len())];
                let compressed_size = snap::raw::Encoder::new()
                    .compress(&stream[..], &mut encoded[..])
                    .map_err(Details::SnappyCompress)?;

                let mut hasher = crc32fast::Hasher::new();
                hasher.update(&stream[..]);
                let checksum = hasher.finalize();
                let checksum_as_bytes = checksum.to_be_bytes();
                let checksum_len = checksum_as_bytes.len();
                encoded.truncate(compressed_size + checksum_len);
                encoded[compressed_size..].copy_from_slice(&checksum_as_bytes);

                *stream = encoded;
            }
            #[cfg(not(feature = "snappy"))]
            Codec::Snappy => return Err(Error::CodecUnavailable(self.name())),
        };

        Ok(())
    }

    /// Decompress a stream of bytes in-place.
    pub fn decompress(self, stream: &mut Vec<u8>) -> AvroResult<()> {
        *stream = match self {
            Codec::Null => return Ok(()),
            Codec::Deflate(_settings) => miniz_oxide::inflate::decompress_to_vec(stream).map_err(|e| {
                let err = {
                    use miniz_oxide::inflate::TINFLStatus::*;
                    use std::io::{Error, ErrorKind};
                    match e.status {
                        FailedCannotMakeProgress | NeedsMoreInput => Error::from(ErrorKind::UnexpectedEof),
                        Adler32Mismatch | Failed => Error::from(ErrorKind::InvalidData),
                        status => Error::other(format!("Unexpected inflate status: {status:?}")),
                    }
                };
                Error::new(Details::DeflateDecompress(err))
            })?,
            #[cfg(feature = "snappy")]
            Codec::Snappy => {
                if stream.len() < 4 {
                    return Err(Details::SnappyPayloadTooShort(stream.len()).into());
                }
                let (compressed, checksum) = stream.split_at(stream.len() - 4);
                let decompressed_size = snap::raw::decompress_len(compressed)
                    .map_err(Details::GetSnappyDecompressLen)?;
                let mut decoded = vec![0; crate::util::safe_len(decompressed_size)?];
                snap::raw::Decoder::new()
                    .decompress(compressed, &mut decoded[..])
                    .map_err(Details::SnappyDecompress)?;

                let mut last_four: [u8; 4] = [0; 4];
                last_four.copy_from_slice(checksum);
                let expected: u32 = u32::from_be_bytes(last_four);

                let mut hasher = crc32fast::Hasher::new();
                hasher.update(&decoded);
                let actual = hasher.finalize();

                if expected != actual {
                    return Err(Error::SnappyCrc32(expected, actual));
                }
                decoded
            }
            #[cfg(not(feature = "snappy"))]
            Codec::Snappy => return Err(Error::CodecUnavailable(self.name())),
        };
        Ok(())
    }
}
