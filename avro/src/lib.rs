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

//! Reader and writer for **[Apache Avro](https://avro.apache.org/)** object container files.
//!
//! An object container file bundles a schema, a compression codec and a sequence of records
//! into one self-describing byte stream:
//!
//! ```text
//! Header := 'O' 'b' 'j' 0x01  METADATA  SYNC(16)
//! Block  := COUNT  LENGTH  PAYLOAD(LENGTH)  SYNC(16)
//! ```
//!
//! This crate owns the framing only. How a single record becomes bytes is decided by the
//! [`Datum`] trait, and how the schema stored under `avro.schema` is parsed is decided by the
//! [`Schema`] trait. Both are implemented for a few simple types (`serde_json::Value` and
//! `String` schemas, primitive datums) to get started.
//!
//! ```
//! # use avro_container::{Codec, Reader, Writer};
//! # use std::io::Cursor;
//! let schema: serde_json::Value = serde_json::json!("string");
//! let mut writer = Writer::with_codec(schema, Vec::new(), Codec::Null)?;
//! writer.append(&"hello".to_string())?;
//! writer.append(&"world".to_string())?;
//! let bytes = writer.into_inner()?;
//!
//! let mut reader = Reader::<_, serde_json::Value>::new(Cursor::new(bytes))?;
//! assert_eq!(reader.data::<String>()?, ["hello", "world"]);
//! # Ok::<(), avro_container::Error>(())
//! ```
//!
//! # Features
//!
//! - `snappy` (default): enable support for the Snappy codec. Without it, files using the
//!   codec can still be opened, but reading or writing a block fails.

mod codec;
mod datum;
mod reader;
mod schema;
mod writer;

pub mod error;
pub mod metadata;
pub mod util;

pub use codec::{Codec, DeflateSettings};
pub use datum::Datum;
pub use error::Error;
pub use metadata::{Metadata, SyncMarker};
pub use reader::{Reader, Records, read_marker};
pub use schema::Schema;
pub use writer::{Writer, WriterBuilder};

use error::Details;
use log::debug;
use std::{
    fs::{File, OpenOptions},
    io::BufReader,
    path::Path,
};

/// A convenience type alias for `Result`s with `Error`s.
pub type AvroResult<T> = Result<T, Error>;

/// How [`open`] accesses a file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    /// Read an existing file.
    Read,
    /// Create a new file, replacing any existing one. A schema is required.
    Write,
    /// Add records to an existing file, keeping its schema, codec and sync marker.
    Append,
}

/// A file opened by [`open`].
pub enum Container<S> {
    Reader(Reader<BufReader<File>, S>),
    Writer(Writer<File, S>),
}

impl<S> Container<S> {
    pub fn into_reader(self) -> Option<Reader<BufReader<File>, S>> {
        match self {
            Container::Reader(reader) => Some(reader),
            Container::Writer(_) => None,
        }
    }

    pub fn into_writer(self) -> Option<Writer<File, S>> {
        match self {
            Container::Writer(writer) => Some(writer),
            Container::Reader(_) => None,
        }
    }
}

/// Open the container file at `path`.
///
/// `schema` is required for [`Mode::Write`]; `codec` is the name of the codec to use for a new
/// file and defaults to `null`. Both are ignored for [`Mode::Read`] and [`Mode::Append`], where
/// the file's own header decides.
pub fn open<S: Schema>(
    path: impl AsRef<Path>,
    mode: Mode,
    schema: Option<S>,
    codec: Option<&str>,
) -> AvroResult<Container<S>> {
    let path = path.as_ref();
    let open_err = |source| Details::OpenFile {
        path: path.to_path_buf(),
        source,
    };
    match mode {
        Mode::Read => {
            let file = File::open(path).map_err(open_err)?;
            Ok(Container::Reader(Reader::new(BufReader::new(file))?))
        }
        Mode::Write => {
            let codec = codec.map(Codec::from_name).transpose()?.unwrap_or(Codec::Null);
            let schema = schema.ok_or(Details::MissingSchema)?;
            let file = File::create(path).map_err(open_err)?;
            Ok(Container::Writer(Writer::with_codec(schema, file, codec)?))
        }
        Mode::Append => {
            if schema.is_some() || codec.is_some() {
                debug!("Ignoring schema and codec when appending to {}", path.display());
            }
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .map_err(open_err)?;
            Ok(Container::Writer(Writer::append_to(file)?))
        }
    }
}

#[cfg(test)]
pub(crate) type TestResult = anyhow::Result<()>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn open_write_requires_schema() -> TestResult {
        let dir = tempfile::tempdir()?;
        let result = open::<String>(dir.path().join("out.avro"), Mode::Write, None, None);
        match result {
            Err(e) => assert!(matches!(e.details(), Details::MissingSchema)),
            Ok(_) => panic!("a schema is required"),
        }
        Ok(())
    }

    #[test]
    fn open_write_rejects_unknown_codec_before_creating_the_file() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.avro");
        let result = open(&path, Mode::Write, Some(r#""long""#.to_string()), Some("brotli"));
        match result {
            Err(e) => assert!(matches!(e.details(), Details::CodecNotSupported(name) if name == "brotli")),
            Ok(_) => panic!("brotli is not registered"),
        }
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn open_missing_file() {
        let result = open::<String>("/nonexistent/dir/file.avro", Mode::Read, None, None);
        match result {
            Err(e) => assert!(matches!(e.details(), Details::OpenFile { .. })),
            Ok(_) => panic!("file does not exist"),
        }
    }

    #[test]
    fn open_write_then_read() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("longs.avro");

        let mut writer = open(&path, Mode::Write, Some(r#""long""#.to_string()), Some("deflate"))?
            .into_writer()
            .expect("write mode yields a writer");
        writer.extend([1i64, 2, 3])?;
        writer.close()?;

        let mut reader = open::<String>(&path, Mode::Read, None, None)?
            .into_reader()
            .expect("read mode yields a reader");
        assert_eq!(reader.codec(), Codec::Deflate(DeflateSettings::default()));
        assert_eq!(reader.data::<i64>()?, [1, 2, 3]);
        Ok(())
    }
}
