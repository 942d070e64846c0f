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

//! Logic handling reading from object container files.

mod block;

pub(crate) use block::Header;

use crate::{
    AvroResult, Codec, Datum, Schema,
    metadata::{Metadata, SyncMarker},
};
use block::Block;
use std::{
    io::{Read, Seek},
    marker::PhantomData,
};

/// Main interface for reading object container files.
///
/// The header is parsed eagerly by [`Reader::new`]; records are then pulled one at a time,
/// either with [`read_next`](Reader::read_next), the lazy [`records`](Reader::records)
/// iterator, or all at once with [`data`](Reader::data):
///
/// ```no_run
/// # use avro_container::Reader;
/// # use std::io::Cursor;
/// # let input = Cursor::new(Vec::<u8>::new());
/// let mut reader = Reader::<_, serde_json::Value>::new(input).unwrap();
/// for value in reader.records::<String>() {
///     match value {
///         Ok(v) => println!("{v}"),
///         Err(e) => println!("Error: {e}"),
///     };
/// }
/// ```
///
/// The first error ends the sequence: the reader yields nothing afterwards.
pub struct Reader<R, S> {
    block: Block<R, S>,
    errored: bool,
}

impl<R: Read + Seek, S: Schema> Reader<R, S> {
    /// Creates a `Reader` over something implementing `io::Read` and `io::Seek`.
    ///
    /// The source is rewound to its start and the header is read and validated: the magic
    /// bytes, the metadata, the sync marker, the codec named under `avro.codec` and the schema
    /// stored under `avro.schema`.
    pub fn new(reader: R) -> AvroResult<Self> {
        Ok(Reader {
            block: Block::new(reader)?,
            errored: false,
        })
    }

    /// Read the next record, or `None` once the file is exhausted.
    pub fn read_next<D: Datum<S>>(&mut self) -> AvroResult<Option<D>> {
        // to prevent keep on reading after the first error occurs
        if self.errored {
            return Ok(None);
        }
        self.block.read_next().inspect_err(|_| self.errored = true)
    }

    /// A lazy, forward-only iterator over the remaining records.
    ///
    /// Dropping the iterator early leaves the reader usable; records not yet pulled can still
    /// be read from it later.
    pub fn records<D: Datum<S>>(&mut self) -> Records<'_, R, S, D> {
        Records {
            reader: self,
            _datum: PhantomData,
        }
    }

    /// Read all the remaining records into a `Vec`.
    pub fn data<D: Datum<S>>(&mut self) -> AvroResult<Vec<D>> {
        self.records().collect()
    }
}

impl<R, S> Reader<R, S> {
    /// Get a reference to the writer `Schema`.
    #[inline]
    pub fn writer_schema(&self) -> &S {
        &self.block.header.schema
    }

    #[inline]
    pub fn codec(&self) -> Codec {
        self.block.header.codec
    }

    /// The sync marker shared by every block of the file.
    #[inline]
    pub fn marker(&self) -> &SyncMarker {
        &self.block.header.marker
    }

    /// The whole header metadata, reserved `avro.*` keys included.
    #[inline]
    pub fn metadata(&self) -> &Metadata {
        &self.block.header.metadata
    }

    /// Get a reference to the user metadata
    #[inline]
    pub fn user_metadata(&self) -> &Metadata {
        &self.block.header.user_metadata
    }

    /// Release the underlying source.
    pub fn into_inner(self) -> R {
        self.block.into_parts().0
    }

    pub(crate) fn into_header(self) -> Header<S> {
        self.block.into_parts().1
    }
}

/// Iterator returned by [`Reader::records`].
pub struct Records<'a, R, S, D> {
    reader: &'a mut Reader<R, S>,
    _datum: PhantomData<fn() -> D>,
}

impl<R: Read + Seek, S: Schema, D: Datum<S>> Iterator for Records<'_, R, S, D> {
    type Item = AvroResult<D>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read_next().transpose()
    }
}

/// Read the sync marker of a file, given its bytes.
///
/// Returns `None` when `bytes` is not a well-formed header.
pub fn read_marker(bytes: &[u8]) -> Option<SyncMarker> {
    Reader::<_, String>::new(std::io::Cursor::new(bytes))
        .ok()
        .map(|reader| *reader.marker())
}
