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

//! Logic handling writing object container files.

use crate::{
    AvroResult, Codec, Datum, Reader, Schema,
    error::Details,
    metadata::{
        self, CODEC_KEY, MAGIC, Metadata, SCHEMA_KEY, SYNC_INTERVAL, SYNC_SIZE, SyncMarker,
    },
    util,
};
use log::{debug, warn};
use std::{
    io::{Read, Seek, SeekFrom, Write},
    mem::ManuallyDrop,
};

/// Main interface for writing object container files.
///
/// Records are staged in memory and written out as one block whenever the staging buffer
/// reaches `block_size` bytes, on [`flush`](Writer::flush), and on [`close`](Writer::close).
///
/// It is critical to call `close` (or [`into_inner`](Writer::into_inner)) before the `Writer` is
/// dropped: records still staged at drop time are lost.
///
/// Writes are not transactional. If writing a block fails halfway, the sink is left with an
/// unspecified trailing state and should not be appended to before it has been validated again.
/// The `Writer` itself refuses any further work after such a failure.
pub struct Writer<W: Write, S> {
    schema: S,
    writer: W,
    codec: Codec,
    block_size: usize,
    buffer: Vec<u8>,
    num_values: usize,
    marker: SyncMarker,
    /// Set once writing to the sink failed.
    poisoned: bool,
}

#[bon::bon]
impl<W: Write, S: Schema> Writer<W, S> {
    /// Create a new container file. The header is written to `writer` right away.
    #[builder]
    pub fn builder(
        schema: S,
        writer: W,
        #[builder(default = Codec::Null)] codec: Codec,
        #[builder(default = SYNC_INTERVAL)] block_size: usize,
        #[builder(default = generate_sync_marker())] marker: SyncMarker,
        /// Extra header entries. Keys must not start with `avro.`.
        #[builder(default)]
        user_metadata: Metadata,
    ) -> AvroResult<Self> {
        let mut writer = Self {
            schema,
            writer,
            codec,
            block_size,
            buffer: Vec::with_capacity(block_size),
            num_values: 0,
            marker,
            poisoned: false,
        };
        writer.write_header(user_metadata)?;
        Ok(writer)
    }
}

impl<W: Write, S: Schema> Writer<W, S> {
    /// Creates a `Writer` given a `Schema` and something implementing the `io::Write` trait to write
    /// to.
    /// No compression `Codec` will be used.
    pub fn new(schema: S, writer: W) -> AvroResult<Self> {
        Writer::with_codec(schema, writer, Codec::Null)
    }

    /// Creates a `Writer` with a specific `Codec` given a `Schema` and something implementing the
    /// `io::Write` trait to write to.
    pub fn with_codec(schema: S, writer: W, codec: Codec) -> AvroResult<Self> {
        Self::builder()
            .schema(schema)
            .writer(writer)
            .codec(codec)
            .build()
    }

    /// Get a reference to the `Schema` associated to a `Writer`.
    pub fn schema(&self) -> &S {
        &self.schema
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn marker(&self) -> &SyncMarker {
        &self.marker
    }

    /// Append a record to the `Writer`.
    ///
    /// Returns the number of bytes written (it might be 0, see below).
    ///
    /// **NOTE**: This function is not guaranteed to perform any actual write, since it relies on
    /// internal buffering for performance reasons. If you want to be sure the value has been
    /// written, then call [`flush`](Writer::flush).
    pub fn append<D: Datum<S>>(&mut self, datum: &D) -> AvroResult<usize> {
        if self.poisoned {
            return Err(Details::WriterPoisoned.into());
        }
        let start = self.buffer.len();
        if let Err(e) = datum.encode(&self.schema, &mut self.buffer) {
            self.buffer.truncate(start);
            return Err(e);
        }
        self.num_values += 1;

        if self.buffer.len() >= self.block_size {
            return self.flush_block();
        }

        Ok(0)
    }

    /// Extend a `Writer` with an `Iterator` of records.
    ///
    /// Returns the number of bytes written.
    ///
    /// **NOTE**: This function forces the written data to be flushed (an implicit
    /// call to [`flush`](Writer::flush) is performed).
    pub fn extend<I, D>(&mut self, values: I) -> AvroResult<usize>
    where
        I: IntoIterator<Item = D>,
        D: Datum<S>,
    {
        let mut num_bytes = 0;
        for value in values {
            num_bytes += self.append(&value)?;
        }
        num_bytes += self.flush()?;

        Ok(num_bytes)
    }

    /// Write the staged records as one block, then flush the inner writer.
    ///
    /// Nothing is written when no record is staged.
    ///
    /// Returns the number of bytes written.
    pub fn flush(&mut self) -> AvroResult<usize> {
        let num_bytes = self.flush_block()?;
        if let Err(e) = self.writer.flush() {
            self.poisoned = true;
            return Err(Details::FlushWriter(e).into());
        }
        Ok(num_bytes)
    }

    /// Flush the last block and the inner writer, then release it.
    pub fn close(self) -> AvroResult<()> {
        self.into_inner().map(drop)
    }

    /// Return what the `Writer` is writing to, consuming the `Writer` itself.
    ///
    /// **NOTE**: This function forces the written data to be flushed (an implicit
    /// call to [`flush`](Writer::flush) is performed).
    pub fn into_inner(mut self) -> AvroResult<W> {
        self.flush()?;

        let mut this = ManuallyDrop::new(self);

        // Extract every member that is not Copy and therefore should be dropped
        let _buffer = std::mem::take(&mut this.buffer);
        // SAFETY: schema is not accessed after this and won't be dropped again because of ManuallyDrop
        unsafe { std::ptr::drop_in_place(&mut this.schema) };

        // SAFETY: double-drops are prevented by putting `this` in a ManuallyDrop that is never dropped
        let writer = unsafe { std::ptr::read(&this.writer) };

        Ok(writer)
    }

    /// Gets a reference to the underlying writer.
    ///
    /// **NOTE**: There is likely data still in the buffer. To have all the data
    /// in the writer call [`flush`](Writer::flush) first.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Write the staged records as one block and reset the staging buffer.
    ///
    /// Any failure poisons the `Writer`, the staged records are never written twice.
    fn flush_block(&mut self) -> AvroResult<usize> {
        if self.poisoned {
            return Err(Details::WriterPoisoned.into());
        }
        if self.num_values == 0 {
            return Ok(0);
        }

        match self.write_block() {
            Ok(num_bytes) => {
                self.buffer.clear();
                self.num_values = 0;
                Ok(num_bytes)
            }
            Err(e) => {
                self.poisoned = true;
                Err(e)
            }
        }
    }

    /// Encode the staged records as one block: item count, payload length, payload, marker.
    fn write_block(&mut self) -> AvroResult<usize> {
        let mut block = self.buffer.clone();
        self.codec.compress(&mut block)?;

        let num_bytes = util::zig_len(self.num_values, &mut self.writer)?
            + util::zig_len(block.len(), &mut self.writer)?
            + self.append_bytes(&block)?
            + self.append_marker()?;

        debug!(
            "Wrote block of {} items ({} bytes staged, {} on disk)",
            self.num_values,
            self.buffer.len(),
            block.len()
        );
        Ok(num_bytes)
    }

    fn append_bytes(&mut self, bytes: &[u8]) -> AvroResult<usize> {
        self.writer.write_all(bytes).map_err(Details::WriteBytes)?;
        Ok(bytes.len())
    }

    fn append_marker(&mut self) -> AvroResult<usize> {
        self.writer
            .write_all(&self.marker)
            .map_err(Details::WriteMarker)?;
        Ok(SYNC_SIZE)
    }

    /// Create the header from schema, codec, user metadata and sync marker and write it.
    fn write_header(&mut self, user_metadata: Metadata) -> AvroResult<usize> {
        let mut metadata = Metadata::with_capacity(user_metadata.len() + 2);
        for (key, value) in user_metadata {
            if metadata::is_reserved_key(&key) {
                return Err(Details::InvalidMetadataKey(key).into());
            }
            metadata.insert(key, value);
        }
        metadata.insert(
            SCHEMA_KEY.to_string(),
            self.schema.canonical_form()?.into_bytes(),
        );
        metadata.insert(CODEC_KEY.to_string(), self.codec.name().as_bytes().to_vec());

        let mut header = Vec::new();
        header.extend_from_slice(&MAGIC);
        metadata::write_metadata(&metadata, &mut header)?;
        header.extend_from_slice(&self.marker);

        self.writer
            .write_all(&header)
            .map_err(Details::WriteBytes)?;
        debug!(
            "Wrote header with codec '{}' ({} bytes)",
            self.codec.name(),
            header.len()
        );
        Ok(header.len())
    }
}

impl<W: Read + Write + Seek, S: Schema> Writer<W, S> {
    /// Creates a `Writer` that appends records to an existing container file.
    ///
    /// The sync marker, codec and schema are taken over from the file's header, which is left
    /// untouched. New blocks are written at the end of `writer`.
    pub fn append_to(mut writer: W) -> AvroResult<Self> {
        let header = Reader::<_, S>::new(&mut writer)?.into_header();
        let end = writer.seek(SeekFrom::End(0)).map_err(Details::Seek)?;
        debug!(
            "Appending to container with codec '{}' at offset {end}",
            header.codec.name()
        );

        Ok(Self {
            schema: header.schema,
            writer,
            codec: header.codec,
            block_size: SYNC_INTERVAL,
            buffer: Vec::with_capacity(SYNC_INTERVAL),
            num_values: 0,
            marker: header.marker,
            poisoned: false,
        })
    }
}

impl<W: Write, S> Drop for Writer<W, S> {
    /// Records still staged are not written, since errors cannot be reported from here.
    fn drop(&mut self) {
        if self.num_values > 0 {
            warn!(
                "Writer dropped with {} unflushed records; call `close` to persist them",
                self.num_values
            );
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn generate_sync_marker() -> SyncMarker {
    rand::random()
}

#[cfg(target_arch = "wasm32")]
fn generate_sync_marker() -> SyncMarker {
    let mut marker = [0_u8; SYNC_SIZE];
    std::iter::repeat_with(quad_rand::rand)
        .take(4)
        .flat_map(|i| i.to_be_bytes())
        .enumerate()
        .for_each(|(i, n)| marker[i] = n);
    marker
}
