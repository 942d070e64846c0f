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

use crate::{
    AvroResult, Codec, Datum, Schema,
    error::{Details, Error, ErrorKind},
    metadata::{
        self, CODEC_KEY, MAGIC, METADATA_SCHEMA, Metadata, SCHEMA_KEY, SYNC_SIZE, SyncMarker,
    },
    util,
};
use log::{debug, trace, warn};
use std::io::{self, Read, Seek, SeekFrom};

/// Everything recovered from a container header.
#[derive(Debug, Clone)]
pub(crate) struct Header<S> {
    pub(crate) marker: SyncMarker,
    pub(crate) codec: Codec,
    pub(crate) schema: S,
    pub(crate) metadata: Metadata,
    pub(crate) user_metadata: Metadata,
}

/// Internal Block reader.
#[derive(Debug)]
pub(super) struct Block<R, S> {
    reader: R,
    /// Internal buffering to reduce allocation.
    buf: Vec<u8>,
    buf_idx: usize,
    /// Number of elements expected to exist within this block.
    message_count: usize,
    /// First byte of the next block, read while probing for the end of the source.
    lookahead: Option<u8>,
    pub(super) header: Header<S>,
}

impl<R, S> Block<R, S> {
    pub(super) fn into_parts(self) -> (R, Header<S>) {
        (self.reader, self.header)
    }
}

impl<R: Read + Seek, S: Schema> Block<R, S> {
    pub(super) fn new(mut reader: R) -> AvroResult<Block<R, S>> {
        reader.seek(SeekFrom::Start(0)).map_err(Details::Seek)?;
        let header = read_header(&mut reader)?;
        Ok(Block {
            reader,
            buf: vec![],
            buf_idx: 0,
            message_count: 0,
            lookahead: None,
            header,
        })
    }

    /// Probe one byte to find out whether the source is exhausted.
    ///
    /// The probed byte is kept in `lookahead` rather than seeking back, so buffered sources keep
    /// their buffer.
    fn is_at_end(&mut self) -> AvroResult<bool> {
        if self.lookahead.is_some() {
            return Ok(false);
        }
        let mut probe = [0u8; 1];
        loop {
            match self.reader.read(&mut probe) {
                Ok(0) => return Ok(true),
                Ok(_) => {
                    self.lookahead = Some(probe[0]);
                    return Ok(false);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Details::ReadIntoBuf(e).into()),
            }
        }
    }

    /// Consume the sync marker if the next bytes are one, otherwise leave the position unchanged.
    ///
    /// Right after the header the marker has already been consumed, so the peek does not match
    /// and the bytes are given back to the block header.
    fn skip_marker(&mut self) -> AvroResult<()> {
        let mut peek = [0u8; SYNC_SIZE];
        let mut filled = 0;
        if let Some(byte) = self.lookahead {
            peek[0] = byte;
            filled = 1;
        }
        while filled < SYNC_SIZE {
            match self.reader.read(&mut peek[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Details::ReadMarker(e).into()),
            }
        }

        if filled == SYNC_SIZE && peek == self.header.marker {
            trace!("Consumed sync marker");
            self.lookahead = None;
            return Ok(());
        }

        // the lookahead byte stays pending, only what came from the source is given back
        let from_source = filled - usize::from(self.lookahead.is_some());
        trace!("No sync marker at block boundary, rewinding {from_source} bytes");
        if from_source > 0 {
            self.reader
                .seek(SeekFrom::Current(-(from_source as i64)))
                .map_err(Details::Seek)?;
        }
        Ok(())
    }

    fn fill_buf(&mut self, n: usize) -> AvroResult<()> {
        // The buffer needs to contain exactly `n` elements, otherwise codecs will potentially read
        // invalid bytes.
        self.buf.resize(util::safe_len(n)?, 0);
        self.reader
            .read_exact(&mut self.buf)
            .map_err(Details::ReadIntoBuf)?;
        self.buf_idx = 0;
        Ok(())
    }

    /// Try to read the next data block into the internal buffer.
    ///
    /// Returns `false` once the source is exhausted at a block boundary.
    fn read_block_next(&mut self) -> AvroResult<bool> {
        assert!(self.is_empty(), "Expected self to be empty!");
        if self.is_at_end()? {
            return Ok(false);
        }
        self.skip_marker()?;
        if self.is_at_end()? {
            return Ok(false);
        }

        let lookahead = self.lookahead.take();
        let mut head = lookahead.as_slice().chain(&mut self.reader);
        let message_count = util::read_long(&mut head)?;
        let message_count = usize::try_from(message_count).map_err(|_| Details::BlockHeader {
            name: "item count",
            value: message_count,
        })?;
        let block_bytes = util::read_long(&mut head)?;
        let block_bytes = usize::try_from(block_bytes).map_err(|_| Details::BlockHeader {
            name: "payload length",
            value: block_bytes,
        })?;

        self.fill_buf(block_bytes)?;
        self.header.codec.decompress(&mut self.buf)?;
        debug!(
            "Read block of {message_count} items ({block_bytes} bytes on disk, {} decoded)",
            self.buf.len()
        );
        self.message_count = message_count;
        Ok(true)
    }

    fn len(&self) -> usize {
        self.message_count
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(super) fn read_next<D: Datum<S>>(&mut self) -> AvroResult<Option<D>> {
        while self.is_empty() {
            if !self.read_block_next()? {
                return Ok(None);
            }
        }

        let mut block_bytes = &self.buf[self.buf_idx..];
        let b_original = block_bytes.len();

        let item = D::decode(&self.header.schema, &mut block_bytes)?;

        if b_original != 0 && b_original == block_bytes.len() {
            // decode did not consume any bytes, so return an error to avoid an infinite loop
            return Err(Details::ReadBlock.into());
        }
        self.buf_idx += b_original - block_bytes.len();
        self.message_count -= 1;
        Ok(Some(item))
    }
}

/// Read the magic, the metadata and the sync marker, then resolve the codec and the schema.
fn read_header<R: Read, S: Schema>(reader: &mut R) -> AvroResult<Header<S>> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(Details::ReadHeader)?;

    if buf != MAGIC {
        return Err(Details::HeaderMagic.into());
    }

    debug!("Reading header metadata as {}", *METADATA_SCHEMA);
    let metadata = metadata::read_metadata(reader).map_err(|e| match e.kind() {
        ErrorKind::Format => e,
        _ => Error::from(Details::GetHeaderMetadata(e.to_string())),
    })?;

    let mut marker = [0u8; SYNC_SIZE];
    reader.read_exact(&mut marker).map_err(Details::ReadMarker)?;

    let codec = read_codec(&metadata)?;
    let schema = read_writer_schema(&metadata)?;

    let mut user_metadata = Metadata::new();
    for (key, value) in &metadata {
        if key == SCHEMA_KEY || key == CODEC_KEY {
            // already processed
        } else if metadata::is_reserved_key(key) {
            warn!("Ignoring unknown metadata key: {key}");
        } else {
            user_metadata.insert(key.clone(), value.clone());
        }
    }

    debug!(
        "Read header with codec '{}' and {} user metadata entries",
        codec.name(),
        user_metadata.len()
    );
    Ok(Header {
        marker,
        codec,
        schema,
        metadata,
        user_metadata,
    })
}

fn read_codec(metadata: &Metadata) -> AvroResult<Codec> {
    match metadata.get(CODEC_KEY) {
        Some(bytes) => {
            let name = std::str::from_utf8(bytes)
                .map_err(|_| Details::CodecNotSupported(String::from_utf8_lossy(bytes).into()))?;
            Codec::from_name(name)
        }
        None => Ok(Codec::Null),
    }
}

fn read_writer_schema<S: Schema>(metadata: &Metadata) -> AvroResult<S> {
    let bytes = metadata
        .get(SCHEMA_KEY)
        .ok_or(Details::GetAvroSchemaFromMap)?;
    let text = String::from_utf8(bytes.clone()).map_err(Details::ConvertToUtf8)?;
    S::parse_str(&text)
}
