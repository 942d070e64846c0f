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

//! Format constants and the metadata envelope stored in the file header.

use crate::{AvroResult, error::Details, util};
use std::{
    collections::HashMap,
    io::{Read, Write},
    sync::LazyLock,
};

/// The four magic bytes every object container file starts with.
pub const MAGIC: [u8; 4] = [b'O', b'b', b'j', 1u8];

/// Length of the synchronization marker written after the header and after every block.
pub const SYNC_SIZE: usize = 16;

/// Size of the staging buffer, in bytes, at which a writer emits a block on its own.
pub const SYNC_INTERVAL: usize = 64_000;

pub const SCHEMA_KEY: &str = "avro.schema";
pub const CODEC_KEY: &str = "avro.codec";

/// Prefix of the keys reserved for the format itself.
pub const RESERVED_PREFIX: &str = "avro.";

/// The 16 byte synchronization marker.
pub type SyncMarker = [u8; SYNC_SIZE];

/// Header metadata: string keys mapped to raw byte values.
pub type Metadata = HashMap<String, Vec<u8>>;

/// The schema of the header metadata, `map<bytes>`.
///
/// Informational only: [`write_metadata`] and [`read_metadata`] encode this layout directly,
/// and the reader logs it when decoding a header.
pub static METADATA_SCHEMA: LazyLock<serde_json::Value> =
    LazyLock::new(|| serde_json::json!({"type": "map", "values": "bytes"}));

/// Encode `metadata` as a `map<bytes>`.
///
/// Non-empty maps are written as a single block followed by the terminating zero count.
pub fn write_metadata<W: Write>(metadata: &Metadata, mut writer: W) -> AvroResult<usize> {
    let mut n = 0;
    if !metadata.is_empty() {
        n += util::zig_len(metadata.len(), &mut writer)?;
        for (key, value) in metadata {
            n += util::write_string(key, &mut writer)?;
            n += util::write_bytes(value, &mut writer)?;
        }
    }
    n += util::zig_i64(0, &mut writer)?;
    Ok(n)
}

/// Decode a `map<bytes>`.
///
/// A negative block count is followed by the block size in bytes, which is skipped over as it
/// is not needed to read the entries.
pub fn read_metadata<R: Read>(reader: &mut R) -> AvroResult<Metadata> {
    let mut metadata = Metadata::new();
    loop {
        let count = util::read_long(reader)?;
        if count == 0 {
            break;
        }
        if count < 0 {
            let _block_size = util::read_long(reader)?;
        }
        for _ in 0..count.unsigned_abs() {
            let key = util::read_string(reader)?;
            let value = util::read_bytes(reader)?;
            if metadata.insert(key, value).is_some() {
                return Err(Details::GetHeaderMetadata("duplicate key".to_string()).into());
            }
        }
    }
    Ok(metadata)
}

/// Whether `key` belongs to the format rather than to the user.
pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestResult;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_metadata_is_a_zero_count() -> TestResult {
        let mut buf = Vec::new();
        assert_eq!(write_metadata(&Metadata::new(), &mut buf)?, 1);
        assert_eq!(buf, [0]);
        assert!(read_metadata(&mut buf.as_slice())?.is_empty());
        Ok(())
    }

    #[test]
    fn single_entry_layout() -> TestResult {
        let mut metadata = Metadata::new();
        metadata.insert(CODEC_KEY.to_string(), b"null".to_vec());

        let mut buf = Vec::new();
        write_metadata(&metadata, &mut buf)?;

        let mut expected = vec![2, 20];
        expected.extend_from_slice(b"avro.codec");
        expected.push(8);
        expected.extend_from_slice(b"null");
        expected.push(0);
        assert_eq!(buf, expected);

        assert_eq!(read_metadata(&mut buf.as_slice())?, metadata);
        Ok(())
    }

    #[test]
    fn reads_blocks_with_negative_count() -> TestResult {
        // count -1, block size 6, "k" => "v", then a second block with 1 entry
        let encoded: &[u8] = &[1, 12, 2, b'k', 2, b'v', 2, 2, b'x', 0, 0];
        let metadata = read_metadata(&mut &*encoded)?;
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata["k"], b"v");
        assert_eq!(metadata["x"], b"");
        Ok(())
    }

    #[test]
    fn rejects_duplicate_keys() {
        let encoded: &[u8] = &[4, 2, b'k', 0, 2, b'k', 0, 0];
        assert!(matches!(
            read_metadata(&mut &*encoded).unwrap_err().details(),
            Details::GetHeaderMetadata(_)
        ));
    }

    #[test]
    fn metadata_schema_is_a_map_of_bytes() {
        assert_eq!(METADATA_SCHEMA["type"], "map");
        assert_eq!(METADATA_SCHEMA["values"], "bytes");
    }

    #[test]
    fn reserved_keys() {
        assert!(is_reserved_key(SCHEMA_KEY));
        assert!(is_reserved_key("avro.codec.compression_level"));
        assert!(!is_reserved_key("avroish"));
    }
}
