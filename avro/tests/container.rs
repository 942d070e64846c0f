use avro_container::{
    AvroResult, Codec, Datum, DeflateSettings, Mode, Reader, Writer,
    error::{Details, ErrorKind},
    metadata::{SYNC_INTERVAL, SYNC_SIZE},
    open, util,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::Value;
use std::io::{Cursor, Read, Write};

type TestResult = anyhow::Result<()>;

const SCHEMA: &str = r#"
{
  "type": "record",
  "name": "reading",
  "fields": [
    {"name": "sensor", "type": "string"},
    {"name": "value", "type": "long"}
  ]
}
"#;

#[derive(Debug, Clone, PartialEq)]
struct Reading {
    sensor: String,
    value: i64,
}

impl Datum<Value> for Reading {
    fn encode<W: Write>(&self, _schema: &Value, writer: &mut W) -> AvroResult<()> {
        util::write_string(&self.sensor, &mut *writer)?;
        util::zig_i64(self.value, &mut *writer)?;
        Ok(())
    }

    fn decode<R: Read>(_schema: &Value, reader: &mut R) -> AvroResult<Self> {
        Ok(Reading {
            sensor: util::read_string(reader)?,
            value: util::read_long(reader)?,
        })
    }
}

fn schema() -> Value {
    serde_json::from_str(SCHEMA).unwrap()
}

fn readings(n: usize) -> Vec<Reading> {
    (0..n)
        .map(|i| Reading {
            sensor: format!("sensor-{}", i % 7),
            value: i as i64 * 31 - 1000,
        })
        .collect()
}

fn write_all(codec: Codec, records: &[Reading]) -> AvroResult<Vec<u8>> {
    let mut writer = Writer::with_codec(schema(), Vec::new(), codec)?;
    for record in records {
        writer.append(record)?;
    }
    writer.into_inner()
}

fn read_all(bytes: Vec<u8>) -> AvroResult<Vec<Reading>> {
    Reader::<_, Value>::new(Cursor::new(bytes))?.data()
}

fn count_markers(bytes: &[u8], marker: &[u8]) -> usize {
    bytes.windows(SYNC_SIZE).filter(|w| *w == marker).count()
}

fn check_round_trip(codec: Codec) -> TestResult {
    let records = readings(500);
    let bytes = write_all(codec, &records)?;

    let mut reader = Reader::<_, Value>::new(Cursor::new(bytes))?;
    assert_eq!(reader.codec(), codec);
    assert_eq!(reader.writer_schema(), &schema());
    assert_eq!(reader.data::<Reading>()?, records);
    Ok(())
}

fn check_empty_file(codec: Codec) -> TestResult {
    let writer = Writer::with_codec(schema(), Vec::new(), codec)?;
    let marker = *writer.marker();
    let bytes = writer.into_inner()?;

    assert!(bytes.ends_with(&marker));
    assert_eq!(count_markers(&bytes, &marker), 1);
    assert!(read_all(bytes)?.is_empty());
    Ok(())
}

fn check_append_round_trip(codec: Codec) -> TestResult {
    let first = readings(40);
    let second = readings(25);

    let mut writer = Writer::with_codec(schema(), Cursor::new(Vec::new()), codec)?;
    for record in &first {
        writer.append(record)?;
    }
    let marker = *writer.marker();
    let cursor = writer.into_inner()?;

    let mut writer = Writer::<_, Value>::append_to(cursor)?;
    assert_eq!(writer.marker(), &marker);
    assert_eq!(writer.codec(), codec);
    writer.extend(second.iter().cloned())?;
    let bytes = writer.into_inner()?.into_inner();

    let mut reader = Reader::<_, Value>::new(Cursor::new(bytes))?;
    assert_eq!(reader.marker(), &marker);
    assert_eq!(reader.codec(), codec);
    let all = reader.data::<Reading>()?;
    assert_eq!(all.len(), first.len() + second.len());
    assert_eq!(all[..first.len()], first[..]);
    assert_eq!(all[first.len()..], second[..]);
    Ok(())
}

#[rstest]
#[case::null(Codec::Null)]
#[case::deflate(Codec::Deflate(DeflateSettings::default()))]
fn round_trip(#[case] codec: Codec) -> TestResult {
    check_round_trip(codec)
}

#[rstest]
#[case::null(Codec::Null)]
#[case::deflate(Codec::Deflate(DeflateSettings::default()))]
fn empty_file_is_header_only(#[case] codec: Codec) -> TestResult {
    check_empty_file(codec)
}

#[rstest]
#[case::null(Codec::Null)]
#[case::deflate(Codec::Deflate(DeflateSettings::default()))]
fn append_round_trip(#[case] codec: Codec) -> TestResult {
    check_append_round_trip(codec)
}

#[cfg(feature = "snappy")]
mod snappy {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trip() -> TestResult {
        check_round_trip(Codec::Snappy)
    }

    #[test]
    fn empty_file_is_header_only() -> TestResult {
        check_empty_file(Codec::Snappy)
    }

    #[test]
    fn append_round_trip() -> TestResult {
        check_append_round_trip(Codec::Snappy)
    }

    #[test]
    fn corrupted_checksum_is_detected() -> TestResult {
        let mut bytes = write_all(Codec::Snappy, &readings(10))?;
        // the checksum is the last 4 bytes before the trailing marker
        let last_checksum_byte = bytes.len() - SYNC_SIZE - 1;
        bytes[last_checksum_byte] ^= 0x01;

        let mut reader = Reader::<_, Value>::new(Cursor::new(bytes))?;
        let err = reader.read_next::<Reading>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
        assert!(matches!(err.details(), Details::SnappyCrc32 { .. }));
        // nothing is produced after the failure
        assert!(reader.read_next::<Reading>()?.is_none());
        Ok(())
    }
}

#[cfg(not(feature = "snappy"))]
#[test]
fn snappy_file_opens_but_blocks_are_unavailable() -> TestResult {
    let mut bytes = write_all(Codec::Null, &readings(3))?;
    let needle = b"\x08null";
    let at = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("codec value in header");
    bytes.splice(at..at + needle.len(), b"\x0csnappy".iter().copied());

    let mut reader = Reader::<_, Value>::new(Cursor::new(bytes))?;
    assert_eq!(reader.codec(), Codec::Snappy);
    let err = reader.read_next::<Reading>().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CodecUnavailable);
    Ok(())
}

#[test]
fn reader_crosses_every_block_boundary() -> TestResult {
    let mut writer = Writer::builder()
        .schema(schema())
        .writer(Vec::new())
        .block_size(64)
        .build()?;
    let records = readings(300);
    for record in &records {
        writer.append(record)?;
    }
    let marker = *writer.marker();
    let bytes = writer.into_inner()?;

    // many small blocks, each followed by the marker
    assert!(count_markers(&bytes, &marker) > 20);

    let mut reader = Reader::<_, Value>::new(Cursor::new(bytes))?;
    let mut read = Vec::new();
    for record in reader.records::<Reading>() {
        read.push(record?);
    }
    assert_eq!(read, records);
    Ok(())
}

#[test]
fn staging_threshold_triggers_flush() -> TestResult {
    let payload = "x".repeat(1000);
    let mut writer = Writer::new(schema(), Vec::new())?;
    let header_len = writer.get_ref().len();

    let total = 3 * SYNC_INTERVAL / 1000;
    let mut flushed = 0;
    for i in 0..total {
        flushed += writer.append(&Reading {
            sensor: payload.clone(),
            value: i as i64,
        })?;
    }

    // blocks went out before close
    assert!(flushed > 0);
    assert_eq!(writer.get_ref().len(), header_len + flushed);

    let marker = *writer.marker();
    let bytes = writer.into_inner()?;
    assert!(count_markers(&bytes, &marker) >= 3);

    let read = read_all(bytes)?;
    assert_eq!(read.len(), total);
    assert!(read.iter().enumerate().all(|(i, r)| r.value == i as i64));
    Ok(())
}

#[test]
fn unknown_codec_is_rejected_at_open() -> TestResult {
    let bytes = write_all(Codec::Null, &readings(3))?;
    // same length as "null", so every other byte stays in place
    let needle = b"\x08null";
    let at = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("codec value in header");
    let mut patched = bytes.clone();
    patched[at + 1..at + 5].copy_from_slice(b"lzma");

    match Reader::<_, Value>::new(Cursor::new(patched)) {
        Err(e) => {
            assert_eq!(e.kind(), ErrorKind::UnsupportedCodec);
            assert!(matches!(e.details(), Details::CodecNotSupported(name) if name == "lzma"));
        }
        Ok(_) => panic!("lzma is not a registered codec"),
    }
    Ok(())
}

#[test]
fn truncated_file_fails_mid_stream() -> TestResult {
    let mut writer = Writer::builder()
        .schema(schema())
        .writer(Vec::new())
        .block_size(100)
        .build()?;
    for record in &readings(50) {
        writer.append(record)?;
    }
    let mut bytes = writer.into_inner()?;
    bytes.truncate(bytes.len() - SYNC_SIZE - 3);

    let mut reader = Reader::<_, Value>::new(Cursor::new(bytes))?;
    let results = reader.records::<Reading>().collect::<Vec<_>>();
    let (last, read) = results.split_last().expect("at least one result");
    assert!(last.is_err());
    assert!(!read.is_empty());
    assert!(read.iter().all(Result::is_ok));
    Ok(())
}

#[test]
fn files_round_trip_through_open() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("readings.avro");
    let records = readings(20);

    let mut writer = open(&path, Mode::Write, Some(schema()), Some("deflate"))?
        .into_writer()
        .expect("writer");
    for record in &records[..10] {
        writer.append(record)?;
    }
    writer.close()?;

    let mut writer = open::<Value>(&path, Mode::Append, None, None)?
        .into_writer()
        .expect("writer");
    for record in &records[10..] {
        writer.append(record)?;
    }
    writer.close()?;

    let mut reader = open::<Value>(&path, Mode::Read, None, None)?
        .into_reader()
        .expect("reader");
    assert_eq!(reader.codec(), Codec::Deflate(DeflateSettings::default()));
    assert_eq!(reader.data::<Reading>()?, records);
    Ok(())
}
