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

//! The datum seam: how single records are turned into bytes and back.
//!
//! The container never looks inside a record. It hands the writer schema to
//! [`Datum::encode`] and [`Datum::decode`] and frames whatever bytes come out.

use crate::{AvroResult, error::Details, util};
use std::io::{Read, Write};

/// A value that can be written to and read from a container block under a schema `S`.
pub trait Datum<S>: Sized {
    /// Append the binary encoding of `self` to `writer`.
    fn encode<W: Write>(&self, schema: &S, writer: &mut W) -> AvroResult<()>;

    /// Decode one value from `reader`.
    ///
    /// Implementations must consume the bytes of exactly one value.
    fn decode<R: Read>(schema: &S, reader: &mut R) -> AvroResult<Self>;
}

// The primitive carriers below ignore the schema and assume it describes a value of their own
// type.

impl<S> Datum<S> for i64 {
    fn encode<W: Write>(&self, _schema: &S, writer: &mut W) -> AvroResult<()> {
        util::zig_i64(*self, writer).map(|_| ())
    }

    fn decode<R: Read>(_schema: &S, reader: &mut R) -> AvroResult<Self> {
        util::read_long(reader)
    }
}

impl<S> Datum<S> for bool {
    fn encode<W: Write>(&self, _schema: &S, writer: &mut W) -> AvroResult<()> {
        writer
            .write_all(&[u8::from(*self)])
            .map_err(|e| Details::WriteBytes(e).into())
    }

    fn decode<R: Read>(_schema: &S, reader: &mut R) -> AvroResult<Self> {
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf).map_err(Details::ReadBytes)?;
        match buf[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Details::DeserializeValue(format!("invalid u8 for bool: {other}")).into()),
        }
    }
}

impl<S> Datum<S> for String {
    fn encode<W: Write>(&self, _schema: &S, writer: &mut W) -> AvroResult<()> {
        util::write_string(self, writer).map(|_| ())
    }

    fn decode<R: Read>(_schema: &S, reader: &mut R) -> AvroResult<Self> {
        util::read_string(reader)
    }
}

impl<S> Datum<S> for Vec<u8> {
    fn encode<W: Write>(&self, _schema: &S, writer: &mut W) -> AvroResult<()> {
        util::write_bytes(self, writer).map(|_| ())
    }

    fn decode<R: Read>(_schema: &S, reader: &mut R) -> AvroResult<Self> {
        util::read_bytes(reader)
    }
}
