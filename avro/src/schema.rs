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

//! The schema seam between the container and the datum layer.
//!
//! The container only needs two things from a schema: to be recovered from the text stored
//! under `avro.schema` and to be rendered back into that text when a file is created.

use crate::{AvroResult, error::Details};

/// A schema that can be stored in and recovered from a container header.
pub trait Schema: Sized {
    /// Parse the textual form found under `avro.schema`.
    fn parse_str(input: &str) -> AvroResult<Self>;

    /// The textual form written under `avro.schema`.
    fn canonical_form(&self) -> AvroResult<String>;
}

/// Schemas kept as parsed JSON documents.
impl Schema for serde_json::Value {
    fn parse_str(input: &str) -> AvroResult<Self> {
        serde_json::from_str(input).map_err(|e| Details::ParseSchemaJson(e).into())
    }

    fn canonical_form(&self) -> AvroResult<String> {
        serde_json::to_string(self).map_err(|e| Details::ConvertJsonToString(e).into())
    }
}

/// The schema text, kept verbatim and unvalidated.
impl Schema for String {
    fn parse_str(input: &str) -> AvroResult<Self> {
        Ok(input.to_owned())
    }

    fn canonical_form(&self) -> AvroResult<String> {
        Ok(self.clone())
    }
}
