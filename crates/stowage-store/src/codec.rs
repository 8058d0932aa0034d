//! JSON object codec.
//!
//! The encoding carries no type tag: callers name the target type on read,
//! and a payload that parses but does not fit that type is a
//! [`StoreError::Serialization`].

use std::io::{BufReader, Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StoreError, StoreResult};

/// Stateless serialize/deserialize pair over byte streams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectCodec {
    pretty: bool,
}

impl ObjectCodec {
    /// Compact output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Indented output, for files meant to be read by people.
    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    pub fn is_pretty(&self) -> bool {
        self.pretty
    }

    /// Write `value` to `writer`. Does not flush.
    pub fn serialize<W, T>(&self, writer: W, value: &T) -> StoreResult<()>
    where
        W: Write,
        T: Serialize + ?Sized,
    {
        if self.pretty {
            serde_json::to_writer_pretty(writer, value)?;
        } else {
            serde_json::to_writer(writer, value)?;
        }
        Ok(())
    }

    pub fn serialize_to_vec<T: Serialize + ?Sized>(&self, value: &T) -> StoreResult<Vec<u8>> {
        let mut buffer = Vec::new();
        self.serialize(&mut buffer, value)?;
        Ok(buffer)
    }

    /// Read one value of shape `T` from `reader`.
    ///
    /// The whole stream must hold exactly one value; trailing non-whitespace
    /// is an error.
    pub fn deserialize<R, T>(&self, reader: R) -> StoreResult<T>
    where
        R: Read,
        T: DeserializeOwned,
    {
        let mut de = serde_json::Deserializer::from_reader(BufReader::new(reader));
        let value: T = serde::Deserialize::deserialize(&mut de).map_err(StoreError::from)?;
        de.end().map_err(StoreError::from)?;
        Ok(value)
    }

    pub fn deserialize_slice<T: DeserializeOwned>(&self, bytes: &[u8]) -> StoreResult<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
