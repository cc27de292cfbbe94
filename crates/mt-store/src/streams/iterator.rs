//! The opaque external iterator (§6): a wire-stable encoding of
//! `(streamArn, shardId, iteratorType, sequenceNumber?, underlyingIterator?)`
//! that the cache hands back to callers instead of the raw underlying
//! handle. Callers must treat it as opaque; only this module parses it.

use crate::error::{Error, Result};
use num_bigint::BigUint;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

const SEP: char = '|';
const NULL: &str = "null";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorType {
    TrimHorizon,
    Latest,
    AtSequenceNumber,
    AfterSequenceNumber,
}

impl IteratorType {
    /// Logical types resolve an underlying iterator eagerly at issuance
    /// and are never cache-checked by position (§4.I).
    pub fn is_logical(self) -> bool {
        matches!(self, IteratorType::TrimHorizon | IteratorType::Latest)
    }

    pub fn is_absolute(self) -> bool {
        !self.is_logical()
    }

    fn as_str(self) -> &'static str {
        match self {
            IteratorType::TrimHorizon => "TRIM_HORIZON",
            IteratorType::Latest => "LATEST",
            IteratorType::AtSequenceNumber => "AT_SEQUENCE_NUMBER",
            IteratorType::AfterSequenceNumber => "AFTER_SEQUENCE_NUMBER",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "TRIM_HORIZON" => IteratorType::TrimHorizon,
            "LATEST" => IteratorType::Latest,
            "AT_SEQUENCE_NUMBER" => IteratorType::AtSequenceNumber,
            "AFTER_SEQUENCE_NUMBER" => IteratorType::AfterSequenceNumber,
            other => {
                return Err(Error::MalformedPhysicalKey(format!(
                    "unknown iterator type '{other}'"
                )))
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIterator {
    pub stream_arn: String,
    pub shard_id: String,
    pub iterator_type: IteratorType,
    pub sequence_number: Option<BigUint>,
    pub underlying_iterator: Option<String>,
}

impl ExternalIterator {
    pub fn encode(&self) -> String {
        let set = escape_set();
        let seq = self
            .sequence_number
            .as_ref()
            .map(|n| n.to_string())
            .unwrap_or_else(|| NULL.to_string());
        let underlying = self.underlying_iterator.as_deref().unwrap_or(NULL);
        format!(
            "{}{SEP}{}{SEP}{}{SEP}{}{SEP}{}",
            utf8_percent_encode(&self.stream_arn, &set),
            utf8_percent_encode(&self.shard_id, &set),
            self.iterator_type.as_str(),
            utf8_percent_encode(&seq, &set),
            utf8_percent_encode(underlying, &set),
        )
    }

    pub fn decode(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split(SEP).collect();
        if parts.len() != 5 {
            return Err(Error::MalformedPhysicalKey(format!(
                "expected 5 '{SEP}'-separated fields in external iterator, found {}",
                parts.len()
            )));
        }

        let stream_arn = decode_part(parts[0])?;
        let shard_id = decode_part(parts[1])?;
        let iterator_type = IteratorType::parse(parts[2])?;
        let seq_text = decode_part(parts[3])?;
        let sequence_number = if seq_text == NULL {
            None
        } else {
            Some(
                seq_text
                    .parse::<BigUint>()
                    .map_err(|e| Error::MalformedPhysicalKey(e.to_string()))?,
            )
        };
        let underlying_text = decode_part(parts[4])?;
        let underlying_iterator = if underlying_text == NULL {
            None
        } else {
            Some(underlying_text)
        };

        Ok(Self {
            stream_arn,
            shard_id,
            iterator_type,
            sequence_number,
            underlying_iterator,
        })
    }
}

fn decode_part(s: &str) -> Result<String> {
    percent_decode_str(s)
        .decode_utf8()
        .map(|c| c.into_owned())
        .map_err(|e| Error::MalformedPhysicalKey(e.to_string()))
}

fn escape_set() -> AsciiSet {
    CONTROLS.add(b'|').add(b'%')
}
