// chkit/src/database/response.rs
//
// Successful query results: raw bodies, line streams over a (possibly
// streaming) body and typed rows decoded from TabSeparatedWithNamesAndTypes.
//

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use super::transport::{Body, ChunkSource};
use crate::cluster::Host;
use crate::errors::{ClickHouseError, Result};
use crate::schema::Model;
use crate::types::{Row, RowDescriptor};

pub struct QueryResponse {
    host: Host,
    body: Body,
}

impl fmt::Debug for QueryResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = match self.body {
            Body::Full(ref bytes) => format!("{} bytes", bytes.len()),
            Body::Stream(_) => "stream".to_string(),
        };
        f.debug_struct("QueryResponse")
            .field("host", &self.host)
            .field("body", &body)
            .finish()
    }
}

impl QueryResponse {
    pub(crate) fn new(host: Host, body: Body) -> Self {
        Self { host, body }
    }

    /// The host that answered.
    pub fn host(&self) -> &Host {
        &self.host
    }

    pub async fn bytes(self) -> Result<Bytes> {
        self.body.bytes().await
    }

    pub async fn text(self) -> Result<String> {
        let bytes = self.body.bytes().await?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    pub fn into_lines(self) -> LineStream {
        LineStream::new(self.body.into_source())
    }
}

/// Newline-delimited lines read chunk by chunk.
pub struct LineStream {
    source: Box<dyn ChunkSource>,
    buf: Vec<u8>,
    done: bool,
}

impl LineStream {
    pub fn new(source: Box<dyn ChunkSource>) -> Self {
        Self {
            source,
            buf: Vec::new(),
            done: false,
        }
    }

    pub async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
                line.pop();
                return Ok(Some(String::from_utf8(line)?));
            }
            if self.done {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let line = std::mem::take(&mut self.buf);
                return Ok(Some(String::from_utf8(line)?));
            }
            match self.source.next_chunk().await? {
                Some(chunk) => self.buf.extend_from_slice(&chunk),
                None => self.done = true,
            }
        }
    }
}

type Decoder<T> = fn(&Arc<RowDescriptor>, &str) -> Result<T>;

/// Rows of a `TabSeparatedWithNamesAndTypes` result, decoded lazily.
pub struct Rows<T> {
    lines: LineStream,
    descriptor: Arc<RowDescriptor>,
    decode: Decoder<T>,
}

impl<T> Rows<T> {
    async fn open(mut lines: LineStream, decode: Decoder<T>) -> Result<Self> {
        let names = lines.next_line().await?;
        let types = lines.next_line().await?;
        let (names, types) = match (names, types) {
            (Some(names), Some(types)) => (names, types),
            _ => {
                return Err(ClickHouseError::ParseError(
                    "result is missing the names and types header".to_string(),
                ))
            }
        };
        let descriptor = Arc::new(RowDescriptor::from_header(&names, &types)?);
        Ok(Self {
            lines,
            descriptor,
            decode,
        })
    }

    /// Columns of the result as reported by the server.
    pub fn descriptor(&self) -> &Arc<RowDescriptor> {
        &self.descriptor
    }

    /// An empty line is a row too: one empty string column.
    pub async fn next(&mut self) -> Result<Option<T>> {
        match self.lines.next_line().await? {
            Some(line) => (self.decode)(&self.descriptor, &line).map(Some),
            None => Ok(None),
        }
    }

    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut out = Vec::new();
        while let Some(item) = self.next().await? {
            out.push(item);
        }
        Ok(out)
    }
}

impl Rows<Row> {
    pub async fn dynamic(lines: LineStream) -> Result<Self> {
        Self::open(lines, |descriptor, line| Row::decode(descriptor.clone(), line)).await
    }
}

impl<M: Model> Rows<M> {
    pub async fn typed(lines: LineStream) -> Result<Self> {
        Self::open(lines, decode_model::<M>).await
    }
}

fn decode_model<M: Model>(descriptor: &Arc<RowDescriptor>, line: &str) -> Result<M> {
    M::from_tsv(line, &descriptor.names())
}
