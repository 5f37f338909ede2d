//! Test fixtures: in-memory .dbf images and a short-read stream wrapper

use std::io::{self, Read};

/// Builds a .dbf image byte by byte
#[derive(Debug, Clone)]
pub(crate) struct TableImage {
    columns: Vec<(String, u8, u8, u8)>,
    rows: Vec<Vec<u8>>,
    last_update: [u8; 3],
    header_padding: usize,
    row_count: Option<u32>,
}

impl TableImage {
    pub(crate) fn new() -> Self {
        TableImage {
            columns: Vec::new(),
            rows: Vec::new(),
            last_update: [114, 2, 20],
            header_padding: 0,
            row_count: None,
        }
    }

    pub(crate) fn column(mut self, name: &str, native_type: u8, size: u8, decimals: u8) -> Self {
        self.columns.push((name.to_string(), native_type, size, decimals));
        self
    }

    pub(crate) fn last_update(mut self, ymd: [u8; 3]) -> Self {
        self.last_update = ymd;
        self
    }

    /// Extra bytes between the descriptor terminator and the first row
    pub(crate) fn header_padding(mut self, bytes: usize) -> Self {
        self.header_padding = bytes;
        self
    }

    /// Declare a row count different from the rows actually written
    pub(crate) fn declared_rows(mut self, count: u32) -> Self {
        self.row_count = Some(count);
        self
    }

    /// Append a row. Each field is space-padded (or cut) to its column size.
    pub(crate) fn row(mut self, flag: u8, fields: &[&[u8]]) -> Self {
        let mut row = vec![flag];
        for (i, (_, _, size, _)) in self.columns.iter().enumerate() {
            let mut field = fields.get(i).map(|f| f.to_vec()).unwrap_or_default();
            field.resize(*size as usize, b' ');
            row.extend_from_slice(&field);
        }
        self.rows.push(row);
        self
    }

    pub(crate) fn live(self, fields: &[&[u8]]) -> Self {
        self.row(b' ', fields)
    }

    pub(crate) fn deleted(self, fields: &[&[u8]]) -> Self {
        self.row(b'*', fields)
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let row_width = 1 + self.columns.iter().map(|c| c.2 as usize).sum::<usize>();
        let header_size = 32 + 32 * self.columns.len() + 1 + self.header_padding;
        let row_count = self.row_count.unwrap_or(self.rows.len() as u32);

        let mut out = vec![0x03];
        out.extend_from_slice(&self.last_update);
        out.extend_from_slice(&row_count.to_le_bytes());
        out.extend_from_slice(&(header_size as u16).to_le_bytes());
        out.extend_from_slice(&(row_width as u16).to_le_bytes());
        out.extend_from_slice(&[0u8; 20]);

        for (name, native_type, size, decimals) in &self.columns {
            let mut descriptor = [0u8; 32];
            let name = name.as_bytes();
            descriptor[..name.len().min(11)].copy_from_slice(&name[..name.len().min(11)]);
            descriptor[11] = *native_type;
            descriptor[16] = *size;
            descriptor[17] = *decimals;
            out.extend_from_slice(&descriptor);
        }
        out.push(0x0D);
        out.resize(out.len() + self.header_padding, 0);

        for row in &self.rows {
            out.extend_from_slice(row);
        }
        out.push(0x1A);
        out
    }
}

/// Columns TEXT(C100), DATE(D8), NUMERIC(N20.3), LOGICAL(L1), LONG(I4)
/// with three rows, the last one blank apart from its logical and long.
pub(crate) fn basic_table() -> Vec<u8> {
    TableImage::new()
        .column("TEXT", b'C', 100, 0)
        .column("DATE", b'D', 8, 0)
        .column("NUMERIC", b'N', 20, 3)
        .column("LOGICAL", b'L', 1, 0)
        .column("LONG", b'I', 4, 0)
        .live(&[
            b"text 1 text",
            b"20140220",
            b"             123.123",
            b"T",
            &123456i32.to_le_bytes(),
        ])
        .live(&[
            b"text 2",
            b"20140221",
            b"              -5.500",
            b"n",
            &(-1i32).to_le_bytes(),
        ])
        .live(&[b"", b"        ", b"", b"F", &0i32.to_le_bytes()])
        .build()
}

/// Reader that returns at most `max_chunk` bytes per call
pub(crate) struct Fragmented<R> {
    inner: R,
    max_chunk: usize,
}

impl<R> Fragmented<R> {
    pub(crate) fn new(inner: R, max_chunk: usize) -> Self {
        Fragmented {
            inner,
            max_chunk: max_chunk.max(1),
        }
    }
}

impl<R: Read> Read for Fragmented<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = buf.len().min(self.max_chunk);
        self.inner.read(&mut buf[..len])
    }
}

#[cfg(feature = "async")]
impl<R: tokio::io::AsyncRead + Unpin> tokio::io::AsyncRead for Fragmented<R> {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        let len = buf.remaining().min(self.max_chunk);
        let mut limited = tokio::io::ReadBuf::new(buf.initialize_unfilled_to(len));
        let this = &mut *self;
        match std::pin::Pin::new(&mut this.inner).poll_read(cx, &mut limited) {
            std::task::Poll::Ready(Ok(())) => {
                let n = limited.filled().len();
                buf.advance(n);
                std::task::Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}
