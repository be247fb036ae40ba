//! Input adapters: container detection, byte counting and transcoding.
//!
//! Progress is measured on the raw file, so the [`CountingReader`] sits
//! directly on top of the file handle and below any decompressor.

use std::cell::Cell;
use std::io::{self, BufRead, BufReader, Read};
use std::rc::Rc;

use bzip2::read::MultiBzDecoder;
use camino::Utf8Path;
use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE};
use encoding_rs_io::DecodeReaderBytesBuilder;
use flate2::read::MultiGzDecoder;
use log::debug;

use crate::error::IngestError;

/// Shared count of bytes pulled through a [`CountingReader`].
#[derive(Debug, Clone, Default)]
pub struct ByteCounter(Rc<Cell<u64>>);

impl ByteCounter {
    /// Bytes read so far.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.get()
    }

    fn add(&self, bytes: usize) {
        let bytes = u64::try_from(bytes).unwrap_or(u64::MAX);
        self.0.set(self.0.get().saturating_add(bytes));
    }
}

/// Reader adapter that records how many bytes it has produced.
///
/// # Examples
/// ```
/// use std::io::Read;
/// use osmload_data::CountingReader;
///
/// let (mut reader, counter) = CountingReader::new(&b"<osm/>"[..]);
/// let mut text = String::new();
/// reader.read_to_string(&mut text)?;
/// assert_eq!(counter.get(), 6);
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug)]
pub struct CountingReader<R> {
    inner: R,
    counter: ByteCounter,
}

impl<R: Read> CountingReader<R> {
    /// Wrap `inner`, returning the reader and a handle on its byte count.
    pub fn new(inner: R) -> (Self, ByteCounter) {
        let counter = ByteCounter::default();
        (
            Self {
                inner,
                counter: counter.clone(),
            },
            counter,
        )
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.counter.add(read);
        Ok(read)
    }
}

/// Supported file containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// Plain `.osm` XML.
    Plain,
    /// Gzip-compressed `.osm.gz`.
    Gzip,
    /// Bzip2-compressed `.osm.bz2`.
    Bzip2,
}

impl Container {
    /// Detect the container from the file name, ignoring ASCII case.
    ///
    /// # Examples
    /// ```
    /// use camino::Utf8Path;
    /// use osmload_data::Container;
    ///
    /// assert_eq!(Container::from_path(Utf8Path::new("a/Paris.OSM.BZ2")), Some(Container::Bzip2));
    /// assert_eq!(Container::from_path(Utf8Path::new("paris.osm.pbf")), None);
    /// ```
    #[must_use]
    pub fn from_path(path: &Utf8Path) -> Option<Self> {
        let name = path.file_name()?.to_ascii_lowercase();
        if name.ends_with(".osm") {
            Some(Self::Plain)
        } else if name.ends_with(".osm.gz") {
            Some(Self::Gzip)
        } else if name.ends_with(".osm.bz2") {
            Some(Self::Bzip2)
        } else {
            None
        }
    }

    /// Wrap `reader` in the matching decompressor.
    pub fn decode<'a, R: BufRead + 'a>(self, reader: R) -> Box<dyn Read + 'a> {
        match self {
            Self::Plain => Box::new(reader),
            Self::Gzip => Box::new(MultiGzDecoder::new(reader)),
            Self::Bzip2 => Box::new(MultiBzDecoder::new(reader)),
        }
    }
}

/// Look up a WHATWG encoding label.
///
/// # Errors
/// Returns [`IngestError::UnknownEncoding`] for unrecognised labels.
pub fn encoding_for_label(label: &str) -> Result<&'static Encoding, IngestError> {
    Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| IngestError::UnknownEncoding {
        label: label.to_owned(),
    })
}

/// Guess the encoding of an XML document from its first bytes.
///
/// A byte order mark wins, then a UTF-16 `<` pattern, then the `encoding`
/// pseudo-attribute of the XML declaration. A declaration readable as ASCII
/// cannot be UTF-16, so a declared UTF-16 label is read as UTF-8. Anything
/// else is UTF-8.
#[must_use]
pub fn sniff_encoding(prefix: &[u8]) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(prefix) {
        return encoding;
    }
    match prefix {
        [b'<', 0, ..] => return UTF_16LE,
        [0, b'<', ..] => return UTF_16BE,
        _ => {}
    }
    declared_encoding(prefix).unwrap_or(UTF_8)
}

fn declared_encoding(prefix: &[u8]) -> Option<&'static Encoding> {
    let declaration = prefix.strip_prefix(b"<?xml")?;
    let end = declaration.windows(2).position(|pair| pair == b"?>")?;
    let declaration = declaration.get(..end)?;
    let start = declaration
        .windows(8)
        .position(|window| window == b"encoding")?;
    let rest = declaration.get(start + 8..)?;
    let rest = rest.trim_ascii_start().strip_prefix(b"=")?.trim_ascii_start();
    let (&quote, rest) = rest.split_first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let close = rest.iter().position(|&byte| byte == quote)?;
    let declared = Encoding::for_label(rest.get(..close)?)?;
    if declared == UTF_16LE || declared == UTF_16BE {
        return Some(UTF_8);
    }
    Some(declared)
}

/// Produce a UTF-8 reader for `reader`, transcoding when required.
///
/// # Errors
/// Returns [`IngestError::UnknownEncoding`] for an unrecognised override and
/// [`IngestError::Read`] when the first bytes cannot be read.
pub fn utf8_reader<'a, R: Read + 'a>(
    reader: R,
    encoding_override: Option<&str>,
) -> Result<Box<dyn BufRead + 'a>, IngestError> {
    let forced = encoding_override.map(encoding_for_label).transpose()?;
    let mut buffered = BufReader::new(reader);
    let prefix = buffered
        .fill_buf()
        .map_err(|source| IngestError::Read {
            position: 0,
            source,
        })?;
    let has_bom = Encoding::for_bom(prefix).is_some();
    let encoding = forced.unwrap_or_else(|| sniff_encoding(prefix));
    debug!("reading OSM input as {}", encoding.name());

    if encoding == UTF_8 && !has_bom {
        return Ok(Box::new(buffered));
    }
    let decoded = DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding))
        .bom_override(forced.is_none())
        .build(buffered);
    Ok(Box::new(BufReader::new(decoded)))
}
