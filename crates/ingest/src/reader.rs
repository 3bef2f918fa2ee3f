use crate::error::{IngestError, Result};
use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use std::fmt;
use std::io::{self, BufRead, BufReader, Cursor, Read};

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const BZIP2_MAGIC: &[u8] = b"BZh";

/// Container detected from the first bytes of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Plain,
    Gzip,
    Bzip2,
}

impl fmt::Display for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
        })
    }
}

/// Peek at the magic bytes and wrap `reader` in the matching decompressor.
/// File names and extensions play no part.
pub fn sniff<'a, R: Read + 'a>(mut reader: R) -> io::Result<(SourceEncoding, Box<dyn BufRead + 'a>)> {
    let mut prefix = [0u8; 3];
    let mut filled = 0;
    while filled < prefix.len() {
        match reader.read(&mut prefix[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    let head = &prefix[..filled];
    let encoding = if head.starts_with(GZIP_MAGIC) {
        SourceEncoding::Gzip
    } else if head.starts_with(BZIP2_MAGIC) {
        SourceEncoding::Bzip2
    } else {
        SourceEncoding::Plain
    };

    let stream = Cursor::new(head.to_vec()).chain(reader);
    let decoded: Box<dyn BufRead + 'a> = match encoding {
        SourceEncoding::Plain => Box::new(BufReader::new(stream)),
        SourceEncoding::Gzip => Box::new(BufReader::new(MultiGzDecoder::new(stream))),
        SourceEncoding::Bzip2 => Box::new(BufReader::new(MultiBzDecoder::new(stream))),
    };
    Ok((encoding, decoded))
}

/// `<word_count> <dimension>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub word_count: u64,
    pub dim: u64,
}

/// One parsed `<word> <f1> … <fN>` line.
#[derive(Debug, Clone, PartialEq)]
pub struct WordRecord {
    pub line: u64,
    pub word: String,
    pub values: Vec<f64>,
}

/// Line-oriented reader over a decoded vector file.
pub struct VectorFileReader<'a> {
    input: Box<dyn BufRead + 'a>,
    header: Header,
    line: u64,
    buf: String,
}

impl<'a> VectorFileReader<'a> {
    /// Sniff the container and read the header line.
    pub fn open<R: Read + 'a>(reader: R) -> Result<(SourceEncoding, Self)> {
        let (encoding, mut input) = sniff(reader)?;
        let mut buf = String::new();
        let read = read_line(&mut input, &mut buf, 1)?;
        if read == 0 {
            return Err(IngestError::format(1, "empty input, expected '<word_count> <dimension>'"));
        }
        let header = parse_header(&buf)?;
        Ok((
            encoding,
            Self {
                input,
                header,
                line: 1,
                buf,
            },
        ))
    }

    #[must_use]
    pub fn header(&self) -> Header {
        self.header
    }

    /// Next record, skipping blank lines. `None` at end of input.
    pub fn next_record(&mut self) -> Result<Option<WordRecord>> {
        loop {
            self.line += 1;
            if read_line(&mut self.input, &mut self.buf, self.line)? == 0 {
                return Ok(None);
            }
            let mut tokens = self.buf.split_whitespace();
            let Some(word) = tokens.next() else {
                continue;
            };
            let values = tokens
                .map(|token| parse_value(token, self.line))
                .collect::<Result<Vec<_>>>()?;
            if values.len() as u64 != self.header.dim {
                return Err(IngestError::format(
                    self.line,
                    format!(
                        "word '{word}' has {} values, header declares {}",
                        values.len(),
                        self.header.dim
                    ),
                ));
            }
            return Ok(Some(WordRecord {
                line: self.line,
                word: word.to_string(),
                values,
            }));
        }
    }
}

impl Iterator for VectorFileReader<'_> {
    type Item = Result<WordRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

fn read_line(input: &mut dyn BufRead, buf: &mut String, line: u64) -> Result<usize> {
    buf.clear();
    input.read_line(buf).map_err(|err| {
        // Decoders report corrupt streams as InvalidInput; read_line reports bad UTF-8 as InvalidData.
        if matches!(
            err.kind(),
            io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput
        ) {
            IngestError::format(line, format!("unreadable input: {err}"))
        } else {
            IngestError::Io(err)
        }
    })
}

fn parse_header(raw: &str) -> Result<Header> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    let [count, dim] = tokens[..] else {
        return Err(IngestError::format(
            1,
            format!("expected '<word_count> <dimension>', found '{}'", raw.trim()),
        ));
    };
    let number = |token: &str, what: &str| {
        token.parse::<u64>().map_err(|_| {
            IngestError::format(1, format!("{what} '{token}' is not a non-negative integer"))
        })
    };
    Ok(Header {
        word_count: number(count, "word count")?,
        dim: number(dim, "dimension")?,
    })
}

fn parse_value(token: &str, line: u64) -> Result<f64> {
    match token.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        Ok(_) => Err(IngestError::format(line, format!("value '{token}' is not finite"))),
        Err(_) => Err(IngestError::format(line, format!("value '{token}' is not a number"))),
    }
}
