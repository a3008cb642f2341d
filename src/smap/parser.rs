use std::collections::BTreeMap;

use super::table::{FileRef, LineMapping, LineRemapTable, Stratum};
use crate::error::FormatError;
use log::{debug, trace};
use nom::{
    IResult, Parser,
    bytes::complete::{tag, take_while, take_while1},
    sequence::terminated,
};

type ScanError<'a> = nom::error::Error<&'a [u8]>;

/// Primitive token parsers
mod parsers {
    use super::*;

    fn is_space(b: u8) -> bool {
        matches!(b, b' ' | b'\r' | b'\n')
    }

    pub fn space(input: &[u8]) -> IResult<&[u8], &[u8]> {
        take_while(is_space).parse(input)
    }

    /// A fixed literal and the whitespace after it
    pub fn literal<'a>(
        s: &'static str,
    ) -> impl Parser<&'a [u8], Output = &'a [u8], Error = ScanError<'a>> {
        terminated(tag(s.as_bytes()), space)
    }

    /// A run of non-whitespace bytes
    pub fn token(input: &[u8]) -> IResult<&[u8], String> {
        let (input, bytes) = take_while1(|b| !is_space(b)).parse(input)?;
        let (input, _) = space(input)?;
        Ok((input, String::from_utf8_lossy(bytes).into_owned()))
    }

    /// An unsigned decimal number
    pub fn number(input: &[u8]) -> IResult<&[u8], u32> {
        let (input, value) = nom::character::complete::u32(input)?;
        let (input, _) = space(input)?;
        Ok((input, value))
    }
}

use parsers::*;

/// Left to right scan over the payload. Sections end where the next byte is
/// a `*`, so a single byte of lookahead is all that is needed.
struct Scanner<'a> {
    source: &'a [u8],
    rest: &'a [u8],
}

impl<'a> Scanner<'a> {
    fn new(source: &'a [u8]) -> Self {
        Self { source, rest: source }
    }

    fn offset(&self) -> usize {
        self.source.len() - self.rest.len()
    }

    fn run<O, P>(&mut self, what: &'static str, mut parser: P) -> Result<O, FormatError>
    where
        P: Parser<&'a [u8], Output = O, Error = ScanError<'a>>,
    {
        match parser.parse(self.rest) {
            Ok((rest, output)) => {
                self.rest = rest;
                Ok(output)
            }
            Err(nom::Err::Error(e) | nom::Err::Failure(e)) => Err(FormatError::Expected {
                what,
                offset: self.source.len() - e.input.len(),
            }),
            Err(nom::Err::Incomplete(_)) => Err(FormatError::Expected {
                what,
                offset: self.source.len(),
            }),
        }
    }

    fn accept(&mut self, s: &'static str) -> bool {
        match literal(s).parse(self.rest) {
            Ok((rest, _)) => {
                self.rest = rest;
                true
            }
            Err(_) => false,
        }
    }

    fn at_section_end(&self) -> bool {
        self.rest.first().is_none_or(|&b| b == b'*')
    }

    fn file_section(&mut self, files: &mut BTreeMap<u32, FileRef>) -> Result<(), FormatError> {
        while !self.at_section_end() {
            let has_path = self.accept("+");
            let id = self.run("file id", number)?;
            let name = self.run("file name", token)?;
            let path = if has_path {
                Some(self.run("absolute file name", token)?)
            } else {
                None
            };
            files.insert(id, FileRef { name, path });
        }
        Ok(())
    }

    fn line_section(
        &mut self,
        lines: &mut Vec<LineMapping>,
        file_id: &mut u32,
    ) -> Result<(), FormatError> {
        while !self.at_section_end() {
            let offset = self.offset();
            let input_start = self.run("input start line", number)?;
            if self.accept("#") {
                *file_id = self.run("line file id", number)?;
            }
            let repeat_count = if self.accept(",") {
                self.run("repeat count", number)?
            } else {
                1
            };
            self.run("':'", literal(":"))?;
            let output_start = self.run("output start line", number)?;
            let increment = if self.accept(",") {
                self.run("output line increment", number)?
            } else {
                1
            };
            // Every repeated input line must fit in a u32
            let last_input = repeat_count
                .checked_sub(1)
                .and_then(|n| input_start.checked_add(n));
            if last_input.is_none() || increment == 0 {
                return Err(FormatError::InvalidMapping { offset });
            }
            lines.push(LineMapping {
                input_start,
                file_id: *file_id,
                output_start,
                repeat_count,
                increment,
            });
        }
        Ok(())
    }

    /// Parse one stratum after its `*S`
    fn stratum(&mut self) -> Result<Stratum, FormatError> {
        let name = self.run("stratum name", token)?;
        let mut files = BTreeMap::new();
        let mut lines = Vec::new();
        let mut file_id = 0;

        loop {
            if self.accept("*F") {
                self.file_section(&mut files)?;
            } else if self.accept("*L") {
                self.line_section(&mut lines, &mut file_id)?;
            } else if self.rest.starts_with(b"*S") || self.rest.starts_with(b"*E") {
                break;
            } else if let [b'*', rest @ ..] = self.rest {
                // Vendor (*V) and embedded (*O, *C) sections are not produced
                // by any compiler we read from.
                return Err(FormatError::UnsupportedSection {
                    stratum: name,
                    section: rest.first().map_or(' ', |&b| char::from(b)),
                });
            } else {
                break;
            }
        }

        if let Some(line) = lines.iter().find(|l| !files.contains_key(&l.file_id)) {
            return Err(FormatError::UnknownFileId {
                stratum: name,
                file_id: line.file_id,
            });
        }

        trace!("Parsed stratum {}: {} files, {} lines", name, files.len(), lines.len());
        Ok(Stratum { name, files, lines })
    }
}

/// Parse a `SourceDebugExtension` payload
pub fn parse_smap(payload: &[u8]) -> Result<LineRemapTable, FormatError> {
    let mut scanner = Scanner::new(payload);
    scanner.run("whitespace", space)?;

    let header = scanner.run("SMAP header", token).unwrap_or_default();
    if header != "SMAP" {
        return Err(FormatError::BadHeader(header));
    }
    let generated_file = scanner.run("generated file name", token)?;
    let default_stratum = scanner.run("default stratum name", token)?;

    let mut strata = BTreeMap::new();
    loop {
        if scanner.accept("*S") {
            let stratum = scanner.stratum()?;
            if strata.contains_key(&stratum.name) {
                return Err(FormatError::DuplicateStratum(stratum.name));
            }
            strata.insert(stratum.name.clone(), stratum);
        } else if scanner.accept("*E") {
            // Kotlin closes every stratum with its own *E
            if !scanner.rest.starts_with(b"*S") {
                break;
            }
        } else if scanner.rest.is_empty() {
            return Err(FormatError::MissingTrailer);
        } else {
            return Err(FormatError::Expected {
                what: "*S or *E",
                offset: scanner.offset(),
            });
        }
    }

    let table = LineRemapTable {
        generated_file,
        default_stratum,
        strata,
    };
    debug!("Parsed SMAP: {:#?}", table);
    Ok(table)
}
