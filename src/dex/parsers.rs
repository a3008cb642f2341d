use std::collections::HashMap;

use super::debug::{
    DebugEvent, DebugInfo, DebugOpcode, FIRST_SPECIAL, LINE_BASE, LINE_RANGE, LocalInfo,
};
use crate::error::DebugInfoError;
use log::trace;
use nom::{
    IResult, Parser,
    combinator::map,
    error::ErrorKind,
    multi::count,
    number::complete::u8,
};

/// String and type tables of the dex file that owns the debug info.
/// `types` holds type descriptors already resolved through `type_ids`.
#[derive(Debug, Clone, Copy)]
pub struct DexPools<'a> {
    pub strings: &'a [String],
    pub types: &'a [String],
}

impl DexPools<'_> {
    fn string(&self, index: Option<u32>) -> Result<Option<String>, DebugInfoError> {
        index
            .map(|i| {
                self.strings
                    .get(i as usize)
                    .cloned()
                    .ok_or(DebugInfoError::StringIndex(i))
            })
            .transpose()
    }

    fn type_descriptor(&self, index: Option<u32>) -> Result<Option<String>, DebugInfoError> {
        index
            .map(|i| {
                self.types
                    .get(i as usize)
                    .cloned()
                    .ok_or(DebugInfoError::TypeIndex(i))
            })
            .transpose()
    }
}

/// Parses an unsigned LEB128 value of at most five bytes
pub fn parse_uleb128(input: &[u8]) -> IResult<&[u8], u32> {
    let mut input = input;
    let mut result = 0u32;
    for shift in (0..35).step_by(7) {
        let (rest, byte) = u8(input)?;
        input = rest;
        result |= u32::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok((input, result));
        }
    }
    Err(nom::Err::Failure(nom::error::Error::new(
        input,
        ErrorKind::TooLarge,
    )))
}

/// Parses a signed LEB128 value of at most five bytes
pub fn parse_sleb128(input: &[u8]) -> IResult<&[u8], i32> {
    let mut input = input;
    let mut result = 0i32;
    for shift in (0..35).step_by(7) {
        let (rest, byte) = u8(input)?;
        input = rest;
        result |= i32::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            if shift + 7 < 32 && byte & 0x40 != 0 {
                result |= -1 << (shift + 7);
            }
            return Ok((input, result));
        }
    }
    Err(nom::Err::Failure(nom::error::Error::new(
        input,
        ErrorKind::TooLarge,
    )))
}

/// Parses a `uleb128p1` index, where the encoded 0 stands for `NO_INDEX`
pub fn parse_uleb128p1(input: &[u8]) -> IResult<&[u8], Option<u32>> {
    map(parse_uleb128, |v| v.checked_sub(1)).parse(input)
}

/// A state machine instruction with its pool indices still unresolved
#[derive(Debug)]
enum RawOp {
    AdvancePc(u32),
    AdvanceLine(i32),
    StartLocal {
        register: u32,
        name: Option<u32>,
        descriptor: Option<u32>,
        signature: Option<u32>,
    },
    EndLocal(u32),
    RestartLocal(u32),
    PrologueEnd,
    EpilogueBegin,
    SetFile(Option<u32>),
    Special(u8),
}

/// Parsing functions module
mod parsers {
    use super::*;

    /// Helper function to parse a section with a uleb128 length prefix
    pub fn parse_section<'a, T, F>(input: &'a [u8], parser: F) -> IResult<&'a [u8], Vec<T>>
    where
        F: Fn(&'a [u8]) -> IResult<&'a [u8], T>,
    {
        let (input, len) = parse_uleb128(input)?;
        count(parser, len as usize).parse(input)
    }

    fn parse_start_local(input: &[u8], extended: bool) -> IResult<&[u8], RawOp> {
        let (input, register) = parse_uleb128(input)?;
        let (input, name) = parse_uleb128p1(input)?;
        let (input, descriptor) = parse_uleb128p1(input)?;
        let (input, signature) = if extended {
            parse_uleb128p1(input)?
        } else {
            (input, None)
        };
        Ok((
            input,
            RawOp::StartLocal {
                register,
                name,
                descriptor,
                signature,
            },
        ))
    }

    /// Parse one instruction, `None` marks the end of the sequence
    pub(super) fn parse_op(input: &[u8]) -> IResult<&[u8], Option<RawOp>> {
        let (input, byte) = u8(input)?;
        let Ok(opcode) = DebugOpcode::try_from(byte) else {
            return Ok((input, Some(RawOp::Special(byte))));
        };
        let (input, op) = match opcode {
            DebugOpcode::EndSequence => return Ok((input, None)),
            DebugOpcode::AdvancePc => map(parse_uleb128, RawOp::AdvancePc).parse(input)?,
            DebugOpcode::AdvanceLine => map(parse_sleb128, RawOp::AdvanceLine).parse(input)?,
            DebugOpcode::StartLocal => parse_start_local(input, false)?,
            DebugOpcode::StartLocalExtended => parse_start_local(input, true)?,
            DebugOpcode::EndLocal => map(parse_uleb128, RawOp::EndLocal).parse(input)?,
            DebugOpcode::RestartLocal => map(parse_uleb128, RawOp::RestartLocal).parse(input)?,
            DebugOpcode::SetPrologueEnd => (input, RawOp::PrologueEnd),
            DebugOpcode::SetEpilogueBegin => (input, RawOp::EpilogueBegin),
            DebugOpcode::SetFile => map(parse_uleb128p1, RawOp::SetFile).parse(input)?,
        };
        Ok((input, Some(op)))
    }

    pub(super) fn parse_ops(mut input: &[u8]) -> IResult<&[u8], Vec<RawOp>> {
        let mut ops = Vec::new();
        loop {
            let (rest, op) = parse_op(input)?;
            input = rest;
            match op {
                Some(op) => ops.push(op),
                None => return Ok((input, ops)),
            }
        }
    }
}

use parsers::*;

/// Runs the state machine over the raw instructions
fn resolve(
    line_start: u32,
    ops: Vec<RawOp>,
    pools: &DexPools,
) -> Result<Vec<DebugEvent>, DebugInfoError> {
    let mut events = Vec::with_capacity(ops.len());
    let mut address = 0u32;
    let mut line = line_start;
    // Last local started in each register, reused by RESTART_LOCAL
    let mut last_local: HashMap<u32, LocalInfo> = HashMap::new();

    for op in ops {
        let overflow = DebugInfoError::Overflow { offset: address };
        match op {
            RawOp::AdvancePc(delta) => {
                address = address.checked_add(delta).ok_or(overflow)?;
            }
            RawOp::AdvanceLine(delta) => {
                line = line.checked_add_signed(delta).ok_or(overflow)?;
            }
            RawOp::StartLocal {
                register,
                name,
                descriptor,
                signature,
            } => {
                let unnamed = |what| DebugInfoError::Unnamed {
                    register,
                    offset: address,
                    what,
                };
                let local = LocalInfo {
                    name: pools.string(name)?.ok_or_else(|| unnamed("name"))?,
                    descriptor: pools
                        .type_descriptor(descriptor)?
                        .ok_or_else(|| unnamed("type"))?,
                    signature: pools.string(signature)?,
                };
                last_local.insert(register, local.clone());
                events.push(DebugEvent::StartLocal {
                    register,
                    local,
                    offset: address,
                });
            }
            RawOp::EndLocal(register) => events.push(DebugEvent::EndLocal {
                register,
                offset: address,
            }),
            RawOp::RestartLocal(register) => {
                let local = last_local.get(&register).cloned().ok_or(
                    DebugInfoError::RestartWithoutStart {
                        register,
                        offset: address,
                    },
                )?;
                events.push(DebugEvent::RestartLocal {
                    register,
                    local,
                    offset: address,
                });
            }
            RawOp::PrologueEnd => events.push(DebugEvent::PrologueEnd { offset: address }),
            RawOp::EpilogueBegin => events.push(DebugEvent::EpilogueBegin { offset: address }),
            RawOp::SetFile(name) => events.push(DebugEvent::SetSourceFile {
                name: pools.string(name)?,
                offset: address,
            }),
            RawOp::Special(opcode) => {
                let adjusted = opcode - FIRST_SPECIAL;
                line = line
                    .checked_add_signed(LINE_BASE + i32::from(adjusted % LINE_RANGE))
                    .ok_or(overflow)?;
                address = address
                    .checked_add(u32::from(adjusted / LINE_RANGE))
                    .ok_or(DebugInfoError::Overflow { offset: address })?;
                events.push(DebugEvent::LineNumber {
                    line,
                    offset: address,
                });
            }
        }
    }
    Ok(events)
}

/// Decode a `debug_info_item`
pub fn parse_debug_info(bytes: &[u8], pools: &DexPools) -> Result<DebugInfo, DebugInfoError> {
    let truncated = |e: nom::Err<nom::error::Error<&[u8]>>| DebugInfoError::Truncated {
        offset: match e {
            nom::Err::Error(e) | nom::Err::Failure(e) => bytes.len() - e.input.len(),
            nom::Err::Incomplete(_) => bytes.len(),
        },
    };

    let (input, line_start) = parse_uleb128(bytes).map_err(truncated)?;
    let (input, names) = parse_section(input, parse_uleb128p1).map_err(truncated)?;
    let (_, ops) = parse_ops(input).map_err(truncated)?;

    let parameter_names = names
        .into_iter()
        .map(|name| pools.string(name))
        .collect::<Result<Vec<_>, _>>()?;
    let events = resolve(line_start, ops, pools)?;

    trace!(
        "Decoded debug info: line_start {}, {} parameters, {} events",
        line_start,
        parameter_names.len(),
        events.len()
    );

    Ok(DebugInfo {
        line_start,
        parameter_names,
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pools<'a>(strings: &'a [String], types: &'a [String]) -> DexPools<'a> {
        DexPools { strings, types }
    }

    fn local(name: &str, descriptor: &str) -> LocalInfo {
        LocalInfo {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            signature: None,
        }
    }

    #[test]
    fn leb128() {
        assert_eq!(parse_uleb128(&[0xe5, 0x8e, 0x26]), Ok((&[][..], 624485)));
        assert_eq!(parse_uleb128(&[0x7f, 0x01]), Ok((&[0x01][..], 127)));
        assert_eq!(parse_sleb128(&[0x7c]), Ok((&[][..], -4)));
        assert_eq!(parse_sleb128(&[0x80, 0x7f]), Ok((&[][..], -128)));
        assert_eq!(parse_sleb128(&[0x02]), Ok((&[][..], 2)));
        assert_eq!(parse_uleb128p1(&[0x00]), Ok((&[][..], None)));
        assert_eq!(parse_uleb128p1(&[0x05]), Ok((&[][..], Some(4))));
        assert!(parse_uleb128(&[0xff, 0xff, 0xff, 0xff, 0xff, 0x01]).is_err());
    }

    #[test]
    fn decodes_state_machine() {
        let strings = vec!["p".to_string(), "x".to_string()];
        let types = vec!["I".to_string()];
        let bytes = [
            0x0a, // line_start 10
            0x01, 0x01, // one parameter named strings[0]
            0x03, 0x00, 0x02, 0x01, // START_LOCAL v0 "x" I
            0x0e, // special: line +0, address +0
            0x2d, // special: line +1, address +2
            0x05, 0x00, // END_LOCAL v0
            0x06, 0x00, // RESTART_LOCAL v0
            0x01, 0x03, // ADVANCE_PC 3
            0x07, // SET_PROLOGUE_END
            0x02, 0x7c, // ADVANCE_LINE -4
            0x0a, // special: line -4, address +0
            0x00, // END_SEQUENCE
        ];
        let info = parse_debug_info(&bytes, &pools(&strings, &types)).unwrap();
        assert_eq!(info.line_start, 10);
        assert_eq!(info.parameter_names, vec![Some("p".to_string())]);
        assert_eq!(
            info.events,
            vec![
                DebugEvent::StartLocal {
                    register: 0,
                    local: local("x", "I"),
                    offset: 0,
                },
                DebugEvent::LineNumber { line: 10, offset: 0 },
                DebugEvent::LineNumber { line: 11, offset: 2 },
                DebugEvent::EndLocal { register: 0, offset: 2 },
                DebugEvent::RestartLocal {
                    register: 0,
                    local: local("x", "I"),
                    offset: 2,
                },
                DebugEvent::PrologueEnd { offset: 5 },
                DebugEvent::LineNumber { line: 3, offset: 5 },
            ]
        );
    }

    #[test]
    fn unnamed_parameter() {
        let bytes = [0x01, 0x02, 0x00, 0x01, 0x00];
        let strings = vec!["b".to_string()];
        let info = parse_debug_info(&bytes, &pools(&strings, &[])).unwrap();
        assert_eq!(info.parameter_names, vec![None, Some("b".to_string())]);
        assert!(info.events.is_empty());
    }

    #[test]
    fn truncated_stream() {
        assert_eq!(
            parse_debug_info(&[0x0a, 0x01], &pools(&[], &[])),
            Err(DebugInfoError::Truncated { offset: 2 })
        );
        // Missing END_SEQUENCE
        assert_eq!(
            parse_debug_info(&[0x0a, 0x00, 0x07], &pools(&[], &[])),
            Err(DebugInfoError::Truncated { offset: 3 })
        );
    }

    #[test]
    fn restart_without_start() {
        assert_eq!(
            parse_debug_info(&[0x01, 0x00, 0x06, 0x02, 0x00], &pools(&[], &[])),
            Err(DebugInfoError::RestartWithoutStart { register: 2, offset: 0 })
        );
    }

    #[test]
    fn pool_index_out_of_range() {
        let strings = vec!["x".to_string()];
        assert_eq!(
            parse_debug_info(&[0x01, 0x00, 0x03, 0x00, 0x01, 0x05, 0x00], &pools(&strings, &[])),
            Err(DebugInfoError::TypeIndex(4))
        );
        assert_eq!(
            parse_debug_info(&[0x01, 0x01, 0x09, 0x00], &pools(&strings, &[])),
            Err(DebugInfoError::StringIndex(8))
        );
    }
}
