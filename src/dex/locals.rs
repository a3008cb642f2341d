use super::debug::{DebugEvent, LocalInfo};
use crate::error::ReconstructionError;
use crate::model::LocalVariable;
use log::trace;

/// A declared parameter of a dex method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub descriptor: String,
    pub name: Option<String>,
    pub signature: Option<String>,
}

/// Register layout of one method body
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub register_count: u32,
    pub receiver: Option<&'a str>, // Descriptor of `this`, None for static methods
    pub parameters: &'a [Parameter],
    pub insns_size: u32, // Code units over all instructions
}

/// Number of registers a value of `descriptor` occupies
pub fn type_size(descriptor: &str) -> u32 {
    if matches!(descriptor, "J" | "D") { 2 } else { 1 }
}

impl Frame<'_> {
    /// Registers holding the receiver and the parameters on entry
    pub fn ins_size(&self) -> u32 {
        let parameters: u32 = self.parameters.iter().map(|p| type_size(&p.descriptor)).sum();
        parameters + u32::from(self.receiver.is_some())
    }
}

/// Current occupant of a live register
#[derive(Debug)]
struct Register {
    start: u32,
    name: String,
    descriptor: String,
    #[allow(dead_code)]
    signature: Option<String>,
}

struct Reconstructor {
    registers: Vec<Option<Register>>,
    results: Vec<LocalVariable>,
}

impl Reconstructor {
    fn new(register_count: u32) -> Self {
        Self {
            registers: (0..register_count).map(|_| None).collect(),
            results: Vec::new(),
        }
    }

    fn index(&self, register: u32) -> Result<usize, ReconstructionError> {
        let index = register as usize;
        if index < self.registers.len() {
            Ok(index)
        } else {
            Err(ReconstructionError::RegisterOutOfRange {
                register,
                count: self.registers.len() as u32,
            })
        }
    }

    /// Close the live range of `register` at `end`
    fn emit(&mut self, register: u32, end: u32) -> Result<(), ReconstructionError> {
        let index = self.index(register)?;
        let occupant = self.registers[index]
            .take()
            .ok_or(ReconstructionError::UndefinedRegister {
                register,
                offset: end,
            })?;
        let length = end
            .checked_sub(occupant.start)
            .ok_or(ReconstructionError::NegativeRange {
                register,
                start: occupant.start,
                end,
            })?;
        self.results.push(LocalVariable {
            start: occupant.start,
            length,
            name: occupant.name,
            descriptor: occupant.descriptor,
            slot: register,
        });
        Ok(())
    }

    /// Open a new range, implicitly ending the current occupant
    fn start(
        &mut self,
        register: u32,
        local: &LocalInfo,
        offset: u32,
    ) -> Result<(), ReconstructionError> {
        let index = self.index(register)?;
        if self.registers[index].is_some() {
            self.emit(register, offset)?;
        }
        self.registers[index] = Some(Register {
            start: offset,
            name: local.name.clone(),
            descriptor: local.descriptor.clone(),
            signature: local.signature.clone(),
        });
        Ok(())
    }

    fn apply(&mut self, event: &DebugEvent) -> Result<(), ReconstructionError> {
        match event {
            DebugEvent::StartLocal {
                register,
                local,
                offset,
            } => self.start(*register, local, *offset),
            // ART never restarts a local that is still live
            DebugEvent::RestartLocal {
                register,
                local,
                offset,
            } => {
                let index = self.index(*register)?;
                if self.registers[index].is_none() {
                    self.start(*register, local, *offset)?;
                }
                Ok(())
            }
            DebugEvent::EndLocal { register, offset } => self.emit(*register, *offset),
            DebugEvent::LineNumber { .. }
            | DebugEvent::PrologueEnd { .. }
            | DebugEvent::EpilogueBegin { .. } => Ok(()),
            DebugEvent::SetSourceFile { offset, .. } => Err(ReconstructionError::UnsupportedEvent {
                kind: event.kind(),
                offset: *offset,
            }),
        }
    }

    /// Locals without an explicit end live to the end of the method
    fn finish(mut self, insns_size: u32) -> Result<Vec<LocalVariable>, ReconstructionError> {
        for register in 0..self.registers.len() as u32 {
            if self.registers[register as usize].is_some() {
                self.emit(register, insns_size)?;
            }
        }
        Ok(self.results)
    }
}

/// Rebuild the local variable table of a method from its debug events.
///
/// The receiver and the parameters occupy the last `ins_size` registers of
/// the frame and are live from offset 0. If any parameter is unnamed the
/// method has no local variable information at all and the result is empty.
/// Variables are returned in the order their ranges were closed.
pub fn reconstruct_locals(
    frame: &Frame,
    events: &[DebugEvent],
) -> Result<Vec<LocalVariable>, ReconstructionError> {
    let Some(names) = frame
        .parameters
        .iter()
        .map(|p| p.name.as_deref())
        .collect::<Option<Vec<_>>>()
    else {
        trace!("Skipping local reconstruction, not all parameters are named");
        return Ok(Vec::new());
    };

    let ins = frame.ins_size();
    let mut register = frame
        .register_count
        .checked_sub(ins)
        .ok_or(ReconstructionError::ParameterWindow {
            ins,
            count: frame.register_count,
        })?;

    let mut reconstructor = Reconstructor::new(frame.register_count);
    if let Some(this) = frame.receiver {
        reconstructor.registers[register as usize] = Some(Register {
            start: 0,
            name: "this".to_string(),
            descriptor: this.to_string(),
            signature: None,
        });
        register += 1;
    }
    for (parameter, name) in frame.parameters.iter().zip(names) {
        reconstructor.registers[register as usize] = Some(Register {
            start: 0,
            name: name.to_string(),
            descriptor: parameter.descriptor.clone(),
            signature: parameter.signature.clone(),
        });
        register += type_size(&parameter.descriptor);
    }

    for event in events {
        reconstructor.apply(event)?;
    }
    reconstructor.finish(frame.insns_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashSet};

    fn info(name: &str, descriptor: &str) -> LocalInfo {
        LocalInfo {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            signature: None,
        }
    }

    fn start(register: u32, name: &str, offset: u32) -> DebugEvent {
        DebugEvent::StartLocal {
            register,
            local: info(name, "I"),
            offset,
        }
    }

    fn restart(register: u32, name: &str, offset: u32) -> DebugEvent {
        DebugEvent::RestartLocal {
            register,
            local: info(name, "I"),
            offset,
        }
    }

    fn end(register: u32, offset: u32) -> DebugEvent {
        DebugEvent::EndLocal { register, offset }
    }

    fn var(start: u32, length: u32, name: &str, descriptor: &str, slot: u32) -> LocalVariable {
        LocalVariable {
            start,
            length,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            slot,
        }
    }

    fn param(descriptor: &str, name: Option<&str>) -> Parameter {
        Parameter {
            descriptor: descriptor.to_string(),
            name: name.map(str::to_string),
            signature: None,
        }
    }

    fn frame(register_count: u32, parameters: &[Parameter], insns_size: u32) -> Frame<'_> {
        Frame {
            register_count,
            receiver: None,
            parameters,
            insns_size,
        }
    }

    #[test]
    fn end_then_start_reuses_slot() {
        let events = [start(0, "x", 0), end(0, 5), start(0, "y", 5)];
        let locals = reconstruct_locals(&frame(2, &[], 10), &events).unwrap();
        assert_eq!(locals, vec![var(0, 5, "x", "I", 0), var(5, 5, "y", "I", 0)]);
    }

    #[test]
    fn unnamed_parameter_yields_nothing() {
        let parameters = [param("I", Some("a")), param("I", None)];
        let events = [start(0, "x", 0), end(0, 5), start(0, "y", 5)];
        let locals = reconstruct_locals(&frame(4, &parameters, 10), &events).unwrap();
        assert!(locals.is_empty());

        // Even an otherwise invalid stream is not looked at
        let locals = reconstruct_locals(&frame(4, &parameters, 10), &[end(1, 8)]).unwrap();
        assert!(locals.is_empty());
    }

    #[test]
    fn end_of_dead_register_fails() {
        assert_eq!(
            reconstruct_locals(&frame(2, &[], 10), &[end(1, 8)]),
            Err(ReconstructionError::UndefinedRegister {
                register: 1,
                offset: 8,
            })
        );
    }

    #[test]
    fn end_before_start_fails() {
        assert_eq!(
            reconstruct_locals(&frame(1, &[], 10), &[start(0, "x", 5), end(0, 2)]),
            Err(ReconstructionError::NegativeRange {
                register: 0,
                start: 5,
                end: 2,
            })
        );
        // Also when the method is shorter than a still-live range
        assert_eq!(
            reconstruct_locals(&frame(1, &[], 4), &[start(0, "x", 6)]),
            Err(ReconstructionError::NegativeRange {
                register: 0,
                start: 6,
                end: 4,
            })
        );
    }

    #[test]
    fn set_source_file_is_unsupported() {
        let events = [DebugEvent::SetSourceFile {
            name: Some("Foo.kt".to_string()),
            offset: 3,
        }];
        assert_eq!(
            reconstruct_locals(&frame(1, &[], 10), &events),
            Err(ReconstructionError::UnsupportedEvent {
                kind: "SetSourceFile",
                offset: 3,
            })
        );
    }

    #[test]
    fn register_out_of_range() {
        assert_eq!(
            reconstruct_locals(&frame(2, &[], 10), &[start(2, "x", 0)]),
            Err(ReconstructionError::RegisterOutOfRange {
                register: 2,
                count: 2,
            })
        );
    }

    #[test]
    fn parameters_fill_the_end_of_the_frame() {
        // this: v2, a (long): v3-v4, b: v5
        let parameters = [param("J", Some("a")), param("Ljava/lang/String;", Some("b"))];
        let frame = Frame {
            register_count: 6,
            receiver: Some("Lfoo/Bar;"),
            parameters: &parameters,
            insns_size: 20,
        };
        assert_eq!(frame.ins_size(), 4);
        let locals = reconstruct_locals(&frame, &[start(0, "i", 4), end(0, 12)]).unwrap();
        assert_eq!(
            locals,
            vec![
                var(4, 8, "i", "I", 0),
                var(0, 20, "this", "Lfoo/Bar;", 2),
                var(0, 20, "a", "J", 3),
                var(0, 20, "b", "Ljava/lang/String;", 5),
            ]
        );
    }

    #[test]
    fn parameter_window_larger_than_frame() {
        let parameters = [param("D", Some("d"))];
        assert_eq!(
            reconstruct_locals(&frame(1, &parameters, 4), &[]),
            Err(ReconstructionError::ParameterWindow { ins: 2, count: 1 })
        );
    }

    #[test]
    fn start_on_live_register_ends_previous() {
        let events = [start(1, "x", 2), start(1, "y", 6)];
        let locals = reconstruct_locals(&frame(2, &[], 9), &events).unwrap();
        assert_eq!(locals, vec![var(2, 4, "x", "I", 1), var(6, 3, "y", "I", 1)]);
    }

    #[test]
    fn restart_of_live_register_is_ignored() {
        let events = [start(0, "x", 0), restart(0, "x", 4), end(0, 7), restart(0, "x", 9)];
        let locals = reconstruct_locals(&frame(1, &[], 12), &events).unwrap();
        assert_eq!(locals, vec![var(0, 7, "x", "I", 0), var(9, 3, "x", "I", 0)]);
    }

    #[test]
    fn line_markers_are_ignored() {
        let events = [
            DebugEvent::PrologueEnd { offset: 0 },
            DebugEvent::LineNumber { line: 3, offset: 0 },
            start(0, "x", 1),
            DebugEvent::EpilogueBegin { offset: 5 },
        ];
        let locals = reconstruct_locals(&frame(1, &[], 6), &events).unwrap();
        assert_eq!(locals, vec![var(1, 5, "x", "I", 0)]);
    }

    /// Random streams of starts, restarts and well-formed ends
    fn random_events(seed: u64, registers: u32, insns_size: u32) -> Vec<DebugEvent> {
        let mut state = seed | 1;
        let mut next = move |bound: u32| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state % u64::from(bound)) as u32
        };
        let mut live = vec![false; registers as usize];
        let mut events = Vec::new();
        let mut offset = 0;
        while offset < insns_size {
            let register = next(registers);
            let name = format!("v{}", next(4));
            match next(3) {
                0 => {
                    events.push(start(register, &name, offset));
                    live[register as usize] = true;
                }
                1 => {
                    events.push(restart(register, &name, offset));
                    live[register as usize] = true;
                }
                _ if live[register as usize] => {
                    events.push(end(register, offset));
                    live[register as usize] = false;
                }
                _ => {}
            }
            offset += next(3);
        }
        events
    }

    #[test]
    fn ranges_per_slot_are_disjoint() {
        for seed in 1..200 {
            let events = random_events(seed, 4, 64);
            let locals = reconstruct_locals(&frame(4, &[], 64), &events).unwrap();

            let mut by_slot: BTreeMap<u32, Vec<&LocalVariable>> = BTreeMap::new();
            for local in &locals {
                by_slot.entry(local.slot).or_default().push(local);
            }
            for ranges in by_slot.values_mut() {
                ranges.sort_by_key(|l| l.start);
                for pair in ranges.windows(2) {
                    assert!(pair[0].end() <= pair[1].start, "seed {}: {:?}", seed, pair);
                }
            }

            // A slot whose last event is not an end stays live to the end
            for (slot, ranges) in &by_slot {
                let ended_last = events.iter().rev().find_map(|e| match e {
                    DebugEvent::StartLocal { register, .. } if register == slot => Some(false),
                    DebugEvent::EndLocal { register, .. } if register == slot => Some(true),
                    _ => None,
                });
                if ended_last == Some(false) {
                    assert_eq!(ranges.last().map(|l| l.end()), Some(64), "seed {}", seed);
                }
            }
        }
    }

    #[test]
    fn reconstruction_is_deterministic() {
        for seed in 1..50 {
            let events = random_events(seed, 3, 40);
            let first: HashSet<_> = reconstruct_locals(&frame(3, &[], 40), &events)
                .unwrap()
                .into_iter()
                .collect();
            let second: HashSet<_> = reconstruct_locals(&frame(3, &[], 40), &events)
                .unwrap()
                .into_iter()
                .collect();
            assert_eq!(first, second);
        }
    }
}
