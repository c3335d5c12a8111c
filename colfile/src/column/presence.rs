//! Run length encoding of which cells of a record field are set.
//!
//! Runs alternate between set and unset cells, starting with a run of set cells. A stream
//! which begins with unset cells therefore begins with a run of length zero, and that is the
//! only place a zero length run may appear.
//!
//! Fields which are always set or always unset don't store any runs at all. The reassembly
//! value tells the two apart: an empty segment map means every cell is set, an unset
//! segment map means every cell is unset.
use std::sync::Arc;

use crate::{
    storage::ReadAt,
    types::{Type, TypeContext},
    value::{Builder, ValueRef},
};

use super::{
    segment::{parse_segmap, segmap_type},
    ColumnErrorKind, Error, IntReader, IntWriter, Spiller,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Empty,
    /// Every cell so far has been the same
    Uniform { unset: bool, count: u64 },
    /// At least one run has been written, `run` is the length of the pending run
    Mixed { unset: bool, run: u64 },
}

pub(crate) struct PresenceWriter {
    runs: IntWriter,
    state: State,
}

impl PresenceWriter {
    pub(crate) fn new() -> Self {
        PresenceWriter {
            runs: IntWriter::new(),
            state: State::Empty,
        }
    }

    pub(crate) fn touch_value(&mut self, spiller: &mut Spiller) -> Result<(), Error> {
        self.touch(false, spiller)
    }

    pub(crate) fn touch_unset(&mut self, spiller: &mut Spiller) -> Result<(), Error> {
        self.touch(true, spiller)
    }

    fn touch(&mut self, unset: bool, spiller: &mut Spiller) -> Result<(), Error> {
        self.state = match self.state {
            State::Empty => State::Uniform { unset, count: 1 },
            State::Uniform { unset: u, count } if u == unset => State::Uniform {
                unset,
                count: count + 1,
            },
            State::Uniform { unset: u, count } => {
                if u {
                    self.runs.write(0, spiller)?;
                }
                self.runs.write(count as i64, spiller)?;
                State::Mixed { unset, run: 1 }
            }
            State::Mixed { unset: u, run } if u == unset => State::Mixed { unset, run: run + 1 },
            State::Mixed { run, .. } => {
                self.runs.write(run as i64, spiller)?;
                State::Mixed { unset, run: 1 }
            }
        };
        Ok(())
    }

    pub(crate) fn flush(&mut self, spiller: &mut Spiller) -> Result<(), Error> {
        self.runs.flush(spiller)
    }

    /// Write out the pending run, if there is one, and flush
    pub(crate) fn finish(&mut self, spiller: &mut Spiller) -> Result<(), Error> {
        if let State::Mixed { unset, run } = self.state {
            if run > 0 {
                self.runs.write(run as i64, spiller)?;
                self.state = State::Mixed { unset, run: 0 };
            }
        }
        self.flush(spiller)
    }

    pub(crate) fn encode(&self, ctx: &mut TypeContext, b: &mut Builder) -> Result<Type, Error> {
        match self.state {
            State::Uniform { unset: true, .. } => {
                b.append_container(None);
                segmap_type(ctx)
            }
            State::Empty | State::Uniform { unset: false, .. } => {
                IntWriter::new().encode(ctx, b)
            }
            State::Mixed { .. } => self.runs.encode(ctx, b),
        }
    }
}

pub(crate) enum PresenceReader {
    AllPresent,
    AllUnset,
    Runs {
        runs: IntReader,
        primed: bool,
        unset: bool,
        remaining: u64,
    },
}

impl PresenceReader {
    pub(crate) fn new(reassembly: ValueRef<'_>, source: &Arc<dyn ReadAt>) -> Result<Self, Error> {
        if reassembly.is_null() {
            return Ok(PresenceReader::AllUnset);
        }
        let segments = parse_segmap(reassembly)?;
        if segments.is_empty() {
            return Ok(PresenceReader::AllPresent);
        }
        Ok(PresenceReader::Runs {
            runs: IntReader::from_segments(segments, source),
            primed: false,
            unset: false,
            remaining: 0,
        })
    }

    /// Whether the next cell of the field is set
    pub(crate) fn next(&mut self) -> Result<bool, Error> {
        let (runs, primed, unset, remaining) = match self {
            PresenceReader::AllPresent => return Ok(true),
            PresenceReader::AllUnset => return Ok(false),
            PresenceReader::Runs {
                runs,
                primed,
                unset,
                remaining,
            } => (runs, primed, unset, remaining),
        };
        if !*primed {
            *primed = true;
            *remaining = read_run(runs)?;
            *unset = false;
        }
        while *remaining == 0 {
            let run = read_run(runs)?;
            if run == 0 {
                return Err(ColumnErrorKind::IllegalZeroRun.into());
            }
            *unset = !*unset;
            *remaining = run;
        }
        *remaining -= 1;
        Ok(!*unset)
    }
}

fn read_run(runs: &mut IntReader) -> Result<u64, Error> {
    runs.read_len().map(|n| n as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        storage::{MemoryStorage, Storage},
        value::Iter,
    };
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn round_trip(present: &[bool]) -> (Option<Vec<u8>>, Vec<bool>) {
        let storage = MemoryStorage::new();
        let mut spiller = Spiller::new(storage.create("obj").unwrap(), 3);
        let mut w = PresenceWriter::new();
        for (i, p) in present.iter().enumerate() {
            if *p {
                w.touch_value(&mut spiller).unwrap();
            } else {
                w.touch_unset(&mut spiller).unwrap();
            }
            if i % 10 == 9 {
                w.flush(&mut spiller).unwrap();
            }
        }
        w.finish(&mut spiller).unwrap();
        let mut ctx = TypeContext::new();
        let mut b = Builder::new();
        let typ = w.encode(&mut ctx, &mut b).unwrap();
        drop(spiller);

        let bytes = b.into_bytes().unwrap();
        let cell = Iter::new(&bytes).next().unwrap().unwrap();
        let source = storage.open("obj").unwrap();
        let mut r = PresenceReader::new(ValueRef::new(&typ, cell.bytes), &source).unwrap();
        let decoded = present.iter().map(|_| r.next().unwrap()).collect();
        (cell.bytes.map(<[u8]>::to_vec), decoded)
    }

    #[test]
    fn alternating_presence() {
        let present = [false, true, false, true, false];
        let (segmap, decoded) = round_trip(&present);
        assert!(matches!(segmap, Some(s) if !s.is_empty()));
        assert_eq!(decoded, present.to_vec());
    }

    #[test]
    fn uniform_fields_store_no_runs() {
        let (segmap, decoded) = round_trip(&[true; 20]);
        assert_eq!(segmap, Some(vec![]));
        assert_eq!(decoded, vec![true; 20]);

        let (segmap, decoded) = round_trip(&[false; 20]);
        assert_eq!(segmap, None);
        assert_eq!(decoded, vec![false; 20]);
    }

    #[test]
    fn zero_runs_after_the_first_are_corrupt() {
        let storage = MemoryStorage::new();
        let mut spiller = Spiller::new(storage.create("obj").unwrap(), 1024);
        let mut runs = IntWriter::new();
        for run in [0, 2, 0] {
            runs.write(run, &mut spiller).unwrap();
        }
        runs.flush(&mut spiller).unwrap();
        let segments = runs.segments().to_vec();
        drop(spiller);
        let source = storage.open("obj").unwrap();
        let mut r = PresenceReader::Runs {
            runs: IntReader::from_segments(segments, &source),
            primed: false,
            unset: false,
            remaining: 0,
        };
        assert!(!r.next().unwrap());
        assert!(!r.next().unwrap());
        assert!(matches!(
            r.next(),
            Err(Error::Corrupt(e)) if e.kind() == &ColumnErrorKind::IllegalZeroRun
        ));
    }

    proptest! {
        #[test]
        fn presence_round_trips(present in proptest::collection::vec(any::<bool>(), 1..200)) {
            let (_, decoded) = round_trip(&present);
            prop_assert_eq!(decoded, present);
        }
    }
}
