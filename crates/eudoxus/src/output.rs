// Output records and output-chain traversal.

use crate::image::{Automaton, OutputId};
use crate::vls::VlsReader;
use crate::{Command, EudoxusError, Status};

/// One decoded output record.
///
/// On disk: `payload_length: u32, payload: [u8; payload_length], next_output: id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputRecord<'a> {
    pub payload: &'a [u8],
    /// Next output in the chain; id 0 terminates.
    pub next: OutputId,
}

impl<'a> OutputRecord<'a> {
    pub fn read(image: &'a Automaton, id: OutputId) -> Result<Self, EudoxusError> {
        let mut vls = VlsReader::new(image, id.0);
        let length = vls.u32()?;
        let payload = vls.array(length as usize)?;
        let next = vls.id()?;
        Ok(Self {
            payload,
            next: OutputId(next),
        })
    }
}

/// Deliver every payload of the chain starting at `first` to `emit`.
///
/// `first` must be nonzero: callers resolve "no output" before walking. Any
/// command other than [`Command::Continue`] ends the walk immediately and is
/// returned as the matching [`Status`]; payloads already delivered stand.
///
/// Distinct records have distinct ids below the image length, so a chain
/// longer than that revisits a record and is rejected as a cycle.
pub fn walk_chain(
    image: &Automaton,
    first: OutputId,
    emit: &mut dyn FnMut(&[u8]) -> Command,
) -> Result<Status, EudoxusError> {
    let mut current = first;
    let mut visited = 0usize;
    while current.0 != 0 {
        visited += 1;
        if visited > image.len() {
            return Err(EudoxusError::OutputCycle(first.0));
        }
        let record = OutputRecord::read(image, current)?;
        match emit(record.payload) {
            Command::Continue => current = record.next,
            halt => return Ok(Status::from(halt)),
        }
    }
    Ok(Status::Ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ImageBuilder;
    use crate::builder::LowNodeSpec;

    fn chain_image(payloads: &[&[u8]]) -> (Automaton, OutputId) {
        let mut b = ImageBuilder::new();
        let first = b.add_output_chain(payloads).unwrap();
        b.add_node(LowNodeSpec::new().with_output(first));
        let built = b.build().unwrap();
        let first = built.output_id(first);
        (Automaton::from_bytes(built.as_bytes()).unwrap(), first)
    }

    #[test]
    fn walks_whole_chain_in_order() {
        let (a, first) = chain_image(&[&b"one"[..], b"two", b""]);
        let mut seen = Vec::new();
        let status = walk_chain(&a, first, &mut |p: &[u8]| {
            seen.push(p.to_vec());
            Command::Continue
        })
        .unwrap();
        assert_eq!(status, Status::Ok);
        assert_eq!(seen, vec![b"one".to_vec(), b"two".to_vec(), Vec::new()]);
    }

    #[test]
    fn stop_skips_rest_of_chain() {
        let (a, first) = chain_image(&[&b"one"[..], b"two", b"three"]);
        let mut seen = 0;
        let status = walk_chain(&a, first, &mut |_: &[u8]| {
            seen += 1;
            if seen == 2 { Command::Stop } else { Command::Continue }
        })
        .unwrap();
        assert_eq!(status, Status::Stop);
        assert_eq!(seen, 2);
    }

    #[test]
    fn error_command_passes_through() {
        let (a, first) = chain_image(&[&b"one"[..], b"two"]);
        let status = walk_chain(&a, first, &mut |_: &[u8]| Command::Error).unwrap();
        assert_eq!(status, Status::Error);
    }

    #[test]
    fn record_fields_decode() {
        let (a, first) = chain_image(&[&b"x"[..], b"yy"]);
        let head = OutputRecord::read(&a, first).unwrap();
        assert_eq!(head.payload, b"x");
        let tail = OutputRecord::read(&a, head.next).unwrap();
        assert_eq!(tail.payload, b"yy");
        assert_eq!(tail.next, OutputId(0));
    }

    #[test]
    fn self_referencing_chain_is_rejected() {
        let mut b = ImageBuilder::new();
        let out = b.add_output(b"loop", None);
        b.add_node(LowNodeSpec::new().with_output(out));
        let built = b.build().unwrap();
        let id = built.output_id(out).0;
        let mut bytes = built.into_bytes();
        // Point next_output (after the u32 length and 4 payload bytes) back at itself.
        let at = id as usize + 4 + 4;
        bytes[at..at + 4].copy_from_slice(&(id as u32).to_le_bytes());
        let a = Automaton::from_bytes(&bytes).unwrap();

        let mut delivered = 0usize;
        let err = walk_chain(&a, OutputId(id), &mut |_: &[u8]| {
            delivered += 1;
            Command::Continue
        })
        .unwrap_err();
        assert_eq!(err, EudoxusError::OutputCycle(id));
        assert_eq!(delivered, a.len());
    }

    #[test]
    fn dangling_output_is_invalid() {
        let (a, _) = chain_image(&[b"x"]);
        let bogus = OutputId(a.len() as u64 - 1);
        let err = walk_chain(&a, bogus, &mut |_: &[u8]| Command::Continue).unwrap_err();
        assert!(matches!(err, EudoxusError::OutOfBounds { .. }));
    }
}
