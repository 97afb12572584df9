use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use bytes::Bytes;
use rand::Rng;
use robolink_packet::{CommandKind, CorrelationId, OutputPacket};

use crate::error::{LinkError, Result};

/// Number of distinct generated ids (`1000..=9999`).
const ID_SPACE: usize = (CorrelationId::MAX - CorrelationId::MIN + 1) as usize;

/// Random draws before allocation falls back to a scan.
const RANDOM_DRAWS: usize = 64;

#[derive(Debug)]
struct PendingEntry {
    packet: OutputPacket,
    frame: Bytes,
    enqueued_at: Instant,
}

/// A packet taken off the queue for transmission.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub correlation_id: CorrelationId,
    pub kind: CommandKind,
    /// Encoded wire frame.
    pub frame: Bytes,
}

/// Commands awaiting transmission and acknowledgment.
///
/// Ids are transmitted in enqueue order. An entry stays in the table after
/// transmission until the controller acknowledges it (or it expires).
#[derive(Debug, Default)]
pub struct PendingTable {
    queue: VecDeque<CorrelationId>,
    entries: HashMap<CorrelationId, PendingEntry>,
}

impl PendingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw a random id that no pending command uses.
    pub fn allocate_id<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<CorrelationId> {
        self.allocate_id_excluding(rng, |_| false)
    }

    /// Draw a random id that is neither pending nor `reserved`.
    ///
    /// Falls back to a scan of the whole id space once random draws keep colliding.
    pub fn allocate_id_excluding<R, F>(&self, rng: &mut R, reserved: F) -> Result<CorrelationId>
    where
        R: Rng + ?Sized,
        F: Fn(CorrelationId) -> bool,
    {
        let free = |id: CorrelationId| !self.entries.contains_key(&id) && !reserved(id);

        if self.entries.len() < ID_SPACE {
            for _ in 0..RANDOM_DRAWS {
                let id = CorrelationId::random(rng);
                if free(id) {
                    return Ok(id);
                }
            }
        }

        let span = CorrelationId::MAX - CorrelationId::MIN + 1;
        let start = CorrelationId::random(rng).get() - CorrelationId::MIN;
        (0..span)
            .map(|offset| CorrelationId::MIN + (start + offset) % span)
            .filter_map(|v| CorrelationId::new(v).ok())
            .find(|id| free(*id))
            .ok_or(LinkError::IdSpaceExhausted(self.entries.len()))
    }

    /// Encode `packet` and queue it for transmission.
    pub fn enqueue(&mut self, packet: OutputPacket) -> Result<CorrelationId> {
        self.enqueue_at(packet, Instant::now())
    }

    fn enqueue_at(&mut self, packet: OutputPacket, now: Instant) -> Result<CorrelationId> {
        let id = packet.correlation_id;
        if self.entries.contains_key(&id) {
            return Err(LinkError::DuplicateCorrelationId(id));
        }
        self.entries.insert(
            id,
            PendingEntry {
                frame: packet.encode(),
                packet,
                enqueued_at: now,
            },
        );
        self.queue.push_back(id);
        Ok(id)
    }

    /// Pop the oldest queued id and return its frame.
    pub fn dequeue_next(&mut self) -> Option<Outgoing> {
        while let Some(id) = self.queue.pop_front() {
            if let Some(entry) = self.entries.get(&id) {
                return Some(Outgoing {
                    correlation_id: id,
                    kind: entry.packet.command.kind(),
                    frame: entry.frame.clone(),
                });
            }
        }
        None
    }

    /// Remove `id`. Returns `false` when it was not pending, which is not an error.
    pub fn acknowledge(&mut self, id: CorrelationId) -> bool {
        if self.entries.remove(&id).is_none() {
            return false;
        }
        // Acknowledged before transmission: never send it.
        self.queue.retain(|queued| *queued != id);
        true
    }

    /// Remove entries enqueued more than `ttl` before `now`; returns their ids.
    pub fn expire(&mut self, ttl: Duration, now: Instant) -> Vec<CorrelationId> {
        let mut expired: Vec<CorrelationId> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.enqueued_at) > ttl)
            .map(|(id, _)| *id)
            .collect();
        expired.sort_unstable();
        for id in &expired {
            self.entries.remove(id);
        }
        if !expired.is_empty() {
            self.queue.retain(|queued| self.entries.contains_key(queued));
        }
        expired
    }

    /// The packet stored under `id`.
    pub fn get(&self, id: CorrelationId) -> Option<&OutputPacket> {
        self.entries.get(&id).map(|entry| &entry.packet)
    }

    /// Whether `id` is pending.
    pub fn contains(&self, id: CorrelationId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Pending commands, transmitted or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Commands still waiting for transmission.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use robolink_packet::{Command, MotorCommand};

    use super::*;

    fn packet(id: u16) -> OutputPacket {
        OutputPacket::new(CorrelationId::new(id).unwrap(), Command::MeasureDistance)
    }

    fn cid(id: u16) -> CorrelationId {
        CorrelationId::new(id).unwrap()
    }

    #[test]
    fn dequeues_in_enqueue_order() {
        let mut table = PendingTable::new();
        for id in [3001, 1002, 2003] {
            table.enqueue(packet(id)).unwrap();
        }

        let order: Vec<u16> = std::iter::from_fn(|| table.dequeue_next())
            .map(|out| out.correlation_id.get())
            .collect();
        assert_eq!(order, vec![3001, 1002, 2003]);
        assert_eq!(table.queued(), 0);
        assert_eq!(table.len(), 3, "transmitted entries await acknowledgment");
    }

    #[test]
    fn dequeue_returns_encoded_frame() {
        let mut table = PendingTable::new();
        let p = OutputPacket::new(
            cid(4821),
            Command::BothSteppingMotor(MotorCommand::stop()),
        );
        table.enqueue(p).unwrap();

        let out = table.dequeue_next().unwrap();
        assert_eq!(out.kind, CommandKind::BothSteppingMotor);
        assert_eq!(out.frame, p.encode());
        assert!(table.dequeue_next().is_none());
    }

    #[test]
    fn acknowledge_removes_only_that_entry() {
        let mut table = PendingTable::new();
        for id in [1111, 2222, 3333] {
            table.enqueue(packet(id)).unwrap();
        }

        assert!(table.acknowledge(cid(2222)));
        assert!(table.contains(cid(1111)));
        assert!(!table.contains(cid(2222)));
        assert!(table.contains(cid(3333)));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn acknowledge_unknown_id_is_noop() {
        let mut table = PendingTable::new();
        table.enqueue(packet(1111)).unwrap();

        assert!(!table.acknowledge(cid(9999)));
        assert!(!table.acknowledge(cid(9999)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.queued(), 1);
    }

    #[test]
    fn acknowledged_before_transmission_is_never_sent() {
        let mut table = PendingTable::new();
        table.enqueue(packet(1111)).unwrap();
        table.enqueue(packet(2222)).unwrap();
        table.acknowledge(cid(1111));

        assert_eq!(table.dequeue_next().unwrap().correlation_id, cid(2222));
        assert!(table.dequeue_next().is_none());
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut table = PendingTable::new();
        table.enqueue(packet(5000)).unwrap();
        let err = table.enqueue(packet(5000)).unwrap_err();
        assert!(matches!(err, LinkError::DuplicateCorrelationId(id) if id.get() == 5000));
        assert_eq!(table.queued(), 1);
    }

    #[test]
    fn allocate_skips_pending_ids() {
        let mut table = PendingTable::new();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let id = table.allocate_id(&mut rng).unwrap();
            table
                .enqueue(OutputPacket::new(id, Command::MeasureLineTracer))
                .unwrap();
        }
        assert_eq!(table.len(), 500);
    }

    #[test]
    fn allocate_skips_reserved_ids() {
        let table = PendingTable::new();
        let mut rng = StdRng::seed_from_u64(11);
        let id = table
            .allocate_id_excluding(&mut rng, |id| id.get() != 5555)
            .unwrap();
        assert_eq!(id, cid(5555));
    }

    #[test]
    fn allocate_reports_exhaustion() {
        let table = PendingTable::new();
        let mut rng = StdRng::seed_from_u64(3);
        let err = table.allocate_id_excluding(&mut rng, |_| true).unwrap_err();
        assert!(matches!(err, LinkError::IdSpaceExhausted(0)));
    }

    #[test]
    fn expire_drops_stale_entries() {
        let mut table = PendingTable::new();
        let start = Instant::now();
        table.enqueue_at(packet(1111), start).unwrap();
        table
            .enqueue_at(packet(2222), start + Duration::from_secs(5))
            .unwrap();

        let expired = table.expire(Duration::from_secs(3), start + Duration::from_secs(6));
        assert_eq!(expired, vec![cid(1111)]);
        assert!(!table.contains(cid(1111)));
        assert_eq!(table.dequeue_next().unwrap().correlation_id, cid(2222));
    }

    #[test]
    fn get_returns_stored_packet() {
        let mut table = PendingTable::new();
        let p = packet(6060);
        table.enqueue(p).unwrap();
        assert_eq!(table.get(cid(6060)), Some(&p));
        assert!(table.get(cid(6061)).is_none());
    }
}
