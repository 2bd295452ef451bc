//! Sliding window: a fixed-size slotted array of in-flight packets, indexed
//! by `seq % window_size` with a linear-scan fallback when the primary
//! slot is occupied by something else. Used both as the sender's in-flight
//! window and, unmodified, as the receiver's out-of-order reorder buffer.

use crate::wire::Flag;

#[derive(Debug, Clone)]
pub struct Slot {
    pub seq: u32,
    pub flag: Flag,
    pub data: Vec<u8>,
    pub acknowledged: bool,
    pub retransmit_count: u32,
}

/// Outcome of `Window::add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// `seq` is more than `2 * window_size` ahead of `base` — the caller's
    /// bookkeeping is broken, this should never legitimately happen.
    TooFarAhead,
}

#[derive(Debug)]
pub struct Window {
    slots: Vec<Option<Slot>>,
    window_size: u32,
    base: u32,
    next_seq: u32,
    /// Tracks repeats of an ack one below `base`, replacing the original's
    /// function-local `static` counters (spec.md's redesign note: lift
    /// global/static trackers into explicit session state).
    last_rr_seq: Option<u32>,
    repeat_rr_count: u32,
}

impl Window {
    pub fn new(window_size: u32) -> Self {
        Window {
            slots: (0..window_size).map(|_| None).collect(),
            window_size,
            base: 0,
            next_seq: 0,
            last_rr_seq: None,
            repeat_rr_count: 0,
        }
    }

    pub fn window_size(&self) -> u32 {
        self.window_size
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// Used only by the receiver's reorder buffer, which tracks its own
    /// `expected_seq` rather than advancing `base` through `mark_ack`.
    pub fn retarget_base(&mut self, base: u32) {
        self.base = base;
    }

    /// Removes the slot holding `seq`, if present — used by the receiver
    /// to free a reorder-buffer slot once its payload has been written
    /// out in order.
    pub fn remove(&mut self, seq: u32) {
        let index = self.index(seq);
        if matches!(&self.slots[index], Some(s) if s.seq == seq) {
            self.slots[index] = None;
            return;
        }
        for i in 0..self.window_size as usize {
            let alt = (index + i) % self.window_size as usize;
            if matches!(&self.slots[alt], Some(s) if s.seq == seq) {
                self.slots[alt] = None;
                return;
            }
        }
    }

    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    pub fn advance_next_seq(&mut self) -> u32 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn index(&self, seq: u32) -> usize {
        (seq % self.window_size) as usize
    }

    /// Inserts `data` under `seq`. If the primary slot is occupied by a
    /// different, unacknowledged sequence number, scans for an empty or
    /// already-acknowledged alternate slot within `[base, base+window_size)`
    /// before forcibly overwriting the primary slot as a last resort.
    pub fn add(&mut self, seq: u32, flag: Flag, data: Vec<u8>) -> AddOutcome {
        if seq > self.base + 2 * self.window_size {
            return AddOutcome::TooFarAhead;
        }

        let mut index = self.index(seq);

        let occupied_by_other = matches!(&self.slots[index], Some(s) if s.seq != seq);
        if occupied_by_other && seq >= self.base && seq < self.base + self.window_size {
            for i in 0..self.window_size as usize {
                let alt = (index + i) % self.window_size as usize;
                let free = match &self.slots[alt] {
                    None => true,
                    Some(s) => s.acknowledged,
                };
                if free {
                    index = alt;
                    break;
                }
            }
        }

        self.slots[index] = Some(Slot {
            seq,
            flag,
            data,
            acknowledged: false,
            retransmit_count: 0,
        });

        AddOutcome::Added
    }

    /// Marks every packet from `base` through `ack_seq` (inclusive) as
    /// acknowledged. Returns `true` if this ack was the third consecutive
    /// duplicate at `base - 1`, meaning the caller should force a
    /// retransmit of the base packet (fast retransmit).
    pub fn mark_ack(&mut self, ack_seq: u32) -> bool {
        if ack_seq == self.base.wrapping_sub(1) {
            let repeated = self.last_rr_seq == Some(ack_seq);
            self.last_rr_seq = Some(ack_seq);
            self.repeat_rr_count = if repeated { self.repeat_rr_count + 1 } else { 1 };

            if self.repeat_rr_count >= 3 {
                let index = self.index(self.base);
                if let Some(slot) = &mut self.slots[index] {
                    if slot.seq == self.base {
                        slot.acknowledged = false;
                    }
                }
                return true;
            }
            return false;
        }

        self.last_rr_seq = None;
        self.repeat_rr_count = 0;

        if ack_seq < self.base && self.base - ack_seq > 5 {
            return false;
        }

        let packets_to_ack = if ack_seq >= self.base {
            ack_seq - self.base + 1
        } else {
            u32::MAX - self.base + ack_seq + 1
        };
        let packets_to_ack = packets_to_ack.min(self.window_size);

        for i in 0..packets_to_ack {
            let seq = self.base.wrapping_add(i);
            let index = self.index(seq);

            if matches!(&self.slots[index], Some(s) if s.seq == seq) {
                self.slots[index].as_mut().unwrap().acknowledged = true;
                continue;
            }

            for j in 0..self.window_size as usize {
                let alt = (index + j) % self.window_size as usize;
                if matches!(&self.slots[alt], Some(s) if s.seq == seq) {
                    self.slots[alt].as_mut().unwrap().acknowledged = true;
                    break;
                }
            }
        }

        false
    }

    /// Looks up the packet at `seq`, trying the primary slot then scanning
    /// the whole window. Range-checked: too old (`base - seq >
    /// window_size`) or too far ahead (`seq >= base + 2*window_size`)
    /// return `None` without searching.
    pub fn get(&self, seq: u32) -> Option<&Slot> {
        if seq < self.base && self.base - seq > self.window_size {
            return None;
        }
        if seq >= self.base + self.window_size * 2 {
            return None;
        }

        let index = self.index(seq);
        if matches!(&self.slots[index], Some(s) if s.seq == seq) {
            return self.slots[index].as_ref();
        }

        for i in 0..self.window_size as usize {
            let alt = (index + i) % self.window_size as usize;
            if matches!(&self.slots[alt], Some(s) if s.seq == seq) {
                return self.slots[alt].as_ref();
            }
        }

        None
    }

    pub fn get_mut(&mut self, seq: u32) -> Option<&mut Slot> {
        if seq < self.base && self.base - seq > self.window_size {
            return None;
        }
        if seq >= self.base + self.window_size * 2 {
            return None;
        }

        let index = self.index(seq);
        if matches!(&self.slots[index], Some(s) if s.seq == seq) {
            return self.slots[index].as_mut();
        }

        for i in 0..self.window_size as usize {
            let alt = (index + i) % self.window_size as usize;
            if matches!(&self.slots[alt], Some(s) if s.seq == seq) {
                return self.slots[alt].as_mut();
            }
        }

        None
    }

    /// Advances `base` while the slot holding it is acknowledged, freeing
    /// each slot as it slides past. Capped at one pass over the window per
    /// call. Returns the number of packets slid.
    pub fn slide(&mut self) -> u32 {
        let mut slid = 0;

        while slid < self.window_size {
            let index = self.index(self.base);

            let at_primary = matches!(&self.slots[index], Some(s) if s.seq == self.base && s.acknowledged);
            if at_primary {
                self.slots[index] = None;
                self.base += 1;
                slid += 1;
                continue;
            }

            let mut found = false;
            for i in 0..self.window_size as usize {
                let alt = (index + i) % self.window_size as usize;
                let matches = matches!(&self.slots[alt], Some(s) if s.seq == self.base && s.acknowledged);
                if matches {
                    self.slots[alt] = None;
                    self.base += 1;
                    slid += 1;
                    found = true;
                    break;
                }
            }

            if !found {
                break;
            }
        }

        slid
    }

    /// Force-marks the base slot acknowledged and slides once, the
    /// deadlock-breaker used after repeated retransmit failures.
    pub fn force_advance(&mut self) {
        let index = self.index(self.base);
        if let Some(slot) = &mut self.slots[index] {
            if slot.seq == self.base {
                slot.acknowledged = true;
            }
        }
        self.slide();
    }
}
