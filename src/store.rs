//! Retransmission store: a byte ring keyed by sequence number, the last
//! resort the sender reaches for when a timed-out packet has already
//! slid out of the window. Capacity is `2 * window_size * buffer_size`
//! packet-units; on overflow the oldest whole units are evicted (the
//! first evicted unit may be partial, since the ring's read head need not
//! be unit-aligned).

pub struct RetransmitStore {
    data: Vec<u8>,
    size: usize,
    head: usize,
    tail: usize,
    bytes_stored: usize,
    start_seq: u32,
    end_seq: u32,
    buffer_size: u32,
}

impl RetransmitStore {
    pub fn new(size: usize, buffer_size: u32) -> Self {
        RetransmitStore {
            data: vec![0u8; size],
            size,
            head: 0,
            tail: 0,
            bytes_stored: 0,
            start_seq: 0,
            end_seq: 0,
            buffer_size,
        }
    }

    /// Stores `data` under `seq_num`, evicting the oldest packet-units if
    /// the ring is full. Returns `false` only if `data` alone exceeds the
    /// ring's total capacity (cannot possibly fit even after eviction).
    pub fn write(&mut self, data: &[u8], seq_num: u32) -> bool {
        let len = data.len();

        if self.bytes_stored + len > self.size {
            let mut bytes_to_free = len;
            let mut seqs_removed = 0u32;

            while bytes_to_free > 0 && self.bytes_stored > 0 {
                let packet_size = if seqs_removed == 0 {
                    self.buffer_size as usize - (self.head % self.buffer_size as usize)
                } else {
                    self.buffer_size as usize
                };
                let packet_size = packet_size.min(self.bytes_stored);

                self.head = (self.head + packet_size) % self.size;
                self.bytes_stored -= packet_size;
                bytes_to_free = bytes_to_free.saturating_sub(packet_size);
                seqs_removed += 1;
            }

            self.start_seq += seqs_removed;

            if self.bytes_stored + len > self.size {
                return false;
            }
        }

        if self.tail + len <= self.size {
            self.data[self.tail..self.tail + len].copy_from_slice(data);
        } else {
            let first_chunk = self.size - self.tail;
            self.data[self.tail..].copy_from_slice(&data[..first_chunk]);
            self.data[..len - first_chunk].copy_from_slice(&data[first_chunk..]);
        }

        self.tail = (self.tail + len) % self.size;
        self.bytes_stored += len;

        if seq_num >= self.end_seq {
            self.end_seq = seq_num + 1;
        }

        true
    }

    /// Reconstructs the packet stored under `seq_num`, if it is still
    /// within `[start_seq, end_seq)`.
    pub fn read(&self, seq_num: u32) -> Option<Vec<u8>> {
        if seq_num < self.start_seq || seq_num >= self.end_seq {
            return None;
        }

        let seq_offset = (seq_num - self.start_seq) as usize;
        let position = (self.head + seq_offset * self.buffer_size as usize) % self.size;

        let mut len = self.buffer_size as usize;
        if seq_num == self.end_seq - 1
            && self.bytes_stored < (seq_offset + 1) * self.buffer_size as usize
        {
            len = self.bytes_stored - seq_offset * self.buffer_size as usize;
        }

        let mut out = vec![0u8; len];
        if position + len <= self.size {
            out.copy_from_slice(&self.data[position..position + len]);
        } else {
            let first_chunk = self.size - position;
            out[..first_chunk].copy_from_slice(&self.data[position..]);
            out[first_chunk..].copy_from_slice(&self.data[..len - first_chunk]);
        }

        Some(out)
    }
}
