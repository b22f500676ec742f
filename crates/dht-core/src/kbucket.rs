//! K-buckets (C3): a bounded, recency-ordered list of contacts covering a
//! half-open id range.

use std::collections::VecDeque;
use std::time::Instant;

use crate::contact::Contact;
use crate::id::Id;
use crate::{DhtError, Result};

pub const K: usize = 20;

/// `[range_min, range_max)` — a contiguous half-open slice of the id space,
/// plus the recency-ordered contacts that currently fall in it.
///
/// `contacts` is ordered ascending by `last_seen`: head is least-recently
/// seen, tail is most-recently seen. This discipline is load-bearing — it
/// implements Kademlia's bias toward long-lived nodes.
#[derive(Debug)]
pub struct KBucket {
    pub range_min: Id,
    pub range_max: Id,
    contacts: VecDeque<Contact>,
    pub last_accessed: Instant,
}

impl KBucket {
    pub fn new(range_min: Id, range_max: Id) -> Self {
        KBucket {
            range_min,
            range_max,
            contacts: VecDeque::new(),
            last_accessed: Instant::now(),
        }
    }

    /// `range_max == Id::ZERO` is the `2^160` sentinel (see `midpoint`), not
    /// a real upper bound — the root bucket and every bucket's upper half
    /// after a split carry it, so it must not be compared against directly.
    pub fn covers(&self, id: &Id) -> bool {
        *id >= self.range_min && (self.range_max == Id::ZERO || *id < self.range_max)
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.contacts.len() >= K
    }

    fn find_index(&self, id: &Id) -> Option<usize> {
        self.contacts.iter().position(|c| c.id == *id)
    }

    /// Insert or refresh `contact`. If already present, move it to the tail
    /// (most-recently-seen) and refresh `last_seen`. Otherwise, if there is
    /// room, append at the tail. If full and absent, fails with `BucketFull`
    /// — the caller (routing table) decides whether to split or evict.
    pub fn add(&mut self, mut contact: Contact) -> Result<()> {
        if let Some(idx) = self.find_index(&contact.id) {
            self.contacts.remove(idx);
            contact.touch();
            self.contacts.push_back(contact);
            return Ok(());
        }
        if self.is_full() {
            return Err(DhtError::BucketFull);
        }
        self.contacts.push_back(contact);
        Ok(())
    }

    pub fn get(&self, id: &Id) -> Result<&Contact> {
        self.contacts
            .iter()
            .find(|c| c.id == *id)
            .ok_or(DhtError::NotFound)
    }

    /// Up to `count` contacts (0 means all), tail-first (most recent
    /// first), omitting `exclude` if present.
    pub fn get_contacts(&self, count: usize, exclude: Option<&Id>) -> Vec<Contact> {
        let iter = self
            .contacts
            .iter()
            .rev()
            .filter(|c| exclude.map(|e| c.id != *e).unwrap_or(true))
            .cloned();
        if count == 0 {
            iter.collect()
        } else {
            iter.take(count).collect()
        }
    }

    pub fn remove(&mut self, id: &Id) -> Result<Contact> {
        let idx = self.find_index(id).ok_or(DhtError::NotFound)?;
        Ok(self.contacts.remove(idx).expect("index checked above"))
    }

    /// The least-recently-seen contact (head), if any.
    pub fn least_recently_seen(&self) -> Option<&Contact> {
        self.contacts.front()
    }

    pub fn all_contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.iter()
    }

    pub fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }

    /// Split into two half-range buckets, redistributing contacts by which
    /// half covers their id. Used only by the routing table, which owns the
    /// decision of *when* to split (§4.3).
    pub fn split(self) -> (KBucket, KBucket) {
        let mid = midpoint(&self.range_min, &self.range_max);
        let mut lower = KBucket::new(self.range_min, mid);
        let mut upper = KBucket::new(mid, self.range_max);
        for contact in self.contacts {
            if lower.covers(&contact.id) {
                let _ = lower.add(contact);
            } else {
                let _ = upper.add(contact);
            }
        }
        (lower, upper)
    }
}

/// Midpoint of `[min, max)` treating ids as 160-bit unsigned integers.
/// `max` may be `Id::ZERO` representing `2^160` (the top of the space).
pub fn midpoint(min: &Id, max: &Id) -> Id {
    let min_bytes = min.as_bytes();
    let is_top = *max == Id::ZERO;
    let mut acc = [0u16; 21];
    for i in 0..20 {
        acc[i + 1] = min_bytes[i] as u16;
    }
    if !is_top {
        let max_bytes = max.as_bytes();
        let mut carry = 0u16;
        for i in (0..20).rev() {
            let sum = acc[i + 1] + max_bytes[i] as u16 + carry;
            acc[i + 1] = sum & 0xFF;
            carry = sum >> 8;
        }
        acc[0] += carry;
    } else {
        // max == 2^160: add 1 << 160, i.e. set the implicit 21st byte.
        acc[0] += 1;
    }
    // divide the 21-byte big-endian number `acc` by 2
    let mut out = [0u8; 20];
    let mut carry = 0u16;
    let mut wide = [0u8; 21];
    for i in 0..21 {
        wide[i] = acc[i] as u8;
    }
    for i in 0..21 {
        let cur = carry * 256 + wide[i] as u16;
        let div = cur / 2;
        carry = cur % 2;
        if i >= 1 {
            out[i - 1] = div as u8;
        } else if div > 0 {
            // overflow beyond 160 bits shouldn't happen for valid ranges
        }
    }
    Id(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk(id: Id) -> Contact {
        Contact::new(id, "127.0.0.1".parse().unwrap(), 1, "1.0")
    }

    #[test]
    fn add_new_appends_at_tail() {
        let mut b = KBucket::new(Id::ZERO, Id([0xff; 20]));
        let a = Id::from_bytes([1; 20]);
        let c = Id::from_bytes([2; 20]);
        b.add(mk(a)).unwrap();
        b.add(mk(c)).unwrap();
        assert_eq!(b.least_recently_seen().unwrap().id, a);
    }

    #[test]
    fn re_add_moves_to_tail_without_growing() {
        let mut b = KBucket::new(Id::ZERO, Id([0xff; 20]));
        let a = Id::from_bytes([1; 20]);
        let c = Id::from_bytes([2; 20]);
        b.add(mk(a)).unwrap();
        b.add(mk(c)).unwrap();
        b.add(mk(a)).unwrap();
        assert_eq!(b.len(), 2);
        assert_eq!(b.least_recently_seen().unwrap().id, c);
    }

    #[test]
    fn full_bucket_rejects_new_contact() {
        let mut b = KBucket::new(Id::ZERO, Id([0xff; 20]));
        for i in 0..K {
            let mut bytes = [0u8; 20];
            bytes[19] = i as u8;
            b.add(mk(Id(bytes))).unwrap();
        }
        let mut extra = [0u8; 20];
        extra[19] = 200;
        assert!(matches!(b.add(mk(Id(extra))), Err(DhtError::BucketFull)));
    }

    #[test]
    fn covers_checks_half_open_range() {
        let mut top = [0u8; 20];
        top[19] = 1;
        let b = KBucket::new(Id::ZERO, Id::from_bytes(top));
        assert!(b.covers(&Id::ZERO));
        assert!(!b.covers(&Id::from_bytes(top)));
    }

    #[test]
    fn full_space_bucket_covers_every_id() {
        let b = KBucket::new(Id::ZERO, Id::ZERO);
        assert!(b.covers(&Id::ZERO));
        assert!(b.covers(&Id([0xff; 20])));
        assert!(b.covers(&Id::random()));
    }

    #[test]
    fn split_redistributes_by_range() {
        let mut b = KBucket::new(Id::ZERO, Id([0xff; 20]));
        let low = Id::from_bytes([0x10; 20]);
        let high = Id::from_bytes([0xe0; 20]);
        b.add(mk(low)).unwrap();
        b.add(mk(high)).unwrap();
        let (lower, upper) = b.split();
        assert!(lower.covers(&low));
        assert!(upper.covers(&high));
        assert_eq!(lower.len() + upper.len(), 2);
    }

    #[test]
    fn remove_deletes_contact() {
        let mut b = KBucket::new(Id::ZERO, Id([0xff; 20]));
        let a = Id::from_bytes([1; 20]);
        b.add(mk(a)).unwrap();
        b.remove(&a).unwrap();
        assert!(b.is_empty());
        assert!(matches!(b.remove(&a), Err(DhtError::NotFound)));
    }
}
