//! 160-bit identifiers and XOR distance (C1).
//!
//! Every node, contact and record key lives in the same 160-bit space.
//! Routing is driven entirely by XOR distance between ids, so this module
//! is the one place that distance arithmetic and bit-length live.

use std::fmt;

/// An opaque 160-bit identifier.
///
/// Stored big-endian (byte 0 is the most significant byte), so lexicographic
/// byte comparison matches unsigned integer comparison.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Id(pub [u8; 20]);

impl Id {
    pub const ZERO: Id = Id([0u8; 20]);
    pub const BITS: u32 = 160;

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Id(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// `xor(a, b)`.
    pub fn xor(&self, other: &Id) -> Id {
        let mut out = [0u8; 20];
        for i in 0..20 {
            out[i] = self.0[i] ^ other.0[i];
        }
        Id(out)
    }

    /// `distance(a, b) = xor(a, b)`, as an unsigned big-endian integer.
    pub fn distance(&self, other: &Id) -> Id {
        self.xor(other)
    }

    /// Index of the highest set bit, `0..159`, or `None` for the zero id.
    ///
    /// This doubles as `bucket_index(a, b) = bit_length(distance(a, b)) - 1`
    /// when applied to a distance: the spec's `⌊log₂(distance)⌋`.
    pub fn bit_length(&self) -> Option<u32> {
        for (byte_index, byte) in self.0.iter().enumerate() {
            if *byte != 0 {
                let leading = byte.leading_zeros();
                let bit_in_byte = 7 - leading;
                let bits_before = (byte_index as u32) * 8;
                return Some(bits_before + bit_in_byte);
            }
        }
        None
    }

    /// `bucket_index(a, b)`: the common-prefix-length index used to place a
    /// contact into a bucket. Distance of zero (identical ids) has no index
    /// and must not occur for distinct peers.
    pub fn bucket_index(&self, other: &Id) -> Option<u32> {
        self.distance(other).bit_length()
    }

    pub fn random() -> Self {
        let mut bytes = [0u8; 20];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Id(bytes)
    }

    /// A random id whose highest set bit is exactly `bit_index` away from
    /// this id's corresponding bucket range — used to pick a random target
    /// within a bucket's range for refresh lookups.
    pub fn random_in_bucket(&self, range_min: &Id, range_max: &Id) -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        loop {
            let mut bytes = [0u8; 20];
            rng.fill(&mut bytes);
            let candidate = Id(bytes);
            if &candidate >= range_min && &candidate < range_max {
                return candidate;
            }
        }
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", hex::encode(self.0))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_is_self_inverse() {
        let a = Id::random();
        let b = Id::random();
        let d = a.xor(&b);
        assert_eq!(d.xor(&b), a);
    }

    #[test]
    fn distance_to_self_is_zero() {
        let a = Id::random();
        assert_eq!(a.distance(&a), Id::ZERO);
        assert_eq!(a.distance(&a).bit_length(), None);
    }

    #[test]
    fn bit_length_of_zero_is_none() {
        assert_eq!(Id::ZERO.bit_length(), None);
    }

    #[test]
    fn bit_length_of_one_is_zero() {
        let mut bytes = [0u8; 20];
        bytes[19] = 1;
        assert_eq!(Id(bytes).bit_length(), Some(0));
    }

    #[test]
    fn bit_length_of_highest_bit() {
        let mut bytes = [0u8; 20];
        bytes[0] = 0x80;
        assert_eq!(Id(bytes).bit_length(), Some(159));
    }

    #[test]
    fn bucket_index_range() {
        let a = Id::random();
        let b = Id::random();
        if a != b {
            let idx = a.bucket_index(&b).unwrap();
            assert!(idx < 160);
        }
    }

    #[test]
    fn ordering_matches_unsigned_bytes() {
        let small = Id([0u8; 20]);
        let mut big_bytes = [0u8; 20];
        big_bytes[0] = 1;
        let big = Id(big_bytes);
        assert!(small < big);
    }
}
