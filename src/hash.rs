//! Hash utility shared by every tree in the crate.
//!
//! All leaf and internal-node digests are produced here, so two trees built over the same
//! input with the same digest `H` always agree on their root hash.

use core::hash::{Hash, Hasher};
use sha2::digest::Output;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

/// Digest output for a hasher `H`.
pub type HashOf<H> = Output<H>;

/// Digest output for the default [`Sha256`] hasher.
pub type Sha256Hash = Output<Sha256>;

/// Stable identifier of a digest algorithm, recorded in exported snapshots.
///
/// Proofs and root hashes are only meaningful under the algorithm that produced them, so a
/// snapshot written with one algorithm refuses to load under another.
pub trait DigestName {
    /// Algorithm name written into snapshots.
    const NAME: &'static str;
}

macro_rules! impl_digest_name {
    ($($ty:ty => $name:literal),+ $(,)?) => {
        $(
            impl DigestName for $ty {
                const NAME: &'static str = $name;
            }
        )+
    };
}

impl_digest_name!(
    Sha224 => "sha2-224",
    Sha256 => "sha2-256",
    Sha384 => "sha2-384",
    Sha512 => "sha2-512",
);

/// Hashes raw bytes: `H(data)`.
///
/// ```
/// use bmtree::hash::hash;
/// use sha2::Sha256;
///
/// assert_eq!(hash::<Sha256>(b"a"), hash::<Sha256>(b"a"));
/// assert_ne!(hash::<Sha256>(b"a"), hash::<Sha256>(b"b"));
/// ```
#[inline(always)]
pub fn hash<H: Digest>(data: &[u8]) -> HashOf<H> {
    H::digest(data)
}

/// Combines two child digests: `H(left || right)`.
#[inline(always)]
pub fn hash_pair<H: Digest>(left: &HashOf<H>, right: &HashOf<H>) -> HashOf<H> {
    let mut hasher = H::new();
    hasher.update(left.as_ref());
    hasher.update(right.as_ref());
    hasher.finalize()
}

/// Digest of a node that carries its own payload: `H(payload || left || right)`.
///
/// Absent children contribute nothing to the preimage.
#[inline(always)]
pub(crate) fn hash_with_payload<H: Digest>(
    payload: &HashOf<H>,
    left: Option<&HashOf<H>>,
    right: Option<&HashOf<H>>,
) -> HashOf<H> {
    let mut hasher = H::new();
    hasher.update(payload.as_ref());
    if let Some(left) = left {
        hasher.update(left.as_ref());
    }
    if let Some(right) = right {
        hasher.update(right.as_ref());
    }
    hasher.finalize()
}

/// Digests any [`Hash`] value by streaming it into `H`.
///
/// The byte stream is whatever `Hash::hash` writes, so `hash_value(&"a")` differs from
/// `hash(b"a")`: string hashing appends a terminator byte.
#[inline(always)]
pub fn hash_value<T, H>(value: &T) -> HashOf<H>
where
    T: Hash + ?Sized,
    H: Digest + Clone,
{
    let mut writer = DigestWriter(H::new());
    value.hash(&mut writer);
    writer.0.finalize()
}

/// The all-zero digest, used as the empty-hash placeholder.
#[inline(always)]
pub fn zero_hash<H: Digest>() -> HashOf<H> {
    Output::<H>::default()
}

/// Length in bytes of the digest produced by `H`.
#[inline(always)]
pub fn digest_len<H: Digest>() -> usize {
    <H as Digest>::output_size()
}

/// Feeds whatever `Hash::hash` writes straight into a digest.
struct DigestWriter<H>(H);

impl<H> Hasher for DigestWriter<H>
where
    H: Digest + Clone,
{
    #[inline(always)]
    fn write(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    // only reached when a `Hash` impl inspects the running state
    fn finish(&self) -> u64 {
        let digest = self.0.clone().finalize();
        digest
            .iter()
            .take(8)
            .fold(0, |acc, byte| (acc << 8) | u64::from(*byte))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_fixed_length() {
        let a = hash::<Sha256>(b"payload");
        let b = hash::<Sha256>(b"payload");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert_eq!(hash::<Sha512>(b"payload").len(), 64);
        assert_eq!(digest_len::<Sha384>(), 48);
    }

    #[test]
    fn distinct_inputs_give_distinct_digests() {
        assert_ne!(hash::<Sha256>(b"a"), hash::<Sha256>(b"b"));
    }

    #[test]
    fn pair_hash_is_concatenation_then_hash() {
        let left = hash::<Sha256>(b"left");
        let right = hash::<Sha256>(b"right");
        let mut joined = left.to_vec();
        joined.extend_from_slice(&right);
        assert_eq!(hash_pair::<Sha256>(&left, &right), hash::<Sha256>(&joined));
        assert_ne!(
            hash_pair::<Sha256>(&left, &right),
            hash_pair::<Sha256>(&right, &left)
        );
    }

    #[test]
    fn payload_hash_skips_missing_children() {
        let payload = hash::<Sha256>(b"p");
        let child = hash::<Sha256>(b"c");
        let mut joined = payload.to_vec();
        joined.extend_from_slice(&child);
        assert_eq!(
            hash_with_payload::<Sha256>(&payload, None, Some(&child)),
            hash::<Sha256>(&joined)
        );
        assert_eq!(
            hash_with_payload::<Sha256>(&payload, None, None),
            hash::<Sha256>(&payload)
        );
    }

    #[test]
    fn value_hash_follows_hash_trait() {
        assert_eq!(
            hash_value::<u64, Sha256>(&7),
            hash_value::<u64, Sha256>(&7)
        );
        assert_ne!(
            hash_value::<u64, Sha256>(&7),
            hash_value::<u64, Sha256>(&8)
        );
        assert_eq!(zero_hash::<Sha256>().iter().filter(|b| **b != 0).count(), 0);
    }

    #[test]
    fn value_hash_digests_the_written_bytes() {
        assert_eq!(
            hash_value::<u64, Sha256>(&7),
            hash::<Sha256>(&7u64.to_ne_bytes())
        );
        let mut writer = DigestWriter(Sha256::new());
        writer.write(b"abc");
        let digest = hash::<Sha256>(b"abc");
        assert_eq!(writer.finish().to_be_bytes(), digest[..8]);
    }
}
