use rand::Rng;
use serde::{Deserialize, Serialize};

const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Inputs that make generated names unique within a shared subscription.
///
/// `int` feeds the numeric names (`acctestRG-{int}`); `suffix` feeds fixtures
/// whose names are length-limited (Windows computer names).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Seed {
    pub int: u64,
    pub suffix: String,
}

impl Seed {
    pub const SUFFIX_LEN: usize = 7;

    pub fn new(int: u64, suffix: impl Into<String>) -> Self {
        Self {
            int,
            suffix: suffix.into(),
        }
    }

    /// Deterministic seed: the suffix is derived from the integer.
    pub fn from_int(int: u64) -> Self {
        Self {
            int,
            suffix: derive_suffix(int),
        }
    }

    pub fn random() -> Self {
        let mut rng = rand::rng();
        let int = rng.random_range(0..=i64::MAX as u64);
        let suffix = (0..Self::SUFFIX_LEN)
            .map(|_| SUFFIX_CHARSET[rng.random_range(0..SUFFIX_CHARSET.len())] as char)
            .collect();
        Self { int, suffix }
    }

    /// A sibling seed for the `n`th case of a run, so cases sharing a base
    /// seed never collide on names.
    pub fn offset(&self, n: u64) -> Self {
        Self::from_int(self.int.wrapping_add(n))
    }
}

impl std::fmt::Display for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.int, self.suffix)
    }
}

fn derive_suffix(int: u64) -> String {
    let mut n = int;
    let mut out = vec![b'0'; Seed::SUFFIX_LEN];
    for slot in out.iter_mut().rev() {
        *slot = SUFFIX_CHARSET[(n % 36) as usize];
        n /= 36;
    }
    // Base-36 digits in the charset order above: letters first.
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_suffix_is_stable() {
        assert_eq!(Seed::from_int(42), Seed::from_int(42));
        assert_eq!(Seed::from_int(42).suffix.len(), Seed::SUFFIX_LEN);
        assert_ne!(Seed::from_int(42).suffix, Seed::from_int(43).suffix);
    }

    #[test]
    fn random_seed_shape() {
        let seed = Seed::random();
        assert!(seed.int <= i64::MAX as u64);
        assert_eq!(seed.suffix.len(), Seed::SUFFIX_LEN);
        assert!(seed
            .suffix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn offset_changes_both_parts() {
        let base = Seed::from_int(7);
        let next = base.offset(1);
        assert_eq!(next.int, 8);
        assert_ne!(next.suffix, base.suffix);
    }
}
