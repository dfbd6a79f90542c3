use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use chrono::Utc;
use rand::{rngs::OsRng, RngCore};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Generates a store reference for a diff upload: the current Unix time in nanoseconds and three
/// random bytes, as `<nanos>-<base64url>`.
///
/// If the OS random source fails the random part is all zeroes. References generated by the
/// same process in the same nanosecond may then collide, in which case the store rejects the
/// second writer as locked.
pub fn unique_ref() -> String {
    let mut bytes = [0u8; 3];
    let _ = OsRng.try_fill_bytes(&mut bytes);

    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{nanos}-{}", URL_SAFE.encode(bytes))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_unique_ref_format() {
        let reference = unique_ref();
        let (nanos, random) = reference.split_once('-').expect("separator");

        assert!(nanos.parse::<i64>().is_ok());
        assert_eq!(random.len(), 4);
        assert!(random
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_unique_ref_does_not_repeat() {
        let refs: HashSet<_> = (0..64).map(|_| unique_ref()).collect();
        assert_eq!(refs.len(), 64);
    }
}
