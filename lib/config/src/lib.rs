//! Compile-time defaults for register map trees.
//! The values come from `defaults.json` next to this crate's manifest and are
//! generated into constants by the build script.

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

include!(concat!(env!("OUT_DIR"), "/build_flags.rs"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        assert!(DEFAULT_MIN_ACCESS > 0);
        assert!(DEFAULT_MAX_ACCESS >= DEFAULT_MIN_ACCESS);
        assert!(DEFAULT_WORD_BITS <= DEFAULT_STRIDE * 8);
    }
}
