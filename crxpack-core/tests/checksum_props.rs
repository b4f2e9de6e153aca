use crxpack_core::checksum::{crc32, Crc32};
use crxpack_core::compress::deflate;
use flate2::read::DeflateDecoder;
use proptest::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::io::Read;

fn inflate(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    DeflateDecoder::new(data).read_to_end(&mut out).unwrap();
    out
}

#[test]
fn known_vectors() {
    assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    assert_eq!(crc32(b"a"), 0xE8B7_BE43);
    assert_eq!(crc32(&[0u8; 32]), 0x190A_55AD);
}

#[test]
fn large_random_buffer_matches_reference() {
    let mut rng = StdRng::seed_from_u64(7);
    let data: Vec<u8> = (0..1 << 20).map(|_| rng.gen()).collect();
    assert_eq!(crc32(&data), crc32fast::hash(&data));
    assert_eq!(inflate(&deflate(&data).unwrap()), data);
}

proptest! {
    #[test]
    fn crc_matches_reference(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
        prop_assert_eq!(crc32(&data), crc32fast::hash(&data));
    }

    #[test]
    fn incremental_matches_one_shot(data in proptest::collection::vec(any::<u8>(), 0..2048), cut in 0usize..2048) {
        let cut = cut.min(data.len());
        let mut h = Crc32::new();
        h.update(&data[..cut]);
        h.update(&data[cut..]);
        prop_assert_eq!(h.finalize(), crc32(&data));
    }

    #[test]
    fn deflate_inflates_back(data in proptest::collection::vec(any::<u8>(), 0..8192)) {
        prop_assert_eq!(inflate(&deflate(&data).unwrap()), data);
    }
}
