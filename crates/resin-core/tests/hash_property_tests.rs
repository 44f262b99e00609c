#![allow(missing_docs)]
//! Property tests over the hash constructions.

use bytes::Bytes;
use proptest::prelude::*;
use resin_core::{
    make_algo_hash, make_content_hash, make_invoc_hash, make_res_hash, CompHash,
    ComputationResult, HashMixer, InvocHash, ResHash,
};

fn invoc_from(seed: u64) -> InvocHash {
    let mut mixer = HashMixer::new();
    mixer.add_u64(seed);
    InvocHash(mixer.finish())
}

proptest! {
    #[test]
    fn serialized_content_identity_depends_only_on_the_bytes(
        blob in proptest::collection::vec(any::<u8>(), 0..256),
        seed_a in any::<u64>(),
        seed_b in any::<u64>(),
    ) {
        let result = ComputationResult::from_serialized(Bytes::from(blob));
        let a = make_content_hash(&result, invoc_from(seed_a), None, false);
        let b = make_content_hash(&result, invoc_from(seed_b), None, true);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn error_and_serialized_cases_never_collide(message in ".{0,64}") {
        let serialized =
            ComputationResult::from_serialized(Bytes::copy_from_slice(message.as_bytes()));
        let error = ComputationResult::from_error(message);
        let invoc = invoc_from(0);
        prop_assert_ne!(
            make_content_hash(&serialized, invoc, None, false),
            make_content_hash(&error, invoc, None, false)
        );
    }

    #[test]
    fn mixers_are_deterministic(chunks in proptest::collection::vec(
        proptest::collection::vec(any::<u8>(), 0..32), 0..8)
    ) {
        let mut a = HashMixer::new();
        let mut b = HashMixer::new();
        for chunk in &chunks {
            a.add_bytes(chunk);
            b.add_bytes(chunk);
        }
        prop_assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn res_identity_is_sensitive_to_every_input(
        name in "[a-z]{1,12}",
        version in 0i32..100,
        args in proptest::collection::vec(any::<u64>(), 0..4),
    ) {
        let comp = CompHash(make_algo_hash(&name, version));
        let args: Vec<ResHash> = args.iter().map(|seed| {
            let mut mixer = HashMixer::new();
            mixer.add_u64(*seed);
            ResHash(mixer.finish())
        }).collect();

        let base = make_res_hash(comp, &args);
        // changing the computation changes the resource
        let other_comp = CompHash(make_algo_hash(&name, version + 1));
        prop_assert_ne!(base, make_res_hash(other_comp, &args));
        // appending an argument changes the resource
        let mut extended = args.clone();
        extended.push(ResHash(make_algo_hash("extra", 0)));
        prop_assert_ne!(base, make_res_hash(comp, &extended));
    }

    #[test]
    fn invoc_identity_tracks_argument_content(
        seeds in proptest::collection::vec(any::<u64>(), 1..4),
    ) {
        let comp = CompHash(make_algo_hash("f", 1));
        let contents: Vec<_> = seeds.iter().map(|seed| {
            let mut mixer = HashMixer::new();
            mixer.add_u64(*seed);
            resin_core::ContentHash(mixer.finish())
        }).collect();

        let base = make_invoc_hash(comp, &contents);
        let mut changed = contents.clone();
        let mut mixer = HashMixer::new();
        mixer.add_u64(seeds[0].wrapping_add(1));
        changed[0] = resin_core::ContentHash(mixer.finish());
        prop_assert_ne!(base, make_invoc_hash(comp, &changed));
    }
}
