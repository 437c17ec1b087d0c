// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub const DEFAULT_SEED: u64 = 0;

/// Independent random streams derived from one run seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RngStream {
    /// k-means++ seeding for the given restart index.
    KMeansRestart(usize),
    SilhouetteSubsample,
}

impl RngStream {
    fn id(self) -> u64 {
        match self {
            Self::KMeansRestart(restart) => 0x6b6d_0000_u64.wrapping_add(restart as u64),
            Self::SilhouetteSubsample => 0x7369_6c68,
        }
    }
}

/// Deterministic generator for `seed` on a dedicated stream. Never touches global RNG state.
pub fn seeded_rng(seed: u64, stream: RngStream) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream.id());
    rng
}
