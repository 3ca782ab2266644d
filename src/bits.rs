//! Information bits and their I/Q symbol streams

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Ordered sequence of information bits, each 0 or 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitSequence(Vec<u8>);

impl BitSequence {
    pub fn from_values(values: Vec<u8>) -> Result<Self> {
        if let Some(pos) = values.iter().position(|&b| b > 1) {
            return Err(EngineError::invalid(format!(
                "bit {pos} has value {}, expected 0 or 1",
                values[pos]
            )));
        }
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Corner points of the bit staircase: every bit spans `[i, i + 1)` and
    /// an extra point closes each level before a transition and at the end.
    pub fn step_points(&self) -> (Vec<f64>, Vec<f64>) {
        let bits = &self.0;
        let mut x = Vec::with_capacity(bits.len() * 2);
        let mut y = Vec::with_capacity(bits.len() * 2);

        for (i, &bit) in bits.iter().enumerate() {
            x.push(i as f64);
            y.push(bit as f64);
            let closes_level = match bits.get(i + 1) {
                Some(&next) => next != bit,
                None => true,
            };
            if closes_level {
                x.push((i + 1) as f64);
                y.push(bit as f64);
            }
        }

        (x, y)
    }
}

/// Draw `count` independent uniform bits.
pub fn generate_bits<R: Rng + ?Sized>(count: usize, rng: &mut R) -> BitSequence {
    BitSequence((0..count).map(|_| rng.gen_range(0..=1u8)).collect())
}

/// In-phase and quadrature symbol streams, always of equal length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IqStreams {
    pub i: Vec<u8>,
    pub q: Vec<u8>,
}

impl IqStreams {
    pub fn len(&self) -> usize {
        self.i.len()
    }

    pub fn is_empty(&self) -> bool {
        self.i.is_empty()
    }
}

/// Demultiplex bits into I/Q by index parity.
///
/// An odd-length input is padded with a trailing 0. Every bit routed to a
/// stream is written twice, so one information bit occupies two channel
/// symbols and each stream ends up as long as the padded input.
pub fn map_to_iq(bits: &BitSequence) -> IqStreams {
    let mut padded = bits.0.clone();
    if padded.len() % 2 == 1 {
        padded.push(0);
    }

    let mut i = Vec::with_capacity(padded.len());
    let mut q = Vec::with_capacity(padded.len());
    for pair in padded.chunks_exact(2) {
        i.extend_from_slice(&[pair[0], pair[0]]);
        q.extend_from_slice(&[pair[1], pair[1]]);
    }

    IqStreams { i, q }
}
