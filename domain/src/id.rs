//! Document id allocation for stores that do not generate ids themselves.

use crate::base62::encode_u64;
use crate::DocumentId;

/// Maps a monotonically increasing counter value to a Base62 document id,
/// left-padded with '0' to `min_width`.
#[derive(Clone, Copy, Debug)]
pub struct Base62IdGenerator {
    min_width: usize,
}

impl Base62IdGenerator {
    pub fn new(min_width: usize) -> Self {
        Self { min_width }
    }

    pub fn id_for(&self, counter: u64) -> DocumentId {
        let encoded = encode_u64(counter);
        let padded = format!("{:0>width$}", encoded, width = self.min_width);
        // base62 output is never empty and contains no '/'
        DocumentId(padded)
    }
}

impl Default for Base62IdGenerator {
    fn default() -> Self {
        Self::new(8)
    }
}
