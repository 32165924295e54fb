//! Wire encoding for bus messages

mod codec;

pub use codec::{Decoded, MessageCodec};
