//! Envelope codec: payload bytes in, `Message` out, and the reverse for
//! publishers. Decoding never fails; unrecognized payloads pass through raw.

pub mod decode;
pub mod encode;
