//! Multiformats varints shared by the CID and CAR decoders.

pub mod varint;
