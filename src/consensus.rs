// Bitcoin & Elements wallet-level library implementing HD key derivation,
// output descriptors, transaction signing & PSBT processing
// Written in 2020 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the MIT License
// along with this software.
// If not, see <https://opensource.org/licenses/MIT>.

//! Bitcoin consensus binary encoding: the strict serialization rules used by
//! transactions, PSBT containers and extended keys. All integers are
//! little-endian; variable-length data is prefixed with a [`VarInt`]
//! (CompactSize). Decoding is strict: non-minimal CompactSize encodings and
//! trailing bytes are rejected.

use amplify::IoError;
use std::io;
use std::io::Read as _;

/// Binary encoding of consensus-critical data structures with the given
/// [`io::Write`] instance; returns the number of bytes written.
pub trait ConsensusEncode {
    fn consensus_encode<E: io::Write>(&self, e: E) -> Result<usize, Error>;

    /// Serializes data as a byte vector using
    /// [`ConsensusEncode::consensus_encode`]
    fn consensus_serialize(&self) -> Vec<u8> {
        let mut encoder = vec![];
        self.consensus_encode(&mut encoder)
            .expect("in-memory encoders do not fail");
        encoder
    }
}

/// Binary decoding of consensus-critical data structures from the given
/// [`io::Read`] instance.
pub trait ConsensusDecode: Sized {
    fn consensus_decode<D: io::Read>(d: D) -> Result<Self, Error>;

    /// Deserializes a byte sequence, requiring that all provided data are
    /// consumed by the decoding procedure
    fn consensus_deserialize(data: impl AsRef<[u8]>) -> Result<Self, Error> {
        let mut decoder = io::Cursor::new(data.as_ref());
        let rv = Self::consensus_decode(&mut decoder)?;
        if decoder.position() as usize != data.as_ref().len() {
            return Err(Error::DataNotEntirelyConsumed);
        }
        Ok(rv)
    }
}

/// Errors during consensus encoding and decoding process
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, From, Error)]
#[display(doc_comments)]
pub enum Error {
    /// I/O error during consensus encoding/decoding: {0}
    #[from(io::Error)]
    #[from(io::ErrorKind)]
    Io(IoError),

    /// CompactSize integer is not encoded with the minimal number of bytes
    NonMinimalVarInt,

    /// unexpected end of data
    UnexpectedEof,

    /// decoded data do not form a valid consensus structure: {0}
    DataIntegrityError(String),

    /// data were not consumed entirely during decoding procedure
    DataNotEntirelyConsumed,

    /// collection has {0} items exceeding the allowed maximum
    OversizedCollection(usize),
}

/// Reads exactly `len` bytes from the stream
pub fn read_bytes<D: io::Read>(mut d: D, len: usize) -> Result<Vec<u8>, Error> {
    // cap pre-allocation so that a forged length prefix can't OOM us
    let mut buf = Vec::with_capacity(len.min(0x1_0000));
    let read = d
        .by_ref()
        .take(len as u64)
        .read_to_end(&mut buf)
        .map_err(Error::from)?;
    if read != len {
        return Err(Error::UnexpectedEof);
    }
    Ok(buf)
}

/// Reads a fixed-size byte array from the stream
pub fn read_array<D: io::Read, const LEN: usize>(
    mut d: D,
) -> Result<[u8; LEN], Error> {
    let mut buf = [0u8; LEN];
    d.read_exact(&mut buf)?;
    Ok(buf)
}

#[macro_export]
macro_rules! consensus_encode_list {
    ( $encoder:ident; $($item:expr),+ ) => {
        {
            let mut len = 0usize;
            $(
                len += $item.consensus_encode(&mut $encoder)?;
            )+
            len
        }
    }
}

/// CompactSize variable-length integer used by all length prefixes of the
/// Bitcoin wire format
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, From)]
#[display(inner)]
pub struct VarInt(pub u64);

impl VarInt {
    /// Number of bytes the integer occupies when serialized
    pub fn len(self) -> usize {
        match self.0 {
            0..=0xFC => 1,
            0xFD..=0xFFFF => 3,
            0x1_0000..=0xFFFF_FFFF => 5,
            _ => 9,
        }
    }
}

impl From<usize> for VarInt {
    fn from(n: usize) -> Self {
        VarInt(n as u64)
    }
}

impl ConsensusEncode for VarInt {
    fn consensus_encode<E: io::Write>(&self, mut e: E) -> Result<usize, Error> {
        match self.0 {
            0..=0xFC => {
                e.write_all(&[self.0 as u8])?;
                Ok(1)
            }
            0xFD..=0xFFFF => {
                e.write_all(&[0xFD])?;
                e.write_all(&(self.0 as u16).to_le_bytes())?;
                Ok(3)
            }
            0x1_0000..=0xFFFF_FFFF => {
                e.write_all(&[0xFE])?;
                e.write_all(&(self.0 as u32).to_le_bytes())?;
                Ok(5)
            }
            _ => {
                e.write_all(&[0xFF])?;
                e.write_all(&self.0.to_le_bytes())?;
                Ok(9)
            }
        }
    }
}

impl ConsensusDecode for VarInt {
    fn consensus_decode<D: io::Read>(mut d: D) -> Result<Self, Error> {
        let mut first = [0u8; 1];
        d.read_exact(&mut first)?;
        let value = match first[0] {
            0xFD => {
                let n = u16::from_le_bytes(read_array(&mut d)?) as u64;
                if n < 0xFD {
                    return Err(Error::NonMinimalVarInt);
                }
                n
            }
            0xFE => {
                let n = u32::from_le_bytes(read_array(&mut d)?) as u64;
                if n <= 0xFFFF {
                    return Err(Error::NonMinimalVarInt);
                }
                n
            }
            0xFF => {
                let n = u64::from_le_bytes(read_array(&mut d)?);
                if n <= 0xFFFF_FFFF {
                    return Err(Error::NonMinimalVarInt);
                }
                n
            }
            small => small as u64,
        };
        Ok(VarInt(value))
    }
}

macro_rules! impl_int_encoding {
    ($ty:ty) => {
        impl ConsensusEncode for $ty {
            #[inline]
            fn consensus_encode<E: io::Write>(
                &self,
                mut e: E,
            ) -> Result<usize, Error> {
                e.write_all(&self.to_le_bytes())?;
                Ok(::core::mem::size_of::<$ty>())
            }
        }

        impl ConsensusDecode for $ty {
            #[inline]
            fn consensus_decode<D: io::Read>(d: D) -> Result<Self, Error> {
                Ok(<$ty>::from_le_bytes(read_array(d)?))
            }
        }
    };
}

impl_int_encoding!(u8);
impl_int_encoding!(u16);
impl_int_encoding!(u32);
impl_int_encoding!(u64);
impl_int_encoding!(i32);
impl_int_encoding!(i64);

macro_rules! impl_array_encoding {
    ($len:literal) => {
        impl ConsensusEncode for [u8; $len] {
            #[inline]
            fn consensus_encode<E: io::Write>(
                &self,
                mut e: E,
            ) -> Result<usize, Error> {
                e.write_all(&self[..])?;
                Ok($len)
            }
        }

        impl ConsensusDecode for [u8; $len] {
            #[inline]
            fn consensus_decode<D: io::Read>(d: D) -> Result<Self, Error> {
                read_array(d)
            }
        }
    };
}

impl_array_encoding!(4);
impl_array_encoding!(32);
impl_array_encoding!(33);

/// Byte vectors are serialized with a CompactSize length prefix
impl ConsensusEncode for Vec<u8> {
    fn consensus_encode<E: io::Write>(&self, mut e: E) -> Result<usize, Error> {
        let len = VarInt::from(self.len()).consensus_encode(&mut e)?;
        e.write_all(self)?;
        Ok(len + self.len())
    }
}

impl ConsensusDecode for Vec<u8> {
    fn consensus_decode<D: io::Read>(mut d: D) -> Result<Self, Error> {
        let len = VarInt::consensus_decode(&mut d)?.0;
        read_bytes(d, len as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_roundtrip() {
        for &(n, len) in &[
            (0u64, 1usize),
            (0xFC, 1),
            (0xFD, 3),
            (0xFFFF, 3),
            (0x1_0000, 5),
            (0xFFFF_FFFF, 5),
            (0x1_0000_0000, 9),
        ] {
            let data = VarInt(n).consensus_serialize();
            assert_eq!(data.len(), len);
            assert_eq!(VarInt(n).len(), len);
            assert_eq!(VarInt::consensus_deserialize(&data).unwrap(), VarInt(n));
        }
    }

    #[test]
    fn varint_rejects_non_minimal() {
        // 0xFC encoded with a 0xFD prefix
        assert_eq!(
            VarInt::consensus_deserialize(&[0xFD, 0xFC, 0x00]),
            Err(Error::NonMinimalVarInt)
        );
        assert_eq!(
            VarInt::consensus_deserialize(&[0xFE, 0xFF, 0xFF, 0x00, 0x00]),
            Err(Error::NonMinimalVarInt)
        );
    }

    #[test]
    fn trailing_bytes_rejected() {
        assert_eq!(
            u16::consensus_deserialize(&[0x01, 0x00, 0xAA]),
            Err(Error::DataNotEntirelyConsumed)
        );
    }

    #[test]
    fn int_encoding_is_little_endian() {
        assert_eq!(0xDEAD_BEEFu32.consensus_serialize(), vec![
            0xEF, 0xBE, 0xAD, 0xDE
        ]);
        assert_eq!(1i32.consensus_serialize(), vec![1, 0, 0, 0]);
    }

    #[test]
    fn byte_vector_prefixed() {
        let v = vec![0xAAu8; 3];
        assert_eq!(v.consensus_serialize(), vec![0x03, 0xAA, 0xAA, 0xAA]);
        assert_eq!(Vec::<u8>::consensus_deserialize(&[0x00]).unwrap(), vec![]);
    }
}
