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

//! Base58 and base58check encodings used by legacy addresses, WIF private
//! keys, BIP-32 extended keys and BIP-47 payment codes. The checksum is the
//! first four bytes of `SHA256(SHA256(payload))`.

use crate::hashes::double_sha256;

static ALPHABET: &[u8; 58] =
    b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Errors of base58(check) decoding
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum Error {
    /// character '{0}' is not a part of the base58 alphabet
    InvalidCharacter(char),

    /// base58check data are too short to contain a checksum
    TooShort,

    /// base58check checksum does not match the payload
    InvalidChecksum,
}

/// Encodes binary data as a base58 string
pub fn encode(data: &[u8]) -> String {
    // leading zero bytes map to '1' characters one-to-one
    let zeroes = data.iter().take_while(|b| **b == 0).count();
    let mut digits: Vec<u8> = vec![];
    for b in &data[zeroes..] {
        let mut carry = *b as u32;
        for digit in digits.iter_mut() {
            carry += (*digit as u32) << 8;
            *digit = (carry % 58) as u8;
            carry /= 58;
        }
        while carry > 0 {
            digits.push((carry % 58) as u8);
            carry /= 58;
        }
    }
    let mut result = String::with_capacity(zeroes + digits.len());
    for _ in 0..zeroes {
        result.push('1');
    }
    for digit in digits.iter().rev() {
        result.push(ALPHABET[*digit as usize] as char);
    }
    result
}

/// Decodes a base58 string into binary data, rejecting any characters
/// outside of the alphabet
pub fn decode(s: &str) -> Result<Vec<u8>, Error> {
    let mut result: Vec<u8> = vec![];
    for c in s.chars() {
        let idx = ALPHABET
            .iter()
            .position(|a| *a as char == c)
            .ok_or(Error::InvalidCharacter(c))? as u32;
        let mut carry = idx;
        for byte in result.iter_mut() {
            carry += *byte as u32 * 58;
            *byte = (carry & 0xFF) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            result.push((carry & 0xFF) as u8);
            carry >>= 8;
        }
    }
    let zeroes = s.chars().take_while(|c| *c == '1').count();
    result.extend(core::iter::repeat(0).take(zeroes));
    result.reverse();
    Ok(result)
}

/// Encodes data together with its 4-byte double-SHA256 checksum
pub fn encode_check(data: &[u8]) -> String {
    let mut payload = data.to_vec();
    payload.extend_from_slice(&double_sha256(data)[..4]);
    encode(&payload)
}

/// Decodes a base58check string, verifying and stripping the checksum
pub fn decode_check(s: &str) -> Result<Vec<u8>, Error> {
    let mut data = decode(s)?;
    if data.len() < 4 {
        return Err(Error::TooShort);
    }
    let split = data.len() - 4;
    let checksum = data.split_off(split);
    if double_sha256(&data)[..4] != checksum[..] {
        return Err(Error::InvalidChecksum);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        // vectors from the Bitcoin Core base58 test set
        assert_eq!(encode(b""), "");
        assert_eq!(encode(&hex::decode("61").unwrap()), "2g");
        assert_eq!(encode(&hex::decode("626262").unwrap()), "a3gV");
        assert_eq!(encode(&hex::decode("636363").unwrap()), "aPEr");
        assert_eq!(
            encode(&hex::decode("73696d706c792061206c6f6e6720737472696e67").unwrap()),
            "2cFupjhnEsSn59qHXstmK2ffpLv2"
        );
        assert_eq!(
            encode(&hex::decode("00eb15231dfceb60925886b67d065299925915aeb172c06647").unwrap()),
            "1NS17iag9jJgTHD1VXjvLCEnZuQ3rJDE9L"
        );
        assert_eq!(encode(&hex::decode("10c8511e").unwrap()), "Rt5zm");
        assert_eq!(
            encode(&hex::decode("00000000000000000000").unwrap()),
            "1111111111"
        );
    }

    #[test]
    fn decode_inverts_encode() {
        for data in &[
            vec![],
            vec![0u8; 5],
            vec![0x00, 0x01, 0x02, 0xFF],
            (0u8..=255).collect::<Vec<_>>(),
        ] {
            assert_eq!(&decode(&encode(data)).unwrap(), data);
        }
    }

    #[test]
    fn rejects_bad_alphabet() {
        assert_eq!(decode("0"), Err(Error::InvalidCharacter('0')));
        assert_eq!(decode("I"), Err(Error::InvalidCharacter('I')));
        assert_eq!(decode("O"), Err(Error::InvalidCharacter('O')));
        assert_eq!(decode("l"), Err(Error::InvalidCharacter('l')));
    }

    #[test]
    fn check_roundtrip_and_corruption() {
        let data = hex::decode("00f54a5851e9372b87810a8e60cdd2e7cfd80b6e31").unwrap();
        let addr = encode_check(&data);
        assert_eq!(addr, "1PMycacnJaSqwwJqjawXBErnLsZ7RkXUAs");
        assert_eq!(decode_check(&addr).unwrap(), data);

        // flip one character
        let corrupt = addr.replace('P', "Q");
        assert_eq!(decode_check(&corrupt), Err(Error::InvalidChecksum));
        assert_eq!(decode_check("1111"), Err(Error::InvalidChecksum));
        assert_eq!(decode_check("11"), Err(Error::TooShort));
    }
}
