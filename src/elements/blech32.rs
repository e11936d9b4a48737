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

//! Blech32(m): the Elements variant of bech32 used by confidential segwit
//! addresses. It shares the bech32 character set but computes a 12-symbol
//! checksum over a 64-bit polymod, which is what allows the 33-byte
//! blinding key to ride along with the witness program.

const CHARSET: &[u8] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

const GENERATOR: [u64; 5] = [
    0x7D_52FB_A40B_D886,
    0x5E_8DBF_1A03_950C,
    0x1C_3A3C_7407_2A18,
    0x38_5D72_FA0E_5139,
    0x70_93E5_A608_865B,
];

const BLECH32_CONST: u64 = 1;
const BLECH32M_CONST: u64 = 0x455972A3350F7A1;

/// Checksum variant, selected by the witness version like in BIP-350
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Variant {
    Blech32,
    Blech32m,
}

impl Variant {
    fn constant(self) -> u64 {
        match self {
            Variant::Blech32 => BLECH32_CONST,
            Variant::Blech32m => BLECH32M_CONST,
        }
    }
}

/// Blech32 coding errors
#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum Error {
    /// string contains no '1' separator
    MissingSeparator,

    /// invalid character '{0}' in the data part
    InvalidCharacter(char),

    /// blech32 checksum verification failed
    InvalidChecksum,

    /// invalid data padding
    InvalidPadding,

    /// mixed-case strings are not allowed
    MixedCase,
}

fn polymod(values: impl Iterator<Item = u8>) -> u64 {
    let mut chk: u64 = 1;
    for value in values {
        let top = chk >> 55;
        chk = ((chk & 0x7F_FFFF_FFFF_FFFF) << 5) ^ value as u64;
        for (i, generator) in GENERATOR.iter().enumerate() {
            if (top >> i) & 1 != 0 {
                chk ^= generator;
            }
        }
    }
    chk
}

fn hrp_expand(hrp: &str) -> Vec<u8> {
    let mut result: Vec<u8> = hrp.bytes().map(|b| b >> 5).collect();
    result.push(0);
    result.extend(hrp.bytes().map(|b| b & 31));
    result
}

/// General power-of-two base conversion for 8 <-> 5 bit groups
pub fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Result<Vec<u8>, Error> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let maxv = (1 << to) - 1;
    let mut result = vec![];
    for value in data {
        if (*value as u32) >> from != 0 {
            return Err(Error::InvalidPadding);
        }
        acc = (acc << from) | *value as u32;
        bits += from;
        while bits >= to {
            bits -= to;
            result.push(((acc >> bits) & maxv) as u8);
        }
    }
    if pad {
        if bits > 0 {
            result.push(((acc << (to - bits)) & maxv) as u8);
        }
    } else if bits >= from || ((acc << (to - bits)) & maxv) != 0 {
        return Err(Error::InvalidPadding);
    }
    Ok(result)
}

/// Encodes a witness version and program (blinding key || program for
/// confidential addresses)
pub fn encode(hrp: &str, witness_version: u8, program: &[u8], variant: Variant) -> String {
    let mut data = vec![witness_version];
    data.extend(convert_bits(program, 8, 5, true).expect("8->5 always succeeds"));
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(&data);
    values.extend_from_slice(&[0u8; 12]);
    let checksum = polymod(values.into_iter()) ^ variant.constant();
    let mut result = String::with_capacity(hrp.len() + 1 + data.len() + 12);
    result.push_str(hrp);
    result.push('1');
    for value in &data {
        result.push(CHARSET[*value as usize] as char);
    }
    for i in 0..12 {
        result.push(CHARSET[((checksum >> (5 * (11 - i))) & 31) as usize] as char);
    }
    result
}

/// Decodes a blech32(m) string into `(hrp, witness version, program,
/// variant)`
pub fn decode(address: &str) -> Result<(String, u8, Vec<u8>, Variant), Error> {
    if address.to_lowercase() != address && address.to_uppercase() != address {
        return Err(Error::MixedCase);
    }
    let address = address.to_lowercase();
    let separator = address.rfind('1').ok_or(Error::MissingSeparator)?;
    let (hrp, data_part) = address.split_at(separator);
    let data_part = &data_part[1..];
    if data_part.len() < 13 {
        return Err(Error::InvalidChecksum);
    }
    let mut data = vec![];
    for c in data_part.chars() {
        let value = CHARSET
            .iter()
            .position(|ch| *ch as char == c)
            .ok_or(Error::InvalidCharacter(c))?;
        data.push(value as u8);
    }
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(&data);
    let variant = match polymod(values.into_iter()) {
        BLECH32_CONST => Variant::Blech32,
        BLECH32M_CONST => Variant::Blech32m,
        _ => return Err(Error::InvalidChecksum),
    };
    let payload = &data[..data.len() - 12];
    if payload.is_empty() {
        return Err(Error::InvalidChecksum);
    }
    let witness_version = payload[0];
    let program = convert_bits(&payload[1..], 5, 8, false)?;
    Ok((hrp.to_string(), witness_version, program, variant))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        // 33-byte blinding key + 20-byte program, the confidential p2wpkh
        // shape
        let mut program = vec![0x02];
        program.extend_from_slice(&[0xAB; 32]);
        program.extend_from_slice(&[0xCD; 20]);
        for &variant in &[Variant::Blech32, Variant::Blech32m] {
            let encoded = encode("el", 0, &program, variant);
            assert!(encoded.starts_with("el1"));
            let (hrp, version, decoded, got_variant) = decode(&encoded).unwrap();
            assert_eq!(hrp, "el");
            assert_eq!(version, 0);
            assert_eq!(decoded, program);
            assert_eq!(got_variant, variant);
        }
    }

    #[test]
    fn checksum_detects_corruption() {
        let program = vec![0x11; 53];
        let encoded = encode("lq", 0, &program, Variant::Blech32);
        let mut corrupted = encoded.clone();
        let last = corrupted.pop().unwrap();
        corrupted.push(if last == 'q' { 'p' } else { 'q' });
        assert!(matches!(
            decode(&corrupted),
            Err(Error::InvalidChecksum) | Err(Error::InvalidPadding)
        ));
    }

    #[test]
    fn mixed_case_rejected() {
        let program = vec![0x11; 53];
        let encoded = encode("el", 0, &program, Variant::Blech32);
        let mixed: String = encoded
            .chars()
            .enumerate()
            .map(|(i, c)| if i % 2 == 0 { c.to_ascii_uppercase() } else { c })
            .collect();
        assert_eq!(decode(&mixed), Err(Error::MixedCase));
    }
}
