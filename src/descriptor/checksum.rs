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

//! The 8-character descriptor checksum of Bitcoin Core: a BCH code over
//! GF(32) computed from the descriptor text, appended after a `#`.

/// Characters a descriptor may consist of, in the order defining their
/// checksum symbol values
const INPUT_CHARSET: &str =
    "0123456789()[],'/*abcdefgh@:$%{}IJKLMNOPQRSTUVWXYZ&+-.;<=>?!^_|~ijklmnopqrstuvwxyzABCDEFGH`#\"\\ ";

/// Checksum output alphabet (the bech32 character set)
const CHECKSUM_CHARSET: &[u8] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum Error {
    /// descriptor contains character '{0}' outside of the allowed set
    InvalidCharacter(char),

    /// descriptor checksum must be 8 characters long
    InvalidChecksumLength,

    /// descriptor checksum does not match its body
    ChecksumMismatch,
}

fn polymod_step(mut checksum: u64, value: u64) -> u64 {
    let top = checksum >> 35;
    checksum = ((checksum & 0x7_FFFF_FFFF) << 5) ^ value;
    for (bit, generator) in [
        0xF5_DEE5_1989u64,
        0xA9_FDCA_3312,
        0x1B_AB10_E32D,
        0x37_06B1_677A,
        0x64_4D62_6FFD,
    ]
    .iter()
    .enumerate()
    {
        if (top >> bit) & 1 != 0 {
            checksum ^= generator;
        }
    }
    checksum
}

/// Computes the 8-character checksum of a descriptor body (text without
/// the `#` suffix)
pub fn checksum(descriptor: &str) -> Result<String, Error> {
    let mut c: u64 = 1;
    let mut cls: u64 = 0;
    let mut cls_count = 0;
    for ch in descriptor.chars() {
        let pos = INPUT_CHARSET
            .find(ch)
            .ok_or(Error::InvalidCharacter(ch))? as u64;
        c = polymod_step(c, pos & 31);
        cls = cls * 3 + (pos >> 5);
        cls_count += 1;
        if cls_count == 3 {
            c = polymod_step(c, cls);
            cls = 0;
            cls_count = 0;
        }
    }
    if cls_count > 0 {
        c = polymod_step(c, cls);
    }
    for _ in 0..8 {
        c = polymod_step(c, 0);
    }
    c ^= 1;

    let mut result = String::with_capacity(8);
    for i in 0..8 {
        result.push(CHECKSUM_CHARSET[((c >> (5 * (7 - i))) & 31) as usize] as char);
    }
    Ok(result)
}

/// Splits a descriptor string into its body and verifies the checksum if
/// one is present; returns the body
pub fn verify(descriptor: &str) -> Result<&str, Error> {
    match descriptor.rfind('#') {
        None => Ok(descriptor),
        Some(pos) => {
            let (body, check) = descriptor.split_at(pos);
            let check = &check[1..];
            if check.len() != 8 {
                return Err(Error::InvalidChecksumLength);
            }
            if checksum(body)? != check {
                return Err(Error::ChecksumMismatch);
            }
            Ok(body)
        }
    }
}

/// Appends the checksum to a descriptor body
pub fn append(descriptor: &str) -> Result<String, Error> {
    Ok(format!("{}#{}", descriptor, checksum(descriptor)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_reference_checksums() {
        // vectors from the Bitcoin Core descriptor test set
        assert_eq!(
            checksum("addr(mkmZxiEcEd8ZqjQWVZuC6so5dFMKEFpN2j)").unwrap(),
            "02wpgw69"
        );
        assert_eq!(
            checksum("wpkh(tprv8ZgxMBicQKsPd7Uf69XL1XwhmjHopUGep8GuEiJDZmbQz6o58LninorQAfcKZWARbtRtfnLcJ5MQ2AtHcQJCCRUcMRvmDUjyEmNUWwx8UbK/1/2/*)").unwrap(),
            "vuyep999"
        );
        assert_eq!(
            checksum("pkh([d34db33f/44'/0'/0']xpub6ERApfZwUNrhLCkDtcHTcxd75RbzS1ed54G1LkBUBQVHcxy7hbZSj4ikWvLvyhCi3NXmiDcdxyWNso8ONNdxvTiwuwyNHOH3KZ2gN2cQAVE/1/*)").unwrap(),
            "zgael94a"
        );
    }

    #[test]
    fn verify_and_append() {
        let body = "addr(mkmZxiEcEd8ZqjQWVZuC6so5dFMKEFpN2j)";
        let full = append(body).unwrap();
        assert_eq!(full, format!("{}#02wpgw69", body));
        assert_eq!(verify(&full).unwrap(), body);
        assert_eq!(verify(body).unwrap(), body);
        assert_eq!(
            verify("addr(mkmZxiEcEd8ZqjQWVZuC6so5dFMKEFpN2j)#02wpgw68"),
            Err(Error::ChecksumMismatch)
        );
        assert_eq!(
            verify("addr(x)#short"),
            Err(Error::InvalidChecksumLength)
        );
    }
}
