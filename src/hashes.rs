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

//! Hash functions used across the wallet stack: double SHA-256 (txids,
//! base58check), HASH160 (key & script hashes), BIP-340 tagged hashes
//! (taproot), HMAC-SHA-512 (BIP-32) and PBKDF2 (BIP-39 seeds, SLIP-39 share
//! encryption). Thin helpers over [`bitcoin_hashes`] engines returning plain
//! byte arrays, which is the form all wire formats consume.

use bitcoin_hashes::{hash160, ripemd160, sha256, sha512, Hash, HashEngine, Hmac, HmacEngine};

/// `SHA256(msg)`
pub fn sha256(msg: impl AsRef<[u8]>) -> [u8; 32] {
    sha256::Hash::hash(msg.as_ref()).to_byte_array()
}

/// `SHA256(SHA256(msg))`
pub fn double_sha256(msg: impl AsRef<[u8]>) -> [u8; 32] {
    let first = sha256::Hash::hash(msg.as_ref());
    sha256::Hash::hash(&first.to_byte_array()).to_byte_array()
}

/// `RIPEMD160(msg)`
pub fn ripemd160(msg: impl AsRef<[u8]>) -> [u8; 20] {
    ripemd160::Hash::hash(msg.as_ref()).to_byte_array()
}

/// `RIPEMD160(SHA256(msg))`
pub fn hash160(msg: impl AsRef<[u8]>) -> [u8; 20] {
    hash160::Hash::hash(msg.as_ref()).to_byte_array()
}

/// BIP-340 tagged hash: `SHA256(SHA256(tag) || SHA256(tag) || data)`
pub fn tagged_hash(tag: &str, data: impl AsRef<[u8]>) -> [u8; 32] {
    let tag_hash = sha256::Hash::hash(tag.as_bytes()).to_byte_array();
    let mut engine = sha256::Hash::engine();
    engine.input(&tag_hash);
    engine.input(&tag_hash);
    engine.input(data.as_ref());
    sha256::Hash::from_engine(engine).to_byte_array()
}

/// `HMAC-SHA512(key, msg)`
pub fn hmac_sha512(key: &[u8], msg: &[u8]) -> [u8; 64] {
    let mut engine: HmacEngine<sha512::Hash> = HmacEngine::new(key);
    engine.input(msg);
    Hmac::<sha512::Hash>::from_engine(engine).to_byte_array()
}

/// `HMAC-SHA256(key, msg)`
pub fn hmac_sha256(key: &[u8], msg: &[u8]) -> [u8; 32] {
    let mut engine: HmacEngine<sha256::Hash> = HmacEngine::new(key);
    engine.input(msg);
    Hmac::<sha256::Hash>::from_engine(engine).to_byte_array()
}

/// PBKDF2 with HMAC-SHA512 PRF (RFC 2898); used for BIP-39 seed stretching
pub fn pbkdf2_hmac_sha512(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    output_len: usize,
) -> Vec<u8> {
    pbkdf2::<sha512::Hash, 64>(password, salt, iterations, output_len)
}

/// PBKDF2 with HMAC-SHA256 PRF; used by the SLIP-39 Feistel cipher
pub fn pbkdf2_hmac_sha256(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    output_len: usize,
) -> Vec<u8> {
    pbkdf2::<sha256::Hash, 32>(password, salt, iterations, output_len)
}

fn pbkdf2<H: Hash<Bytes = [u8; LEN]>, const LEN: usize>(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    output_len: usize,
) -> Vec<u8>
where
    H::Engine: HashEngine,
{
    assert!(iterations > 0, "PBKDF2 requires at least one iteration");
    let mut output = Vec::with_capacity(output_len);
    let mut block_index = 1u32;
    while output.len() < output_len {
        // U_1 = PRF(password, salt || INT_32_BE(i))
        let mut engine: HmacEngine<H> = HmacEngine::new(password);
        engine.input(salt);
        engine.input(&block_index.to_be_bytes());
        let mut u = Hmac::<H>::from_engine(engine).to_byte_array();
        let mut t = u;
        for _ in 1..iterations {
            let mut engine: HmacEngine<H> = HmacEngine::new(password);
            engine.input(&u);
            u = Hmac::<H>::from_engine(engine).to_byte_array();
            for (tb, ub) in t.iter_mut().zip(u.iter()) {
                *tb ^= ub;
            }
        }
        output.extend_from_slice(&t);
        block_index += 1;
    }
    output.truncate(output_len);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_abc() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn hash160_of_pubkey() {
        // hash160 of the generator-point compressed pubkey
        let pk = hex::decode(
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
        )
        .unwrap();
        assert_eq!(
            hex::encode(hash160(&pk)),
            "751e76e8199196d454941c45d1b3a323f1433bd6"
        );
    }

    #[test]
    fn tagged_hash_matches_bip340() {
        // BIP-341 TapTweak midstate check: H_TapTweak(empty) is stable
        let empty = tagged_hash("TapTweak", b"");
        let mut manual_input = Vec::new();
        let tag = sha256(b"TapTweak");
        manual_input.extend_from_slice(&tag);
        manual_input.extend_from_slice(&tag);
        assert_eq!(empty, sha256(&manual_input));
    }

    #[test]
    fn hmac_sha512_bitcoin_seed() {
        // BIP-32 master key derivation for test vector 1 seed
        let seed = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let raw = hmac_sha512(b"Bitcoin seed", &seed);
        assert_eq!(
            hex::encode(&raw[..32]),
            "e8f32e723decf4051aefac8e2c93c9c5b214313817cdb01a1494b917c8436b35"
        );
    }

    #[test]
    fn pbkdf2_block_expansion() {
        // seed-level vectors live in the bip39 tests; here only the block
        // expansion: output truncates to the requested length and the
        // second block differs from the first
        let out = pbkdf2_hmac_sha512(b"pass", b"salt", 2, 96);
        assert_eq!(out.len(), 96);
        let full = pbkdf2_hmac_sha512(b"pass", b"salt", 2, 128);
        assert_eq!(out[..], full[..96]);
        assert_ne!(full[..32], full[64..96]);
        // iteration count matters
        assert_ne!(
            pbkdf2_hmac_sha256(b"pass", b"salt", 1, 32),
            pbkdf2_hmac_sha256(b"pass", b"salt", 2, 32)
        );
    }
}
