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

//! BIP-85 deterministic entropy: derives application secrets (mnemonics,
//! WIF keys, extended keys, raw entropy) from a BIP-32 root along the
//! `m/83696968h/...` application paths.

use crate::bip32::{self, ChainCode, HDKey, XKey, HARDENED_INDEX_BOUNDARY};
use crate::bip39;
use crate::ec::PrivateKey;
use crate::hashes::hmac_sha512;
use crate::networks::MAINNET;

const PURPOSE: u32 = 83696968;

/// BIP-85 errors
#[derive(Clone, PartialEq, Eq, Debug, Display, From, Error)]
#[display(doc_comments)]
pub enum Error {
    /// BIP-85 derivation requires a private master key
    PrivateKeyRequired,

    /// unsupported number of mnemonic words {0}
    InvalidWordCount(usize),

    /// requested entropy length {0} is out of the 16-64 byte range
    InvalidEntropyLength(usize),

    /// derivation error: {0}
    #[from]
    Bip32(bip32::Error),

    /// mnemonic error: {0}
    #[from]
    Bip39(bip39::Error),
}

/// Derives the raw 64 bytes of BIP-85 entropy for an application path.
/// All path elements are hardened; pass ordinal values (the hardened bit
/// is applied here).
pub fn derive_entropy(root: &HDKey, app_path: &[u32]) -> Result<[u8; 64], Error> {
    if !root.is_private() {
        return Err(Error::PrivateKeyRequired);
    }
    let mut key = root.child(PURPOSE | HARDENED_INDEX_BOUNDARY)?;
    for &index in app_path {
        key = key.child(index | HARDENED_INDEX_BOUNDARY)?;
    }
    let secret = key
        .private_key()
        .expect("hardened derivation from a private key stays private")
        .secret();
    Ok(hmac_sha512(b"bip-entropy-from-k", &secret))
}

/// BIP-39 application (39h): a mnemonic of 12, 15, 18, 21 or 24 English
/// words at the given index
pub fn derive_mnemonic(root: &HDKey, num_words: usize, index: u32) -> Result<String, Error> {
    if ![12, 15, 18, 21, 24].contains(&num_words) {
        return Err(Error::InvalidWordCount(num_words));
    }
    // language element 0h selects English
    let entropy = derive_entropy(root, &[39, 0, num_words as u32, index])?;
    let byte_len = num_words * 4 / 3;
    Ok(bip39::mnemonic_from_bytes(&entropy[..byte_len])?)
}

/// WIF application (2h): a compressed private key
pub fn derive_wif(root: &HDKey, index: u32) -> Result<PrivateKey, Error> {
    let entropy = derive_entropy(root, &[2, index])?;
    let mut secret = [0u8; 32];
    secret.copy_from_slice(&entropy[..32]);
    Ok(PrivateKey::new(secret, true).map_err(bip32::Error::from)?)
}

/// XPRV application (32h): a master extended key with the entropy split
/// into chain code and key material
pub fn derive_xprv(root: &HDKey, index: u32) -> Result<HDKey, Error> {
    let entropy = derive_entropy(root, &[32, index])?;
    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(&entropy[..32]);
    let key = PrivateKey::parse(&entropy[32..]).map_err(bip32::Error::from)?;
    Ok(HDKey::with(
        XKey::Private(key),
        ChainCode::from(chain_code),
        MAINNET.xprv,
        0,
        [0u8; 4],
        0,
    )?)
}

/// HEX application (128169h): 16-64 bytes of raw entropy
pub fn derive_hex(root: &HDKey, num_bytes: usize, index: u32) -> Result<Vec<u8>, Error> {
    if !(16..=64).contains(&num_bytes) {
        return Err(Error::InvalidEntropyLength(num_bytes));
    }
    let entropy = derive_entropy(root, &[128169, num_bytes as u32, index])?;
    Ok(entropy[..num_bytes].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::str::FromStr;
    use crate::networks::MAINNET;

    fn root() -> HDKey {
        HDKey::from_str(
            "xprv9s21ZrQH143K2LBWUUQRFXhucrQqBpKdRRxNVq2zBqsx8HVqFk2uYo8kmbaLLHRdqtQpUm98uKfu3vca1LqdGhUtyoFnCNkfmXRyPXLjbKb",
        )
        .unwrap()
    }

    #[test]
    fn mnemonic_vectors() {
        let root = root();
        assert_eq!(
            derive_mnemonic(&root, 12, 0).unwrap(),
            "girl mad pet galaxy egg matter matrix prison refuse sense ordinary nose"
        );
        assert_eq!(
            derive_mnemonic(&root, 18, 0).unwrap(),
            "near account window bike charge season chef number sketch tomorrow excuse \
             sniff circle vital hockey outdoor supply token"
        );
        assert_eq!(
            derive_mnemonic(&root, 24, 0).unwrap(),
            "puppy ocean match cereal symbol another shed magic wrap hammer bulb intact \
             gadget divorce twin tonight reason outdoor destroy simple truth cigar social volcano"
        );
        assert_eq!(derive_mnemonic(&root, 13, 0), Err(Error::InvalidWordCount(13)));
    }

    #[test]
    fn wif_vector() {
        assert_eq!(
            derive_wif(&root(), 0).unwrap().wif(&MAINNET),
            "Kzyv4uF39d4Jrw2W7UryTHwZr1zQVNk4dAFyqE6BuMrMh1Za7uhp"
        );
    }

    #[test]
    fn xprv_vector() {
        assert_eq!(
            derive_xprv(&root(), 0).unwrap().to_string(),
            "xprv9s21ZrQH143K2srSbCSg4m4kLvPMzcWydgmKEnMmoZUurYuBuYG46c6P71UGXMzmriLzCCBvKQWBUv3vPB3m1SATMhp3uEjXHJ42jFg7myX"
        );
    }

    #[test]
    fn hex_vector() {
        assert_eq!(
            hex::encode(derive_hex(&root(), 64, 0).unwrap()),
            "492db4698cf3b73a5a24998aa3e9d7fa96275d85724a91e71aa2d645442f878555d078fd\
             1f1f67e368976f04137b1f7a0d19232136ca50c44614af72b5582a5c"
        );
        assert!(derive_hex(&root(), 8, 0).is_err());
        assert!(derive_hex(&root(), 65, 0).is_err());
    }

    #[test]
    fn public_root_rejected() {
        let xpub = root().to_public().unwrap();
        assert_eq!(derive_entropy(&xpub, &[39]), Err(Error::PrivateKeyRequired));
    }
}
