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

//! BIP-32 hierarchical deterministic keys: extended private & public keys,
//! seed-based master key generation, child derivation, textual derivation
//! paths and SLIP-132 version-byte handling.
//!
//! Note on endianness: child indices are serialized big-endian inside
//! base58 extended keys, but little-endian inside PSBT derivation fields
//! ([`crate::psbt::PsbtDerivation`]). The two layers must not be mixed.

use core::fmt::{self, Display, Formatter};
use core::hash::{Hash, Hasher};
use core::str::FromStr;
use std::io;

use zeroize::Zeroize;

use crate::base58;
use crate::ec::{self, PrivateKey, PublicKey, SchnorrSig, Signature};
use crate::hashes::{hash160, hmac_sha512};
use crate::networks::{self, KeyApplication, Network, MAINNET, TESTNET};

/// Constant determining the BIP-32 boundary for u32 values after which an
/// index is treated as hardened
pub const HARDENED_INDEX_BOUNDARY: u32 = 1 << 31;

/// BIP-32 errors
#[derive(Clone, PartialEq, Eq, Debug, Display, From, Error)]
#[display(doc_comments)]
pub enum Error {
    /// extended key data must be exactly 78 bytes, not {0}
    InvalidKeyLength(usize),

    /// unknown extended key version bytes {0:02x?}
    UnknownVersion([u8; 4]),

    /// extended key version bytes do not match the key privacy
    VersionPrivacyMismatch,

    /// hardened derivation requires the private key
    HardenedDerivationFromPublic,

    /// the derived child key is invalid; retry with the next index
    DerivationFailure,

    /// maximum derivation depth of 255 is reached
    DepthOverflow,

    /// invalid derivation path element '{0}'
    InvalidPathElement(String),

    /// this extended key is already public
    AlreadyPublic,

    /// public extended keys can not sign
    PublicKeyCantSign,

    /// EC error: {0}
    #[from]
    Ec(ec::Error),

    /// base58 error: {0}
    #[from]
    Base58(base58::Error),
}

/// Chain code of an extended key; wiped from memory on drop
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ChainCode(pub(crate) [u8; 32]);

impl ChainCode {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for ChainCode {
    fn from(data: [u8; 32]) -> Self {
        ChainCode(data)
    }
}

impl Drop for ChainCode {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Key material of an extended key: either a private scalar or a public
/// point
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum XKey {
    Private(PrivateKey),
    Public(PublicKey),
}

/// Extended private or public key
#[derive(Clone, Debug)]
pub struct HDKey {
    pub key: XKey,
    pub chain_code: ChainCode,
    pub depth: u8,
    /// Fingerprint of the parent key (`00000000` for master keys)
    pub fingerprint: [u8; 4],
    pub child_number: u32,
    pub version: [u8; 4],
}

impl HDKey {
    /// Constructs an extended key, verifying that the version bytes are
    /// known and agree with the key privacy
    pub fn with(
        key: XKey,
        chain_code: ChainCode,
        version: [u8; 4],
        depth: u8,
        fingerprint: [u8; 4],
        child_number: u32,
    ) -> Result<HDKey, Error> {
        let info =
            networks::lookup_xkey_version(version).ok_or(Error::UnknownVersion(version))?;
        if info.is_private != matches!(key, XKey::Private(_)) {
            return Err(Error::VersionPrivacyMismatch);
        }
        Ok(HDKey {
            key,
            chain_code,
            depth,
            fingerprint,
            child_number,
            version,
        })
    }

    /// Creates a master private key from a seed (usually 64 bytes produced
    /// by BIP-39)
    pub fn from_seed(seed: &[u8]) -> Result<HDKey, Error> {
        HDKey::from_seed_with_version(seed, MAINNET.xprv)
    }

    pub fn from_seed_with_version(seed: &[u8], version: [u8; 4]) -> Result<HDKey, Error> {
        let mut raw = hmac_sha512(b"Bitcoin seed", seed);
        let key = PrivateKey::parse(&raw[..32])?;
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&raw[32..]);
        raw.zeroize();
        HDKey::with(
            XKey::Private(key),
            ChainCode(chain_code),
            version,
            0,
            [0u8; 4],
            0,
        )
    }

    pub fn is_private(&self) -> bool {
        matches!(self.key, XKey::Private(_))
    }

    /// Public key corresponding to the key material
    pub fn public_key(&self) -> PublicKey {
        match &self.key {
            XKey::Private(seckey) => seckey.public_key(),
            XKey::Public(pubkey) => *pubkey,
        }
    }

    /// Private key material, if present
    pub fn private_key(&self) -> Option<&PrivateKey> {
        match &self.key {
            XKey::Private(seckey) => Some(seckey),
            XKey::Public(_) => None,
        }
    }

    /// SEC serialization of the public key
    pub fn sec(&self) -> Vec<u8> {
        self.public_key().sec()
    }

    /// Fingerprint of this key itself: `HASH160(compressed_pub)[0..4]`
    pub fn my_fingerprint(&self) -> [u8; 4] {
        let mut fp = [0u8; 4];
        fp.copy_from_slice(&hash160(self.sec())[..4]);
        fp
    }

    /// Network this key belongs to, detected from its version bytes
    pub fn network(&self) -> &'static Network {
        networks::lookup_xkey_version(self.version)
            .map(|info| info.network)
            .unwrap_or(&MAINNET)
    }

    /// Drops the private key material, converting the version bytes to
    /// their public counterpart (`xprv -> xpub`, `zprv -> zpub` etc)
    pub fn to_public(&self) -> Result<HDKey, Error> {
        let seckey = match &self.key {
            XKey::Private(seckey) => seckey,
            XKey::Public(_) => return Err(Error::AlreadyPublic),
        };
        let info = networks::lookup_xkey_version(self.version)
            .ok_or(Error::UnknownVersion(self.version))?;
        HDKey::with(
            XKey::Public(seckey.public_key()),
            self.chain_code.clone(),
            info.network.xkey_version(info.application, false),
            self.depth,
            self.fingerprint,
            self.child_number,
        )
    }

    /// Derives a child key. Indices at or above [`HARDENED_INDEX_BOUNDARY`]
    /// are hardened and require the private key.
    pub fn child(&self, index: u32) -> Result<HDKey, Error> {
        let hardened = index >= HARDENED_INDEX_BOUNDARY;
        let sec = self.sec();
        let mut fingerprint = [0u8; 4];
        fingerprint.copy_from_slice(&hash160(&sec)[..4]);

        let mut data = Vec::with_capacity(37);
        match (&self.key, hardened) {
            (XKey::Public(_), true) => return Err(Error::HardenedDerivationFromPublic),
            (XKey::Private(seckey), true) => {
                data.push(0x00);
                data.extend_from_slice(&seckey.secret());
            }
            (_, false) => data.extend_from_slice(&sec),
        }
        data.extend_from_slice(&index.to_be_bytes());

        let mut raw = hmac_sha512(self.chain_code.as_bytes(), &data);
        data.zeroize();
        let mut tweak = [0u8; 32];
        tweak.copy_from_slice(&raw[..32]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&raw[32..]);
        raw.zeroize();

        let key = match &self.key {
            XKey::Private(seckey) => {
                // invalid tweaks or a zero child key mean the index is
                // unusable; the caller retries with the next one
                let child = PrivateKey::parse(&tweak)
                    .and_then(|tweak_key| tweak_key.add_tweak(&seckey.secret()))
                    .map_err(|_| Error::DerivationFailure)?;
                XKey::Private(child)
            }
            XKey::Public(pubkey) => XKey::Public(
                pubkey
                    .add_tweak(&tweak)
                    .map_err(|_| Error::DerivationFailure)?,
            ),
        };
        tweak.zeroize();

        Ok(HDKey {
            key,
            chain_code: ChainCode(chain_code),
            depth: self.depth.checked_add(1).ok_or(Error::DepthOverflow)?,
            fingerprint,
            child_number: index,
            version: self.version,
        })
    }

    /// Hardened child: `index` below the hardened boundary gets the
    /// hardened bit set
    pub fn hardened_child(&self, index: u32) -> Result<HDKey, Error> {
        self.child(index | HARDENED_INDEX_BOUNDARY)
    }

    /// Derives a key along a path, which can be a parsed
    /// [`DerivationPath`], a slice of indices, or anything convertible
    pub fn derive(&self, path: impl AsRef<[u32]>) -> Result<HDKey, Error> {
        let mut key = self.clone();
        for &index in path.as_ref() {
            key = key.child(index)?;
        }
        Ok(key)
    }

    /// Derives along a textual path of the form `m/44h/0'/0/12`
    pub fn derive_path(&self, path: &str) -> Result<HDKey, Error> {
        self.derive(path.parse::<DerivationPath>()?)
    }

    /// Signs a 32-byte message hash with the private key
    pub fn sign(&self, msg_hash: &[u8; 32]) -> Result<Signature, Error> {
        self.private_key()
            .map(|seckey| seckey.sign(msg_hash))
            .ok_or(Error::PublicKeyCantSign)
    }

    /// BIP-340 Schnorr signature with the (untweaked) private key
    pub fn schnorr_sign(
        &self,
        msg_hash: &[u8; 32],
        aux_rand: Option<&[u8; 32]>,
    ) -> Result<SchnorrSig, Error> {
        self.private_key()
            .map(|seckey| seckey.schnorr_sign(msg_hash, aux_rand))
            .ok_or(Error::PublicKeyCantSign)
    }

    /// Verifies an ECDSA signature against the public side of the key
    pub fn verify(&self, sig: &Signature, msg_hash: &[u8; 32]) -> bool {
        self.public_key().verify(sig, msg_hash)
    }

    /// BIP-341 taproot-tweaked private key (key-path spending)
    pub fn taproot_tweak(&self, merkle_root: &[u8]) -> Result<PrivateKey, Error> {
        let seckey = self.private_key().ok_or(Error::PublicKeyCantSign)?;
        Ok(ec::taproot_tweak_seckey(seckey, merkle_root)?)
    }

    /// BIP-32 binary serialization (78 bytes)
    pub fn write_to(&self, mut stream: impl io::Write) -> io::Result<usize> {
        stream.write_all(&self.version)?;
        stream.write_all(&[self.depth])?;
        stream.write_all(&self.fingerprint)?;
        stream.write_all(&self.child_number.to_be_bytes())?;
        stream.write_all(self.chain_code.as_bytes())?;
        match &self.key {
            XKey::Private(seckey) => {
                stream.write_all(&[0x00])?;
                stream.write_all(&seckey.secret())?;
            }
            XKey::Public(pubkey) => stream.write_all(&pubkey.sec_compressed())?,
        }
        Ok(78)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(78);
        self.write_to(&mut data).expect("in-memory write");
        data
    }

    /// Decodes an extended key from its 78-byte serialization
    pub fn parse(data: &[u8]) -> Result<HDKey, Error> {
        if data.len() != 78 {
            return Err(Error::InvalidKeyLength(data.len()));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&data[0..4]);
        let depth = data[4];
        let mut fingerprint = [0u8; 4];
        fingerprint.copy_from_slice(&data[5..9]);
        let mut child = [0u8; 4];
        child.copy_from_slice(&data[9..13]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&data[13..45]);
        let key = if data[45] == 0x00 {
            XKey::Private(PrivateKey::parse(&data[46..78])?)
        } else {
            XKey::Public(PublicKey::parse(&data[45..78])?)
        };
        HDKey::with(
            key,
            ChainCode(chain_code),
            version,
            depth,
            fingerprint,
            u32::from_be_bytes(child),
        )
    }

    /// Base58check encoding, optionally overriding the version bytes
    /// (SLIP-132 re-labelling)
    pub fn to_base58(&self, version: Option<[u8; 4]>) -> String {
        let mut data = self.serialize();
        if let Some(version) = version {
            data[0..4].copy_from_slice(&version);
        }
        base58::encode_check(&data)
    }
}

impl PartialEq for HDKey {
    /// Keys are equal if they agree on everything except the version bytes,
    /// so that e.g. an xpub and its zpub re-labelling compare equal
    fn eq(&self, other: &Self) -> bool {
        self.serialize()[4..] == other.serialize()[4..]
    }
}

impl Eq for HDKey {}

impl Hash for HDKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.serialize()[4..].hash(state)
    }
}

impl Display for HDKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58(None))
    }
}

impl FromStr for HDKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HDKey::parse(&base58::decode_check(s)?)
    }
}

/// Parsed derivation path: a sequence of child indices with hardened
/// indices encoded by the [`HARDENED_INDEX_BOUNDARY`] bit
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default, From)]
pub struct DerivationPath(pub Vec<u32>);

impl DerivationPath {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Renders the path replacing the `m` prefix with a hex fingerprint,
    /// the form used inside descriptor key origins
    pub fn to_string_with_fingerprint(&self, fingerprint: [u8; 4]) -> String {
        format!("{}", self).replacen('m', &hex::encode(fingerprint), 1)
    }
}

impl AsRef<[u32]> for DerivationPath {
    fn as_ref(&self) -> &[u32] {
        &self.0
    }
}

impl Display for DerivationPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for idx in &self.0 {
            if *idx >= HARDENED_INDEX_BOUNDARY {
                write!(f, "/{}h", idx - HARDENED_INDEX_BOUNDARY)?;
            } else {
                write!(f, "/{}", idx)?;
            }
        }
        Ok(())
    }
}

impl FromStr for DerivationPath {
    type Err = Error;

    /// Accepts `m/44h/1'/0` and bare `44h/1'/0` forms; a trailing slash is
    /// tolerated
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts: Vec<&str> = s.split('/').collect();
        if parts.first() == Some(&"m") {
            parts.remove(0);
        }
        if parts.last() == Some(&"") {
            parts.pop();
        }
        let mut path = Vec::with_capacity(parts.len());
        for part in parts {
            let (digits, hardened) = match part.strip_suffix(|c| c == 'h' || c == '\'') {
                Some(digits) => (digits, true),
                None => (part, false),
            };
            let index: u32 = digits
                .parse()
                .map_err(|_| Error::InvalidPathElement(part.to_string()))?;
            if index >= HARDENED_INDEX_BOUNDARY {
                return Err(Error::InvalidPathElement(part.to_string()));
            }
            path.push(if hardened {
                index + HARDENED_INDEX_BOUNDARY
            } else {
                index
            });
        }
        Ok(DerivationPath(path))
    }
}

/// Guesses SLIP-132 version bytes from a derivation path: `84h` means
/// native segwit (`zprv`), `49h` nested segwit (`yprv`), `48h` multisig
/// variants by their script-type element. When no network is given, a `1h`
/// coin type switches to testnet.
pub fn detect_version(
    path: &DerivationPath,
    private: bool,
    network: Option<&'static Network>,
) -> [u8; 4] {
    let mut application = KeyApplication::Legacy;
    let indices = &path.0;
    if let Some(&first) = indices.first() {
        if first == HARDENED_INDEX_BOUNDARY + 84 {
            application = KeyApplication::Segwit;
        } else if first == HARDENED_INDEX_BOUNDARY + 49 {
            application = KeyApplication::NestedSegwit;
        } else if first == HARDENED_INDEX_BOUNDARY + 48 && indices.len() >= 4 {
            if indices[3] == HARDENED_INDEX_BOUNDARY + 1 {
                application = KeyApplication::NestedMultisig;
            } else if indices[3] == HARDENED_INDEX_BOUNDARY + 2 {
                application = KeyApplication::SegwitMultisig;
            }
        }
    }
    let net = network.unwrap_or_else(|| {
        if indices.len() > 1 && indices[1] == HARDENED_INDEX_BOUNDARY + 1 {
            &TESTNET
        } else {
            &MAINNET
        }
    });
    net.xkey_version(application, private)
}

#[cfg(test)]
mod tests {
    use super::*;

    // BIP-32 test vector 1
    const SEED1: &str = "000102030405060708090a0b0c0d0e0f";

    #[test]
    fn bip32_vector_1_master() {
        let seed = hex::decode(SEED1).unwrap();
        let root = HDKey::from_seed(&seed).unwrap();
        assert_eq!(
            root.to_string(),
            "xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPPqjiChkVvvNKmPGJxWUtg6LnF5kejMRNNU3TGtRBeJgk33yuGBxrMPHi"
        );
        assert_eq!(
            root.to_public().unwrap().to_string(),
            "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8"
        );
    }

    #[test]
    fn bip32_vector_1_chain() {
        let seed = hex::decode(SEED1).unwrap();
        let root = HDKey::from_seed(&seed).unwrap();
        let child = root.derive_path("m/0h/1/2h/2/1000000000").unwrap();
        assert_eq!(
            child.to_string(),
            "xprvA41z7zogVVwxVSgdKUHDy1SKmdb533PjDz7J6N6mV6uS3ze1ai8FHa8kmHScGpWmj4WggLyQjgPie1rFSruoUihUZREPSL39UNdE3BBDu76"
        );
        assert_eq!(
            child.to_public().unwrap().to_string(),
            "xpub6H1LXWLaKsWFhvm6RVpEL9P4KfRZSW7abD2ttkWP3SSQvnyA8FSVqNTEcYFgJS2UaFcxupHiYkro49S8yGasTvXEYBVPamhGW6cFJodrTHy"
        );
    }

    #[test]
    fn parse_roundtrip_and_eq_ignores_version() {
        let xprv = "xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPPqjiChkVvvNKmPGJxWUtg6LnF5kejMRNNU3TGtRBeJgk33yuGBxrMPHi";
        let key = HDKey::from_str(xprv).unwrap();
        assert_eq!(key.to_string(), xprv);
        assert!(key.is_private());
        assert_eq!(key.depth, 0);
        assert_eq!(key.fingerprint, [0u8; 4]);

        // zprv re-labelling of the same key compares equal
        let zprv = key.to_base58(Some(MAINNET.zprv));
        let key2 = HDKey::from_str(&zprv).unwrap();
        assert_eq!(key, key2);
        assert!(zprv.starts_with("zprv"));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let xprv = "xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPPqjiChkVvvNKmPGJxWUtg6LnF5kejMRNNU3TGtRBeJgk33yuGBxrMPHi";
        let mut data = base58::decode_check(xprv).unwrap();
        data[0..4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(
            HDKey::parse(&data),
            Err(Error::UnknownVersion([0xDE, 0xAD, 0xBE, 0xEF]))
        );
    }

    #[test]
    fn hardened_derivation_requires_private() {
        let seed = hex::decode(SEED1).unwrap();
        let root = HDKey::from_seed(&seed).unwrap();
        let xpub = root.to_public().unwrap();
        assert_eq!(
            xpub.hardened_child(0),
            Err(Error::HardenedDerivationFromPublic)
        );
        // unhardened public derivation matches private-then-neuter
        let a = root.child(5).unwrap().to_public().unwrap();
        let b = xpub.child(5).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn path_parsing() {
        let path: DerivationPath = "m/44h/1'/0/32".parse().unwrap();
        assert_eq!(
            path.0,
            vec![
                44 + HARDENED_INDEX_BOUNDARY,
                1 + HARDENED_INDEX_BOUNDARY,
                0,
                32
            ]
        );
        assert_eq!(path.to_string(), "m/44h/1h/0/32");

        // bare and trailing-slash forms
        assert_eq!("44h/1h/0/32".parse::<DerivationPath>().unwrap(), path);
        assert_eq!("m/44h/1h/0/32/".parse::<DerivationPath>().unwrap(), path);
        assert_eq!("m".parse::<DerivationPath>().unwrap().0, Vec::<u32>::new());
        assert!("m/foo".parse::<DerivationPath>().is_err());
        assert!("m/2147483648".parse::<DerivationPath>().is_err());

        assert_eq!(
            path.to_string_with_fingerprint([0xF4, 0x59, 0x12, 0xAB]),
            "f45912ab/44h/1h/0/32"
        );
    }

    #[test]
    fn slip132_detection() {
        let native: DerivationPath = "m/84h/0h/0h".parse().unwrap();
        assert_eq!(detect_version(&native, true, None), MAINNET.zprv);
        let nested_test: DerivationPath = "m/49h/1h/0h".parse().unwrap();
        assert_eq!(detect_version(&nested_test, false, None), TESTNET.ypub);
        let multi: DerivationPath = "m/48h/0h/0h/2h".parse().unwrap();
        assert_eq!(detect_version(&multi, false, None), MAINNET.zpub_multisig);
        let legacy: DerivationPath = "m/44h/0h/0h".parse().unwrap();
        assert_eq!(detect_version(&legacy, true, None), MAINNET.xprv);
    }
}
