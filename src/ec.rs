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

//! Elliptic-curve primitives over secp256k1: private & public keys with
//! their SEC/WIF/x-only serializations, ECDSA and BIP-340 Schnorr
//! signatures, ECDH and the taproot output-key tweak.
//!
//! All operations go through the process-global [`secp256k1::SECP256K1`]
//! context, which is read-only after initialization; scalar arithmetic on
//! secrets is performed by libsecp256k1 in constant time.

use core::cmp::Ordering;
use core::fmt::{self, Display, Formatter};
use core::hash::{Hash, Hasher};
use core::str::FromStr;

use secp256k1::{
    ecdsa, schnorr, Keypair, Message, Parity, Scalar, SecretKey, XOnlyPublicKey, SECP256K1,
};

use crate::base58;
use crate::hashes::{hash160, tagged_hash};
use crate::networks::{self, Network};

/// Errors from EC key and signature processing
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, From, Error)]
#[display(doc_comments)]
pub enum Error {
    /// secret key is out of range (zero or not below the group order)
    InvalidSecretKey,

    /// public key data do not represent a valid secp256k1 point
    InvalidPublicKey,

    /// signature data are not a valid DER or compact encoding
    InvalidSignature,

    /// tweak value is not a valid scalar
    InvalidTweak,

    /// tweaked key is the point at infinity or otherwise invalid
    TweakFailure,

    /// WIF string has invalid length
    InvalidWifLength,

    /// WIF compression flag byte is not 0x01
    InvalidWifFlag,

    /// base58 error: {0}
    #[from]
    Base58(base58::Error),
}

impl From<secp256k1::Error> for Error {
    fn from(err: secp256k1::Error) -> Self {
        match err {
            secp256k1::Error::InvalidSecretKey => Error::InvalidSecretKey,
            secp256k1::Error::InvalidPublicKey
            | secp256k1::Error::InvalidParityValue(_) => Error::InvalidPublicKey,
            secp256k1::Error::InvalidSignature => Error::InvalidSignature,
            secp256k1::Error::InvalidTweak => Error::InvalidTweak,
            _ => Error::InvalidSignature,
        }
    }
}

/// Public key on the secp256k1 curve, remembering whether it should be
/// serialized in compressed or uncompressed SEC form
#[derive(Copy, Clone, Debug)]
pub struct PublicKey {
    pub(crate) key: secp256k1::PublicKey,
    pub compressed: bool,
}

impl PublicKey {
    /// Parses a public key from its SEC serialization (33 or 65 bytes)
    pub fn parse(sec: &[u8]) -> Result<PublicKey, Error> {
        let key = secp256k1::PublicKey::from_slice(sec)
            .map_err(|_| Error::InvalidPublicKey)?;
        Ok(PublicKey {
            key,
            compressed: sec[0] != 0x04,
        })
    }

    /// Restores a point from a 32-byte x-only serialization assuming even y
    /// (BIP-340)
    pub fn from_xonly(xonly: &[u8; 32]) -> Result<PublicKey, Error> {
        let mut sec = [0u8; 33];
        sec[0] = 0x02;
        sec[1..].copy_from_slice(xonly);
        PublicKey::parse(&sec)
    }

    /// SEC serialization honoring the compression flag
    pub fn sec(&self) -> Vec<u8> {
        if self.compressed {
            self.key.serialize().to_vec()
        } else {
            self.key.serialize_uncompressed().to_vec()
        }
    }

    /// Compressed SEC serialization regardless of the flag
    pub fn sec_compressed(&self) -> [u8; 33] {
        self.key.serialize()
    }

    /// x-only (BIP-340) serialization: the 32-byte x coordinate
    pub fn xonly(&self) -> [u8; 32] {
        self.key.x_only_public_key().0.serialize()
    }

    /// Whether the point has odd y coordinate
    pub fn parity_odd(&self) -> bool {
        self.key.x_only_public_key().1 == Parity::Odd
    }

    /// Verifies an ECDSA signature over a 32-byte message hash
    pub fn verify(&self, sig: &Signature, msg_hash: &[u8; 32]) -> bool {
        SECP256K1
            .verify_ecdsa(&Message::from_digest(*msg_hash), &sig.0, &self.key)
            .is_ok()
    }

    /// Verifies a BIP-340 Schnorr signature against the x-only form of the
    /// key
    pub fn schnorr_verify(&self, sig: &SchnorrSig, msg_hash: &[u8; 32]) -> bool {
        let (xonly, _) = self.key.x_only_public_key();
        SECP256K1
            .verify_schnorr(&sig.0, &Message::from_digest(*msg_hash), &xonly)
            .is_ok()
    }

    /// `P + t*G`; fails if the tweak is out of range or the result is the
    /// point at infinity
    pub fn add_tweak(&self, tweak: &[u8; 32]) -> Result<PublicKey, Error> {
        let scalar = Scalar::from_be_bytes(*tweak).map_err(|_| Error::InvalidTweak)?;
        let key = self
            .key
            .add_exp_tweak(SECP256K1, &scalar)
            .map_err(|_| Error::TweakFailure)?;
        Ok(PublicKey {
            key,
            compressed: self.compressed,
        })
    }

    /// `t*P`
    pub fn mul_tweak(&self, tweak: &[u8; 32]) -> Result<PublicKey, Error> {
        let scalar = Scalar::from_be_bytes(*tweak).map_err(|_| Error::InvalidTweak)?;
        let key = self
            .key
            .mul_tweak(SECP256K1, &scalar)
            .map_err(|_| Error::TweakFailure)?;
        Ok(PublicKey {
            key,
            compressed: self.compressed,
        })
    }

    /// `-P`
    pub fn negate(&self) -> PublicKey {
        PublicKey {
            key: self.key.negate(SECP256K1),
            compressed: self.compressed,
        }
    }

    /// Point addition over a set of keys; fails on the point at infinity
    pub fn combine(keys: &[&PublicKey]) -> Result<PublicKey, Error> {
        let inner: Vec<&secp256k1::PublicKey> = keys.iter().map(|pk| &pk.key).collect();
        let key = secp256k1::PublicKey::combine_keys(&inner)
            .map_err(|_| Error::TweakFailure)?;
        Ok(PublicKey {
            key,
            compressed: true,
        })
    }

    /// `HASH160` of the SEC serialization
    pub fn pubkey_hash(&self) -> [u8; 20] {
        hash160(self.sec())
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for PublicKey {}

impl Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.serialize().hash(state)
    }
}

// BIP-67 lexicographic ordering over the compressed SEC form
impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.serialize().cmp(&other.key.serialize())
    }
}

impl Display for PublicKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.sec()))
    }
}

impl FromStr for PublicKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let data = hex::decode(s).map_err(|_| Error::InvalidPublicKey)?;
        PublicKey::parse(&data)
    }
}

/// Private key: a secret scalar in `[1, n-1]` plus the compression flag of
/// the corresponding public key (affects WIF and SEC forms only)
#[derive(Clone, Debug)]
pub struct PrivateKey {
    pub(crate) key: SecretKey,
    pub compressed: bool,
}

impl PrivateKey {
    /// Creates a private key from a 32-byte secret, rejecting zero and
    /// values not below the group order
    pub fn new(secret: [u8; 32], compressed: bool) -> Result<PrivateKey, Error> {
        let key = SecretKey::from_slice(&secret).map_err(|_| Error::InvalidSecretKey)?;
        Ok(PrivateKey { key, compressed })
    }

    /// Same as [`PrivateKey::new`] with the compression flag set
    pub fn parse(secret: &[u8]) -> Result<PrivateKey, Error> {
        if secret.len() != 32 {
            return Err(Error::InvalidSecretKey);
        }
        let mut buf = [0u8; 32];
        buf.copy_from_slice(secret);
        PrivateKey::new(buf, true)
    }

    /// Generates a random private key from the given RNG
    #[cfg(any(feature = "keygen", test))]
    pub fn random<R: rand::RngCore + rand::CryptoRng>(rng: &mut R) -> PrivateKey {
        PrivateKey {
            key: SecretKey::new(rng),
            compressed: true,
        }
    }

    /// Imports a private key from wallet import format
    pub fn from_wif(wif: &str) -> Result<PrivateKey, Error> {
        let data = base58::decode_check(wif)?;
        let compressed = match data.len() {
            33 => false,
            34 if data[33] == 0x01 => true,
            34 => return Err(Error::InvalidWifFlag),
            _ => return Err(Error::InvalidWifLength),
        };
        let key = SecretKey::from_slice(&data[1..33]).map_err(|_| Error::InvalidSecretKey)?;
        Ok(PrivateKey { key, compressed })
    }

    /// Exports the key in wallet import format with the network WIF prefix
    pub fn wif(&self, network: &Network) -> String {
        let mut data = Vec::with_capacity(34);
        data.push(network.wif);
        data.extend_from_slice(&self.key.secret_bytes());
        if self.compressed {
            data.push(0x01);
        }
        base58::encode_check(&data)
    }

    /// Copy of the 32-byte secret
    pub fn secret(&self) -> [u8; 32] {
        self.key.secret_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key: self.key.public_key(SECP256K1),
            compressed: self.compressed,
        }
    }

    /// SEC serialization of the corresponding public key
    pub fn sec(&self) -> Vec<u8> {
        self.public_key().sec()
    }

    /// Signs a 32-byte message hash with deterministic RFC6979 nonce;
    /// the signature is low-S normalized
    pub fn sign(&self, msg_hash: &[u8; 32]) -> Signature {
        Signature(SECP256K1.sign_ecdsa(&Message::from_digest(*msg_hash), &self.key))
    }

    /// Same as [`PrivateKey::sign`] with extra entropy mixed into the nonce
    pub fn sign_with_noncedata(&self, msg_hash: &[u8; 32], noncedata: &[u8; 32]) -> Signature {
        Signature(SECP256K1.sign_ecdsa_with_noncedata(
            &Message::from_digest(*msg_hash),
            &self.key,
            noncedata,
        ))
    }

    /// BIP-340 Schnorr signature; when no auxiliary randomness is given the
    /// deterministic signing variant is used
    pub fn schnorr_sign(&self, msg_hash: &[u8; 32], aux_rand: Option<&[u8; 32]>) -> SchnorrSig {
        let keypair = self.keypair();
        let msg = Message::from_digest(*msg_hash);
        let sig = match aux_rand {
            Some(aux) => SECP256K1.sign_schnorr_with_aux_rand(&msg, &keypair, aux),
            None => SECP256K1.sign_schnorr_no_aux_rand(&msg, &keypair),
        };
        SchnorrSig(sig)
    }

    /// `(a + t) mod n`; fails on zero result
    pub fn add_tweak(&self, tweak: &[u8; 32]) -> Result<PrivateKey, Error> {
        let scalar = Scalar::from_be_bytes(*tweak).map_err(|_| Error::InvalidTweak)?;
        let key = self
            .key
            .add_tweak(&scalar)
            .map_err(|_| Error::TweakFailure)?;
        Ok(PrivateKey {
            key,
            compressed: self.compressed,
        })
    }

    /// `(a * t) mod n`
    pub fn mul_tweak(&self, tweak: &[u8; 32]) -> Result<PrivateKey, Error> {
        let scalar = Scalar::from_be_bytes(*tweak).map_err(|_| Error::InvalidTweak)?;
        let key = self
            .key
            .mul_tweak(&scalar)
            .map_err(|_| Error::TweakFailure)?;
        Ok(PrivateKey {
            key,
            compressed: self.compressed,
        })
    }

    /// `n - a`
    pub fn negate(&self) -> PrivateKey {
        PrivateKey {
            key: self.key.negate(),
            compressed: self.compressed,
        }
    }

    /// ECDH shared secret: `SHA256` of the compressed shared point
    pub fn ecdh(&self, public: &PublicKey) -> [u8; 32] {
        secp256k1::ecdh::SharedSecret::new(&public.key, &self.key).secret_bytes()
    }

    /// Raw ECDH shared point `(x, y)` for protocols applying their own hash
    /// over the coordinates
    pub fn ecdh_raw(&self, public: &PublicKey) -> [u8; 64] {
        secp256k1::ecdh::shared_secret_point(&public.key, &self.key)
    }

    pub fn keypair(&self) -> Keypair {
        Keypair::from_secret_key(SECP256K1, &self.key)
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.key.non_secure_erase();
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for PrivateKey {}

/// ECDSA signature in its parsed form
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Signature(pub(crate) ecdsa::Signature);

impl Signature {
    /// Parses a DER-encoded signature (strict BIP-66 rules)
    pub fn parse_der(der: &[u8]) -> Result<Signature, Error> {
        Ok(Signature(
            ecdsa::Signature::from_der(der).map_err(|_| Error::InvalidSignature)?,
        ))
    }

    /// Parses a 64-byte compact `(r, s)` signature
    pub fn parse_compact(data: &[u8; 64]) -> Result<Signature, Error> {
        Ok(Signature(
            ecdsa::Signature::from_compact(data).map_err(|_| Error::InvalidSignature)?,
        ))
    }

    /// DER serialization (70-72 bytes for low-S signatures)
    pub fn serialize_der(&self) -> Vec<u8> {
        self.0.serialize_der().to_vec()
    }

    /// Compact 64-byte `(r, s)` serialization
    pub fn serialize_compact(&self) -> [u8; 64] {
        self.0.serialize_compact()
    }

    /// Enforces the low-S form required by Bitcoin standardness rules
    pub fn normalize_s(&mut self) {
        self.0.normalize_s()
    }
}

/// 64-byte BIP-340 Schnorr signature
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct SchnorrSig(pub(crate) schnorr::Signature);

impl SchnorrSig {
    pub fn parse(data: &[u8; 64]) -> Result<SchnorrSig, Error> {
        Ok(SchnorrSig(
            schnorr::Signature::from_slice(&data[..]).map_err(|_| Error::InvalidSignature)?,
        ))
    }

    pub fn serialize(&self) -> [u8; 64] {
        self.0.serialize()
    }
}

/// BIP-341 output key tweak: `Q = P + H_TapTweak(xonly(P) || merkle_root)*G`.
/// Returns the parity of `Q` (true for odd y) and its x-only serialization.
pub fn taproot_tweak_pubkey(
    pubkey: &PublicKey,
    merkle_root: &[u8],
) -> Result<(bool, [u8; 32]), Error> {
    let x = pubkey.xonly();
    let mut data = Vec::with_capacity(32 + merkle_root.len());
    data.extend_from_slice(&x);
    data.extend_from_slice(merkle_root);
    let tweak = tagged_hash("TapTweak", &data);
    let scalar = Scalar::from_be_bytes(tweak).map_err(|_| Error::InvalidTweak)?;
    let internal = XOnlyPublicKey::from_slice(&x).map_err(|_| Error::InvalidPublicKey)?;
    let (output, parity) = internal
        .add_tweak(SECP256K1, &scalar)
        .map_err(|_| Error::TweakFailure)?;
    Ok((parity == Parity::Odd, output.serialize()))
}

/// Private-key counterpart of [`taproot_tweak_pubkey`]: negates the key if
/// its point has odd y, then adds the tweak scalar
pub fn taproot_tweak_seckey(
    seckey: &PrivateKey,
    merkle_root: &[u8],
) -> Result<PrivateKey, Error> {
    let keypair = seckey.keypair();
    let x = keypair.x_only_public_key().0.serialize();
    let mut data = Vec::with_capacity(32 + merkle_root.len());
    data.extend_from_slice(&x);
    data.extend_from_slice(merkle_root);
    let tweak = tagged_hash("TapTweak", &data);
    let scalar = Scalar::from_be_bytes(tweak).map_err(|_| Error::InvalidTweak)?;
    let tweaked = keypair
        .add_xonly_tweak(SECP256K1, &scalar)
        .map_err(|_| Error::TweakFailure)?;
    Ok(PrivateKey {
        key: tweaked.secret_key(),
        compressed: true,
    })
}

/// WIF prefix detection over all known networks
pub fn wif_network(wif: &str) -> Option<&'static Network> {
    let data = base58::decode_check(wif).ok()?;
    networks::networks()
        .iter()
        .find(|net| data.first() == Some(&net.wif))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networks::{MAINNET, REGTEST};

    #[test]
    fn generator_pubkey() {
        let one = PrivateKey::new(
            {
                let mut b = [0u8; 32];
                b[31] = 1;
                b
            },
            true,
        )
        .unwrap();
        assert_eq!(
            one.public_key().to_string(),
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
        );
    }

    #[test]
    fn rejects_invalid_secrets() {
        assert_eq!(
            PrivateKey::new([0u8; 32], true),
            Err(Error::InvalidSecretKey)
        );
        assert_eq!(
            PrivateKey::new([0xFF; 32], true),
            Err(Error::InvalidSecretKey)
        );
    }

    #[test]
    fn wif_roundtrip() {
        let wif = "L2e5y14ZD3U1J7Yr62t331RtYe2hRW2TBBP8qNQHB8nSPBNgt6dM";
        let key = PrivateKey::from_wif(wif).unwrap();
        assert!(key.compressed);
        assert_eq!(key.wif(&MAINNET), wif);
        assert_eq!(wif_network(wif), Some(&MAINNET));
        // regtest WIF shares the testnet prefix
        let regtest_wif = key.wif(&REGTEST);
        let key2 = PrivateKey::from_wif(&regtest_wif).unwrap();
        assert_eq!(key, key2);
    }

    #[test]
    fn sec_parse_roundtrip() {
        let mut rng = rand::thread_rng();
        let key = PrivateKey::random(&mut rng);
        let pk = key.public_key();
        assert_eq!(PublicKey::parse(&pk.sec()).unwrap(), pk);

        let mut uncompressed = pk;
        uncompressed.compressed = false;
        let sec = uncompressed.sec();
        assert_eq!(sec.len(), 65);
        let parsed = PublicKey::parse(&sec).unwrap();
        assert!(!parsed.compressed);
        assert_eq!(parsed, pk);
    }

    #[test]
    fn ecdsa_sign_verify() {
        let mut rng = rand::thread_rng();
        let key = PrivateKey::random(&mut rng);
        let msg = crate::hashes::double_sha256(b"wallet test message");
        let sig = key.sign(&msg);
        assert!(key.public_key().verify(&sig, &msg));
        assert!(!key.public_key().verify(&sig, &crate::hashes::double_sha256(b"other")));

        // DER round-trip
        let der = sig.serialize_der();
        assert!(der.len() >= 68 && der.len() <= 72);
        assert_eq!(Signature::parse_der(&der).unwrap(), sig);
        // compact round-trip
        let compact = sig.serialize_compact();
        assert_eq!(Signature::parse_compact(&compact).unwrap(), sig);
    }

    #[test]
    fn schnorr_sign_verify() {
        let mut rng = rand::thread_rng();
        let key = PrivateKey::random(&mut rng);
        let msg = crate::hashes::tagged_hash("TapSighash", b"message");
        let sig = key.schnorr_sign(&msg, None);
        assert!(key.public_key().schnorr_verify(&sig, &msg));
        let sig2 = key.schnorr_sign(&msg, Some(&[0xAA; 32]));
        assert!(key.public_key().schnorr_verify(&sig2, &msg));
    }

    #[test]
    fn tweak_arithmetic_matches_derivation() {
        let mut rng = rand::thread_rng();
        let key = PrivateKey::random(&mut rng);
        let tweak = crate::hashes::sha256(b"tweak");
        let tweaked_priv = key.add_tweak(&tweak).unwrap();
        let tweaked_pub = key.public_key().add_tweak(&tweak).unwrap();
        assert_eq!(tweaked_priv.public_key(), tweaked_pub);
    }

    #[test]
    fn taproot_tweak_consistency() {
        let mut rng = rand::thread_rng();
        let key = PrivateKey::random(&mut rng);
        let (_, output_x) = taproot_tweak_pubkey(&key.public_key(), b"").unwrap();
        let tweaked = taproot_tweak_seckey(&key, b"").unwrap();
        assert_eq!(tweaked.public_key().xonly(), output_x);
    }

    #[test]
    fn ecdh_is_symmetric() {
        let mut rng = rand::thread_rng();
        let a = PrivateKey::random(&mut rng);
        let b = PrivateKey::random(&mut rng);
        assert_eq!(a.ecdh(&b.public_key()), b.ecdh(&a.public_key()));
        assert_eq!(a.ecdh_raw(&b.public_key()), b.ecdh_raw(&a.public_key()));
    }

    #[test]
    fn pubkey_ordering_is_lexicographic() {
        let a = PublicKey::from_str(
            "02edd7a58d2ff1e483d35f92a32e53607423f936b29bf95613cab24b0b7f92e0f1",
        )
        .unwrap();
        let b = PublicKey::from_str(
            "03a4a6d360acc45cb281e0022b03218fad6ee93881643488ae39d22b854d9fa261",
        )
        .unwrap();
        assert!(a < b);
    }
}
