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

//! Blinded descriptors: the `blinded(BLINDING_KEY,DESCRIPTOR)` wrapper
//! around bitcoin descriptors. Blinding keys are either SLIP-77
//! (`slip77(KEY)`, one master key covering all scripts) or a plain key
//! tweaked per script with the `elements/blindingkey` tagged hash.

use core::fmt::{self, Display, Formatter};
use core::str::FromStr;

use super::addresses;
use super::networks::ElementsNetwork;
use super::slip77;
use crate::descriptor::lex::Cursor;
use crate::descriptor::{self, Descriptor, Key, KeyInner};
use crate::ec::{self, PrivateKey, PublicKey};
use crate::hashes::tagged_hash;
use crate::script::Script;

/// Blinded-descriptor errors
#[derive(Clone, PartialEq, Eq, Debug, Display, From, Error)]
#[display(doc_comments)]
pub enum Error {
    /// blinded() wrapper requires a blinding key and an inner descriptor
    InvalidBlindedWrapper,

    /// slip77 blinding requires a private master key
    Slip77RequiresPrivate,

    /// wildcard status of the blinding key and descriptor must match
    WildcardMismatch,

    /// descriptor error: {0}
    #[from]
    Descriptor(descriptor::Error),

    /// argument error: {0}
    #[from]
    Argument(descriptor::arguments::Error),

    /// EC error: {0}
    #[from]
    Ec(ec::Error),

    /// address error: {0}
    #[from]
    Address(addresses::Error),
}

/// Blinding key of a confidential descriptor
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum BlindingKey {
    /// `slip77(KEY)`: the master blinding key is the key's secret
    Slip77(Key),
    /// A bare key, tweaked per script
    Bare(Key),
}

impl BlindingKey {
    pub fn read_from(cursor: &mut Cursor) -> Result<BlindingKey, Error> {
        if cursor.eat_str("slip77(") {
            let key = Key::read_from(cursor)?;
            if !cursor.eat(b')') {
                return Err(Error::InvalidBlindedWrapper);
            }
            return Ok(BlindingKey::Slip77(key));
        }
        Ok(BlindingKey::Bare(Key::read_from(cursor)?))
    }

    pub fn is_slip77(&self) -> bool {
        matches!(self, BlindingKey::Slip77(_))
    }

    fn key(&self) -> &Key {
        match self {
            BlindingKey::Slip77(key) | BlindingKey::Bare(key) => key,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        match self {
            // one master key covers every script
            BlindingKey::Slip77(_) => false,
            BlindingKey::Bare(key) => key.is_wildcard(),
        }
    }

    /// Blinding private key for a concrete script (requires private key
    /// material)
    pub fn blinding_private_key(&self, script_pubkey: &Script) -> Result<PrivateKey, Error> {
        match self {
            BlindingKey::Slip77(key) => {
                let master = key
                    .private_key()
                    .ok_or(Error::Slip77RequiresPrivate)?;
                Ok(slip77::blinding_key(&master.secret(), script_pubkey)?)
            }
            BlindingKey::Bare(key) => {
                let seckey = key
                    .private_key()
                    .ok_or(Error::Slip77RequiresPrivate)?;
                let tweak = tagged_hash("elements/blindingkey", script_pubkey.as_bytes());
                Ok(seckey.add_tweak(&tweak)?)
            }
        }
    }

    /// Blinding public key for a concrete script
    pub fn blinding_public_key(&self, script_pubkey: &Script) -> Result<PublicKey, Error> {
        match self {
            BlindingKey::Slip77(_) => {
                Ok(self.blinding_private_key(script_pubkey)?.public_key())
            }
            BlindingKey::Bare(key) => {
                let tweak = tagged_hash("elements/blindingkey", script_pubkey.as_bytes());
                Ok(key.public_key().add_tweak(&tweak)?)
            }
        }
    }

    pub fn derive(&self, index: u32, branch_index: Option<u32>) -> Result<BlindingKey, Error> {
        Ok(match self {
            BlindingKey::Slip77(key) => BlindingKey::Slip77(key.clone()),
            BlindingKey::Bare(key) => BlindingKey::Bare(key.derive(index, branch_index)?),
        })
    }
}

impl Display for BlindingKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BlindingKey::Slip77(key) => write!(f, "slip77({})", key),
            BlindingKey::Bare(key) => write!(f, "{}", key),
        }
    }
}

/// Liquid descriptor: a bitcoin descriptor optionally wrapped into
/// `blinded()`
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LDescriptor {
    pub blinding_key: Option<BlindingKey>,
    pub descriptor: Descriptor,
}

impl LDescriptor {
    pub fn is_blinded(&self) -> bool {
        self.blinding_key.is_some()
    }

    pub fn derive(&self, index: u32, branch_index: Option<u32>) -> Result<LDescriptor, Error> {
        Ok(LDescriptor {
            blinding_key: self
                .blinding_key
                .as_ref()
                .map(|key| key.derive(index, branch_index))
                .transpose()?,
            descriptor: self.descriptor.derive(index, branch_index)?,
        })
    }

    pub fn script_pubkey(&self) -> Result<Script, Error> {
        Ok(self.descriptor.script_pubkey()?)
    }

    /// Confidential (or plain, when unblinded) address of the descriptor
    pub fn address(&self, network: &ElementsNetwork) -> Result<String, Error> {
        let script_pubkey = self.descriptor.script_pubkey()?;
        let blinding_pubkey = self
            .blinding_key
            .as_ref()
            .map(|key| key.blinding_public_key(&script_pubkey))
            .transpose()?;
        Ok(addresses::address(
            &script_pubkey,
            blinding_pubkey.as_ref(),
            network,
        )?)
    }
}

impl Display for LDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.blinding_key {
            Some(blinding_key) => {
                write!(f, "blinded({},{})", blinding_key, self.descriptor)
            }
            None => write!(f, "{}", self.descriptor),
        }
    }
}

impl FromStr for LDescriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = descriptor::checksum::verify(s).map_err(descriptor::Error::from)?;
        if !body.starts_with("blinded(") {
            return Ok(LDescriptor {
                blinding_key: None,
                descriptor: body.parse()?,
            });
        }
        let mut cursor = Cursor::new(body["blinded(".len()..].as_bytes());
        let blinding_key = BlindingKey::read_from(&mut cursor)?;
        if !cursor.eat(b',') {
            return Err(Error::InvalidBlindedWrapper);
        }
        let rest = core::str::from_utf8(cursor.rest())
            .map_err(|_| Error::InvalidBlindedWrapper)?;
        let inner = rest
            .strip_suffix(')')
            .ok_or(Error::InvalidBlindedWrapper)?;
        let descriptor: Descriptor = inner.parse()?;
        if !blinding_key.is_slip77() {
            // a per-script blinding key must walk the same wildcard space
            let key_wildcard = blinding_key.is_wildcard();
            if key_wildcard != descriptor.is_wildcard() {
                return Err(Error::WildcardMismatch);
            }
            if let BlindingKey::Bare(key) = &blinding_key {
                let branches = key.branches().map(<[u32]>::len).unwrap_or(1);
                if branches != descriptor.num_branches() {
                    return Err(Error::WildcardMismatch);
                }
            }
        }
        Ok(LDescriptor {
            blinding_key: Some(blinding_key),
            descriptor,
        })
    }
}

/// Blinding master key derived from a seed with the non-standard
/// "Elements blinding seed" HMAC tag (the blinding counterpart of BIP-32
/// master key generation)
pub fn blinding_master_from_seed(seed: &[u8]) -> Result<PrivateKey, ec::Error> {
    let raw = crate::hashes::hmac_sha512(b"Elements blinding seed", seed);
    PrivateKey::parse(&raw[..32])
}

// keep the KeyInner import meaningful for bare x-only rejection
impl LDescriptor {
    /// Private blinding key for the current (derived) script
    pub fn blinding_private_key(&self) -> Result<Option<PrivateKey>, Error> {
        let script_pubkey = self.descriptor.script_pubkey()?;
        self.blinding_key
            .as_ref()
            .map(|key| key.blinding_private_key(&script_pubkey))
            .transpose()
    }

    /// Whether the blinding key carries private material
    pub fn can_unblind(&self) -> bool {
        self.blinding_key
            .as_ref()
            .map(|key| !matches!(key.key().inner, KeyInner::Pub(_) | KeyInner::XOnly(_)))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::super::networks::ELEMENTS_REGTEST;
    use super::*;
    use crate::bip32::HDKey;
    use crate::bip39::mnemonic_to_seed;

    fn xprv() -> String {
        HDKey::from_seed(&mnemonic_to_seed(
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon \
             abandon abandon about",
            "",
        ))
        .unwrap()
        .to_string()
    }

    #[test]
    fn slip77_descriptor_roundtrip() {
        let source = format!("blinded(slip77({}),wpkh({}/{{0,1}}/*))", xprv(), xprv());
        let ldesc: LDescriptor = source.parse().unwrap();
        assert!(ldesc.is_blinded());
        assert_eq!(ldesc.to_string(), source);

        let derived = ldesc.derive(0, None).unwrap();
        let addr = derived.address(&ELEMENTS_REGTEST).unwrap();
        assert!(addr.starts_with("el1"));

        // the confidential address decodes back to the script and the
        // derived blinding pubkey
        let (script, blinding) =
            addresses::address_to_script(&addr, &ELEMENTS_REGTEST).unwrap();
        assert_eq!(script, derived.script_pubkey().unwrap());
        let expected = derived
            .blinding_key
            .as_ref()
            .unwrap()
            .blinding_public_key(&script)
            .unwrap();
        assert_eq!(blinding, Some(expected));
    }

    #[test]
    fn bare_blinding_key_tweaks_per_script() {
        let source = format!("blinded({}/{{0,1}}/*,wpkh({}/{{0,1}}/*))", xprv(), xprv());
        let ldesc: LDescriptor = source.parse().unwrap();
        let a = ldesc.derive(0, None).unwrap();
        let b = ldesc.derive(1, None).unwrap();
        let key_a = a.blinding_private_key().unwrap().unwrap();
        let key_b = b.blinding_private_key().unwrap().unwrap();
        assert_ne!(key_a, key_b);
        // pub side matches priv side
        assert_eq!(
            a.blinding_key
                .as_ref()
                .unwrap()
                .blinding_public_key(&a.script_pubkey().unwrap())
                .unwrap(),
            key_a.public_key()
        );
    }

    #[test]
    fn wildcard_mismatch_rejected() {
        // non-wildcard bare blinding key with a wildcard descriptor
        let source = format!("blinded({},wpkh({}/{{0,1}}/*))", xprv(), xprv());
        assert!(matches!(
            source.parse::<LDescriptor>(),
            Err(Error::WildcardMismatch)
        ));
        // slip77 is exempt
        let source = format!("blinded(slip77({}),wpkh({}/{{0,1}}/*))", xprv(), xprv());
        assert!(source.parse::<LDescriptor>().is_ok());
    }

    #[test]
    fn unblinded_descriptor_passthrough() {
        let source = format!("wpkh({}/{{0,1}}/*)", xprv());
        let ldesc: LDescriptor = source.parse().unwrap();
        assert!(!ldesc.is_blinded());
        let addr = ldesc.derive(0, None).unwrap().address(&ELEMENTS_REGTEST).unwrap();
        assert!(addr.starts_with("ert1"));
    }

    #[test]
    fn blinding_master_from_seed_works() {
        let seed = mnemonic_to_seed("legal winner thank year wave sausage worth useful legal winner thank yellow", "");
        let master = blinding_master_from_seed(&seed).unwrap();
        assert_eq!(master, blinding_master_from_seed(&seed).unwrap());
    }
}
