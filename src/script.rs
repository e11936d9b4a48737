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

//! Bitcoin script as an opaque byte container with syntactic
//! classification, the canonical output-script constructors, address
//! conversion in both directions and the segwit witness stack.
//!
//! Classification is pure pattern-matching on byte shape: a script owns no
//! interpretation beyond what its length and opcodes pin down.

use core::fmt::{self, Display, Formatter};
use core::str::FromStr;
use std::io;

use bech32::{FromBase32, ToBase32, Variant};

use crate::base58;
use crate::consensus::{self, ConsensusDecode, ConsensusEncode, VarInt};
use crate::ec::{self, PublicKey};
use crate::hashes::{hash160, sha256};
use crate::networks::{self, Network};
use crate::transaction::SigHashType;

/// Script opcodes used by the wallet-level script constructors and the
/// miniscript compiler
pub mod op {
    pub const OP_0: u8 = 0x00;
    pub const OP_PUSHDATA1: u8 = 0x4C;
    pub const OP_PUSHDATA2: u8 = 0x4D;
    pub const OP_1: u8 = 0x51;
    pub const OP_16: u8 = 0x60;
    pub const OP_RETURN: u8 = 0x6A;
    pub const OP_TOALTSTACK: u8 = 0x6B;
    pub const OP_FROMALTSTACK: u8 = 0x6C;
    pub const OP_IFDUP: u8 = 0x73;
    pub const OP_DUP: u8 = 0x76;
    pub const OP_SWAP: u8 = 0x7C;
    pub const OP_IF: u8 = 0x63;
    pub const OP_NOTIF: u8 = 0x64;
    pub const OP_ELSE: u8 = 0x67;
    pub const OP_ENDIF: u8 = 0x68;
    pub const OP_VERIFY: u8 = 0x69;
    pub const OP_SIZE: u8 = 0x82;
    pub const OP_EQUAL: u8 = 0x87;
    pub const OP_EQUALVERIFY: u8 = 0x88;
    pub const OP_ADD: u8 = 0x93;
    pub const OP_BOOLAND: u8 = 0x9A;
    pub const OP_BOOLOR: u8 = 0x9B;
    pub const OP_NUMEQUAL: u8 = 0x9C;
    pub const OP_NUMEQUALVERIFY: u8 = 0x9D;
    pub const OP_0NOTEQUAL: u8 = 0x92;
    pub const OP_RIPEMD160: u8 = 0xA6;
    pub const OP_SHA256: u8 = 0xA8;
    pub const OP_HASH160: u8 = 0xA9;
    pub const OP_HASH256: u8 = 0xAA;
    pub const OP_CHECKSIG: u8 = 0xAC;
    pub const OP_CHECKSIGVERIFY: u8 = 0xAD;
    pub const OP_CHECKMULTISIG: u8 = 0xAE;
    pub const OP_CHECKMULTISIGVERIFY: u8 = 0xAF;
    pub const OP_CHECKLOCKTIMEVERIFY: u8 = 0xB1;
    pub const OP_CHECKSEQUENCEVERIFY: u8 = 0xB2;
    pub const OP_CHECKSIGADD: u8 = 0xBA;
}

/// Script type derived from the byte shape of a scriptPubkey
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display)]
#[display(Debug)]
pub enum ScriptType {
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
    P2tr,
}

/// Script and address processing errors
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, From, Error)]
#[display(doc_comments)]
pub enum Error {
    /// script of this type has no address representation
    NoAddressRepresentation,

    /// address '{0}' does not match any known format or network
    UnknownAddressFormat(String),

    /// unsupported segwit version or invalid witness program length
    InvalidWitnessProgram,

    /// multisig threshold must satisfy 1 <= m <= n <= 16, got {0} of {1}
    InvalidMultisigThreshold(usize, usize),

    /// EC error: {0}
    #[from]
    Ec(ec::Error),

    /// bech32 error in address encoding
    Bech32,

    /// base58 error: {0}
    #[from]
    Base58(base58::Error),
}

impl From<bech32::Error> for Error {
    fn from(_: bech32::Error) -> Self {
        Error::Bech32
    }
}

/// Opaque script byte container. Equality is byte equality; when embedded
/// into transactions or PSBT fields it is serialized with a CompactSize
/// length prefix.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Script(Vec<u8>);

impl Script {
    pub fn new(data: Vec<u8>) -> Script {
        Script(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.clone()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Syntactic classification of the script
    pub fn script_type(&self) -> Option<ScriptType> {
        let data = &self.0;
        // OP_DUP OP_HASH160 <20:hash160(pubkey)> OP_EQUALVERIFY OP_CHECKSIG
        if data.len() == 25
            && data[..3] == [op::OP_DUP, op::OP_HASH160, 20]
            && data[23..] == [op::OP_EQUALVERIFY, op::OP_CHECKSIG]
        {
            return Some(ScriptType::P2pkh);
        }
        // OP_HASH160 <20:hash160(script)> OP_EQUAL
        if data.len() == 23 && data[..2] == [op::OP_HASH160, 20] && data[22] == op::OP_EQUAL {
            return Some(ScriptType::P2sh);
        }
        // 0 <20:hash160(pubkey)>
        if data.len() == 22 && data[..2] == [op::OP_0, 20] {
            return Some(ScriptType::P2wpkh);
        }
        // 0 <32:sha256(script)>
        if data.len() == 34 && data[..2] == [op::OP_0, 32] {
            return Some(ScriptType::P2wsh);
        }
        // OP_1 <32:x-only pubkey>
        if data.len() == 34 && data[..2] == [op::OP_1, 32] {
            return Some(ScriptType::P2tr);
        }
        None
    }

    /// Address representation of the script for the given network
    pub fn address(&self, network: &Network) -> Result<String, Error> {
        let data = &self.0;
        match self.script_type() {
            Some(ScriptType::P2pkh) => {
                let mut payload = vec![network.p2pkh];
                payload.extend_from_slice(&data[3..23]);
                Ok(base58::encode_check(&payload))
            }
            Some(ScriptType::P2sh) => {
                let mut payload = vec![network.p2sh];
                payload.extend_from_slice(&data[2..22]);
                Ok(base58::encode_check(&payload))
            }
            Some(ScriptType::P2wpkh) | Some(ScriptType::P2wsh) | Some(ScriptType::P2tr) => {
                let version = if data[0] == op::OP_0 {
                    0
                } else {
                    data[0] - op::OP_1 + 1
                };
                let variant = if version == 0 {
                    Variant::Bech32
                } else {
                    Variant::Bech32m
                };
                let mut payload = vec![bech32::u5::try_from_u8(version).expect("version <= 16")];
                payload.extend((&data[2..]).to_base32());
                Ok(bech32::encode(network.bech32, payload, variant)?)
            }
            None => Err(Error::NoAddressRepresentation),
        }
    }

    /// OP_RETURN payload, if the script is a standard data carrier
    pub fn op_return_data(&self) -> Option<&[u8]> {
        let data = &self.0;
        if data.len() >= 3 && data[0] == op::OP_RETURN && data[1] == op::OP_PUSHDATA1 {
            let len = data[2] as usize;
            if data.len() == len + 3 {
                return Some(&data[3..]);
            }
        }
        None
    }
}

impl From<Vec<u8>> for Script {
    fn from(data: Vec<u8>) -> Self {
        Script(data)
    }
}

impl Display for Script {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl FromStr for Script {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Script(hex::decode(s)?))
    }
}

impl ConsensusEncode for Script {
    fn consensus_encode<E: io::Write>(&self, mut e: E) -> Result<usize, consensus::Error> {
        let prefix = VarInt::from(self.0.len()).consensus_encode(&mut e)?;
        e.write_all(&self.0)?;
        Ok(prefix + self.0.len())
    }
}

impl ConsensusDecode for Script {
    fn consensus_decode<D: io::Read>(mut d: D) -> Result<Self, consensus::Error> {
        let len = VarInt::consensus_decode(&mut d)?.0;
        Ok(Script(consensus::read_bytes(d, len as usize)?))
    }
}

/// Segwit witness: an ordered stack of byte strings
#[derive(Clone, PartialEq, Eq, Hash, Default, Debug)]
pub struct Witness(Vec<Vec<u8>>);

impl Witness {
    pub fn new(items: Vec<Vec<u8>>) -> Witness {
        Witness(items)
    }

    pub fn items(&self) -> &[Vec<u8>] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, item: Vec<u8>) {
        self.0.push(item)
    }
}

impl From<Vec<Vec<u8>>> for Witness {
    fn from(items: Vec<Vec<u8>>) -> Self {
        Witness(items)
    }
}

impl ConsensusEncode for Witness {
    fn consensus_encode<E: io::Write>(&self, mut e: E) -> Result<usize, consensus::Error> {
        let mut len = VarInt::from(self.0.len()).consensus_encode(&mut e)?;
        for item in &self.0 {
            len += item.consensus_encode(&mut e)?;
        }
        Ok(len)
    }
}

impl ConsensusDecode for Witness {
    fn consensus_decode<D: io::Read>(mut d: D) -> Result<Self, consensus::Error> {
        let count = VarInt::consensus_decode(&mut d)?.0;
        let mut items = Vec::with_capacity(count.min(0x1000) as usize);
        for _ in 0..count {
            items.push(Vec::<u8>::consensus_decode(&mut d)?);
        }
        Ok(Witness(items))
    }
}

/// Minimal-push helper used by script constructors and the finalizer
pub fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    match data.len() {
        0..=0x4B => script.push(data.len() as u8),
        0x4C..=0xFF => {
            script.push(op::OP_PUSHDATA1);
            script.push(data.len() as u8);
        }
        _ => {
            script.push(op::OP_PUSHDATA2);
            script.extend_from_slice(&(data.len() as u16).to_le_bytes());
        }
    }
    script.extend_from_slice(data);
}

/// Pay-to-pubkey-hash scriptPubkey
pub fn p2pkh(pubkey: &PublicKey) -> Script {
    let mut data = vec![op::OP_DUP, op::OP_HASH160, 20];
    data.extend_from_slice(&hash160(pubkey.sec()));
    data.extend_from_slice(&[op::OP_EQUALVERIFY, op::OP_CHECKSIG]);
    Script(data)
}

/// Pay-to-script-hash scriptPubkey
pub fn p2sh(script: &Script) -> Script {
    let mut data = vec![op::OP_HASH160, 20];
    data.extend_from_slice(&hash160(script.as_bytes()));
    data.push(op::OP_EQUAL);
    Script(data)
}

/// Pay-to-witness-pubkey-hash scriptPubkey
pub fn p2wpkh(pubkey: &PublicKey) -> Script {
    let mut data = vec![op::OP_0, 20];
    data.extend_from_slice(&hash160(pubkey.sec()));
    Script(data)
}

/// Pay-to-witness-script-hash scriptPubkey
pub fn p2wsh(script: &Script) -> Script {
    let mut data = vec![op::OP_0, 32];
    data.extend_from_slice(&sha256(script.as_bytes()));
    Script(data)
}

/// Pay-to-taproot scriptPubkey: tweaks the internal key with the merkle
/// root of the optional script tree
pub fn p2tr(pubkey: &PublicKey, merkle_root: Option<[u8; 32]>) -> Result<Script, Error> {
    let root = merkle_root.map(|r| r.to_vec()).unwrap_or_default();
    let (_, output_key) = ec::taproot_tweak_pubkey(pubkey, &root)?;
    let mut data = vec![op::OP_1, 32];
    data.extend_from_slice(&output_key);
    Ok(Script(data))
}

/// `OP_m <pk>... OP_n OP_CHECKMULTISIG` with `1 <= m <= n <= 16`
pub fn multisig(threshold: usize, pubkeys: &[PublicKey]) -> Result<Script, Error> {
    let n = pubkeys.len();
    if threshold == 0 || threshold > 16 || n < threshold || n > 16 {
        return Err(Error::InvalidMultisigThreshold(threshold, n));
    }
    let mut data = vec![op::OP_1 - 1 + threshold as u8];
    for pubkey in pubkeys {
        push_data(&mut data, &pubkey.sec());
    }
    data.push(op::OP_1 - 1 + n as u8);
    data.push(op::OP_CHECKMULTISIG);
    Ok(Script(data))
}

/// Rewrites a p2wpkh output script to its p2pkh form, the scriptCode
/// required by BIP-143 signature hashing
pub fn p2pkh_from_p2wpkh(script: &Script) -> Script {
    let mut data = vec![op::OP_DUP, op::OP_HASH160, 20];
    data.extend_from_slice(&script.as_bytes()[2..]);
    data.extend_from_slice(&[op::OP_EQUALVERIFY, op::OP_CHECKSIG]);
    Script(data)
}

/// Legacy p2pkh scriptSig: `<sig+sighash> <pubkey>`
pub fn script_sig_p2pkh(
    signature: &crate::ec::Signature,
    pubkey: &PublicKey,
    sighash: SigHashType,
) -> Script {
    let mut der = signature.serialize_der();
    der.push(sighash.as_u8());
    let mut data = vec![];
    push_data(&mut data, &der);
    push_data(&mut data, &pubkey.sec());
    Script(data)
}

/// scriptSig for p2sh-wrapped segwit: a single push of the redeem script
pub fn script_sig_p2sh(redeem_script: &Script) -> Script {
    let mut data = vec![];
    push_data(&mut data, redeem_script.as_bytes());
    Script(data)
}

/// p2wpkh witness: `[<sig+sighash>, <pubkey>]`
pub fn witness_p2wpkh(
    signature: &crate::ec::Signature,
    pubkey: &PublicKey,
    sighash: SigHashType,
) -> Witness {
    let mut der = signature.serialize_der();
    der.push(sighash.as_u8());
    Witness(vec![der, pubkey.sec()])
}

/// Reverses [`Script::address`]: reconstructs the scriptPubkey committed
/// to by an address of any supported kind
pub fn address_to_script(addr: &str) -> Result<Script, Error> {
    // base58 first; on any failure fall back to bech32
    if let Ok(data) = base58::decode_check(addr) {
        if data.len() == 21 {
            let prefix = data[0];
            for network in networks::networks() {
                if prefix == network.p2pkh {
                    let mut script = vec![op::OP_DUP, op::OP_HASH160, 20];
                    script.extend_from_slice(&data[1..]);
                    script.extend_from_slice(&[op::OP_EQUALVERIFY, op::OP_CHECKSIG]);
                    return Ok(Script(script));
                } else if prefix == network.p2sh {
                    let mut script = vec![op::OP_HASH160, 20];
                    script.extend_from_slice(&data[1..]);
                    script.push(op::OP_EQUAL);
                    return Ok(Script(script));
                }
            }
        }
        return Err(Error::UnknownAddressFormat(addr.to_string()));
    }

    let (hrp, payload, variant) =
        bech32::decode(addr).map_err(|_| Error::UnknownAddressFormat(addr.to_string()))?;
    if !networks::networks().iter().any(|net| net.bech32 == hrp) {
        return Err(Error::UnknownAddressFormat(addr.to_string()));
    }
    if payload.is_empty() {
        return Err(Error::InvalidWitnessProgram);
    }
    let version = payload[0].to_u8();
    let program = Vec::<u8>::from_base32(&payload[1..])?;
    match (version, variant, program.len()) {
        (0, Variant::Bech32, 20) | (0, Variant::Bech32, 32) => {}
        (1, Variant::Bech32m, 32) => {}
        _ => return Err(Error::InvalidWitnessProgram),
    }
    let first = if version == 0 {
        op::OP_0
    } else {
        op::OP_1 - 1 + version
    };
    let mut script = vec![first, program.len() as u8];
    script.extend_from_slice(&program);
    Ok(Script(script))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ec::PrivateKey;
    use crate::networks::{MAINNET, REGTEST};

    fn test_pubkey() -> PublicKey {
        PrivateKey::from_wif("L2e5y14ZD3U1J7Yr62t331RtYe2hRW2TBBP8qNQHB8nSPBNgt6dM")
            .unwrap()
            .public_key()
    }

    #[test]
    fn classification() {
        let pk = test_pubkey();
        assert_eq!(p2pkh(&pk).script_type(), Some(ScriptType::P2pkh));
        assert_eq!(
            p2sh(&p2wpkh(&pk)).script_type(),
            Some(ScriptType::P2sh)
        );
        assert_eq!(p2wpkh(&pk).script_type(), Some(ScriptType::P2wpkh));
        assert_eq!(
            p2wsh(&p2pkh(&pk)).script_type(),
            Some(ScriptType::P2wsh)
        );
        assert_eq!(
            p2tr(&pk, None).unwrap().script_type(),
            Some(ScriptType::P2tr)
        );
        assert_eq!(Script::new(vec![op::OP_RETURN]).script_type(), None);
    }

    #[test]
    fn address_roundtrip_all_types() {
        let pk = test_pubkey();
        let scripts = vec![
            p2pkh(&pk),
            p2sh(&p2wpkh(&pk)),
            p2wpkh(&pk),
            p2wsh(&p2pkh(&pk)),
            p2tr(&pk, None).unwrap(),
        ];
        for network in &[&MAINNET, &REGTEST] {
            for script in &scripts {
                let addr = script.address(network).unwrap();
                assert_eq!(&address_to_script(&addr).unwrap(), script);
            }
        }
    }

    #[test]
    fn known_regtest_addresses() {
        // known-good addresses for the same WIF key
        let pk = test_pubkey();
        assert_eq!(
            pk.to_string(),
            "0354508bf004cb134e2f02a3c880c96ac501e7f20dfd40f3b697f28f2a93cfa230"
        );
        assert_eq!(
            p2pkh(&pk).address(&REGTEST).unwrap(),
            "mnAn9XUpC3By62rUEKbe5fJVM3p2xGr1Ck"
        );
        assert_eq!(
            p2pkh(&pk).address(&MAINNET).unwrap(),
            "17eprUPqP1kiJvNrWkdGFk6AV4DL1Ds1Kb"
        );
        assert_eq!(
            p2wpkh(&pk).address(&REGTEST).unwrap(),
            "bcrt1qfrupw3afwdlzqsa477hn9yehhtfvwpsp02lahk"
        );
        assert_eq!(
            p2sh(&p2wpkh(&pk)).address(&REGTEST).unwrap(),
            "2NE38cntpYp2juGYf3hPNhstg9FEkedmX2w"
        );
    }

    #[test]
    fn multisig_script_shape() {
        let pubkeys: Vec<PublicKey> = [
            "02edd7a58d2ff1e483d35f92a32e53607423f936b29bf95613cab24b0b7f92e0f1",
            "03a4a6d360acc45cb281e0022b03218fad6ee93881643488ae39d22b854d9fa261",
            "02e1fdc3b011effbba4b0771eb0f7193dee24cfe101ab7e8b64516d83f7116a615",
        ]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();

        let script = multisig(2, &pubkeys).unwrap();
        let bytes = script.as_bytes();
        assert_eq!(bytes[0], op::OP_1 + 1); // OP_2
        assert_eq!(bytes[bytes.len() - 2], op::OP_1 + 2); // OP_3
        assert_eq!(bytes[bytes.len() - 1], op::OP_CHECKMULTISIG);
        assert_eq!(bytes.len(), 1 + 3 * 34 + 2);

        assert!(multisig(0, &pubkeys).is_err());
        assert!(multisig(4, &pubkeys).is_err());
    }

    #[test]
    fn p2wpkh_script_code_rewrite() {
        let pk = test_pubkey();
        assert_eq!(p2pkh_from_p2wpkh(&p2wpkh(&pk)), p2pkh(&pk));
    }

    #[test]
    fn script_consensus_encoding_is_length_prefixed() {
        let script = Script::new(vec![0xAB; 3]);
        assert_eq!(script.consensus_serialize(), vec![0x03, 0xAB, 0xAB, 0xAB]);
        assert_eq!(
            Script::consensus_deserialize(&[0x03, 0xAB, 0xAB, 0xAB]).unwrap(),
            script
        );
    }

    #[test]
    fn witness_encoding() {
        let witness = Witness::new(vec![vec![0x01, 0x02], vec![], vec![0xFF]]);
        let data = witness.consensus_serialize();
        assert_eq!(data, vec![0x03, 0x02, 0x01, 0x02, 0x00, 0x01, 0xFF]);
        assert_eq!(Witness::consensus_deserialize(&data).unwrap(), witness);
    }
}
