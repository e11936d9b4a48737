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

//! Partially-signed bitcoin transactions (BIP-174 version 0 and BIP-370
//! version 2): the typed key-value container, its text form and the signer
//! walking input scopes with an HD root.
//!
//! Unknown fields are preserved verbatim and re-serialized in place;
//! duplicate keys of singleton fields are parse errors. Known fields are
//! written in ascending type-code order, which round-trips containers
//! produced by standard implementations byte-exactly.

pub mod view;

pub use self::view::{GlobalTransactionView, PsbtView};

use core::fmt::{self, Display, Formatter};
use core::str::FromStr;
use std::io;

use crate::bip32::{self, DerivationPath, HDKey};
use crate::consensus::{self, ConsensusDecode, ConsensusEncode, VarInt};
use crate::ec::{self, PrivateKey, PublicKey};
use crate::hashes::hash160;
use crate::script::{self, Script, ScriptType, Witness};
use crate::transaction::{
    self, signing_mode, SigHashType, SigningMode, Transaction, TxIn, TxOut, Txid,
};

// Global scope field codes
const PSBT_GLOBAL_UNSIGNED_TX: u8 = 0x00;
const PSBT_GLOBAL_XPUB: u8 = 0x01;
const PSBT_GLOBAL_TX_VERSION: u8 = 0x02;
const PSBT_GLOBAL_FALLBACK_LOCKTIME: u8 = 0x03;
const PSBT_GLOBAL_INPUT_COUNT: u8 = 0x04;
const PSBT_GLOBAL_OUTPUT_COUNT: u8 = 0x05;
const PSBT_GLOBAL_TX_MODIFIABLE: u8 = 0x06;
const PSBT_GLOBAL_VERSION: u8 = 0xFB;

// Input scope field codes
const PSBT_IN_NON_WITNESS_UTXO: u8 = 0x00;
const PSBT_IN_WITNESS_UTXO: u8 = 0x01;
const PSBT_IN_PARTIAL_SIG: u8 = 0x02;
const PSBT_IN_SIGHASH_TYPE: u8 = 0x03;
const PSBT_IN_REDEEM_SCRIPT: u8 = 0x04;
const PSBT_IN_WITNESS_SCRIPT: u8 = 0x05;
const PSBT_IN_BIP32_DERIVATION: u8 = 0x06;
const PSBT_IN_FINAL_SCRIPTSIG: u8 = 0x07;
const PSBT_IN_FINAL_SCRIPTWITNESS: u8 = 0x08;
const PSBT_IN_PREVIOUS_TXID: u8 = 0x0E;
const PSBT_IN_OUTPUT_INDEX: u8 = 0x0F;
const PSBT_IN_SEQUENCE: u8 = 0x10;
const PSBT_IN_TAP_KEY_SIG: u8 = 0x13;
const PSBT_IN_TAP_SCRIPT_SIG: u8 = 0x14;
const PSBT_IN_TAP_LEAF_SCRIPT: u8 = 0x15;
const PSBT_IN_TAP_BIP32_DERIVATION: u8 = 0x16;
const PSBT_IN_TAP_INTERNAL_KEY: u8 = 0x17;
const PSBT_IN_TAP_MERKLE_ROOT: u8 = 0x18;

// Output scope field codes
const PSBT_OUT_REDEEM_SCRIPT: u8 = 0x00;
const PSBT_OUT_WITNESS_SCRIPT: u8 = 0x01;
const PSBT_OUT_BIP32_DERIVATION: u8 = 0x02;
const PSBT_OUT_AMOUNT: u8 = 0x03;
const PSBT_OUT_SCRIPT: u8 = 0x04;
const PSBT_OUT_TAP_INTERNAL_KEY: u8 = 0x05;
const PSBT_OUT_TAP_TREE: u8 = 0x06;
const PSBT_OUT_TAP_BIP32_DERIVATION: u8 = 0x07;

pub(crate) const PSBT_MAGIC: &[u8; 5] = b"psbt\xff";

/// PSBT processing errors
#[derive(Clone, PartialEq, Eq, Debug, Display, From, Error)]
#[display(doc_comments)]
pub enum Error {
    /// invalid PSBT magic bytes
    InvalidMagic,

    /// duplicated key {0} in a PSBT scope
    DuplicateKey(String),

    /// invalid PSBT field {0:#04x}: {1}
    InvalidField(u8, String),

    /// PSBT v0 requires the global unsigned transaction
    MissingGlobalTx,

    /// PSBT v2 misses a required global field
    MissingGlobalField,

    /// PSBT v2 forbids the global unsigned transaction
    UnexpectedGlobalTx,

    /// unsupported PSBT version {0}
    UnsupportedVersion(u32),

    /// input {0} has no utxo information
    MissingUtxo(usize),

    /// non-witness utxo of input {0} does not match the spent outpoint
    UtxoMismatch(usize),

    /// witness utxo of input {0} must have a segwit script
    NonSegwitWitnessUtxo(usize),

    /// derivation in the PSBT does not produce the declared public key
    DerivationMismatch,

    /// invalid PSBT text encoding
    InvalidEncoding,

    /// scope index {0} is out of range
    InvalidScopeIndex(usize),

    /// consensus encoding error: {0}
    #[from]
    Consensus(consensus::Error),

    /// transaction error: {0}
    #[from]
    Transaction(transaction::Error),

    /// EC error: {0}
    #[from]
    Ec(ec::Error),

    /// BIP-32 error: {0}
    #[from]
    Bip32(bip32::Error),
}

/// `(fingerprint, path)` value of PSBT derivation fields. Note: child
/// indices are serialized as little-endian u32, unlike the big-endian
/// indices inside base58 extended keys.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct PsbtDerivation {
    pub fingerprint: [u8; 4],
    pub derivation: Vec<u32>,
}

impl PsbtDerivation {
    pub fn new(fingerprint: [u8; 4], derivation: Vec<u32>) -> PsbtDerivation {
        PsbtDerivation {
            fingerprint,
            derivation,
        }
    }

    pub fn path(&self) -> DerivationPath {
        DerivationPath(self.derivation.clone())
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(4 + self.derivation.len() * 4);
        data.extend_from_slice(&self.fingerprint);
        for index in &self.derivation {
            data.extend_from_slice(&index.to_le_bytes());
        }
        data
    }

    pub fn parse(data: &[u8]) -> Result<PsbtDerivation, Error> {
        if data.len() < 4 || (data.len() - 4) % 4 != 0 {
            return Err(Error::InvalidField(
                PSBT_IN_BIP32_DERIVATION,
                "derivation length must be 4 + 4*n bytes".to_string(),
            ));
        }
        let mut fingerprint = [0u8; 4];
        fingerprint.copy_from_slice(&data[..4]);
        let derivation = data[4..]
            .chunks(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(PsbtDerivation {
            fingerprint,
            derivation,
        })
    }
}

impl Display for PsbtDerivation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(
            &self
                .path()
                .to_string_with_fingerprint(self.fingerprint),
        )
    }
}

/// Writes a length-prefixed byte string
pub(crate) fn ser_string<E: io::Write>(mut e: E, data: &[u8]) -> Result<usize, consensus::Error> {
    let len = VarInt::from(data.len()).consensus_encode(&mut e)?;
    e.write_all(data)?;
    Ok(len + data.len())
}

/// Reads a length-prefixed byte string
pub(crate) fn read_string<D: io::Read>(mut d: D) -> Result<Vec<u8>, consensus::Error> {
    let len = VarInt::consensus_decode(&mut d)?.0;
    consensus::read_bytes(d, len as usize)
}

/// Reads all key-value pairs of one scope (up to the 0x00 separator)
pub(crate) fn read_scope_pairs<D: io::Read>(
    mut d: D,
) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
    let mut pairs: Vec<(Vec<u8>, Vec<u8>)> = vec![];
    loop {
        let key = read_string(&mut d)?;
        if key.is_empty() {
            break;
        }
        let value = read_string(&mut d)?;
        if pairs.iter().any(|(k, _)| k == &key) {
            return Err(Error::DuplicateKey(hex::encode(&key)));
        }
        pairs.push((key, value));
    }
    Ok(pairs)
}

fn write_pair<E: io::Write>(
    mut e: E,
    key: &[u8],
    value: &[u8],
) -> Result<usize, consensus::Error> {
    Ok(ser_string(&mut e, key)? + ser_string(&mut e, value)?)
}

fn singleton<T>(
    slot: &mut Option<T>,
    code: u8,
    key: &[u8],
    value: T,
) -> Result<(), Error> {
    if key.len() != 1 {
        return Err(Error::InvalidField(code, "key must be 1 byte".to_string()));
    }
    if slot.is_some() {
        return Err(Error::DuplicateKey(hex::encode(key)));
    }
    *slot = Some(value);
    Ok(())
}

fn array_value<const LEN: usize>(code: u8, value: &[u8]) -> Result<[u8; LEN], Error> {
    if value.len() != LEN {
        return Err(Error::InvalidField(
            code,
            format!("value must be {} bytes", LEN),
        ));
    }
    let mut out = [0u8; LEN];
    out.copy_from_slice(value);
    Ok(out)
}

/// Per-input scope of a PSBT
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct InputScope {
    pub non_witness_utxo: Option<Transaction>,
    pub witness_utxo: Option<TxOut>,
    /// `pubkey -> signature || sighash byte`
    pub partial_sigs: Vec<(PublicKey, Vec<u8>)>,
    pub sighash_type: Option<SigHashType>,
    pub redeem_script: Option<Script>,
    pub witness_script: Option<Script>,
    pub bip32_derivations: Vec<(PublicKey, PsbtDerivation)>,
    pub final_scriptsig: Option<Script>,
    pub final_scriptwitness: Option<Witness>,
    // v2 fields
    pub previous_txid: Option<Txid>,
    pub output_index: Option<u32>,
    pub sequence: Option<u32>,
    // taproot fields
    /// 64-byte signature, or 65 with an explicit sighash byte
    pub tap_key_sig: Option<Vec<u8>>,
    /// `(xonly pubkey, leaf hash) -> signature`
    pub tap_script_sigs: Vec<(([u8; 32], [u8; 32]), Vec<u8>)>,
    /// `control block -> script || leaf version`
    pub tap_leaf_scripts: Vec<(Vec<u8>, Vec<u8>)>,
    /// `xonly pubkey -> (leaf hashes, origin)`
    pub tap_bip32_derivations: Vec<([u8; 32], (Vec<[u8; 32]>, PsbtDerivation))>,
    pub tap_internal_key: Option<[u8; 32]>,
    pub tap_merkle_root: Option<[u8; 32]>,
    pub unknown: Vec<(Vec<u8>, Vec<u8>)>,
}

impl InputScope {
    pub fn read_from<D: io::Read>(d: D) -> Result<InputScope, Error> {
        let mut scope = InputScope::default();
        for (key, value) in read_scope_pairs(d)? {
            scope.parse_pair(key, value)?;
        }
        Ok(scope)
    }

    fn parse_pair(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), Error> {
        let code = key[0];
        match code {
            PSBT_IN_NON_WITNESS_UTXO => singleton(
                &mut self.non_witness_utxo,
                code,
                &key,
                Transaction::consensus_deserialize(&value)?,
            )?,
            PSBT_IN_WITNESS_UTXO => singleton(
                &mut self.witness_utxo,
                code,
                &key,
                TxOut::consensus_deserialize(&value)?,
            )?,
            PSBT_IN_PARTIAL_SIG => {
                let pubkey = PublicKey::parse(&key[1..])?;
                self.partial_sigs.push((pubkey, value));
            }
            PSBT_IN_SIGHASH_TYPE => {
                let raw = u32::from_le_bytes(array_value::<4>(code, &value)?);
                singleton(&mut self.sighash_type, code, &key, SigHashType(raw))?;
            }
            PSBT_IN_REDEEM_SCRIPT => {
                singleton(&mut self.redeem_script, code, &key, Script::new(value))?
            }
            PSBT_IN_WITNESS_SCRIPT => {
                singleton(&mut self.witness_script, code, &key, Script::new(value))?
            }
            PSBT_IN_BIP32_DERIVATION => {
                let pubkey = PublicKey::parse(&key[1..])?;
                let derivation = PsbtDerivation::parse(&value)?;
                self.bip32_derivations.push((pubkey, derivation));
            }
            PSBT_IN_FINAL_SCRIPTSIG => {
                singleton(&mut self.final_scriptsig, code, &key, Script::new(value))?
            }
            PSBT_IN_FINAL_SCRIPTWITNESS => singleton(
                &mut self.final_scriptwitness,
                code,
                &key,
                Witness::consensus_deserialize(&value)?,
            )?,
            PSBT_IN_PREVIOUS_TXID => {
                let raw = array_value::<32>(code, &value)?;
                let mut txid = raw;
                txid.reverse();
                singleton(&mut self.previous_txid, code, &key, Txid(txid))?;
            }
            PSBT_IN_OUTPUT_INDEX => {
                let raw = u32::from_le_bytes(array_value::<4>(code, &value)?);
                singleton(&mut self.output_index, code, &key, raw)?;
            }
            PSBT_IN_SEQUENCE => {
                let raw = u32::from_le_bytes(array_value::<4>(code, &value)?);
                singleton(&mut self.sequence, code, &key, raw)?;
            }
            PSBT_IN_TAP_KEY_SIG => {
                if value.len() != 64 && value.len() != 65 {
                    return Err(Error::InvalidField(
                        code,
                        "taproot key signature must be 64 or 65 bytes".to_string(),
                    ));
                }
                singleton(&mut self.tap_key_sig, code, &key, value)?;
            }
            PSBT_IN_TAP_SCRIPT_SIG => {
                if key.len() != 65 {
                    return Err(Error::InvalidField(
                        code,
                        "key must be xonly || leaf hash".to_string(),
                    ));
                }
                let mut xonly = [0u8; 32];
                xonly.copy_from_slice(&key[1..33]);
                let mut leaf = [0u8; 32];
                leaf.copy_from_slice(&key[33..65]);
                self.tap_script_sigs.push(((xonly, leaf), value));
            }
            PSBT_IN_TAP_LEAF_SCRIPT => {
                self.tap_leaf_scripts.push((key[1..].to_vec(), value));
            }
            PSBT_IN_TAP_BIP32_DERIVATION => {
                let xonly = array_value::<32>(code, &key[1..])?;
                let (hashes, derivation) = parse_tap_derivation(&value)?;
                self.tap_bip32_derivations
                    .push((xonly, (hashes, derivation)));
            }
            PSBT_IN_TAP_INTERNAL_KEY => {
                let xonly = array_value::<32>(code, &value)?;
                singleton(&mut self.tap_internal_key, code, &key, xonly)?;
            }
            PSBT_IN_TAP_MERKLE_ROOT => {
                let root = array_value::<32>(code, &value)?;
                singleton(&mut self.tap_merkle_root, code, &key, root)?;
            }
            _ => self.unknown.push((key, value)),
        }
        Ok(())
    }

    pub fn write_to<E: io::Write>(&self, mut e: E) -> Result<usize, consensus::Error> {
        let mut len = 0;
        if let Some(tx) = &self.non_witness_utxo {
            len += write_pair(&mut e, &[PSBT_IN_NON_WITNESS_UTXO], &tx.consensus_serialize())?;
        }
        if let Some(utxo) = &self.witness_utxo {
            len += write_pair(&mut e, &[PSBT_IN_WITNESS_UTXO], &utxo.consensus_serialize())?;
        }
        for (pubkey, sig) in &self.partial_sigs {
            let mut key = vec![PSBT_IN_PARTIAL_SIG];
            key.extend_from_slice(&pubkey.sec());
            len += write_pair(&mut e, &key, sig)?;
        }
        if let Some(sighash) = self.sighash_type {
            len += write_pair(&mut e, &[PSBT_IN_SIGHASH_TYPE], &sighash.0.to_le_bytes())?;
        }
        if let Some(redeem) = &self.redeem_script {
            len += write_pair(&mut e, &[PSBT_IN_REDEEM_SCRIPT], redeem.as_bytes())?;
        }
        if let Some(witness) = &self.witness_script {
            len += write_pair(&mut e, &[PSBT_IN_WITNESS_SCRIPT], witness.as_bytes())?;
        }
        for (pubkey, derivation) in &self.bip32_derivations {
            let mut key = vec![PSBT_IN_BIP32_DERIVATION];
            key.extend_from_slice(&pubkey.sec());
            len += write_pair(&mut e, &key, &derivation.serialize())?;
        }
        if let Some(script_sig) = &self.final_scriptsig {
            len += write_pair(&mut e, &[PSBT_IN_FINAL_SCRIPTSIG], script_sig.as_bytes())?;
        }
        if let Some(witness) = &self.final_scriptwitness {
            len += write_pair(
                &mut e,
                &[PSBT_IN_FINAL_SCRIPTWITNESS],
                &witness.consensus_serialize(),
            )?;
        }
        if let Some(txid) = &self.previous_txid {
            len += write_pair(&mut e, &[PSBT_IN_PREVIOUS_TXID], &txid.consensus_serialize())?;
        }
        if let Some(index) = self.output_index {
            len += write_pair(&mut e, &[PSBT_IN_OUTPUT_INDEX], &index.to_le_bytes())?;
        }
        if let Some(sequence) = self.sequence {
            len += write_pair(&mut e, &[PSBT_IN_SEQUENCE], &sequence.to_le_bytes())?;
        }
        if let Some(sig) = &self.tap_key_sig {
            len += write_pair(&mut e, &[PSBT_IN_TAP_KEY_SIG], sig)?;
        }
        for ((xonly, leaf), sig) in &self.tap_script_sigs {
            let mut key = vec![PSBT_IN_TAP_SCRIPT_SIG];
            key.extend_from_slice(xonly);
            key.extend_from_slice(leaf);
            len += write_pair(&mut e, &key, sig)?;
        }
        for (control, script) in &self.tap_leaf_scripts {
            let mut key = vec![PSBT_IN_TAP_LEAF_SCRIPT];
            key.extend_from_slice(control);
            len += write_pair(&mut e, &key, script)?;
        }
        for (xonly, (hashes, derivation)) in &self.tap_bip32_derivations {
            let mut key = vec![PSBT_IN_TAP_BIP32_DERIVATION];
            key.extend_from_slice(xonly);
            len += write_pair(&mut e, &key, &serialize_tap_derivation(hashes, derivation))?;
        }
        if let Some(xonly) = &self.tap_internal_key {
            len += write_pair(&mut e, &[PSBT_IN_TAP_INTERNAL_KEY], xonly)?;
        }
        if let Some(root) = &self.tap_merkle_root {
            len += write_pair(&mut e, &[PSBT_IN_TAP_MERKLE_ROOT], root)?;
        }
        for (key, value) in &self.unknown {
            len += write_pair(&mut e, key, value)?;
        }
        e.write_all(&[0x00])?;
        Ok(len + 1)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut data = vec![];
        self.write_to(&mut data).expect("in-memory encoding");
        data
    }

    /// The spent output, from whichever utxo field is present. The witness
    /// utxo takes precedence.
    pub fn utxo(&self) -> Option<&TxOut> {
        if let Some(utxo) = &self.witness_utxo {
            return Some(utxo);
        }
        if let (Some(tx), Some(vout)) = (&self.non_witness_utxo, self.utxo_index()) {
            return tx.vout.get(vout as usize);
        }
        None
    }

    fn utxo_index(&self) -> Option<u32> {
        self.output_index
    }

    /// Drops key metadata to shrink the container (the `compress` mode of
    /// the streaming writer): derivations, redeem/witness scripts and the
    /// full previous transaction
    pub fn clear_metadata(&mut self) {
        self.bip32_derivations.clear();
        self.tap_bip32_derivations.clear();
        self.redeem_script = None;
        self.witness_script = None;
        if self.witness_utxo.is_some() {
            self.non_witness_utxo = None;
        }
    }

    /// Merges fields of another scope into this one (used when combining
    /// extra signature streams)
    pub fn update(&mut self, other: InputScope) {
        if other.non_witness_utxo.is_some() {
            self.non_witness_utxo = other.non_witness_utxo;
        }
        if other.witness_utxo.is_some() {
            self.witness_utxo = other.witness_utxo;
        }
        for (pubkey, sig) in other.partial_sigs {
            if !self.partial_sigs.iter().any(|(pk, _)| pk == &pubkey) {
                self.partial_sigs.push((pubkey, sig));
            }
        }
        if other.sighash_type.is_some() {
            self.sighash_type = other.sighash_type;
        }
        if other.redeem_script.is_some() {
            self.redeem_script = other.redeem_script;
        }
        if other.witness_script.is_some() {
            self.witness_script = other.witness_script;
        }
        for (pubkey, derivation) in other.bip32_derivations {
            if !self.bip32_derivations.iter().any(|(pk, _)| pk == &pubkey) {
                self.bip32_derivations.push((pubkey, derivation));
            }
        }
        if other.final_scriptsig.is_some() {
            self.final_scriptsig = other.final_scriptsig;
        }
        if other.final_scriptwitness.is_some() {
            self.final_scriptwitness = other.final_scriptwitness;
        }
        if other.tap_key_sig.is_some() {
            self.tap_key_sig = other.tap_key_sig;
        }
        for (key, sig) in other.tap_script_sigs {
            if !self.tap_script_sigs.iter().any(|(k, _)| k == &key) {
                self.tap_script_sigs.push((key, sig));
            }
        }
        for (control, script) in other.tap_leaf_scripts {
            if !self.tap_leaf_scripts.iter().any(|(c, _)| c == &control) {
                self.tap_leaf_scripts.push((control, script));
            }
        }
        for (xonly, data) in other.tap_bip32_derivations {
            if !self
                .tap_bip32_derivations
                .iter()
                .any(|(x, _)| x == &xonly)
            {
                self.tap_bip32_derivations.push((xonly, data));
            }
        }
        if other.tap_internal_key.is_some() {
            self.tap_internal_key = other.tap_internal_key;
        }
        if other.tap_merkle_root.is_some() {
            self.tap_merkle_root = other.tap_merkle_root;
        }
        for (key, value) in other.unknown {
            if !self.unknown.iter().any(|(k, _)| k == &key) {
                self.unknown.push((key, value));
            }
        }
    }
}

fn parse_tap_derivation(
    value: &[u8],
) -> Result<(Vec<[u8; 32]>, PsbtDerivation), Error> {
    let mut cursor = io::Cursor::new(value);
    let count = VarInt::consensus_decode(&mut cursor)?.0;
    let mut hashes = Vec::with_capacity(count.min(0x100) as usize);
    for _ in 0..count {
        hashes.push(consensus::read_array::<_, 32>(&mut cursor)?);
    }
    let rest = &value[cursor.position() as usize..];
    Ok((hashes, PsbtDerivation::parse(rest)?))
}

fn serialize_tap_derivation(hashes: &[[u8; 32]], derivation: &PsbtDerivation) -> Vec<u8> {
    let mut data = vec![];
    VarInt::from(hashes.len())
        .consensus_encode(&mut data)
        .expect("in-memory encoding");
    for hash in hashes {
        data.extend_from_slice(hash);
    }
    data.extend_from_slice(&derivation.serialize());
    data
}

/// Per-output scope of a PSBT
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct OutputScope {
    pub redeem_script: Option<Script>,
    pub witness_script: Option<Script>,
    pub bip32_derivations: Vec<(PublicKey, PsbtDerivation)>,
    // v2 fields
    pub amount: Option<u64>,
    pub script: Option<Script>,
    // taproot fields
    pub tap_internal_key: Option<[u8; 32]>,
    /// Serialized `(depth, leaf version, script)*` tree, kept opaque
    pub tap_tree: Option<Vec<u8>>,
    pub tap_bip32_derivations: Vec<([u8; 32], (Vec<[u8; 32]>, PsbtDerivation))>,
    pub unknown: Vec<(Vec<u8>, Vec<u8>)>,
}

impl OutputScope {
    pub fn read_from<D: io::Read>(d: D) -> Result<OutputScope, Error> {
        let mut scope = OutputScope::default();
        for (key, value) in read_scope_pairs(d)? {
            scope.parse_pair(key, value)?;
        }
        Ok(scope)
    }

    fn parse_pair(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), Error> {
        let code = key[0];
        match code {
            PSBT_OUT_REDEEM_SCRIPT => {
                singleton(&mut self.redeem_script, code, &key, Script::new(value))?
            }
            PSBT_OUT_WITNESS_SCRIPT => {
                singleton(&mut self.witness_script, code, &key, Script::new(value))?
            }
            PSBT_OUT_BIP32_DERIVATION => {
                let pubkey = PublicKey::parse(&key[1..])?;
                let derivation = PsbtDerivation::parse(&value)?;
                self.bip32_derivations.push((pubkey, derivation));
            }
            PSBT_OUT_AMOUNT => {
                let raw = u64::from_le_bytes(array_value::<8>(code, &value)?);
                singleton(&mut self.amount, code, &key, raw)?;
            }
            PSBT_OUT_SCRIPT => singleton(&mut self.script, code, &key, Script::new(value))?,
            PSBT_OUT_TAP_INTERNAL_KEY => {
                let xonly = array_value::<32>(code, &value)?;
                singleton(&mut self.tap_internal_key, code, &key, xonly)?;
            }
            PSBT_OUT_TAP_TREE => singleton(&mut self.tap_tree, code, &key, value)?,
            PSBT_OUT_TAP_BIP32_DERIVATION => {
                let xonly = array_value::<32>(code, &key[1..])?;
                let (hashes, derivation) = parse_tap_derivation(&value)?;
                self.tap_bip32_derivations
                    .push((xonly, (hashes, derivation)));
            }
            _ => self.unknown.push((key, value)),
        }
        Ok(())
    }

    pub fn write_to<E: io::Write>(&self, mut e: E) -> Result<usize, consensus::Error> {
        let mut len = 0;
        if let Some(redeem) = &self.redeem_script {
            len += write_pair(&mut e, &[PSBT_OUT_REDEEM_SCRIPT], redeem.as_bytes())?;
        }
        if let Some(witness) = &self.witness_script {
            len += write_pair(&mut e, &[PSBT_OUT_WITNESS_SCRIPT], witness.as_bytes())?;
        }
        for (pubkey, derivation) in &self.bip32_derivations {
            let mut key = vec![PSBT_OUT_BIP32_DERIVATION];
            key.extend_from_slice(&pubkey.sec());
            len += write_pair(&mut e, &key, &derivation.serialize())?;
        }
        if let Some(amount) = self.amount {
            len += write_pair(&mut e, &[PSBT_OUT_AMOUNT], &amount.to_le_bytes())?;
        }
        if let Some(script) = &self.script {
            len += write_pair(&mut e, &[PSBT_OUT_SCRIPT], script.as_bytes())?;
        }
        if let Some(xonly) = &self.tap_internal_key {
            len += write_pair(&mut e, &[PSBT_OUT_TAP_INTERNAL_KEY], xonly)?;
        }
        if let Some(tree) = &self.tap_tree {
            len += write_pair(&mut e, &[PSBT_OUT_TAP_TREE], tree)?;
        }
        for (xonly, (hashes, derivation)) in &self.tap_bip32_derivations {
            let mut key = vec![PSBT_OUT_TAP_BIP32_DERIVATION];
            key.extend_from_slice(xonly);
            len += write_pair(&mut e, &key, &serialize_tap_derivation(hashes, derivation))?;
        }
        for (key, value) in &self.unknown {
            len += write_pair(&mut e, key, value)?;
        }
        e.write_all(&[0x00])?;
        Ok(len + 1)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut data = vec![];
        self.write_to(&mut data).expect("in-memory encoding");
        data
    }

    pub fn clear_metadata(&mut self) {
        self.bip32_derivations.clear();
        self.tap_bip32_derivations.clear();
        self.redeem_script = None;
        self.witness_script = None;
    }

    pub fn update(&mut self, other: OutputScope) {
        if other.redeem_script.is_some() {
            self.redeem_script = other.redeem_script;
        }
        if other.witness_script.is_some() {
            self.witness_script = other.witness_script;
        }
        for (pubkey, derivation) in other.bip32_derivations {
            if !self.bip32_derivations.iter().any(|(pk, _)| pk == &pubkey) {
                self.bip32_derivations.push((pubkey, derivation));
            }
        }
        if other.amount.is_some() {
            self.amount = other.amount;
        }
        if other.script.is_some() {
            self.script = other.script;
        }
        if other.tap_internal_key.is_some() {
            self.tap_internal_key = other.tap_internal_key;
        }
        if other.tap_tree.is_some() {
            self.tap_tree = other.tap_tree;
        }
        for (xonly, data) in other.tap_bip32_derivations {
            if !self
                .tap_bip32_derivations
                .iter()
                .any(|(x, _)| x == &xonly)
            {
                self.tap_bip32_derivations.push((xonly, data));
            }
        }
        for (key, value) in other.unknown {
            if !self.unknown.iter().any(|(k, _)| k == &key) {
                self.unknown.push((key, value));
            }
        }
    }
}

/// Partially-signed bitcoin transaction, version 0 or 2
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Psbt {
    /// Container version: 0 or 2
    pub version: u32,
    /// Unsigned transaction (version 0 only)
    pub tx: Option<Transaction>,
    /// v2 global transaction version
    pub tx_version: Option<i32>,
    /// v2 fallback locktime
    pub fallback_locktime: Option<u32>,
    /// v2 modifiable-flags bitfield
    pub tx_modifiable: Option<u8>,
    pub xpubs: Vec<(HDKey, PsbtDerivation)>,
    pub unknown: Vec<(Vec<u8>, Vec<u8>)>,
    pub inputs: Vec<InputScope>,
    pub outputs: Vec<OutputScope>,
}

impl Psbt {
    /// Creates a version-0 PSBT around an unsigned transaction
    pub fn with_tx(tx: Transaction) -> Psbt {
        let inputs = tx.vin.iter().map(|_| InputScope::default()).collect();
        let outputs = tx.vout.iter().map(|_| OutputScope::default()).collect();
        Psbt {
            version: 0,
            tx: Some(tx),
            tx_version: None,
            fallback_locktime: None,
            tx_modifiable: None,
            xpubs: vec![],
            unknown: vec![],
            inputs,
            outputs,
        }
    }

    pub fn read_from<D: io::Read>(mut d: D) -> Result<Psbt, Error> {
        let mut magic = [0u8; 5];
        d.read_exact(&mut magic).map_err(consensus::Error::from)?;
        if &magic != PSBT_MAGIC {
            return Err(Error::InvalidMagic);
        }

        let mut psbt = Psbt::default();
        let mut input_count = None;
        let mut output_count = None;
        for (key, value) in read_scope_pairs(&mut d)? {
            match key[0] {
                PSBT_GLOBAL_UNSIGNED_TX if key.len() == 1 => {
                    psbt.tx = Some(Transaction::consensus_deserialize(&value)?);
                }
                PSBT_GLOBAL_XPUB => {
                    let xpub = HDKey::parse(&key[1..])?;
                    psbt.xpubs.push((xpub, PsbtDerivation::parse(&value)?));
                }
                PSBT_GLOBAL_TX_VERSION if key.len() == 1 => {
                    psbt.tx_version =
                        Some(i32::from_le_bytes(array_value::<4>(key[0], &value)?));
                }
                PSBT_GLOBAL_FALLBACK_LOCKTIME if key.len() == 1 => {
                    psbt.fallback_locktime =
                        Some(u32::from_le_bytes(array_value::<4>(key[0], &value)?));
                }
                PSBT_GLOBAL_INPUT_COUNT if key.len() == 1 => {
                    input_count = Some(VarInt::consensus_deserialize(&value)?.0 as usize);
                }
                PSBT_GLOBAL_OUTPUT_COUNT if key.len() == 1 => {
                    output_count = Some(VarInt::consensus_deserialize(&value)?.0 as usize);
                }
                PSBT_GLOBAL_TX_MODIFIABLE if key.len() == 1 => {
                    psbt.tx_modifiable = Some(*value.first().ok_or_else(|| {
                        Error::InvalidField(key[0], "empty value".to_string())
                    })?);
                }
                PSBT_GLOBAL_VERSION if key.len() == 1 => {
                    psbt.version = u32::from_le_bytes(array_value::<4>(key[0], &value)?);
                }
                _ => psbt.unknown.push((key, value)),
            }
        }

        let (n_in, n_out) = match psbt.version {
            0 => {
                let tx = psbt.tx.as_ref().ok_or(Error::MissingGlobalTx)?;
                (tx.vin.len(), tx.vout.len())
            }
            2 => {
                if psbt.tx.is_some() {
                    return Err(Error::UnexpectedGlobalTx);
                }
                if psbt.tx_version.is_none() {
                    return Err(Error::MissingGlobalField);
                }
                (
                    input_count.ok_or(Error::MissingGlobalField)?,
                    output_count.ok_or(Error::MissingGlobalField)?,
                )
            }
            other => return Err(Error::UnsupportedVersion(other)),
        };

        for _ in 0..n_in {
            psbt.inputs.push(InputScope::read_from(&mut d)?);
        }
        for _ in 0..n_out {
            psbt.outputs.push(OutputScope::read_from(&mut d)?);
        }
        psbt.validate()?;
        Ok(psbt)
    }

    fn validate(&self) -> Result<(), Error> {
        for (i, inp) in self.inputs.iter().enumerate() {
            if let (Some(tx), Some(txid)) = (&inp.non_witness_utxo, self.input_txid(i)) {
                if tx.txid() != txid {
                    return Err(Error::UtxoMismatch(i));
                }
            }
            if let Some(utxo) = &inp.witness_utxo {
                match utxo.script_pubkey.script_type() {
                    Some(ScriptType::P2wpkh)
                    | Some(ScriptType::P2wsh)
                    | Some(ScriptType::P2tr)
                    | Some(ScriptType::P2sh) => {}
                    _ => return Err(Error::NonSegwitWitnessUtxo(i)),
                }
            }
        }
        Ok(())
    }

    pub fn write_to<E: io::Write>(&self, mut e: E) -> Result<usize, consensus::Error> {
        e.write_all(PSBT_MAGIC)?;
        let mut len = PSBT_MAGIC.len();
        if let Some(tx) = &self.tx {
            len += write_pair(&mut e, &[PSBT_GLOBAL_UNSIGNED_TX], &tx.consensus_serialize())?;
        }
        for (xpub, derivation) in &self.xpubs {
            let mut key = vec![PSBT_GLOBAL_XPUB];
            key.extend_from_slice(&xpub.serialize());
            len += write_pair(&mut e, &key, &derivation.serialize())?;
        }
        if let Some(version) = self.tx_version {
            len += write_pair(&mut e, &[PSBT_GLOBAL_TX_VERSION], &version.to_le_bytes())?;
        }
        if let Some(locktime) = self.fallback_locktime {
            len += write_pair(
                &mut e,
                &[PSBT_GLOBAL_FALLBACK_LOCKTIME],
                &locktime.to_le_bytes(),
            )?;
        }
        if self.version == 2 {
            len += write_pair(
                &mut e,
                &[PSBT_GLOBAL_INPUT_COUNT],
                &VarInt::from(self.inputs.len()).consensus_serialize(),
            )?;
            len += write_pair(
                &mut e,
                &[PSBT_GLOBAL_OUTPUT_COUNT],
                &VarInt::from(self.outputs.len()).consensus_serialize(),
            )?;
        }
        if let Some(modifiable) = self.tx_modifiable {
            len += write_pair(&mut e, &[PSBT_GLOBAL_TX_MODIFIABLE], &[modifiable])?;
        }
        if self.version == 2 {
            len += write_pair(&mut e, &[PSBT_GLOBAL_VERSION], &self.version.to_le_bytes())?;
        }
        for (key, value) in &self.unknown {
            len += write_pair(&mut e, key, value)?;
        }
        e.write_all(&[0x00])?;
        len += 1;
        for inp in &self.inputs {
            len += inp.write_to(&mut e)?;
        }
        for out in &self.outputs {
            len += out.write_to(&mut e)?;
        }
        Ok(len)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut data = vec![];
        self.write_to(&mut data).expect("in-memory encoding");
        data
    }

    pub fn parse(data: &[u8]) -> Result<Psbt, Error> {
        let mut cursor = io::Cursor::new(data);
        let psbt = Psbt::read_from(&mut cursor)?;
        if cursor.position() as usize != data.len() {
            return Err(consensus::Error::DataNotEntirelyConsumed.into());
        }
        Ok(psbt)
    }

    /// Transaction version regardless of the container version
    pub fn transaction_version(&self) -> i32 {
        self.tx
            .as_ref()
            .map(|tx| tx.version)
            .or(self.tx_version)
            .unwrap_or(2)
    }

    pub fn locktime(&self) -> u32 {
        self.tx
            .as_ref()
            .map(|tx| tx.locktime)
            .or(self.fallback_locktime)
            .unwrap_or(0)
    }

    /// Spent txid of an input, from the global tx (v0) or the scope (v2)
    pub fn input_txid(&self, index: usize) -> Option<Txid> {
        if let Some(tx) = &self.tx {
            return tx.vin.get(index).map(|vin| vin.txid);
        }
        self.inputs.get(index).and_then(|inp| inp.previous_txid)
    }

    /// The unsigned transaction: either the global one or reconstructed
    /// from v2 per-scope fields
    pub fn global_tx(&self) -> Result<Transaction, Error> {
        if let Some(tx) = &self.tx {
            return Ok(tx.clone());
        }
        let mut tx = Transaction {
            version: self.tx_version.ok_or(Error::MissingGlobalField)?,
            vin: vec![],
            vout: vec![],
            locktime: self.fallback_locktime.unwrap_or(0),
        };
        for (i, inp) in self.inputs.iter().enumerate() {
            let txid = inp.previous_txid.ok_or(Error::MissingUtxo(i))?;
            let vout = inp.output_index.ok_or(Error::MissingUtxo(i))?;
            let mut txin = TxIn::new(txid, vout);
            txin.sequence = inp.sequence.unwrap_or(0xFFFF_FFFF);
            tx.vin.push(txin);
        }
        for (i, out) in self.outputs.iter().enumerate() {
            let amount = out.amount.ok_or(Error::InvalidScopeIndex(i))?;
            let script = out.script.clone().ok_or(Error::InvalidScopeIndex(i))?;
            tx.vout.push(TxOut::new(amount, script));
        }
        Ok(tx)
    }

    /// The output spent by input `i`
    pub fn utxo(&self, index: usize) -> Result<&TxOut, Error> {
        let inp = self
            .inputs
            .get(index)
            .ok_or(Error::InvalidScopeIndex(index))?;
        if let Some(utxo) = &inp.witness_utxo {
            return Ok(utxo);
        }
        if let Some(tx) = &inp.non_witness_utxo {
            let vout = if let Some(global) = &self.tx {
                global.vin[index].vout
            } else {
                inp.output_index.ok_or(Error::MissingUtxo(index))?
            };
            return tx
                .vout
                .get(vout as usize)
                .ok_or(Error::MissingUtxo(index));
        }
        Err(Error::MissingUtxo(index))
    }

    /// Fee of the transaction, when every input has utxo information
    pub fn fee(&self) -> Result<u64, Error> {
        let mut input_sum = 0u64;
        for i in 0..self.inputs.len() {
            input_sum = input_sum.saturating_add(self.utxo(i)?.value);
        }
        let output_sum: u64 = if let Some(tx) = &self.tx {
            tx.vout.iter().map(|out| out.value).sum()
        } else {
            self.outputs
                .iter()
                .map(|out| out.amount.unwrap_or(0))
                .sum()
        };
        Ok(input_sum.saturating_sub(output_sum))
    }

    /// The signature hash of input `i` with its script environment
    /// resolved per BIP-174: witness script, else redeem script, else the
    /// utxo scriptPubkey, with p2wpkh rewritten to its p2pkh form
    pub fn sighash(
        &self,
        index: usize,
        sighash: SigHashType,
        leaf_hash: Option<[u8; 32]>,
    ) -> Result<[u8; 32], Error> {
        let tx = self.global_tx()?;
        let inp = self
            .inputs
            .get(index)
            .ok_or(Error::InvalidScopeIndex(index))?;
        let utxo = self.utxo(index)?.clone();
        let mode = signing_mode(
            utxo.script_pubkey.script_type(),
            inp.redeem_script.as_ref().and_then(Script::script_type),
            inp.witness_script.is_some(),
            inp.witness_utxo.is_some(),
        );
        match mode {
            SigningMode::Taproot => {
                let mut spent = Vec::with_capacity(self.inputs.len());
                for i in 0..self.inputs.len() {
                    spent.push(self.utxo(i)?.clone());
                }
                Ok(tx.sighash_taproot(index, &spent, sighash, leaf_hash)?)
            }
            SigningMode::SegwitV0 => {
                let mut script_code = inp
                    .witness_script
                    .clone()
                    .or_else(|| inp.redeem_script.clone())
                    .unwrap_or_else(|| utxo.script_pubkey.clone());
                if script_code.script_type() == Some(ScriptType::P2wpkh) {
                    script_code = script::p2pkh_from_p2wpkh(&script_code);
                }
                Ok(tx.sighash_segwit(index, &script_code, utxo.value, sighash)?)
            }
            SigningMode::Legacy => {
                let script_code = inp
                    .redeem_script
                    .clone()
                    .unwrap_or_else(|| utxo.script_pubkey.clone());
                Ok(tx.sighash_legacy(index, &script_code, sighash)?)
            }
        }
    }

    /// Signs all inputs the HD root controls, returning the number of
    /// signatures added.
    ///
    /// `sighash` acts as a filter: when `Some`, inputs
    /// declaring a different sighash type are skipped rather than failed;
    /// when `None`, each input is signed with its declared (or default)
    /// type.
    pub fn sign_with(
        &mut self,
        root: &HDKey,
        sighash: Option<SigHashType>,
    ) -> Result<usize, Error> {
        let fingerprint = root.my_fingerprint();
        let mut counter = 0;
        for index in 0..self.inputs.len() {
            counter += self.sign_input_with(index, root, fingerprint, sighash)?;
        }
        Ok(counter)
    }

    fn sign_input_with(
        &mut self,
        index: usize,
        root: &HDKey,
        fingerprint: [u8; 4],
        sighash: Option<SigHashType>,
    ) -> Result<usize, Error> {
        // inputs without utxo info are skipped, so that partial signers
        // contribute what they can
        let utxo = match self.utxo(index) {
            Ok(utxo) => utxo.clone(),
            Err(_) => return Ok(0),
        };
        let is_taproot = utxo.script_pubkey.script_type() == Some(ScriptType::P2tr);

        let declared = self.inputs[index].sighash_type;
        let default = if is_taproot {
            SigHashType::DEFAULT
        } else {
            SigHashType::ALL
        };
        let inp_sighash = declared.unwrap_or(default);
        if let Some(requested) = sighash {
            if inp_sighash != requested {
                return Ok(0);
            }
        }

        let mut counter = 0;
        if is_taproot {
            let derivations = self.inputs[index].tap_bip32_derivations.clone();
            let merkle_root = self.inputs[index].tap_merkle_root;
            for (xonly, (leaf_hashes, derivation)) in derivations {
                if derivation.fingerprint != fingerprint {
                    continue;
                }
                let hdkey = root.derive(&derivation.derivation[..])?;
                if hdkey.public_key().xonly() != xonly {
                    return Err(Error::DerivationMismatch);
                }
                let seckey = match hdkey.private_key() {
                    Some(seckey) => seckey.clone(),
                    None => continue,
                };
                if leaf_hashes.is_empty() {
                    // key-path spend: tweak with the merkle root
                    let root_bytes =
                        merkle_root.map(|r| r.to_vec()).unwrap_or_default();
                    let tweaked = ec::taproot_tweak_seckey(&seckey, &root_bytes)?;
                    let digest = self.sighash(index, inp_sighash, None)?;
                    let sig = tweaked.schnorr_sign(&digest, None);
                    let mut value = sig.serialize().to_vec();
                    if inp_sighash != SigHashType::DEFAULT {
                        value.push(inp_sighash.as_u8());
                    }
                    self.inputs[index].tap_key_sig = Some(value);
                    counter += 1;
                } else {
                    for leaf_hash in leaf_hashes {
                        let digest = self.sighash(index, inp_sighash, Some(leaf_hash))?;
                        let sig = seckey.schnorr_sign(&digest, None);
                        let mut value = sig.serialize().to_vec();
                        if inp_sighash != SigHashType::DEFAULT {
                            value.push(inp_sighash.as_u8());
                        }
                        let key = (xonly, leaf_hash);
                        if !self.inputs[index]
                            .tap_script_sigs
                            .iter()
                            .any(|(k, _)| k == &key)
                        {
                            self.inputs[index].tap_script_sigs.push((key, value));
                            counter += 1;
                        }
                    }
                }
            }
            return Ok(counter);
        }

        let derivations = self.inputs[index].bip32_derivations.clone();
        for (pubkey, derivation) in derivations {
            if derivation.fingerprint != fingerprint {
                continue;
            }
            let hdkey = root.derive(&derivation.derivation[..])?;
            if hdkey.public_key() != pubkey {
                return Err(Error::DerivationMismatch);
            }
            let digest = self.sighash(index, inp_sighash, None)?;
            let sig = hdkey.sign(&digest)?;
            let mut value = sig.serialize_der();
            value.push(inp_sighash.as_u8());
            if !self.inputs[index]
                .partial_sigs
                .iter()
                .any(|(pk, _)| pk == &pubkey)
            {
                self.inputs[index].partial_sigs.push((pubkey, value));
                counter += 1;
            }
        }
        Ok(counter)
    }

    /// Signs inputs controlled by an individual private key: the key is
    /// used when its pubkey or pubkey hash occurs in the scriptCode
    pub fn sign_with_key(
        &mut self,
        seckey: &PrivateKey,
        sighash: Option<SigHashType>,
    ) -> Result<usize, Error> {
        let pubkey = seckey.public_key();
        let sec = pubkey.sec();
        let pkh = hash160(&sec);
        let mut counter = 0;
        for index in 0..self.inputs.len() {
            let utxo = match self.utxo(index) {
                Ok(utxo) => utxo.clone(),
                Err(_) => continue,
            };
            let inp = &self.inputs[index];
            let inp_sighash = inp.sighash_type.unwrap_or(SigHashType::ALL);
            if let Some(requested) = sighash {
                if inp_sighash != requested {
                    continue;
                }
            }
            let script_code = inp
                .witness_script
                .clone()
                .or_else(|| inp.redeem_script.clone())
                .unwrap_or_else(|| utxo.script_pubkey.clone());
            let data = script_code.as_bytes();
            let in_script = data
                .windows(sec.len())
                .any(|window| window == &sec[..])
                || data.windows(20).any(|window| window == pkh);
            if !in_script {
                continue;
            }
            let digest = self.sighash(index, inp_sighash, None)?;
            let sig = seckey.sign(&digest);
            let mut value = sig.serialize_der();
            value.push(inp_sighash.as_u8());
            if !self.inputs[index]
                .partial_sigs
                .iter()
                .any(|(pk, _)| pk == &pubkey)
            {
                self.inputs[index].partial_sigs.push((pubkey, value));
                counter += 1;
            }
        }
        Ok(counter)
    }
}

impl Display for Psbt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&base64::encode(self.serialize()))
    }
}

impl FromStr for Psbt {
    type Err = Error;

    /// Accepts base64, or hex when the string starts with the hex-encoded
    /// magic `70736274ff`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("70736274ff") {
            let data = hex::decode(s).map_err(|_| Error::InvalidEncoding)?;
            return Psbt::parse(&data);
        }
        let data = base64::decode(s).map_err(|_| Error::InvalidEncoding)?;
        Psbt::parse(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ec::SchnorrSig;

    // taproot key-path PSBT pair from the reference test suite; inputs are
    // controlled by tr(ROOT/0/*) at indices 0 and 1
    const ROOT_KEY: &str = "tprv8ZgxMBicQKsPf27gmh4DbQqN2K6xnXA7m7AeceqQVGkRYny3X49sgcufzbJcq4k5eaGZDMijccdDzvQga2Saqd78dKqN52QwLyqgY8apX3j";
    const B64PSBT: &str = "cHNidP8BAKYCAAAAAsBlMEaxkJwNZ6V+BZ06bKIb5q2CpF9sHDDj0/eJfzA1AAAAAAD+////kqnvuD+I8rLf8eELSAqvqBiEy5+IpOKpn/acu+gs0E8BAAAAAP7///8CAA4nBwAAAAAWABStYQVCeoRPwINTcqOPmDkTReYZVbjCyQEAAAAAIlEgDTyyEUjN1Oyxc6Z5xifyM3Kamy+Hrt0UdV86CeDMvf8AAAAAAAEAfQIAAAABRL1RocN1LnP4aONGuWFAJm0+Hej0SWAqlSlJ9caTP/gBAAAAAP7///8CAOH1BQAAAAAiUSBCFZNDTJDvmyVvyzL/thnwUyHGSdn0HDwInUIk/SHzmc4uGh4BAAAAFgAU1ZjhFjq1hmtoVb2+6O7jHrtqYsDLAAAAAQErAOH1BQAAAAAiUSBCFZNDTJDvmyVvyzL/thnwUyHGSdn0HDwInUIk/SHzmQABAH0CAAAAAcBlMEaxkJwNZ6V+BZ06bKIb5q2CpF9sHDDj0/eJfzA1AQAAAAD+////ArU9HxsBAAAAFgAUOGUymdaBcR3nQVoZ804qGf9H9iKA8PoCAAAAACJRIDrGIL80dDh9Y5xIBek776O9xpVrAtiuyiy8HXZSuTUZzAAAAAEBK4Dw+gIAAAAAIlEgOsYgvzR0OH1jnEgF6Tvvo73GlWsC2K7KLLwddlK5NRkAAAA=";
    const B64SIGNED: &str = "cHNidP8BAKYCAAAAAsBlMEaxkJwNZ6V+BZ06bKIb5q2CpF9sHDDj0/eJfzA1AAAAAAD+////kqnvuD+I8rLf8eELSAqvqBiEy5+IpOKpn/acu+gs0E8BAAAAAP7///8CAA4nBwAAAAAWABStYQVCeoRPwINTcqOPmDkTReYZVbjCyQEAAAAAIlEgDTyyEUjN1Oyxc6Z5xifyM3Kamy+Hrt0UdV86CeDMvf8AAAAAAAEAfQIAAAABRL1RocN1LnP4aONGuWFAJm0+Hej0SWAqlSlJ9caTP/gBAAAAAP7///8CAOH1BQAAAAAiUSBCFZNDTJDvmyVvyzL/thnwUyHGSdn0HDwInUIk/SHzmc4uGh4BAAAAFgAU1ZjhFjq1hmtoVb2+6O7jHrtqYsDLAAAAAQErAOH1BQAAAAAiUSBCFZNDTJDvmyVvyzL/thnwUyHGSdn0HDwInUIk/SHzmQEIQwFBApOkiV6PkijNENaddILURidJhTlnK3EnYT1zPnksBel0HHz4TyPDhF3VJA0RG480dr0yAy1l1agcbyZFKduv9QEAAQB9AgAAAAHAZTBGsZCcDWelfgWdOmyiG+atgqRfbBww49P3iX8wNQEAAAAA/v///wK1PR8bAQAAABYAFDhlMpnWgXEd50FaGfNOKhn/R/YigPD6AgAAAAAiUSA6xiC/NHQ4fWOcSAXpO++jvcaVawLYrsosvB12Urk1GcwAAAABASuA8PoCAAAAACJRIDrGIL80dDh9Y5xIBek776O9xpVrAtiuyiy8HXZSuTUZAQhDAUGRfNtYnHLUoAOM57UwVvcuqe0bUAiaO5PAnxp0AcyqdrV3d4Q8303FOCNp8SUDlbTs2idGiNqa+TCaUVQC6AmdAQAAAA==";

    // BIP-371 vector: P2TR key-only input with internal key and derivation
    const TAPROOT_01: &str = "70736274ff010052020000000127744ababf3027fe0d6cf23a96eee2efb188ef52301954585883e69b6624b2420000000000ffffffff0148e6052a01000000160014768e1eeb4cf420866033f80aceff0f9720744969000000000001012b00f2052a010000002251205a2c2cf5b52cf31f83ad2e8da63ff03183ecd8f609c7510ae8a48e03910a07572116fe349064c98d6e2a853fa3c9b12bd8b304a19c195c60efa7ee2393046d3fa2321900772b2da75600008001000080000000800100000000000000011720fe349064c98d6e2a853fa3c9b12bd8b304a19c195c60efa7ee2393046d3fa232002202036b772a6db74d8753c98a827958de6c78ab3312109f37d3e0304484242ece73d818772b2da7540000800100008000000080000000000000000000";

    #[test]
    fn parse_serialize_roundtrip() {
        for text in &[B64PSBT, B64SIGNED] {
            let psbt: Psbt = text.parse().unwrap();
            assert_eq!(&psbt.to_string(), text);
        }
    }

    #[test]
    fn hex_form_accepted() {
        let psbt: Psbt = TAPROOT_01.parse().unwrap();
        assert_eq!(hex::encode(psbt.serialize()), TAPROOT_01);
        assert_eq!(psbt.inputs.len(), 1);
        let inp = &psbt.inputs[0];
        assert!(inp.tap_internal_key.is_some());
        assert_eq!(inp.tap_bip32_derivations.len(), 1);
        let (xonly, (leaf_hashes, derivation)) = &inp.tap_bip32_derivations[0];
        assert_eq!(xonly, inp.tap_internal_key.as_ref().unwrap());
        assert!(leaf_hashes.is_empty());
        assert_eq!(derivation.to_string(), "772b2da7/86h/1h/0h/1/0");
        // the change output is plain p2wpkh with a normal derivation
        assert_eq!(psbt.outputs.len(), 1);
        assert!(psbt.outputs[0].tap_internal_key.is_none());
        assert_eq!(psbt.outputs[0].bip32_derivations.len(), 1);
        assert_eq!(
            psbt.outputs[0].bip32_derivations[0].1.to_string(),
            "772b2da7/84h/1h/0h/0/0"
        );
    }

    #[test]
    fn psbt_structure() {
        let psbt: Psbt = B64PSBT.parse().unwrap();
        assert_eq!(psbt.version, 0);
        assert_eq!(psbt.inputs.len(), 2);
        assert_eq!(psbt.outputs.len(), 2);
        for i in 0..2 {
            let utxo = psbt.utxo(i).unwrap();
            assert_eq!(
                utxo.script_pubkey.script_type(),
                Some(ScriptType::P2tr)
            );
        }
        // fee = inputs - outputs
        let fee = psbt.fee().unwrap();
        assert_eq!(fee, 100_000_000 + 50_000_000 - 120_000_000 - 29_999_800);
    }

    #[test]
    fn signed_vector_verifies() {
        // verify the reference schnorr signatures against our taproot
        // sighash computation and the tweaked derived keys
        let unsigned: Psbt = B64PSBT.parse().unwrap();
        let signed: Psbt = B64SIGNED.parse().unwrap();
        let root: HDKey = ROOT_KEY.parse().unwrap();
        let tx = unsigned.tx.as_ref().unwrap();
        let spent: Vec<TxOut> = (0..2).map(|i| unsigned.utxo(i).unwrap().clone()).collect();

        for i in 0..2 {
            let witness = signed.inputs[i].final_scriptwitness.as_ref().unwrap();
            let item = &witness.items()[0];
            assert_eq!(item.len(), 65);
            let mut sig = [0u8; 64];
            sig.copy_from_slice(&item[..64]);
            let sig = SchnorrSig::parse(&sig).unwrap();
            let sighash = SigHashType(item[64] as u32);
            let digest = tx.sighash_taproot(i, &spent, sighash, None).unwrap();

            // the output key committed in the utxo verifies the signature
            let mut xonly = [0u8; 32];
            xonly.copy_from_slice(&spent[i].script_pubkey.as_bytes()[2..]);
            let output_key = PublicKey::from_xonly(&xonly).unwrap();
            assert!(output_key.schnorr_verify(&sig, &digest));

            // and it is the taproot tweak of the derived internal key
            let derived = root.derive(&[0, i as u32][..]).unwrap();
            let tweaked = derived.taproot_tweak(b"").unwrap();
            assert_eq!(tweaked.public_key().xonly(), xonly);
        }
    }

    #[test]
    fn sign_with_taproot_derivations() {
        // attach tap derivations to the unsigned vector and sign with the
        // root; signatures must verify against the reference sighash
        let mut psbt: Psbt = B64PSBT.parse().unwrap();
        let root: HDKey = ROOT_KEY.parse().unwrap();
        let fingerprint = root.my_fingerprint();
        for i in 0..2 {
            let derived = root.derive(&[0, i as u32][..]).unwrap();
            psbt.inputs[i].tap_bip32_derivations.push((
                derived.public_key().xonly(),
                (
                    vec![],
                    PsbtDerivation::new(fingerprint, vec![0, i as u32]),
                ),
            ));
        }
        let count = psbt.sign_with(&root, None).unwrap();
        assert_eq!(count, 2);

        let unsigned: Psbt = B64PSBT.parse().unwrap();
        let tx = unsigned.tx.as_ref().unwrap();
        let spent: Vec<TxOut> = (0..2).map(|i| unsigned.utxo(i).unwrap().clone()).collect();
        for i in 0..2 {
            let sig_bytes = psbt.inputs[i].tap_key_sig.as_ref().unwrap();
            assert_eq!(sig_bytes.len(), 64); // SIGHASH_DEFAULT: no suffix byte
            let mut sig = [0u8; 64];
            sig.copy_from_slice(sig_bytes);
            let sig = SchnorrSig::parse(&sig).unwrap();
            let digest = tx
                .sighash_taproot(i, &spent, SigHashType::DEFAULT, None)
                .unwrap();
            let mut xonly = [0u8; 32];
            xonly.copy_from_slice(&spent[i].script_pubkey.as_bytes()[2..]);
            let output_key = PublicKey::from_xonly(&xonly).unwrap();
            assert!(output_key.schnorr_verify(&sig, &digest));
        }
    }

    #[test]
    fn duplicate_keys_rejected() {
        let psbt: Psbt = B64PSBT.parse().unwrap();
        let mut data = psbt.serialize();
        // duplicate the global tx pair right after the magic
        let tx = psbt.tx.as_ref().unwrap().consensus_serialize();
        let mut pair = vec![0x01, 0x00];
        ser_string(&mut pair, &tx).unwrap();
        let mut corrupt = data[..5].to_vec();
        corrupt.extend_from_slice(&pair);
        corrupt.extend_from_slice(&pair);
        corrupt.extend_from_slice(&data.split_off(5));
        assert!(matches!(
            Psbt::parse(&corrupt),
            Err(Error::DuplicateKey(_))
        ));
    }

    #[test]
    fn unknown_fields_preserved() {
        let mut psbt: Psbt = B64PSBT.parse().unwrap();
        psbt.unknown
            .push((vec![0xF0, 0x01, 0x02], vec![0xAA, 0xBB]));
        psbt.inputs[0]
            .unknown
            .push((vec![0xF1], vec![0x01]));
        let reparsed = Psbt::parse(&psbt.serialize()).unwrap();
        assert_eq!(reparsed, psbt);
        assert_eq!(reparsed.unknown[0].1, vec![0xAA, 0xBB]);
    }

    #[test]
    fn invalid_magic() {
        assert_eq!(Psbt::parse(b"psbu\xff\x00"), Err(Error::InvalidMagic));
    }

    #[test]
    fn v2_roundtrip_and_tx_reconstruction() {
        let v0: Psbt = B64PSBT.parse().unwrap();
        let tx = v0.tx.as_ref().unwrap().clone();
        // rebuild the same content as a v2 container
        let mut v2 = Psbt {
            version: 2,
            tx: None,
            tx_version: Some(tx.version),
            fallback_locktime: Some(tx.locktime),
            tx_modifiable: None,
            xpubs: vec![],
            unknown: vec![],
            inputs: v0.inputs.clone(),
            outputs: v0.outputs.clone(),
        };
        for (i, inp) in v2.inputs.iter_mut().enumerate() {
            inp.previous_txid = Some(tx.vin[i].txid);
            inp.output_index = Some(tx.vin[i].vout);
            inp.sequence = Some(tx.vin[i].sequence);
        }
        for (i, out) in v2.outputs.iter_mut().enumerate() {
            out.amount = Some(tx.vout[i].value);
            out.script = Some(tx.vout[i].script_pubkey.clone());
        }

        let reparsed = Psbt::parse(&v2.serialize()).unwrap();
        assert_eq!(reparsed, v2);
        assert_eq!(reparsed.version, 2);
        let rebuilt = reparsed.global_tx().unwrap();
        assert_eq!(rebuilt.txid(), tx.txid());

        // and the sighash matches between the two representations
        let h0 = v0.sighash(0, SigHashType::DEFAULT, None).unwrap();
        let h2 = reparsed.sighash(0, SigHashType::DEFAULT, None).unwrap();
        assert_eq!(h0, h2);
    }

    #[test]
    fn clear_metadata_shrinks() {
        let mut psbt: Psbt = TAPROOT_01.parse().unwrap();
        let before = psbt.serialize().len();
        for inp in &mut psbt.inputs {
            inp.clear_metadata();
        }
        for out in &mut psbt.outputs {
            out.clear_metadata();
        }
        assert!(psbt.serialize().len() < before);
        assert!(psbt.inputs[0].tap_bip32_derivations.is_empty());
    }
}
