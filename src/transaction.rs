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

//! Bitcoin transactions: inputs, outputs, witness data, the segwit
//! marker/flag serialization rule and the three signature-hash algorithms
//! (legacy, BIP-143 segwit v0 and BIP-341 taproot).

use core::fmt::{self, Display, Formatter};
use core::str::FromStr;
use std::io;

use bitcoin_hashes::{sha256, Hash, HashEngine};

use crate::consensus::{self, ConsensusDecode, ConsensusEncode, VarInt};
use crate::hashes::{double_sha256, sha256 as sha256_once, tagged_hash};
use crate::script::{Script, ScriptType, Witness};

/// Transaction-level errors
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, From, Error)]
#[display(doc_comments)]
pub enum Error {
    /// input index {0} is out of range
    InvalidInputIndex(usize),

    /// output index {0} is out of range
    InvalidOutputIndex(usize),

    /// invalid segwit transaction marker or flag
    InvalidSegwitMarker,

    /// sighash type {0:#04x} is not valid for this signing algorithm
    UnsupportedSighashType(u32),

    /// taproot sighash requires the spent output for every input
    MissingSpentOutputs,

    /// consensus encoding error: {0}
    #[from]
    Consensus(consensus::Error),
}

/// Transaction identifier in display byte order (reversed relative to the
/// wire serialization)
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct Txid(pub [u8; 32]);

impl Txid {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Display for Txid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Txid {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut data = [0u8; 32];
        hex::decode_to_slice(s, &mut data)?;
        Ok(Txid(data))
    }
}

impl ConsensusEncode for Txid {
    fn consensus_encode<E: io::Write>(&self, mut e: E) -> Result<usize, consensus::Error> {
        let mut internal = self.0;
        internal.reverse();
        e.write_all(&internal)?;
        Ok(32)
    }
}

impl ConsensusDecode for Txid {
    fn consensus_decode<D: io::Read>(d: D) -> Result<Self, consensus::Error> {
        let mut data: [u8; 32] = consensus::read_array(d)?;
        data.reverse();
        Ok(Txid(data))
    }
}

/// Signature-hash type byte with its modifier bits. `0` is the taproot
/// `SIGHASH_DEFAULT`, equivalent to `ALL` but serialized as a missing byte.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct SigHashType(pub u32);

impl SigHashType {
    pub const DEFAULT: SigHashType = SigHashType(0x00);
    pub const ALL: SigHashType = SigHashType(0x01);
    pub const NONE: SigHashType = SigHashType(0x02);
    pub const SINGLE: SigHashType = SigHashType(0x03);

    pub const ANYONECANPAY: u32 = 0x80;
    /// Elements-only: commit to range & surjection proofs
    pub const RANGEPROOF: u32 = 0x40;

    /// Base algorithm with the modifier bits masked out
    pub fn base(self) -> u32 {
        self.0 & 0x03
    }

    pub fn anyone_can_pay(self) -> bool {
        self.0 & Self::ANYONECANPAY != 0
    }

    pub fn rangeproof(self) -> bool {
        self.0 & Self::RANGEPROOF != 0
    }

    pub fn as_u8(self) -> u8 {
        self.0 as u8
    }

    /// Validates the flag combination for pre-taproot signing
    pub fn check(self) -> Result<(), Error> {
        let base = self.0 & !(Self::ANYONECANPAY | Self::RANGEPROOF);
        if !(1..=3).contains(&base) {
            return Err(Error::UnsupportedSighashType(self.0));
        }
        Ok(())
    }

    /// Validates the flag for taproot signing (allows `DEFAULT`, forbids
    /// the rangeproof bit)
    pub fn check_taproot(self) -> Result<(), Error> {
        match self.0 {
            0x00 | 0x01 | 0x02 | 0x03 | 0x81 | 0x82 | 0x83 => Ok(()),
            other => Err(Error::UnsupportedSighashType(other)),
        }
    }
}

impl Default for SigHashType {
    fn default() -> Self {
        SigHashType::ALL
    }
}

/// Transaction input
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct TxIn {
    /// Spent transaction id, display byte order
    pub txid: Txid,
    /// Spent output index
    pub vout: u32,
    pub script_sig: Script,
    pub sequence: u32,
    pub witness: Witness,
}

impl TxIn {
    pub fn new(txid: Txid, vout: u32) -> TxIn {
        TxIn {
            txid,
            vout,
            script_sig: Script::default(),
            sequence: 0xFFFF_FFFF,
            witness: Witness::default(),
        }
    }

    pub fn is_segwit(&self) -> bool {
        !self.witness.is_empty()
    }

    /// Serialization without the witness, with the scriptSig replaced - the
    /// form used inside legacy signature hashes
    fn encode_for_sighash<E: io::Write>(
        &self,
        mut e: E,
        script_sig: &Script,
        sequence: u32,
    ) -> Result<usize, consensus::Error> {
        let mut len = self.txid.consensus_encode(&mut e)?;
        len += self.vout.consensus_encode(&mut e)?;
        len += script_sig.consensus_encode(&mut e)?;
        len += sequence.consensus_encode(&mut e)?;
        Ok(len)
    }
}

impl ConsensusEncode for TxIn {
    fn consensus_encode<E: io::Write>(&self, mut e: E) -> Result<usize, consensus::Error> {
        self.encode_for_sighash(&mut e, &self.script_sig, self.sequence)
    }
}

impl ConsensusDecode for TxIn {
    fn consensus_decode<D: io::Read>(mut d: D) -> Result<Self, consensus::Error> {
        Ok(TxIn {
            txid: Txid::consensus_decode(&mut d)?,
            vout: u32::consensus_decode(&mut d)?,
            script_sig: Script::consensus_decode(&mut d)?,
            sequence: u32::consensus_decode(&mut d)?,
            witness: Witness::default(),
        })
    }
}

/// Transaction output
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct TxOut {
    pub value: u64,
    pub script_pubkey: Script,
}

impl TxOut {
    pub fn new(value: u64, script_pubkey: Script) -> TxOut {
        TxOut {
            value,
            script_pubkey,
        }
    }
}

impl ConsensusEncode for TxOut {
    fn consensus_encode<E: io::Write>(&self, mut e: E) -> Result<usize, consensus::Error> {
        Ok(consensus_encode_list!(e; self.value, self.script_pubkey))
    }
}

impl ConsensusDecode for TxOut {
    fn consensus_decode<D: io::Read>(mut d: D) -> Result<Self, consensus::Error> {
        Ok(TxOut {
            value: u64::consensus_decode(&mut d)?,
            script_pubkey: Script::consensus_decode(&mut d)?,
        })
    }
}

/// Bitcoin transaction
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Transaction {
    pub version: i32,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub locktime: u32,
}

impl Default for Transaction {
    fn default() -> Self {
        Transaction {
            version: 2,
            vin: vec![],
            vout: vec![],
            locktime: 0,
        }
    }
}

impl Transaction {
    /// A transaction is serialized in segwit form if at least one input
    /// carries witness data
    pub fn is_segwit(&self) -> bool {
        self.vin.iter().any(TxIn::is_segwit)
    }

    /// Serialization without witness data (the txid-defining form)
    fn encode_legacy<E: io::Write>(&self, mut e: E) -> Result<usize, consensus::Error> {
        let mut len = self.version.consensus_encode(&mut e)?;
        len += VarInt::from(self.vin.len()).consensus_encode(&mut e)?;
        for input in &self.vin {
            len += input.consensus_encode(&mut e)?;
        }
        len += VarInt::from(self.vout.len()).consensus_encode(&mut e)?;
        for output in &self.vout {
            len += output.consensus_encode(&mut e)?;
        }
        len += self.locktime.consensus_encode(&mut e)?;
        Ok(len)
    }

    /// Double-SHA256 of the non-witness serialization, display byte order
    pub fn txid(&self) -> Txid {
        let mut data = vec![];
        self.encode_legacy(&mut data)
            .expect("in-memory encoding does not fail");
        let mut digest = double_sha256(&data);
        digest.reverse();
        Txid(digest)
    }

    /// Double-SHA256 of the full serialization (equals txid for
    /// non-segwit transactions)
    pub fn wtxid(&self) -> Txid {
        let mut digest = double_sha256(self.consensus_serialize());
        digest.reverse();
        Txid(digest)
    }

    /// Transaction weight (base size * 3 + total size)
    pub fn weight(&self) -> usize {
        let mut base = vec![];
        self.encode_legacy(&mut base).expect("in-memory encoding");
        let total = self.consensus_serialize().len();
        base.len() * 3 + total
    }

    /// Virtual size in vbytes, rounded up
    pub fn vsize(&self) -> usize {
        (self.weight() + 3) / 4
    }

    /// `SHA256` over all input outpoints (single hash; BIP-143 applies
    /// another SHA256 round on top, BIP-341 uses it as is)
    pub fn hash_prevouts(&self) -> [u8; 32] {
        let mut engine = sha256::Hash::engine();
        for input in &self.vin {
            engine.input(&input.txid.consensus_serialize());
            engine.input(&input.vout.to_le_bytes());
        }
        sha256::Hash::from_engine(engine).to_byte_array()
    }

    /// `SHA256` over all input sequence numbers
    pub fn hash_sequence(&self) -> [u8; 32] {
        let mut engine = sha256::Hash::engine();
        for input in &self.vin {
            engine.input(&input.sequence.to_le_bytes());
        }
        sha256::Hash::from_engine(engine).to_byte_array()
    }

    /// `SHA256` over all serialized outputs
    pub fn hash_outputs(&self) -> [u8; 32] {
        let mut engine = sha256::Hash::engine();
        for output in &self.vout {
            engine.input(&output.consensus_serialize());
        }
        sha256::Hash::from_engine(engine).to_byte_array()
    }

    /// Pre-segwit signature hash. `script_pubkey` is the scriptCode of the
    /// spent output. For `SIGHASH_SINGLE` with no matching output the
    /// degenerate `0x01` digest is returned, as consensus requires.
    pub fn sighash_legacy(
        &self,
        input_index: usize,
        script_pubkey: &Script,
        sighash: SigHashType,
    ) -> Result<[u8; 32], Error> {
        sighash.check()?;
        if input_index >= self.vin.len() {
            return Err(Error::InvalidInputIndex(input_index));
        }
        let base = sighash.base();
        if base == SigHashType::SINGLE.0 && input_index >= self.vout.len() {
            let mut one = [0u8; 32];
            one[31] = 0x01;
            return Ok(one);
        }

        let mut engine = sha256::Hash::engine();
        let mut hash_input = |data: &[u8]| engine.input(data);
        hash_input(&self.version.to_le_bytes());

        let empty = Script::default();
        if sighash.anyone_can_pay() {
            hash_input(&VarInt(1).consensus_serialize());
            let mut buf = vec![];
            self.vin[input_index]
                .encode_for_sighash(&mut buf, script_pubkey, self.vin[input_index].sequence)?;
            hash_input(&buf);
        } else {
            hash_input(&VarInt::from(self.vin.len()).consensus_serialize());
            for (i, input) in self.vin.iter().enumerate() {
                let mut buf = vec![];
                if i == input_index {
                    input.encode_for_sighash(&mut buf, script_pubkey, input.sequence)?;
                } else {
                    // other inputs lose their script, and with NONE/SINGLE
                    // also their sequence
                    let sequence = if base == SigHashType::NONE.0
                        || base == SigHashType::SINGLE.0
                    {
                        0
                    } else {
                        input.sequence
                    };
                    input.encode_for_sighash(&mut buf, &empty, sequence)?;
                }
                hash_input(&buf);
            }
        }

        if base == SigHashType::NONE.0 {
            hash_input(&VarInt(0).consensus_serialize());
        } else if base == SigHashType::SINGLE.0 {
            hash_input(&VarInt::from(input_index + 1).consensus_serialize());
            let null_output = TxOut::new(u64::MAX, Script::default()).consensus_serialize();
            for _ in 0..input_index {
                hash_input(&null_output);
            }
            hash_input(&self.vout[input_index].consensus_serialize());
        } else {
            hash_input(&VarInt::from(self.vout.len()).consensus_serialize());
            for output in &self.vout {
                hash_input(&output.consensus_serialize());
            }
        }
        hash_input(&self.locktime.to_le_bytes());
        hash_input(&sighash.0.to_le_bytes());

        let first = sha256::Hash::from_engine(engine).to_byte_array();
        Ok(sha256_once(first))
    }

    /// BIP-143 segwit v0 signature hash. `script_code` must already be in
    /// its scriptCode form (p2wpkh rewritten to p2pkh).
    pub fn sighash_segwit(
        &self,
        input_index: usize,
        script_code: &Script,
        value: u64,
        sighash: SigHashType,
    ) -> Result<[u8; 32], Error> {
        sighash.check()?;
        let input = self
            .vin
            .get(input_index)
            .ok_or(Error::InvalidInputIndex(input_index))?;
        let base = sighash.base();
        let zero = [0u8; 32];

        let mut engine = sha256::Hash::engine();
        engine.input(&self.version.to_le_bytes());
        if sighash.anyone_can_pay() {
            engine.input(&zero);
        } else {
            engine.input(&sha256_once(self.hash_prevouts()));
        }
        if sighash.anyone_can_pay()
            || base == SigHashType::NONE.0
            || base == SigHashType::SINGLE.0
        {
            engine.input(&zero);
        } else {
            engine.input(&sha256_once(self.hash_sequence()));
        }
        engine.input(&input.txid.consensus_serialize());
        engine.input(&input.vout.to_le_bytes());
        engine.input(&script_code.consensus_serialize());
        engine.input(&value.to_le_bytes());
        engine.input(&input.sequence.to_le_bytes());
        if base != SigHashType::NONE.0 && base != SigHashType::SINGLE.0 {
            engine.input(&sha256_once(self.hash_outputs()));
        } else if base == SigHashType::SINGLE.0 && input_index < self.vout.len() {
            engine.input(&double_sha256(
                self.vout[input_index].consensus_serialize(),
            ));
        } else {
            engine.input(&zero);
        }
        engine.input(&self.locktime.to_le_bytes());
        engine.input(&sighash.0.to_le_bytes());

        let first = sha256::Hash::from_engine(engine).to_byte_array();
        Ok(sha256_once(first))
    }

    /// BIP-341 taproot signature hash. `spent_outputs` must contain the
    /// output spent by every input of the transaction. For script-path
    /// spending pass the tapleaf hash via `leaf_hash`.
    pub fn sighash_taproot(
        &self,
        input_index: usize,
        spent_outputs: &[TxOut],
        sighash: SigHashType,
        leaf_hash: Option<[u8; 32]>,
    ) -> Result<[u8; 32], Error> {
        sighash.check_taproot()?;
        if input_index >= self.vin.len() {
            return Err(Error::InvalidInputIndex(input_index));
        }
        if spent_outputs.len() != self.vin.len() {
            return Err(Error::MissingSpentOutputs);
        }
        let base = sighash.0 & 0x03;
        let anyone_can_pay = sighash.anyone_can_pay();

        let mut msg = vec![0x00u8]; // epoch
        msg.push(sighash.as_u8());
        msg.extend_from_slice(&self.version.to_le_bytes());
        msg.extend_from_slice(&self.locktime.to_le_bytes());
        if !anyone_can_pay {
            msg.extend_from_slice(&self.hash_prevouts());
            // sha_amounts
            let mut engine = sha256::Hash::engine();
            for utxo in spent_outputs {
                engine.input(&utxo.value.to_le_bytes());
            }
            msg.extend_from_slice(&sha256::Hash::from_engine(engine).to_byte_array());
            // sha_scriptpubkeys
            let mut engine = sha256::Hash::engine();
            for utxo in spent_outputs {
                engine.input(&utxo.script_pubkey.consensus_serialize());
            }
            msg.extend_from_slice(&sha256::Hash::from_engine(engine).to_byte_array());
            msg.extend_from_slice(&self.hash_sequence());
        }
        if base != SigHashType::NONE.0 && base != SigHashType::SINGLE.0 {
            msg.extend_from_slice(&self.hash_outputs());
        }

        let ext_flag: u8 = if leaf_hash.is_some() { 1 } else { 0 };
        msg.push(ext_flag * 2); // spend_type; no annex support

        let input = &self.vin[input_index];
        if anyone_can_pay {
            msg.extend_from_slice(&input.txid.consensus_serialize());
            msg.extend_from_slice(&input.vout.to_le_bytes());
            let utxo = &spent_outputs[input_index];
            msg.extend_from_slice(&utxo.value.to_le_bytes());
            msg.extend_from_slice(&utxo.script_pubkey.consensus_serialize());
            msg.extend_from_slice(&input.sequence.to_le_bytes());
        } else {
            msg.extend_from_slice(&(input_index as u32).to_le_bytes());
        }

        if base == SigHashType::SINGLE.0 {
            let output = self
                .vout
                .get(input_index)
                .ok_or(Error::InvalidOutputIndex(input_index))?;
            msg.extend_from_slice(&sha256_once(output.consensus_serialize()));
        }

        if let Some(leaf) = leaf_hash {
            msg.extend_from_slice(&leaf);
            msg.push(0x00); // key version
            msg.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes()); // codesep position
        }

        Ok(tagged_hash("TapSighash", &msg))
    }
}

impl ConsensusEncode for Transaction {
    fn consensus_encode<E: io::Write>(&self, mut e: E) -> Result<usize, consensus::Error> {
        if !self.is_segwit() {
            return self.encode_legacy(e);
        }
        let mut len = self.version.consensus_encode(&mut e)?;
        e.write_all(&[0x00, 0x01])?; // segwit marker & flag
        len += 2;
        len += VarInt::from(self.vin.len()).consensus_encode(&mut e)?;
        for input in &self.vin {
            len += input.consensus_encode(&mut e)?;
        }
        len += VarInt::from(self.vout.len()).consensus_encode(&mut e)?;
        for output in &self.vout {
            len += output.consensus_encode(&mut e)?;
        }
        for input in &self.vin {
            len += input.witness.consensus_encode(&mut e)?;
        }
        len += self.locktime.consensus_encode(&mut e)?;
        Ok(len)
    }
}

impl ConsensusDecode for Transaction {
    fn consensus_decode<D: io::Read>(mut d: D) -> Result<Self, consensus::Error> {
        let version = i32::consensus_decode(&mut d)?;
        let mut num_vin = VarInt::consensus_decode(&mut d)?.0;
        // a zero input count marks the segwit encoding
        let is_segwit = num_vin == 0;
        if is_segwit {
            let flag = u8::consensus_decode(&mut d)?;
            if flag != 0x01 {
                return Err(consensus::Error::DataIntegrityError(
                    "invalid segwit transaction flag".to_string(),
                ));
            }
            num_vin = VarInt::consensus_decode(&mut d)?.0;
        }
        let mut vin = Vec::with_capacity(num_vin.min(0x1000) as usize);
        for _ in 0..num_vin {
            vin.push(TxIn::consensus_decode(&mut d)?);
        }
        let num_vout = VarInt::consensus_decode(&mut d)?.0;
        let mut vout = Vec::with_capacity(num_vout.min(0x1000) as usize);
        for _ in 0..num_vout {
            vout.push(TxOut::consensus_decode(&mut d)?);
        }
        if is_segwit {
            for input in &mut vin {
                input.witness = Witness::consensus_decode(&mut d)?;
            }
        }
        let locktime = u32::consensus_decode(&mut d)?;
        Ok(Transaction {
            version,
            vin,
            vout,
            locktime,
        })
    }
}

/// Selects the signing algorithm for an input based on its script
/// environment: the utxo script type, optional redeem/witness scripts
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
#[display(Debug)]
pub enum SigningMode {
    Legacy,
    SegwitV0,
    Taproot,
}

/// Infers the signing mode the way PSBT signers do: from the spent output
/// type and the presence of redeem/witness script fields
pub fn signing_mode(
    utxo_type: Option<ScriptType>,
    redeem_type: Option<ScriptType>,
    has_witness_script: bool,
    has_witness_utxo: bool,
) -> SigningMode {
    if utxo_type == Some(ScriptType::P2tr) {
        return SigningMode::Taproot;
    }
    let segwit = has_witness_script
        || has_witness_utxo
        || matches!(utxo_type, Some(ScriptType::P2wpkh) | Some(ScriptType::P2wsh))
        || matches!(redeem_type, Some(ScriptType::P2wpkh) | Some(ScriptType::P2wsh));
    if segwit {
        SigningMode::SegwitV0
    } else {
        SigningMode::Legacy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The BIP-143 "native P2WPKH" example transaction
    const BIP143_UNSIGNED_TX: &str = "0100000002fff7f7881a8099afa6940d42d1e7f6362bec38171ea3edf433541db4e4ad969f0000000000eeffffffef51e1b804cc89d182d279655c3aa89e815b1b309fe287d9b2b55d57b90ec68a0100000000ffffffff02202cb206000000001976a9148280b37df378db99f66f85c95a783a76ac7a6d5988ac9093510d000000001976a9143bde42dbee7e4dbe6a21b2d50ce2f0167faa815988ac11000000";

    fn bip143_tx() -> Transaction {
        Transaction::consensus_deserialize(hex::decode(BIP143_UNSIGNED_TX).unwrap()).unwrap()
    }

    #[test]
    fn decode_encode_roundtrip() {
        let tx = bip143_tx();
        assert_eq!(tx.version, 1);
        assert_eq!(tx.vin.len(), 2);
        assert_eq!(tx.vout.len(), 2);
        assert_eq!(tx.locktime, 17);
        assert!(!tx.is_segwit());
        assert_eq!(
            hex::encode(tx.consensus_serialize()),
            BIP143_UNSIGNED_TX
        );
    }

    #[test]
    fn bip143_sighash_vector() {
        // second input is the P2WPKH one, value 6 BTC; scriptCode is the
        // p2pkh form of the witness program
        let tx = bip143_tx();
        let script_code: Script =
            "76a9141d0f172a0ecb48aee1be1f2687d2963ae33f71a188ac".parse().unwrap();
        let sighash = tx
            .sighash_segwit(1, &script_code, 600_000_000, SigHashType::ALL)
            .unwrap();
        assert_eq!(
            hex::encode(sighash),
            "c37af31116d1b27caf68aae9e3ac82f1477929014d5b917657d0eb49478cb670"
        );
    }

    #[test]
    fn segwit_marker_rule() {
        let mut tx = bip143_tx();
        assert!(!tx.is_segwit());
        let legacy_txid = tx.txid();
        tx.vin[1].witness = Witness::new(vec![vec![0x01]]);
        assert!(tx.is_segwit());
        // txid ignores witness data
        assert_eq!(tx.txid(), legacy_txid);
        assert_ne!(tx.wtxid(), legacy_txid);
        let data = tx.consensus_serialize();
        // marker & flag right after the version
        assert_eq!(&data[4..6], &[0x00, 0x01]);
        let decoded = Transaction::consensus_deserialize(&data).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn legacy_single_out_of_range() {
        let tx = bip143_tx();
        // input 2 exists but pretend a SINGLE sighash for an input index
        // beyond outputs: craft a tx with 1 output
        let mut tx2 = tx.clone();
        tx2.vout.truncate(1);
        let digest = tx2
            .sighash_legacy(1, &Script::default(), SigHashType::SINGLE)
            .unwrap();
        let mut one = [0u8; 32];
        one[31] = 1;
        assert_eq!(digest, one);
    }

    #[test]
    fn sighash_flags_differ() {
        let tx = bip143_tx();
        let script: Script = "76a9141d0f172a0ecb48aee1be1f2687d2963ae33f71a188ac"
            .parse()
            .unwrap();
        let mut digests = std::collections::HashSet::new();
        for &flags in &[0x01u32, 0x02, 0x03, 0x81, 0x82, 0x83] {
            let d = tx
                .sighash_segwit(0, &script, 625_000_000, SigHashType(flags))
                .unwrap();
            assert!(digests.insert(d), "sighash {:#x} collided", flags);
            let d = tx
                .sighash_legacy(0, &script, SigHashType(flags))
                .unwrap();
            assert!(digests.insert(d), "legacy sighash {:#x} collided", flags);
        }
    }

    #[test]
    fn invalid_sighash_types_rejected() {
        let tx = bip143_tx();
        assert!(tx
            .sighash_legacy(0, &Script::default(), SigHashType(0x00))
            .is_err());
        assert!(tx
            .sighash_segwit(0, &Script::default(), 0, SigHashType(0x04))
            .is_err());
        let utxos = vec![
            TxOut::new(1, Script::default()),
            TxOut::new(1, Script::default()),
        ];
        assert!(tx
            .sighash_taproot(0, &utxos, SigHashType(0x41), None)
            .is_err());
    }

    #[test]
    fn taproot_sighash_needs_all_utxos() {
        let tx = bip143_tx();
        assert_eq!(
            tx.sighash_taproot(0, &[], SigHashType::DEFAULT, None),
            Err(Error::MissingSpentOutputs)
        );
    }

    #[test]
    fn signing_mode_detection() {
        use crate::script::ScriptType::*;
        assert_eq!(
            signing_mode(Some(P2tr), None, false, true),
            SigningMode::Taproot
        );
        assert_eq!(
            signing_mode(Some(P2wpkh), None, false, true),
            SigningMode::SegwitV0
        );
        assert_eq!(
            signing_mode(Some(P2sh), Some(P2wpkh), false, false),
            SigningMode::SegwitV0
        );
        assert_eq!(
            signing_mode(Some(P2pkh), None, false, false),
            SigningMode::Legacy
        );
    }
}
