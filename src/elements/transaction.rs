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

//! Elements transactions: the shared top-level shape of Bitcoin
//! transactions with confidential assets/values in outputs, pegin and
//! issuance input flags, and the split witness layout (per-input and
//! per-output witnesses after the locktime-preceding body).

use std::io;

use bitcoin_hashes::{sha256, Hash, HashEngine};

use crate::consensus::{self, ConsensusDecode, ConsensusEncode, VarInt};
use crate::hashes::{double_sha256, sha256 as sha256_once};
use crate::script::{Script, Witness};
use crate::transaction::{SigHashType, Txid};

/// Bit flagged in `vout` marking an input with an asset issuance
pub const OUTPOINT_ISSUANCE_FLAG: u32 = 1 << 31;
/// Bit flagged in `vout` marking a pegin input
pub const OUTPOINT_PEGIN_FLAG: u32 = 1 << 30;

/// Confidential or explicit 64-bit value. Explicit values are serialized
/// with a 0x01 prefix and big-endian bytes; confidential ones are 33-byte
/// Pedersen commitments.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum ConfidentialValue {
    Explicit(u64),
    Confidential([u8; 33]),
}

impl ConfidentialValue {
    pub fn explicit(&self) -> Option<u64> {
        match self {
            ConfidentialValue::Explicit(value) => Some(*value),
            ConfidentialValue::Confidential(_) => None,
        }
    }

    pub fn is_confidential(&self) -> bool {
        matches!(self, ConfidentialValue::Confidential(_))
    }

    /// Serialization as committed to by signature hashes
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            ConfidentialValue::Explicit(value) => {
                let mut data = vec![0x01];
                data.extend_from_slice(&value.to_be_bytes());
                data
            }
            ConfidentialValue::Confidential(commitment) => commitment.to_vec(),
        }
    }

    pub fn read_from<D: io::Read>(mut d: D) -> Result<Self, consensus::Error> {
        let prefix = u8::consensus_decode(&mut d)?;
        match prefix {
            0x01 => {
                let raw: [u8; 8] = consensus::read_array(&mut d)?;
                Ok(ConfidentialValue::Explicit(u64::from_be_bytes(raw)))
            }
            0x08 | 0x09 => {
                let rest: [u8; 32] = consensus::read_array(&mut d)?;
                let mut commitment = [0u8; 33];
                commitment[0] = prefix;
                commitment[1..].copy_from_slice(&rest);
                Ok(ConfidentialValue::Confidential(commitment))
            }
            other => Err(consensus::Error::DataIntegrityError(format!(
                "invalid confidential value prefix {:#04x}",
                other
            ))),
        }
    }
}

/// Explicit (0x01-prefixed) or blinded (0x0a/0x0b) 33-byte asset field
pub type Asset = [u8; 33];

fn read_asset<D: io::Read>(mut d: D) -> Result<Asset, consensus::Error> {
    let asset: [u8; 33] = consensus::read_array(&mut d)?;
    match asset[0] {
        0x01 | 0x0A | 0x0B => Ok(asset),
        other => Err(consensus::Error::DataIntegrityError(format!(
            "invalid asset prefix {:#04x}",
            other
        ))),
    }
}

/// Optional commitment inside an issuance: absent, explicit amount or a
/// value commitment
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum IssuanceAmount {
    None,
    Explicit(u64),
    Confidential([u8; 33]),
}

impl IssuanceAmount {
    fn write_to<E: io::Write>(&self, mut e: E) -> Result<usize, consensus::Error> {
        match self {
            IssuanceAmount::None => {
                e.write_all(&[0x00])?;
                Ok(1)
            }
            IssuanceAmount::Explicit(value) => {
                e.write_all(&[0x01])?;
                e.write_all(&value.to_be_bytes())?;
                Ok(9)
            }
            IssuanceAmount::Confidential(commitment) => {
                e.write_all(commitment)?;
                Ok(33)
            }
        }
    }

    fn read_from<D: io::Read>(mut d: D) -> Result<Self, consensus::Error> {
        let prefix = u8::consensus_decode(&mut d)?;
        match prefix {
            0x00 => Ok(IssuanceAmount::None),
            0x01 => {
                let raw: [u8; 8] = consensus::read_array(&mut d)?;
                Ok(IssuanceAmount::Explicit(u64::from_be_bytes(raw)))
            }
            0x08 | 0x09 => {
                let rest: [u8; 32] = consensus::read_array(&mut d)?;
                let mut commitment = [0u8; 33];
                commitment[0] = prefix;
                commitment[1..].copy_from_slice(&rest);
                Ok(IssuanceAmount::Confidential(commitment))
            }
            other => Err(consensus::Error::DataIntegrityError(format!(
                "invalid issuance commitment prefix {:#04x}",
                other
            ))),
        }
    }
}

/// Asset issuance data of an input
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct AssetIssuance {
    pub nonce: [u8; 32],
    pub entropy: [u8; 32],
    pub amount_commitment: IssuanceAmount,
    pub token_commitment: IssuanceAmount,
}

impl AssetIssuance {
    pub fn write_to<E: io::Write>(&self, mut e: E) -> Result<usize, consensus::Error> {
        e.write_all(&self.nonce)?;
        e.write_all(&self.entropy)?;
        let mut len = 64;
        len += self.amount_commitment.write_to(&mut e)?;
        len += self.token_commitment.write_to(&mut e)?;
        Ok(len)
    }

    pub fn read_from<D: io::Read>(mut d: D) -> Result<Self, consensus::Error> {
        Ok(AssetIssuance {
            nonce: consensus::read_array(&mut d)?,
            entropy: consensus::read_array(&mut d)?,
            amount_commitment: IssuanceAmount::read_from(&mut d)?,
            token_commitment: IssuanceAmount::read_from(&mut d)?,
        })
    }
}

/// Per-input witness: amount & token range proofs plus script and pegin
/// witness stacks
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct TxInWitness {
    pub amount_proof: Vec<u8>,
    pub token_proof: Vec<u8>,
    pub script_witness: Witness,
    pub pegin_witness: Witness,
}

impl TxInWitness {
    pub fn is_empty(&self) -> bool {
        self.amount_proof.is_empty()
            && self.token_proof.is_empty()
            && self.script_witness.is_empty()
            && self.pegin_witness.is_empty()
    }
}

impl ConsensusEncode for TxInWitness {
    fn consensus_encode<E: io::Write>(&self, mut e: E) -> Result<usize, consensus::Error> {
        Ok(consensus_encode_list!(e;
            self.amount_proof, self.token_proof, self.script_witness, self.pegin_witness))
    }
}

impl ConsensusDecode for TxInWitness {
    fn consensus_decode<D: io::Read>(mut d: D) -> Result<Self, consensus::Error> {
        Ok(TxInWitness {
            amount_proof: Vec::<u8>::consensus_decode(&mut d)?,
            token_proof: Vec::<u8>::consensus_decode(&mut d)?,
            script_witness: Witness::consensus_decode(&mut d)?,
            pegin_witness: Witness::consensus_decode(&mut d)?,
        })
    }
}

/// Per-output witness: surjection and range proofs
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct TxOutWitness {
    pub surjection_proof: Vec<u8>,
    pub range_proof: Vec<u8>,
}

impl TxOutWitness {
    pub fn is_empty(&self) -> bool {
        self.surjection_proof.is_empty() && self.range_proof.is_empty()
    }
}

impl ConsensusEncode for TxOutWitness {
    fn consensus_encode<E: io::Write>(&self, mut e: E) -> Result<usize, consensus::Error> {
        Ok(consensus_encode_list!(e; self.surjection_proof, self.range_proof))
    }
}

impl ConsensusDecode for TxOutWitness {
    fn consensus_decode<D: io::Read>(mut d: D) -> Result<Self, consensus::Error> {
        Ok(TxOutWitness {
            surjection_proof: Vec::<u8>::consensus_decode(&mut d)?,
            range_proof: Vec::<u8>::consensus_decode(&mut d)?,
        })
    }
}

/// Elements transaction input
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct LTxIn {
    pub txid: Txid,
    pub vout: u32,
    pub script_sig: Script,
    pub sequence: u32,
    pub is_pegin: bool,
    pub asset_issuance: Option<AssetIssuance>,
    pub witness: TxInWitness,
}

impl LTxIn {
    pub fn new(txid: Txid, vout: u32) -> LTxIn {
        LTxIn {
            txid,
            vout,
            script_sig: Script::default(),
            sequence: 0xFFFF_FFFF,
            is_pegin: false,
            asset_issuance: None,
            witness: TxInWitness::default(),
        }
    }

    pub fn has_issuance(&self) -> bool {
        self.asset_issuance.is_some()
    }

    /// `vout` with the issuance/pegin flag bits applied
    fn flagged_vout(&self) -> u32 {
        let mut vout = self.vout;
        if self.vout != 0xFFFF_FFFF {
            if self.has_issuance() {
                vout |= OUTPOINT_ISSUANCE_FLAG;
            }
            if self.is_pegin {
                vout |= OUTPOINT_PEGIN_FLAG;
            }
        }
        vout
    }
}

impl ConsensusEncode for LTxIn {
    fn consensus_encode<E: io::Write>(&self, mut e: E) -> Result<usize, consensus::Error> {
        let mut len = self.txid.consensus_encode(&mut e)?;
        len += self.flagged_vout().consensus_encode(&mut e)?;
        len += self.script_sig.consensus_encode(&mut e)?;
        len += self.sequence.consensus_encode(&mut e)?;
        if let Some(issuance) = &self.asset_issuance {
            len += issuance.write_to(&mut e)?;
        }
        Ok(len)
    }
}

impl ConsensusDecode for LTxIn {
    fn consensus_decode<D: io::Read>(mut d: D) -> Result<Self, consensus::Error> {
        let txid = Txid::consensus_decode(&mut d)?;
        let mut vout = u32::consensus_decode(&mut d)?;
        let script_sig = Script::consensus_decode(&mut d)?;
        let sequence = u32::consensus_decode(&mut d)?;
        let mut is_pegin = false;
        let mut asset_issuance = None;
        if vout != 0xFFFF_FFFF {
            is_pegin = vout & OUTPOINT_PEGIN_FLAG != 0;
            let has_issuance = vout & OUTPOINT_ISSUANCE_FLAG != 0;
            vout &= !(OUTPOINT_ISSUANCE_FLAG | OUTPOINT_PEGIN_FLAG);
            if has_issuance {
                asset_issuance = Some(AssetIssuance::read_from(&mut d)?);
            }
        }
        Ok(LTxIn {
            txid,
            vout,
            script_sig,
            sequence,
            is_pegin,
            asset_issuance,
            witness: TxInWitness::default(),
        })
    }
}

/// Elements transaction output
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct LTxOut {
    pub asset: Asset,
    pub value: ConfidentialValue,
    /// ECDH nonce commitment of blinded outputs
    pub nonce: Option<[u8; 33]>,
    pub script_pubkey: Script,
    pub witness: TxOutWitness,
}

impl LTxOut {
    pub fn new(asset: Asset, value: u64, script_pubkey: Script) -> LTxOut {
        LTxOut {
            asset,
            value: ConfidentialValue::Explicit(value),
            nonce: None,
            script_pubkey,
            witness: TxOutWitness::default(),
        }
    }

    pub fn is_blinded(&self) -> bool {
        self.value.is_confidential()
    }

    /// Whether this is the (scriptless) fee output
    pub fn is_fee(&self) -> bool {
        self.script_pubkey.is_empty() && !self.is_blinded()
    }
}

impl ConsensusEncode for LTxOut {
    fn consensus_encode<E: io::Write>(&self, mut e: E) -> Result<usize, consensus::Error> {
        e.write_all(&self.asset)?;
        let value = self.value.serialize();
        e.write_all(&value)?;
        let mut len = 33 + value.len();
        match &self.nonce {
            Some(nonce) => {
                e.write_all(nonce)?;
                len += 33;
            }
            None => {
                e.write_all(&[0x00])?;
                len += 1;
            }
        }
        len += self.script_pubkey.consensus_encode(&mut e)?;
        Ok(len)
    }
}

impl ConsensusDecode for LTxOut {
    fn consensus_decode<D: io::Read>(mut d: D) -> Result<Self, consensus::Error> {
        let asset = read_asset(&mut d)?;
        let value = ConfidentialValue::read_from(&mut d)?;
        let nonce_prefix = u8::consensus_decode(&mut d)?;
        let nonce = match nonce_prefix {
            0x00 => None,
            0x01 | 0x02 | 0x03 => {
                let rest: [u8; 32] = consensus::read_array(&mut d)?;
                let mut nonce = [0u8; 33];
                nonce[0] = nonce_prefix;
                nonce[1..].copy_from_slice(&rest);
                Some(nonce)
            }
            other => {
                return Err(consensus::Error::DataIntegrityError(format!(
                    "invalid nonce prefix {:#04x}",
                    other
                )))
            }
        };
        Ok(LTxOut {
            asset,
            value,
            nonce,
            script_pubkey: Script::consensus_decode(&mut d)?,
            witness: TxOutWitness::default(),
        })
    }
}

/// Elements transaction
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct LTransaction {
    pub version: i32,
    pub vin: Vec<LTxIn>,
    pub vout: Vec<LTxOut>,
    pub locktime: u32,
}

impl Default for LTransaction {
    fn default() -> Self {
        LTransaction {
            version: 2,
            vin: vec![],
            vout: vec![],
            locktime: 0,
        }
    }
}

impl LTransaction {
    pub fn has_witness(&self) -> bool {
        self.vin.iter().any(|vin| !vin.witness.is_empty())
            || self.vout.iter().any(|vout| !vout.witness.is_empty())
    }

    fn encode_body<E: io::Write>(
        &self,
        mut e: E,
        witness_flag: bool,
    ) -> Result<usize, consensus::Error> {
        let mut len = self.version.consensus_encode(&mut e)?;
        e.write_all(&[witness_flag as u8])?;
        len += 1;
        len += VarInt::from(self.vin.len()).consensus_encode(&mut e)?;
        for vin in &self.vin {
            len += vin.consensus_encode(&mut e)?;
        }
        len += VarInt::from(self.vout.len()).consensus_encode(&mut e)?;
        for vout in &self.vout {
            len += vout.consensus_encode(&mut e)?;
        }
        len += self.locktime.consensus_encode(&mut e)?;
        Ok(len)
    }

    /// Txid commits to the witnessless serialization with a zero flag
    pub fn txid(&self) -> Txid {
        let mut data = vec![];
        self.encode_body(&mut data, false)
            .expect("in-memory encoding");
        let mut digest = double_sha256(&data);
        digest.reverse();
        Txid(digest)
    }

    /// Explicit fee of the transaction (the sum of fee outputs)
    pub fn fee(&self) -> u64 {
        self.vout
            .iter()
            .filter(|vout| vout.is_fee())
            .filter_map(|vout| vout.value.explicit())
            .sum()
    }

    pub fn hash_prevouts(&self) -> [u8; 32] {
        let mut engine = sha256::Hash::engine();
        for vin in &self.vin {
            engine.input(&vin.txid.consensus_serialize());
            engine.input(&vin.flagged_vout().to_le_bytes());
        }
        sha256::Hash::from_engine(engine).to_byte_array()
    }

    pub fn hash_sequence(&self) -> [u8; 32] {
        let mut engine = sha256::Hash::engine();
        for vin in &self.vin {
            engine.input(&vin.sequence.to_le_bytes());
        }
        sha256::Hash::from_engine(engine).to_byte_array()
    }

    /// Per-input issuance hash: serialized issuance, or a single zero byte
    /// for inputs without one
    pub fn hash_issuances(&self) -> [u8; 32] {
        let mut engine = sha256::Hash::engine();
        for vin in &self.vin {
            match &vin.asset_issuance {
                Some(issuance) => {
                    let mut data = vec![];
                    issuance.write_to(&mut data).expect("in-memory encoding");
                    engine.input(&data);
                }
                None => engine.input(&[0x00]),
            }
        }
        sha256::Hash::from_engine(engine).to_byte_array()
    }

    /// `rangeproof`: include the output witnesses, as required when the
    /// `SIGHASH_RANGEPROOF` bit is signed
    pub fn hash_outputs(&self, rangeproof: bool) -> [u8; 32] {
        let mut engine = sha256::Hash::engine();
        for vout in &self.vout {
            engine.input(&vout.consensus_serialize());
            if rangeproof {
                engine.input(&vout.witness.consensus_serialize());
            }
        }
        sha256::Hash::from_engine(engine).to_byte_array()
    }

    /// Elements BIP-143 style signature hash; `value` is the serialized
    /// confidential or explicit value of the spent output
    pub fn sighash_segwit(
        &self,
        input_index: usize,
        script_code: &Script,
        value: &ConfidentialValue,
        sighash: SigHashType,
    ) -> Result<[u8; 32], crate::transaction::Error> {
        if input_index >= self.vin.len() {
            return Err(crate::transaction::Error::InvalidInputIndex(input_index));
        }
        let base = sighash.base();
        let anyone_can_pay = sighash.anyone_can_pay();
        let zero = [0u8; 32];
        let vin = &self.vin[input_index];

        let mut engine = sha256::Hash::engine();
        engine.input(&self.version.to_le_bytes());
        if anyone_can_pay {
            engine.input(&zero);
        } else {
            engine.input(&sha256_once(self.hash_prevouts()));
        }
        if anyone_can_pay || base == SigHashType::NONE.0 || base == SigHashType::SINGLE.0 {
            engine.input(&zero);
        } else {
            engine.input(&sha256_once(self.hash_sequence()));
        }
        if anyone_can_pay {
            engine.input(&zero);
        } else {
            engine.input(&sha256_once(self.hash_issuances()));
        }
        engine.input(&vin.txid.consensus_serialize());
        engine.input(&vin.flagged_vout().to_le_bytes());
        engine.input(&script_code.consensus_serialize());
        engine.input(&value.serialize());
        engine.input(&vin.sequence.to_le_bytes());
        if let Some(issuance) = &vin.asset_issuance {
            let mut data = vec![];
            issuance.write_to(&mut data)?;
            engine.input(&data);
        }
        if base != SigHashType::NONE.0 && base != SigHashType::SINGLE.0 {
            engine.input(&sha256_once(self.hash_outputs(sighash.rangeproof())));
        } else if base == SigHashType::SINGLE.0 && input_index < self.vout.len() {
            let mut data = self.vout[input_index].consensus_serialize();
            if sighash.rangeproof() {
                data.extend_from_slice(&self.vout[input_index].witness.consensus_serialize());
            }
            engine.input(&double_sha256(&data));
        } else {
            engine.input(&zero);
        }
        engine.input(&self.locktime.to_le_bytes());
        engine.input(&sighash.0.to_le_bytes());
        let first = sha256::Hash::from_engine(engine).to_byte_array();
        Ok(sha256_once(first))
    }
}

impl ConsensusEncode for LTransaction {
    fn consensus_encode<E: io::Write>(&self, mut e: E) -> Result<usize, consensus::Error> {
        let has_witness = self.has_witness();
        let mut len = self.encode_body(&mut e, has_witness)?;
        if has_witness {
            for vin in &self.vin {
                len += vin.witness.consensus_encode(&mut e)?;
            }
            for vout in &self.vout {
                len += vout.witness.consensus_encode(&mut e)?;
            }
        }
        Ok(len)
    }
}

impl ConsensusDecode for LTransaction {
    fn consensus_decode<D: io::Read>(mut d: D) -> Result<Self, consensus::Error> {
        let version = i32::consensus_decode(&mut d)?;
        let flag = u8::consensus_decode(&mut d)?;
        let has_witness = match flag {
            0x00 => false,
            0x01 => true,
            other => {
                return Err(consensus::Error::DataIntegrityError(format!(
                    "invalid elements witness flag {:#04x}",
                    other
                )))
            }
        };
        let num_vin = VarInt::consensus_decode(&mut d)?.0;
        let mut vin = Vec::with_capacity(num_vin.min(0x1000) as usize);
        for _ in 0..num_vin {
            vin.push(LTxIn::consensus_decode(&mut d)?);
        }
        let num_vout = VarInt::consensus_decode(&mut d)?.0;
        let mut vout = Vec::with_capacity(num_vout.min(0x1000) as usize);
        for _ in 0..num_vout {
            vout.push(LTxOut::consensus_decode(&mut d)?);
        }
        let locktime = u32::consensus_decode(&mut d)?;
        if has_witness {
            for input in &mut vin {
                input.witness = TxInWitness::consensus_decode(&mut d)?;
            }
            for output in &mut vout {
                output.witness = TxOutWitness::consensus_decode(&mut d)?;
            }
        }
        Ok(LTransaction {
            version,
            vin,
            vout,
            locktime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn explicit_asset(tag: u8) -> Asset {
        let mut asset = [tag; 33];
        asset[0] = 0x01;
        asset
    }

    fn sample_tx() -> LTransaction {
        let mut tx = LTransaction::default();
        tx.vin.push(LTxIn::new(Txid([0x11; 32]), 1));
        tx.vout.push(LTxOut::new(
            explicit_asset(0xAA),
            90_000,
            Script::new(vec![0x00, 0x14, 0x22, 0x33]),
        ));
        // fee output: explicit value, empty script
        tx.vout
            .push(LTxOut::new(explicit_asset(0xAA), 500, Script::default()));
        tx
    }

    #[test]
    fn roundtrip_without_witness() {
        let tx = sample_tx();
        let data = tx.consensus_serialize();
        // version || zero witness flag
        assert_eq!(data[4], 0x00);
        let decoded = LTransaction::consensus_deserialize(&data).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(tx.fee(), 500);
    }

    #[test]
    fn roundtrip_with_witness_and_blinding() {
        let mut tx = sample_tx();
        tx.vin[0].witness.script_witness =
            Witness::new(vec![vec![0x01, 0x02], vec![0x03]]);
        tx.vout[0].value = ConfidentialValue::Confidential({
            let mut c = [0x08; 33];
            c[0] = 0x08;
            c
        });
        tx.vout[0].nonce = Some({
            let mut n = [0x02; 33];
            n[0] = 0x02;
            n
        });
        tx.vout[0].witness.range_proof = vec![0xAB; 10];
        let data = tx.consensus_serialize();
        assert_eq!(data[4], 0x01);
        let decoded = LTransaction::consensus_deserialize(&data).unwrap();
        assert_eq!(decoded, tx);
        // txid ignores witness data
        let mut stripped = tx.clone();
        stripped.vin[0].witness = TxInWitness::default();
        stripped.vout[0].witness = TxOutWitness::default();
        assert_eq!(tx.txid(), stripped.txid());
    }

    #[test]
    fn issuance_and_pegin_flags() {
        let mut tx = sample_tx();
        tx.vin[0].is_pegin = true;
        tx.vin[0].asset_issuance = Some(AssetIssuance {
            nonce: [0u8; 32],
            entropy: [0x42; 32],
            amount_commitment: IssuanceAmount::Explicit(1000),
            token_commitment: IssuanceAmount::None,
        });
        let data = tx.consensus_serialize();
        let decoded = LTransaction::consensus_deserialize(&data).unwrap();
        assert_eq!(decoded, tx);
        assert!(decoded.vin[0].is_pegin);
        assert!(decoded.vin[0].has_issuance());
        assert_eq!(decoded.vin[0].vout, 1); // flag bits stripped
    }

    #[test]
    fn sighash_commits_to_issuances_and_values() {
        let tx = sample_tx();
        let script: Script = "76a914222222222222222222222222222222222222222288ac"
            .parse()
            .unwrap();
        let value = ConfidentialValue::Explicit(100_000);
        let h1 = tx
            .sighash_segwit(0, &script, &value, SigHashType::ALL)
            .unwrap();
        // different explicit value changes the digest
        let h2 = tx
            .sighash_segwit(0, &script, &ConfidentialValue::Explicit(1), SigHashType::ALL)
            .unwrap();
        assert_ne!(h1, h2);

        // an issuance changes the digest too
        let mut tx2 = tx.clone();
        tx2.vin[0].asset_issuance = Some(AssetIssuance {
            nonce: [0u8; 32],
            entropy: [0x01; 32],
            amount_commitment: IssuanceAmount::Explicit(5),
            token_commitment: IssuanceAmount::None,
        });
        let h3 = tx2
            .sighash_segwit(0, &script, &value, SigHashType::ALL)
            .unwrap();
        assert_ne!(h1, h3);

        // the rangeproof bit commits to output witnesses
        let mut tx3 = tx.clone();
        tx3.vout[0].witness.range_proof = vec![0x01];
        let h_plain = tx3
            .sighash_segwit(0, &script, &value, SigHashType::ALL)
            .unwrap();
        let h_rp = tx3
            .sighash_segwit(
                0,
                &script,
                &value,
                SigHashType(SigHashType::ALL.0 | SigHashType::RANGEPROOF),
            )
            .unwrap();
        assert_ne!(h_plain, h_rp);
        assert_eq!(h_plain, h1); // witness is outside the plain digest
    }
}
