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

//! Streaming PSBT processing: a seek-capable read-only view over a PSBT
//! byte stream which never materializes the container. Scopes are parsed
//! one at a time on request; signing emits key-value pairs into a separate
//! signature stream, and [`PsbtView::write_to`] re-emits the full PSBT
//! merging such extra streams in.
//!
//! The stream cursor position after any call is undefined; every operation
//! re-seeks from recorded offsets.

use std::io::{self, Read, Seek, SeekFrom, Write};

use bitcoin_hashes::{sha256, Hash, HashEngine};

use super::{
    read_string, ser_string, Error, InputScope, OutputScope, PsbtDerivation, PSBT_MAGIC,
};
use crate::bip32::HDKey;
use crate::consensus::{self, ConsensusDecode, ConsensusEncode, VarInt};
use crate::ec;
use crate::hashes::{hash160, sha256 as sha256_once};
use crate::script::{self, Script, ScriptType};
use crate::transaction::{signing_mode, SigHashType, SigningMode, TxIn, TxOut, Txid};

// v2 per-scope field codes the view reads directly
const IN_PREVIOUS_TXID: u8 = 0x0E;
const IN_OUTPUT_INDEX: u8 = 0x0F;
const IN_SEQUENCE: u8 = 0x10;
const OUT_AMOUNT: u8 = 0x03;
const OUT_SCRIPT: u8 = 0x04;
const GLOBAL_TX_VERSION: u8 = 0x02;
const GLOBAL_FALLBACK_LOCKTIME: u8 = 0x03;

/// Skips a length-prefixed string, returning the number of bytes skipped
fn skip_string<S: Read + Seek>(stream: &mut S) -> Result<u64, Error> {
    let len = VarInt::consensus_decode(&mut *stream).map_err(Error::from)?;
    stream
        .seek(SeekFrom::Current(len.0 as i64))
        .map_err(consensus::Error::from)?;
    Ok(len.len() as u64 + len.0)
}

/// Lazy view over the unsigned transaction inside a v0 PSBT. The
/// transaction is unsigned, so every input occupies exactly 41 bytes
/// (txid, vout, empty scriptSig, sequence), which makes input access O(1).
#[derive(Copy, Clone, Debug)]
pub struct GlobalTransactionView {
    offset: u64,
    version: i32,
    num_vin: u64,
    vin0_offset: u64,
    num_vout: u64,
    vout0_offset: u64,
    locktime: u32,
}

impl GlobalTransactionView {
    const LEN_VIN: u64 = 32 + 4 + 1 + 4;

    pub fn parse<S: Read + Seek>(stream: &mut S, offset: u64) -> Result<Self, Error> {
        stream
            .seek(SeekFrom::Start(offset))
            .map_err(consensus::Error::from)?;
        let version = i32::consensus_decode(&mut *stream)?;
        let num_vin = VarInt::consensus_decode(&mut *stream)?;
        let vin0_offset = offset + 4 + num_vin.len() as u64;
        stream
            .seek(SeekFrom::Start(vin0_offset + Self::LEN_VIN * num_vin.0))
            .map_err(consensus::Error::from)?;
        let num_vout = VarInt::consensus_decode(&mut *stream)?;
        let vout0_offset = vin0_offset + Self::LEN_VIN * num_vin.0 + num_vout.len() as u64;
        // skip all outputs to find the locktime
        stream
            .seek(SeekFrom::Start(vout0_offset))
            .map_err(consensus::Error::from)?;
        for _ in 0..num_vout.0 {
            Self::skip_output(stream)?;
        }
        let locktime = u32::consensus_decode(&mut *stream)?;
        Ok(GlobalTransactionView {
            offset,
            version,
            num_vin: num_vin.0,
            vin0_offset,
            num_vout: num_vout.0,
            vout0_offset,
            locktime,
        })
    }

    fn skip_output<S: Read + Seek>(stream: &mut S) -> Result<(), Error> {
        stream
            .seek(SeekFrom::Current(8))
            .map_err(consensus::Error::from)?;
        skip_string(stream)?;
        Ok(())
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn num_vin(&self) -> usize {
        self.num_vin as usize
    }

    pub fn num_vout(&self) -> usize {
        self.num_vout as usize
    }

    pub fn locktime(&self) -> u32 {
        self.locktime
    }

    pub fn vin<S: Read + Seek>(&self, stream: &mut S, index: usize) -> Result<TxIn, Error> {
        if index >= self.num_vin as usize {
            return Err(Error::InvalidScopeIndex(index));
        }
        stream
            .seek(SeekFrom::Start(self.vin0_offset + Self::LEN_VIN * index as u64))
            .map_err(consensus::Error::from)?;
        Ok(TxIn::consensus_decode(stream)?)
    }

    pub fn vout<S: Read + Seek>(&self, stream: &mut S, index: usize) -> Result<TxOut, Error> {
        if index >= self.num_vout as usize {
            return Err(Error::InvalidScopeIndex(index));
        }
        stream
            .seek(SeekFrom::Start(self.vout0_offset))
            .map_err(consensus::Error::from)?;
        for _ in 0..index {
            Self::skip_output(stream)?;
        }
        Ok(TxOut::consensus_decode(stream)?)
    }
}

/// Read-only streaming PSBT. Construction indexes the global scope; every
/// other access parses directly from the stream.
pub struct PsbtView<S: Read + Seek> {
    stream: S,
    /// Container version (0 or 2)
    pub version: u32,
    offset: u64,
    num_inputs: usize,
    num_outputs: usize,
    tx: Option<GlobalTransactionView>,
    first_scope: u64,
    tx_version: Option<i32>,
    locktime: Option<u32>,
    hash_prevouts: Option<[u8; 32]>,
    hash_sequence: Option<[u8; 32]>,
    hash_outputs: Option<[u8; 32]>,
}

impl<S: Read + Seek> PsbtView<S> {
    /// Indexes a PSBT starting at the current stream position
    pub fn view(mut stream: S) -> Result<Self, Error> {
        let offset = stream
            .stream_position()
            .map_err(consensus::Error::from)?;
        let mut magic = [0u8; 5];
        stream.read_exact(&mut magic).map_err(consensus::Error::from)?;
        if &magic != PSBT_MAGIC {
            return Err(Error::InvalidMagic);
        }
        let mut cursor = offset + PSBT_MAGIC.len() as u64;

        let mut version = 0u32;
        let mut num_inputs: Option<usize> = None;
        let mut num_outputs: Option<usize> = None;
        let mut tx: Option<GlobalTransactionView> = None;

        loop {
            let key = read_string(&mut stream)?;
            cursor += VarInt::from(key.len()).len() as u64 + key.len() as u64;
            if key.is_empty() {
                break;
            }
            match key[0] {
                0xFB if key.len() == 1 => {
                    let value = read_string(&mut stream)?;
                    cursor += VarInt::from(value.len()).len() as u64 + value.len() as u64;
                    if value.len() == 4 {
                        version =
                            u32::from_le_bytes([value[0], value[1], value[2], value[3]]);
                    }
                }
                0x04 if key.len() == 1 => {
                    let value = read_string(&mut stream)?;
                    cursor += VarInt::from(value.len()).len() as u64 + value.len() as u64;
                    num_inputs = Some(VarInt::consensus_deserialize(&value)?.0 as usize);
                }
                0x05 if key.len() == 1 => {
                    let value = read_string(&mut stream)?;
                    cursor += VarInt::from(value.len()).len() as u64 + value.len() as u64;
                    num_outputs = Some(VarInt::consensus_deserialize(&value)?.0 as usize);
                }
                0x00 if key.len() == 1 => {
                    // the global transaction: record its offset and skip it
                    let tx_len = VarInt::consensus_decode(&mut stream)?;
                    cursor += tx_len.len() as u64;
                    let tx_offset = cursor;
                    let view = GlobalTransactionView::parse(&mut stream, tx_offset)?;
                    num_inputs = Some(view.num_vin());
                    num_outputs = Some(view.num_vout());
                    tx = Some(view);
                    stream
                        .seek(SeekFrom::Start(tx_offset + tx_len.0))
                        .map_err(consensus::Error::from)?;
                    cursor += tx_len.0;
                }
                _ => {
                    cursor += skip_string(&mut stream)?;
                }
            }
        }

        if version != 2 && tx.is_none() {
            return Err(Error::MissingGlobalTx);
        }
        if version == 2 && tx.is_some() {
            return Err(Error::UnexpectedGlobalTx);
        }
        let (tx_version, locktime) = match &tx {
            Some(view) => (Some(view.version()), Some(view.locktime())),
            None => (None, None),
        };
        Ok(PsbtView {
            stream,
            version,
            offset,
            num_inputs: num_inputs.ok_or(Error::MissingGlobalField)?,
            num_outputs: num_outputs.ok_or(Error::MissingGlobalField)?,
            tx,
            first_scope: cursor,
            tx_version,
            locktime,
            hash_prevouts: None,
            hash_sequence: None,
            hash_outputs: None,
        })
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    /// The global-transaction view of a v0 container
    pub fn global_tx(&self) -> Option<&GlobalTransactionView> {
        self.tx.as_ref()
    }

    fn skip_scope(&mut self) -> Result<(), Error> {
        loop {
            let key = read_string(&mut self.stream)?;
            if key.is_empty() {
                return Ok(());
            }
            skip_string(&mut self.stream)?;
        }
    }

    /// Positions the stream at the `n`-th scope (inputs first, then
    /// outputs); `n == num_inputs + num_outputs` seeks to the end of the
    /// container
    pub fn seek_to_scope(&mut self, n: usize) -> Result<(), Error> {
        if n > self.num_inputs + self.num_outputs {
            return Err(Error::InvalidScopeIndex(n));
        }
        self.stream
            .seek(SeekFrom::Start(self.first_scope))
            .map_err(consensus::Error::from)?;
        for _ in 0..n {
            self.skip_scope()?;
        }
        Ok(())
    }

    /// Parses input scope `i`
    pub fn input(&mut self, index: usize) -> Result<InputScope, Error> {
        if index >= self.num_inputs {
            return Err(Error::InvalidScopeIndex(index));
        }
        self.seek_to_scope(index)?;
        InputScope::read_from(&mut self.stream)
    }

    /// Parses output scope `i`
    pub fn output(&mut self, index: usize) -> Result<OutputScope, Error> {
        if index >= self.num_outputs {
            return Err(Error::InvalidScopeIndex(index));
        }
        self.seek_to_scope(self.num_inputs + index)?;
        OutputScope::read_from(&mut self.stream)
    }

    /// Scans the current scope for a value with the given key prefix
    fn scope_value(
        &mut self,
        scope: usize,
        key_prefix: &[u8],
    ) -> Result<Option<Vec<u8>>, Error> {
        self.seek_to_scope(scope)?;
        loop {
            let key = read_string(&mut self.stream)?;
            if key.is_empty() {
                return Ok(None);
            }
            if key.starts_with(key_prefix) {
                return Ok(Some(read_string(&mut self.stream)?));
            }
            skip_string(&mut self.stream)?;
        }
    }

    /// Scans the global scope for a value with the given key prefix
    fn global_value(&mut self, key_prefix: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        self.stream
            .seek(SeekFrom::Start(self.offset + PSBT_MAGIC.len() as u64))
            .map_err(consensus::Error::from)?;
        loop {
            let key = read_string(&mut self.stream)?;
            if key.is_empty() {
                return Ok(None);
            }
            if key.starts_with(key_prefix) {
                return Ok(Some(read_string(&mut self.stream)?));
            }
            skip_string(&mut self.stream)?;
        }
    }

    /// Minimal input data: from the global tx (v0) or the per-scope
    /// `PREVIOUS_TXID`/`OUTPUT_INDEX`/`SEQUENCE` fields (v2)
    pub fn vin(&mut self, index: usize) -> Result<TxIn, Error> {
        if index >= self.num_inputs {
            return Err(Error::InvalidScopeIndex(index));
        }
        if let Some(tx) = self.tx {
            return tx.vin(&mut self.stream, index);
        }
        let txid_raw = self
            .scope_value(index, &[IN_PREVIOUS_TXID])?
            .ok_or(Error::MissingUtxo(index))?;
        if txid_raw.len() != 32 {
            return Err(Error::InvalidField(IN_PREVIOUS_TXID, "bad length".into()));
        }
        let mut txid = [0u8; 32];
        txid.copy_from_slice(&txid_raw);
        txid.reverse();
        let vout_raw = self
            .scope_value(index, &[IN_OUTPUT_INDEX])?
            .ok_or(Error::MissingUtxo(index))?;
        if vout_raw.len() != 4 {
            return Err(Error::InvalidField(IN_OUTPUT_INDEX, "bad length".into()));
        }
        let vout = u32::from_le_bytes([vout_raw[0], vout_raw[1], vout_raw[2], vout_raw[3]]);
        let sequence = match self.scope_value(index, &[IN_SEQUENCE])? {
            Some(raw) if raw.len() == 4 => {
                u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
            }
            _ => 0xFFFF_FFFF,
        };
        let mut txin = TxIn::new(Txid(txid), vout);
        txin.sequence = sequence;
        Ok(txin)
    }

    /// Minimal output data: from the global tx (v0) or the per-scope
    /// `AMOUNT`/`SCRIPT` fields (v2)
    pub fn vout(&mut self, index: usize) -> Result<TxOut, Error> {
        if index >= self.num_outputs {
            return Err(Error::InvalidScopeIndex(index));
        }
        if let Some(tx) = self.tx {
            return tx.vout(&mut self.stream, index);
        }
        let scope = self.num_inputs + index;
        let value_raw = self
            .scope_value(scope, &[OUT_AMOUNT])?
            .ok_or(Error::InvalidScopeIndex(index))?;
        if value_raw.len() != 8 {
            return Err(Error::InvalidField(OUT_AMOUNT, "bad length".into()));
        }
        let mut amount = [0u8; 8];
        amount.copy_from_slice(&value_raw);
        let script = self
            .scope_value(scope, &[OUT_SCRIPT])?
            .ok_or(Error::InvalidScopeIndex(index))?;
        Ok(TxOut::new(u64::from_le_bytes(amount), Script::new(script)))
    }

    /// Transaction version: from the global tx or `PSBT_GLOBAL_TX_VERSION`
    pub fn tx_version(&mut self) -> Result<i32, Error> {
        if let Some(version) = self.tx_version {
            return Ok(version);
        }
        let version = match self.global_value(&[GLOBAL_TX_VERSION])? {
            Some(raw) if raw.len() == 4 => {
                i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
            }
            _ => 0,
        };
        self.tx_version = Some(version);
        Ok(version)
    }

    pub fn locktime(&mut self) -> Result<u32, Error> {
        if let Some(locktime) = self.locktime {
            return Ok(locktime);
        }
        let locktime = match self.global_value(&[GLOBAL_FALLBACK_LOCKTIME])? {
            Some(raw) if raw.len() == 4 => {
                u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
            }
            _ => 0,
        };
        self.locktime = Some(locktime);
        Ok(locktime)
    }

    /// Single-SHA256 of all input outpoints, memoized
    pub fn hash_prevouts(&mut self) -> Result<[u8; 32], Error> {
        if let Some(hash) = self.hash_prevouts {
            return Ok(hash);
        }
        let mut engine = sha256::Hash::engine();
        for i in 0..self.num_inputs {
            let vin = self.vin(i)?;
            engine.input(&vin.txid.consensus_serialize());
            engine.input(&vin.vout.to_le_bytes());
        }
        let hash = sha256::Hash::from_engine(engine).to_byte_array();
        self.hash_prevouts = Some(hash);
        Ok(hash)
    }

    pub fn hash_sequence(&mut self) -> Result<[u8; 32], Error> {
        if let Some(hash) = self.hash_sequence {
            return Ok(hash);
        }
        let mut engine = sha256::Hash::engine();
        for i in 0..self.num_inputs {
            let vin = self.vin(i)?;
            engine.input(&vin.sequence.to_le_bytes());
        }
        let hash = sha256::Hash::from_engine(engine).to_byte_array();
        self.hash_sequence = Some(hash);
        Ok(hash)
    }

    pub fn hash_outputs(&mut self) -> Result<[u8; 32], Error> {
        if let Some(hash) = self.hash_outputs {
            return Ok(hash);
        }
        let mut engine = sha256::Hash::engine();
        for i in 0..self.num_outputs {
            let vout = self.vout(i)?;
            engine.input(&vout.consensus_serialize());
        }
        let hash = sha256::Hash::from_engine(engine).to_byte_array();
        self.hash_outputs = Some(hash);
        Ok(hash)
    }

    /// The output spent by input `i`, resolved from the input scope
    pub fn utxo(&mut self, index: usize, scope: &InputScope) -> Result<TxOut, Error> {
        if let Some(utxo) = &scope.witness_utxo {
            return Ok(utxo.clone());
        }
        if let Some(tx) = &scope.non_witness_utxo {
            let vout = self.vin(index)?.vout;
            return tx
                .vout
                .get(vout as usize)
                .cloned()
                .ok_or(Error::MissingUtxo(index));
        }
        Err(Error::MissingUtxo(index))
    }

    /// BIP-143 digest computed through the stream
    pub fn sighash_segwit(
        &mut self,
        index: usize,
        script_code: &Script,
        value: u64,
        sighash: SigHashType,
    ) -> Result<[u8; 32], Error> {
        sighash.check()?;
        if index >= self.num_inputs {
            return Err(Error::InvalidScopeIndex(index));
        }
        let base = sighash.base();
        let zero = [0u8; 32];
        let vin = self.vin(index)?;

        let mut engine = sha256::Hash::engine();
        engine.input(&self.tx_version()?.to_le_bytes());
        if sighash.anyone_can_pay() {
            engine.input(&zero);
        } else {
            let hash = self.hash_prevouts()?;
            engine.input(&sha256_once(hash));
        }
        if sighash.anyone_can_pay()
            || base == SigHashType::NONE.0
            || base == SigHashType::SINGLE.0
        {
            engine.input(&zero);
        } else {
            let hash = self.hash_sequence()?;
            engine.input(&sha256_once(hash));
        }
        engine.input(&vin.txid.consensus_serialize());
        engine.input(&vin.vout.to_le_bytes());
        engine.input(&script_code.consensus_serialize());
        engine.input(&value.to_le_bytes());
        engine.input(&vin.sequence.to_le_bytes());
        if base != SigHashType::NONE.0 && base != SigHashType::SINGLE.0 {
            let hash = self.hash_outputs()?;
            engine.input(&sha256_once(hash));
        } else if base == SigHashType::SINGLE.0 && index < self.num_outputs {
            let vout = self.vout(index)?;
            engine.input(&crate::hashes::double_sha256(vout.consensus_serialize()));
        } else {
            engine.input(&zero);
        }
        engine.input(&self.locktime()?.to_le_bytes());
        engine.input(&sighash.0.to_le_bytes());
        let first = sha256::Hash::from_engine(engine).to_byte_array();
        Ok(sha256_once(first))
    }

    /// Legacy digest computed through the stream
    pub fn sighash_legacy(
        &mut self,
        index: usize,
        script_code: &Script,
        sighash: SigHashType,
    ) -> Result<[u8; 32], Error> {
        sighash.check()?;
        if index >= self.num_inputs {
            return Err(Error::InvalidScopeIndex(index));
        }
        let base = sighash.base();
        if base == SigHashType::SINGLE.0 && index >= self.num_outputs {
            let mut one = [0u8; 32];
            one[31] = 1;
            return Ok(one);
        }
        let empty = Script::default();
        let mut engine = sha256::Hash::engine();
        engine.input(&self.tx_version()?.to_le_bytes());
        if sighash.anyone_can_pay() {
            engine.input(&VarInt(1).consensus_serialize());
            let vin = self.vin(index)?;
            let mut buf = vec![];
            vin.txid.consensus_encode(&mut buf)?;
            vin.vout.consensus_encode(&mut buf)?;
            script_code.consensus_encode(&mut buf)?;
            vin.sequence.consensus_encode(&mut buf)?;
            engine.input(&buf);
        } else {
            engine.input(&VarInt::from(self.num_inputs).consensus_serialize());
            for i in 0..self.num_inputs {
                let vin = self.vin(i)?;
                let mut buf = vec![];
                vin.txid.consensus_encode(&mut buf)?;
                vin.vout.consensus_encode(&mut buf)?;
                if i == index {
                    script_code.consensus_encode(&mut buf)?;
                    vin.sequence.consensus_encode(&mut buf)?;
                } else {
                    empty.consensus_encode(&mut buf)?;
                    let sequence = if base == SigHashType::NONE.0
                        || base == SigHashType::SINGLE.0
                    {
                        0
                    } else {
                        vin.sequence
                    };
                    sequence.consensus_encode(&mut buf)?;
                }
                engine.input(&buf);
            }
        }
        if base == SigHashType::NONE.0 {
            engine.input(&VarInt(0).consensus_serialize());
        } else if base == SigHashType::SINGLE.0 {
            engine.input(&VarInt::from(index + 1).consensus_serialize());
            let null_output = TxOut::new(u64::MAX, Script::default()).consensus_serialize();
            for _ in 0..index {
                engine.input(&null_output);
            }
            let vout = self.vout(index)?;
            engine.input(&vout.consensus_serialize());
        } else {
            engine.input(&VarInt::from(self.num_outputs).consensus_serialize());
            for i in 0..self.num_outputs {
                let vout = self.vout(i)?;
                engine.input(&vout.consensus_serialize());
            }
        }
        engine.input(&self.locktime()?.to_le_bytes());
        engine.input(&sighash.0.to_le_bytes());
        let first = sha256::Hash::from_engine(engine).to_byte_array();
        Ok(sha256_once(first))
    }

    /// BIP-341 digest; collects the spent outputs of all inputs, which is
    /// inherent to the algorithm
    pub fn sighash_taproot(
        &mut self,
        index: usize,
        sighash: SigHashType,
        leaf_hash: Option<[u8; 32]>,
    ) -> Result<[u8; 32], Error> {
        sighash.check_taproot()?;
        if index >= self.num_inputs {
            return Err(Error::InvalidScopeIndex(index));
        }
        let base = sighash.0 & 0x03;
        let anyone_can_pay = sighash.anyone_can_pay();

        let mut msg = vec![0x00u8];
        msg.push(sighash.as_u8());
        msg.extend_from_slice(&self.tx_version()?.to_le_bytes());
        msg.extend_from_slice(&self.locktime()?.to_le_bytes());
        if !anyone_can_pay {
            let prevouts = self.hash_prevouts()?;
            msg.extend_from_slice(&prevouts);
            let mut amounts = sha256::Hash::engine();
            let mut scripts = sha256::Hash::engine();
            for i in 0..self.num_inputs {
                let scope = self.input(i)?;
                let utxo = self.utxo(i, &scope)?;
                amounts.input(&utxo.value.to_le_bytes());
                scripts.input(&utxo.script_pubkey.consensus_serialize());
            }
            msg.extend_from_slice(&sha256::Hash::from_engine(amounts).to_byte_array());
            msg.extend_from_slice(&sha256::Hash::from_engine(scripts).to_byte_array());
            let sequences = self.hash_sequence()?;
            msg.extend_from_slice(&sequences);
        }
        if base != SigHashType::NONE.0 && base != SigHashType::SINGLE.0 {
            let outputs = self.hash_outputs()?;
            msg.extend_from_slice(&outputs);
        }
        let ext_flag: u8 = if leaf_hash.is_some() { 1 } else { 0 };
        msg.push(ext_flag * 2);
        if anyone_can_pay {
            let vin = self.vin(index)?;
            let scope = self.input(index)?;
            let utxo = self.utxo(index, &scope)?;
            msg.extend_from_slice(&vin.txid.consensus_serialize());
            msg.extend_from_slice(&vin.vout.to_le_bytes());
            msg.extend_from_slice(&utxo.value.to_le_bytes());
            msg.extend_from_slice(&utxo.script_pubkey.consensus_serialize());
            msg.extend_from_slice(&vin.sequence.to_le_bytes());
        } else {
            msg.extend_from_slice(&(index as u32).to_le_bytes());
        }
        if base == SigHashType::SINGLE.0 {
            if index >= self.num_outputs {
                return Err(Error::InvalidScopeIndex(index));
            }
            let vout = self.vout(index)?;
            msg.extend_from_slice(&sha256_once(vout.consensus_serialize()));
        }
        if let Some(leaf) = leaf_hash {
            msg.extend_from_slice(&leaf);
            msg.push(0x00);
            msg.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        }
        Ok(crate::hashes::tagged_hash("TapSighash", &msg))
    }

    /// Digest for input `i` with the script environment resolved from its
    /// scope
    pub fn sighash(
        &mut self,
        index: usize,
        sighash: SigHashType,
        scope: &InputScope,
        leaf_hash: Option<[u8; 32]>,
    ) -> Result<[u8; 32], Error> {
        let utxo = self.utxo(index, scope)?;
        let mode = signing_mode(
            utxo.script_pubkey.script_type(),
            scope.redeem_script.as_ref().and_then(Script::script_type),
            scope.witness_script.is_some(),
            scope.witness_utxo.is_some(),
        );
        match mode {
            SigningMode::Taproot => self.sighash_taproot(index, sighash, leaf_hash),
            SigningMode::SegwitV0 => {
                let mut script_code = scope
                    .witness_script
                    .clone()
                    .or_else(|| scope.redeem_script.clone())
                    .unwrap_or_else(|| utxo.script_pubkey.clone());
                if script_code.script_type() == Some(ScriptType::P2wpkh) {
                    script_code = script::p2pkh_from_p2wpkh(&script_code);
                }
                self.sighash_segwit(index, &script_code, utxo.value, sighash)
            }
            SigningMode::Legacy => {
                let script_code = scope
                    .redeem_script
                    .clone()
                    .unwrap_or_else(|| utxo.script_pubkey.clone());
                self.sighash_legacy(index, &script_code, sighash)
            }
        }
    }

    /// Signs input `i` with an HD root, writing the produced signature
    /// key-value pairs to `sig_stream` (without a scope separator).
    /// `extra_scope_data` supplements the read-only scope with information
    /// the wallet knows beyond the PSBT contents.
    pub fn sign_input<W: Write>(
        &mut self,
        index: usize,
        root: &HDKey,
        sig_stream: &mut W,
        sighash: Option<SigHashType>,
        extra_scope_data: Option<&InputScope>,
    ) -> Result<usize, Error> {
        if index >= self.num_inputs {
            return Err(Error::InvalidScopeIndex(index));
        }
        let mut scope = self.input(index)?;
        if let Some(extra) = extra_scope_data {
            scope.update(extra.clone());
        }
        let utxo = self.utxo(index, &scope)?;
        let is_taproot = utxo.script_pubkey.script_type() == Some(ScriptType::P2tr);
        let default = if is_taproot {
            SigHashType::DEFAULT
        } else {
            SigHashType::ALL
        };
        let inp_sighash = scope.sighash_type.unwrap_or(default);
        if let Some(requested) = sighash {
            if inp_sighash != requested {
                return Ok(0);
            }
        }

        let fingerprint = root.my_fingerprint();
        let mut counter = 0;

        if is_taproot {
            for (xonly, (leaf_hashes, derivation)) in scope.tap_bip32_derivations.clone() {
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
                    let merkle_root = scope
                        .tap_merkle_root
                        .map(|r| r.to_vec())
                        .unwrap_or_default();
                    let tweaked = ec::taproot_tweak_seckey(&seckey, &merkle_root)?;
                    let digest = self.sighash(index, inp_sighash, &scope, None)?;
                    let sig = tweaked.schnorr_sign(&digest, None);
                    let mut value = sig.serialize().to_vec();
                    if inp_sighash != SigHashType::DEFAULT {
                        value.push(inp_sighash.as_u8());
                    }
                    ser_string(&mut *sig_stream, &[super::PSBT_IN_TAP_KEY_SIG])?;
                    ser_string(&mut *sig_stream, &value)?;
                    counter += 1;
                } else {
                    for leaf in leaf_hashes {
                        let digest = self.sighash(index, inp_sighash, &scope, Some(leaf))?;
                        let sig = seckey.schnorr_sign(&digest, None);
                        let mut value = sig.serialize().to_vec();
                        if inp_sighash != SigHashType::DEFAULT {
                            value.push(inp_sighash.as_u8());
                        }
                        let mut key = vec![super::PSBT_IN_TAP_SCRIPT_SIG];
                        key.extend_from_slice(&xonly);
                        key.extend_from_slice(&leaf);
                        ser_string(&mut *sig_stream, &key)?;
                        ser_string(&mut *sig_stream, &value)?;
                        counter += 1;
                    }
                }
            }
            return Ok(counter);
        }

        for (pubkey, derivation) in scope.bip32_derivations.clone() {
            if derivation.fingerprint != fingerprint {
                continue;
            }
            let hdkey = root.derive(&derivation.derivation[..])?;
            if hdkey.public_key() != pubkey {
                return Err(Error::DerivationMismatch);
            }
            let digest = self.sighash(index, inp_sighash, &scope, None)?;
            let sig = hdkey.sign(&digest)?;
            let mut value = sig.serialize_der();
            value.push(inp_sighash.as_u8());
            let mut key = vec![super::PSBT_IN_PARTIAL_SIG];
            key.extend_from_slice(&pubkey.sec());
            ser_string(&mut *sig_stream, &key)?;
            ser_string(&mut *sig_stream, &value)?;
            counter += 1;
        }
        Ok(counter)
    }

    /// Signs input `i` with an individual private key, matching it by its
    /// pubkey/pubkey-hash occurrence in the scriptCode
    pub fn sign_input_with_key<W: Write>(
        &mut self,
        index: usize,
        seckey: &ec::PrivateKey,
        sig_stream: &mut W,
        sighash: Option<SigHashType>,
    ) -> Result<usize, Error> {
        let scope = self.input(index)?;
        let utxo = self.utxo(index, &scope)?;
        let inp_sighash = scope.sighash_type.unwrap_or(SigHashType::ALL);
        if let Some(requested) = sighash {
            if inp_sighash != requested {
                return Ok(0);
            }
        }
        let pubkey = seckey.public_key();
        let sec = pubkey.sec();
        let pkh = hash160(&sec);
        let script_code = scope
            .witness_script
            .clone()
            .or_else(|| scope.redeem_script.clone())
            .unwrap_or_else(|| utxo.script_pubkey.clone());
        let data = script_code.as_bytes();
        let in_script = data.windows(sec.len()).any(|window| window == &sec[..])
            || data.windows(20).any(|window| window == pkh);
        if !in_script {
            return Ok(0);
        }
        let digest = self.sighash(index, inp_sighash, &scope, None)?;
        let sig = seckey.sign(&digest);
        let mut value = sig.serialize_der();
        value.push(inp_sighash.as_u8());
        let mut key = vec![super::PSBT_IN_PARTIAL_SIG];
        key.extend_from_slice(&sec);
        ser_string(&mut *sig_stream, &key)?;
        ser_string(&mut *sig_stream, &value)?;
        Ok(1)
    }

    /// Signs every input, writing per-input signature pairs followed by a
    /// `0x00` scope separator to `sig_stream`
    pub fn sign_with<W: Write>(
        &mut self,
        root: &HDKey,
        sig_stream: &mut W,
        sighash: Option<SigHashType>,
    ) -> Result<usize, Error> {
        let mut counter = 0;
        for index in 0..self.num_inputs {
            counter += self.sign_input(index, root, sig_stream, sighash, None)?;
            sig_stream.write_all(&[0x00]).map_err(consensus::Error::from)?;
        }
        Ok(counter)
    }

    /// Emits a complete PSBT: global bytes verbatim, then every scope
    /// merged with the matching extra per-scope stream (e.g. signature
    /// streams produced by [`PsbtView::sign_with`]). With `compress`, key
    /// metadata is dropped from the output.
    pub fn write_to<W: Write>(
        &mut self,
        out: &mut W,
        compress: bool,
        extra_input_streams: &mut [&mut dyn Read],
        extra_output_streams: &mut [&mut dyn Read],
    ) -> Result<usize, Error> {
        // copy the global scope bytes verbatim
        self.stream
            .seek(SeekFrom::Start(self.offset))
            .map_err(consensus::Error::from)?;
        let global_len = self.first_scope - self.offset;
        let mut remaining = global_len;
        let mut buf = [0u8; 4096];
        while remaining > 0 {
            let chunk = remaining.min(buf.len() as u64) as usize;
            self.stream
                .read_exact(&mut buf[..chunk])
                .map_err(consensus::Error::from)?;
            out.write_all(&buf[..chunk]).map_err(consensus::Error::from)?;
            remaining -= chunk as u64;
        }
        let mut written = global_len as usize;

        for index in 0..self.num_inputs {
            let mut scope = self.input(index)?;
            for stream in extra_input_streams.iter_mut() {
                let extra = InputScope::read_from(&mut **stream)?;
                scope.update(extra);
            }
            if compress {
                scope.clear_metadata();
            }
            written += scope.write_to(&mut *out)?;
        }
        for index in 0..self.num_outputs {
            let mut scope = self.output(index)?;
            for stream in extra_output_streams.iter_mut() {
                let extra = OutputScope::read_from(&mut **stream)?;
                scope.update(extra);
            }
            if compress {
                scope.clear_metadata();
            }
            written += scope.write_to(&mut *out)?;
        }
        Ok(written)
    }

    /// Releases the underlying stream
    pub fn into_stream(self) -> S {
        self.stream
    }
}

/// A derivation hint that can be passed as extra scope data when the
/// wallet knows the key origins missing from the PSBT
pub fn derivation_scope(
    entries: Vec<(ec::PublicKey, PsbtDerivation)>,
) -> InputScope {
    InputScope {
        bip32_derivations: entries,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::super::Psbt;
    use super::*;
    use crate::ec::SchnorrSig;

    const B64PSBT: &str = "cHNidP8BAKYCAAAAAsBlMEaxkJwNZ6V+BZ06bKIb5q2CpF9sHDDj0/eJfzA1AAAAAAD+////kqnvuD+I8rLf8eELSAqvqBiEy5+IpOKpn/acu+gs0E8BAAAAAP7///8CAA4nBwAAAAAWABStYQVCeoRPwINTcqOPmDkTReYZVbjCyQEAAAAAIlEgDTyyEUjN1Oyxc6Z5xifyM3Kamy+Hrt0UdV86CeDMvf8AAAAAAAEAfQIAAAABRL1RocN1LnP4aONGuWFAJm0+Hej0SWAqlSlJ9caTP/gBAAAAAP7///8CAOH1BQAAAAAiUSBCFZNDTJDvmyVvyzL/thnwUyHGSdn0HDwInUIk/SHzmc4uGh4BAAAAFgAU1ZjhFjq1hmtoVb2+6O7jHrtqYsDLAAAAAQErAOH1BQAAAAAiUSBCFZNDTJDvmyVvyzL/thnwUyHGSdn0HDwInUIk/SHzmQABAH0CAAAAAcBlMEaxkJwNZ6V+BZ06bKIb5q2CpF9sHDDj0/eJfzA1AQAAAAD+////ArU9HxsBAAAAFgAUOGUymdaBcR3nQVoZ804qGf9H9iKA8PoCAAAAACJRIDrGIL80dDh9Y5xIBek776O9xpVrAtiuyiy8HXZSuTUZzAAAAAEBK4Dw+gIAAAAAIlEgOsYgvzR0OH1jnEgF6Tvvo73GlWsC2K7KLLwddlK5NRkAAAA=";
    const ROOT_KEY: &str = "tprv8ZgxMBicQKsPf27gmh4DbQqN2K6xnXA7m7AeceqQVGkRYny3X49sgcufzbJcq4k5eaGZDMijccdDzvQga2Saqd78dKqN52QwLyqgY8apX3j";

    fn view_of(data: Vec<u8>) -> PsbtView<io::Cursor<Vec<u8>>> {
        PsbtView::view(io::Cursor::new(data)).unwrap()
    }

    fn psbt_bytes() -> Vec<u8> {
        base64::decode(B64PSBT).unwrap()
    }

    #[test]
    fn view_structure() {
        let mut view = view_of(psbt_bytes());
        assert_eq!(view.version, 0);
        assert_eq!(view.num_inputs(), 2);
        assert_eq!(view.num_outputs(), 2);
        let tx = view.global_tx().unwrap();
        assert_eq!(tx.version(), 2);
        assert_eq!(tx.num_vin(), 2);
        assert_eq!(tx.num_vout(), 2);
        assert_eq!(view.tx_version().unwrap(), 2);
    }

    #[test]
    fn scopes_match_parsed_psbt() {
        let psbt = Psbt::parse(&psbt_bytes()).unwrap();
        let mut view = view_of(psbt_bytes());
        for i in 0..view.num_inputs() {
            // byte-equal re-serialization of every scope
            assert_eq!(
                view.input(i).unwrap().serialize(),
                psbt.inputs[i].serialize()
            );
        }
        for i in 0..view.num_outputs() {
            assert_eq!(
                view.output(i).unwrap().serialize(),
                psbt.outputs[i].serialize()
            );
        }
    }

    #[test]
    fn vin_vout_match_tx() {
        let psbt = Psbt::parse(&psbt_bytes()).unwrap();
        let tx = psbt.tx.as_ref().unwrap();
        let mut view = view_of(psbt_bytes());
        for i in 0..2 {
            let vin = view.vin(i).unwrap();
            assert_eq!(vin.txid, tx.vin[i].txid);
            assert_eq!(vin.vout, tx.vin[i].vout);
            assert_eq!(vin.sequence, tx.vin[i].sequence);
            let vout = view.vout(i).unwrap();
            assert_eq!(vout, tx.vout[i]);
        }
        assert!(view.vin(2).is_err());
    }

    #[test]
    fn hashes_match_transaction() {
        let psbt = Psbt::parse(&psbt_bytes()).unwrap();
        let tx = psbt.tx.as_ref().unwrap();
        let mut view = view_of(psbt_bytes());
        assert_eq!(view.hash_prevouts().unwrap(), tx.hash_prevouts());
        assert_eq!(view.hash_sequence().unwrap(), tx.hash_sequence());
        assert_eq!(view.hash_outputs().unwrap(), tx.hash_outputs());
    }

    #[test]
    fn taproot_sighash_equivalence() {
        let psbt = Psbt::parse(&psbt_bytes()).unwrap();
        let mut view = view_of(psbt_bytes());
        for i in 0..2 {
            let direct = psbt.sighash(i, SigHashType::DEFAULT, None).unwrap();
            let scope = view.input(i).unwrap();
            let streamed = view
                .sighash(i, SigHashType::DEFAULT, &scope, None)
                .unwrap();
            assert_eq!(direct, streamed);
        }
    }

    #[test]
    fn streaming_sign_and_merge() {
        let root: HDKey = ROOT_KEY.parse().unwrap();
        let fingerprint = root.my_fingerprint();

        // supplement the vector with tap derivations via extra scope data
        let mut view = view_of(psbt_bytes());
        let mut sig_stream = io::Cursor::new(vec![]);
        let mut total = 0;
        for i in 0..view.num_inputs() {
            let derived = root.derive(&[0, i as u32][..]).unwrap();
            let mut extra = InputScope::default();
            extra.tap_bip32_derivations.push((
                derived.public_key().xonly(),
                (
                    vec![],
                    PsbtDerivation::new(fingerprint, vec![0, i as u32]),
                ),
            ));
            total += view
                .sign_input(i, &root, &mut sig_stream, None, Some(&extra))
                .unwrap();
            sig_stream.write_all(&[0x00]).unwrap();
        }
        assert_eq!(total, 2);

        // the signature stream parses as per-input scopes carrying key sigs
        sig_stream.set_position(0);
        for i in 0..2 {
            let scope = InputScope::read_from(&mut sig_stream).unwrap();
            let sig_bytes = scope.tap_key_sig.expect("signature present");
            let mut sig = [0u8; 64];
            sig.copy_from_slice(&sig_bytes);
            let sig = SchnorrSig::parse(&sig).unwrap();

            // verify against the output key of the spent utxo
            let psbt = Psbt::parse(&psbt_bytes()).unwrap();
            let digest = psbt.sighash(i, SigHashType::DEFAULT, None).unwrap();
            let mut xonly = [0u8; 32];
            xonly.copy_from_slice(&psbt.utxo(i).unwrap().script_pubkey.as_bytes()[2..]);
            let output_key = ec::PublicKey::from_xonly(&xonly).unwrap();
            assert!(output_key.schnorr_verify(&sig, &digest));
        }

        // merge the signature stream back into a full PSBT
        sig_stream.set_position(0);
        let mut merged = vec![];
        let mut extra: &mut dyn Read = &mut sig_stream;
        view.write_to(&mut merged, false, std::slice::from_mut(&mut extra), &mut [])
            .unwrap();
        let merged_psbt = Psbt::parse(&merged).unwrap();
        assert!(merged_psbt.inputs[0].tap_key_sig.is_some());
        assert!(merged_psbt.inputs[1].tap_key_sig.is_some());
        // everything else round-trips
        let original = Psbt::parse(&psbt_bytes()).unwrap();
        assert_eq!(merged_psbt.tx, original.tx);
        assert_eq!(
            merged_psbt.inputs[0].witness_utxo,
            original.inputs[0].witness_utxo
        );
    }

    #[test]
    fn write_to_roundtrips_without_extras() {
        let mut view = view_of(psbt_bytes());
        let mut out = vec![];
        view.write_to(&mut out, false, &mut [], &mut []).unwrap();
        assert_eq!(out, psbt_bytes());
    }

    #[test]
    fn seek_to_end_scope() {
        let mut view = view_of(psbt_bytes());
        // seeking past the last scope is allowed (useful to detect trailing
        // garbage), one further is not
        view.seek_to_scope(4).unwrap();
        assert!(view.seek_to_scope(5).is_err());
    }
}
