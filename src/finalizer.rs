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

//! Finalizer: turns fully-signed PSBT inputs into final scriptSig/witness
//! data and extracts the broadcastable transaction.
//!
//! Directly supported spend types are p2pkh, p2wpkh, p2sh-p2wpkh, bare and
//! wrapped multisig, taproot key path and single-leaf script path; for
//! arbitrary script trees a miniscript satisfier selects one satisfying
//! branch per disjunction (timelocks are assumed met, which matches the
//! semantics of signing a transaction whose locktime is already set).
//! Finalization is all-or-nothing per input.

use crate::ec::PublicKey;
use crate::psbt::{self, InputScope, Psbt};
use crate::descriptor::miniscript::Miniscript;
use crate::script::{self, op, push_data, Script, ScriptType, Witness};
use crate::transaction::Transaction;

/// Finalization errors
#[derive(Clone, PartialEq, Eq, Debug, Display, From, Error)]
#[display(doc_comments)]
pub enum Error {
    /// input {0} does not have enough signatures to be finalized
    IncompleteSignatures(usize),

    /// input {0} misses the redeem/witness script required by its type
    MissingScript(usize),

    /// input {0} has an unsupported script type
    UnsupportedScriptType(usize),

    /// satisfier requires a preimage which PSBTs do not carry
    MissingPreimage,

    /// fragment cannot be dissatisfied
    CannotDissatisfy,

    /// PSBT error: {0}
    #[from]
    Psbt(psbt::Error),
}

/// Witness stack items satisfying a miniscript (bottom of the stack
/// first). Sources signatures from the PSBT partial-signature map.
pub struct Satisfier<'a> {
    pub partial_sigs: &'a [(PublicKey, Vec<u8>)],
}

impl<'a> Satisfier<'a> {
    fn sig_for(&self, sec: &[u8]) -> Option<Vec<u8>> {
        self.partial_sigs
            .iter()
            .find(|(pubkey, _)| pubkey.sec() == sec)
            .map(|(_, sig)| sig.clone())
    }

    /// Produces a satisfaction for the node, or an error when signatures
    /// are missing
    pub fn satisfy(&self, ms: &Miniscript) -> Result<Vec<Vec<u8>>, Error> {
        use Miniscript::*;
        Ok(match ms {
            Pk(key) => vec![self.sig_for(&key.sec()).ok_or(Error::MissingPreimage)?],
            Pkh(kh) => {
                let key = kh.key().ok_or(Error::MissingPreimage)?;
                let sig = self.sig_for(&key.sec()).ok_or(Error::MissingPreimage)?;
                vec![sig, key.sec()]
            }
            C(inner) => match inner.as_ref() {
                PkK(key) => vec![self.sig_for(&key.sec()).ok_or(Error::MissingPreimage)?],
                PkH(kh) => {
                    let key = kh.key().ok_or(Error::MissingPreimage)?;
                    let sig = self.sig_for(&key.sec()).ok_or(Error::MissingPreimage)?;
                    vec![sig, key.sec()]
                }
                other => self.satisfy(other)?,
            },
            Older(_) | After(_) => vec![], // locktime assumed satisfied
            Sha256(_) | Hash256(_) | Ripemd160(_) | Hash160(_) => {
                return Err(Error::MissingPreimage)
            }
            AndV(x, y) | AndB(x, y) => {
                let mut items = self.satisfy(y)?;
                items.extend(self.satisfy(x)?);
                items
            }
            AndOr(x, y, z) => match self.satisfy(x) {
                Ok(sat_x) => {
                    let mut items = self.satisfy(y)?;
                    items.extend(sat_x);
                    items
                }
                Err(_) => {
                    let mut items = self.satisfy(z)?;
                    items.extend(self.dissatisfy(x)?);
                    items
                }
            },
            OrB(x, z) => match self.satisfy(x) {
                Ok(sat_x) => {
                    let mut items = self.dissatisfy(z)?;
                    items.extend(sat_x);
                    items
                }
                Err(_) => {
                    let mut items = self.satisfy(z)?;
                    items.extend(self.dissatisfy(x)?);
                    items
                }
            },
            OrC(x, z) | OrD(x, z) => match self.satisfy(x) {
                Ok(sat_x) => sat_x,
                Err(_) => {
                    let mut items = self.satisfy(z)?;
                    items.extend(self.dissatisfy(x)?);
                    items
                }
            },
            OrI(x, z) => match self.satisfy(x) {
                Ok(mut sat_x) => {
                    sat_x.push(vec![0x01]);
                    sat_x
                }
                Err(_) => {
                    let mut items = self.satisfy(z)?;
                    items.push(vec![]);
                    items
                }
            },
            Thresh(k, subs) => {
                // greedily satisfy the first k satisfiable children
                let mut parts: Vec<Vec<Vec<u8>>> = Vec::with_capacity(subs.len());
                let mut satisfied = 0usize;
                for sub in subs {
                    if satisfied < k.0 as usize {
                        if let Ok(sat) = self.satisfy(sub) {
                            parts.push(sat);
                            satisfied += 1;
                            continue;
                        }
                    }
                    parts.push(self.dissatisfy(sub)?);
                }
                if satisfied < k.0 as usize {
                    return Err(Error::MissingPreimage);
                }
                // stack order: last child consumed last
                let mut items = vec![];
                for part in parts.into_iter().rev() {
                    items.extend(part);
                }
                items
            }
            Multi(k, keys) | SortedMulti(k, keys) => {
                let mut ordered: Vec<&crate::descriptor::Key> = keys.iter().collect();
                if matches!(ms, SortedMulti(..)) {
                    ordered.sort_by_key(|key| key.sec());
                }
                let mut sigs = vec![];
                for key in ordered {
                    if sigs.len() == k.0 as usize {
                        break;
                    }
                    if let Some(sig) = self.sig_for(&key.sec()) {
                        sigs.push(sig);
                    }
                }
                if sigs.len() < k.0 as usize {
                    return Err(Error::MissingPreimage);
                }
                // CHECKMULTISIG off-by-one dummy at the stack bottom
                let mut items = vec![vec![]];
                items.extend(sigs);
                items
            }
            MultiA(k, keys) | SortedMultiA(k, keys) => {
                let mut ordered: Vec<&crate::descriptor::Key> = keys.iter().collect();
                if matches!(ms, SortedMultiA(..)) {
                    ordered.sort_by_key(|key| key.sec());
                }
                let mut slots: Vec<Vec<u8>> = vec![];
                let mut count = 0usize;
                for key in &ordered {
                    match self.sig_for(&key.sec()) {
                        Some(sig) if count < k.0 as usize => {
                            slots.push(sig);
                            count += 1;
                        }
                        _ => slots.push(vec![]),
                    }
                }
                if count < k.0 as usize {
                    return Err(Error::MissingPreimage);
                }
                // first key's slot must end on the stack top
                slots.reverse();
                slots
            }
            A(x) | S(x) | T(x) | N(x) | V(x) => self.satisfy(x)?,
            D(x) => {
                let mut items = self.satisfy(x)?;
                items.push(vec![0x01]);
                items
            }
            J(x) => self.satisfy(x)?,
            L(x) => {
                let mut items = self.satisfy(x)?;
                items.push(vec![]);
                items
            }
            U(x) => {
                let mut items = self.satisfy(x)?;
                items.push(vec![0x01]);
                items
            }
            PkK(_) | PkH(_) => return Err(Error::MissingPreimage),
        })
    }

    /// Produces a canonical dissatisfaction of a `d`-typed node
    pub fn dissatisfy(&self, ms: &Miniscript) -> Result<Vec<Vec<u8>>, Error> {
        use Miniscript::*;
        Ok(match ms {
            Pk(_) => vec![vec![]],
            Pkh(kh) => {
                let key = kh.key().ok_or(Error::CannotDissatisfy)?;
                vec![vec![], key.sec()]
            }
            C(inner) => match inner.as_ref() {
                PkK(_) => vec![vec![]],
                PkH(kh) => {
                    let key = kh.key().ok_or(Error::CannotDissatisfy)?;
                    vec![vec![], key.sec()]
                }
                other => self.dissatisfy(other)?,
            },
            Sha256(_) | Hash256(_) | Ripemd160(_) | Hash160(_) => vec![vec![0u8; 32]],
            AndB(x, y) => {
                let mut items = self.dissatisfy(y)?;
                items.extend(self.dissatisfy(x)?);
                items
            }
            AndOr(x, _, z) => {
                let mut items = self.dissatisfy(z)?;
                items.extend(self.dissatisfy(x)?);
                items
            }
            OrB(x, z) | OrD(x, z) => {
                let mut items = self.dissatisfy(z)?;
                items.extend(self.dissatisfy(x)?);
                items
            }
            OrI(x, z) => match self.dissatisfy(x) {
                Ok(mut items) => {
                    items.push(vec![0x01]);
                    items
                }
                Err(_) => {
                    let mut items = self.dissatisfy(z)?;
                    items.push(vec![]);
                    items
                }
            },
            Thresh(_, subs) => {
                let mut items = vec![];
                for sub in subs.iter().rev() {
                    items.extend(self.dissatisfy(sub)?);
                }
                items
            }
            Multi(k, _) | SortedMulti(k, _) => vec![vec![]; k.0 as usize + 1],
            MultiA(_, keys) | SortedMultiA(_, keys) => vec![vec![]; keys.len()],
            A(x) | S(x) | J(x) => self.dissatisfy(x)?,
            D(_) => vec![vec![]],
            L(_) => vec![vec![0x01]],
            U(_) => vec![vec![]],
            AndV(..) | OrC(..) | Older(_) | After(_) | PkK(_) | PkH(_) | T(_) | V(_)
            | N(_) => return Err(Error::CannotDissatisfy),
        })
    }
}

/// Parses an `OP_m <pk>... OP_n OP_CHECKMULTISIG` script
fn parse_multisig(script: &Script) -> Option<(usize, Vec<PublicKey>)> {
    let data = script.as_bytes();
    if data.len() < 4 || *data.last()? != op::OP_CHECKMULTISIG {
        return None;
    }
    let m = data[0].checked_sub(op::OP_1 - 1)? as usize;
    let n = data[data.len() - 2].checked_sub(op::OP_1 - 1)? as usize;
    if m == 0 || m > 16 || n == 0 || n > 16 || m > n {
        return None;
    }
    let mut keys = vec![];
    let mut pos = 1;
    while pos < data.len() - 2 {
        let len = data[pos] as usize;
        if len != 33 && len != 65 {
            return None;
        }
        if pos + 1 + len > data.len() - 2 {
            return None;
        }
        keys.push(PublicKey::parse(&data[pos + 1..pos + 1 + len]).ok()?);
        pos += 1 + len;
    }
    if keys.len() != n {
        return None;
    }
    Some((m, keys))
}

/// Witness/scriptSig items for a multisig script from the PSBT partial
/// signatures, in key order, dummy first
fn satisfy_multisig(
    index: usize,
    script: &Script,
    partial_sigs: &[(PublicKey, Vec<u8>)],
) -> Result<Vec<Vec<u8>>, Error> {
    let (m, keys) = parse_multisig(script).ok_or(Error::UnsupportedScriptType(index))?;
    let mut items = vec![vec![]];
    for key in &keys {
        if items.len() == m + 1 {
            break;
        }
        if let Some((_, sig)) = partial_sigs.iter().find(|(pk, _)| pk == key) {
            items.push(sig.clone());
        }
    }
    if items.len() < m + 1 {
        return Err(Error::IncompleteSignatures(index));
    }
    Ok(items)
}

/// Builds a scriptSig from stack items (signatures/pubkeys/script pushes)
fn script_sig_from_items(items: &[Vec<u8>]) -> Script {
    let mut data = vec![];
    for item in items {
        if item.is_empty() {
            data.push(op::OP_0);
        } else {
            push_data(&mut data, item);
        }
    }
    Script::new(data)
}

/// Finalizes a single input scope given its spent output. An optional
/// miniscript of the leaf script enables satisfaction of arbitrary trees;
/// without it only the directly supported types are handled.
pub fn finalize_input(
    index: usize,
    scope: &mut InputScope,
    utxo_script: &Script,
    miniscript: Option<&Miniscript>,
) -> Result<(), Error> {
    if scope.final_scriptsig.is_some() || scope.final_scriptwitness.is_some() {
        return Ok(());
    }
    let script_type = utxo_script
        .script_type()
        .ok_or(Error::UnsupportedScriptType(index))?;

    match script_type {
        ScriptType::P2tr => {
            if let Some(sig) = &scope.tap_key_sig {
                scope.final_scriptwitness = Some(Witness::new(vec![sig.clone()]));
            } else if let (Some(((_, leaf_hash), sig)), false) = (
                scope.tap_script_sigs.first(),
                scope.tap_leaf_scripts.is_empty(),
            ) {
                // single-leaf script path: witness is sig, script, control
                let (control, script) = scope
                    .tap_leaf_scripts
                    .iter()
                    .find(|(_, leaf_script)| {
                        leaf_script.len() > 1
                            && crate::descriptor::taptree::tap_leaf_hash(
                                &leaf_script[..leaf_script.len() - 1],
                            ) == *leaf_hash
                    })
                    .ok_or(Error::IncompleteSignatures(index))?;
                let script_body = script[..script.len() - 1].to_vec();
                scope.final_scriptwitness = Some(Witness::new(vec![
                    sig.clone(),
                    script_body,
                    control.clone(),
                ]));
            } else {
                return Err(Error::IncompleteSignatures(index));
            }
        }
        ScriptType::P2pkh => {
            let (pubkey, sig) = scope
                .partial_sigs
                .first()
                .ok_or(Error::IncompleteSignatures(index))?;
            scope.final_scriptsig = Some(script_sig_from_items(&[
                sig.clone(),
                pubkey.sec(),
            ]));
        }
        ScriptType::P2wpkh => {
            let (pubkey, sig) = scope
                .partial_sigs
                .first()
                .ok_or(Error::IncompleteSignatures(index))?;
            scope.final_scriptwitness =
                Some(Witness::new(vec![sig.clone(), pubkey.sec()]));
        }
        ScriptType::P2sh => {
            let redeem = scope
                .redeem_script
                .clone()
                .ok_or(Error::MissingScript(index))?;
            match redeem.script_type() {
                Some(ScriptType::P2wpkh) => {
                    let (pubkey, sig) = scope
                        .partial_sigs
                        .first()
                        .ok_or(Error::IncompleteSignatures(index))?;
                    scope.final_scriptwitness =
                        Some(Witness::new(vec![sig.clone(), pubkey.sec()]));
                    scope.final_scriptsig = Some(script::script_sig_p2sh(&redeem));
                }
                Some(ScriptType::P2wsh) => {
                    let witness_script = scope
                        .witness_script
                        .clone()
                        .ok_or(Error::MissingScript(index))?;
                    let mut items =
                        witness_items(index, &witness_script, scope, miniscript)?;
                    items.push(witness_script.to_bytes());
                    scope.final_scriptwitness = Some(Witness::new(items));
                    scope.final_scriptsig = Some(script::script_sig_p2sh(&redeem));
                }
                _ => {
                    // legacy p2sh: satisfaction pushes plus the script
                    let mut items = witness_items(index, &redeem, scope, miniscript)?;
                    items.push(redeem.to_bytes());
                    scope.final_scriptsig = Some(script_sig_from_items(&items));
                }
            }
        }
        ScriptType::P2wsh => {
            let witness_script = scope
                .witness_script
                .clone()
                .ok_or(Error::MissingScript(index))?;
            let mut items = witness_items(index, &witness_script, scope, miniscript)?;
            items.push(witness_script.to_bytes());
            scope.final_scriptwitness = Some(Witness::new(items));
        }
    }

    // finalized inputs drop their component fields
    scope.partial_sigs.clear();
    scope.sighash_type = None;
    scope.bip32_derivations.clear();
    scope.tap_bip32_derivations.clear();
    scope.tap_key_sig = None;
    scope.tap_script_sigs.clear();
    scope.tap_leaf_scripts.clear();
    scope.tap_internal_key = None;
    scope.tap_merkle_root = None;
    Ok(())
}

fn witness_items(
    index: usize,
    script: &Script,
    scope: &InputScope,
    miniscript: Option<&Miniscript>,
) -> Result<Vec<Vec<u8>>, Error> {
    if parse_multisig(script).is_some() {
        return satisfy_multisig(index, script, &scope.partial_sigs);
    }
    let ms = miniscript.ok_or(Error::UnsupportedScriptType(index))?;
    let satisfier = Satisfier {
        partial_sigs: &scope.partial_sigs,
    };
    satisfier
        .satisfy(ms)
        .map_err(|_| Error::IncompleteSignatures(index))
}

/// Finalizes every input of a PSBT and extracts the final transaction.
/// The optional descriptor enables miniscript satisfaction of script-path
/// inputs it owns.
pub fn finalize_psbt(psbt: &mut Psbt) -> Result<Transaction, Error> {
    finalize_psbt_with(psbt, None)
}

pub fn finalize_psbt_with(
    psbt: &mut Psbt,
    descriptor: Option<&crate::descriptor::Descriptor>,
) -> Result<Transaction, Error> {
    let mut tx = psbt.global_tx()?;
    for index in 0..psbt.inputs.len() {
        let utxo = psbt.utxo(index)?.clone();
        // resolve the concrete miniscript when the descriptor owns the input
        let derived_ms = descriptor.and_then(|descriptor| {
            let derivations: Vec<([u8; 4], Vec<u32>)> = psbt.inputs[index]
                .bip32_derivations
                .iter()
                .map(|(_, der)| (der.fingerprint, der.derivation.clone()))
                .collect();
            descriptor
                .derive_for(&utxo.script_pubkey, &derivations)
                .and_then(|derived| derived.miniscript)
        });
        let scope = &mut psbt.inputs[index];
        finalize_input(index, scope, &utxo.script_pubkey, derived_ms.as_ref())?;
        tx.vin[index].script_sig = scope.final_scriptsig.clone().unwrap_or_default();
        tx.vin[index].witness = scope.final_scriptwitness.clone().unwrap_or_default();
    }
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bip32::HDKey;
    use crate::bip39::mnemonic_to_seed;
    use crate::ec::{PrivateKey, Signature};
    use crate::psbt::PsbtDerivation;
    use crate::script::witness_p2wpkh;
    use crate::transaction::{SigHashType, TxIn, TxOut, Txid};

    fn test_root() -> HDKey {
        HDKey::from_seed(&mnemonic_to_seed(
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon \
             abandon abandon about",
            "",
        ))
        .unwrap()
    }

    /// Builds a 1-in-1-out psbt spending a p2wpkh output of the test root
    fn wpkh_psbt() -> (Psbt, HDKey, PublicKey) {
        let root = test_root();
        let account = root.derive_path("m/84h/1h/0h").unwrap();
        let child = account.derive(&[0u32, 0][..]).unwrap();
        let pubkey = child.public_key();
        let spk = script::p2wpkh(&pubkey);

        let mut tx = Transaction::default();
        tx.vin.push(TxIn::new(Txid([0x11; 32]), 0));
        tx.vout
            .push(TxOut::new(99_000, script::p2wpkh(&pubkey)));
        let mut psbt = Psbt::with_tx(tx);
        psbt.inputs[0].witness_utxo = Some(TxOut::new(100_000, spk));
        let path = vec![
            84 | crate::bip32::HARDENED_INDEX_BOUNDARY,
            1 | crate::bip32::HARDENED_INDEX_BOUNDARY,
            crate::bip32::HARDENED_INDEX_BOUNDARY,
            0,
            0,
        ];
        psbt.inputs[0]
            .bip32_derivations
            .push((pubkey, PsbtDerivation::new(root.my_fingerprint(), path)));
        (psbt, root, pubkey)
    }

    #[test]
    fn finalize_p2wpkh_end_to_end() {
        let (mut psbt, root, pubkey) = wpkh_psbt();
        assert_eq!(
            pubkey.to_string(),
            "02e7ab2537b5d49e970309aae06e9e49f36ce1c9febbd44ec8e0d1cca0b4f9c319"
        );
        let added = psbt.sign_with(&root, None).unwrap();
        assert_eq!(added, 1);

        let digest = psbt.sighash(0, SigHashType::ALL, None).unwrap();
        assert_eq!(
            hex::encode(digest),
            "52f4d13355d9b3bf37467561c7f8ceb4fecd88b8ba6cdba3034093d8d44c7b90"
        );
        // deterministic RFC6979 nonces pin the signature bytes
        let (_, sig_bytes) = &psbt.inputs[0].partial_sigs[0];
        assert_eq!(
            hex::encode(&sig_bytes[..sig_bytes.len() - 1]),
            "3045022100fc9042a648572fd1ce829ec90184ba4b18244e26619d2a65e2b752e3792f2295\
             02203ddfaca818ff0eb9870728639952b3885e9ec8b1eff397bf61a36c2a645ea9ee"
        );
        let tx = finalize_psbt(&mut psbt).unwrap();
        assert!(tx.is_segwit());
        let witness = &tx.vin[0].witness;
        assert_eq!(witness.len(), 2);
        // signature || sighash byte, pubkey
        let sig_item = &witness.items()[0];
        assert_eq!(*sig_item.last().unwrap(), 0x01);
        let sig = Signature::parse_der(&sig_item[..sig_item.len() - 1]).unwrap();
        assert!(pubkey.verify(&sig, &digest));
        assert_eq!(witness.items()[1], pubkey.sec());
        // matches the canonical witness constructor
        assert_eq!(
            witness,
            &witness_p2wpkh(&sig, &pubkey, SigHashType::ALL)
        );
    }

    #[test]
    fn finalize_requires_signature() {
        let (mut psbt, _, _) = wpkh_psbt();
        assert_eq!(
            finalize_psbt(&mut psbt),
            Err(Error::IncompleteSignatures(0))
        );
    }

    #[test]
    fn finalize_wsh_multisig() {
        let mut rng = rand::thread_rng();
        let keys: Vec<PrivateKey> = (0..3).map(|_| PrivateKey::random(&mut rng)).collect();
        let mut pubkeys: Vec<PublicKey> = keys.iter().map(PrivateKey::public_key).collect();
        pubkeys.sort();
        let witness_script = script::multisig(2, &pubkeys).unwrap();
        let spk = script::p2wsh(&witness_script);

        let mut tx = Transaction::default();
        tx.vin.push(TxIn::new(Txid([0x22; 32]), 1));
        tx.vout.push(TxOut::new(40_000, spk.clone()));
        let mut psbt = Psbt::with_tx(tx);
        psbt.inputs[0].witness_utxo = Some(TxOut::new(50_000, spk));
        psbt.inputs[0].witness_script = Some(witness_script.clone());

        // sign with two of the three keys
        for key in &keys[..2] {
            assert_eq!(psbt.sign_with_key(key, None).unwrap(), 1);
        }
        let digest = psbt.sighash(0, SigHashType::ALL, None).unwrap();
        let tx = finalize_psbt(&mut psbt).unwrap();
        let witness = &tx.vin[0].witness;
        // dummy, two signatures, script
        assert_eq!(witness.len(), 4);
        assert!(witness.items()[0].is_empty());
        assert_eq!(witness.items()[3], witness_script.to_bytes());

        // signatures are in script key order and verify
        let mut sig_index = 0;
        for pubkey in &pubkeys {
            let item = &witness.items()[1 + sig_index];
            let sig = Signature::parse_der(&item[..item.len() - 1]).unwrap();
            if pubkey.verify(&sig, &digest) {
                sig_index += 1;
                if sig_index == 2 {
                    break;
                }
            }
        }
        assert_eq!(sig_index, 2);
    }

    #[test]
    fn satisfier_branch_selection() {
        let mut rng = rand::thread_rng();
        let key_a = PrivateKey::random(&mut rng);
        let key_b = PrivateKey::random(&mut rng);
        let pk_a = hex::encode(key_a.public_key().sec());
        let pk_b = hex::encode(key_b.public_key().sec());

        let ms: Miniscript = format!("or_d(pk({}),and_v(v:pk({}),older(100)))", pk_a, pk_b)
            .parse()
            .unwrap();

        let digest = [0x42u8; 32];
        let sig_a = {
            let mut sig = key_a.sign(&digest).serialize_der();
            sig.push(0x01);
            sig
        };
        let sig_b = {
            let mut sig = key_b.sign(&digest).serialize_der();
            sig.push(0x01);
            sig
        };

        // with only A's signature the first branch is taken
        let sigs = vec![(key_a.public_key(), sig_a.clone())];
        let satisfier = Satisfier { partial_sigs: &sigs };
        assert_eq!(satisfier.satisfy(&ms).unwrap(), vec![sig_a]);

        // with only B's signature the fallback branch is selected:
        // sat(and_v) ++ dsat(pk A) = [older(), sig_b] ++ [empty]
        let sigs = vec![(key_b.public_key(), sig_b.clone())];
        let satisfier = Satisfier { partial_sigs: &sigs };
        assert_eq!(
            satisfier.satisfy(&ms).unwrap(),
            vec![sig_b, vec![]]
        );

        // with neither, satisfaction fails
        let satisfier = Satisfier { partial_sigs: &[] };
        assert!(satisfier.satisfy(&ms).is_err());
    }

    #[test]
    fn finalize_taproot_keypath() {
        let mut psbt: Psbt = "cHNidP8BAKYCAAAAAsBlMEaxkJwNZ6V+BZ06bKIb5q2CpF9sHDDj0/eJfzA1AAAAAAD+////kqnvuD+I8rLf8eELSAqvqBiEy5+IpOKpn/acu+gs0E8BAAAAAP7///8CAA4nBwAAAAAWABStYQVCeoRPwINTcqOPmDkTReYZVbjCyQEAAAAAIlEgDTyyEUjN1Oyxc6Z5xifyM3Kamy+Hrt0UdV86CeDMvf8AAAAAAAEAfQIAAAABRL1RocN1LnP4aONGuWFAJm0+Hej0SWAqlSlJ9caTP/gBAAAAAP7///8CAOH1BQAAAAAiUSBCFZNDTJDvmyVvyzL/thnwUyHGSdn0HDwInUIk/SHzmc4uGh4BAAAAFgAU1ZjhFjq1hmtoVb2+6O7jHrtqYsDLAAAAAQErAOH1BQAAAAAiUSBCFZNDTJDvmyVvyzL/thnwUyHGSdn0HDwInUIk/SHzmQABAH0CAAAAAcBlMEaxkJwNZ6V+BZ06bKIb5q2CpF9sHDDj0/eJfzA1AQAAAAD+////ArU9HxsBAAAAFgAUOGUymdaBcR3nQVoZ804qGf9H9iKA8PoCAAAAACJRIDrGIL80dDh9Y5xIBek776O9xpVrAtiuyiy8HXZSuTUZzAAAAAEBK4Dw+gIAAAAAIlEgOsYgvzR0OH1jnEgF6Tvvo73GlWsC2K7KLLwddlK5NRkAAAA="
            .parse()
            .unwrap();
        let root: HDKey =
            "tprv8ZgxMBicQKsPf27gmh4DbQqN2K6xnXA7m7AeceqQVGkRYny3X49sgcufzbJcq4k5eaGZDMijccdDzvQga2Saqd78dKqN52QwLyqgY8apX3j"
                .parse()
                .unwrap();
        let fingerprint = root.my_fingerprint();
        for i in 0..2 {
            let derived = root.derive(&[0, i as u32][..]).unwrap();
            psbt.inputs[i].tap_bip32_derivations.push((
                derived.public_key().xonly(),
                (vec![], PsbtDerivation::new(fingerprint, vec![0, i as u32])),
            ));
        }
        psbt.sign_with(&root, None).unwrap();
        let tx = finalize_psbt(&mut psbt).unwrap();
        for i in 0..2 {
            let witness = &tx.vin[i].witness;
            assert_eq!(witness.len(), 1);
            assert_eq!(witness.items()[0].len(), 64);
        }
    }
}
