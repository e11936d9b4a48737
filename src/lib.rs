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

//! Wallet-level primitives for Bitcoin and Elements/Liquid: hierarchical
//! deterministic keys (BIP-32/39/47/85, SLIP-39), script & address types,
//! transaction construction with legacy, segwit v0 and taproot signature
//! hashes, partially-signed transactions (BIP-174/370) - both fully parsed
//! and in a streaming, memory-bound form - and an output-descriptor &
//! miniscript engine with a transaction finalizer.
//!
//! The library is a pure computational core: it performs no I/O of its own
//! (the only exception is [`psbt::PsbtView`], which operates on a
//! caller-provided seekable stream) and leaves networking, storage and
//! policy to upper application layers.

#![crate_name = "wallet"]
// Coding conventions
#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![recursion_limit = "256"]

#[macro_use]
extern crate amplify;
#[macro_use]
extern crate lazy_static;

pub extern crate bech32;
pub extern crate bitcoin_hashes;
pub extern crate secp256k1;

#[cfg(feature = "serde")]
extern crate serde_crate as serde;

#[macro_use]
pub mod consensus;
pub mod base58;
pub mod bip32;
pub mod bip39;
pub mod bip47;
pub mod bip85;
pub mod descriptor;
pub mod ec;
#[cfg(feature = "elements")]
pub mod elements;
pub mod finalizer;
pub mod hashes;
pub mod networks;
pub mod psbt;
pub mod script;
#[cfg(feature = "serde")]
mod serde_impls;
pub mod slip39;
pub mod transaction;

pub use crate::bip32::{DerivationPath, HDKey};
pub use crate::consensus::{ConsensusDecode, ConsensusEncode};
pub use crate::descriptor::Descriptor;
pub use crate::ec::{PrivateKey, PublicKey, SchnorrSig, Signature};
pub use crate::networks::Network;
pub use crate::psbt::{Psbt, PsbtView};
pub use crate::script::{Script, Witness};
pub use crate::transaction::{SigHashType, Transaction, TxIn, TxOut, Txid};
