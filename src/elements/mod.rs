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

//! Elements/Liquid overlay: confidential values and assets, Elements
//! transactions with their witness layout, PSET containers, SLIP-77
//! blinding keys, blech32 confidential addresses and blinded descriptors.
//! None of the bitcoin paths depend on this module tree.

pub mod addresses;
pub mod blech32;
pub mod confidential;
pub mod descriptor;
pub mod networks;
pub mod pset;
pub mod slip77;
pub mod transaction;

pub use self::confidential::{AssetGenerator, PedersenCommitment};
pub use self::descriptor::{BlindingKey, LDescriptor};
pub use self::networks::ElementsNetwork;
pub use self::pset::{LInputScope, LOutputScope, Pset};
pub use self::transaction::{AssetIssuance, ConfidentialValue, LTransaction, LTxIn, LTxOut};
