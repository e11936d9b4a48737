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

//! Serde support: every type with a canonical text form (base58 keys,
//! hex scripts and txids, descriptor strings, base64 PSBTs) serializes as
//! that string.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

macro_rules! impl_serde_str {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(de::Error::custom)
            }
        }
    };
}

impl_serde_str!(crate::bip32::DerivationPath);
impl_serde_str!(crate::bip32::HDKey);
impl_serde_str!(crate::bip47::PaymentCode);
impl_serde_str!(crate::descriptor::Descriptor);
impl_serde_str!(crate::ec::PublicKey);
impl_serde_str!(crate::psbt::Psbt);
impl_serde_str!(crate::script::Script);
impl_serde_str!(crate::transaction::Txid);

#[cfg(feature = "elements")]
impl_serde_str!(crate::elements::LDescriptor);
#[cfg(feature = "elements")]
impl_serde_str!(crate::elements::Pset);
