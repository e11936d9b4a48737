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

//! Per-network constants: address prefixes, WIF versions, bech32 HRPs and
//! the SLIP-132 family of extended-key version bytes (`xprv`…`Zpub`).

/// Extended key application defined by its SLIP-132 version bytes
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display)]
#[display(Debug)]
pub enum KeyApplication {
    /// xprv/xpub: legacy or undefined scheme
    Legacy,
    /// yprv/ypub: P2SH-nested P2WPKH
    NestedSegwit,
    /// zprv/zpub: native P2WPKH
    Segwit,
    /// Yprv/Ypub: P2SH-nested P2WSH multisig
    NestedMultisig,
    /// Zprv/Zpub: native P2WSH multisig
    SegwitMultisig,
}

impl KeyApplication {
    pub const ALL: [KeyApplication; 5] = [
        KeyApplication::Legacy,
        KeyApplication::NestedSegwit,
        KeyApplication::Segwit,
        KeyApplication::NestedMultisig,
        KeyApplication::SegwitMultisig,
    ];
}

/// Result of scanning the extended-key version tables
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct KeyVersion {
    pub network: &'static Network,
    pub application: KeyApplication,
    pub is_private: bool,
}

/// Set of constants defining a particular network
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Network {
    pub name: &'static str,
    /// WIF private key prefix
    pub wif: u8,
    /// base58 P2PKH address prefix
    pub p2pkh: u8,
    /// base58 P2SH address prefix
    pub p2sh: u8,
    /// bech32 human-readable part for segwit addresses
    pub bech32: &'static str,
    pub xprv: [u8; 4],
    pub xpub: [u8; 4],
    pub yprv: [u8; 4],
    pub ypub: [u8; 4],
    pub zprv: [u8; 4],
    pub zpub: [u8; 4],
    /// Yprv: SLIP-132 nested multisig private
    pub yprv_multisig: [u8; 4],
    /// Ypub
    pub ypub_multisig: [u8; 4],
    /// Zprv: SLIP-132 native multisig private
    pub zprv_multisig: [u8; 4],
    /// Zpub
    pub zpub_multisig: [u8; 4],
    /// BIP-44 coin type
    pub bip32: u32,
}

impl Network {
    /// Version bytes for a given application/privacy combination
    pub fn xkey_version(&self, application: KeyApplication, is_private: bool) -> [u8; 4] {
        match (application, is_private) {
            (KeyApplication::Legacy, true) => self.xprv,
            (KeyApplication::Legacy, false) => self.xpub,
            (KeyApplication::NestedSegwit, true) => self.yprv,
            (KeyApplication::NestedSegwit, false) => self.ypub,
            (KeyApplication::Segwit, true) => self.zprv,
            (KeyApplication::Segwit, false) => self.zpub,
            (KeyApplication::NestedMultisig, true) => self.yprv_multisig,
            (KeyApplication::NestedMultisig, false) => self.ypub_multisig,
            (KeyApplication::SegwitMultisig, true) => self.zprv_multisig,
            (KeyApplication::SegwitMultisig, false) => self.zpub_multisig,
        }
    }
}

pub const MAINNET: Network = Network {
    name: "Mainnet",
    wif: 0x80,
    p2pkh: 0x00,
    p2sh: 0x05,
    bech32: "bc",
    xprv: [0x04, 0x88, 0xAD, 0xE4],
    xpub: [0x04, 0x88, 0xB2, 0x1E],
    yprv: [0x04, 0x9D, 0x78, 0x78],
    ypub: [0x04, 0x9D, 0x7C, 0xB2],
    zprv: [0x04, 0xB2, 0x43, 0x0C],
    zpub: [0x04, 0xB2, 0x47, 0x46],
    yprv_multisig: [0x02, 0x95, 0xB0, 0x05],
    ypub_multisig: [0x02, 0x95, 0xB4, 0x3F],
    zprv_multisig: [0x02, 0xAA, 0x7A, 0x99],
    zpub_multisig: [0x02, 0xAA, 0x7E, 0xD3],
    bip32: 0,
};

pub const TESTNET: Network = Network {
    name: "Testnet",
    wif: 0xEF,
    p2pkh: 0x6F,
    p2sh: 0xC4,
    bech32: "tb",
    xprv: [0x04, 0x35, 0x83, 0x94],
    xpub: [0x04, 0x35, 0x87, 0xCF],
    yprv: [0x04, 0x4A, 0x4E, 0x28],
    ypub: [0x04, 0x4A, 0x52, 0x62],
    zprv: [0x04, 0x5F, 0x18, 0xBC],
    zpub: [0x04, 0x5F, 0x1C, 0xF6],
    yprv_multisig: [0x02, 0x42, 0x85, 0xB5],
    ypub_multisig: [0x02, 0x42, 0x89, 0xEF],
    zprv_multisig: [0x02, 0x57, 0x50, 0x48],
    zpub_multisig: [0x02, 0x57, 0x54, 0x83],
    bip32: 1,
};

pub const REGTEST: Network = Network {
    name: "Regtest",
    bech32: "bcrt",
    ..TESTNET
};

pub const SIGNET: Network = Network {
    name: "Signet",
    ..TESTNET
};

/// All supported bitcoin networks, scanned in order by version-byte and
/// address-prefix detection routines
pub fn networks() -> &'static [&'static Network] {
    &[&MAINNET, &TESTNET, &REGTEST, &SIGNET]
}

/// Scans the version tables of all known networks and returns the first
/// match for the given extended-key version bytes
pub fn lookup_xkey_version(version: [u8; 4]) -> Option<KeyVersion> {
    for network in networks() {
        for application in &KeyApplication::ALL {
            for &is_private in &[true, false] {
                if network.xkey_version(*application, is_private) == version {
                    return Some(KeyVersion {
                        network,
                        application: *application,
                        is_private,
                    });
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_lookup() {
        let v = lookup_xkey_version(MAINNET.xprv).unwrap();
        assert_eq!(v.network, &MAINNET);
        assert_eq!(v.application, KeyApplication::Legacy);
        assert!(v.is_private);

        let v = lookup_xkey_version(TESTNET.zpub).unwrap();
        assert_eq!(v.application, KeyApplication::Segwit);
        assert!(!v.is_private);

        assert_eq!(lookup_xkey_version([0xDE, 0xAD, 0xBE, 0xEF]), None);
    }

    #[test]
    fn regtest_shares_testnet_versions() {
        assert_eq!(REGTEST.xprv, TESTNET.xprv);
        assert_eq!(REGTEST.bech32, "bcrt");
        assert_eq!(SIGNET.bech32, "tb");
    }
}
