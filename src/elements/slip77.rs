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

//! SLIP-77 deterministic blinding keys: a SLIP-21 master node labelled
//! "SLIP-0077" yields the master blinding key; per-output blinding keys
//! are `HMAC-SHA256(master, scriptPubkey)`.

use zeroize::Zeroize;

use crate::ec::{self, PrivateKey};
use crate::hashes::{hmac_sha256, hmac_sha512};
use crate::script::Script;

/// Derives the 32-byte master blinding key from a BIP-39 seed
pub fn master_blinding_from_seed(seed: &[u8]) -> [u8; 32] {
    // SLIP-21 root node
    let mut root = hmac_sha512(b"Symmetric key seed", seed);
    // child node with the SLIP-0077 label
    let mut label = vec![0x00];
    label.extend_from_slice(b"SLIP-0077");
    let node = hmac_sha512(&root[..32], &label);
    root.zeroize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&node[32..]);
    key
}

/// Blinding private key for a specific output script
pub fn blinding_key(
    master_blinding_key: &[u8; 32],
    script_pubkey: &Script,
) -> Result<PrivateKey, ec::Error> {
    let raw = hmac_sha256(master_blinding_key, script_pubkey.as_bytes());
    PrivateKey::new(raw, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bip39::mnemonic_to_seed;
    use crate::script;

    #[test]
    fn deterministic_and_script_bound() {
        let seed = mnemonic_to_seed(
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon \
             abandon abandon about",
            "",
        );
        let master = master_blinding_from_seed(&seed);
        assert_eq!(master, master_blinding_from_seed(&seed));

        let mut rng = rand::thread_rng();
        let pk = crate::ec::PrivateKey::random(&mut rng).public_key();
        let spk_a = script::p2wpkh(&pk);
        let spk_b = script::p2pkh(&pk);
        let key_a = blinding_key(&master, &spk_a).unwrap();
        let key_b = blinding_key(&master, &spk_b).unwrap();
        assert_ne!(key_a, key_b);
        // stable per script
        assert_eq!(key_a, blinding_key(&master, &spk_a).unwrap());
    }
}
