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

//! Elements addresses: unconfidential base58/bech32 forms reuse the
//! bitcoin machinery with Elements prefixes; confidential forms prepend
//! the 33-byte blinding public key - a two-byte-version base58 layout for
//! legacy scripts and blech32(m) for segwit programs.

use super::blech32;
use super::networks::ElementsNetwork;
use crate::base58;
use crate::ec::PublicKey;
use crate::script::{self, op, Script, ScriptType};

/// Elements address errors
#[derive(Clone, PartialEq, Eq, Debug, Display, From, Error)]
#[display(doc_comments)]
pub enum Error {
    /// script has no address representation
    NoAddressRepresentation,

    /// address '{0}' does not match any supported Elements format
    UnknownAddressFormat(String),

    /// invalid confidential address payload
    InvalidPayload,

    /// script error: {0}
    #[from]
    Script(script::Error),

    /// base58 error: {0}
    #[from]
    Base58(base58::Error),

    /// blech32 error: {0}
    #[from]
    Blech32(blech32::Error),

    /// EC error: {0}
    #[from]
    Ec(crate::ec::Error),
}

/// Encodes a script as an Elements address; a blinding key makes the
/// address confidential
pub fn address(
    script_pubkey: &Script,
    blinding_pubkey: Option<&PublicKey>,
    network: &ElementsNetwork,
) -> Result<String, Error> {
    let script_type = script_pubkey
        .script_type()
        .ok_or(Error::NoAddressRepresentation)?;
    let blinding_pubkey = match blinding_pubkey {
        None => return Ok(script_pubkey.address(&network.base)?),
        Some(pubkey) => pubkey,
    };
    let data = script_pubkey.as_bytes();
    match script_type {
        ScriptType::P2pkh | ScriptType::P2sh => {
            let (version, hash) = match script_type {
                ScriptType::P2pkh => (network.base.p2pkh, &data[3..23]),
                _ => (network.base.p2sh, &data[2..22]),
            };
            let mut payload = vec![network.confidential_prefix, version];
            payload.extend_from_slice(&blinding_pubkey.sec_compressed());
            payload.extend_from_slice(hash);
            Ok(base58::encode_check(&payload))
        }
        ScriptType::P2wpkh | ScriptType::P2wsh | ScriptType::P2tr => {
            let version = if data[0] == op::OP_0 {
                0
            } else {
                data[0] - op::OP_1 + 1
            };
            let variant = if version == 0 {
                blech32::Variant::Blech32
            } else {
                blech32::Variant::Blech32m
            };
            let mut program = blinding_pubkey.sec_compressed().to_vec();
            program.extend_from_slice(&data[2..]);
            Ok(blech32::encode(network.blech32, version, &program, variant))
        }
    }
}

/// Decodes an Elements address into its scriptPubkey and the blinding key
/// of confidential forms
pub fn address_to_script(
    addr: &str,
    network: &ElementsNetwork,
) -> Result<(Script, Option<PublicKey>), Error> {
    // confidential base58 first: 2-byte version + 33 + 20 payload
    if let Ok(data) = base58::decode_check(addr) {
        if data.len() == 55 && data[0] == network.confidential_prefix {
            let blinding = PublicKey::parse(&data[2..35])?;
            let hash = &data[35..55];
            let script = if data[1] == network.base.p2pkh {
                let mut body = vec![op::OP_DUP, op::OP_HASH160, 20];
                body.extend_from_slice(hash);
                body.extend_from_slice(&[op::OP_EQUALVERIFY, op::OP_CHECKSIG]);
                Script::new(body)
            } else if data[1] == network.base.p2sh {
                let mut body = vec![op::OP_HASH160, 20];
                body.extend_from_slice(hash);
                body.push(op::OP_EQUAL);
                Script::new(body)
            } else {
                return Err(Error::UnknownAddressFormat(addr.to_string()));
            };
            return Ok((script, Some(blinding)));
        }
        if data.len() == 21 {
            // unconfidential base58
            let script = if data[0] == network.base.p2pkh {
                let mut body = vec![op::OP_DUP, op::OP_HASH160, 20];
                body.extend_from_slice(&data[1..]);
                body.extend_from_slice(&[op::OP_EQUALVERIFY, op::OP_CHECKSIG]);
                Script::new(body)
            } else if data[0] == network.base.p2sh {
                let mut body = vec![op::OP_HASH160, 20];
                body.extend_from_slice(&data[1..]);
                body.push(op::OP_EQUAL);
                Script::new(body)
            } else {
                return Err(Error::UnknownAddressFormat(addr.to_string()));
            };
            return Ok((script, None));
        }
        return Err(Error::UnknownAddressFormat(addr.to_string()));
    }

    // confidential blech32
    if let Ok((hrp, version, program, _variant)) = blech32::decode(addr) {
        if hrp == network.blech32 {
            if program.len() < 33 + 20 {
                return Err(Error::InvalidPayload);
            }
            let blinding = PublicKey::parse(&program[..33])?;
            let witness_program = &program[33..];
            if witness_program.len() != 20 && witness_program.len() != 32 {
                return Err(Error::InvalidPayload);
            }
            let first = if version == 0 {
                op::OP_0
            } else {
                op::OP_1 - 1 + version
            };
            let mut body = vec![first, witness_program.len() as u8];
            body.extend_from_slice(witness_program);
            return Ok((Script::new(body), Some(blinding)));
        }
    }

    // unconfidential bech32 with the Elements HRP
    if let Ok(script) = script::address_to_script(addr) {
        return Ok((script, None));
    }
    // bitcoin helper does not know Elements HRPs; decode manually
    if let Ok((hrp, payload, _)) = bech32::decode(addr) {
        use bech32::FromBase32;
        if hrp == network.base.bech32 && !payload.is_empty() {
            let version = payload[0].to_u8();
            let program = Vec::<u8>::from_base32(&payload[1..])
                .map_err(|_| Error::UnknownAddressFormat(addr.to_string()))?;
            if (version == 0 && (program.len() == 20 || program.len() == 32))
                || (version == 1 && program.len() == 32)
            {
                let first = if version == 0 {
                    op::OP_0
                } else {
                    op::OP_1 - 1 + version
                };
                let mut body = vec![first, program.len() as u8];
                body.extend_from_slice(&program);
                return Ok((Script::new(body), None));
            }
        }
    }
    Err(Error::UnknownAddressFormat(addr.to_string()))
}

#[cfg(test)]
mod tests {
    use super::super::networks::{ELEMENTS_REGTEST, LIQUIDV1};
    use super::*;
    use crate::ec::PrivateKey;

    fn keys() -> (PublicKey, PublicKey) {
        let mut rng = rand::thread_rng();
        (
            PrivateKey::random(&mut rng).public_key(),
            PrivateKey::random(&mut rng).public_key(),
        )
    }

    #[test]
    fn confidential_segwit_roundtrip() {
        let (pk, blinding) = keys();
        let spk = script::p2wpkh(&pk);
        for network in &[&LIQUIDV1, &ELEMENTS_REGTEST] {
            let addr = address(&spk, Some(&blinding), network).unwrap();
            assert!(addr.starts_with(network.blech32));
            let (decoded, decoded_blinding) = address_to_script(&addr, network).unwrap();
            assert_eq!(decoded, spk);
            assert_eq!(decoded_blinding, Some(blinding));
        }
    }

    #[test]
    fn confidential_legacy_roundtrip() {
        let (pk, blinding) = keys();
        for spk in &[script::p2pkh(&pk), script::p2sh(&script::p2wpkh(&pk))] {
            let addr = address(spk, Some(&blinding), &ELEMENTS_REGTEST).unwrap();
            let (decoded, decoded_blinding) =
                address_to_script(&addr, &ELEMENTS_REGTEST).unwrap();
            assert_eq!(&decoded, spk);
            assert_eq!(decoded_blinding, Some(blinding));
        }
    }

    #[test]
    fn unconfidential_forms() {
        let (pk, _) = keys();
        let spk = script::p2wpkh(&pk);
        let addr = address(&spk, None, &ELEMENTS_REGTEST).unwrap();
        assert!(addr.starts_with("ert1"));
        let (decoded, blinding) = address_to_script(&addr, &ELEMENTS_REGTEST).unwrap();
        assert_eq!(decoded, spk);
        assert_eq!(blinding, None);

        let spk = script::p2pkh(&pk);
        let addr = address(&spk, None, &ELEMENTS_REGTEST).unwrap();
        let (decoded, blinding) = address_to_script(&addr, &ELEMENTS_REGTEST).unwrap();
        assert_eq!(decoded, spk);
        assert_eq!(blinding, None);
    }
}
