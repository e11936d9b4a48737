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

//! BIP-47 reusable payment codes (version 1): shareable codes, notification
//! addresses, per-index payment & receive addresses derived through ECDH,
//! and the notification-transaction payload blinding.

use core::fmt::{self, Display, Formatter};
use core::str::FromStr;

use crate::base58;
use crate::bip32::{self, ChainCode, HDKey, XKey, HARDENED_INDEX_BOUNDARY};
use crate::ec::{self, PrivateKey, PublicKey};
use crate::hashes::{hmac_sha512, sha256};
use crate::networks::{Network, MAINNET};
use crate::script;
use crate::transaction::Transaction;

/// base58 prefix byte of payment codes (produces the `P` first letter)
const PAYMENT_CODE_PREFIX: u8 = 0x47;

/// BIP-47 errors
#[derive(Clone, PartialEq, Eq, Debug, Display, From, Error)]
#[display(doc_comments)]
pub enum Error {
    /// payment code has invalid length or version
    InvalidPaymentCode,

    /// a private root key is required for this operation
    PrivateKeyRequired,

    /// shared secret is not a valid scalar; retry with the next index
    InvalidSharedSecret,

    /// notification payload must be exactly 80 bytes
    InvalidPayloadLength,

    /// EC error: {0}
    #[from]
    Ec(ec::Error),

    /// derivation error: {0}
    #[from]
    Bip32(bip32::Error),

    /// base58 error: {0}
    #[from]
    Base58(base58::Error),

    /// script error: {0}
    #[from]
    Script(script::Error),
}

/// Address kinds BIP-47 wallets derive payment addresses for
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
#[display(Debug)]
pub enum AddressType {
    P2pkh,
    P2wpkh,
    P2shP2wpkh,
}

fn address_for(pubkey: &PublicKey, address_type: AddressType, network: &Network) -> String {
    let spk = match address_type {
        AddressType::P2pkh => script::p2pkh(pubkey),
        AddressType::P2wpkh => script::p2wpkh(pubkey),
        AddressType::P2shP2wpkh => script::p2sh(&script::p2wpkh(pubkey)),
    };
    spk.address(network).expect("constructed scripts have addresses")
}

/// Version-1 payment code: the public key and chain code of the
/// `m/47h/coinh/accounth` node
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PaymentCode {
    pub pubkey: PublicKey,
    pub chain_code: ChainCode,
}

impl PaymentCode {
    /// Derives the shareable payment code of a wallet root
    pub fn from_root(root: &HDKey, coin: u32, account: u32) -> Result<PaymentCode, Error> {
        if !root.is_private() {
            return Err(Error::PrivateKeyRequired);
        }
        let node = root
            .child(47 | HARDENED_INDEX_BOUNDARY)?
            .child(coin | HARDENED_INDEX_BOUNDARY)?
            .child(account | HARDENED_INDEX_BOUNDARY)?;
        Ok(PaymentCode {
            pubkey: node.public_key(),
            chain_code: node.chain_code.clone(),
        })
    }

    /// 80-byte binary form: `0x01 0x00 <pubkey33> <chain_code32> <13 zeros>`
    pub fn payload(&self) -> [u8; 80] {
        let mut payload = [0u8; 80];
        payload[0] = 0x01; // version
        payload[1] = 0x00; // bitmessage flags, always zero
        payload[2..35].copy_from_slice(&self.pubkey.sec_compressed());
        payload[35..67].copy_from_slice(self.chain_code.as_bytes());
        payload
    }

    fn from_payload(payload: &[u8]) -> Result<PaymentCode, Error> {
        if payload.len() != 80 || payload[0] != 0x01 {
            return Err(Error::InvalidPaymentCode);
        }
        let pubkey = PublicKey::parse(&payload[2..35])?;
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&payload[35..67]);
        Ok(PaymentCode {
            pubkey,
            chain_code: ChainCode::from(chain_code),
        })
    }

    /// The payment code as a watch-only extended public key
    pub fn node(&self) -> HDKey {
        HDKey::with(
            XKey::Public(self.pubkey),
            self.chain_code.clone(),
            MAINNET.xpub,
            0,
            [0u8; 4],
            0,
        )
        .expect("xpub version bytes are always valid")
    }

    /// n-th public child of the payment code
    pub fn derived_node(&self, index: u32) -> Result<HDKey, Error> {
        Ok(self.node().child(index)?)
    }

    /// The address receiving notification transactions for this code
    pub fn notification_address(
        &self,
        address_type: AddressType,
        network: &Network,
    ) -> Result<String, Error> {
        let pubkey = self.derived_node(0)?.public_key();
        Ok(address_for(&pubkey, address_type, network))
    }
}

impl Display for PaymentCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut data = Vec::with_capacity(81);
        data.push(PAYMENT_CODE_PREFIX);
        data.extend_from_slice(&self.payload());
        f.write_str(&base58::encode_check(&data))
    }
}

impl FromStr for PaymentCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let data = base58::decode_check(s)?;
        if data.len() != 81 || data[0] != PAYMENT_CODE_PREFIX {
            return Err(Error::InvalidPaymentCode);
        }
        PaymentCode::from_payload(&data[1..])
    }
}

/// ECDH scalar shared secret `SHA256(x(a*B))`; fails when the result is
/// not a valid secp256k1 scalar, in which case the caller must retry with
/// the next index per the standard
fn shared_secret(secret: &PrivateKey, point: &PublicKey) -> Result<[u8; 32], Error> {
    let shared_point = point.mul_tweak(&secret.secret())?;
    let s = sha256(shared_point.xonly());
    PrivateKey::parse(&s).map_err(|_| Error::InvalidSharedSecret)?;
    Ok(s)
}

/// Payer side: the n-th payment address towards a recipient payment code.
/// `B' = B_n + SHA256(x(a*B_n))*G` where `a` is the payer notification key.
pub fn payment_address(
    payer_root: &HDKey,
    recipient_code: &PaymentCode,
    index: u32,
    coin: u32,
    account: u32,
    address_type: AddressType,
    network: &Network,
) -> Result<String, Error> {
    let payer_key = payer_root
        .child(47 | HARDENED_INDEX_BOUNDARY)?
        .child(coin | HARDENED_INDEX_BOUNDARY)?
        .child(account | HARDENED_INDEX_BOUNDARY)?
        .child(0)?;
    let a = payer_key
        .private_key()
        .ok_or(Error::PrivateKeyRequired)?;
    let b_n = recipient_code.derived_node(index)?.public_key();
    let s = shared_secret(a, &b_n)?;
    let shared_pubkey = b_n.add_tweak(&s)?;
    Ok(address_for(&shared_pubkey, address_type, network))
}

/// Recipient side: the n-th receive address from a payer payment code,
/// together with the private key able to spend it (`b' = b_n + s`)
pub fn receive_address(
    recipient_root: &HDKey,
    payer_code: &PaymentCode,
    index: u32,
    coin: u32,
    account: u32,
    address_type: AddressType,
    network: &Network,
) -> Result<(String, PrivateKey), Error> {
    let a_0 = payer_code.derived_node(0)?.public_key();
    let recipient_key = recipient_root
        .child(47 | HARDENED_INDEX_BOUNDARY)?
        .child(coin | HARDENED_INDEX_BOUNDARY)?
        .child(account | HARDENED_INDEX_BOUNDARY)?
        .child(index)?;
    let b = recipient_key
        .private_key()
        .ok_or(Error::PrivateKeyRequired)?;
    let s = shared_secret(b, &a_0)?;
    let spending_key = b.add_tweak(&s)?;
    let address = address_for(&spending_key.public_key(), address_type, network);
    Ok((address, spending_key))
}

/// Reversible payload (un)blinding for notification transactions: XORs the
/// x coordinate and chain code of an 80-byte payment code payload with the
/// HMAC-SHA512 mask derived from the ECDH point and the spent outpoint
pub fn blind_payload(
    secret: &PrivateKey,
    point: &PublicKey,
    outpoint: &[u8; 36],
    payload: &[u8],
) -> Result<[u8; 80], Error> {
    if payload.len() != 80 {
        return Err(Error::InvalidPayloadLength);
    }
    let shared_point = point.mul_tweak(&secret.secret())?;
    let mask = hmac_sha512(outpoint, &shared_point.xonly());
    let mut blinded = [0u8; 80];
    blinded.copy_from_slice(payload);
    for (byte, m) in blinded[3..35].iter_mut().zip(&mask[..32]) {
        *byte ^= m;
    }
    for (byte, m) in blinded[35..67].iter_mut().zip(&mask[32..]) {
        *byte ^= m;
    }
    Ok(blinded)
}

/// Payer side: blinds own payment code for embedding into the OP_RETURN
/// output of a notification transaction spending `outpoint` with
/// `utxo_key`
pub fn blinded_payment_code(
    payer_code: &PaymentCode,
    utxo_key: &PrivateKey,
    outpoint: &[u8; 36],
    recipient_code: &PaymentCode,
) -> Result<[u8; 80], Error> {
    let notification_key = recipient_code.derived_node(0)?.public_key();
    blind_payload(utxo_key, &notification_key, outpoint, &payer_code.payload())
}

/// Recipient side: if `tx` is a notification transaction for this wallet,
/// extracts and unblinds the payer payment code
pub fn payment_code_from_notification_tx(
    tx: &Transaction,
    recipient_root: &HDKey,
    coin: u32,
    account: u32,
) -> Result<Option<PaymentCode>, Error> {
    if tx.vout.len() < 2 {
        return Ok(None);
    }
    let own_code = PaymentCode::from_root(recipient_root, coin, account)?;
    let notification_spk = {
        let pubkey = own_code.derived_node(0)?.public_key();
        script::p2pkh(&pubkey)
    };

    let mut matches_notification = false;
    let mut payload: Option<&[u8]> = None;
    for vout in &tx.vout {
        if vout.script_pubkey == notification_spk {
            matches_notification = true;
            continue;
        }
        if let Some(data) = vout.script_pubkey.op_return_data() {
            // only version-1 codes with the full 80-byte payload
            if data.len() == 80 && data[0] == 0x01 {
                payload = Some(data);
            }
        }
    }
    let payload = match (matches_notification, payload) {
        (true, Some(payload)) => payload,
        _ => return Ok(None),
    };

    // designated pubkey: the first input exposing one in scriptSig/witness
    let vin = match tx.vin.first() {
        Some(vin) => vin,
        None => return Ok(None),
    };
    let designated = if !vin.is_segwit() {
        let data = vin.script_sig.as_bytes();
        if data.is_empty() {
            return Ok(None);
        }
        let sig_len = data[0] as usize;
        if data.len() < sig_len + 2 {
            return Ok(None);
        }
        PublicKey::parse(&data[sig_len + 2..])?
    } else {
        let items = vin.witness.items();
        if items.len() < 2 {
            return Ok(None);
        }
        PublicKey::parse(&items[1])?
    };

    let notification_key = recipient_root
        .child(47 | HARDENED_INDEX_BOUNDARY)?
        .child(coin | HARDENED_INDEX_BOUNDARY)?
        .child(account | HARDENED_INDEX_BOUNDARY)?
        .child(0)?;
    let b = notification_key
        .private_key()
        .ok_or(Error::PrivateKeyRequired)?;

    let mut outpoint = [0u8; 36];
    let mut buf = vec![];
    use crate::consensus::ConsensusEncode;
    vin.txid
        .consensus_encode(&mut buf)
        .expect("in-memory encoding");
    vin.vout.consensus_encode(&mut buf).expect("in-memory encoding");
    outpoint.copy_from_slice(&buf);

    let unblinded = blind_payload(b, &designated, &outpoint, payload)?;
    Ok(Some(PaymentCode::from_payload(&unblinded)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bip39::mnemonic_to_seed;

    // the BIP-47 reference test couple
    const ALICE_MNEMONIC: &str =
        "response seminar brave tip suit recall often sound stick owner lottery motion";
    const ALICE_CODE: &str =
        "PM8TJTLJbPRGxSbc8EJi42Wrr6QbNSaSSVJ5Y3E4pbCYiTHUskHg13935Ubb7q8tx9GVbh2UuRnBc3WSyJHhUrw8KhprKnn9eDznYGieTzFcwQRya4GA";
    const BOB_MNEMONIC: &str =
        "reward upper indicate eight swift arch injury crystal super wrestle already dentist";
    const BOB_CODE: &str =
        "PM8TJS2JxQ5ztXUpBBRnpTbcUXbUHy2T1abfrb3KkAAtMEGNbey4oumH7Hc578WgQJhPjBxteQ5GHHToTYHE3A1w6p7tU6KSoFmWBVbFGjKPisZDbP97";

    fn alice_root() -> HDKey {
        HDKey::from_seed(&mnemonic_to_seed(ALICE_MNEMONIC, "")).unwrap()
    }

    fn bob_root() -> HDKey {
        HDKey::from_seed(&mnemonic_to_seed(BOB_MNEMONIC, "")).unwrap()
    }

    #[test]
    fn payment_code_derivation() {
        let code = PaymentCode::from_root(&alice_root(), 0, 0).unwrap();
        assert_eq!(code.to_string(), ALICE_CODE);
        assert_eq!(
            PaymentCode::from_root(&bob_root(), 0, 0).unwrap().to_string(),
            BOB_CODE
        );
    }

    #[test]
    fn payment_code_string_roundtrip() {
        let code: PaymentCode = ALICE_CODE.parse().unwrap();
        assert_eq!(code.to_string(), ALICE_CODE);
        assert!("PM8invalid".parse::<PaymentCode>().is_err());
    }

    #[test]
    fn notification_address() {
        let code: PaymentCode = ALICE_CODE.parse().unwrap();
        assert_eq!(
            code.notification_address(AddressType::P2pkh, &MAINNET)
                .unwrap(),
            "1JDdmqFLhpzcUwPeinhJbUPw4Co3aWLyzW"
        );
    }

    #[test]
    fn payment_addresses_match_reference() {
        let bob_code: PaymentCode = BOB_CODE.parse().unwrap();
        // the first addresses Alice pays Bob at, from the BIP-47 vectors
        assert_eq!(
            payment_address(
                &alice_root(),
                &bob_code,
                0,
                0,
                0,
                AddressType::P2pkh,
                &MAINNET
            )
            .unwrap(),
            "141fi7TY3h936vRUKh1qfUZr8rSBuYbVBK"
        );
    }

    #[test]
    fn receive_matches_payment() {
        let alice_code: PaymentCode = ALICE_CODE.parse().unwrap();
        let bob_code: PaymentCode = BOB_CODE.parse().unwrap();
        for index in 0..3 {
            let paid = payment_address(
                &alice_root(),
                &bob_code,
                index,
                0,
                0,
                AddressType::P2wpkh,
                &MAINNET,
            )
            .unwrap();
            let (received, key) = receive_address(
                &bob_root(),
                &alice_code,
                index,
                0,
                0,
                AddressType::P2wpkh,
                &MAINNET,
            )
            .unwrap();
            assert_eq!(paid, received);
            // the returned key controls the address
            assert_eq!(
                script::p2wpkh(&key.public_key()).address(&MAINNET).unwrap(),
                paid
            );
        }
    }

    #[test]
    fn blinding_roundtrip() {
        let alice_code = PaymentCode::from_root(&alice_root(), 0, 0).unwrap();
        let bob_code: PaymentCode = BOB_CODE.parse().unwrap();
        let mut rng = rand::thread_rng();
        let utxo_key = PrivateKey::random(&mut rng);
        let outpoint = [0xAB; 36];

        let blinded =
            blinded_payment_code(&alice_code, &utxo_key, &outpoint, &bob_code).unwrap();
        assert_ne!(&blinded[..], &alice_code.payload()[..]);

        // Bob unblinds with his notification key and the payer pubkey
        let bob_notification = bob_root()
            .derive_path("m/47h/0h/0h/0")
            .unwrap();
        let unblinded = blind_payload(
            bob_notification.private_key().unwrap(),
            &utxo_key.public_key(),
            &outpoint,
            &blinded,
        )
        .unwrap();
        assert_eq!(&unblinded[..], &alice_code.payload()[..]);
    }
}
