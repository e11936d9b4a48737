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

//! SLIP-39 Shamir backup: split a BIP-39 secret into k-of-n mnemonic
//! shares over GF(256) (the AES field), with an RS1024 share checksum and
//! a 4-round PBKDF2 Feistel cipher encrypting the payload under an
//! optional passphrase.
//!
//! The share polynomial fixes two special points: x=255 holds the secret
//! and x=254 a digest share binding the secret to its randomness, which
//! recovery verifies.

use zeroize::Zeroize;

use crate::bip39;
use crate::hashes::{hmac_sha256, pbkdf2_hmac_sha256};

/// The 1024-word SLIP-39 wordlist; words are uniquely identified by their
/// first four letters
const WORDLIST_TEXT: &str =
    "academic acid acne acquire acrobat activity actress adapt \
     adequate adjust admit adorn adult advance advocate afraid \
     again agency agree aide aircraft airline airport ajar \
     alarm album alcohol alien alive alpha already alto \
     aluminum always amazing ambition amount amuse analysis anatomy \
     ancestor ancient angel angry animal answer antenna anxiety \
     apart aquatic arcade arena argue armed artist artwork \
     aspect auction august aunt average aviation avoid award \
     away axis axle beam beard beaver become bedroom \
     behavior being believe belong benefit best beyond bike \
     biology birthday bishop black blanket blessing blimp blind \
     blue body bolt boring born both boundary bracelet \
     branch brave breathe briefing broken brother browser bucket \
     budget building bulb bulge bumpy bundle burden burning \
     busy buyer cage calcium camera campus canyon capacity \
     capital capture carbon cards careful cargo carpet carve \
     category cause ceiling center ceramic champion change charity \
     check chemical chest chew chubby cinema civil class \
     clay cleanup client climate clinic clock clogs closet \
     clothes club cluster coal coastal coding column company \
     corner costume counter course cover cowboy cradle craft \
     crazy credit cricket criminal crisis critical crowd crucial \
     crunch crush crystal cubic cultural curious curly custody \
     cylinder daisy damage dance darkness database daughter deadline \
     deal debris debut decent decision declare decorate decrease \
     deliver demand density deny depart depend depict deploy \
     describe desert desire desktop destroy detailed detect device \
     devote diagnose dictate diet dilemma diminish dining diploma \
     disaster discuss disease dish dismiss display distance dive \
     divorce document domain domestic dominant dough downtown dragon \
     dramatic dream dress drift drink drove drug dryer \
     duckling duke duration dwarf dynamic early earth easel \
     easy echo eclipse ecology edge editor educate either \
     elbow elder election elegant element elephant elevator elite \
     else email emerald emission emperor emphasis employer empty \
     ending endless endorse enemy energy enforce engage enjoy \
     enlarge entrance envelope envy epidemic episode equation equip \
     eraser erode escape estate estimate evaluate evening evidence \
     evil evoke exact example exceed exchange exclude excuse \
     execute exercise exhaust exotic expand expect explain express \
     extend extra eyebrow facility fact failure faint fake \
     false family famous fancy fangs fantasy fatal fatigue \
     favorite fawn fiber fiction filter finance findings finger \
     firefly firm fiscal fishing fitness flame flash flavor \
     flea flexible flip float floral fluff focus forbid \
     force forecast forget formal fortune forward founder fraction \
     fragment frequent freshman friar fridge friendly frost froth \
     frozen fumes funding furl fused galaxy game garbage \
     garden garlic gasoline gather general genius genre genuine \
     geology gesture glad glance glasses glen glimpse goat \
     golden graduate grant grasp gravity gray greatest grief \
     grill grin grocery gross group grownup grumpy guard \
     guest guilt guitar gums hairy hamster hand hanger \
     harvest have havoc hawk hazard headset health hearing \
     heat helpful herald herd hesitate hobo holiday holy \
     home hormone hospital hour huge human humidity hunting \
     husband hush husky hybrid idea identify idle image \
     impact imply improve impulse include income increase index \
     indicate industry infant inform inherit injury inmate insect \
     inside install intend intimate invasion involve iris island \
     isolate item ivory jacket jerky jewelry join judicial \
     juice jump junction junior junk jury justice kernel \
     keyboard kidney kind kitchen knife knit laden ladle \
     ladybug lair lamp language large laser laundry lawsuit \
     leader leaf learn leaves lecture legal legend legs \
     lend length level liberty library license lift likely \
     lilac lily lips liquid listen literary living lizard \
     loan lobe location losing loud loyalty luck lunar \
     lunch lungs luxury lying lyrics machine magazine maiden \
     mailman main makeup making mama manager mandate mansion \
     manual marathon march market marvel mason material math \
     maximum mayor meaning medal medical member memory mental \
     merchant merit method metric midst mild military mineral \
     minister miracle mixed mixture mobile modern modify moisture \
     moment morning mortgage mother mountain mouse move much \
     mule multiple muscle museum music mustang nail national \
     necklace negative nervous network news nuclear numb numerous \
     nylon oasis obesity object observe obtain ocean often \
     olympic omit oral orange orbit order ordinary organize \
     ounce oven overall owner paces pacific package paid \
     painting pajamas pancake pants papa paper parcel parking \
     party patent patrol payment payroll peaceful peanut peasant \
     pecan penalty pencil percent perfect permit petition phantom \
     pharmacy photo phrase physics pickup picture piece pile \
     pink pipeline pistol pitch plains plan plastic platform \
     playoff pleasure plot plunge practice prayer preach predator \
     pregnant premium prepare presence prevent priest primary priority \
     prisoner privacy prize problem process profile program promise \
     prospect provide prune public pulse pumps punish puny \
     pupal purchase purple python quantity quarter quick quiet \
     race racism radar railroad rainbow raisin random ranked \
     rapids raspy reaction realize rebound rebuild recall receiver \
     recover regret regular reject relate remember remind remove \
     render repair repeat replace require rescue research resident \
     response result retailer retreat reunion revenue review reward \
     rhyme rhythm rich rival river robin rocky romantic \
     romp roster round royal ruin ruler rumor sack \
     safari salary salon salt satisfy satoshi saver says \
     scandal scared scatter scene scholar science scout scramble \
     screw script scroll seafood season secret security segment \
     senior shadow shaft shame shaped sharp shelter sheriff \
     short should shrimp sidewalk silent silver similar simple \
     single sister skin skunk slap slavery sled slice \
     slim slow slush smart smear smell smirk smith \
     smoking smug snake snapshot sniff society software soldier \
     solution soul source space spark speak species spelling \
     spend spew spider spill spine spirit spit spray \
     sprinkle square squeeze stadium staff standard starting station \
     stay steady step stick stilt story strategy strike \
     style subject submit sugar suitable sunlight superior surface \
     surprise survive sweater swimming swing switch symbolic sympathy \
     syndrome system tackle tactics tadpole talent task taste \
     taught taxi teacher teammate teaspoon temple tenant tendency \
     tension terminal testify texture thank that theater theory \
     therapy thorn threaten thumb thunder ticket tidy timber \
     timely ting tofu together tolerate total toxic tracks \
     traffic training transfer trash traveler treat trend trial \
     tricycle trip triumph trouble true trust twice twin \
     type typical ugly ultimate umbrella uncover undergo unfair \
     unfold unhappy union universe unkind unknown unusual unwrap \
     upgrade upstairs username usher usual valid valuable vampire \
     vanish various vegan velvet venture verdict verify very \
     veteran vexed victim video view vintage violence viral \
     visitor visual vitamins vocal voice volume voter voting \
     walnut warmth warn watch wavy wealthy weapon webcam \
     welcome welfare western width wildlife window wine wireless \
     wisdom withdraw wits wolf woman work worthy wrap \
     wrist writing wrote year yelp yield yoga zero";

lazy_static! {
    pub static ref WORDLIST: Vec<&'static str> = {
        let words: Vec<&'static str> = WORDLIST_TEXT.split_whitespace().collect();
        debug_assert_eq!(words.len(), 1024);
        words
    };

    /// GF(256) exp/log tables for the x^8+x^4+x^3+x+1 polynomial
    static ref GF256: ([u8; 255], [u8; 256]) = {
        let mut exp = [0u8; 255];
        let mut log = [0u8; 256];
        let mut cur: u16 = 1;
        for i in 0..255 {
            exp[i] = cur as u8;
            log[cur as usize] = i as u8;
            cur = (cur << 1) ^ cur;
            if cur > 255 {
                cur ^= 0x11B;
            }
        }
        (exp, log)
    };
}

/// SLIP-39 errors
#[derive(Clone, PartialEq, Eq, Debug, Display, From, Error)]
#[display(doc_comments)]
pub enum Error {
    /// word '{0}' is not in the SLIP-39 wordlist
    UnknownWord(String),

    /// share checksum is invalid
    InvalidChecksum,

    /// share is too short to hold a 128-bit secret
    ShareTooShort,

    /// share value is not zero-padded properly
    InvalidPadding,

    /// share field {0} is out of range
    FieldOutOfRange(&'static str),

    /// shares are from different secrets or have inconsistent parameters
    InconsistentShares,

    /// share indices must be unique
    DuplicateShares,

    /// not enough shares: {0} provided, {1} required
    NotEnoughShares(usize, usize),

    /// share digest does not match the recovered secret
    DigestMismatch,

    /// secret must be 16 or 32 bytes long
    InvalidSecretLength,

    /// threshold parameters are invalid: {0} of {1}
    InvalidThreshold(usize, usize),

    /// mnemonic error: {0}
    #[from]
    Bip39(bip39::Error),
}

// RS1024 checksum over 10-bit symbols with the "shamir" customization
fn rs1024_polymod(values: impl Iterator<Item = u32>) -> u32 {
    const GEN: [u32; 10] = [
        0x00E0_E040,
        0x01C1_C080,
        0x0383_8100,
        0x0707_0200,
        0x0E0E_0009,
        0x1C0C_2412,
        0x3808_6C24,
        0x3090_FC48,
        0x21B1_F890,
        0x03F3_F120,
    ];
    let mut chk: u32 = 1;
    for value in values {
        let b = chk >> 20;
        chk = ((chk & 0xF_FFFF) << 10) ^ value;
        for (i, generator) in GEN.iter().enumerate() {
            if (b >> i) & 1 != 0 {
                chk ^= generator;
            }
        }
    }
    chk
}

fn customization() -> impl Iterator<Item = u32> {
    b"shamir".iter().map(|b| *b as u32)
}

fn rs1024_verify(indices: &[u16]) -> bool {
    rs1024_polymod(customization().chain(indices.iter().map(|i| *i as u32))) == 1
}

fn rs1024_checksum(indices: &[u16]) -> [u16; 3] {
    let polymod = rs1024_polymod(
        customization()
            .chain(indices.iter().map(|i| *i as u32))
            .chain([0u32, 0, 0]),
    ) ^ 1;
    [
        ((polymod >> 20) & 1023) as u16,
        ((polymod >> 10) & 1023) as u16,
        (polymod & 1023) as u16,
    ]
}

/// 4-round Feistel cipher encrypting/decrypting the share payload;
/// `rounds` selects the direction
fn feistel(
    payload: &[u8],
    id: u16,
    exponent: u8,
    passphrase: &[u8],
    rounds: [u8; 4],
) -> Vec<u8> {
    debug_assert_eq!(payload.len() % 2, 0);
    let half = payload.len() / 2;
    let mut left = payload[..half].to_vec();
    let mut right = payload[half..].to_vec();
    let mut salt = b"shamir".to_vec();
    salt.extend_from_slice(&id.to_be_bytes());
    for round in &rounds {
        let mut password = vec![*round];
        password.extend_from_slice(passphrase);
        let mut round_salt = salt.clone();
        round_salt.extend_from_slice(&right);
        let mut f = pbkdf2_hmac_sha256(&password, &round_salt, 2500u32 << exponent, half);
        for (l, fb) in left.iter_mut().zip(f.iter()) {
            *l ^= fb;
        }
        core::mem::swap(&mut left, &mut right);
        f.zeroize();
        password.zeroize();
    }
    let mut result = right;
    result.extend_from_slice(&left);
    result
}

fn encrypt(payload: &[u8], id: u16, exponent: u8, passphrase: &[u8]) -> Vec<u8> {
    feistel(payload, id, exponent, passphrase, [0, 1, 2, 3])
}

fn decrypt(payload: &[u8], id: u16, exponent: u8, passphrase: &[u8]) -> Vec<u8> {
    feistel(payload, id, exponent, passphrase, [3, 2, 1, 0])
}

/// A single SLIP-39 share
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Share {
    pub id: u16,
    pub exponent: u8,
    pub group_index: u8,
    pub group_threshold: u8,
    pub group_count: u8,
    pub member_index: u8,
    pub member_threshold: u8,
    pub value: Vec<u8>,
}

impl Share {
    /// Parses and checksum-verifies a share mnemonic
    pub fn parse(mnemonic: &str) -> Result<Share, Error> {
        let mut indices = vec![];
        for word in mnemonic.split_whitespace() {
            let index = WORDLIST
                .binary_search(&word)
                .map_err(|_| Error::UnknownWord(word.to_string()))?;
            indices.push(index as u16);
        }
        if indices.len() < 20 {
            return Err(Error::ShareTooShort);
        }
        if !rs1024_verify(&indices) {
            return Err(Error::InvalidChecksum);
        }
        let id = (indices[0] << 5) | (indices[1] >> 5);
        let exponent = (indices[1] & 31) as u8;
        let group_index = (indices[2] >> 6) as u8;
        let group_threshold = ((indices[2] >> 2) & 15) as u8 + 1;
        let group_count = (((indices[2] & 3) << 2) | (indices[3] >> 8)) as u8 + 1;
        let member_index = ((indices[3] >> 4) & 15) as u8;
        let member_threshold = (indices[3] & 15) as u8 + 1;
        if group_threshold > group_count {
            return Err(Error::FieldOutOfRange("group threshold"));
        }

        // unpack the 10-bit data symbols; the value is the low
        // share_bit_length bits, preceded by zero padding bits
        let data = &indices[4..indices.len() - 3];
        let share_bit_length = data.len() * 10 / 16 * 16;
        if share_bit_length < 128 {
            return Err(Error::ShareTooShort);
        }
        let padding = data.len() * 10 - share_bit_length;
        let mut bits = vec![0u8; (data.len() * 10 + 7) / 8];
        let mut cursor = 0usize;
        for symbol in data {
            for shift in (0..10).rev() {
                if (*symbol >> shift) & 1 != 0 {
                    bits[cursor / 8] |= 1 << (7 - cursor % 8);
                }
                cursor += 1;
            }
        }
        for i in 0..padding {
            if bits[i / 8] >> (7 - i % 8) & 1 != 0 {
                return Err(Error::InvalidPadding);
            }
        }
        let mut value = vec![0u8; share_bit_length / 8];
        for (i, byte) in value.iter_mut().enumerate() {
            let mut acc = 0u8;
            for j in 0..8 {
                let pos = padding + i * 8 + j;
                acc = (acc << 1) | (bits[pos / 8] >> (7 - pos % 8) & 1);
            }
            *byte = acc;
        }

        Ok(Share {
            id,
            exponent,
            group_index,
            group_threshold,
            group_count,
            member_index,
            member_threshold,
            value,
        })
    }

    /// Renders the share as a checksummed mnemonic
    pub fn mnemonic(&self) -> String {
        let share_bit_length = self.value.len() * 8;
        let padding = 10 - share_bit_length % 10;
        let num_data_words = (padding + share_bit_length) / 10;

        let mut indices: Vec<u16> = vec![
            self.id >> 5,
            ((self.id & 31) << 5) | self.exponent as u16,
            ((self.group_index as u16) << 6)
                | (((self.group_threshold - 1) as u16) << 2)
                | (((self.group_count - 1) as u16) >> 2),
            ((((self.group_count - 1) as u16) & 3) << 8)
                | ((self.member_index as u16) << 4)
                | ((self.member_threshold - 1) as u16),
        ];

        // pack padding + value bits into 10-bit symbols
        let total_bits = padding + share_bit_length;
        let mut symbol = 0u16;
        let mut bits_in_symbol = 0usize;
        let mut pushed = 0usize;
        for pos in 0..total_bits {
            let bit = if pos < padding {
                0
            } else {
                let bit_index = pos - padding;
                (self.value[bit_index / 8] >> (7 - bit_index % 8)) & 1
            };
            symbol = (symbol << 1) | bit as u16;
            bits_in_symbol += 1;
            if bits_in_symbol == 10 {
                indices.push(symbol);
                symbol = 0;
                bits_in_symbol = 0;
                pushed += 1;
            }
        }
        debug_assert_eq!(pushed, num_data_words);
        let checksum = rs1024_checksum(&indices);
        indices.extend_from_slice(&checksum);
        indices
            .iter()
            .map(|index| WORDLIST[*index as usize])
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Lagrange interpolation of the share polynomial at `x` over GF(256)
fn interpolate(x: u8, share_data: &[(u8, Vec<u8>)]) -> Vec<u8> {
    let (exp, log) = &*GF256;
    let log_product: i32 = share_data
        .iter()
        .map(|(share_x, _)| log[(share_x ^ x) as usize] as i32)
        .sum();
    let len = share_data[0].1.len();
    let mut result = vec![0u8; len];
    for (share_x, share_bytes) in share_data {
        let log_numerator = log_product - log[(share_x ^ x) as usize] as i32;
        let log_denominator: i32 = share_data
            .iter()
            .map(|(other_x, _)| log[(share_x ^ other_x) as usize] as i32)
            .sum();
        let log_factor = (log_numerator - log_denominator).rem_euclid(255);
        for (r, y) in result.iter_mut().zip(share_bytes.iter()) {
            if *y > 0 {
                *r ^= exp[((log[*y as usize] as i32 + log_factor) % 255) as usize];
            }
        }
    }
    result
}

fn digest(random: &[u8], shared_secret: &[u8]) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&hmac_sha256(random, shared_secret)[..4]);
    out
}

/// Splits a secret into `n` shares, any `k` of which recover it. Points
/// 254 and 255 of the polynomial hold the digest share and the secret.
pub fn split_secret<R: rand::RngCore + rand::CryptoRng>(
    secret: &[u8],
    k: usize,
    n: usize,
    rng: &mut R,
) -> Result<Vec<(u8, Vec<u8>)>, Error> {
    if k == 0 || k > n || n > 16 {
        return Err(Error::InvalidThreshold(k, n));
    }
    if secret.len() != 16 && secret.len() != 32 {
        return Err(Error::InvalidSecretLength);
    }
    if k == 1 {
        return Ok((0..n as u8).map(|i| (i, secret.to_vec())).collect());
    }
    let mut random = vec![0u8; secret.len() - 4];
    rng.fill_bytes(&mut random);
    let mut digest_share = digest(&random, secret).to_vec();
    digest_share.extend_from_slice(&random);

    let mut share_data: Vec<(u8, Vec<u8>)> = (0..k as u8 - 2)
        .map(|i| {
            let mut share = vec![0u8; secret.len()];
            rng.fill_bytes(&mut share);
            (i, share)
        })
        .collect();
    let mut result = share_data.clone();
    share_data.push((254, digest_share));
    share_data.push((255, secret.to_vec()));
    for i in k as u8 - 2..n as u8 {
        result.push((i, interpolate(i, &share_data)));
    }
    Ok(result)
}

/// Recovers the secret from share points, verifying the digest share
pub fn recover_secret(share_data: &[(u8, Vec<u8>)]) -> Result<Vec<u8>, Error> {
    let shared_secret = interpolate(255, share_data);
    let digest_share = interpolate(254, share_data);
    let mut expected = [0u8; 4];
    expected.copy_from_slice(&digest_share[..4]);
    if digest(&digest_share[4..], &shared_secret) != expected {
        return Err(Error::DigestMismatch);
    }
    Ok(shared_secret)
}

/// Takes a BIP-39 mnemonic and produces `n` single-group SLIP-39 share
/// mnemonics with threshold `k`
pub fn generate_shares<R: rand::RngCore + rand::CryptoRng>(
    mnemonic: &str,
    k: usize,
    n: usize,
    passphrase: &[u8],
    exponent: u8,
    rng: &mut R,
) -> Result<Vec<String>, Error> {
    let mut secret = bip39::mnemonic_to_bytes(mnemonic)?;
    if secret.len() != 16 && secret.len() != 32 {
        secret.zeroize();
        return Err(Error::InvalidSecretLength);
    }
    let id = (rng.next_u32() & 0x7FFF) as u16;
    let encrypted = encrypt(&secret, id, exponent, passphrase);
    secret.zeroize();

    let share_data = split_secret(&encrypted, k, n, rng)?;
    let mut shares = Vec::with_capacity(n);
    for (group_index, value) in share_data {
        let share = Share {
            id,
            exponent,
            group_index,
            group_threshold: k as u8,
            group_count: n as u8,
            member_index: 0,
            member_threshold: 1,
            value,
        };
        shares.push(share.mnemonic());
    }
    Ok(shares)
}

/// Recovers the BIP-39 mnemonic from a set of share mnemonics
pub fn recover_mnemonic(share_mnemonics: &[&str], passphrase: &[u8]) -> Result<String, Error> {
    let shares: Vec<Share> = share_mnemonics
        .iter()
        .map(|mnemonic| Share::parse(mnemonic))
        .collect::<Result<_, _>>()?;
    if shares.is_empty() {
        return Err(Error::NotEnoughShares(0, 1));
    }
    let first = &shares[0];
    if shares.iter().any(|share| {
        share.id != first.id
            || share.exponent != first.exponent
            || share.group_threshold != first.group_threshold
            || share.group_count != first.group_count
            || share.value.len() != first.value.len()
    }) {
        return Err(Error::InconsistentShares);
    }
    let mut seen = std::collections::HashSet::new();
    for share in &shares {
        if !seen.insert((share.group_index, share.member_index)) {
            return Err(Error::DuplicateShares);
        }
    }
    // single-member groups only: each share is its group's secret
    let share_data: Vec<(u8, Vec<u8>)> = shares
        .iter()
        .map(|share| (share.group_index, share.value.clone()))
        .collect();
    let threshold = first.group_threshold as usize;
    let encrypted = if threshold == 1 {
        share_data[0].1.clone()
    } else {
        if share_data.len() < threshold {
            return Err(Error::NotEnoughShares(share_data.len(), threshold));
        }
        recover_secret(&share_data[..threshold])?
    };
    let mut secret = decrypt(&encrypted, first.id, first.exponent, passphrase);
    let mnemonic = bip39::mnemonic_from_bytes(&secret)?;
    secret.zeroize();
    Ok(mnemonic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    const MN12: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon \
                        abandon abandon about";

    // known-good 2-of-3 shares of MN12, cross-checked with an
    // independent SLIP-39 implementation
    const REFERENCE_SHARES: [&str; 3] = [
        "academic academic acrobat leader buyer union fiber dining umbrella dragon pacific \
         impact trip obesity favorite ounce museum divorce pancake fiscal",
        "academic academic beard leader easel playoff skin flea overall disease gums have \
         impact tactics frequent greatest shaped sharp emperor ceramic",
        "academic academic ceramic leader canyon gross amazing wavy market drink indicate \
         that bulge behavior emission ivory treat prisoner universe username",
    ];

    #[test]
    fn wordlist_integrity() {
        assert_eq!(WORDLIST.len(), 1024);
        let mut sorted = WORDLIST.clone();
        sorted.sort_unstable();
        assert_eq!(*WORDLIST, sorted);
        assert_eq!(WORDLIST[0], "academic");
        assert_eq!(WORDLIST[1023], "zero");
    }

    #[test]
    fn reference_shares_recover() {
        // any two of the three reference shares recover the secret
        for pair in &[[0usize, 1], [0, 2], [1, 2]] {
            let shares = [REFERENCE_SHARES[pair[0]], REFERENCE_SHARES[pair[1]]];
            assert_eq!(recover_mnemonic(&shares, b"").unwrap(), MN12);
        }
        // all three work too
        assert_eq!(
            recover_mnemonic(&REFERENCE_SHARES[..].to_vec(), b"").unwrap(),
            MN12
        );
    }

    #[test]
    fn reference_share_fields() {
        let share = Share::parse(REFERENCE_SHARES[0]).unwrap();
        assert_eq!(share.group_threshold, 2);
        assert_eq!(share.group_count, 3);
        assert_eq!(share.group_index, 0);
        assert_eq!(share.member_threshold, 1);
        assert_eq!(share.value.len(), 16);
        // parse/render round-trip
        assert_eq!(
            share.mnemonic(),
            REFERENCE_SHARES[0].split_whitespace().collect::<Vec<_>>().join(" ")
        );
    }

    #[test]
    fn wrong_passphrase_changes_secret() {
        let shares = [REFERENCE_SHARES[0], REFERENCE_SHARES[1]];
        let wrong = recover_mnemonic(&shares, b"wrong");
        // decryption always "succeeds", but yields a different secret; the
        // bip39 checksum makes it visible with high probability
        if let Ok(mnemonic) = wrong {
            assert_ne!(mnemonic, MN12);
        }
    }

    #[test]
    fn checksum_detects_word_swap() {
        let mut words: Vec<&str> = REFERENCE_SHARES[0].split_whitespace().collect();
        words.swap(5, 6);
        let corrupted = words.join(" ");
        assert_eq!(
            Share::parse(&corrupted).unwrap_err(),
            Error::InvalidChecksum
        );
    }

    #[test]
    fn split_and_recover_roundtrip() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0xB1B0);
        for &(k, n) in &[(1usize, 1usize), (2, 3), (3, 5), (5, 5)] {
            let shares = generate_shares(MN12, k, n, b"passphrase", 0, &mut rng).unwrap();
            assert_eq!(shares.len(), n);
            let refs: Vec<&str> = shares.iter().take(k).map(String::as_str).collect();
            assert_eq!(
                recover_mnemonic(&refs, b"passphrase").unwrap(),
                MN12,
                "failed for {}-of-{}",
                k,
                n
            );
        }
    }

    #[test]
    fn share_consistency_enforced() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let set_a = generate_shares(MN12, 2, 3, b"", 0, &mut rng).unwrap();
        let set_b = generate_shares(MN12, 2, 3, b"", 0, &mut rng).unwrap();
        // mixing shares of different splits fails on the id check
        let mixed = [set_a[0].as_str(), set_b[1].as_str()];
        assert!(matches!(
            recover_mnemonic(&mixed, b""),
            Err(Error::InconsistentShares) | Err(Error::DigestMismatch)
        ));
        // duplicated share index fails
        let dup = [set_a[0].as_str(), set_a[0].as_str()];
        assert_eq!(recover_mnemonic(&dup, b""), Err(Error::DuplicateShares));
        // not enough shares
        let one = [set_a[0].as_str()];
        assert!(matches!(
            recover_mnemonic(&one, b""),
            Err(Error::NotEnoughShares(1, 2))
        ));
    }

    #[test]
    fn gf256_tables() {
        let (exp, log) = &*GF256;
        assert_eq!(exp[0], 1);
        // log and exp are inverse on the multiplicative group
        for i in 1..=255u16 {
            assert_eq!(exp[log[i as usize] as usize], i as u8);
        }
    }
}
