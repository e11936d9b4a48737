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

//! Output descriptors: the textual script templates (`pkh`, `wpkh`, `sh`,
//! `wsh`, `sh(wsh())`, `sh(wpkh())`, `tr`) around miniscript expressions
//! and keys, with checksum handling, wildcard derivation and address
//! generation.

pub mod arguments;
pub mod checksum;
pub mod lex;
pub mod miniscript;
pub mod taptree;

use core::fmt::{self, Display, Formatter};
use core::str::FromStr;

pub use self::arguments::{Derivation, Key, KeyHash, KeyInner, KeyOrigin};
pub use self::miniscript::Miniscript;
pub use self::taptree::{TapLeaf, TapTree};

use crate::bip32::HARDENED_INDEX_BOUNDARY;
use crate::networks::Network;
use crate::script::{self, Script};
use self::lex::Cursor;

/// Descriptor-level errors
#[derive(Clone, PartialEq, Eq, Debug, Display, From, Error)]
#[display(doc_comments)]
pub enum Error {
    /// descriptor does not start with a known script wrapper
    UnknownWrapper,

    /// unbalanced parentheses in descriptor
    UnbalancedParentheses,

    /// trailing data after the descriptor body
    TrailingData,

    /// x-only keys are allowed only inside tr() descriptors
    XOnlyOutsideTaproot,

    /// all branch sets of a descriptor must have the same length
    BranchLengthMismatch,

    /// this descriptor has no private keys to sign with
    NoPrivateKeys,

    /// checksum error: {0}
    #[from]
    Checksum(checksum::Error),

    /// miniscript error: {0}
    #[from]
    Miniscript(miniscript::Error),

    /// argument error: {0}
    #[from]
    Argument(arguments::Error),

    /// script error: {0}
    #[from]
    Script(script::Error),
}

/// Parsed output descriptor
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Descriptor {
    /// Script body for `sh`/`wsh` wrappers
    pub miniscript: Option<Miniscript>,
    /// Wrapped into `sh()`
    pub sh: bool,
    /// Wrapped into `wsh()`
    pub wsh: bool,
    /// Single key for `pkh`/`wpkh`/`sh(wpkh())`/`tr`
    pub key: Option<Key>,
    /// Key is spent as p2wpkh
    pub wpkh: bool,
    /// `tr()` descriptor
    pub taproot: bool,
    /// Optional script tree of a `tr()` descriptor
    pub taptree: Option<TapTree>,
}

impl Descriptor {
    fn validate(&self) -> Result<(), Error> {
        if let Some(ms) = &self.miniscript {
            ms.verify()?;
        }
        if let Some(tree) = &self.taptree {
            tree.verify()?;
        }
        // x-only keys appear only under tr()
        if !self.taproot {
            for key in self.keys() {
                if matches!(key.inner, KeyInner::XOnly(_)) {
                    return Err(Error::XOnlyOutsideTaproot);
                }
            }
        }
        // all branch sets must agree on length
        let mut branch_len: Option<usize> = None;
        for key in self.keys() {
            if let Some(branches) = key.branches() {
                match branch_len {
                    None => branch_len = Some(branches.len()),
                    Some(len) if len == branches.len() => {}
                    Some(_) => return Err(Error::BranchLengthMismatch),
                }
            }
        }
        Ok(())
    }

    /// Number of derivation branches (e.g. receive & change); 1 when no
    /// key carries a branch set
    pub fn num_branches(&self) -> usize {
        self.keys()
            .iter()
            .find_map(|key| key.branches().map(<[u32]>::len))
            .unwrap_or(1)
    }

    pub fn is_wildcard(&self) -> bool {
        self.keys().iter().any(|key| key.is_wildcard())
    }

    pub fn is_segwit(&self) -> bool {
        (self.wsh && self.miniscript.is_some())
            || (self.wpkh && self.key.is_some())
            || self.taproot
    }

    pub fn is_taproot(&self) -> bool {
        self.taproot
    }

    pub fn is_basic_multisig(&self) -> bool {
        matches!(
            self.miniscript,
            Some(Miniscript::Multi(..)) | Some(Miniscript::SortedMulti(..))
        )
    }

    /// All keys of the descriptor: the single key or the miniscript (and
    /// tap tree) keys
    pub fn keys(&self) -> Vec<&Key> {
        let mut keys = vec![];
        if let Some(key) = &self.key {
            keys.push(key);
        }
        if let Some(ms) = &self.miniscript {
            keys.extend(ms.keys());
        }
        if let Some(tree) = &self.taptree {
            keys.extend(tree.keys());
        }
        keys
    }

    /// Substitutes wildcards with the address index (and branch sets with
    /// the branch index), producing a concrete descriptor
    pub fn derive(&self, index: u32, branch_index: Option<u32>) -> Result<Descriptor, Error> {
        Ok(Descriptor {
            miniscript: self
                .miniscript
                .as_ref()
                .map(|ms| ms.derive(index, branch_index))
                .transpose()?,
            sh: self.sh,
            wsh: self.wsh,
            key: self
                .key
                .as_ref()
                .map(|key| key.derive(index, branch_index))
                .transpose()?,
            wpkh: self.wpkh,
            taproot: self.taproot,
            taptree: self
                .taptree
                .as_ref()
                .map(|tree| tree.derive(index, branch_index))
                .transpose()?,
        })
    }

    /// Witness script of `wsh` descriptors
    pub fn witness_script(&self) -> Option<Script> {
        match (&self.miniscript, self.wsh) {
            (Some(ms), true) => Some(Script::new(ms.compile())),
            _ => None,
        }
    }

    /// Redeem script of `sh`-wrapped descriptors
    pub fn redeem_script(&self) -> Option<Script> {
        if !self.sh {
            return None;
        }
        if let Some(ms) = &self.miniscript {
            if self.wsh {
                Some(script::p2wsh(&Script::new(ms.compile())))
            } else {
                Some(Script::new(ms.compile()))
            }
        } else {
            self.key
                .as_ref()
                .map(|key| script::p2wpkh(&key.public_key()))
        }
    }

    /// Merkle root of the `tr()` script tree, if any
    pub fn tap_merkle_root(&self) -> Option<[u8; 32]> {
        self.taptree.as_ref().map(TapTree::merkle_root)
    }

    /// The scriptPubkey this descriptor expands to
    pub fn script_pubkey(&self) -> Result<Script, Error> {
        if self.taproot {
            let key = self.key.as_ref().expect("tr always carries a key");
            return Ok(script::p2tr(&key.public_key(), self.tap_merkle_root())?);
        }
        if self.sh {
            return Ok(script::p2sh(
                &self.redeem_script().expect("sh descriptors have one"),
            ));
        }
        if let Some(witness_script) = self.witness_script() {
            return Ok(script::p2wsh(&witness_script));
        }
        if let Some(ms) = &self.miniscript {
            // bare script descriptor
            return Ok(Script::new(ms.compile()));
        }
        let key = self.key.as_ref().expect("key descriptors carry a key");
        if self.wpkh {
            Ok(script::p2wpkh(&key.public_key()))
        } else {
            Ok(script::p2pkh(&key.public_key()))
        }
    }

    pub fn address(&self, network: &Network) -> Result<String, Error> {
        Ok(self.script_pubkey()?.address(network)?)
    }

    /// Checks whether a scriptPubkey belongs to this descriptor, given the
    /// BIP-32 derivation info from a PSBT scope: `(fingerprint, path)`
    /// pairs. Matching paths are completed into concrete (index, branch)
    /// pairs which are derived and compared against the script.
    pub fn owns(&self, script_pubkey: &Script, derivations: &[([u8; 4], Vec<u32>)]) -> bool {
        self.derive_for(script_pubkey, derivations).is_some()
    }

    /// Same check as [`Descriptor::owns`], returning the concrete derived
    /// descriptor reproducing the script
    pub fn derive_for(
        &self,
        script_pubkey: &Script,
        derivations: &[([u8; 4], Vec<u32>)],
    ) -> Option<Descriptor> {
        for (fingerprint, path) in derivations {
            for key in self.keys() {
                let origin = match &key.origin {
                    Some(origin) => origin,
                    None => continue,
                };
                if &origin.fingerprint != fingerprint {
                    continue;
                }
                let prefix = &origin.derivation.0;
                if path.len() < prefix.len() || &path[..prefix.len()] != prefix.as_slice() {
                    continue;
                }
                let rest = &path[prefix.len()..];
                let (index, branch) = match &key.derivation {
                    Some(derivation) => match match_template(derivation, rest) {
                        Some(found) => found,
                        None => continue,
                    },
                    None if rest.is_empty() => (0, None),
                    None => continue,
                };
                if let Ok(derived) = self.derive(index, branch) {
                    if let Ok(spk) = derived.script_pubkey() {
                        if &spk == script_pubkey {
                            return Some(derived);
                        }
                    }
                }
            }
        }
        None
    }

    fn read_from(cursor: &mut Cursor) -> Result<Descriptor, Error> {
        let mut sh = false;
        let mut wsh = false;
        let mut wpkh = false;
        let mut taproot = false;
        let mut is_miniscript = true;

        if cursor.eat_str("tr(") {
            taproot = true;
            is_miniscript = false;
        } else if cursor.eat_str("sh(wsh(") {
            sh = true;
            wsh = true;
        } else if cursor.eat_str("sh(wpkh(") {
            sh = true;
            wpkh = true;
            is_miniscript = false;
        } else if cursor.eat_str("wsh(") {
            wsh = true;
        } else if cursor.eat_str("wpkh(") {
            wpkh = true;
            is_miniscript = false;
        } else if cursor.eat_str("pkh(") {
            is_miniscript = false;
        } else if cursor.eat_str("sh(") {
            sh = true;
        } else {
            return Err(Error::UnknownWrapper);
        }

        let mut key = None;
        let mut miniscript = None;
        let mut taptree = None;
        let mut brackets = 1 + (sh && (wsh || wpkh)) as usize;

        if taproot {
            key = Some(Key::read_from(cursor)?);
            if cursor.eat(b',') {
                taptree = Some(TapTree::read_from(cursor)?);
            }
        } else if is_miniscript {
            miniscript = Some(Miniscript::read_from(cursor)?);
        } else {
            key = Some(Key::read_from(cursor)?);
        }
        while brackets > 0 {
            if !cursor.eat(b')') {
                return Err(Error::UnbalancedParentheses);
            }
            brackets -= 1;
        }

        let descriptor = Descriptor {
            miniscript,
            sh,
            wsh,
            key,
            wpkh,
            taproot,
            taptree,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Canonical text form with the checksum appended
    pub fn to_string_with_checksum(&self) -> String {
        checksum::append(&self.to_string()).expect("descriptor text is in the valid charset")
    }
}

/// Matches a concrete derivation tail against a key template, recovering
/// the (address index, branch index) pair
fn match_template(derivation: &Derivation, rest: &[u32]) -> Option<(u32, Option<u32>)> {
    use arguments::DerivationStep;
    if rest.len() != derivation.steps.len() {
        return None;
    }
    let mut index = 0;
    let mut branch = None;
    for (step, value) in derivation.steps.iter().zip(rest) {
        match step {
            DerivationStep::Index(idx) if idx == value => {}
            DerivationStep::Index(_) => return None,
            DerivationStep::Wildcard => {
                if *value >= HARDENED_INDEX_BOUNDARY {
                    return None;
                }
                index = *value;
            }
            DerivationStep::Branch(set) => {
                branch = Some(set.iter().position(|idx| idx == value)? as u32);
            }
        }
    }
    Some((index, branch))
}

impl Display for Descriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.taproot {
            let key = self.key.as_ref().expect("tr always carries a key");
            return match &self.taptree {
                Some(tree) => write!(f, "tr({},{})", key, tree),
                None => write!(f, "tr({})", key),
            };
        }
        let body = if let Some(ms) = &self.miniscript {
            if self.wsh {
                format!("wsh({})", ms)
            } else {
                format!("{}", ms)
            }
        } else {
            let key = self.key.as_ref().expect("key descriptors carry a key");
            if self.wpkh {
                format!("wpkh({})", key)
            } else {
                format!("pkh({})", key)
            }
        };
        if self.sh {
            write!(f, "sh({})", body)
        } else {
            f.write_str(&body)
        }
    }
}

impl FromStr for Descriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = checksum::verify(s)?;
        let mut cursor = Cursor::new(body.as_bytes());
        let descriptor = Descriptor::read_from(&mut cursor)?;
        if !cursor.is_empty() {
            return Err(Error::TrailingData);
        }
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networks::REGTEST;

    const XPUB1: &str = "xpub6F6wWxm8F64iBHNhyaoh3QKCuuMUY5pfPPr1H1WuZXUXeXtZ21qjFN5ykaqnLL1jtPEFB9d94CyZrcYWKVdSiJKQ6mLGEB5sfrGFBpg6wgA";
    const XPUB2: &str = "xpub6BwcvdstHTJtLpp1WxUiQCYERWSB66XY5JrCpw71GAJxcJ6s2AiUoEK4Nzt6UDaTmanUiSe6TY2RoFturKNLXeWBhwBF6WBNghr8cr7qnjk";
    const TPUB: &str = "tpubD6NzVbkrYhZ4YV9UfLiozpVUbLctwrM2LQmRuAshuYYpPHDp9SyTs7XYAivbfuQsVwWtZrDFENX7zAnk7JnViuWGSNrNgXh4uFTpbSjVGdg";

    fn key1() -> String {
        format!("[abcdef12/84h/22h]{}/{{0,1}}/*", XPUB1)
    }

    fn key3() -> String {
        format!("[12345678/44h/12]{}/{{0,1}}/*", XPUB2)
    }

    #[test]
    fn reference_scripts() {
        // known-good (descriptor, expected top-level script hex) pairs
        let vectors = [
            (
                "wsh(or_d(c:pk_k(020e0338c96a8870479f2396c373cc7696ba124e8635d41b0ea581112b67817261),c:pk_k(0250863ad64a87ae8a2fe83c1af1a8403cb53f53e486d8511dad8a04887e5b2352)))".to_string(),
                "21020e0338c96a8870479f2396c373cc7696ba124e8635d41b0ea581112b67817261ac7364210250863ad64a87ae8a2fe83c1af1a8403cb53f53e486d8511dad8a04887e5b2352ac68",
            ),
            (
                format!("sh(or_b(pk({}),s:pk(03e7d285b4817f83f724cd29394da75dfc84fe639ed147a944e7e6064703b14130)))", key1()),
                "2103801b3a4e3ca0d61d469445621561c47f6c1424d0fd353a44c2c3ebb84ae78f59ac7c2103e7d285b4817f83f724cd29394da75dfc84fe639ed147a944e7e6064703b14130ac9b",
            ),
            (
                format!("wsh(or_d(pk({}),pkh([12345a78/42h/15]03e7d285b4817f83f724cd29394da75dfc84fe639ed147a944e7e6064703b14130)))", key3()),
                "2103b8fa5d5959fa4027ccbf0736a86ccde4242e3051ea363437b4ff0d52598d7cecac736476a9148e5d7457d33a978d1c3c1e440f92a195e00cc7d888ac68",
            ),
            (
                format!("wsh(and_v(v:pk({}),or_d(pk(03e7d285b4817f83f724cd29394da75dfc84fe639ed147a944e7e6064703b14130),older(12960))))", key1()),
                "2103801b3a4e3ca0d61d469445621561c47f6c1424d0fd353a44c2c3ebb84ae78f59ad2103e7d285b4817f83f724cd29394da75dfc84fe639ed147a944e7e6064703b14130ac736402a032b268",
            ),
            (
                format!("wsh(andor(pk({}),older(1008),pk(03e7d285b4817f83f724cd29394da75dfc84fe639ed147a944e7e6064703b14130)))", key1()),
                "2103801b3a4e3ca0d61d469445621561c47f6c1424d0fd353a44c2c3ebb84ae78f59ac642103e7d285b4817f83f724cd29394da75dfc84fe639ed147a944e7e6064703b14130ac6702f003b268",
            ),
            (
                format!("wsh(multi(2,{},03e7d285b4817f83f724cd29394da75dfc84fe639ed147a944e7e6064703b14130,{}))", key1(), key3()),
                "522103801b3a4e3ca0d61d469445621561c47f6c1424d0fd353a44c2c3ebb84ae78f592103e7d285b4817f83f724cd29394da75dfc84fe639ed147a944e7e6064703b1413021\
                 03b8fa5d5959fa4027ccbf0736a86ccde4242e3051ea363437b4ff0d52598d7cec53ae",
            ),
            (
                format!("wsh(sortedmulti(2,{},03e7d285b4817f83f724cd29394da75dfc84fe639ed147a944e7e6064703b14130,{}))", key1(), key3()),
                "522103801b3a4e3ca0d61d469445621561c47f6c1424d0fd353a44c2c3ebb84ae78f592103b8fa5d5959fa4027ccbf0736a86ccde4242e3051ea363437b4ff0d52598d7cec21\
                 03e7d285b4817f83f724cd29394da75dfc84fe639ed147a944e7e6064703b1413053ae",
            ),
            (
                format!("wpkh({})", key1()),
                "0014f8f93df2160de8fd3ca716e2f905c74da3f9839f",
            ),
            (
                format!("sh(wpkh({}))", key1()),
                "0014f8f93df2160de8fd3ca716e2f905c74da3f9839f",
            ),
            (
                format!("pkh({})", key1()),
                "76a914f8f93df2160de8fd3ca716e2f905c74da3f9839f88ac",
            ),
        ];

        for (source, expected) in &vectors {
            let descriptor: Descriptor = source.parse().unwrap();
            assert_eq!(&descriptor.to_string(), source, "display {}", source);
            let top = descriptor
                .witness_script()
                .or_else(|| descriptor.redeem_script())
                .unwrap_or_else(|| descriptor.script_pubkey().unwrap());
            let expected: String = expected.split_whitespace().collect();
            assert_eq!(top.to_string(), expected, "script for {}", source);
        }
    }

    #[test]
    fn checksum_roundtrip() {
        let source = format!("wpkh({})", key1());
        let descriptor: Descriptor = source.parse().unwrap();
        let with_checksum = descriptor.to_string_with_checksum();
        assert!(with_checksum.contains('#'));
        let reparsed: Descriptor = with_checksum.parse().unwrap();
        assert_eq!(reparsed, descriptor);
        // a corrupted checksum fails
        let mut bad = with_checksum.clone();
        bad.pop();
        bad.push(if with_checksum.ends_with('q') { 'p' } else { 'q' });
        assert!(bad.parse::<Descriptor>().is_err());
    }

    #[test]
    fn branch_derivation() {
        let source = format!("wpkh({})", key1());
        let descriptor: Descriptor = source.parse().unwrap();
        assert!(descriptor.is_wildcard());
        assert_eq!(descriptor.num_branches(), 2);

        let recv = descriptor.derive(3, None).unwrap();
        let change = descriptor.derive(3, Some(1)).unwrap();
        assert!(!recv.is_wildcard());
        assert_ne!(
            recv.script_pubkey().unwrap(),
            change.script_pubkey().unwrap()
        );

        // derived descriptor owns its script
        let spk = recv.script_pubkey().unwrap();
        let derivations = vec![(
            [0xAB, 0xCD, 0xEF, 0x12],
            vec![
                84 + HARDENED_INDEX_BOUNDARY,
                22 + HARDENED_INDEX_BOUNDARY,
                0,
                3,
            ],
        )];
        assert!(descriptor.owns(&spk, &derivations));
        // wrong index does not match
        let wrong = vec![(
            [0xAB, 0xCD, 0xEF, 0x12],
            vec![
                84 + HARDENED_INDEX_BOUNDARY,
                22 + HARDENED_INDEX_BOUNDARY,
                0,
                4,
            ],
        )];
        assert!(!descriptor.owns(&spk, &wrong));
    }

    #[test]
    fn branch_length_mismatch_rejected() {
        let source = format!(
            "wsh(multi(1,{}/{{0,1}}/*,{}/{{0,1,2}}/*))",
            XPUB1, XPUB2
        );
        assert_eq!(
            source.parse::<Descriptor>(),
            Err(Error::BranchLengthMismatch)
        );
    }

    #[test]
    fn taproot_descriptor_addresses() {
        // keypath-only tr() over a tpub, reference regtest addresses
        let source = format!("tr({}/0/*)", TPUB);
        let descriptor: Descriptor = source.parse().unwrap();
        assert!(descriptor.is_taproot());
        assert_eq!(descriptor.to_string(), source);
        let expected = [
            "bcrt1pgg2exs6vjrhekft0eve0ldse7pfjr3jfm86pc0qgn4pzflfp7wvsc0kwqa",
            "bcrt1p8trzp0e5wsu86cuufqz7jwl05w7ud9ttqtv2aj3vhswhv54ex5vschn0cd",
            "bcrt1pvlk0rphxu63lj8rvp56r5984l68zmsl0hwxuusp2tgc3v23amxfqgk77mr",
            "bcrt1pxm8encfk3a2wukzj3766gqj78sppaqvjg4e403fx0f0zms4p0nasv3vvkn",
            "bcrt1pdq8ruhpcl0cfnwe4gwt4l5a44dmlmyw2jd2wynr5zkjdm9f6plwqrrzax3",
        ];
        for (i, addr) in expected.iter().enumerate() {
            let derived = descriptor.derive(i as u32, None).unwrap();
            assert_eq!(&derived.address(&REGTEST).unwrap(), addr);
            assert_eq!(
                script::address_to_script(addr).unwrap(),
                derived.script_pubkey().unwrap()
            );
        }
    }

    #[test]
    fn taproot_with_tree() {
        let xonly = "b4ca2da5380d9aeb5ca67e4f18c487ae9b668748517e12b788496f63765e2efa";
        let other = "e7d285b4817f83f724cd29394da75dfc84fe639ed147a944e7e6064703b14130";
        let source = format!("tr({},{{pk({}),pk({})}})", xonly, other, xonly);
        let descriptor: Descriptor = source.parse().unwrap();
        assert_eq!(descriptor.to_string(), source);
        assert!(descriptor.tap_merkle_root().is_some());
        // different tree, different script
        let keypath: Descriptor = format!("tr({})", xonly).parse().unwrap();
        assert_ne!(
            descriptor.script_pubkey().unwrap(),
            keypath.script_pubkey().unwrap()
        );
    }

    #[test]
    fn xonly_restricted_to_taproot() {
        let xonly = "b4ca2da5380d9aeb5ca67e4f18c487ae9b668748517e12b788496f63765e2efa";
        assert!(format!("tr({})", xonly).parse::<Descriptor>().is_ok());
        assert_eq!(
            format!("wpkh({})", xonly).parse::<Descriptor>(),
            Err(Error::XOnlyOutsideTaproot)
        );
    }

    #[test]
    fn nesting_rules() {
        // sh(wsh()) parses, wsh(sh()) does not
        let source =
            "sh(wsh(multi(1,03e7d285b4817f83f724cd29394da75dfc84fe639ed147a944e7e6064703b14130)))";
        let descriptor: Descriptor = source.parse().unwrap();
        assert!(descriptor.sh && descriptor.wsh);
        assert_eq!(descriptor.to_string(), source);
        assert!("wsh(sh(pk(02e1fdc3b011effbba4b0771eb0f7193dee24cfe101ab7e8b64516d83f7116a615)))"
            .parse::<Descriptor>()
            .is_err());
    }
}
